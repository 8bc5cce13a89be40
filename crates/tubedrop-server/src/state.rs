use tubedrop_core::{Clock, DownloadService, MediaFetcher};

/// Shared application state, available to all route handlers via
/// `State<Arc<AppState<M, C>>>`.
pub struct AppState<M: MediaFetcher, C: Clock> {
    pub service: DownloadService<M, C>,
}

impl<M: MediaFetcher, C: Clock> AppState<M, C> {
    pub fn new(service: DownloadService<M, C>) -> Self {
        Self { service }
    }
}
