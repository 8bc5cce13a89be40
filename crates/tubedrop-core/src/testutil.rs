//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Notify, watch};

use crate::models::{DownloadProgress, MediaFormat, MediaMetadata};
use crate::retry::ExtractionProfile;
use crate::runner::{JobEvent, JobReporter};
use crate::traits::{Clock, FetchError, FetchErrorKind, FormatSpec, MediaFetcher, ProgressCallback};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FetcherCalls {
    metadata: usize,
    download_profiles: Vec<String>,
    download_formats: Vec<FormatSpec>,
    thumbnail_urls: Vec<String>,
}

/// Mock media collaborator with scripted results.
///
/// Metadata and download results are queues: each call pops the first
/// element, and an empty queue means success. A successful download emits the
/// configured progress snapshots and writes `Mock Video.mp4` into the
/// destination directory.
#[derive(Clone)]
pub struct MockFetcher {
    metadata: Arc<Mutex<Vec<Result<MediaMetadata, FetchError>>>>,
    downloads: Arc<Mutex<Vec<Result<(), FetchError>>>>,
    progress: Arc<Mutex<Vec<DownloadProgress>>>,
    thumbnail_error: Arc<Mutex<Option<FetchError>>>,
    output_name: Arc<Mutex<Option<String>>>,
    gate: Option<Arc<Notify>>,
    calls: Arc<Mutex<FetcherCalls>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            metadata: Arc::new(Mutex::new(Vec::new())),
            downloads: Arc::new(Mutex::new(Vec::new())),
            progress: Arc::new(Mutex::new(Vec::new())),
            thumbnail_error: Arc::new(Mutex::new(None)),
            output_name: Arc::new(Mutex::new(Some("Mock Video.mp4".to_string()))),
            gate: None,
            calls: Arc::new(Mutex::new(FetcherCalls::default())),
        }
    }

    pub fn with_metadata(self, result: Result<MediaMetadata, FetchError>) -> Self {
        self.metadata.lock().unwrap().push(result);
        self
    }

    pub fn with_download_results(self, results: Vec<Result<(), FetchError>>) -> Self {
        *self.downloads.lock().unwrap() = results;
        self
    }

    pub fn with_progress(self, snapshots: Vec<DownloadProgress>) -> Self {
        *self.progress.lock().unwrap() = snapshots;
        self
    }

    pub fn with_thumbnail_error(self, error: FetchError) -> Self {
        *self.thumbnail_error.lock().unwrap() = Some(error);
        self
    }

    /// Downloads succeed without writing any file.
    pub fn without_output(self) -> Self {
        *self.output_name.lock().unwrap() = None;
        self
    }

    /// Downloads block after emitting progress until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn metadata_calls(&self) -> usize {
        self.calls.lock().unwrap().metadata
    }

    pub fn download_profiles(&self) -> Vec<String> {
        self.calls.lock().unwrap().download_profiles.clone()
    }

    pub fn download_formats(&self) -> Vec<FormatSpec> {
        self.calls.lock().unwrap().download_formats.clone()
    }

    pub fn thumbnail_urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().thumbnail_urls.clone()
    }
}

fn io_failure(err: std::io::Error) -> FetchError {
    FetchError::new(FetchErrorKind::Unknown, err.to_string())
}

impl MediaFetcher for MockFetcher {
    async fn fetch_metadata(
        &self,
        _url: &str,
        _profile: &ExtractionProfile,
    ) -> Result<MediaMetadata, FetchError> {
        self.calls.lock().unwrap().metadata += 1;
        let mut scripted = self.metadata.lock().unwrap();
        if scripted.is_empty() {
            Ok(sample_metadata())
        } else {
            scripted.remove(0)
        }
    }

    async fn download(
        &self,
        _url: &str,
        profile: &ExtractionProfile,
        format: &FormatSpec,
        dest_dir: &Path,
        on_progress: ProgressCallback,
    ) -> Result<(), FetchError> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.download_profiles.push(profile.name.clone());
            calls.download_formats.push(format.clone());
        }

        let scripted = {
            let mut downloads = self.downloads.lock().unwrap();
            if downloads.is_empty() {
                Ok(())
            } else {
                downloads.remove(0)
            }
        };
        scripted?;

        let snapshots = self.progress.lock().unwrap().clone();
        for snapshot in snapshots {
            on_progress(snapshot);
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let output = self.output_name.lock().unwrap().clone();
        if let Some(name) = output {
            tokio::fs::write(dest_dir.join(name), b"mock media")
                .await
                .map_err(io_failure)?;
        }
        Ok(())
    }

    async fn fetch_thumbnail(&self, thumbnail_url: &str, dest: &Path) -> Result<(), FetchError> {
        self.calls
            .lock()
            .unwrap()
            .thumbnail_urls
            .push(thumbnail_url.to_string());

        let error = self.thumbnail_error.lock().unwrap().clone();
        if let Some(error) = error {
            return Err(error);
        }
        tokio::fs::write(dest, b"\xff\xd8\xff mock jpeg")
            .await
            .map_err(io_failure)
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Clock that only moves when a test calls [`ManualClock::advance`].
///
/// Sleeps resolve once the clock reaches their deadline; zero-length sleeps
/// resolve immediately.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<watch::Sender<DateTime<Utc>>>,
    sleepers: Arc<AtomicUsize>,
}

struct SleeperGuard(Arc<AtomicUsize>);

impl Drop for SleeperGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    /// Starts at 2023-11-14T22:13:20Z.
    fn default() -> Self {
        Self::at(DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default())
    }
}

impl ManualClock {
    pub fn at(start: DateTime<Utc>) -> Self {
        let (tx, _rx) = watch::channel(start);
        Self {
            now: Arc::new(tx),
            sleepers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        self.now.send_modify(|now| {
            *now = now
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
        });
    }

    /// Number of sleeps currently waiting on this clock.
    pub fn sleepers(&self) -> usize {
        self.sleepers.load(Ordering::SeqCst)
    }

    /// Yield until at least `count` sleeps are waiting.
    pub async fn wait_for_sleepers(&self, count: usize) {
        while self.sleepers() < count {
            tokio::task::yield_now().await;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.now.subscribe();
        let sleepers = self.sleepers.clone();
        let start = *rx.borrow();
        let deadline = TimeDelta::from_std(duration)
            .ok()
            .and_then(|d| start.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        async move {
            if duration.is_zero() {
                return;
            }
            sleepers.fetch_add(1, Ordering::SeqCst);
            let _guard = SleeperGuard(sleepers);
            loop {
                let reached = *rx.borrow_and_update() >= deadline;
                if reached || rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock job reporter that records event names.
#[derive(Default, Clone)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl JobReporter for MockReporter {
    fn report(&self, event: JobEvent<'_>) {
        let label = match &event {
            JobEvent::Started { .. } => "started",
            JobEvent::WorkspaceReady { .. } => "workspace_ready",
            JobEvent::ThumbnailSaved { .. } => "thumbnail_saved",
            JobEvent::ThumbnailSkipped { .. } => "thumbnail_skipped",
            JobEvent::Finished { .. } => "finished",
            JobEvent::Failed { .. } => "failed",
            JobEvent::Orphaned { .. } => "orphaned",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Metadata for a well-known public video with a handful of formats.
pub fn sample_metadata() -> MediaMetadata {
    let format = |id: &str, ext: &str, height: Option<u32>, filesize: u64| MediaFormat {
        format_id: id.to_string(),
        ext: ext.to_string(),
        height,
        filesize: Some(filesize),
    };

    MediaMetadata {
        id: "dQw4w9WgXcQ".to_string(),
        title: Some("Mock Video".to_string()),
        duration: Some(212),
        uploader: Some("Mock Channel".to_string()),
        view_count: Some(1_000_000),
        thumbnail: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".to_string()),
        description: Some("A mock description".to_string()),
        upload_date: Some("20091025".to_string()),
        formats: vec![
            format("137", "mp4", Some(1080), 80_000_000),
            format("22", "mp4", Some(720), 40_000_000),
            format("18", "mp4", Some(360), 10_000_000),
            format("140", "m4a", None, 3_000_000),
        ],
    }
}
