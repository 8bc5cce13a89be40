use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::Quality;
use crate::models::{DownloadProgress, MediaMetadata};
use crate::retry::{ExtractionProfile, classify_failure};

/// Callback the collaborator invokes with every progress snapshot, in order.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Category of a collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Extraction/player-response hiccup; another profile may succeed.
    Transient,
    /// The site asked for a bot check.
    BotCheck,
    /// Video removed or otherwise unavailable.
    Unavailable,
    /// Video is private.
    Private,
    /// Video is blocked in the server's region.
    GeoRestricted,
    /// Nothing in the classification table matched.
    Unknown,
}

/// Typed failure returned by a [`MediaFetcher`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    /// Raw collaborator text. Logged, never shown to clients.
    pub reason: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Classify free-form collaborator output.
    pub fn from_message(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            kind: classify_failure(&reason),
            reason,
        }
    }
}

/// Collaborator-specific encoding of a quality tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    /// Format selector, e.g. `bestvideo[height<=480]+bestaudio/best`.
    pub selector: String,
    /// Container to merge/convert into, `None` to keep the source container.
    pub container: Option<&'static str>,
}

impl From<Quality> for FormatSpec {
    fn from(quality: Quality) -> Self {
        Self {
            selector: quality.format_selector(),
            container: quality.container(),
        }
    }
}

/// External media collaborator: metadata extraction and media download.
///
/// Every call takes the extraction profile to use; retrying across profiles
/// is the caller's job.
pub trait MediaFetcher: Send + Sync + Clone + 'static {
    fn fetch_metadata(
        &self,
        url: &str,
        profile: &ExtractionProfile,
    ) -> impl Future<Output = Result<MediaMetadata, FetchError>> + Send;

    /// Download `url` into `dest_dir`, reporting progress through `on_progress`.
    fn download(
        &self,
        url: &str,
        profile: &ExtractionProfile,
        format: &FormatSpec,
        dest_dir: &Path,
        on_progress: ProgressCallback,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;

    /// Fetch the image at `thumbnail_url` and write it to `dest`.
    fn fetch_thumbnail(
        &self,
        thumbnail_url: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// Source of wall-clock time and delays.
///
/// Core logic never sleeps on the runtime directly so tests can drive time.
pub trait Clock: Send + Sync + Clone + 'static {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send + 'static;
}

/// Real clock backed by the system time and the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send + 'static {
        tokio::time::sleep(duration)
    }
}
