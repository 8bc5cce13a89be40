pub mod directory;
pub mod error;
pub mod janitor;
pub mod job;
pub mod models;
pub mod progress;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod throttle;
pub mod traits;
pub mod util;
pub mod workspace;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::AppError;
pub use job::{
    DownloadJob, DownloadRequest, FinishedDownload, JobId, JobRecord, Quality, ServiceConfig,
};
pub use models::{DownloadProgress, MediaFormat, MediaMetadata, QualityOption, VideoInfo};
pub use retry::ExtractionProfile;
pub use runner::{JobEvent, JobReporter, TracingJobReporter};
pub use service::{DownloadService, ThumbnailFile};
pub use throttle::JitterConfig;
pub use traits::{
    Clock, FetchError, FetchErrorKind, FormatSpec, MediaFetcher, ProgressCallback, SystemClock,
};
