use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DownloadProgress;
use crate::retry::ExtractionProfile;
use crate::throttle::JitterConfig;

/// Opaque job identifier of the form `{unix_seconds}_{suffix}`.
///
/// The leading timestamp is the job's creation time and drives age-based
/// reclamation; the suffix is random.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh identifier stamped with `now`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", now.timestamp(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time embedded in the identifier, if it parses.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_stamp(&self.0)
    }

    /// Whether the job is older than `retention` at `now`.
    ///
    /// Identifiers without a readable timestamp never expire by age.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        let retention = TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);
        self.created_at()
            .is_some_and(|created| now.signed_duration_since(created) > retention)
    }
}

/// Parse the `{unix_seconds}_` prefix shared by job ids and workspace names.
pub(crate) fn parse_stamp(raw: &str) -> Option<DateTime<Utc>> {
    let (secs, _) = raw.split_once('_')?;
    let secs: i64 = secs.parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for JobId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// A finished download ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishedDownload {
    pub filename: String,
    pub file_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
}

/// Current state of a job as seen by pollers.
///
/// Exactly one variant is active per job. `NotFound` is synthesised for
/// unknown ids and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRecord {
    Pending,
    Starting,
    Downloading(DownloadProgress),
    Finished(FinishedDownload),
    Failed { message: String },
    NotFound,
}

impl JobRecord {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRecord::Pending => "pending",
            JobRecord::Starting => "starting",
            JobRecord::Downloading(_) => "downloading",
            JobRecord::Finished(_) => "finished",
            JobRecord::Failed { .. } => "error",
            JobRecord::NotFound => "not_found",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobRecord::Finished(_) | JobRecord::Failed { .. })
    }

    pub fn failed(message: impl Into<String>) -> Self {
        JobRecord::Failed {
            message: message.into(),
        }
    }
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requested quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[default]
    Best,
    High,
    Medium,
    Low,
    AudioOnly,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
            Quality::AudioOnly => "audio_only",
        }
    }

    /// Maximum video height for the tier (`None` for audio).
    pub fn height_ceiling(&self) -> Option<u32> {
        match self {
            Quality::Best => Some(1080),
            Quality::High => Some(720),
            Quality::Medium => Some(480),
            Quality::Low => Some(360),
            Quality::AudioOnly => None,
        }
    }

    /// yt-dlp style format selector for the tier.
    pub fn format_selector(&self) -> String {
        match self.height_ceiling() {
            Some(height) => {
                let last_resort = if *self == Quality::Low { "worst" } else { "best" };
                format!(
                    "bestvideo[height<={height}][ext=mp4]+bestaudio[ext=m4a]/best[height<={height}]/{last_resort}"
                )
            }
            None => "bestaudio[ext=m4a]/bestaudio".to_string(),
        }
    }

    /// Container the output is merged/converted into, if any.
    pub fn container(&self) -> Option<&'static str> {
        match self {
            Quality::AudioOnly => None,
            _ => Some("mp4"),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Quality::Best),
            "high" => Ok(Quality::High),
            "medium" => Ok(Quality::Medium),
            "low" => Ok(Quality::Low),
            "audio_only" => Ok(Quality::AudioOnly),
            _ => Err(format!("Unknown quality: {}", s)),
        }
    }
}

/// Request to start a new download job.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub quality: Quality,
    pub with_thumbnail: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, quality: Quality) -> Self {
        Self {
            url: url.into(),
            quality,
            with_thumbnail: false,
        }
    }

    pub fn with_thumbnail(mut self, enabled: bool) -> Self {
        self.with_thumbnail = enabled;
        self
    }
}

/// A download request bound to its allocated identifier.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: JobId,
    pub url: String,
    pub quality: Quality,
    pub with_thumbnail: bool,
}

impl DownloadJob {
    pub fn new(id: JobId, request: DownloadRequest) -> Self {
        Self {
            id,
            url: request.url,
            quality: request.quality,
            with_thumbnail: request.with_thumbnail,
        }
    }
}

/// Configuration for the download service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory under which job workspaces are created.
    pub workspace_root: PathBuf,
    /// Maximum age of a job record/workspace before forced reclamation.
    pub retention: Duration,
    /// Delay between delivering a file and reclaiming its workspace.
    pub delivery_grace: Duration,
    /// Period of the background age sweep.
    pub sweep_interval: Duration,
    /// Randomised pre-flight delay before a job touches the collaborator.
    pub jitter: JitterConfig,
    /// Pause between two extraction profiles.
    pub profile_backoff: Duration,
    /// Ordered extraction profiles tried by the strategy selector.
    pub profiles: Vec<ExtractionProfile>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir(),
            retention: Duration::from_secs(60 * 60),
            delivery_grace: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5 * 60),
            jitter: JitterConfig::default(),
            profile_backoff: Duration::from_secs(1),
            profiles: ExtractionProfile::defaults(),
        }
    }
}

impl ServiceConfig {
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_delivery_grace(mut self, grace: Duration) -> Self {
        self.delivery_grace = grace;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterConfig) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_profile_backoff(mut self, backoff: Duration) -> Self {
        self.profile_backoff = backoff;
        self
    }

    pub fn with_profiles(mut self, profiles: Vec<ExtractionProfile>) -> Self {
        self.profiles = profiles;
        self
    }
}
