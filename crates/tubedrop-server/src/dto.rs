use serde::{Deserialize, Serialize};

use tubedrop_core::job::JobRecord;
use tubedrop_core::models::{QualityOption, VideoInfo};

// ---------------------------------------------------------------------------
// Video info
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VideoInfoRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QualityOptionResponse {
    pub height: u32,
    pub ext: String,
    pub filesize: u64,
    pub format_id: String,
}

impl From<QualityOption> for QualityOptionResponse {
    fn from(option: QualityOption) -> Self {
        Self {
            height: option.height,
            ext: option.ext,
            filesize: option.filesize,
            format_id: option.format_id,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VideoInfoResponse {
    pub title: String,
    pub duration: u64,
    pub uploader: String,
    pub view_count: u64,
    pub thumbnail: String,
    pub description: String,
    pub upload_date: String,
    pub available_qualities: Vec<QualityOptionResponse>,
    pub video_id: String,
}

impl From<VideoInfo> for VideoInfoResponse {
    fn from(info: VideoInfo) -> Self {
        Self {
            title: info.title,
            duration: info.duration,
            uploader: info.uploader,
            view_count: info.view_count,
            thumbnail: info.thumbnail,
            description: info.description,
            upload_date: info.upload_date,
            available_qualities: info
                .available_qualities
                .into_iter()
                .map(QualityOptionResponse::from)
                .collect(),
            video_id: info.video_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

fn default_quality() -> String {
    "best".to_string()
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct DownloadRequestBody {
    #[serde(default)]
    pub url: String,
    /// One of `best`, `high`, `medium`, `low`, `audio_only`.
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default)]
    pub download_thumbnail: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DownloadResponse {
    pub download_id: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ThumbnailRequest {
    #[serde(default)]
    pub url: String,
}

/// Job state as reported to pollers.
#[derive(Debug, Serialize, PartialEq, utoipa::ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressResponse {
    Pending,
    Starting {
        percent: String,
    },
    Downloading {
        percent: String,
        speed: String,
        downloaded_bytes: u64,
        total_bytes: u64,
    },
    Finished {
        filename: String,
        has_thumbnail: bool,
    },
    #[serde(rename = "error")]
    Failed {
        message: String,
    },
    NotFound,
}

impl From<JobRecord> for ProgressResponse {
    fn from(record: JobRecord) -> Self {
        match record {
            JobRecord::Pending => Self::Pending,
            JobRecord::Starting => Self::Starting {
                percent: "0%".to_string(),
            },
            JobRecord::Downloading(p) => Self::Downloading {
                percent: p.percent,
                speed: p.speed,
                downloaded_bytes: p.downloaded_bytes,
                total_bytes: p.total_bytes,
            },
            JobRecord::Finished(done) => Self::Finished {
                filename: done.filename,
                has_thumbnail: done.thumbnail_path.is_some(),
            },
            JobRecord::Failed { message } => Self::Failed { message },
            JobRecord::NotFound => Self::NotFound,
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Number of tracked jobs.
    pub jobs: usize,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
