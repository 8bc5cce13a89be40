use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const DESCRIPTION_PREVIEW_CHARS: usize = 200;

/// One downloadable format as reported by the media collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub format_id: String,
    pub ext: String,
    pub height: Option<u32>,
    pub filesize: Option<u64>,
}

/// Raw metadata for a video as reported by the media collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub title: Option<String>,
    pub duration: Option<u64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub upload_date: Option<String>,
    pub formats: Vec<MediaFormat>,
}

/// A selectable quality, one per distinct video height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityOption {
    pub height: u32,
    pub ext: String,
    pub filesize: u64,
    pub format_id: String,
}

/// Client-facing summary of a video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub title: String,
    pub duration: u64,
    pub uploader: String,
    pub view_count: u64,
    pub thumbnail: String,
    pub description: String,
    pub upload_date: String,
    pub available_qualities: Vec<QualityOption>,
    pub video_id: String,
}

impl From<MediaMetadata> for VideoInfo {
    fn from(meta: MediaMetadata) -> Self {
        let available_qualities = quality_options(&meta.formats);
        Self {
            title: meta.title.unwrap_or_else(|| "Unknown".to_string()),
            duration: meta.duration.unwrap_or(0),
            uploader: meta.uploader.unwrap_or_else(|| "Unknown".to_string()),
            view_count: meta.view_count.unwrap_or(0),
            thumbnail: meta.thumbnail.unwrap_or_default(),
            description: meta
                .description
                .as_deref()
                .map(description_preview)
                .unwrap_or_default(),
            upload_date: meta.upload_date.unwrap_or_default(),
            available_qualities,
            video_id: meta.id,
        }
    }
}

/// Collapse formats into one option per height, tallest first.
///
/// Only `mp4`/`webm` formats with a known height qualify; for each height the
/// format with the largest known filesize wins (first seen on ties).
pub fn quality_options(formats: &[MediaFormat]) -> Vec<QualityOption> {
    let mut by_height: BTreeMap<u32, QualityOption> = BTreeMap::new();

    for format in formats {
        let Some(height) = format.height else {
            continue;
        };
        if format.ext != "mp4" && format.ext != "webm" {
            continue;
        }

        let candidate = QualityOption {
            height,
            ext: format.ext.clone(),
            filesize: format.filesize.unwrap_or(0),
            format_id: format.format_id.clone(),
        };

        match by_height.get(&height) {
            Some(existing) if existing.filesize >= candidate.filesize => {}
            _ => {
                by_height.insert(height, candidate);
            }
        }
    }

    by_height.into_values().rev().collect()
}

fn description_preview(description: &str) -> String {
    if description.is_empty() {
        return String::new();
    }
    let preview: String = description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
    format!("{preview}...")
}

/// A streaming progress snapshot from the collaborator.
///
/// `percent` and `speed` are passed through as the collaborator formatted
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: String,
    pub speed: String,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

impl DownloadProgress {
    pub fn new(
        percent: impl Into<String>,
        speed: impl Into<String>,
        downloaded_bytes: u64,
        total_bytes: u64,
    ) -> Self {
        Self {
            percent: percent.into(),
            speed: speed.into(),
            downloaded_bytes,
            total_bytes,
        }
    }
}
