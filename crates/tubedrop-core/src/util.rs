use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?(?:youtube\.com/(?:watch\?v=|embed/|v/)|youtu\.be/)([A-Za-z0-9_-]{11})",
    )
    .expect("video URL pattern is valid")
});

/// Extract the 11-character video id from a supported URL shape.
///
/// Accepts `youtube.com/watch?v=`, `youtu.be/`, `youtube.com/embed/` and
/// `youtube.com/v/`, with or without scheme and `www.`.
pub fn extract_video_id(url: &str) -> Option<&str> {
    VIDEO_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Trim and validate a user-supplied video URL.
pub fn validate_video_url(url: &str) -> Result<&str, AppError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AppError::InvalidInput("URL is required".to_string()));
    }
    if extract_video_id(url).is_none() {
        return Err(AppError::InvalidInput(
            "Invalid YouTube URL. Please enter a valid YouTube video URL.".to_string(),
        ));
    }
    Ok(url)
}
