//! Fallback across extraction profiles.
//!
//! The selector walks an ordered list of [`ExtractionProfile`]s, retrying the
//! collaborator with the next profile only when the failure looks
//! configuration-dependent:
//!
//! ```text
//! profile[0] --ok--> done
//!     |
//!     +--transient--> backoff --> profile[1] --> ... --> profile[n-1] --fail--> terminal
//!     |
//!     +--private / unavailable / geo / bot check--> terminal (no further profiles)
//! ```
//!
//! Failures nothing in the classification table recognises are retried while
//! profiles remain and become terminal on the last one.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::traits::{Clock, FetchError, FetchErrorKind};

const BOT_CHECK_MESSAGE: &str = "YouTube is blocking requests. Please try again later.";
const UNAVAILABLE_MESSAGE: &str = "This video is not available for download.";
const PRIVATE_MESSAGE: &str = "This video is private.";
const GEO_MESSAGE: &str = "This video is not available in your region.";
const EXHAUSTED_MESSAGE: &str =
    "Download failed: could not extract the video with any client configuration.";
const MAX_DETAIL_CHARS: usize = 200;

/// Substring table, checked in order against the lowercased message.
///
/// Geo and private come before "unavailable" because the site prefixes both
/// with "Video unavailable.".
const CLASSIFICATION_TABLE: &[(&str, FetchErrorKind)] = &[
    ("confirm you're not a bot", FetchErrorKind::BotCheck),
    ("confirm you\u{2019}re not a bot", FetchErrorKind::BotCheck),
    ("private video", FetchErrorKind::Private),
    ("not available in your country", FetchErrorKind::GeoRestricted),
    ("blocked it in your country", FetchErrorKind::GeoRestricted),
    ("geo restricted", FetchErrorKind::GeoRestricted),
    ("geo-restricted", FetchErrorKind::GeoRestricted),
    ("video unavailable", FetchErrorKind::Unavailable),
    ("this video has been removed", FetchErrorKind::Unavailable),
    ("failed to extract any player response", FetchErrorKind::Transient),
    ("player response", FetchErrorKind::Transient),
    ("unable to extract", FetchErrorKind::Transient),
    ("nsig extraction failed", FetchErrorKind::Transient),
    ("requested format is not available", FetchErrorKind::Transient),
    ("http error 403", FetchErrorKind::Transient),
    ("timed out", FetchErrorKind::Transient),
    ("connection reset", FetchErrorKind::Transient),
    ("incomplete data received", FetchErrorKind::Transient),
];

/// Map collaborator output onto a failure category.
pub fn classify_failure(message: &str) -> FetchErrorKind {
    let lower = message.to_lowercase();
    CLASSIFICATION_TABLE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| *kind)
        .unwrap_or(FetchErrorKind::Unknown)
}

/// Client-facing text for a collaborator failure. Never echoes more than the
/// first line of the raw message.
pub fn user_message(err: &FetchError) -> String {
    match err.kind {
        FetchErrorKind::BotCheck => BOT_CHECK_MESSAGE.to_string(),
        FetchErrorKind::Unavailable => UNAVAILABLE_MESSAGE.to_string(),
        FetchErrorKind::Private => PRIVATE_MESSAGE.to_string(),
        FetchErrorKind::GeoRestricted => GEO_MESSAGE.to_string(),
        FetchErrorKind::Transient | FetchErrorKind::Unknown => {
            format!("Download failed: {}", first_line(&err.reason))
        }
    }
}

fn first_line(reason: &str) -> String {
    let line = reason
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown error");
    let line = line.strip_prefix("ERROR:").map(str::trim).unwrap_or(line);
    line.chars().take(MAX_DETAIL_CHARS).collect()
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        match err.kind {
            FetchErrorKind::Transient => AppError::ExtractionRecoverable(user_message(&err)),
            _ => AppError::ExtractionTerminal(user_message(&err)),
        }
    }
}

/// What to do after a profile failed.
#[derive(Debug)]
pub enum Decision {
    /// Try the next profile; carries the error for logging.
    Advance(AppError),
    /// Stop with a terminal, client-facing error.
    Abort(AppError),
}

/// Decide whether a failure should move on to the next profile.
pub fn decide(err: &FetchError, is_last: bool) -> Decision {
    let worth_retrying = match err.kind {
        FetchErrorKind::Transient => true,
        FetchErrorKind::Unknown => !is_last,
        _ => false,
    };

    if worth_retrying && !is_last {
        return Decision::Advance(AppError::ExtractionRecoverable(user_message(err)));
    }

    let message = if err.kind == FetchErrorKind::Transient {
        EXHAUSTED_MESSAGE.to_string()
    } else {
        user_message(err)
    };
    Decision::Abort(AppError::ExtractionTerminal(message))
}

/// One collaborator configuration: which site clients to impersonate and
/// which stream types to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionProfile {
    pub name: String,
    pub player_clients: Vec<String>,
    pub skip_dash: bool,
}

impl ExtractionProfile {
    pub fn new(name: impl Into<String>, player_clients: &[&str]) -> Self {
        Self {
            name: name.into(),
            player_clients: player_clients.iter().map(|c| c.to_string()).collect(),
            skip_dash: false,
        }
    }

    pub fn with_skip_dash(mut self, skip: bool) -> Self {
        self.skip_dash = skip;
        self
    }

    /// Default fallback order.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("android_web", &["android", "web"]).with_skip_dash(true),
            Self::new("web", &["web"]),
            Self::new("ios", &["ios"]),
            Self::new("tv_embedded", &["tv_embedded"]),
        ]
    }

    /// Extractor arguments in `youtube:key=value;key=value` form.
    pub fn extractor_args(&self) -> String {
        let mut args = format!("youtube:player_client={}", self.player_clients.join(","));
        if self.skip_dash {
            args.push_str(";skip=dash");
        }
        args
    }
}

/// Runs an operation against each profile in turn until one succeeds or the
/// failure is terminal.
#[derive(Clone)]
pub struct StrategySelector<C: Clock> {
    profiles: Vec<ExtractionProfile>,
    backoff: Duration,
    clock: C,
}

impl<C: Clock> StrategySelector<C> {
    pub fn new(profiles: Vec<ExtractionProfile>, backoff: Duration, clock: C) -> Self {
        Self {
            profiles,
            backoff,
            clock,
        }
    }

    /// Call `attempt` with each profile until it succeeds.
    ///
    /// The pause before profile `n` (1-indexed) is `n * backoff`.
    pub async fn run<T, F, Fut>(&self, url: &str, mut attempt: F) -> Result<T, AppError>
    where
        F: FnMut(ExtractionProfile) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if self.profiles.is_empty() {
            return Err(AppError::ConfigError(
                "no extraction profiles configured".to_string(),
            ));
        }

        let last = self.profiles.len() - 1;
        for (index, profile) in self.profiles.iter().enumerate() {
            if index > 0 && !self.backoff.is_zero() {
                self.clock.sleep(self.backoff * index as u32).await;
            }

            let err = match attempt(profile.clone()).await {
                Ok(value) => {
                    if index > 0 {
                        tracing::info!(%url, profile = %profile.name, "Extraction succeeded on fallback profile");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match decide(&err, index == last) {
                Decision::Advance(reason) => {
                    tracing::warn!(
                        %url,
                        profile = %profile.name,
                        error = %reason,
                        "Extraction failed, trying next profile"
                    );
                }
                Decision::Abort(terminal) => {
                    tracing::warn!(
                        %url,
                        profile = %profile.name,
                        kind = ?err.kind,
                        raw = %err.reason,
                        "Extraction failed"
                    );
                    return Err(terminal);
                }
            }
        }

        Err(AppError::ExtractionTerminal(EXHAUSTED_MESSAGE.to_string()))
    }
}
