use thiserror::Error;

/// Application-wide error types for tubedrop.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing input (URL, quality tier). Rejected before any job exists.
    #[error("{0}")]
    InvalidInput(String),

    /// Extraction failed in a way another client configuration may fix.
    #[error("{0}")]
    ExtractionRecoverable(String),

    /// Extraction failed for a reason no configuration change will fix
    /// (private, unavailable, region-locked, bot-checked).
    #[error("{0}")]
    ExtractionTerminal(String),

    /// Creating, scanning or removing a job workspace failed.
    #[error("Workspace error: {0}")]
    WorkspaceIo(String),

    /// The collaborator reported success but left no file behind.
    #[error("Download failed: no file was produced")]
    NoFileProduced,

    /// Job or file lookup missed.
    #[error("{0}")]
    NotFound(String),

    /// HTTP transport failed (thumbnail fetch).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    pub(crate) fn workspace(context: &str, err: std::io::Error) -> Self {
        AppError::WorkspaceIo(format!("{context}: {err}"))
    }
}
