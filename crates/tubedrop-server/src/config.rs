use std::path::PathBuf;
use std::time::Duration;

use tubedrop_client::YtDlpConfig;
use tubedrop_core::{AppError, ServiceConfig};

const DEFAULT_PORT: u16 = 5000;

/// Server configuration read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Root for job workspaces. Defaults to the system temp dir.
    pub workspace_dir: Option<PathBuf>,
    pub ytdlp_path: PathBuf,
    pub retention: Option<Duration>,
    pub sweep_interval: Option<Duration>,
}

impl ServerConfig {
    /// Read configuration from environment variables.
    ///
    /// - `TUBEDROP_PORT` (optional, defaults to 5000)
    /// - `TUBEDROP_WORKSPACE_DIR` (optional)
    /// - `TUBEDROP_YTDLP_PATH` (optional, defaults to `yt-dlp` on `PATH`)
    /// - `TUBEDROP_RETENTION_SECS` (optional, defaults to 3600)
    /// - `TUBEDROP_SWEEP_INTERVAL_SECS` (optional, defaults to 300)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let port = match lookup("TUBEDROP_PORT") {
            None => DEFAULT_PORT,
            Some(raw) => raw.parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid TUBEDROP_PORT '{raw}': must be a port number"
                ))
            })?,
        };

        let workspace_dir = lookup("TUBEDROP_WORKSPACE_DIR")
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        let ytdlp_path = lookup("TUBEDROP_YTDLP_PATH")
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));

        Ok(Self {
            port,
            workspace_dir,
            ytdlp_path,
            retention: seconds(&lookup, "TUBEDROP_RETENTION_SECS")?,
            sweep_interval: seconds(&lookup, "TUBEDROP_SWEEP_INTERVAL_SECS")?,
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        if let Some(dir) = &self.workspace_dir {
            config = config.with_workspace_root(dir.clone());
        }
        if let Some(retention) = self.retention {
            config = config.with_retention(retention);
        }
        if let Some(interval) = self.sweep_interval {
            config = config.with_sweep_interval(interval);
        }
        config
    }

    pub fn ytdlp_config(&self) -> YtDlpConfig {
        YtDlpConfig::default().with_binary(self.ytdlp_path.clone())
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, AppError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let secs: u64 = raw.parse().map_err(|_| {
        AppError::ConfigError(format!(
            "Invalid {key} '{raw}': must be a positive integer"
        ))
    })?;
    if secs == 0 {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    Ok(Some(Duration::from_secs(secs)))
}
