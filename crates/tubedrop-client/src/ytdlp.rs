use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tubedrop_core::error::AppError;
use tubedrop_core::models::{DownloadProgress, MediaFormat, MediaMetadata};
use tubedrop_core::retry::ExtractionProfile;
use tubedrop_core::traits::{FetchError, FetchErrorKind, FormatSpec, MediaFetcher, ProgressCallback};

use crate::thumbnail::ThumbnailDownloader;

/// Desktop Chrome user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const PROGRESS_MARKER: &str = "tubedrop-progress:";
const PROGRESS_TEMPLATE: &str = "download:tubedrop-progress:%(progress._percent_str)s|%(progress._speed_str)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Settings for the `yt-dlp` process.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary: PathBuf,
    pub user_agent: String,
    pub socket_timeout: Duration,
    pub retries: u32,
    pub fragment_retries: u32,
    /// Bounds of yt-dlp's own randomised pause between requests, in seconds.
    pub sleep_interval: (u32, u32),
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            socket_timeout: Duration::from_secs(30),
            retries: 3,
            fragment_retries: 3,
            sleep_interval: (1, 5),
        }
    }
}

impl YtDlpConfig {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }
}

/// Media collaborator backed by the `yt-dlp` command-line tool.
///
/// Metadata comes from `--dump-single-json`; downloads stream a custom
/// `--progress-template` on stdout which is parsed into
/// [`DownloadProgress`] snapshots. Failures are classified from stderr.
#[derive(Clone)]
pub struct YtDlpFetcher {
    config: Arc<YtDlpConfig>,
    thumbnails: ThumbnailDownloader,
}

impl YtDlpFetcher {
    pub fn new(config: YtDlpConfig) -> Result<Self, AppError> {
        let thumbnails = ThumbnailDownloader::new(&config.user_agent)?;
        Ok(Self {
            config: Arc::new(config),
            thumbnails,
        })
    }

    fn base_args(&self, profile: &ExtractionProfile) -> Vec<String> {
        let c = &self.config;
        vec![
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--user-agent".into(),
            c.user_agent.clone(),
            "--add-header".into(),
            "Accept:text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
            "--add-header".into(),
            "Accept-Language:en-us,en;q=0.5".into(),
            "--socket-timeout".into(),
            c.socket_timeout.as_secs().to_string(),
            "--extractor-args".into(),
            profile.extractor_args(),
        ]
    }

    fn metadata_args(&self, url: &str, profile: &ExtractionProfile) -> Vec<String> {
        let mut args = self.base_args(profile);
        args.extend([
            "--dump-single-json".into(),
            "--skip-download".into(),
            "--".into(),
            url.to_string(),
        ]);
        args
    }

    fn download_args(
        &self,
        url: &str,
        profile: &ExtractionProfile,
        format: &FormatSpec,
        dest_dir: &Path,
    ) -> Vec<String> {
        let c = &self.config;
        let mut args = self.base_args(profile);
        args.extend([
            "-f".into(),
            format.selector.clone(),
            "-o".into(),
            dest_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
            "--retries".into(),
            c.retries.to_string(),
            "--fragment-retries".into(),
            c.fragment_retries.to_string(),
            "--sleep-interval".into(),
            c.sleep_interval.0.to_string(),
            "--max-sleep-interval".into(),
            c.sleep_interval.1.to_string(),
            "--no-write-subs".into(),
            "--newline".into(),
            "--progress-template".into(),
            PROGRESS_TEMPLATE.into(),
        ]);
        if let Some(container) = format.container {
            args.extend([
                "--merge-output-format".into(),
                container.to_string(),
                "--recode-video".into(),
                container.to_string(),
            ]);
        }
        args.extend(["--".into(), url.to_string()]);
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn spawn_failure(err: std::io::Error) -> FetchError {
    FetchError::new(FetchErrorKind::Unknown, format!("Failed to run yt-dlp: {err}"))
}

fn exit_failure(stderr: &str, status: std::process::ExitStatus) -> FetchError {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        FetchError::new(
            FetchErrorKind::Unknown,
            format!("yt-dlp exited with {status}"),
        )
    } else {
        FetchError::from_message(stderr)
    }
}

impl MediaFetcher for YtDlpFetcher {
    async fn fetch_metadata(
        &self,
        url: &str,
        profile: &ExtractionProfile,
    ) -> Result<MediaMetadata, FetchError> {
        tracing::debug!(%url, profile = %profile.name, "Fetching metadata");
        let output = self
            .command(&self.metadata_args(url, profile))
            .output()
            .await
            .map_err(spawn_failure)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(exit_failure(&stderr, output.status));
        }

        parse_metadata(&output.stdout)
    }

    async fn download(
        &self,
        url: &str,
        profile: &ExtractionProfile,
        format: &FormatSpec,
        dest_dir: &Path,
        on_progress: ProgressCallback,
    ) -> Result<(), FetchError> {
        tracing::debug!(%url, profile = %profile.name, format = %format.selector, "Starting yt-dlp");
        let mut child = self
            .command(&self.download_args(url, profile, format, dest_dir))
            .spawn()
            .map_err(spawn_failure)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::new(FetchErrorKind::Unknown, "yt-dlp stdout unavailable"))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::new(FetchErrorKind::Unknown, "yt-dlp stderr unavailable"))?;

        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr_pipe.read_to_string(&mut buf).await;
            buf
        });

        // Titles may reach stdout in a non-UTF-8 locale, so lines are read
        // as bytes. Stdout must be drained to EOF or yt-dlp blocks on write.
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    match parse_progress_line(&line) {
                        Some(progress) => on_progress(progress),
                        None => tracing::trace!(line = %line.trim_end(), "yt-dlp"),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Lost yt-dlp stdout, stopping the process");
                    let _ = child.start_kill();
                    break;
                }
            }
        }

        let status = child.wait().await.map_err(spawn_failure)?;
        let stderr = stderr_reader.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(exit_failure(&stderr, status))
        }
    }

    async fn fetch_thumbnail(&self, thumbnail_url: &str, dest: &Path) -> Result<(), FetchError> {
        self.thumbnails.fetch(thumbnail_url, dest).await
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    view_count: Option<u64>,
    thumbnail: Option<String>,
    description: Option<String>,
    upload_date: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: String,
    #[serde(default)]
    ext: String,
    height: Option<u32>,
    filesize: Option<f64>,
}

fn parse_metadata(stdout: &[u8]) -> Result<MediaMetadata, FetchError> {
    let raw: RawInfo = serde_json::from_slice(stdout).map_err(|e| {
        FetchError::new(
            FetchErrorKind::Unknown,
            format!("yt-dlp returned invalid JSON: {e}"),
        )
    })?;

    Ok(MediaMetadata {
        id: raw.id,
        title: raw.title,
        duration: raw.duration.map(|d| d.max(0.0) as u64),
        uploader: raw.uploader,
        view_count: raw.view_count,
        thumbnail: raw.thumbnail,
        description: raw.description,
        upload_date: raw.upload_date,
        formats: raw
            .formats
            .into_iter()
            .map(|f| MediaFormat {
                format_id: f.format_id,
                ext: f.ext,
                height: f.height,
                filesize: f.filesize.map(|s| s.max(0.0) as u64),
            })
            .collect(),
    })
}

/// Parse one line printed through [`PROGRESS_TEMPLATE`].
///
/// Unknown numeric fields (`NA`, `None`) read as zero; the total falls back
/// to yt-dlp's estimate.
fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let payload = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = payload.split('|');
    let percent = fields.next()?.trim();
    let speed = fields.next()?.trim();
    let downloaded = parse_bytes(fields.next()?);
    let total = parse_bytes(fields.next()?);
    let estimate = fields.next().map(parse_bytes).unwrap_or(0);

    Some(DownloadProgress::new(
        percent,
        speed,
        downloaded,
        if total > 0 { total } else { estimate },
    ))
}

fn parse_bytes(raw: &str) -> u64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u64)
        .unwrap_or(0)
}
