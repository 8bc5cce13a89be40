use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tubedrop_client::{YtDlpConfig, YtDlpFetcher};
use tubedrop_core::{
    DownloadRequest, DownloadService, JitterConfig, JobId, JobRecord, Quality, ServiceConfig,
    SystemClock, VideoInfo,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "tubedrop", version, about = "Download YouTube videos through yt-dlp")]
struct Cli {
    /// Path to the yt-dlp executable
    #[arg(long, global = true, env = "TUBEDROP_YTDLP_PATH", default_value = "yt-dlp")]
    ytdlp_path: PathBuf,

    /// Directory for temporary job workspaces (defaults to the system temp dir)
    #[arg(long, global = true, env = "TUBEDROP_WORKSPACE_DIR")]
    workspace_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show title, duration and available qualities of a video
    Info {
        /// Video URL
        #[arg(short, long)]
        url: String,

        /// Print the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Download a video into a directory
    Download {
        /// Video URL
        #[arg(short, long)]
        url: String,

        /// Quality tier: best, high, medium, low or audio_only
        #[arg(short, long, default_value = "best")]
        quality: Quality,

        /// Also save the video thumbnail
        #[arg(long, default_value_t = false)]
        thumbnail: bool,

        /// Destination directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so `info --json` stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tubedrop_core=warn,tubedrop_client=warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let fetcher = YtDlpFetcher::new(YtDlpConfig::default().with_binary(cli.ytdlp_path.clone()))
        .context("Failed to set up yt-dlp")?;
    let service = DownloadService::new(fetcher, SystemClock, service_config(&cli));

    match cli.command {
        Commands::Info { url, json } => {
            let info = service.video_info(&url).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_info(&info);
            }
        }
        Commands::Download {
            url,
            quality,
            thumbnail,
            output,
        } => {
            let request = DownloadRequest::new(url, quality).with_thumbnail(thumbnail);
            cmd_download(&service, request, &output).await?;
        }
    }

    Ok(())
}

/// One-shot runs have nobody polling after delivery, so the workspace is
/// reclaimed right away.
fn service_config(cli: &Cli) -> ServiceConfig {
    let mut config = ServiceConfig::default()
        .with_jitter(JitterConfig::disabled())
        .with_delivery_grace(Duration::ZERO);
    if let Some(dir) = &cli.workspace_dir {
        config = config.with_workspace_root(dir.clone());
    }
    config
}

fn print_info(info: &VideoInfo) {
    println!("{}", info.title);
    println!("  id:       {}", info.video_id);
    println!("  uploader: {}", info.uploader);
    println!("  duration: {}", format_duration(info.duration));
    println!("  views:    {}", info.view_count);
    if info.available_qualities.is_empty() {
        println!("  qualities: none listed");
        return;
    }
    println!("  qualities:");
    for option in &info.available_qualities {
        println!(
            "    {:>5}p  {:<5} {:>10}  (format {})",
            option.height,
            option.ext,
            format_size(option.filesize),
            option.format_id
        );
    }
}

async fn cmd_download(
    service: &DownloadService<YtDlpFetcher, SystemClock>,
    request: DownloadRequest,
    output: &Path,
) -> Result<()> {
    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    let id = service.submit(request).await?;
    tracing::info!(job_id = %id, "Download started");

    let done = loop {
        match service.progress(&id) {
            JobRecord::Finished(done) => break done,
            JobRecord::Failed { message } => anyhow::bail!(message),
            JobRecord::NotFound => anyhow::bail!("Download {id} disappeared before finishing"),
            JobRecord::Downloading(p) => {
                eprint!("\r{:>7} at {:<14}", p.percent.trim(), p.speed.trim());
            }
            JobRecord::Pending | JobRecord::Starting => {}
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    eprintln!();

    let target = output.join(&done.filename);
    tokio::fs::copy(&done.file_path, &target)
        .await
        .with_context(|| format!("Failed to copy {} to {}", done.filename, output.display()))?;
    println!("{}", target.display());

    if let Some(thumbnail) = &done.thumbnail_path {
        if let Some(name) = thumbnail.file_name() {
            let target = output.join(name);
            match tokio::fs::copy(thumbnail, &target).await {
                Ok(_) => println!("{}", target.display()),
                Err(e) => tracing::warn!(error = %e, "Failed to copy thumbnail"),
            }
        }
    }

    reclaim(service, &id).await;
    Ok(())
}

async fn reclaim(service: &DownloadService<YtDlpFetcher, SystemClock>, id: &JobId) {
    service.mark_delivered(id).join().await;
}

fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "?".to_string();
    }
    let mib = bytes as f64 / (1024.0 * 1024.0);
    format!("{mib:.1} MiB")
}
