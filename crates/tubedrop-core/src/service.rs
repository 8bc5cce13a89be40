use std::path::PathBuf;
use std::sync::Arc;

use crate::directory::JobDirectory;
use crate::error::AppError;
use crate::janitor::{Janitor, SweepReport};
use crate::job::{DownloadJob, DownloadRequest, FinishedDownload, JobId, JobRecord, ServiceConfig};
use crate::models::{MediaMetadata, VideoInfo};
use crate::progress::ProgressRecorder;
use crate::retry::StrategySelector;
use crate::runner::{JobReporter, JobRunner, TracingJobReporter};
use crate::scheduler::ScheduledTask;
use crate::traits::{Clock, MediaFetcher};
use crate::util::validate_video_url;
use crate::workspace::{THUMBNAIL_SUFFIX, WorkspaceManager, remove_dir};

/// A thumbnail written to disk, ready to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailFile {
    pub path: PathBuf,
    /// Attachment name offered to the client.
    pub filename: String,
    /// Temporary directory holding the file, if it is not a job workspace.
    pub temp_dir: Option<PathBuf>,
}

/// Entry point for the HTTP layer and the CLI.
///
/// Owns the job directory, the runner and the janitor, and wires them to one
/// media collaborator and one clock.
#[derive(Clone)]
pub struct DownloadService<M: MediaFetcher, C: Clock> {
    config: ServiceConfig,
    fetcher: M,
    clock: C,
    directory: JobDirectory<C>,
    workspaces: WorkspaceManager,
    selector: StrategySelector<C>,
    runner: JobRunner<M, C>,
    janitor: Janitor<C>,
    reporter: Arc<dyn JobReporter>,
}

impl<M: MediaFetcher, C: Clock> DownloadService<M, C> {
    pub fn new(fetcher: M, clock: C, config: ServiceConfig) -> Self {
        let recorder = ProgressRecorder::new();
        let directory = JobDirectory::new(recorder.clone(), clock.clone());
        let workspaces = WorkspaceManager::new(config.workspace_root.clone());
        let selector = StrategySelector::new(
            config.profiles.clone(),
            config.profile_backoff,
            clock.clone(),
        );
        let runner = JobRunner::new(
            fetcher.clone(),
            recorder,
            workspaces.clone(),
            selector.clone(),
            clock.clone(),
            config.jitter,
        );
        let janitor = Janitor::new(
            directory.clone(),
            workspaces.clone(),
            clock.clone(),
            config.retention,
            config.delivery_grace,
            config.sweep_interval,
        );

        Self {
            config,
            fetcher,
            clock,
            directory,
            workspaces,
            selector,
            runner,
            janitor,
            reporter: Arc::new(TracingJobReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn JobReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn janitor(&self) -> &Janitor<C> {
        &self.janitor
    }

    /// Number of tracked job records.
    pub fn job_count(&self) -> usize {
        self.directory.recorder().len()
    }

    async fn metadata(&self, url: &str) -> Result<MediaMetadata, AppError> {
        self.selector
            .run(url, |profile| {
                let fetcher = self.fetcher.clone();
                let url = url.to_string();
                async move { fetcher.fetch_metadata(&url, &profile).await }
            })
            .await
    }

    /// Fetch and summarise metadata for a video.
    pub async fn video_info(&self, url: &str) -> Result<VideoInfo, AppError> {
        let url = validate_video_url(url)?;
        let meta = self.metadata(url).await?;
        Ok(VideoInfo::from(meta))
    }

    /// Validate the request, allocate a job and start it in the background.
    ///
    /// Expired jobs are swept first so a busy service stays bounded without
    /// waiting for the periodic loop.
    pub async fn submit(&self, request: DownloadRequest) -> Result<JobId, AppError> {
        let url = validate_video_url(&request.url)?.to_string();
        self.janitor.sweep_expired().await;

        let id = self.directory.allocate()?;
        let job = DownloadJob::new(id.clone(), DownloadRequest { url, ..request });
        tracing::info!(job_id = %id, url = %job.url, quality = %job.quality, "Download submitted");

        let runner = self.runner.clone();
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            runner.run(job, reporter.as_ref()).await;
        });

        Ok(id)
    }

    pub fn progress(&self, id: &JobId) -> JobRecord {
        self.directory.lookup(id)
    }

    /// The finished download for `id`, if its file is still on disk.
    pub async fn deliverable(&self, id: &JobId) -> Result<FinishedDownload, AppError> {
        match self.directory.lookup(id) {
            JobRecord::Finished(done) if path_exists(&done.file_path).await => Ok(done),
            _ => Err(AppError::NotFound("File not found".to_string())),
        }
    }

    /// The thumbnail stored alongside a finished download.
    pub async fn job_thumbnail(&self, id: &JobId) -> Result<ThumbnailFile, AppError> {
        let done = self.deliverable(id).await?;
        match done.thumbnail_path {
            Some(path) if path_exists(&path).await => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("{id}{THUMBNAIL_SUFFIX}"));
                Ok(ThumbnailFile {
                    path,
                    filename,
                    temp_dir: None,
                })
            }
            _ => Err(AppError::NotFound("Thumbnail not found".to_string())),
        }
    }

    /// Schedule reclamation of a job whose file has been handed out.
    pub fn mark_delivered(&self, id: &JobId) -> ScheduledTask {
        tracing::debug!(job_id = %id, "Delivery cleanup scheduled");
        self.janitor.schedule_delivery_cleanup(id.clone())
    }

    /// Download a video's thumbnail into a fresh temporary directory.
    ///
    /// The caller streams the file and then calls [`Self::release_thumbnail`].
    pub async fn thumbnail(&self, url: &str) -> Result<ThumbnailFile, AppError> {
        let url = validate_video_url(url)?;
        let meta = self.metadata(url).await?;
        let thumbnail_url = meta.thumbnail.ok_or_else(|| {
            AppError::ExtractionTerminal("Could not extract thumbnail information.".to_string())
        })?;
        let stem = if meta.id.is_empty() {
            "thumbnail".to_string()
        } else {
            meta.id
        };

        let dir = self
            .workspaces
            .create_thumbnail_dir(self.clock.now())
            .await?;
        let filename = format!("{stem}{THUMBNAIL_SUFFIX}");
        let path = dir.join(&filename);

        if let Err(e) = self.fetcher.fetch_thumbnail(&thumbnail_url, &path).await {
            tracing::warn!(%url, error = %e, "Thumbnail fetch failed");
            if let Err(e) = remove_dir(&dir).await {
                tracing::error!(path = %dir.display(), error = %e, "Failed to remove thumbnail directory");
            }
            return Err(AppError::HttpError("Failed to download thumbnail.".to_string()));
        }

        Ok(ThumbnailFile {
            path,
            filename,
            temp_dir: Some(dir),
        })
    }

    /// Schedule removal of a served thumbnail's temporary directory.
    pub fn release_thumbnail(&self, thumbnail: &ThumbnailFile) -> Option<ScheduledTask> {
        thumbnail
            .temp_dir
            .clone()
            .map(|dir| self.janitor.schedule_path_removal(dir))
    }

    /// Run one age sweep now.
    pub async fn sweep(&self) -> SweepReport {
        self.janitor.sweep_expired().await
    }
}

async fn path_exists(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::job::Quality;
    use crate::models::DownloadProgress;
    use crate::retry::ExtractionProfile;
    use crate::testutil::{ManualClock, MockFetcher, MockReporter, sample_metadata};
    use crate::throttle::JitterConfig;
    use crate::traits::{FetchError, FetchErrorKind};

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    struct Harness {
        service: DownloadService<MockFetcher, ManualClock>,
        fetcher: MockFetcher,
        clock: ManualClock,
        root: tempfile::TempDir,
    }

    fn harness(fetcher: MockFetcher) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::default();
        let config = ServiceConfig::default()
            .with_workspace_root(root.path())
            .with_jitter(JitterConfig::disabled())
            .with_profile_backoff(Duration::ZERO)
            .with_profiles(vec![
                ExtractionProfile::new("first", &["android", "web"]),
                ExtractionProfile::new("second", &["web"]),
            ]);
        let service = DownloadService::new(fetcher.clone(), clock.clone(), config)
            .with_reporter(Arc::new(MockReporter::new()));
        Harness {
            service,
            fetcher,
            clock,
            root,
        }
    }

    async fn wait_terminal(service: &DownloadService<MockFetcher, ManualClock>, id: &JobId) -> JobRecord {
        for _ in 0..200 {
            let record = service.progress(id);
            if record.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish: {:?}", service.progress(id));
    }

    #[tokio::test]
    async fn video_info_summarises_metadata() {
        let h = harness(MockFetcher::new().with_metadata(Ok(sample_metadata())));
        let info = h.service.video_info(URL).await.unwrap();
        assert_eq!(info.title, "Mock Video");
        assert_eq!(info.video_id, "dQw4w9WgXcQ");
        assert_eq!(info.available_qualities[0].height, 1080);
    }

    #[tokio::test]
    async fn video_info_rejects_bad_url_before_fetching() {
        let h = harness(MockFetcher::new());
        let err = h.service.video_info("https://example.com").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(h.fetcher.metadata_calls(), 0);
    }

    #[tokio::test]
    async fn video_info_translates_terminal_failure() {
        let h = harness(MockFetcher::new().with_metadata(Err(FetchError::from_message(
            "ERROR: [youtube] dQw4w9WgXcQ: Sign in to confirm you're not a bot",
        ))));
        let err = h.service.video_info(URL).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "YouTube is blocking requests. Please try again later."
        );
        assert_eq!(h.fetcher.metadata_calls(), 1);
    }

    #[tokio::test]
    async fn submit_runs_job_to_completion() {
        let h = harness(MockFetcher::new());
        let id = h
            .service
            .submit(DownloadRequest::new(URL, Quality::High))
            .await
            .unwrap();

        let JobRecord::Finished(done) = wait_terminal(&h.service, &id).await else {
            panic!("job failed");
        };
        assert!(done.file_path.starts_with(h.root.path()));
        let delivered = h.service.deliverable(&id).await.unwrap();
        assert_eq!(delivered.filename, "Mock Video.mp4");
    }

    #[tokio::test]
    async fn submit_rejects_invalid_url_without_allocating() {
        let h = harness(MockFetcher::new());
        let err = h
            .service
            .submit(DownloadRequest::new("not a url", Quality::Best))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(h.service.job_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_jobs_keep_separate_records() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let h = harness(
            MockFetcher::new()
                .with_progress(vec![DownloadProgress::new("10.0%", "1.00MiB/s", 10, 100)])
                .with_gate(gate.clone()),
        );

        let first = h
            .service
            .submit(DownloadRequest::new(URL, Quality::Medium))
            .await
            .unwrap();
        let second = h
            .service
            .submit(DownloadRequest::new("https://youtu.be/9bZkp7rhQdE", Quality::Low))
            .await
            .unwrap();
        assert_ne!(first, second);

        for id in [&first, &second] {
            assert!(matches!(
                h.service.progress(id),
                JobRecord::Pending | JobRecord::Starting | JobRecord::Downloading(_)
            ));
        }

        for _ in 0..200 {
            let both = [&first, &second]
                .iter()
                .all(|id| matches!(h.service.progress(id), JobRecord::Downloading(_)));
            if both {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        gate.notify_waiters();

        for id in [&first, &second] {
            let JobRecord::Finished(done) = wait_terminal(&h.service, id).await else {
                panic!("job {id} failed");
            };
            assert!(done.file_path.starts_with(h.root.path().join(format!("ytdl_{id}"))));
        }
    }

    #[tokio::test]
    async fn deliverable_requires_finished_job() {
        let h = harness(MockFetcher::new().with_download_results(vec![Err(FetchError::new(
            FetchErrorKind::Unavailable,
            "ERROR: Video unavailable",
        ))]));
        let id = h
            .service
            .submit(DownloadRequest::new(URL, Quality::Best))
            .await
            .unwrap();

        assert_eq!(
            wait_terminal(&h.service, &id).await,
            JobRecord::failed("This video is not available for download.")
        );
        assert!(matches!(
            h.service.deliverable(&id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.service.deliverable(&JobId::from("nope")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mark_delivered_reclaims_after_grace() {
        let h = harness(MockFetcher::new());
        let id = h
            .service
            .submit(DownloadRequest::new(URL, Quality::Best))
            .await
            .unwrap();
        let JobRecord::Finished(done) = wait_terminal(&h.service, &id).await else {
            panic!("job failed");
        };

        let task = h.service.mark_delivered(&id);
        h.clock.wait_for_sleepers(1).await;
        h.clock.advance(Duration::from_secs(10));
        task.join().await;

        assert_eq!(h.service.progress(&id), JobRecord::NotFound);
        assert!(!done.file_path.exists());
    }

    #[tokio::test]
    async fn submit_sweeps_expired_jobs() {
        let h = harness(MockFetcher::new());
        let old = h
            .service
            .submit(DownloadRequest::new(URL, Quality::Best))
            .await
            .unwrap();
        wait_terminal(&h.service, &old).await;

        h.clock.advance(Duration::from_secs(3601));
        h.service
            .submit(DownloadRequest::new(URL, Quality::Best))
            .await
            .unwrap();

        assert_eq!(h.service.progress(&old), JobRecord::NotFound);
        assert!(!h.root.path().join(format!("ytdl_{old}")).exists());
    }

    #[tokio::test]
    async fn job_thumbnail_served_from_workspace() {
        let h = harness(MockFetcher::new().with_metadata(Ok(sample_metadata())));
        let id = h
            .service
            .submit(DownloadRequest::new(URL, Quality::Best).with_thumbnail(true))
            .await
            .unwrap();
        wait_terminal(&h.service, &id).await;

        let thumb = h.service.job_thumbnail(&id).await.unwrap();
        assert_eq!(thumb.filename, "dQw4w9WgXcQ_thumbnail.jpg");
        assert_eq!(thumb.temp_dir, None);
        assert!(h.service.release_thumbnail(&thumb).is_none());
    }

    #[tokio::test]
    async fn standalone_thumbnail_uses_temp_dir() {
        let h = harness(MockFetcher::new().with_metadata(Ok(sample_metadata())));
        let thumb = h.service.thumbnail(URL).await.unwrap();

        assert_eq!(thumb.filename, "dQw4w9WgXcQ_thumbnail.jpg");
        assert!(thumb.path.exists());
        let dir = thumb.temp_dir.clone().unwrap();
        assert!(
            dir.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("thumbnail_")
        );
        assert_eq!(
            h.fetcher.thumbnail_urls(),
            vec!["https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg"]
        );

        let task = h.service.release_thumbnail(&thumb).unwrap();
        h.clock.wait_for_sleepers(1).await;
        h.clock.advance(Duration::from_secs(10));
        task.join().await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn standalone_thumbnail_failure_cleans_up() {
        let h = harness(
            MockFetcher::new()
                .with_metadata(Ok(sample_metadata()))
                .with_thumbnail_error(FetchError::new(FetchErrorKind::Unknown, "timeout")),
        );
        let err = h.service.thumbnail(URL).await.unwrap_err();
        assert!(matches!(err, AppError::HttpError(_)));

        let leftovers = std::fs::read_dir(h.root.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn standalone_thumbnail_without_url() {
        let mut meta = sample_metadata();
        meta.thumbnail = None;
        let h = harness(MockFetcher::new().with_metadata(Ok(meta)));

        let err = h.service.thumbnail(URL).await.unwrap_err();
        assert!(matches!(err, AppError::ExtractionTerminal(_)));
    }
}
