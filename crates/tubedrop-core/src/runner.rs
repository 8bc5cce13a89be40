use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AppError;
use crate::job::{DownloadJob, FinishedDownload, JobId, JobRecord};
use crate::progress::ProgressRecorder;
use crate::retry::StrategySelector;
use crate::throttle::JitterConfig;
use crate::traits::{Clock, FormatSpec, MediaFetcher, ProgressCallback};
use crate::workspace::{THUMBNAIL_SUFFIX, WorkspaceManager, clear_partial, find_produced_file, remove_dir};

/// Events emitted by the job runner for monitoring/logging.
#[derive(Debug, Clone)]
pub enum JobEvent<'a> {
    Started {
        job: &'a DownloadJob,
    },
    WorkspaceReady {
        job_id: &'a JobId,
        path: &'a Path,
    },
    ThumbnailSaved {
        job_id: &'a JobId,
        path: &'a Path,
    },
    ThumbnailSkipped {
        job_id: &'a JobId,
        reason: &'a str,
    },
    Finished {
        job_id: &'a JobId,
        filename: &'a str,
    },
    Failed {
        job_id: &'a JobId,
        error: &'a str,
    },
    /// The record vanished mid-run; the workspace was discarded.
    Orphaned {
        job_id: &'a JobId,
    },
}

/// Trait for receiving job events (decoupled logging).
pub trait JobReporter: Send + Sync {
    fn report(&self, event: JobEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingJobReporter;

impl JobReporter for TracingJobReporter {
    fn report(&self, event: JobEvent<'_>) {
        match event {
            JobEvent::Started { job } => {
                tracing::info!(job_id = %job.id, url = %job.url, quality = %job.quality, "Job started");
            }
            JobEvent::WorkspaceReady { job_id, path } => {
                tracing::debug!(%job_id, path = %path.display(), "Workspace ready");
            }
            JobEvent::ThumbnailSaved { job_id, path } => {
                tracing::debug!(%job_id, path = %path.display(), "Thumbnail saved");
            }
            JobEvent::ThumbnailSkipped { job_id, reason } => {
                tracing::warn!(%job_id, %reason, "Thumbnail skipped");
            }
            JobEvent::Finished { job_id, filename } => {
                tracing::info!(%job_id, %filename, "Job finished");
            }
            JobEvent::Failed { job_id, error } => {
                tracing::warn!(%job_id, %error, "Job failed");
            }
            JobEvent::Orphaned { job_id } => {
                tracing::info!(%job_id, "Job record removed mid-run, discarding workspace");
            }
        }
    }
}

/// How a single run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Finished { file: PathBuf },
    Failed { message: String },
    Orphaned,
}

/// Drives one job from `Pending` to a terminal record.
#[derive(Clone)]
pub struct JobRunner<M: MediaFetcher, C: Clock> {
    fetcher: M,
    recorder: ProgressRecorder,
    workspaces: WorkspaceManager,
    selector: StrategySelector<C>,
    clock: C,
    jitter: JitterConfig,
}

impl<M: MediaFetcher, C: Clock> JobRunner<M, C> {
    pub fn new(
        fetcher: M,
        recorder: ProgressRecorder,
        workspaces: WorkspaceManager,
        selector: StrategySelector<C>,
        clock: C,
        jitter: JitterConfig,
    ) -> Self {
        Self {
            fetcher,
            recorder,
            workspaces,
            selector,
            clock,
            jitter,
        }
    }

    /// Run the job to completion. Never returns an error: every failure ends
    /// up in the job's record.
    pub async fn run<R: JobReporter + ?Sized>(&self, job: DownloadJob, reporter: &R) -> JobOutcome {
        reporter.report(JobEvent::Started { job: &job });

        match self.execute(&job, reporter).await {
            Ok(outcome) => {
                match &outcome {
                    JobOutcome::Finished { file } => {
                        let filename = file_name(file);
                        reporter.report(JobEvent::Finished {
                            job_id: &job.id,
                            filename: &filename,
                        });
                    }
                    JobOutcome::Orphaned => {
                        reporter.report(JobEvent::Orphaned { job_id: &job.id });
                    }
                    JobOutcome::Failed { .. } => {}
                }
                outcome
            }
            Err(err) => {
                // Workspace goes first so a client that sees the error never
                // finds a stale directory. If removal fails the path stays
                // attached to the record and the age sweep reclaims both.
                if let Err(e) = remove_dir(&self.workspaces.path_for(&job.id)).await {
                    tracing::error!(
                        job_id = %job.id,
                        error = %e,
                        "Failed to remove workspace of failed job, leaving it to the age sweep"
                    );
                }

                let message = err.to_string();
                self.recorder
                    .update(&job.id, JobRecord::failed(message.clone()));
                reporter.report(JobEvent::Failed {
                    job_id: &job.id,
                    error: &message,
                });
                JobOutcome::Failed { message }
            }
        }
    }

    async fn execute<R: JobReporter + ?Sized>(
        &self,
        job: &DownloadJob,
        reporter: &R,
    ) -> Result<JobOutcome, AppError> {
        let workspace = self.workspaces.create(&job.id).await?;
        if !self.recorder.attach_workspace(&job.id, workspace.clone()) {
            return self.discard(&workspace).await;
        }
        reporter.report(JobEvent::WorkspaceReady {
            job_id: &job.id,
            path: &workspace,
        });

        if !self.recorder.update(&job.id, JobRecord::Starting) {
            return self.discard(&workspace).await;
        }

        let delay = self.jitter.pick();
        if !delay.is_zero() {
            tracing::debug!(job_id = %job.id, delay_ms = %delay.as_millis(), "Pre-flight delay");
            self.clock.sleep(delay).await;
        }

        let thumbnail_path = if job.with_thumbnail {
            match self.save_thumbnail(job, &workspace).await {
                Ok(path) => {
                    reporter.report(JobEvent::ThumbnailSaved {
                        job_id: &job.id,
                        path: &path,
                    });
                    Some(path)
                }
                Err(e) => {
                    let reason = e.to_string();
                    reporter.report(JobEvent::ThumbnailSkipped {
                        job_id: &job.id,
                        reason: &reason,
                    });
                    None
                }
            }
        } else {
            None
        };

        self.download(job, &workspace).await?;

        let file = find_produced_file(&workspace)
            .await?
            .ok_or(AppError::NoFileProduced)?;

        let finished = FinishedDownload {
            filename: file_name(&file),
            file_path: file.clone(),
            thumbnail_path,
        };
        if !self.recorder.update(&job.id, JobRecord::Finished(finished)) {
            return self.discard(&workspace).await;
        }

        Ok(JobOutcome::Finished { file })
    }

    async fn download(&self, job: &DownloadJob, workspace: &Path) -> Result<(), AppError> {
        let format = FormatSpec::from(job.quality);
        let recorder = self.recorder.clone();
        let job_id = job.id.clone();
        let on_progress: ProgressCallback = Arc::new(move |progress| {
            recorder.update(&job_id, JobRecord::Downloading(progress));
        });

        self.selector
            .run(&job.url, |profile| {
                let fetcher = self.fetcher.clone();
                let url = job.url.clone();
                let format = format.clone();
                let workspace = workspace.to_path_buf();
                let on_progress = on_progress.clone();
                async move {
                    if let Err(e) = clear_partial(&workspace).await {
                        tracing::debug!(error = %e, "Could not clear partial files");
                    }
                    fetcher
                        .download(&url, &profile, &format, &workspace, on_progress)
                        .await
                }
            })
            .await
    }

    /// Fetch metadata and store the thumbnail as `{video_id}_thumbnail.jpg`.
    async fn save_thumbnail(&self, job: &DownloadJob, workspace: &Path) -> Result<PathBuf, AppError> {
        let meta = self
            .selector
            .run(&job.url, |profile| {
                let fetcher = self.fetcher.clone();
                let url = job.url.clone();
                async move { fetcher.fetch_metadata(&url, &profile).await }
            })
            .await?;

        let thumbnail_url = meta
            .thumbnail
            .ok_or_else(|| AppError::NotFound("video has no thumbnail".to_string()))?;
        let stem = if meta.id.is_empty() {
            job.id.to_string()
        } else {
            meta.id
        };
        let dest = workspace.join(format!("{stem}{THUMBNAIL_SUFFIX}"));

        self.fetcher.fetch_thumbnail(&thumbnail_url, &dest).await?;
        Ok(dest)
    }

    async fn discard(&self, workspace: &Path) -> Result<JobOutcome, AppError> {
        remove_dir(workspace).await?;
        Ok(JobOutcome::Orphaned)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
