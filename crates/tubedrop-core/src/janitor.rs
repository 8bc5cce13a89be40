//! Reclamation of job records and workspaces.
//!
//! Two triggers free resources:
//!
//! - delivery: a short grace period after a file is handed to the client,
//!   the job's record and workspace are deleted;
//! - age: on every submission and on a fixed interval, records and
//!   workspace directories older than the retention window are deleted,
//!   whatever their state.
//!
//! Records are always deleted before their workspace so a poller never sees
//! `Finished` pointing at a missing file.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::directory::JobDirectory;
use crate::job::JobId;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::traits::Clock;
use crate::workspace::{WorkspaceManager, remove_dir};

/// What a sweep reclaimed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub records: usize,
    pub directories: usize,
}

#[derive(Clone)]
pub struct Janitor<C: Clock> {
    directory: JobDirectory<C>,
    workspaces: WorkspaceManager,
    scheduler: Scheduler<C>,
    clock: C,
    retention: Duration,
    grace: Duration,
    interval: Duration,
}

impl<C: Clock> Janitor<C> {
    pub fn new(
        directory: JobDirectory<C>,
        workspaces: WorkspaceManager,
        clock: C,
        retention: Duration,
        grace: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            directory,
            workspaces,
            scheduler: Scheduler::new(clock.clone()),
            clock,
            retention,
            grace,
            interval,
        }
    }

    /// Delete every record and workspace older than the retention window.
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for id in self.directory.recorder().expired(now, self.retention) {
            let Some(entry) = self.directory.delete(&id) else {
                continue;
            };
            report.records += 1;
            if let Some(workspace) = entry.workspace {
                if let Err(e) = remove_dir(&workspace).await {
                    tracing::error!(job_id = %id, error = %e, "Failed to remove expired workspace");
                }
            }
        }

        match self.workspaces.stale_dirs(now, self.retention).await {
            Ok(dirs) => {
                for dir in dirs {
                    match remove_dir(&dir).await {
                        Ok(()) => report.directories += 1,
                        Err(e) => {
                            tracing::error!(path = %dir.display(), error = %e, "Failed to remove stale directory");
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Workspace scan failed"),
        }

        if report.records > 0 || report.directories > 0 {
            tracing::info!(
                records = report.records,
                directories = report.directories,
                "Reclaimed expired jobs"
            );
        }
        report
    }

    /// Delete the job's record and workspace once the grace period elapses.
    pub fn schedule_delivery_cleanup(&self, id: JobId) -> ScheduledTask {
        let directory = self.directory.clone();
        let fallback = self.workspaces.path_for(&id);

        self.scheduler.schedule(self.grace, async move {
            let workspace = directory
                .delete(&id)
                .and_then(|entry| entry.workspace)
                .unwrap_or(fallback);
            match remove_dir(&workspace).await {
                Ok(()) => tracing::debug!(job_id = %id, "Delivered job reclaimed"),
                Err(e) => tracing::error!(job_id = %id, error = %e, "Failed to remove delivered workspace"),
            }
        })
    }

    /// Remove `path` once the grace period elapses.
    pub fn schedule_path_removal(&self, path: PathBuf) -> ScheduledTask {
        self.scheduler.schedule(self.grace, async move {
            if let Err(e) = remove_dir(&path).await {
                tracing::error!(path = %path.display(), error = %e, "Failed to remove directory");
            }
        })
    }

    /// Sweep on a fixed interval until cancelled.
    pub async fn run(&self, cancel_token: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Janitor started");
        loop {
            tokio::select! {
                () = self.clock.sleep(self.interval) => {
                    self.sweep_expired().await;
                }
                () = cancel_token.cancelled() => break,
            }
        }
        tracing::info!("Janitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;
    use crate::job::JobRecord;
    use crate::progress::ProgressRecorder;
    use crate::testutil::ManualClock;

    struct Harness {
        janitor: Janitor<ManualClock>,
        directory: JobDirectory<ManualClock>,
        workspaces: WorkspaceManager,
        clock: ManualClock,
        _root: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let directory = JobDirectory::new(ProgressRecorder::new(), clock.clone());
        let workspaces = WorkspaceManager::new(root.path());
        let janitor = Janitor::new(
            directory.clone(),
            workspaces.clone(),
            clock.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(10),
            Duration::from_secs(300),
        );
        Harness {
            janitor,
            directory,
            workspaces,
            clock,
            _root: root,
        }
    }

    async fn job_with_workspace(h: &Harness) -> (JobId, PathBuf) {
        let id = h.directory.allocate().unwrap();
        let path = h.workspaces.create(&id).await.unwrap();
        h.directory.recorder().attach_workspace(&id, path.clone());
        (id, path)
    }

    #[tokio::test]
    async fn sweep_keeps_young_jobs() {
        let h = harness();
        let (id, path) = job_with_workspace(&h).await;

        h.clock.advance(Duration::from_secs(3600));
        let report = h.janitor.sweep_expired().await;

        assert_eq!(report, SweepReport::default());
        assert_eq!(h.directory.lookup(&id), JobRecord::Pending);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_jobs_in_any_state() {
        let h = harness();
        let (pending, pending_path) = job_with_workspace(&h).await;
        let (failed, failed_path) = job_with_workspace(&h).await;
        h.directory
            .recorder()
            .update(&failed, JobRecord::failed("boom"));

        h.clock.advance(Duration::from_secs(3601));
        let report = h.janitor.sweep_expired().await;

        assert_eq!(report.records, 2);
        assert_eq!(h.directory.lookup(&pending), JobRecord::NotFound);
        assert_eq!(h.directory.lookup(&failed), JobRecord::NotFound);
        assert!(!pending_path.exists());
        assert!(!failed_path.exists());
    }

    #[tokio::test]
    async fn sweep_reclaims_orphan_directories() {
        let h = harness();
        let orphan = h.workspaces.root().join("ytdl_1699990000_deadbeef");
        let thumb = h.workspaces.root().join("thumbnail_1699990000_cafebabe");
        fs::create_dir(&orphan).unwrap();
        fs::create_dir(&thumb).unwrap();
        fs::write(orphan.join("video.mp4"), b"data").unwrap();

        let report = h.janitor.sweep_expired().await;

        assert_eq!(report.directories, 2);
        assert!(!orphan.exists());
        assert!(!thumb.exists());
    }

    #[tokio::test]
    async fn delivery_cleanup_waits_for_grace() {
        let h = harness();
        let (id, path) = job_with_workspace(&h).await;

        let task = h.janitor.schedule_delivery_cleanup(id.clone());
        h.clock.wait_for_sleepers(1).await;
        h.clock.advance(Duration::from_secs(5));
        tokio::task::yield_now().await;
        assert!(path.exists());
        assert_eq!(h.directory.lookup(&id), JobRecord::Pending);

        h.clock.advance(Duration::from_secs(5));
        task.join().await;
        assert!(!path.exists());
        assert_eq!(h.directory.lookup(&id), JobRecord::NotFound);
    }

    #[tokio::test]
    async fn delivery_cleanup_tolerates_missing_record() {
        let h = harness();
        let (id, path) = job_with_workspace(&h).await;
        h.directory.delete(&id);

        let task = h.janitor.schedule_delivery_cleanup(id);
        h.clock.wait_for_sleepers(1).await;
        h.clock.advance(Duration::from_secs(10));
        task.join().await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn path_removal_after_grace() {
        let h = harness();
        let dir = h
            .workspaces
            .create_thumbnail_dir(h.clock.now())
            .await
            .unwrap();

        let task = h.janitor.schedule_path_removal(dir.clone());
        h.clock.wait_for_sleepers(1).await;
        h.clock.advance(Duration::from_secs(10));
        task.join().await;

        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn run_loop_sweeps_and_stops_on_cancel() {
        let h = harness();
        let (id, _) = job_with_workspace(&h).await;
        let token = CancellationToken::new();

        let janitor = h.janitor.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { janitor.run(loop_token).await });

        h.clock.wait_for_sleepers(1).await;
        h.clock.advance(Duration::from_secs(3601));

        for _ in 0..200 {
            if h.directory.lookup(&id) == JobRecord::NotFound {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.directory.lookup(&id), JobRecord::NotFound);

        token.cancel();
        handle.await.unwrap();
    }
}
