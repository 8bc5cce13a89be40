//! Shared progress store.
//!
//! One entry per live job, written by the job runner and read by pollers.
//! Terminal records are never overwritten and writes to removed entries are
//! dropped, so a late progress callback cannot resurrect a reclaimed job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::job::{JobId, JobRecord};

/// Stored state for one job.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub record: JobRecord,
    /// Workspace directory, once the runner has created it.
    pub workspace: Option<PathBuf>,
}

/// Concurrent map of job id to [`JobEntry`].
#[derive(Clone, Default)]
pub struct ProgressRecorder {
    entries: Arc<RwLock<HashMap<JobId, JobEntry>>>,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Insert a `Pending` record. Returns false if the id is already taken.
    pub fn insert_pending(&self, id: &JobId) -> bool {
        let mut entries = self.write();
        if entries.contains_key(id) {
            return false;
        }
        entries.insert(
            id.clone(),
            JobEntry {
                record: JobRecord::Pending,
                workspace: None,
            },
        );
        true
    }

    /// Current record, `NotFound` for unknown ids.
    pub fn get(&self, id: &JobId) -> JobRecord {
        self.read()
            .get(id)
            .map(|entry| entry.record.clone())
            .unwrap_or(JobRecord::NotFound)
    }

    pub fn entry(&self, id: &JobId) -> Option<JobEntry> {
        self.read().get(id).cloned()
    }

    /// Replace the record of a live, non-terminal job.
    ///
    /// Returns false (and changes nothing) when the job is gone or already
    /// terminal.
    pub fn update(&self, id: &JobId, record: JobRecord) -> bool {
        let mut entries = self.write();
        match entries.get_mut(id) {
            Some(entry) if !entry.record.is_terminal() => {
                entry.record = record;
                true
            }
            Some(_) => {
                tracing::debug!(job_id = %id, "Dropping write to terminal record");
                false
            }
            None => {
                tracing::debug!(job_id = %id, "Dropping write to removed record");
                false
            }
        }
    }

    /// Remember the job's workspace directory. Returns false if the job is gone.
    pub fn attach_workspace(&self, id: &JobId, workspace: PathBuf) -> bool {
        match self.write().get_mut(id) {
            Some(entry) => {
                entry.workspace = Some(workspace);
                true
            }
            None => false,
        }
    }

    /// Remove the entry, returning what was stored.
    pub fn remove(&self, id: &JobId) -> Option<JobEntry> {
        self.write().remove(id)
    }

    /// Ids whose embedded creation time is older than `retention`.
    pub fn expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<JobId> {
        self.read()
            .keys()
            .filter(|id| id.is_expired(now, retention))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
