use crate::error::AppError;
use crate::job::{JobId, JobRecord};
use crate::progress::{JobEntry, ProgressRecorder};
use crate::traits::Clock;

const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// Allocates job identifiers and owns the lifecycle of their records.
#[derive(Clone)]
pub struct JobDirectory<C: Clock> {
    recorder: ProgressRecorder,
    clock: C,
}

impl<C: Clock> JobDirectory<C> {
    pub fn new(recorder: ProgressRecorder, clock: C) -> Self {
        Self { recorder, clock }
    }

    pub fn recorder(&self) -> &ProgressRecorder {
        &self.recorder
    }

    /// Allocate a fresh id and register it as `Pending`.
    ///
    /// Collisions with live ids are retried with a new suffix.
    pub fn allocate(&self) -> Result<JobId, AppError> {
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let id = JobId::generate(self.clock.now());
            if self.recorder.insert_pending(&id) {
                tracing::debug!(job_id = %id, "Allocated job id");
                return Ok(id);
            }
            tracing::warn!(job_id = %id, "Job id collision, regenerating");
        }
        Err(AppError::Generic(
            "could not allocate a unique job id".to_string(),
        ))
    }

    pub fn lookup(&self, id: &JobId) -> JobRecord {
        self.recorder.get(id)
    }

    /// Drop the record. Deleting an unknown id is a no-op.
    pub fn delete(&self, id: &JobId) -> Option<JobEntry> {
        let removed = self.recorder.remove(id);
        if removed.is_some() {
            tracing::debug!(job_id = %id, "Deleted job record");
        }
        removed
    }
}
