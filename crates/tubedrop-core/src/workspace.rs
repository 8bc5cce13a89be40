//! Per-job scratch directories.
//!
//! Every job downloads into its own directory, `ytdl_{job_id}`, under the
//! configured root. Standalone thumbnail fetches use `thumbnail_{secs}_{suffix}`.
//! Both names start with a unix timestamp so stale directories left behind by
//! a crash can be reclaimed by age alone.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{JobId, parse_stamp};

pub const JOB_DIR_PREFIX: &str = "ytdl_";
pub const THUMBNAIL_DIR_PREFIX: &str = "thumbnail_";
/// Suffix of the thumbnail a job stores next to its media file.
pub const THUMBNAIL_SUFFIX: &str = "_thumbnail.jpg";

const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

/// Creates, scans and removes workspace directories under one root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &JobId) -> PathBuf {
        self.root.join(format!("{JOB_DIR_PREFIX}{id}"))
    }

    /// Create the job's workspace directory.
    pub async fn create(&self, id: &JobId) -> Result<PathBuf, AppError> {
        let path = self.path_for(id);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::workspace("create workspace root", e))?;
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| AppError::workspace("create job workspace", e))?;
        Ok(path)
    }

    /// Create a fresh directory for a standalone thumbnail fetch.
    pub async fn create_thumbnail_dir(&self, now: DateTime<Utc>) -> Result<PathBuf, AppError> {
        let suffix = Uuid::new_v4().simple().to_string();
        let path = self.root.join(format!(
            "{THUMBNAIL_DIR_PREFIX}{}_{}",
            now.timestamp(),
            &suffix[..8]
        ));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| AppError::workspace("create thumbnail directory", e))?;
        Ok(path)
    }

    /// Workspace directories under the root older than `retention`.
    ///
    /// Only names carrying one of the known prefixes and a parseable
    /// timestamp are considered.
    pub async fn stale_dirs(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Vec<PathBuf>, AppError> {
        let retention = TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);
        let mut stale = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stale),
            Err(e) => return Err(AppError::workspace("scan workspace root", e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::workspace("scan workspace root", e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stamp) = name
                .strip_prefix(JOB_DIR_PREFIX)
                .or_else(|| name.strip_prefix(THUMBNAIL_DIR_PREFIX))
                .and_then(parse_stamp)
            else {
                continue;
            };
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if is_dir && now.signed_duration_since(stamp) > retention {
                stale.push(entry.path());
            }
        }

        Ok(stale)
    }
}

/// Recursively delete `path`. A missing directory counts as success.
pub async fn remove_dir(path: &Path) -> Result<(), AppError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::workspace("remove workspace", e)),
    }
}

fn is_candidate(name: &str) -> bool {
    !(name.starts_with('.')
        || name.ends_with(THUMBNAIL_SUFFIX)
        || name.contains(".part-Frag")
        || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)))
}

/// Locate the media file the collaborator produced in `dir`.
///
/// Hidden files, partial downloads and the job thumbnail are ignored. If more
/// than one candidate remains, the most recently modified wins, ties going to
/// the lexicographically smallest name.
pub async fn find_produced_file(dir: &Path) -> Result<Option<PathBuf>, AppError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AppError::workspace("scan job workspace", e))?;

    let mut best: Option<(SystemTime, String, PathBuf)> = None;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::workspace("scan job workspace", e))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_candidate(&name) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        let replace = match &best {
            None => true,
            Some((best_time, best_name, _)) => {
                modified > *best_time || (modified == *best_time && name < *best_name)
            }
        };
        if replace {
            best = Some((modified, name, entry.path()));
        }
    }

    Ok(best.map(|(_, _, path)| path))
}

/// Delete partial-download leftovers so the next profile starts clean.
pub async fn clear_partial(dir: &Path) -> Result<(), AppError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AppError::workspace("scan job workspace", e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::workspace("scan job workspace", e))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let partial = name.contains(".part-Frag")
            || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s));
        if partial {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::debug!(file = %name, error = %e, "Failed to remove partial file");
            }
        }
    }
    Ok(())
}
