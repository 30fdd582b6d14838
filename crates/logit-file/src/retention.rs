//! Backup discovery and retention

use crate::backup::{Backup, BackupNaming};
use crate::Result;
use chrono::{DateTime, Utc};
use std::fs::DirEntry;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How many backups to keep, and for how long. Zero disables an axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_backups: usize,
}

impl RetentionPolicy {
    pub fn new(max_age: Duration, max_backups: usize) -> Self {
        Self {
            max_age,
            max_backups,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.max_age.is_zero() && self.max_backups == 0
    }

    /// Backups taken strictly before this instant are expired
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.max_age.is_zero() {
            return None;
        }
        chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
    }
}

/// Which backups a retention pass removes and which it keeps, oldest first
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrunePlan {
    /// Expired backups followed by the excess ones
    pub delete: Vec<Backup>,
    pub keep: Vec<Backup>,
    /// Leading entries of `delete` selected by age
    pub expired: usize,
}

/// A backup that could not be removed
#[derive(Debug)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub error: io::Error,
}

/// Outcome of a retention pass
#[derive(Debug, Default)]
pub struct PruneReport {
    pub removed_by_age: usize,
    pub removed_by_count: usize,
    pub removed: Vec<PathBuf>,
    pub kept: usize,
    pub failures: Vec<PruneFailure>,
}

impl PruneReport {
    pub fn total_removed(&self) -> usize {
        self.removed_by_age + self.removed_by_count
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Find the backups of `active_path`, oldest first.
///
/// Names that do not parse with the naming's time format are skipped, as are
/// directories, the active file itself and entries that cannot be read.
pub fn list_backups(active_path: &Path, naming: &BackupNaming) -> Result<Vec<Backup>> {
    if !naming.dir().exists() {
        return Ok(Vec::new());
    }

    let mut backups: Vec<Backup> = std::fs::read_dir(naming.dir())?
        .filter_map(|entry| backup_from_entry(entry, active_path, naming))
        .collect();

    backups.sort();
    Ok(backups)
}

/// A single unreadable entry, e.g. one removed mid-scan, is skipped
fn backup_from_entry(
    entry: io::Result<DirEntry>,
    active_path: &Path,
    naming: &BackupNaming,
) -> Option<Backup> {
    let entry = entry.ok()?;
    if !entry.file_type().ok()?.is_file() {
        return None;
    }

    let path = entry.path();
    if path.file_name() == active_path.file_name() {
        return None;
    }

    naming.describe(&path)
}

/// Decide which backups to delete.
///
/// Age axis: everything older than `now - max_age`. Count axis: the oldest
/// survivors beyond `max_backups`. The plan deletes the union of both.
pub fn plan_prune(mut backups: Vec<Backup>, now: DateTime<Utc>, policy: &RetentionPolicy) -> PrunePlan {
    backups.sort();

    let cutoff = policy.cutoff(now);
    let (mut delete, mut keep): (Vec<Backup>, Vec<Backup>) = backups
        .into_iter()
        .partition(|backup| cutoff.is_some_and(|cutoff| backup.is_before(cutoff)));
    let expired = delete.len();

    if policy.max_backups > 0 && keep.len() > policy.max_backups {
        let excess = keep.len() - policy.max_backups;
        delete.extend(keep.drain(..excess));
    }

    PrunePlan {
        delete,
        keep,
        expired,
    }
}

/// Delete the files a plan selects, collecting failures instead of stopping.
pub fn execute_plan(plan: &PrunePlan) -> PruneReport {
    let mut report = PruneReport {
        kept: plan.keep.len(),
        ..PruneReport::default()
    };

    for (index, backup) in plan.delete.iter().enumerate() {
        match std::fs::remove_file(&backup.path) {
            Ok(()) => {
                if index < plan.expired {
                    report.removed_by_age += 1;
                } else {
                    report.removed_by_count += 1;
                }
                report.removed.push(backup.path.clone());
            }
            Err(error) => report.failures.push(PruneFailure {
                path: backup.path.clone(),
                error,
            }),
        }
    }

    report
}

/// Scan, plan and delete in one pass
pub fn prune(
    active_path: &Path,
    naming: &BackupNaming,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<PruneReport> {
    if policy.is_disabled() {
        return Ok(PruneReport::default());
    }

    let backups = list_backups(active_path, naming)?;
    Ok(execute_plan(&plan_prune(backups, now, policy)))
}
