//! Backup file naming and descriptors.
//!
//! A backup of `dir/app.log` is named `dir/app.<time>.log`, where `<time>` is
//! the roll time rendered with the configured strftime pattern. When that name
//! is already taken a numeric suffix is appended: `dir/app.<time>.<n>.log`.

use crate::config::validate_time_format;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Separator between the file stem, the timestamp and the collision suffix
pub const BACKUP_SEPARATOR: char = '.';

/// A rotated log file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    /// Collision suffix, 0 when the name has none
    pub sequence: u32,
}

impl Backup {
    /// True if this backup was taken strictly before `t`
    pub fn is_before(&self, t: DateTime<Utc>) -> bool {
        self.timestamp < t
    }
}

impl Ord for Backup {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.sequence.cmp(&other.sequence))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for Backup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Naming scheme for the backups of one active file
#[derive(Debug, Clone)]
pub struct BackupNaming {
    dir: PathBuf,
    prefix: String,
    ext: String,
    time_format: String,
}

impl BackupNaming {
    /// Naming for the backups of `active_path`, rejecting unusable time formats
    pub fn new(active_path: &Path, time_format: impl Into<String>) -> Result<Self> {
        let time_format = time_format.into();
        validate_time_format(&time_format)?;

        let file_name = active_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::config(format!(
                    "log file path '{}' has no UTF-8 file name",
                    active_path.display()
                ))
            })?;

        let (prefix, ext) = prefix_and_ext(file_name);
        let dir = match active_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self {
            dir,
            prefix,
            ext,
            time_format,
        })
    }

    /// Directory holding the active file and its backups
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem plus separator, e.g. `app.`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Original extension including its dot, e.g. `.log`; empty if none
    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// strftime pattern rendered into each backup name
    pub fn time_format(&self) -> &str {
        &self.time_format
    }

    /// Backup file name for a roll at `now`, with an optional collision suffix
    pub fn file_name(&self, now: DateTime<Utc>, suffix: Option<u32>) -> String {
        let time = now.format(&self.time_format);
        match suffix {
            Some(n) => format!(
                "{}{}{}{}{}",
                self.prefix, time, BACKUP_SEPARATOR, n, self.ext
            ),
            None => format!("{}{}{}", self.prefix, time, self.ext),
        }
    }

    /// Backup path for a roll at `now`.
    ///
    /// Uses the bare timestamped name when no backup for that time exists yet.
    /// Otherwise the suffix is one past the highest suffix already on disk for
    /// the same time (at least `sequence`, at least 1), so a later roll always
    /// sorts after every earlier one even when older slots have been pruned.
    pub fn backup_path(&self, now: DateTime<Utc>, sequence: u32) -> PathBuf {
        let time = now.format(&self.time_format).to_string();
        let bare = self.dir.join(self.file_name(now, None));

        let mut n = match self.highest_suffix(&time) {
            Some(highest) => highest.saturating_add(1).max(sequence).max(1),
            None if !exists(&bare) => return bare,
            None => sequence.max(1),
        };
        loop {
            let candidate = self.dir.join(self.file_name(now, Some(n)));
            if !exists(&candidate) {
                return candidate;
            }
            n = n.wrapping_add(1).max(1);
        }
    }

    /// Highest collision suffix among backups named for `time`, 0 for the bare
    /// name. `None` when there are none or the directory cannot be read.
    fn highest_suffix(&self, time: &str) -> Option<u32> {
        let stem = format!("{}{}", self.prefix, time);
        let entries = std::fs::read_dir(&self.dir).ok()?;

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let middle = name.to_str()?.strip_prefix(stem.as_str())?.strip_suffix(self.ext.as_str())?;
                if middle.is_empty() {
                    return Some(0);
                }
                let suffix = middle.strip_prefix(BACKUP_SEPARATOR)?;
                if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                suffix.parse().ok()
            })
            .max()
    }

    /// Parse a directory entry name back into `(timestamp, sequence)`.
    ///
    /// Returns `None` for names that are not backups of this file.
    pub fn parse(&self, file_name: &str) -> Option<(DateTime<Utc>, u32)> {
        let middle = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.ext.as_str())?;
        if middle.is_empty() {
            return None;
        }

        if let Some(timestamp) = parse_timestamp(middle, &self.time_format) {
            return Some((timestamp, 0));
        }

        let (time, suffix) = middle.rsplit_once(BACKUP_SEPARATOR)?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let sequence = suffix.parse().ok()?;
        parse_timestamp(time, &self.time_format).map(|timestamp| (timestamp, sequence))
    }

    /// Build a descriptor for `path` if it is a backup of this file
    pub fn describe(&self, path: &Path) -> Option<Backup> {
        let name = path.file_name()?.to_str()?;
        let (timestamp, sequence) = self.parse(name)?;
        Some(Backup {
            path: path.to_path_buf(),
            timestamp,
            sequence,
        })
    }
}

/// Parse `s` with `time_format`, accepting date-only patterns as midnight UTC.
pub(crate) fn parse_timestamp(s: &str, time_format: &str) -> Option<DateTime<Utc>> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(s, time_format) {
        return Some(Utc.from_utc_datetime(&datetime));
    }

    NaiveDate::parse_from_str(s, time_format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| Utc.from_utc_datetime(&datetime))
}

fn prefix_and_ext(file_name: &str) -> (String, String) {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!("{}{}", BACKUP_SEPARATOR, ext))
        .unwrap_or_default();
    let stem = &file_name[..file_name.len() - ext.len()];
    (format!("{}{}", stem, BACKUP_SEPARATOR), ext)
}

fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
