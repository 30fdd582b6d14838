//! Rolling file configuration

use crate::backup::{parse_timestamp, BACKUP_SEPARATOR};
use crate::{Error, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{TimeZone, Utc};
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const DAY: u64 = 24 * 60 * 60;

/// Mode bits for newly created log files (rw-r--r--)
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

/// Backup timestamp layout, `YYYYMMDD-HHMMSS.mmm`
pub const DEFAULT_TIME_FORMAT: &str = "%Y%m%d-%H%M%S%.3f";

pub const DEFAULT_MAX_SIZE: u64 = 256 * MIB;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(14 * DAY);

pub const DEFAULT_MAX_BACKUPS: usize = 14;

/// Rotation and retention settings for a rolling file.
///
/// Every threshold is optional: a zero value switches that axis off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    /// Mode bits applied when a log file is created (unix only)
    pub file_permissions: u32,

    /// chrono strftime pattern used to name and parse backups
    pub time_format: String,

    /// Roll before a write would push the active file past this many bytes
    pub max_size: u64,

    /// Backups older than this are deleted after a roll
    pub max_age: Duration,

    /// Keep at most this many backups, deleting the oldest first
    pub max_backups: usize,

    /// Roll once the active file has been open this long
    pub roll_interval: Duration,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            file_permissions: DEFAULT_FILE_PERMISSIONS,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            max_size: DEFAULT_MAX_SIZE,
            max_age: DEFAULT_MAX_AGE,
            max_backups: DEFAULT_MAX_BACKUPS,
            roll_interval: Duration::ZERO,
        }
    }
}

impl FileConfig {
    pub fn with_file_permissions(mut self, mode: u32) -> Self {
        self.file_permissions = mode;
        self
    }

    pub fn with_time_format(mut self, time_format: impl Into<String>) -> Self {
        self.time_format = time_format.into();
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn with_roll_interval(mut self, roll_interval: Duration) -> Self {
        self.roll_interval = roll_interval;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.file_permissions > 0o7777 {
            return Err(Error::config(format!(
                "file_permissions {:o} is not a valid mode",
                self.file_permissions
            )));
        }

        validate_time_format(&self.time_format)
    }
}

/// Check that `time_format` can both name a backup and be parsed back out of one.
pub(crate) fn validate_time_format(time_format: &str) -> Result<()> {
    if time_format.is_empty() {
        return Err(Error::config("time_format must not be empty"));
    }

    if time_format.contains('/') || time_format.contains('\\') {
        return Err(Error::config(format!(
            "time_format '{}' must not contain path separators",
            time_format
        )));
    }

    if StrftimeItems::new(time_format).any(|item| matches!(item, Item::Error)) {
        return Err(Error::config(format!(
            "time_format '{}' is not a valid strftime pattern",
            time_format
        )));
    }

    let sample = Utc
        .with_ymd_and_hms(2021, 3, 4, 5, 6, 7)
        .single()
        .ok_or_else(|| Error::config("failed to build sample timestamp"))?;
    let formatted = sample.format(time_format).to_string();
    if parse_timestamp(&formatted, time_format).is_none() {
        return Err(Error::config(format!(
            "time_format '{}' produces names that cannot be parsed back",
            time_format
        )));
    }

    // a trailing `.<n>` collision suffix must not read as part of the time
    if parse_timestamp(&format!("{}{}7", formatted, BACKUP_SEPARATOR), time_format).is_some() {
        return Err(Error::config(format!(
            "time_format '{}' cannot be told apart from a collision suffix",
            time_format
        )));
    }

    Ok(())
}
