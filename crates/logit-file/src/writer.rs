//! Rolling file writer implementation

use crate::backup::BackupNaming;
use crate::clock::{Clock, SystemClock};
use crate::config::FileConfig;
use crate::policy::{first_due, rollers_for, RollContext, Roller};
use crate::retention::{prune, PruneReport, RetentionPolicy};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::MakeWriter;

/// A log file that rolls itself over into timestamped backups.
///
/// Clones share the same underlying file. Every write takes the writer lock
/// exclusively for the whole check-roll-write sequence, so concurrent writers
/// never roll the same file twice and never push it past `max_size`.
#[derive(Clone)]
pub struct RollingFileWriter {
    shared: Arc<Shared>,
}

/// Opens the active log file with the given mode
type OpenFn = fn(&Path, u32) -> Result<File>;

struct Shared {
    active_path: PathBuf,
    naming: BackupNaming,
    config: FileConfig,
    clock: Arc<dyn Clock>,
    open: OpenFn,
    state: RwLock<State>,
}

struct State {
    /// `None` once closed
    file: Option<File>,
    bytes_written: u64,
    opened_at: DateTime<Utc>,
    sequence: u32,
    rollers: Vec<Box<dyn Roller>>,
}

/// Result of a successful roll
#[derive(Debug)]
pub struct RollOutcome {
    /// Where the previous active file now lives
    pub backup: PathBuf,
    /// Retention pass run after the roll. Errors here never undo the roll.
    pub prune: Result<PruneReport>,
}

/// Builder for [`RollingFileWriter`]
pub struct RollingFileWriterBuilder {
    path: PathBuf,
    config: FileConfig,
    clock: Arc<dyn Clock>,
    rollers: Option<Vec<Box<dyn Roller>>>,
    open: OpenFn,
}

impl RollingFileWriterBuilder {
    /// Rotation and retention settings, validated in [`build`](Self::build)
    pub fn config(mut self, config: FileConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source for backup names, interval rolls and retention
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the triggers derived from the config
    pub fn rollers(mut self, rollers: Vec<Box<dyn Roller>>) -> Self {
        self.rollers = Some(rollers);
        self
    }

    /// Replace how the active file is opened on each roll
    #[cfg(test)]
    pub(crate) fn open_with(mut self, open: OpenFn) -> Self {
        self.open = open;
        self
    }

    /// Validate the config and open the active file.
    pub fn build(self) -> Result<RollingFileWriter> {
        self.config.validate()?;
        if self.path.as_os_str().is_empty() {
            return Err(Error::config("log file path must not be empty"));
        }

        let naming = BackupNaming::new(&self.path, self.config.time_format.clone())?;
        let file = open_active(&self.path, self.config.file_permissions)?;
        let bytes_written = file.metadata()?.len();
        let rollers = self.rollers.unwrap_or_else(|| rollers_for(&self.config));
        let opened_at = self.clock.now();

        debug!(
            logit.event = "log_file_opened",
            file_path = %self.path.display(),
            current_size = bytes_written,
            "Log file opened"
        );

        Ok(RollingFileWriter {
            shared: Arc::new(Shared {
                active_path: self.path,
                naming,
                config: self.config,
                clock: self.clock,
                open: self.open,
                state: RwLock::new(State {
                    file: Some(file),
                    bytes_written,
                    opened_at,
                    sequence: 0,
                    rollers,
                }),
            }),
        })
    }
}

impl RollingFileWriter {
    /// Open `path` for appending with the given config
    pub fn open(path: impl Into<PathBuf>, config: FileConfig) -> Result<Self> {
        Self::builder(path).config(config).build()
    }

    /// Start building a writer for `path` with default settings
    pub fn builder(path: impl Into<PathBuf>) -> RollingFileWriterBuilder {
        RollingFileWriterBuilder {
            path: path.into(),
            config: FileConfig::default(),
            clock: Arc::new(SystemClock),
            rollers: None,
            open: open_active,
        }
    }

    /// Write `buf` to the active file, rolling first if a trigger fires.
    ///
    /// A failed roll is logged and the bytes go to the current file instead.
    /// The count and error come from a single underlying `write` call.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let (result, rolled) = {
            let mut state = self.shared.write_state();
            if state.file.is_none() {
                return Err(Error::Closed);
            }

            let now = self.shared.clock.now();
            let rolled = self
                .shared
                .due_backup_path(&state, buf.len(), now)
                .map(|backup| self.shared.roll_locked(&mut state, backup, now));

            let file = state.file.as_mut().ok_or(Error::Closed)?;
            let result = file.write(buf);
            if let Ok(n) = result {
                state.bytes_written += n as u64;
            }
            (result, rolled)
        };

        if let Some(rolled) = &rolled {
            self.shared.log_roll(rolled);
        }

        result.map_err(Error::Io)
    }

    /// Roll now, regardless of triggers.
    ///
    /// On failure the current file stays active and writable.
    pub fn roll(&self) -> Result<RollOutcome> {
        let rolled = {
            let mut state = self.shared.write_state();
            if state.file.is_none() {
                return Err(Error::Closed);
            }

            let now = self.shared.clock.now();
            let backup = self.shared.naming.backup_path(now, state.sequence);
            self.shared.roll_locked(&mut state, backup, now)
        };

        self.shared.log_roll(&rolled);
        rolled
    }

    /// Flush the active file. A closed writer has nothing to flush.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.shared.write_state();
        match state.file.as_mut() {
            Some(file) => file.flush().map_err(Error::Io),
            None => Ok(()),
        }
    }

    /// Release the file and stop accepting writes.
    ///
    /// Closing twice is harmless: the second call finds no handle and returns `Ok`.
    pub fn close(&self) -> Result<()> {
        let file = {
            let mut state = self.shared.write_state();
            state.rollers.clear();
            state.file.take()
        };

        let Some(mut file) = file else {
            return Ok(());
        };
        file.flush()?;
        drop(file);

        debug!(
            logit.event = "writer_closed",
            file_path = %self.shared.active_path.display(),
            "Rolling file writer closed"
        );
        Ok(())
    }

    /// Path of the active log file
    pub fn active_path(&self) -> &Path {
        &self.shared.active_path
    }

    /// Settings the writer was built with
    pub fn config(&self) -> &FileConfig {
        &self.shared.config
    }

    /// Naming scheme used for this file's backups
    pub fn naming(&self) -> &BackupNaming {
        &self.shared.naming
    }

    /// Bytes in the active file, as tracked by the writer
    pub fn bytes_written(&self) -> u64 {
        self.shared.read_state().bytes_written
    }

    /// Number of successful rolls
    pub fn sequence(&self) -> u32 {
        self.shared.read_state().sequence
    }

    /// True once [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.shared.read_state().file.is_none()
    }
}

impl Shared {
    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.config.max_age, self.config.max_backups)
    }

    /// Backup path chosen by the first roller that fires for a write of `pending` bytes
    fn due_backup_path(&self, state: &State, pending: usize, now: DateTime<Utc>) -> Option<PathBuf> {
        let ctx = RollContext {
            active_path: &self.active_path,
            naming: &self.naming,
            bytes_written: state.bytes_written,
            pending,
            opened_at: state.opened_at,
            now,
            sequence: state.sequence,
        };
        first_due(&state.rollers, &ctx).map(|roller| roller.backup_path(&ctx))
    }

    /// Move the active file to `backup` and start a fresh one. Caller holds the lock.
    fn roll_locked(&self, state: &mut State, backup: PathBuf, now: DateTime<Utc>) -> Result<RollOutcome> {
        std::fs::rename(&self.active_path, &backup).map_err(|source| Error::Roll {
            from: self.active_path.clone(),
            to: backup.clone(),
            source,
        })?;

        let file = match (self.open)(&self.active_path, self.config.file_permissions) {
            Ok(file) => file,
            Err(err) => {
                // put the file back under the active name, the old handle stays in use
                return match std::fs::rename(&backup, &self.active_path) {
                    Ok(()) => Err(err),
                    Err(source) => Err(Error::Restore {
                        from: backup,
                        to: self.active_path.clone(),
                        source,
                    }),
                };
            }
        };

        if let Some(mut old) = state.file.replace(file) {
            let _ = old.flush();
        }
        state.bytes_written = 0;
        state.opened_at = now;
        state.sequence = state.sequence.wrapping_add(1);

        let prune = prune(&self.active_path, &self.naming, &self.retention(), now);
        Ok(RollOutcome { backup, prune })
    }

    /// Report a roll once the lock is released
    fn log_roll(&self, rolled: &Result<RollOutcome>) {
        let outcome = match rolled {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    logit.event = "roll_failed",
                    file_path = %self.active_path.display(),
                    error = %e,
                    "Log file roll failed, keeping the current file"
                );
                return;
            }
        };

        info!(
            logit.event = "file_rolled",
            file_path = %self.active_path.display(),
            backup = %outcome.backup.display(),
            "Log file rolled"
        );

        match &outcome.prune {
            Ok(report) => {
                for path in &report.removed {
                    debug!(
                        logit.event = "backup_removed",
                        file = %path.display(),
                        "Removed log backup"
                    );
                }
                for failure in &report.failures {
                    warn!(
                        logit.event = "backup_removal_failed",
                        file = %failure.path.display(),
                        error = %failure.error,
                        "Failed to remove log backup"
                    );
                }
            }
            Err(e) => warn!(
                logit.event = "backup_scan_failed",
                dir = %self.naming.dir().display(),
                error = %e,
                "Failed to scan log backups"
            ),
        }
    }
}

fn open_active(path: &Path, mode: u32) -> Result<File> {
    let open_err = |source: io::Error| Error::Open {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(open_err)?;
    }

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    options.open(path).map_err(open_err)
}

impl fmt::Debug for RollingFileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingFileWriter")
            .field("active_path", &self.shared.active_path)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Write for RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RollingFileWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        RollingFileWriter::flush(self).map_err(Into::into)
    }
}

impl Write for &RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RollingFileWriter::write(*self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        RollingFileWriter::flush(*self).map_err(Into::into)
    }
}

// Lets a RollingFileWriter be passed straight to `fmt::layer().with_writer(..)`
impl<'a> MakeWriter<'a> for RollingFileWriter {
    type Writer = RollingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
