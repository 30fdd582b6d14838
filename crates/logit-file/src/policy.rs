//! Rotation triggers.
//!
//! A writer carries an ordered list of [`Roller`]s. Before every write it asks
//! each one in turn whether the active file should roll; the first that says
//! yes picks the backup path and the rest are skipped for that write.

use crate::backup::BackupNaming;
use crate::config::FileConfig;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

/// Snapshot of the active file handed to rollers. Read-only.
#[derive(Debug, Clone, Copy)]
pub struct RollContext<'a> {
    pub active_path: &'a Path,
    pub naming: &'a BackupNaming,
    /// Bytes in the active file
    pub bytes_written: u64,
    /// Size of the write about to happen
    pub pending: usize,
    pub opened_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
    /// Number of rolls performed by this writer
    pub sequence: u32,
}

/// A rotation trigger
pub trait Roller: Send + Sync + fmt::Debug {
    /// Whether the active file should roll before the pending write
    fn should_roll(&self, ctx: &RollContext<'_>) -> bool;

    /// Where the active file is moved to when this roller fires
    fn backup_path(&self, ctx: &RollContext<'_>) -> PathBuf {
        ctx.naming.backup_path(ctx.now, ctx.sequence)
    }
}

/// Rolls before a write that would grow the active file past `max_size`.
///
/// An empty file never rolls, so a single oversized write still lands whole.
#[derive(Debug, Clone, Copy)]
pub struct SizeRoller {
    max_size: u64,
}

impl SizeRoller {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }
}

impl Roller for SizeRoller {
    fn should_roll(&self, ctx: &RollContext<'_>) -> bool {
        ctx.bytes_written > 0 && ctx.bytes_written.saturating_add(ctx.pending as u64) > self.max_size
    }
}

/// Rolls a non-empty active file once it has been open for `interval`
#[derive(Debug, Clone, Copy)]
pub struct IntervalRoller {
    interval: Duration,
}

impl IntervalRoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Roller for IntervalRoller {
    fn should_roll(&self, ctx: &RollContext<'_>) -> bool {
        ctx.bytes_written > 0 && ctx.now.signed_duration_since(ctx.opened_at) >= self.interval
    }
}

/// Default triggers for a config: size first, then interval, each only if enabled.
pub fn rollers_for(config: &FileConfig) -> Vec<Box<dyn Roller>> {
    let mut rollers: Vec<Box<dyn Roller>> = Vec::new();

    if config.max_size > 0 {
        rollers.push(Box::new(SizeRoller::new(config.max_size)));
    }

    if !config.roll_interval.is_zero() {
        if let Ok(interval) = Duration::from_std(config.roll_interval) {
            rollers.push(Box::new(IntervalRoller::new(interval)));
        }
    }

    rollers
}

/// First roller that fires, if any
pub fn first_due<'r>(rollers: &'r [Box<dyn Roller>], ctx: &RollContext<'_>) -> Option<&'r dyn Roller> {
    rollers
        .iter()
        .find(|roller| roller.should_roll(ctx))
        .map(|roller| &**roller)
}
