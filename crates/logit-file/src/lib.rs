//! # logit-file
//!
//! A log file sink that rolls itself over.
//!
//! ## Features
//!
//! - **Size and interval rotation**: pluggable [`Roller`] triggers, first match wins
//! - **Timestamped backups**: `app.log` rolls to `app.20240301-120000.250.log`
//! - **Retention**: delete backups past a maximum age or beyond a maximum count
//! - **Thread safe**: cheap clones share one file; works as a `tracing-subscriber` writer
//!
//! ## Quick Start
//!
//! ```no_run
//! use logit_file::{FileConfig, RollingFileWriter};
//!
//! fn main() -> logit_file::Result<()> {
//!     let config = FileConfig::default().with_max_size(10 * 1024 * 1024);
//!     let writer = RollingFileWriter::open("logs/app.log", config)?;
//!
//!     writer.write(b"service started\n")?;
//!     writer.close()
//! }
//! ```

pub mod backup;
pub mod clock;
pub mod config;
pub mod error;
pub mod policy;
pub mod retention;
pub mod writer;

pub use backup::{Backup, BackupNaming};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::FileConfig;
pub use error::{Error, Result};
pub use policy::{IntervalRoller, RollContext, Roller, SizeRoller};
pub use retention::{PruneFailure, PrunePlan, PruneReport, RetentionPolicy};
pub use writer::{RollOutcome, RollingFileWriter, RollingFileWriterBuilder};
