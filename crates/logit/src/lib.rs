//! # logit
//!
//! Leveled logging on top of `tracing`, with an optional rolling file sink.
//!
//! ## Features
//!
//! - **Levels**: `trace` through `error`, parsed case-insensitively
//! - **Formats**: JSON, pretty, compact and full single-line output
//! - **Rolling files**: size and interval rotation with backup retention via [`logit_file`]
//! - **Config files**: TOML, or the brace-less commented JSON dialect
//!
//! ## Quick Start
//!
//! ```no_run
//! use logit::LoggerConfig;
//!
//! #[tokio::main]
//! async fn main() -> logit::Result<()> {
//!     let config = LoggerConfig::load(None).await?;
//!     let _guard = logit::init(config)?;
//!
//!     logit::info!("application started");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod filters;
pub mod level;
pub mod system;

pub use config::{FileSinkConfig, LoggerConfig};
pub use level::{Level, LogFormat};
pub use system::{
    active_writer, init, shutdown, FileSink, LoggerGuard, LoggerSubscriber, LoggingSystem, ScopedLogger,
};

// Re-export commonly used tracing macros
pub use tracing::{debug, error, info, trace, warn};

/// Result type for logger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Logger errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("File sink error: {0}")]
    File(#[from] logit_file::Error),

    #[error("A global logger is already installed")]
    AlreadyInitialized,

    #[error("Logging system error: {message}")]
    System { message: String },
}
