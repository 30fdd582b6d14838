//! Subscriber assembly and the process-wide logger

use crate::{
    config::{FileSinkConfig, LoggerConfig},
    filters::WriterEventFilter,
    Error, LogFormat, Result,
};
use logit_file::RollingFileWriter;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{
    fmt::{self, writer::EitherWriter, MakeWriter},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Fully assembled subscriber type produced by [`LoggingSystem::build`]
pub type LoggerSubscriber = Layered<Vec<BoxedLayer>, FilteredRegistry>;

/// Writer behind the globally installed logger
static ACTIVE_WRITER: Mutex<Option<RollingFileWriter>> = Mutex::new(None);

/// Set once a global subscriber has been installed by [`LoggingSystem::init`]
static INSTALLED: AtomicBool = AtomicBool::new(false);

fn active_slot() -> MutexGuard<'static, Option<RollingFileWriter>> {
    ACTIVE_WRITER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A built but not yet installed logger
pub struct LoggingSystem {
    subscriber: LoggerSubscriber,
    writer: Option<RollingFileWriter>,
}

impl LoggingSystem {
    /// Assemble the env filter, console layer and file layer for `config`
    pub fn build(config: &LoggerConfig) -> Result<Self> {
        config.validate()?;

        let mut layers: Vec<BoxedLayer> = Vec::new();

        if config.console {
            layers.push(Self::format_layer(
                config.format,
                std::io::stderr,
                true,
                config.include_location,
            ));
        }

        let writer = match &config.file {
            Some(sink) => {
                let writer = Self::open_writer(sink)?;
                let layer = Self::format_layer(
                    config.format,
                    FileSink::new(writer.clone()),
                    false,
                    config.include_location,
                )
                .with_filter(WriterEventFilter::new())
                .boxed();
                layers.push(layer);
                Some(writer)
            }
            None => None,
        };

        let subscriber = Registry::default()
            .with(Self::build_env_filter(config))
            .with(layers);

        Ok(Self { subscriber, writer })
    }

    /// Install `config` as the global logger.
    ///
    /// Only one global logger may exist per process; later calls fail with
    /// [`Error::AlreadyInitialized`], including after [`shutdown`].
    pub fn init(config: LoggerConfig) -> Result<LoggerGuard> {
        let mut slot = active_slot();
        if slot.is_some() || INSTALLED.load(Ordering::Acquire) {
            return Err(Error::AlreadyInitialized);
        }

        let Self { subscriber, writer } = Self::build(&config)?;

        if let Err(e) = subscriber.try_init() {
            if let Some(writer) = &writer {
                let _ = writer.close();
            }
            return Err(Error::System {
                message: format!("Failed to initialize tracing subscriber: {}", e),
            });
        }

        INSTALLED.store(true, Ordering::Release);

        let file_path = writer
            .as_ref()
            .map(|w| w.active_path().display().to_string());
        *slot = writer;
        drop(slot);

        tracing::info!(
            logit.event = "logger_initialized",
            logit.level = %config.level,
            logit.file = ?file_path,
            "Logger initialized"
        );

        Ok(LoggerGuard { _private: () })
    }

    /// Install `config` as the default logger for the current thread only
    pub fn scoped(config: LoggerConfig) -> Result<ScopedLogger> {
        let Self { subscriber, writer } = Self::build(&config)?;
        let default = tracing::subscriber::set_default(subscriber);

        Ok(ScopedLogger {
            writer,
            _default: default,
        })
    }

    pub fn writer(&self) -> Option<&RollingFileWriter> {
        self.writer.as_ref()
    }

    pub fn into_parts(self) -> (LoggerSubscriber, Option<RollingFileWriter>) {
        (self.subscriber, self.writer)
    }

    fn open_writer(sink: &FileSinkConfig) -> Result<RollingFileWriter> {
        Ok(RollingFileWriter::open(&sink.path, sink.to_file_config())?)
    }

    /// Level from config unless `RUST_LOG` says otherwise
    fn build_env_filter(config: &LoggerConfig) -> EnvFilter {
        match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
            _ => EnvFilter::new(config.level.as_str()),
        }
    }

    fn format_layer<W>(format: LogFormat, writer: W, ansi: bool, include_location: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(include_location)
            .with_line_number(include_location);

        match format {
            LogFormat::Json => layer
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().with_target(false).boxed(),
            LogFormat::Full => layer.boxed(),
        }
    }
}

/// File layer output that goes quiet once its writer is closed.
///
/// The global subscriber outlives [`shutdown`]; later events are dropped
/// instead of each reporting a closed-writer error on stderr.
#[derive(Debug, Clone)]
pub struct FileSink {
    writer: RollingFileWriter,
}

impl FileSink {
    pub fn new(writer: RollingFileWriter) -> Self {
        Self { writer }
    }
}

impl<'a> MakeWriter<'a> for FileSink {
    type Writer = EitherWriter<RollingFileWriter, io::Sink>;

    fn make_writer(&'a self) -> Self::Writer {
        if self.writer.is_closed() {
            EitherWriter::B(io::sink())
        } else {
            EitherWriter::A(self.writer.clone())
        }
    }
}

/// Closes the global logger's file when dropped
#[must_use = "dropping the guard closes the log file"]
pub struct LoggerGuard {
    _private: (),
}

impl LoggerGuard {
    pub fn flush(&self) -> Result<()> {
        match active_writer() {
            Some(writer) => Ok(writer.flush()?),
            None => Ok(()),
        }
    }
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = shutdown();
    }
}

/// Thread-scoped logger, restores the previous default when dropped
#[must_use = "dropping the logger uninstalls it"]
pub struct ScopedLogger {
    writer: Option<RollingFileWriter>,
    _default: DefaultGuard,
}

impl ScopedLogger {
    pub fn writer(&self) -> Option<&RollingFileWriter> {
        self.writer.as_ref()
    }
}

impl Drop for ScopedLogger {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.close();
        }
    }
}

/// Shorthand for [`LoggingSystem::init`]
pub fn init(config: LoggerConfig) -> Result<LoggerGuard> {
    LoggingSystem::init(config)
}

/// Writer of the global logger, if one is installed with a file sink
pub fn active_writer() -> Option<RollingFileWriter> {
    active_slot().clone()
}

/// Close the global logger's file and clear the slot.
///
/// The subscriber stays installed; events after this point reach the console
/// layer only. Calling it with nothing installed is a no-op.
pub fn shutdown() -> Result<()> {
    let writer = active_slot().take();
    match writer {
        Some(writer) => {
            writer.close()?;
            Ok(())
        }
        None => Ok(()),
    }
}
