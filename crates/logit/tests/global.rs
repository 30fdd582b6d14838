//! The process-wide logger can be installed exactly once

use logit::{active_writer, shutdown, Error, FileSinkConfig, LoggerConfig, LoggingSystem};
use tempfile::TempDir;

#[test]
fn test_global_logger_lifecycle() {
    let dir = TempDir::new().unwrap();
    let config = LoggerConfig {
        console: false,
        file: Some(FileSinkConfig::new(dir.path().join("global.log"))),
        ..LoggerConfig::default()
    };

    let guard = LoggingSystem::init(config.clone()).unwrap();
    let writer = active_writer().expect("file sink registered");

    logit::info!("from the global logger");
    guard.flush().unwrap();
    let content = std::fs::read_to_string(dir.path().join("global.log")).unwrap();
    assert!(content.contains("from the global logger"));

    assert!(matches!(
        LoggingSystem::init(config.clone()),
        Err(Error::AlreadyInitialized)
    ));

    shutdown().unwrap();
    assert!(writer.is_closed());
    assert!(active_writer().is_none());

    logit::info!("after shutdown");
    let content = std::fs::read_to_string(dir.path().join("global.log")).unwrap();
    assert!(!content.contains("after shutdown"));

    // the subscriber itself stays installed for the life of the process
    assert!(matches!(
        LoggingSystem::init(config),
        Err(Error::AlreadyInitialized)
    ));

    drop(guard);
    assert!(shutdown().is_ok());
}
