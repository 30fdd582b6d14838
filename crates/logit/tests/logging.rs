//! Scoped logging through a rolling file sink

use logit::{FileSinkConfig, Level, LogFormat, LoggerConfig, LoggingSystem};
use logit_file::retention::list_backups;
use serial_test::serial;
use tempfile::TempDir;

fn rolling_config(dir: &TempDir, max_size: u64) -> LoggerConfig {
    LoggerConfig {
        level: Level::Trace,
        format: LogFormat::Compact,
        console: false,
        file: Some(FileSinkConfig {
            max_size,
            max_age_secs: 0,
            max_backups: 0,
            ..FileSinkConfig::new(dir.path().join("service.log"))
        }),
        ..LoggerConfig::default()
    }
}

#[test]
#[serial]
fn test_events_roll_across_files() {
    let dir = TempDir::new().unwrap();
    let logger = LoggingSystem::scoped(rolling_config(&dir, 512)).unwrap();

    for i in 0..100 {
        logit::info!(request = i, "handled request");
    }

    let writer = logger.writer().unwrap().clone();
    drop(logger);

    let backups = list_backups(writer.active_path(), writer.naming()).unwrap();
    assert!(!backups.is_empty());

    let mut seen = 0;
    let mut files: Vec<_> = backups.into_iter().map(|b| b.path).collect();
    files.push(writer.active_path().to_path_buf());
    for path in files {
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.len() <= 512);
        seen += content.lines().filter(|l| l.contains("handled request")).count();
    }
    assert_eq!(seen, 100);
}

#[test]
#[serial]
fn test_writer_events_stay_out_of_log_file() {
    let dir = TempDir::new().unwrap();
    let logger = LoggingSystem::scoped(rolling_config(&dir, 256)).unwrap();

    for i in 0..40 {
        logit::debug!(step = i, "working");
    }
    let writer = logger.writer().unwrap().clone();
    assert!(writer.sequence() > 0);
    drop(logger);

    let mut files: Vec<_> = list_backups(writer.active_path(), writer.naming())
        .unwrap()
        .into_iter()
        .map(|b| b.path)
        .collect();
    files.push(writer.active_path().to_path_buf());
    for path in files {
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("file_rolled"), "{}", content);
        assert!(!content.contains("logit_file"), "{}", content);
    }
}

#[test]
#[serial]
fn test_config_file_drives_logger() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("from-config.log");
    let config_text = format!(
        "# written by the test\n\"level\": \"warn\",\n\"console\": false,\n\"file\": {{ \"path\": {} }}\n",
        serde_json::to_string(&log_path).unwrap()
    );
    let config = LoggerConfig::from_logit_str(&config_text).unwrap();

    let logger = LoggingSystem::scoped(config).unwrap();
    logit::info!("too quiet");
    logit::warn!("loud enough");
    drop(logger);

    let content = std::fs::read_to_string(&log_path).unwrap();
    assert!(!content.contains("too quiet"));
    assert!(content.contains("loud enough"));
}
