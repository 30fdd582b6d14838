use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use logit::{Level, LogFormat, LoggerConfig, LoggingSystem};
use logit_file::config::{DEFAULT_MAX_AGE, DEFAULT_MAX_BACKUPS, DEFAULT_TIME_FORMAT};
use logit_file::retention::{execute_plan, list_backups, plan_prune};
use logit_file::{BackupNaming, FileConfig, RetentionPolicy, RollingFileWriter};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Write, inspect and prune rolling log files", long_about = None)]
struct Cli {
    /// Set log level for logroll's own diagnostics (trace, debug, info, warn, error)
    #[arg(long, global = true, help = "Set log level")]
    log_level: Option<String>,

    /// Set log format (json, pretty, compact, full)
    #[arg(long, global = true, help = "Set log output format")]
    log_format: Option<String>,

    /// Logger configuration file
    #[arg(long, global = true, help = "Path to logger configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy stdin into a rolling log file
    Pipe(PipeArgs),
    /// Print the backups of a log file, oldest first
    List(ListArgs),
    /// Delete backups past the retention limits
    Prune(PruneArgs),
}

#[derive(Args, Debug)]
struct NamingArgs {
    /// Active log file
    file: PathBuf,

    /// strftime pattern used in backup names
    #[arg(long, default_value = DEFAULT_TIME_FORMAT)]
    time_format: String,
}

impl NamingArgs {
    fn naming(&self) -> Result<BackupNaming> {
        BackupNaming::new(&self.file, self.time_format.clone())
            .with_context(|| format!("invalid backup naming for {}", self.file.display()))
    }
}

#[derive(Args, Debug)]
struct PipeArgs {
    #[command(flatten)]
    target: NamingArgs,

    /// Roll when the file would exceed this many bytes, 0 disables
    #[arg(long)]
    max_size: Option<u64>,

    /// Backups to keep, 0 keeps all
    #[arg(long)]
    max_backups: Option<usize>,

    /// Delete backups older than this many seconds, 0 disables
    #[arg(long)]
    max_age_secs: Option<u64>,

    /// Roll every this many seconds, 0 disables
    #[arg(long)]
    roll_interval_secs: Option<u64>,

    /// Octal mode for new files, e.g. 0640
    #[arg(long)]
    mode: Option<String>,
}

impl PipeArgs {
    fn file_config(&self) -> Result<FileConfig> {
        let mut config = FileConfig::default().with_time_format(self.target.time_format.clone());
        if let Some(max_size) = self.max_size {
            config = config.with_max_size(max_size);
        }
        if let Some(max_backups) = self.max_backups {
            config = config.with_max_backups(max_backups);
        }
        if let Some(secs) = self.max_age_secs {
            config = config.with_max_age(Duration::from_secs(secs));
        }
        if let Some(secs) = self.roll_interval_secs {
            config = config.with_roll_interval(Duration::from_secs(secs));
        }
        if let Some(mode) = &self.mode {
            config = config.with_file_permissions(parse_mode(mode)?);
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct ListArgs {
    #[command(flatten)]
    target: NamingArgs,
}

#[derive(Args, Debug)]
struct PruneArgs {
    #[command(flatten)]
    target: NamingArgs,

    /// Delete backups older than this many seconds, 0 disables
    #[arg(long, default_value_t = DEFAULT_MAX_AGE.as_secs())]
    max_age_secs: u64,

    /// Backups to keep, 0 keeps all
    #[arg(long, default_value_t = DEFAULT_MAX_BACKUPS)]
    max_backups: usize,

    /// Print what would be deleted without deleting
    #[arg(long)]
    dry_run: bool,
}

fn parse_mode(text: &str) -> Result<u32> {
    let digits = text.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8).with_context(|| format!("invalid octal mode '{}'", text))
}

/// Build the diagnostics logger configuration from CLI arguments
async fn create_logger_config(cli: &Cli) -> Result<LoggerConfig> {
    let mut config = match &cli.config {
        Some(path) => LoggerConfig::load(Some(path)).await?,
        None => LoggerConfig {
            level: Level::Info,
            ..LoggerConfig::default()
        },
    };

    if let Some(level) = &cli.log_level {
        config.level = level.parse()?;
    }
    if let Some(format) = &cli.log_format {
        config.format = format.parse::<LogFormat>()?;
    }

    config.load_env_overrides();
    Ok(config)
}

/// Copy `reader` into `writer` one line at a time, returning the line count
fn pipe_lines<R: BufRead>(mut reader: R, writer: &RollingFileWriter) -> Result<u64> {
    let mut line = Vec::new();
    let mut count = 0;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        writer.write(&line)?;
        count += 1;
    }

    Ok(count)
}

fn run_pipe(args: PipeArgs) -> Result<u64> {
    let writer = RollingFileWriter::open(&args.target.file, args.file_config()?)
        .with_context(|| format!("failed to open {}", args.target.file.display()))?;

    let stdin = io::stdin();
    let count = pipe_lines(stdin.lock(), &writer)?;
    writer.close()?;
    Ok(count)
}

fn run_list(args: &ListArgs, out: &mut impl Write) -> Result<usize> {
    let naming = args.target.naming()?;
    let backups = list_backups(&args.target.file, &naming)?;

    for backup in &backups {
        let size = std::fs::metadata(&backup.path).map(|m| m.len()).unwrap_or(0);
        writeln!(
            out,
            "{}\t{}\t{}",
            backup.timestamp.to_rfc3339(),
            size,
            backup.path.display()
        )?;
    }

    Ok(backups.len())
}

fn run_prune(args: &PruneArgs, out: &mut impl Write) -> Result<()> {
    let naming = args.target.naming()?;
    let policy = RetentionPolicy::new(Duration::from_secs(args.max_age_secs), args.max_backups);
    if policy.is_disabled() {
        writeln!(out, "retention disabled, nothing to do")?;
        return Ok(());
    }

    let backups = list_backups(&args.target.file, &naming)?;
    let plan = plan_prune(backups, chrono::Utc::now(), &policy);

    if args.dry_run {
        for (i, backup) in plan.delete.iter().enumerate() {
            let reason = if i < plan.expired { "expired" } else { "excess" };
            writeln!(out, "would remove {} ({})", backup.path.display(), reason)?;
        }
        writeln!(out, "{} to remove, {} to keep", plan.delete.len(), plan.keep.len())?;
        return Ok(());
    }

    let report = execute_plan(&plan);
    for path in &report.removed {
        writeln!(out, "removed {}", path.display())?;
    }
    for failure in &report.failures {
        warn!(
            logit.event = "backup_removal_failed",
            file_path = %failure.path.display(),
            error = %failure.error,
            "Failed to remove backup"
        );
    }
    writeln!(
        out,
        "{} removed ({} by age, {} by count), {} kept",
        report.total_removed(),
        report.removed_by_age,
        report.removed_by_count,
        report.kept
    )?;

    if !report.is_clean() {
        anyhow::bail!("{} backups could not be removed", report.failures.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before parsing configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let logger_config = create_logger_config(&cli).await?;
    let _guard = LoggingSystem::init(logger_config).map_err(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        anyhow::anyhow!("Logging initialization failed: {}", e)
    })?;

    match cli.command {
        Command::Pipe(args) => {
            let file = args.target.file.clone();
            let lines = tokio::task::spawn_blocking(move || run_pipe(args)).await??;
            info!(
                logit.event = "pipe_finished",
                file_path = %file.display(),
                lines,
                "Finished copying stdin"
            );
        }
        Command::List(args) => {
            let count = run_list(&args, &mut io::stdout().lock())?;
            info!(logit.event = "backups_listed", count, "Listed backups");
        }
        Command::Prune(args) => {
            run_prune(&args, &mut io::stdout().lock())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn backup_name(naming: &BackupNaming, days_ago: i64) -> PathBuf {
        let at = Utc::now() - chrono::Duration::days(days_ago);
        naming.dir().join(naming.file_name(at, None))
    }

    #[test]
    fn test_parse_pipe_command() {
        let cli = Cli::try_parse_from([
            "logroll",
            "--log-level",
            "debug",
            "pipe",
            "/tmp/app.log",
            "--max-size",
            "1024",
            "--mode",
            "0600",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Pipe(args) = cli.command else {
            panic!("expected pipe");
        };
        let config = args.file_config().unwrap();
        assert_eq!(config.max_size, 1024);
        assert_eq!(config.file_permissions, 0o600);
        assert_eq!(config.time_format, DEFAULT_TIME_FORMAT);
    }

    #[test]
    fn test_parse_prune_defaults() {
        let cli = Cli::try_parse_from(["logroll", "prune", "app.log", "--dry-run"]).unwrap();
        let Command::Prune(args) = cli.command else {
            panic!("expected prune");
        };
        assert!(args.dry_run);
        assert_eq!(args.max_backups, DEFAULT_MAX_BACKUPS);
        assert_eq!(args.max_age_secs, DEFAULT_MAX_AGE.as_secs());
    }

    #[test]
    fn test_rejects_bad_mode() {
        assert!(parse_mode("0o640").is_ok());
        assert!(parse_mode("rw-r-----").is_err());
    }

    #[test]
    fn test_missing_file_argument() {
        assert!(Cli::try_parse_from(["logroll", "list"]).is_err());
    }

    #[test]
    fn test_pipe_lines_rolls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("piped.log");
        let config = FileConfig::default()
            .with_max_size(10)
            .with_max_backups(0)
            .with_max_age(Duration::ZERO);
        let writer = RollingFileWriter::open(&path, config).unwrap();

        let input = Cursor::new(b"first\nsecond\nthird".to_vec());
        assert_eq!(pipe_lines(input, &writer).unwrap(), 3);
        writer.close().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "third\n");
        assert_eq!(list_backups(&path, writer.naming()).unwrap().len(), 2);
    }

    #[test]
    fn test_list_prints_oldest_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let naming = BackupNaming::new(&path, DEFAULT_TIME_FORMAT).unwrap();
        let older = naming
            .dir()
            .join(naming.file_name(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), None));
        let newer = naming
            .dir()
            .join(naming.file_name(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(), None));
        std::fs::write(&newer, "b").unwrap();
        std::fs::write(&older, "a").unwrap();
        std::fs::write(&path, "active").unwrap();

        let args = ListArgs {
            target: NamingArgs {
                file: path,
                time_format: DEFAULT_TIME_FORMAT.to_string(),
            },
        };
        let mut out = Vec::new();
        assert_eq!(run_list(&args, &mut out).unwrap(), 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with(&older.display().to_string()));
        assert!(lines[1].ends_with(&newer.display().to_string()));
    }

    #[test]
    fn test_prune_dry_run_keeps_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let naming = BackupNaming::new(&path, DEFAULT_TIME_FORMAT).unwrap();
        let old = backup_name(&naming, 30);
        let fresh = backup_name(&naming, 1);
        std::fs::write(&old, "old").unwrap();
        std::fs::write(&fresh, "fresh").unwrap();

        let mut args = PruneArgs {
            target: NamingArgs {
                file: path,
                time_format: DEFAULT_TIME_FORMAT.to_string(),
            },
            max_age_secs: 7 * 24 * 3600,
            max_backups: 0,
            dry_run: true,
        };

        let mut out = Vec::new();
        run_prune(&args, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(expired)"));
        assert!(text.contains("1 to remove, 1 to keep"));
        assert!(old.exists());

        args.dry_run = false;
        let mut out = Vec::new();
        run_prune(&args, &mut out).unwrap();
        assert!(!old.exists());
        assert!(fresh.exists());
    }
}
