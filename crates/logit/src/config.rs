//! Logger configuration and management

use crate::{Error, Level, LogFormat, Result};
use directories::ProjectDirs;
use logit_file::config::{
    DEFAULT_FILE_PERMISSIONS, DEFAULT_MAX_AGE, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_SIZE,
    DEFAULT_TIME_FORMAT,
};
use logit_file::FileConfig;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level logger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Minimum level emitted
    pub level: Level,

    /// Output format for every sink
    pub format: LogFormat,

    /// Enable stderr output
    pub console: bool,

    /// Include source file and line
    pub include_location: bool,

    /// Rolling file sink, disabled when absent
    pub file: Option<FileSinkConfig>,
}

/// Rolling file sink settings, mirrored onto [`FileConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    /// Path of the active log file
    pub path: PathBuf,

    /// Unix mode for new files, written as an octal string such as `"0640"`
    #[serde(
        serialize_with = "serialize_mode",
        deserialize_with = "deserialize_mode"
    )]
    pub file_permissions: u32,

    /// strftime pattern embedded in backup names
    pub time_format: String,

    /// Bytes before a size roll, 0 disables
    pub max_size: u64,

    /// Backup age limit in seconds, 0 disables
    pub max_age_secs: u64,

    /// Backups kept, 0 disables
    pub max_backups: usize,

    /// Seconds between interval rolls, 0 disables
    pub roll_interval_secs: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::Debug,
            format: LogFormat::Full,
            console: true,
            include_location: false,
            file: None,
        }
    }
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        let path = LoggerConfig::default_log_dir()
            .unwrap_or_else(|_| PathBuf::from("./logs"))
            .join("logit.log");

        Self {
            path,
            file_permissions: DEFAULT_FILE_PERMISSIONS,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            max_size: DEFAULT_MAX_SIZE,
            max_age_secs: DEFAULT_MAX_AGE.as_secs(),
            max_backups: DEFAULT_MAX_BACKUPS,
            roll_interval_secs: 0,
        }
    }
}

impl FileSinkConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn to_file_config(&self) -> FileConfig {
        FileConfig::default()
            .with_file_permissions(self.file_permissions)
            .with_time_format(self.time_format.clone())
            .with_max_size(self.max_size)
            .with_max_age(Duration::from_secs(self.max_age_secs))
            .with_max_backups(self.max_backups)
            .with_roll_interval(Duration::from_secs(self.roll_interval_secs))
    }
}

impl LoggerConfig {
    /// Load configuration from file or fall back to defaults
    ///
    /// `.toml` files are parsed as TOML. Anything else is read as a JSON object
    /// body without the outer braces, where lines starting with `#` are comments.
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_file.exists() {
            let content = tokio::fs::read_to_string(&config_file).await?;
            let is_toml = config_file
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
            if is_toml {
                Self::from_toml_str(&content)?
            } else {
                Self::from_logit_str(&content)?
            }
        } else if config_path.is_some() {
            return Err(Error::Config {
                message: format!("config file {} does not exist", config_file.display()),
            });
        } else {
            Self::default()
        };

        config.load_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse the commented, brace-less JSON dialect
    pub fn from_logit_str(content: &str) -> Result<Self> {
        let body: Vec<&str> = content
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .collect();
        let json = format!("{{{}}}", body.join("\n"));
        Ok(serde_json::from_str(&json)?)
    }

    /// Save configuration to file as TOML
    pub async fn save(&self, config_path: Option<&Path>) -> Result<()> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| Error::Config {
            message: format!("Failed to serialize logger config: {}", e),
        })?;

        tokio::fs::write(&config_file, content).await?;
        Ok(())
    }

    /// Load environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn load_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("LOGIT_LEVEL") {
            self.level = level.parse().unwrap_or(self.level);
        }

        if let Ok(format) = std::env::var("LOGIT_FORMAT") {
            self.format = format.parse().unwrap_or(self.format);
        }

        if let Ok(console) = std::env::var("LOGIT_CONSOLE") {
            self.console = console.parse().unwrap_or(self.console);
        }

        // An empty path turns the file sink off
        if let Ok(path) = std::env::var("LOGIT_FILE") {
            if path.trim().is_empty() {
                self.file = None;
            } else {
                match self.file.as_mut() {
                    Some(file) => file.path = PathBuf::from(path),
                    None => self.file = Some(FileSinkConfig::new(path)),
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(file) = &self.file {
            if file.path.as_os_str().is_empty() {
                return Err(Error::Config {
                    message: "file.path must not be empty".to_string(),
                });
            }
            file.to_file_config().validate()?;
        }

        Ok(())
    }

    fn default_config_path() -> Result<PathBuf> {
        let project_dirs = Self::project_dirs()?;
        Ok(project_dirs.config_dir().join("logit.toml"))
    }

    /// Platform data directory for log files
    pub fn default_log_dir() -> Result<PathBuf> {
        let project_dirs = Self::project_dirs()?;
        Ok(project_dirs.data_dir().join("logs"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "logit", "logit").ok_or_else(|| Error::Config {
            message: "Could not determine project directories".to_string(),
        })
    }
}

fn serialize_mode<S: Serializer>(mode: &u32, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:04o}", mode))
}

/// Accepts a plain integer or an octal string
fn deserialize_mode<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Mode {
        Number(u32),
        Octal(String),
    }

    match Mode::deserialize(deserializer)? {
        Mode::Number(mode) => Ok(mode),
        Mode::Octal(text) => {
            let digits = text.trim();
            let digits = digits
                .strip_prefix("0o")
                .or_else(|| digits.strip_prefix("0O"))
                .unwrap_or(digits);
            u32::from_str_radix(digits, 8).map_err(|_| {
                serde::de::Error::custom(format!("invalid octal file mode '{}'", text))
            })
        }
    }
}
