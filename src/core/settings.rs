//! Pipeline and appender configuration
//!
//! All settings deserialize from JSON with every field optional; missing
//! fields take the defaults below.

use super::error::{LoggerError, Result};
use super::filter::FilterSettings;
use super::queue::{DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY};
use super::timestamp::{AbsoluteTime, StartupTime, DEFAULT_ABSOLUTE_TIME_FORMAT, DEFAULT_STARTUP_TIME_FORMAT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Control characters other than tab, newline and carriage return
pub const DEFAULT_SANITIZER_PATTERN: &str = r"[\p{C}&&[^\r\n\t]]+";

pub const DEFAULT_PRODUCT_BANNER: &str = "linelog";

/// Filtering and formatting of one appender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppenderSettings {
    /// Numbered backups kept next to a file appender's active file
    pub rotation_count: usize,
    pub include: Vec<FilterSettings>,
    pub exclude: Vec<FilterSettings>,
    /// Legacy `Logger [LEVEL] message prefix` lines, merged into `exclude`
    pub prefixes_to_ignore: Vec<String>,
    pub indent_new_lines: bool,
    pub normalize_new_lines: bool,
    /// Matches are removed from messages; `None` disables sanitizing
    pub sanitizer_pattern: Option<String>,
    pub absolute_time_enabled: bool,
    pub absolute_time_use_utc: bool,
    pub absolute_time_format: String,
    pub startup_time_enabled: bool,
    pub startup_time_format: String,
    pub thread_id_enabled: bool,
    pub fast_logging_enabled: bool,
    /// Rotate a file appender once its active file grows past this size
    pub max_file_size: Option<u64>,
}

impl Default for AppenderSettings {
    fn default() -> Self {
        Self {
            rotation_count: 1,
            include: Vec::new(),
            exclude: Vec::new(),
            prefixes_to_ignore: Vec::new(),
            indent_new_lines: true,
            normalize_new_lines: true,
            sanitizer_pattern: Some(DEFAULT_SANITIZER_PATTERN.to_string()),
            absolute_time_enabled: false,
            absolute_time_use_utc: true,
            absolute_time_format: DEFAULT_ABSOLUTE_TIME_FORMAT.to_string(),
            startup_time_enabled: true,
            startup_time_format: DEFAULT_STARTUP_TIME_FORMAT.to_string(),
            thread_id_enabled: true,
            fast_logging_enabled: true,
            max_file_size: None,
        }
    }
}

impl AppenderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rotation_count(mut self, count: usize) -> Self {
        self.rotation_count = count;
        self
    }

    #[must_use]
    pub fn with_include(mut self, filter: FilterSettings) -> Self {
        self.include.push(filter);
        self
    }

    #[must_use]
    pub fn with_exclude(mut self, filter: FilterSettings) -> Self {
        self.exclude.push(filter);
        self
    }

    #[must_use]
    pub fn with_prefix_to_ignore(mut self, line: impl Into<String>) -> Self {
        self.prefixes_to_ignore.push(line.into());
        self
    }

    #[must_use]
    pub fn with_indent_new_lines(mut self, enabled: bool) -> Self {
        self.indent_new_lines = enabled;
        self
    }

    #[must_use]
    pub fn with_normalize_new_lines(mut self, enabled: bool) -> Self {
        self.normalize_new_lines = enabled;
        self
    }

    #[must_use]
    pub fn with_sanitizer_pattern(mut self, pattern: Option<&str>) -> Self {
        self.sanitizer_pattern = pattern.map(str::to_string);
        self
    }

    /// Enable the absolute time column
    #[must_use]
    pub fn with_absolute_time(mut self, format: impl Into<String>, utc: bool) -> Self {
        self.absolute_time_enabled = true;
        self.absolute_time_format = format.into();
        self.absolute_time_use_utc = utc;
        self
    }

    #[must_use]
    pub fn with_startup_time(mut self, enabled: bool) -> Self {
        self.startup_time_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_startup_time_format(mut self, format: impl Into<String>) -> Self {
        self.startup_time_format = format.into();
        self
    }

    #[must_use]
    pub fn with_thread_id(mut self, enabled: bool) -> Self {
        self.thread_id_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_fast_logging(mut self, enabled: bool) -> Self {
        self.fast_logging_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.absolute_time_enabled {
            AbsoluteTime::new(self.absolute_time_format.as_str(), self.absolute_time_use_utc)?;
        }
        if self.startup_time_enabled {
            StartupTime::new(self.startup_time_format.as_str())?;
        }
        if self.max_file_size == Some(0) {
            return Err(LoggerError::config("max_file_size", "must be greater than zero"));
        }
        Ok(())
    }
}

/// A file appender: target path plus its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAppenderSettings {
    pub path: PathBuf,
    #[serde(default)]
    pub settings: AppenderSettings,
}

impl FileAppenderSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: AppenderSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: AppenderSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Whole-pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Format and write on a background consumer thread
    pub async_enabled: bool,
    pub queue_capacity: usize,
    /// Capture file, line and a backtrace for records that ask for it
    pub call_location_enabled: bool,
    /// First line of every file header
    pub product_banner: String,
    /// Where appender failures are reported; stderr only when unset
    pub fatal_error_path: Option<PathBuf>,
    pub appenders: Vec<FileAppenderSettings>,
    pub console: Option<AppenderSettings>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            async_enabled: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            call_location_enabled: false,
            product_banner: DEFAULT_PRODUCT_BANNER.to_string(),
            fatal_error_path: None,
            appenders: Vec::new(),
            console: None,
        }
    }
}

impl LoggingSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: LoggingSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation("reading logging settings", path.display().to_string(), e)
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(LoggerError::config("queue_capacity", "must be greater than zero"));
        }
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(LoggerError::config(
                "queue_capacity",
                format!("must be at most {}", MAX_QUEUE_CAPACITY),
            ));
        }
        for appender in &self.appenders {
            if appender.path.as_os_str().is_empty() {
                return Err(LoggerError::config("appenders", "file appender path is empty"));
            }
            appender.settings.validate()?;
        }
        if let Some(ref console) = self.console {
            console.validate()?;
        }
        Ok(())
    }
}
