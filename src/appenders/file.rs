//! File appender with numbered backups
//!
//! On creation the previous files are shifted (`app.log` -> `app.log.1` ->
//! `app.log.2` ...) up to the configured backup count, and a fresh file is
//! started with a header block. With `max_file_size` set, the same rotation
//! is repeated at runtime whenever the active file grows past the limit.

use crate::core::appender::{Appender, LineRenderer};
use crate::core::error::{LoggerError, Result};
use crate::core::formatter::LINE_ENDING;
use crate::core::name_registry::NameRegistry;
use crate::core::record::Record;
use crate::core::settings::FileAppenderSettings;
use crate::core::timestamp::ClockOrigin;
use chrono::{Local, SecondsFormat};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const HEADER_RULE_WIDTH: usize = 80;

/// Header written at the top of every new log file.
#[derive(Debug, Clone)]
pub struct FileHeader {
    banner: String,
    origin: ClockOrigin,
}

impl FileHeader {
    pub fn new(banner: impl Into<String>, origin: ClockOrigin) -> Self {
        Self {
            banner: banner.into(),
            origin,
        }
    }

    /// Header block for the log file at `path`
    pub fn render(&self, path: &Path) -> String {
        let started = self.origin.started_at().with_timezone(&Local);
        let lines = [
            format!("{} (linelog v{})", self.banner, env!("CARGO_PKG_VERSION")),
            format!(
                "{} {} uptime={:?} started={}",
                Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
                path.display(),
                self.origin.uptime(),
                started.to_rfc3339_opts(SecondsFormat::Micros, false),
            ),
            "-".repeat(HEADER_RULE_WIDTH),
            format!(
                "os={} family={} arch={} pid={}",
                std::env::consts::OS,
                std::env::consts::FAMILY,
                std::env::consts::ARCH,
                std::process::id()
            ),
        ];

        let mut header = String::new();
        for line in lines {
            header.push_str(&line);
            header.push_str(LINE_ENDING);
        }
        header
    }
}

/// Path of the `index`-th backup: `app.log` -> `app.log.2`
pub fn backup_path(path: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return path.to_path_buf();
    }
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}", index));
    path.with_file_name(name)
}

/// Shift `path` and its numbered backups up by one, keeping at most
/// `backups` of them. The oldest backup is removed.
pub fn rotate_numbered(path: &Path, backups: usize) -> Result<()> {
    for i in (0..backups).rev() {
        let current = backup_path(path, i);
        let next = backup_path(path, i + 1);

        if !current.exists() {
            continue;
        }
        if next.exists() {
            fs::remove_file(&next).map_err(|e| {
                LoggerError::file_rotation(
                    next.display().to_string(),
                    format!("Failed to remove oldest backup: {}", e),
                )
            })?;
        }
        fs::rename(&current, &next).map_err(|e| {
            LoggerError::file_rotation(
                current.display().to_string(),
                format!("Failed to rotate to '{}': {}", next.display(), e),
            )
        })?;
    }
    Ok(())
}

pub struct FileAppender {
    name: String,
    path: PathBuf,
    rotation_count: usize,
    max_file_size: Option<u64>,
    header: FileHeader,
    renderer: LineRenderer,
    writer: Option<BufWriter<File>>,
    current_size: u64,
}

impl FileAppender {
    /// Rotate previous files, open a fresh one and write the header.
    ///
    /// # Errors
    ///
    /// Returns error if the settings do not compile, or if the directory or
    /// file cannot be created
    pub fn new(
        settings: &FileAppenderSettings,
        header: FileHeader,
        registry: &NameRegistry,
        origin: ClockOrigin,
    ) -> Result<Self> {
        let path = settings.path.clone();
        let renderer = LineRenderer::compile(&settings.settings, registry, origin)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(
                    "create log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let mut appender = Self {
            name: format!("file:{}", path.display()),
            path,
            rotation_count: settings.settings.rotation_count,
            max_file_size: settings.settings.max_file_size,
            header,
            renderer,
            writer: None,
            current_size: 0,
        };
        appender.start_new_file()?;
        Ok(appender)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    fn start_new_file(&mut self) -> Result<()> {
        rotate_numbered(&self.path, self.rotation_count)?;

        let file = File::create(&self.path).map_err(|e| {
            LoggerError::file_appender(self.path.display().to_string(), format!("Failed to open: {}", e))
        })?;
        let mut writer = BufWriter::new(file);
        let header = self.header.render(&self.path);
        writer.write_all(header.as_bytes()).map_err(|e| {
            LoggerError::file_appender(
                self.path.display().to_string(),
                format!("Failed to write header: {}", e),
            )
        })?;

        self.writer = Some(writer);
        self.current_size = header.len() as u64;
        Ok(())
    }

    fn should_rotate(&self) -> bool {
        self.max_file_size.is_some_and(|max| self.current_size >= max)
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                LoggerError::file_rotation(
                    self.path.display().to_string(),
                    format!("Failed to flush before rotation: {}", e),
                )
            })?;
        }
        self.start_new_file()
    }

    fn try_reopen_file(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                LoggerError::file_appender(
                    path.display().to_string(),
                    format!("Failed to reopen after rotation failure: {}", e),
                )
            })
    }
}

impl Appender for FileAppender {
    fn append(&mut self, record: &Record) -> Result<()> {
        if self.should_rotate() {
            if let Err(e) = self.rotate() {
                eprintln!("[LOGGER WARNING] Log rotation failed: {}. Continuing with current file.", e);
                if self.writer.is_none() {
                    let file = Self::try_reopen_file(&self.path).map_err(|reopen_err| {
                        eprintln!(
                            "[LOGGER ERROR] Failed to reopen log file after rotation failure: {}",
                            reopen_err
                        );
                        e
                    })?;
                    self.writer = Some(BufWriter::new(file));
                }
                // Let the file outgrow the limit instead of retrying every record
                self.current_size = 0;
            }
        }

        let Some(line) = self.renderer.render(record)? else {
            return Ok(());
        };
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::writer("Writer not initialized"))?;
        writer.write_all(line.as_bytes()).map_err(|e| {
            LoggerError::file_appender(
                self.path.display().to_string(),
                format!("Failed to write log record: {}", e),
            )
        })?;
        self.current_size += line.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush().map_err(|e| {
                LoggerError::file_appender(self.path.display().to_string(), format!("Failed to flush: {}", e))
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FileAppender {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}
