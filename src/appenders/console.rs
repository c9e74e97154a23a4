//! Console mirror appender
//!
//! Hosts often feed console output back into the log (see
//! [`LoggingContext::capture_console_line`](crate::core::LoggingContext::capture_console_line)).
//! Two guards keep that from looping: records of the capture logger are never
//! mirrored, and every mirrored line marks the writing thread so the capture
//! hook drops the echo it triggers.

use crate::core::appender::{Appender, LineRenderer};
use crate::core::error::Result;
use crate::core::log_level::LogLevel;
use crate::core::name_registry::{LoggerName, NameRegistry};
use crate::core::record::Record;
use crate::core::settings::AppenderSettings;
use crate::core::timestamp::ClockOrigin;
use std::cell::Cell;
use std::io::{self, IsTerminal, Write};

#[cfg(feature = "console")]
use colored::Colorize;

/// Logger name used for console output captured back into the pipeline
pub const CONSOLE_CAPTURE_LOGGER: &str = "Console";

thread_local! {
    static IGNORE_NEXT_CAPTURE: Cell<bool> = const { Cell::new(false) };
}

pub(crate) fn ignore_next_capture() {
    IGNORE_NEXT_CAPTURE.with(|flag| flag.set(true));
}

/// Consume the flag set by the last mirrored line on this thread.
pub(crate) fn take_ignore_next_capture() -> bool {
    IGNORE_NEXT_CAPTURE.with(|flag| flag.replace(false))
}

enum Target {
    Std { use_colors: bool },
    Writer(Box<dyn Write + Send>),
}

pub struct ConsoleAppender {
    renderer: LineRenderer,
    target: Target,
    capture_logger: LoggerName,
}

impl ConsoleAppender {
    /// Mirror to stdout, errors to stderr. Level colors are used when stdout
    /// is a terminal.
    pub fn new(settings: &AppenderSettings, registry: &NameRegistry, origin: ClockOrigin) -> Result<Self> {
        let use_colors = cfg!(feature = "console") && io::stdout().is_terminal();
        Self::with_target(settings, registry, origin, Target::Std { use_colors })
    }

    /// Mirror into `writer` instead of the process console.
    pub fn with_writer(
        settings: &AppenderSettings,
        registry: &NameRegistry,
        origin: ClockOrigin,
        writer: Box<dyn Write + Send>,
    ) -> Result<Self> {
        Self::with_target(settings, registry, origin, Target::Writer(writer))
    }

    fn with_target(
        settings: &AppenderSettings,
        registry: &NameRegistry,
        origin: ClockOrigin,
        target: Target,
    ) -> Result<Self> {
        Ok(Self {
            renderer: LineRenderer::compile(settings, registry, origin)?,
            target,
            capture_logger: registry.intern(CONSOLE_CAPTURE_LOGGER),
        })
    }
}

impl Appender for ConsoleAppender {
    fn append(&mut self, record: &Record) -> Result<()> {
        if record.logger.ptr_eq(&self.capture_logger) {
            return Ok(());
        }
        let Some(line) = self.renderer.render(record)? else {
            return Ok(());
        };

        ignore_next_capture();
        match self.target {
            Target::Writer(ref mut writer) => writer.write_all(line.as_bytes())?,
            Target::Std { use_colors } => write_std(record.level, line, use_colors)?,
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        match self.target {
            Target::Writer(ref mut writer) => writer.flush()?,
            Target::Std { .. } => {
                io::stdout().flush()?;
                io::stderr().flush()?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

fn write_std(level: LogLevel, line: &str, use_colors: bool) -> io::Result<()> {
    let colored_line;
    let text = if use_colors {
        colored_line = colorize(level, line);
        colored_line.as_str()
    } else {
        line
    };

    match level {
        LogLevel::Error | LogLevel::Fatal => io::stderr().lock().write_all(text.as_bytes()),
        _ => io::stdout().lock().write_all(text.as_bytes()),
    }
}

#[cfg(feature = "console")]
fn colorize(level: LogLevel, line: &str) -> String {
    let body = line.trim_end_matches(['\r', '\n']);
    let ending = &line[body.len()..];
    format!("{}{}", body.color(level.color_code()), ending)
}

#[cfg(not(feature = "console"))]
fn colorize(_level: LogLevel, line: &str) -> String {
    line.to_string()
}
