//! Renders records into text lines
//!
//! Line layout:
//!
//! ```text
//! [absolute time] [startup time] [[ThreadId=N]] logger [LEVEL] message[: error][ at file:line:col]
//! ```
//!
//! The thread annotation is only written for threads other than the main one.

use super::error::{LoggerError, Result};
use super::record::Record;
use super::settings::{AppenderSettings, DEFAULT_SANITIZER_PATTERN};
use super::timestamp::{AbsoluteTime, ClockOrigin, StartupTime};
use regex::Regex;
use std::fmt::Write;

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Per-appender scratch space reused between records.
#[derive(Debug, Default)]
pub struct LineBuffer {
    line: String,
    body: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }
}

#[derive(Debug, Clone)]
pub struct Formatter {
    origin: ClockOrigin,
    absolute_time: Option<AbsoluteTime>,
    startup_time: Option<StartupTime>,
    thread_id: bool,
    sanitizer: Option<Regex>,
    /// Printable ASCII cannot match the default sanitizer
    ascii_skips_sanitizer: bool,
    normalize_new_lines: bool,
    indent_new_lines: bool,
    fast: bool,
}

impl Formatter {
    pub fn compile(settings: &AppenderSettings, origin: ClockOrigin) -> Result<Self> {
        let absolute_time = settings
            .absolute_time_enabled
            .then(|| AbsoluteTime::new(settings.absolute_time_format.as_str(), settings.absolute_time_use_utc))
            .transpose()?;
        let startup_time = settings
            .startup_time_enabled
            .then(|| StartupTime::new(settings.startup_time_format.as_str()))
            .transpose()?;
        let sanitizer = settings
            .sanitizer_pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| LoggerError::config("sanitizer_pattern", e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            origin,
            absolute_time,
            startup_time,
            thread_id: settings.thread_id_enabled,
            ascii_skips_sanitizer: settings.sanitizer_pattern.as_deref() == Some(DEFAULT_SANITIZER_PATTERN),
            sanitizer,
            normalize_new_lines: settings.normalize_new_lines,
            indent_new_lines: settings.indent_new_lines,
            fast: settings.fast_logging_enabled,
        })
    }

    /// Format `record` into `buffer`, returning the finished line including
    /// its line terminator.
    pub fn format<'b>(&self, record: &Record, buffer: &'b mut LineBuffer) -> Result<&'b str> {
        if !self.fast {
            *buffer = LineBuffer::new();
        }
        buffer.line.clear();
        buffer.body.clear();

        self.write_body(record, &mut buffer.body)
            .and_then(|()| self.write_times(record, &mut buffer.line))
            .map_err(|_| LoggerError::other(format!("failed to format record of '{}'", record.logger)))?;
        push_lines(&mut buffer.line, &buffer.body, self.normalize_new_lines, self.indent_new_lines);
        buffer.line.push_str(LINE_ENDING);

        Ok(buffer.line.as_str())
    }

    pub fn format_to_string(&self, record: &Record) -> Result<String> {
        let mut buffer = LineBuffer::new();
        self.format(record, &mut buffer)?;
        Ok(buffer.line)
    }

    fn write_times(&self, record: &Record, line: &mut String) -> std::fmt::Result {
        if let Some(ref absolute) = self.absolute_time {
            absolute.write(line, self.origin.wall_time(record.timestamp))?;
            line.push(' ');
        }
        if let Some(ref startup) = self.startup_time {
            startup.write(line, self.origin.elapsed(record.timestamp))?;
            line.push(' ');
        }
        Ok(())
    }

    fn write_body(&self, record: &Record, body: &mut String) -> std::fmt::Result {
        if self.thread_id && !record.thread.is_main {
            write!(body, "[ThreadId={}] ", record.thread.id)?;
        }
        body.push_str(record.logger.as_str());
        body.push_str(" [");
        body.push_str(record.level.to_str());
        body.push(']');

        if let Some(message) = record.message() {
            body.push(' ');
            self.push_sanitized(body, message);
        }
        if let Some(ref error) = record.error {
            write!(body, ": {}", error)?;
        }
        if let Some(ref location) = record.location {
            write!(body, " {}", location)?;
        }
        Ok(())
    }

    fn push_sanitized(&self, body: &mut String, message: &str) {
        match self.sanitizer {
            Some(ref sanitizer) if !(self.fast && self.ascii_skips_sanitizer && is_plain_ascii(message)) => {
                body.push_str(&sanitizer.replace_all(message, ""));
            }
            _ => body.push_str(message),
        }
    }
}

fn is_plain_ascii(text: &str) -> bool {
    text.bytes()
        .all(|b| (0x20..0x7f).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Append `text`, rewriting line terminators and indenting continuation lines.
fn push_lines(out: &mut String, text: &str, normalize: bool, indent: bool) {
    if !normalize && !indent {
        out.push_str(text);
        return;
    }

    let mut rest = text;
    while let Some(pos) = rest.find(['\r', '\n']) {
        out.push_str(&rest[..pos]);
        let terminator = rest.as_bytes()[pos];
        let mut consumed = 1;
        if normalize {
            if terminator == b'\r' && rest.as_bytes().get(pos + 1) == Some(&b'\n') {
                consumed = 2;
            }
            out.push_str(LINE_ENDING);
        } else {
            out.push(char::from(terminator));
        }
        if indent && (normalize || terminator == b'\n') {
            out.push('\t');
        }
        rest = &rest[pos + consumed..];
    }
    out.push_str(rest);
}
