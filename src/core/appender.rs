//! Appender trait for log output destinations

use super::error::Result;
use super::filter::Filters;
use super::formatter::{Formatter, LineBuffer};
use super::name_registry::NameRegistry;
use super::record::Record;
use super::settings::AppenderSettings;
use super::timestamp::ClockOrigin;

/// An output destination.
///
/// Appenders are only ever called by one thread at a time: the consumer, or
/// a caller on the synchronous path holding the same lock.
pub trait Appender: Send {
    /// Filter, format and write one record.
    fn append(&mut self, record: &Record) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn name(&self) -> &str;
}

/// Filters plus formatter plus the reusable line buffer of one appender.
#[derive(Debug)]
pub struct LineRenderer {
    filters: Filters,
    formatter: Formatter,
    buffer: LineBuffer,
}

impl LineRenderer {
    pub fn compile(settings: &AppenderSettings, registry: &NameRegistry, origin: ClockOrigin) -> Result<Self> {
        Ok(Self {
            filters: Filters::compile(
                &settings.include,
                &settings.exclude,
                &settings.prefixes_to_ignore,
                registry,
            )?,
            formatter: Formatter::compile(settings, origin)?,
            buffer: LineBuffer::new(),
        })
    }

    /// The formatted line, or `None` if the filters reject the record.
    pub fn render(&mut self, record: &Record) -> Result<Option<&str>> {
        if !self.filters.is_included(record) {
            return Ok(None);
        }
        self.formatter.format(record, &mut self.buffer).map(Some)
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }
}
