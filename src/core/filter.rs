//! Include/exclude filters compiled per appender

use super::error::{LoggerError, Result};
use super::log_level::LogLevel;
use super::name_registry::{LoggerName, NameRegistry};
use super::record::Record;
use super::trie::PrefixTrie;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declarative form of a [`Filter`].
///
/// Every criterion that is set must match. A filter with no criteria matches
/// every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub logger_names: Option<Vec<String>>,
    pub levels: Option<Vec<LogLevel>>,
    pub message_prefixes: Option<Vec<String>>,
}

impl FilterSettings {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_logger(mut self, name: impl Into<String>) -> Self {
        self.logger_names.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.levels.get_or_insert_with(Vec::new).push(level);
        self
    }

    #[must_use]
    pub fn with_message_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.message_prefixes.get_or_insert_with(Vec::new).push(prefix.into());
        self
    }
}

impl fmt::Display for FilterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref names) = self.logger_names {
            parts.push(format!("logger_names[{}]", names.join(",")));
        }
        if let Some(ref levels) = self.levels {
            let levels: Vec<&str> = levels.iter().map(LogLevel::to_str).collect();
            parts.push(format!("levels[{}]", levels.join(",")));
        }
        if let Some(ref prefixes) = self.message_prefixes {
            parts.push(format!("message_prefixes[{}]", prefixes.join(",")));
        }
        write!(f, "filter[{}]", parts.join(","))
    }
}

/// Conjunction of logger, level and message prefix criteria.
#[derive(Debug, Clone)]
pub struct Filter {
    logger_names: Option<Vec<LoggerName>>,
    level_mask: Option<u8>,
    prefixes: Option<PrefixTrie>,
}

impl Filter {
    pub fn compile(settings: &FilterSettings, registry: &NameRegistry) -> Self {
        Self {
            logger_names: settings
                .logger_names
                .as_ref()
                .map(|names| names.iter().map(|n| registry.intern(n)).collect()),
            level_mask: settings
                .levels
                .as_ref()
                .map(|levels| levels.iter().fold(0u8, |mask, level| mask | level.bit())),
            prefixes: settings.message_prefixes.as_ref().map(PrefixTrie::new),
        }
    }

    #[inline]
    pub fn is_match(&self, record: &Record) -> bool {
        if let Some(ref names) = self.logger_names {
            if !names.iter().any(|name| name.ptr_eq(&record.logger)) {
                return false;
            }
        }

        if let Some(mask) = self.level_mask {
            if mask & record.level.bit() == 0 {
                return false;
            }
        }

        if let Some(ref prefixes) = self.prefixes {
            if !prefixes.matches(record.message_or_empty()) {
                return false;
            }
        }

        true
    }
}

/// An appender's compiled include and exclude lists.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    include: Vec<Filter>,
    exclude: Vec<Filter>,
}

impl Filters {
    /// Compile include and exclude filters. Legacy line prefixes are turned
    /// into additional exclude filters.
    pub fn compile(
        include: &[FilterSettings],
        exclude: &[FilterSettings],
        prefixes_to_ignore: &[String],
        registry: &NameRegistry,
    ) -> Result<Self> {
        let mut excludes: Vec<Filter> = exclude.iter().map(|s| Filter::compile(s, registry)).collect();
        for settings in legacy_exclude_settings(prefixes_to_ignore)? {
            excludes.push(Filter::compile(&settings, registry));
        }

        Ok(Self {
            include: include.iter().map(|s| Filter::compile(s, registry)).collect(),
            exclude: excludes,
        })
    }

    /// Exclusion wins over inclusion; no include filters means include all.
    #[inline]
    pub fn is_included(&self, record: &Record) -> bool {
        if self.exclude.iter().any(|f| f.is_match(record)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|f| f.is_match(record))
    }

    pub fn include_count(&self) -> usize {
        self.include.len()
    }

    pub fn exclude_count(&self) -> usize {
        self.exclude.len()
    }
}

const LINE_PREFIX_PATTERN: &str = r"^([^\]]+)(?: \[([^\]]+)\](?: (.+))?)?$";

/// Parse one legacy ignore line of the form `Logger [LEVEL] message prefix`.
/// Level and message prefix are optional; the prefix requires a level.
pub fn parse_line_prefix(line: &str) -> Result<FilterSettings> {
    let pattern = Regex::new(LINE_PREFIX_PATTERN)
        .map_err(|e| LoggerError::config("prefixes_to_ignore", e.to_string()))?;
    parse_with(&pattern, line)
}

fn parse_with(pattern: &Regex, line: &str) -> Result<FilterSettings> {
    let captures = pattern.captures(line).ok_or_else(|| {
        LoggerError::config(
            "prefixes_to_ignore",
            format!("'{}' does not match `Logger [LEVEL] prefix`", line),
        )
    })?;

    let mut settings = FilterSettings::new().with_logger(&captures[1]);
    if let Some(level) = captures.get(2) {
        let level: LogLevel = level
            .as_str()
            .parse()
            .map_err(|e: String| LoggerError::config("prefixes_to_ignore", e))?;
        settings = settings.with_level(level);
        if let Some(prefix) = captures.get(3) {
            settings = settings.with_message_prefix(prefix.as_str());
        }
    }
    Ok(settings)
}

/// Convert legacy ignore lines into exclude filter settings.
///
/// Lines are sorted by logger, then level, then prefix. Lines for the same
/// logger and level share one filter, and a line without level or prefix
/// swallows the narrower lines that follow it.
pub fn legacy_exclude_settings(lines: &[String]) -> Result<Vec<FilterSettings>> {
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = Regex::new(LINE_PREFIX_PATTERN)
        .map_err(|e| LoggerError::config("prefixes_to_ignore", e.to_string()))?;
    let mut parsed = lines
        .iter()
        .map(|line| parse_with(&pattern, line))
        .collect::<Result<Vec<_>>>()?;
    parsed.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let mut merged: Vec<FilterSettings> = Vec::new();
    for current in parsed {
        if let Some(last) = merged.last_mut() {
            if absorb(last, &current) {
                continue;
            }
        }
        merged.push(current);
    }
    Ok(merged)
}

fn first_str(values: &Option<Vec<String>>) -> Option<&str> {
    values.as_ref().and_then(|v| v.first()).map(String::as_str)
}

fn sort_key(settings: &FilterSettings) -> (Option<&str>, Option<LogLevel>, Option<&str>) {
    (
        first_str(&settings.logger_names),
        settings.levels.as_ref().and_then(|l| l.first()).copied(),
        first_str(&settings.message_prefixes),
    )
}

fn absorb(last: &mut FilterSettings, other: &FilterSettings) -> bool {
    if last.logger_names != other.logger_names {
        return false;
    }
    if last.levels.is_none() {
        return true;
    }
    if last.levels != other.levels {
        return false;
    }
    match (&mut last.message_prefixes, &other.message_prefixes) {
        (None, _) => true,
        (Some(mine), Some(theirs)) => {
            mine.extend(theirs.iter().cloned());
            true
        }
        // Sorting puts prefix-less lines first, so this cannot follow a prefixed one
        (Some(_), None) => false,
    }
}
