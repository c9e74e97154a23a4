//! Log record and the pieces captured on the calling thread

use super::log_level::LogLevel;
use super::name_registry::LoggerName;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

// Thread-local cache so the hot path never touches `thread::current()`
thread_local! {
    static THREAD_TAG_CACHE: Cell<Option<ThreadTag>> = const { Cell::new(None) };
}

/// Identity of the thread a record was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadTag {
    /// Small process-unique number, assigned in order of first log call
    pub id: u64,
    pub is_main: bool,
}

impl ThreadTag {
    pub fn current() -> Self {
        THREAD_TAG_CACHE.with(|cache| {
            if let Some(tag) = cache.get() {
                return tag;
            }
            let tag = ThreadTag {
                id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
                is_main: std::thread::current().name() == Some("main"),
            };
            cache.set(Some(tag));
            tag
        })
    }
}

/// Error attached to a record, rendered to text on the calling thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub message: String,
    /// `source()` chain, outermost first
    pub causes: Vec<String>,
    pub backtrace: Option<String>,
}

impl RecordError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
            backtrace: None,
        }
    }

    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            causes,
            backtrace: None,
        }
    }

    #[must_use]
    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, "\nCaused by: {}", cause)?;
        }
        if let Some(ref backtrace) = self.backtrace {
            write!(f, "\n{}", backtrace)?;
        }
        Ok(())
    }
}

/// Where a record was emitted from.
///
/// The backtrace is captured on the calling thread but only symbolized when
/// the formatter renders it on the consumer thread.
#[derive(Debug)]
pub struct CallLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
    pub backtrace: Option<Backtrace>,
}

impl CallLocation {
    /// File and line only.
    pub fn caller(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
            backtrace: None,
        }
    }

    /// File, line and a full stack walk.
    pub fn capture(location: &'static Location<'static>) -> Self {
        Self {
            backtrace: Some(Backtrace::force_capture()),
            ..Self::caller(location)
        }
    }
}

impl fmt::Display for CallLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}:{}:{}", self.file, self.line, self.column)?;
        if let Some(ref backtrace) = self.backtrace {
            write!(f, "\n{}", backtrace)?;
        }
        Ok(())
    }
}

/// Raised by the consumer once a flush record has been fully processed.
#[derive(Debug)]
pub struct FlushSignal(Sender<()>);

/// Caller side of a [`FlushSignal`].
#[derive(Debug)]
pub struct FlushWaiter(Receiver<()>);

impl FlushSignal {
    pub fn pair() -> (FlushSignal, FlushWaiter) {
        let (tx, rx) = bounded(1);
        (FlushSignal(tx), FlushWaiter(rx))
    }

    pub fn raise(self) {
        // Waiter may have given up already
        let _ = self.0.try_send(());
    }
}

impl FlushWaiter {
    /// Block until the signal is raised. Returns `false` if the signal was
    /// dropped without being raised.
    pub fn wait(self) -> bool {
        self.0.recv().is_ok()
    }
}

fn unnamed() -> LoggerName {
    static UNNAMED: OnceLock<LoggerName> = OnceLock::new();
    UNNAMED
        .get_or_init(|| crate::core::name_registry::NameRegistry::new().intern(""))
        .clone()
}

/// One log record.
///
/// Records double as queue slots: the consumer resets them in place so their
/// message buffer keeps its capacity for the next producer.
#[derive(Debug)]
pub struct Record {
    pub timestamp: Instant,
    pub logger: LoggerName,
    pub level: LogLevel,
    message: String,
    has_message: bool,
    pub error: Option<RecordError>,
    pub location: Option<CallLocation>,
    pub thread: ThreadTag,
    pub(crate) flush_signal: Option<FlushSignal>,
}

impl Record {
    pub fn new(logger: LoggerName, level: LogLevel, message: Option<&str>) -> Self {
        let mut record = Self::empty();
        record.logger = logger;
        record.level = level;
        record.thread = ThreadTag::current();
        if let Some(text) = message {
            record.message.push_str(text);
            record.has_message = true;
        }
        record
    }

    pub(crate) fn empty() -> Self {
        Self {
            timestamp: Instant::now(),
            logger: unnamed(),
            level: LogLevel::Info,
            message: String::new(),
            has_message: false,
            error: None,
            location: None,
            thread: ThreadTag { id: 0, is_main: false },
            flush_signal: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: RecordError) -> Self {
        self.error = Some(error);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The message text, `None` for a record logged without a message.
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.has_message.then_some(self.message.as_str())
    }

    /// Message text or the empty string; what filters match against.
    #[inline]
    pub fn message_or_empty(&self) -> &str {
        if self.has_message {
            &self.message
        } else {
            ""
        }
    }

    /// Swap `buffer` in as the message. The previous message buffer is handed
    /// back through `buffer` so the caller can reuse its allocation.
    pub(crate) fn swap_message(&mut self, buffer: &mut String, present: bool) {
        std::mem::swap(&mut self.message, buffer);
        self.has_message = present;
    }

    pub fn is_flush(&self) -> bool {
        self.flush_signal.is_some()
    }

    pub(crate) fn take_flush_signal(&mut self) -> Option<FlushSignal> {
        self.flush_signal.take()
    }

    /// Clear everything except the message buffer's capacity.
    pub(crate) fn reset(&mut self) {
        self.message.clear();
        self.has_message = false;
        self.error = None;
        self.location = None;
        self.flush_signal = None;
    }
}

#[cfg(test)]
pub(crate) fn message_capacity(record: &Record) -> usize {
    record.message.capacity()
}

/// A flush record shares the logger name of the flushing context.
pub(crate) fn flush_record(logger: LoggerName, signal: FlushSignal) -> Record {
    let mut record = Record::empty();
    record.logger = logger;
    record.thread = ThreadTag::current();
    record.flush_signal = Some(signal);
    record
}
