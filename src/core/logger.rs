//! Logging context: the dispatcher producers call into

use super::{
    appender::Appender,
    appender_set::{self, AppenderSet, FatalSink},
    consumer::{self, Pipeline},
    error::{LoggerError, Result},
    log_level::LogLevel,
    metrics::PipelineMetrics,
    name_registry::{LoggerName, NameRegistry},
    queue::{Acquire, RecordQueue},
    record::{CallLocation, FlushSignal, Record, RecordError, ThreadTag},
    settings::{AppenderSettings, FileAppenderSettings, LoggingSettings},
    timestamp::ClockOrigin,
};
use crate::appenders::console::{self, ConsoleAppender, CONSOLE_CAPTURE_LOGGER};
use crate::appenders::file::{FileAppender, FileHeader};
use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use std::cell::Cell;
use std::error::Error as StdError;
use std::fmt::{self, Write as _};
use std::io::Write;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default shutdown timeout for logger cleanup (5 seconds)
///
/// This timeout is used when the context is dropped without explicit shutdown.
/// For custom timeout control, use [`LoggingContext::shutdown_timeout`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Logger name of flush markers
const FLUSH_LOGGER: &str = "Flush";

// Message text is rendered here on the calling thread, then swapped into the
// slot; the slot's previous buffer comes back for the next call.
thread_local! {
    static SCRATCH: Cell<String> = const { Cell::new(String::new()) };
}

/// An initialized logging pipeline.
///
/// `emit` is safe to call from any number of threads. Records from one thread
/// reach every appender in the order they were emitted.
pub struct LoggingContext {
    pipeline: Arc<Pipeline>,
    registry: Arc<NameRegistry>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    async_enabled: bool,
    call_location_enabled: bool,
    origin: ClockOrigin,
    set_id: u64,
    flush_logger: LoggerName,
    console_logger: LoggerName,
}

impl LoggingContext {
    /// Build the appenders described by `settings` and start the consumer.
    pub fn init(settings: LoggingSettings) -> Result<Self> {
        LoggingContextBuilder::from_settings(settings).build()
    }

    /// Create a builder for LoggingContext
    ///
    /// # Example
    /// ```
    /// use linelog::prelude::*;
    ///
    /// let context = LoggingContext::builder()
    ///     .async_mode(false)
    ///     .build()
    ///     .unwrap();
    /// let net = context.intern("Net");
    /// context.emit(&net, LogLevel::Info, "connected").unwrap();
    /// ```
    #[must_use]
    pub fn builder() -> LoggingContextBuilder {
        LoggingContextBuilder::new()
    }

    /// Register a logger name. Filters only recognize names interned through
    /// this context's registry.
    pub fn intern(&self, name: &str) -> LoggerName {
        self.registry.intern(name)
    }

    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.pipeline.metrics
    }

    pub fn origin(&self) -> ClockOrigin {
        self.origin
    }

    pub fn is_async(&self) -> bool {
        self.async_enabled
    }

    /// Records acquired or committed but not yet processed
    pub fn pending(&self) -> usize {
        self.pipeline.queue.len()
    }

    /// Log `message` at `level`.
    #[track_caller]
    pub fn emit(&self, logger: &LoggerName, level: LogLevel, message: impl fmt::Display) -> Result<()> {
        self.log(logger, level, Some(&message as &dyn fmt::Display), None, false)
    }

    /// Log a message built by `factory`, which may return `None` for a record
    /// without a message.
    #[track_caller]
    pub fn emit_with<M, F>(&self, logger: &LoggerName, level: LogLevel, factory: F) -> Result<()>
    where
        M: fmt::Display,
        F: FnOnce() -> Option<M>,
    {
        match factory() {
            Some(message) => self.log(logger, level, Some(&message as &dyn fmt::Display), None, false),
            None => self.log(logger, level, None, None, false),
        }
    }

    /// Log `message` with `error` and its source chain attached. Asks for the
    /// call location, which is captured when enabled in the settings.
    #[track_caller]
    pub fn emit_error(
        &self,
        logger: &LoggerName,
        level: LogLevel,
        message: impl fmt::Display,
        error: &(dyn StdError + 'static),
    ) -> Result<()> {
        self.log(
            logger,
            level,
            Some(&message as &dyn fmt::Display),
            Some(RecordError::from_error(error)),
            true,
        )
    }

    /// Full form of [`emit`](Self::emit).
    ///
    /// The message is rendered to text before this returns; a failing
    /// `Display` impl is the only error reported.
    #[track_caller]
    pub fn log(
        &self,
        logger: &LoggerName,
        level: LogLevel,
        message: Option<&dyn fmt::Display>,
        error: Option<RecordError>,
        want_location: bool,
    ) -> Result<()> {
        let timestamp = Instant::now();
        let caller = Location::caller();

        // A Display impl that logs gets a fresh buffer
        let mut buffer = SCRATCH.with(Cell::take);
        buffer.clear();
        if let Some(message) = message {
            write!(buffer, "{}", message).map_err(|e| LoggerError::message_format(logger.as_str(), e))?;
        }

        let location = (want_location && self.call_location_enabled).then(|| CallLocation::capture(caller));
        let mut record = PendingRecord {
            timestamp,
            logger,
            level,
            has_message: message.is_some(),
            error,
            location,
        };
        self.dispatch(&mut record, &mut buffer);

        SCRATCH.with(|scratch| scratch.set(buffer));
        Ok(())
    }

    /// Feed a line written to the console back into the pipeline under the
    /// `Console` logger. The echo of a line the console appender itself just
    /// wrote on this thread is dropped.
    pub fn capture_console_line(&self, level: LogLevel, text: &str, stack: Option<&str>) -> Result<()> {
        if console::take_ignore_next_capture() {
            return Ok(());
        }
        match stack.filter(|s| !s.trim().is_empty()) {
            Some(stack) => self.emit(&self.console_logger, level, format_args!("{}: {}", text, stack)),
            None => self.emit(&self.console_logger, level, text),
        }
    }

    /// Block until every record this thread emitted before the call has been
    /// written and every appender flushed.
    ///
    /// Does nothing when called from inside one of this context's appenders.
    pub fn flush(&self) -> Result<()> {
        if appender_set::is_dispatching_to(self.set_id) {
            return Ok(());
        }

        if self.async_enabled && !self.pipeline.is_consumer_thread() {
            let (signal, waiter) = FlushSignal::pair();
            if let Acquire::Slot(mut slot) = self.pipeline.queue.try_acquire_slot() {
                slot.timestamp = Instant::now();
                slot.logger = self.flush_logger.clone();
                slot.thread = ThreadTag::current();
                slot.flush_signal = Some(signal);
                slot.commit();

                if waiter.wait() {
                    return Ok(());
                }
                self.flush_sync();
                return Err(LoggerError::writer("consumer stopped before the flush completed"));
            }
            self.wait_for_drain();
        }

        self.flush_sync();
        Ok(())
    }

    /// Stop accepting queued records, drain the queue and flush, waiting at
    /// most [`DEFAULT_SHUTDOWN_TIMEOUT`] for the consumer.
    pub fn shutdown(&self) -> bool {
        self.shutdown_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Gracefully shut the pipeline down with a custom timeout
    ///
    /// Records emitted afterwards are still written, synchronously on the
    /// calling thread.
    ///
    /// # Returns
    ///
    /// `true` if the consumer drained the queue within `timeout`
    pub fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.pipeline.queue.begin_shutdown();

        // Cannot wait for ourselves
        if self.pipeline.is_consumer_thread() || appender_set::is_dispatching_to(self.set_id) {
            return true;
        }

        if let Some(handle) = self.consumer.lock().take() {
            let start = Instant::now();
            loop {
                if handle.is_finished() {
                    if let Err(e) = handle.join() {
                        eprintln!("[LOGGER ERROR] Consumer thread panicked during shutdown: {:?}", e);
                        return false;
                    }
                    break;
                }

                if start.elapsed() >= timeout {
                    eprintln!(
                        "[LOGGER WARNING] Consumer thread did not finish within {:?} timeout. \
                         Some logs may not be written yet.",
                        timeout
                    );
                    return false;
                }

                thread::sleep(Duration::from_millis(10));
            }
        }

        self.flush_sync();
        true
    }

    /// Whether the consumer has drained the queue and exited.
    pub fn is_shutdown_complete(&self) -> bool {
        !self.async_enabled || self.pipeline.is_shutdown_complete()
    }

    pub(crate) fn is_dispatching(&self) -> bool {
        appender_set::is_dispatching()
    }

    fn dispatch(&self, pending: &mut PendingRecord<'_>, buffer: &mut String) {
        if appender_set::is_dispatching_to(self.set_id) {
            // Emitted from inside one of our appenders
            let mut record = pending.to_record();
            record.swap_message(buffer, pending.has_message);
            if let Err(record) = appender_set::defer(self.set_id, record) {
                self.process_sync(&record);
            }
            return;
        }

        if self.async_enabled && !self.pipeline.is_consumer_thread() {
            match self.pipeline.queue.try_acquire_slot() {
                Acquire::Slot(mut slot) => {
                    slot.timestamp = pending.timestamp;
                    slot.logger = pending.logger.clone();
                    slot.level = pending.level;
                    slot.thread = ThreadTag::current();
                    slot.error = pending.error.take();
                    slot.location = pending.location.take();
                    slot.swap_message(buffer, pending.has_message);
                    slot.commit();
                    self.pipeline.metrics.record_committed();
                    return;
                }
                // Earlier records of this thread may still be queued
                Acquire::Unavailable => self.wait_for_drain(),
            }
        }

        let mut record = pending.to_record();
        record.swap_message(buffer, pending.has_message);
        self.process_sync(&record);
        // Keep the scratch allocation
        record.swap_message(buffer, false);
    }

    /// Wait for the consumer to empty the queue and exit.
    fn wait_for_drain(&self) {
        let backoff = Backoff::new();
        while !self.pipeline.is_shutdown_complete() {
            if backoff.is_completed() {
                thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    fn process_sync(&self, record: &Record) {
        self.pipeline.appenders.lock().process(record);
        self.pipeline.metrics.record_sync_processed();
    }

    fn flush_sync(&self) {
        self.pipeline.appenders.lock().flush_all();
        self.pipeline.metrics.record_flush();
    }
}

/// Caller-side pieces of a record before it has a slot.
struct PendingRecord<'a> {
    timestamp: Instant,
    logger: &'a LoggerName,
    level: LogLevel,
    has_message: bool,
    error: Option<RecordError>,
    location: Option<CallLocation>,
}

impl PendingRecord<'_> {
    fn to_record(&mut self) -> Record {
        let mut record = Record::new(self.logger.clone(), self.level, None).with_timestamp(self.timestamp);
        record.error = self.error.take();
        record.location = self.location.take();
        record
    }
}

impl Drop for LoggingContext {
    fn drop(&mut self) {
        if !self.shutdown() {
            eprintln!("[LOGGER WARNING] Logging context dropped before the queue was drained");
        }
    }
}

impl fmt::Debug for LoggingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingContext")
            .field("async_enabled", &self.async_enabled)
            .field("call_location_enabled", &self.call_location_enabled)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// Builder for constructing a LoggingContext with a fluent API
///
/// # Example
/// ```no_run
/// use linelog::prelude::*;
///
/// let context = LoggingContext::builder()
///     .file(FileAppenderSettings::new("logs/game.log")
///         .with_settings(AppenderSettings::new().with_rotation_count(3)))
///     .console(AppenderSettings::new())
///     .fatal_error_path("logs/fatal.log")
///     .queue_capacity(4096)
///     .build()
///     .unwrap();
/// ```
pub struct LoggingContextBuilder {
    settings: LoggingSettings,
    appenders: Vec<Box<dyn Appender>>,
    console_writer: Option<Box<dyn Write + Send>>,
    registry: Option<Arc<NameRegistry>>,
}

impl LoggingContextBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::from_settings(LoggingSettings::default())
    }

    pub fn from_settings(settings: LoggingSettings) -> Self {
        Self {
            settings,
            appenders: Vec::new(),
            console_writer: None,
            registry: None,
        }
    }

    /// Format and write on a consumer thread (default) or on the caller
    #[must_use = "builder methods return a new value"]
    pub fn async_mode(mut self, enabled: bool) -> Self {
        self.settings.async_enabled = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.settings.queue_capacity = capacity;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn call_location(mut self, enabled: bool) -> Self {
        self.settings.call_location_enabled = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn product_banner(mut self, banner: impl Into<String>) -> Self {
        self.settings.product_banner = banner.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn fatal_error_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.fatal_error_path = Some(path.into());
        self
    }

    /// Add a rotating file appender
    #[must_use = "builder methods return a new value"]
    pub fn file(mut self, file: FileAppenderSettings) -> Self {
        self.settings.appenders.push(file);
        self
    }

    /// Mirror to the console with these settings
    #[must_use = "builder methods return a new value"]
    pub fn console(mut self, settings: AppenderSettings) -> Self {
        self.settings.console = Some(settings);
        self
    }

    /// Send the console mirror to `writer` instead of stdout/stderr
    #[must_use = "builder methods return a new value"]
    pub fn console_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.console_writer = Some(writer);
        self
    }

    /// Add a custom appender after the configured ones
    #[must_use = "builder methods return a new value"]
    pub fn appender<A: Appender + 'static>(mut self, appender: A) -> Self {
        self.appenders.push(Box::new(appender));
        self
    }

    /// Intern names through `registry`, e.g. one custom appenders were
    /// compiled against
    #[must_use = "builder methods return a new value"]
    pub fn registry(mut self, registry: Arc<NameRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the LoggingContext
    pub fn build(self) -> Result<LoggingContext> {
        let settings = self.settings;
        settings.validate()?;

        let origin = ClockOrigin::now();
        let registry = self.registry.unwrap_or_default();
        let metrics = Arc::new(PipelineMetrics::new());
        let mut set = AppenderSet::new(FatalSink::new(settings.fatal_error_path.clone()), Arc::clone(&metrics));

        for file in &settings.appenders {
            let header = FileHeader::new(settings.product_banner.clone(), origin);
            set.push(Box::new(FileAppender::new(file, header, &registry, origin)?));
        }
        if let Some(ref console_settings) = settings.console {
            let appender = match self.console_writer {
                Some(writer) => ConsoleAppender::with_writer(console_settings, &registry, origin, writer)?,
                None => ConsoleAppender::new(console_settings, &registry, origin)?,
            };
            set.push(Box::new(appender));
        }
        for appender in self.appenders {
            set.push(appender);
        }

        let set_id = set.id();
        let pipeline = Arc::new(Pipeline::new(
            RecordQueue::new(settings.queue_capacity),
            set,
            metrics,
        ));
        let consumer = if settings.async_enabled {
            Some(consumer::spawn(Arc::clone(&pipeline))?)
        } else {
            None
        };

        Ok(LoggingContext {
            pipeline,
            flush_logger: registry.intern(FLUSH_LOGGER),
            console_logger: registry.intern(CONSOLE_CAPTURE_LOGGER),
            registry,
            consumer: Mutex::new(consumer),
            async_enabled: settings.async_enabled,
            call_location_enabled: settings.call_location_enabled,
            origin,
            set_id,
        })
    }
}

impl Default for LoggingContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
