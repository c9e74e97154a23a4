//! Route uncaught panics through a logging context

use super::appender_set::panic_message;
use super::log_level::LogLevel;
use super::logger::LoggingContext;
use super::record::RecordError;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic;
use std::sync::Arc;
use std::thread;

/// Logger name of panic records
pub const PANIC_LOGGER: &str = "Panic";

/// Log every panic at [`LogLevel::Fatal`] through `context` and flush it
/// before the previously installed hook runs.
///
/// The hook holds a weak reference: once the context is dropped panics go
/// straight to the previous hook. Panics raised inside an appender are left to
/// the appender set, which reports them to the fatal sink.
pub fn install_panic_hook(context: &Arc<LoggingContext>) {
    let weak = Arc::downgrade(context);
    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        if let Some(context) = weak.upgrade() {
            if !context.is_dispatching() {
                let thread = thread::current();
                let error = RecordError::new(panic_message(info.payload()))
                    .with_backtrace(Backtrace::force_capture().to_string());
                let name = thread.name().unwrap_or("<unnamed>");
                let message = match info.location() {
                    Some(location) => format!("thread '{}' panicked at {}", name, location),
                    None => format!("thread '{}' panicked", name),
                };
                let logger = context.intern(PANIC_LOGGER);
                let result = context.log(
                    &logger,
                    LogLevel::Fatal,
                    Some(&message as &dyn fmt::Display),
                    Some(error),
                    false,
                );
                if let Err(e) = result.and_then(|()| context.flush()) {
                    eprintln!("[LOGGER ERROR] Failed to log panic: {}", e);
                }
            }
        }
        previous(info);
    }));
}
