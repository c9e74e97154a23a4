//! Logging macros for ergonomic log message formatting.
//!
//! The message is passed through `format_args!`, so it is rendered once,
//! straight into the record buffer, without an intermediate `String`. Every
//! macro evaluates to the [`Result`](crate::Result) of the emit call.
//!
//! # Examples
//!
//! ```
//! use linelog::prelude::*;
//! use linelog::info;
//!
//! let context = LoggingContext::builder().async_mode(false).build().unwrap();
//! let server = context.intern("Server");
//!
//! // Basic logging
//! info!(context, server, "Server started").unwrap();
//!
//! // With format arguments
//! let port = 8080;
//! info!(context, server, "Server listening on port {}", port).unwrap();
//! ```

/// Log a message at an explicit level.
///
/// # Examples
///
/// ```
/// # use linelog::prelude::*;
/// # let context = LoggingContext::builder().async_mode(false).build().unwrap();
/// use linelog::emit;
/// let db = context.intern("Db");
/// emit!(context, db, LogLevel::Info, "Simple message").unwrap();
/// emit!(context, db, LogLevel::Error, "Error code: {}", 500).unwrap();
/// ```
#[macro_export]
macro_rules! emit {
    ($context:expr, $logger:expr, $level:expr, $($arg:tt)+) => {
        $context.emit(&$logger, $level, format_args!($($arg)+))
    };
}

/// Log a trace-level message.
#[macro_export]
macro_rules! trace {
    ($context:expr, $logger:expr, $($arg:tt)+) => {
        $crate::emit!($context, $logger, $crate::LogLevel::Trace, $($arg)+)
    };
}

/// Log a debug-level message.
#[macro_export]
macro_rules! debug {
    ($context:expr, $logger:expr, $($arg:tt)+) => {
        $crate::emit!($context, $logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Log an info-level message.
#[macro_export]
macro_rules! info {
    ($context:expr, $logger:expr, $($arg:tt)+) => {
        $crate::emit!($context, $logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Log a warning-level message.
///
/// # Examples
///
/// ```
/// # use linelog::prelude::*;
/// # let context = LoggingContext::builder().async_mode(false).build().unwrap();
/// use linelog::warn;
/// let disk = context.intern("Disk");
/// warn!(context, disk, "Retry attempt {} of {}", 3, 5).unwrap();
/// ```
#[macro_export]
macro_rules! warn {
    ($context:expr, $logger:expr, $($arg:tt)+) => {
        $crate::emit!($context, $logger, $crate::LogLevel::Warn, $($arg)+)
    };
}

/// Log an error-level message.
#[macro_export]
macro_rules! error {
    ($context:expr, $logger:expr, $($arg:tt)+) => {
        $crate::emit!($context, $logger, $crate::LogLevel::Error, $($arg)+)
    };
}

/// Log a fatal-level message.
#[macro_export]
macro_rules! fatal {
    ($context:expr, $logger:expr, $($arg:tt)+) => {
        $crate::emit!($context, $logger, $crate::LogLevel::Fatal, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use crate::core::{Appender, LogLevel, LoggingContext, Record, Result};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Collect(Arc<Mutex<Vec<(LogLevel, String)>>>);

    impl Appender for Collect {
        fn append(&mut self, record: &Record) -> Result<()> {
            self.0
                .lock()
                .push((record.level, record.message_or_empty().to_string()));
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "collect"
        }
    }

    #[test]
    fn test_level_macros() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let context = LoggingContext::builder()
            .async_mode(false)
            .appender(Collect(Arc::clone(&seen)))
            .build()
            .unwrap();
        let app = context.intern("App");

        trace!(context, app, "Value: {}", 10).unwrap();
        debug!(context, app, "Count: {}", 5).unwrap();
        info!(context, app, "Items: {}", 100).unwrap();
        warn!(context, app, "Retry {} of {}", 1, 3).unwrap();
        error!(context, app, "Code: {}", 500).unwrap();
        fatal!(context, app, "Unable to recover: {}", "disk full").unwrap();
        emit!(context, &app, LogLevel::Info, "by reference").unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                (LogLevel::Trace, "Value: 10".to_string()),
                (LogLevel::Debug, "Count: 5".to_string()),
                (LogLevel::Info, "Items: 100".to_string()),
                (LogLevel::Warn, "Retry 1 of 3".to_string()),
                (LogLevel::Error, "Code: 500".to_string()),
                (LogLevel::Fatal, "Unable to recover: disk full".to_string()),
                (LogLevel::Info, "by reference".to_string()),
            ]
        );
    }
}
