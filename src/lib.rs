//! # linelog
//!
//! An asynchronous, low-overhead line logging pipeline.
//!
//! ## Features
//!
//! - **Cheap producers**: records are rendered to text on the calling thread
//!   and handed to a consumer thread through a bounded queue of reusable slots
//! - **Compiled filters**: include/exclude lists on logger name, level and
//!   message prefix, with prefixes matched through a radix trie
//! - **Rotating files**: numbered backups and a header block per file
//! - **Console mirror**: with loop prevention for hosts that capture console
//!   output back into the log
//! - **No silent loss**: under pressure producers wait, after shutdown they
//!   write synchronously

pub mod appenders;
pub mod core;
pub mod macros;

pub mod prelude {
    pub use crate::appenders::{ConsoleAppender, FileAppender};
    pub use crate::core::{
        install_panic_hook, Appender, AppenderSettings, FileAppenderSettings, FilterSettings,
        LogLevel, LoggerError, LoggerName, LoggingContext, LoggingContextBuilder, LoggingSettings,
        PipelineMetrics, Record, RecordError, Result, DEFAULT_SHUTDOWN_TIMEOUT,
    };
}

pub use appenders::{ConsoleAppender, FileAppender};
pub use core::{
    install_panic_hook, Appender, AppenderSettings, FileAppenderSettings, FilterSettings, LogLevel,
    LoggerError, LoggerName, LoggingContext, LoggingContextBuilder, LoggingSettings,
    PipelineMetrics, Record, RecordError, Result, DEFAULT_SHUTDOWN_TIMEOUT,
};
