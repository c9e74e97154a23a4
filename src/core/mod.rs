//! Core pipeline types: records, queue, filters, formatter and dispatcher

pub mod appender;
pub mod appender_set;
pub mod consumer;
pub mod error;
pub mod filter;
pub mod formatter;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod name_registry;
pub mod panic_hook;
pub mod queue;
pub mod record;
pub mod settings;
pub mod timestamp;
pub mod trie;

pub use appender::{Appender, LineRenderer};
pub use appender_set::{AppenderSet, FatalSink};
pub use consumer::CONSUMER_THREAD_NAME;
pub use error::{LoggerError, Result};
pub use filter::{Filter, FilterSettings, Filters};
pub use formatter::{Formatter, LineBuffer, LINE_ENDING};
pub use log_level::LogLevel;
pub use logger::{LoggingContext, LoggingContextBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use metrics::PipelineMetrics;
pub use name_registry::{LoggerName, NameRegistry};
pub use panic_hook::{install_panic_hook, PANIC_LOGGER};
pub use queue::{Acquire, RecordQueue, SlotHandle, SlotState, Take, TakenSlot, DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY};
pub use record::{CallLocation, Record, RecordError, ThreadTag};
pub use settings::{AppenderSettings, FileAppenderSettings, LoggingSettings};
pub use timestamp::ClockOrigin;
pub use trie::PrefixTrie;
