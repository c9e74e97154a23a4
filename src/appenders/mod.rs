//! Appender implementations

pub mod console;
pub mod file;

pub use console::{ConsoleAppender, CONSOLE_CAPTURE_LOGGER};
pub use file::{FileAppender, FileHeader};

pub use crate::core::Appender;
