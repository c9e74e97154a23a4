//! Integration tests for the logging pipeline
//!
//! These tests verify:
//! - Per-producer ordering and no loss under backpressure
//! - Flush as a barrier
//! - Synchronous fallback (async disabled, after shutdown)
//! - Filter composition and legacy line prefixes
//! - File rotation across runs
//! - Fatal-error reporting
//! - Console loop prevention

use linelog::appenders::file::backup_path;
use linelog::prelude::*;
use parking_lot::Mutex;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const HEADER_LINES: usize = 4;

fn body_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("Failed to read log file")
        .lines()
        .skip(HEADER_LINES)
        .map(str::to_string)
        .collect()
}

fn plain() -> AppenderSettings {
    AppenderSettings::new().with_startup_time(false).with_thread_id(false)
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().clone()).expect("console output is UTF-8")
    }
}

#[test]
fn test_per_producer_order_under_backpressure() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("order.log");

    // Tiny queue so producers keep running into a full queue
    let context = Arc::new(
        LoggingContext::builder()
            .queue_capacity(4)
            .file(FileAppenderSettings::new(&log_file).with_settings(plain()))
            .build()
            .expect("Failed to build context"),
    );

    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 500;

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let context = Arc::clone(&context);
            thread::spawn(move || {
                let logger = context.intern(&format!("P{}", p));
                for i in 0..PER_PRODUCER {
                    context.emit(&logger, LogLevel::Info, i).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    context.flush().unwrap();

    let lines = body_lines(&log_file);
    assert_eq!(lines.len(), PRODUCERS * PER_PRODUCER, "no record may be lost");

    for p in 0..PRODUCERS {
        let prefix = format!("P{} [INFO] ", p);
        let sequence: Vec<usize> = lines
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(sequence, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
    assert_eq!(context.metrics().committed() as usize, PRODUCERS * PER_PRODUCER);
}

#[test]
fn test_flush_is_a_barrier() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("flush.log");

    let context = LoggingContext::builder()
        .file(FileAppenderSettings::new(&log_file).with_settings(plain()))
        .build()
        .unwrap();
    let app = context.intern("App");

    for round in 0..5 {
        context.emit(&app, LogLevel::Info, format_args!("round {}", round)).unwrap();
        context.flush().unwrap();

        // Durable as soon as flush returns
        let lines = body_lines(&log_file);
        assert_eq!(lines.last().map(String::as_str), Some(format!("App [INFO] round {}", round).as_str()));
        assert_eq!(lines.len(), round + 1);
    }
}

#[test]
fn test_sync_mode_writes_on_caller() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("sync.log");

    let context = LoggingContext::builder()
        .async_mode(false)
        .file(FileAppenderSettings::new(&log_file).with_settings(plain()))
        .build()
        .unwrap();
    let app = context.intern("App");

    context.emit(&app, LogLevel::Warn, "no consumer thread").unwrap();
    context.flush().unwrap();

    assert_eq!(body_lines(&log_file), vec!["App [WARN] no consumer thread"]);
    assert_eq!(context.metrics().sync_processed(), 1);
    assert_eq!(context.metrics().committed(), 0);
}

#[test]
fn test_emit_after_shutdown_is_not_lost() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("shutdown.log");

    let context = Arc::new(
        LoggingContext::builder()
            .file(FileAppenderSettings::new(&log_file).with_settings(plain()))
            .build()
            .unwrap(),
    );
    let app = context.intern("App");
    context.emit(&app, LogLevel::Info, "before").unwrap();
    assert!(context.shutdown());

    let late = {
        let context = Arc::clone(&context);
        thread::spawn(move || {
            let late = context.intern("Late");
            context.emit(&late, LogLevel::Info, "after shutdown").unwrap();
        })
    };
    late.join().unwrap();
    context.flush().unwrap();

    assert_eq!(
        body_lines(&log_file),
        vec!["App [INFO] before", "Late [INFO] after shutdown"]
    );
}

#[test]
fn test_filter_composition() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("filtered.log");

    let settings = plain()
        .with_exclude(FilterSettings::new().with_level(LogLevel::Error))
        .with_include(FilterSettings::new().with_logger("X"));
    let context = LoggingContext::builder()
        .async_mode(false)
        .file(FileAppenderSettings::new(&log_file).with_settings(settings))
        .build()
        .unwrap();
    let x = context.intern("X");
    let y = context.intern("Y");

    context.emit(&x, LogLevel::Info, "kept").unwrap();
    context.emit(&x, LogLevel::Error, "excluded level").unwrap();
    context.emit(&y, LogLevel::Info, "not included").unwrap();
    context.flush().unwrap();

    assert_eq!(body_lines(&log_file), vec!["X [INFO] kept"]);
}

#[test]
fn test_legacy_prefixes_to_ignore() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("legacy.log");

    let settings = plain()
        .with_prefix_to_ignore("Net [DEBUG] heartbeat")
        .with_prefix_to_ignore("Net [DEBUG] ping")
        .with_prefix_to_ignore("Audio");
    let context = LoggingContext::builder()
        .async_mode(false)
        .file(FileAppenderSettings::new(&log_file).with_settings(settings))
        .build()
        .unwrap();
    let net = context.intern("Net");
    let audio = context.intern("Audio");

    context.emit(&net, LogLevel::Debug, "heartbeat 12").unwrap();
    context.emit(&net, LogLevel::Debug, "ping 3ms").unwrap();
    context.emit(&net, LogLevel::Debug, "packet lost").unwrap();
    context.emit(&net, LogLevel::Info, "heartbeat 13").unwrap();
    context.emit(&audio, LogLevel::Error, "device lost").unwrap();
    context.flush().unwrap();

    assert_eq!(
        body_lines(&log_file),
        vec!["Net [DEBUG] packet lost", "Net [INFO] heartbeat 13"]
    );
}

#[test]
fn test_rotation_across_runs() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("game.log");

    for run in 0..3 {
        let context = LoggingContext::builder()
            .product_banner("Rotation Test")
            .file(
                FileAppenderSettings::new(&log_file)
                    .with_settings(plain().with_rotation_count(2)),
            )
            .build()
            .unwrap();
        let app = context.intern("App");
        context.emit(&app, LogLevel::Info, format_args!("run {}", run)).unwrap();
        assert!(context.shutdown());
    }

    assert_eq!(body_lines(&log_file), vec!["App [INFO] run 2"]);
    assert_eq!(body_lines(&backup_path(&log_file, 1)), vec!["App [INFO] run 1"]);
    assert_eq!(body_lines(&backup_path(&log_file, 2)), vec!["App [INFO] run 0"]);
    assert!(!backup_path(&log_file, 3).exists());

    for index in 0..=2 {
        let contents = fs::read_to_string(backup_path(&log_file, index)).unwrap();
        assert!(contents.starts_with("Rotation Test (linelog v"));
        assert!(contents.lines().nth(2).unwrap().chars().all(|c| c == '-'));
    }
}

#[test]
fn test_appender_failure_goes_to_fatal_file() {
    struct Broken;

    impl Appender for Broken {
        fn append(&mut self, _record: &Record) -> Result<()> {
            Err(LoggerError::writer("device unplugged"))
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("app.log");
    let fatal_file = temp_dir.path().join("fatal.log");

    let context = LoggingContext::builder()
        .appender(Broken)
        .file(FileAppenderSettings::new(&log_file).with_settings(plain()))
        .fatal_error_path(&fatal_file)
        .build()
        .unwrap();
    let app = context.intern("App");

    context.emit(&app, LogLevel::Info, "delivered anyway").unwrap();
    context.flush().unwrap();

    assert_eq!(body_lines(&log_file), vec!["App [INFO] delivered anyway"]);
    let fatal = fs::read_to_string(&fatal_file).unwrap();
    assert!(fatal.contains("appender 'broken' failed"));
    assert!(fatal.contains("device unplugged"));
    assert_eq!(context.metrics().appender_failures(), 1);
}

#[test]
fn test_console_capture_loop_prevention() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("console.log");
    let console = SharedBuffer::default();

    let context = LoggingContext::builder()
        .async_mode(false)
        .file(FileAppenderSettings::new(&log_file).with_settings(plain()))
        .console(plain())
        .console_writer(Box::new(console.clone()))
        .build()
        .unwrap();
    let app = context.intern("App");

    context.emit(&app, LogLevel::Info, "mirrored").unwrap();
    // Host hook sees the mirrored line and feeds it back: dropped
    context
        .capture_console_line(LogLevel::Info, "App [INFO] mirrored", None)
        .unwrap();
    // Genuine host console output: logged, but never mirrored back out
    context
        .capture_console_line(LogLevel::Warn, "shader cache miss", None)
        .unwrap();
    context.flush().unwrap();

    assert_eq!(
        body_lines(&log_file),
        vec!["App [INFO] mirrored", "Console [WARN] shader cache miss"]
    );
    assert_eq!(console.contents().lines().collect::<Vec<_>>(), vec!["App [INFO] mirrored"]);
}

#[test]
fn test_settings_from_json() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("json.log");

    let json = format!(
        r#"{{
            "async_enabled": true,
            "queue_capacity": 64,
            "appenders": [{{
                "path": {path},
                "settings": {{
                    "startup_time_enabled": false,
                    "thread_id_enabled": false,
                    "exclude": [{{ "levels": ["TRACE"] }}]
                }}
            }}]
        }}"#,
        path = serde_json::to_string(&log_file).unwrap()
    );
    let context = LoggingContext::init(LoggingSettings::from_json_str(&json).unwrap()).unwrap();
    let app = context.intern("App");

    context.emit(&app, LogLevel::Trace, "noise").unwrap();
    context.emit(&app, LogLevel::Info, "signal").unwrap();
    context.flush().unwrap();

    assert_eq!(body_lines(&log_file), vec!["App [INFO] signal"]);
}

#[test]
fn test_unrenderable_startup_format_rejected_at_build() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let settings = AppenderSettings::new().with_startup_time_format("%Y-%m-%d %H:%M");
    assert!(settings.validate().is_err());

    let result = LoggingContext::builder()
        .file(FileAppenderSettings::new(temp_dir.path().join("a.log")).with_settings(settings))
        .build();
    assert!(matches!(result, Err(LoggerError::InvalidConfiguration { .. })));
}

fn record_lines(path: &Path) -> Vec<String> {
    body_lines(path)
        .into_iter()
        .filter(|line| line.starts_with("App ["))
        .collect()
}

#[test]
fn test_call_location_captured_when_enabled() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("location.log");

    let context = LoggingContext::builder()
        .call_location(true)
        .file(FileAppenderSettings::new(&log_file).with_settings(plain()))
        .build()
        .unwrap();
    let app = context.intern("App");
    let error = io::Error::new(io::ErrorKind::Other, "disk full");

    let line = line!() + 1;
    context.emit_error(&app, LogLevel::Error, "write failed", &error).unwrap();
    context.emit(&app, LogLevel::Info, "no location asked").unwrap();
    context.flush().unwrap();

    let lines = record_lines(&log_file);
    assert_eq!(lines.len(), 2);
    let expected = format!("App [ERROR] write failed: disk full at {}:{}:", file!(), line);
    assert!(lines[0].starts_with(&expected), "{:?} does not start with {:?}", lines[0], expected);
    assert_eq!(lines[1], "App [INFO] no location asked");

    // The captured stack follows on indented continuation lines
    let contents = fs::read_to_string(&log_file).unwrap();
    assert!(contents.lines().any(|l| l.starts_with('\t')));
}

#[test]
fn test_call_location_skipped_when_disabled() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("no_location.log");

    let context = LoggingContext::builder()
        .file(FileAppenderSettings::new(&log_file).with_settings(plain()))
        .build()
        .unwrap();
    let app = context.intern("App");
    let error = io::Error::new(io::ErrorKind::Other, "disk full");

    context.emit_error(&app, LogLevel::Error, "write failed", &error).unwrap();
    context.flush().unwrap();

    assert_eq!(body_lines(&log_file), vec!["App [ERROR] write failed: disk full"]);
}

#[test]
fn test_oversized_queue_capacity_rejected() {
    let result = LoggingContext::builder().queue_capacity(usize::MAX).build();
    assert!(matches!(result, Err(LoggerError::InvalidConfiguration { .. })));
}
