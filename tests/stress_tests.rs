//! Stress tests for the queue, consumer and shutdown protocol
//!
//! These tests verify:
//! - No record is lost when many producers hammer a tiny queue
//! - Flushes from many threads interleaved with records all complete
//! - Shutdown racing with producers loses nothing
//! - A slow appender only slows producers down, it never drops records

use linelog::prelude::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Counts records per logger and keeps the per-logger sequence
#[derive(Clone, Default)]
struct Tally {
    seen: Arc<Mutex<HashMap<String, Vec<u64>>>>,
    total: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl Appender for Tally {
    fn append(&mut self, record: &Record) -> Result<()> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let value = record.message_or_empty().parse().unwrap_or(u64::MAX);
        self.seen
            .lock()
            .entry(record.logger.to_string())
            .or_default()
            .push(value);
        self.total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "tally"
    }
}

impl Tally {
    fn assert_sequences(&self, producers: usize, per_producer: u64) {
        let seen = self.seen.lock();
        for p in 0..producers {
            let sequence = seen.get(&format!("T{}", p)).cloned().unwrap_or_default();
            assert_eq!(
                sequence,
                (0..per_producer).collect::<Vec<_>>(),
                "producer {} lost or reordered records",
                p
            );
        }
    }
}

fn spawn_producers(
    context: &Arc<LoggingContext>,
    producers: usize,
    per_producer: u64,
) -> Vec<thread::JoinHandle<()>> {
    (0..producers)
        .map(|p| {
            let context = Arc::clone(context);
            thread::spawn(move || {
                let logger = context.intern(&format!("T{}", p));
                for i in 0..per_producer {
                    context.emit(&logger, LogLevel::Debug, i).unwrap();
                }
            })
        })
        .collect()
}

#[test]
fn test_no_loss_with_tiny_queue() {
    let tally = Tally::default();
    let context = Arc::new(
        LoggingContext::builder()
            .queue_capacity(2)
            .appender(tally.clone())
            .build()
            .expect("Failed to build context"),
    );

    const PRODUCERS: usize = 8;
    const PER_PRODUCER: u64 = 2_000;

    for handle in spawn_producers(&context, PRODUCERS, PER_PRODUCER) {
        handle.join().unwrap();
    }
    context.flush().unwrap();

    assert_eq!(tally.total.load(Ordering::Relaxed), PRODUCERS * PER_PRODUCER as usize);
    tally.assert_sequences(PRODUCERS, PER_PRODUCER);
    assert_eq!(context.metrics().total_accepted(), (PRODUCERS as u64) * PER_PRODUCER);
}

#[test]
fn test_concurrent_flushes_complete() {
    let tally = Tally::default();
    let context = Arc::new(
        LoggingContext::builder()
            .queue_capacity(16)
            .appender(tally.clone())
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..6)
        .map(|p| {
            let context = Arc::clone(&context);
            let total = Arc::clone(&tally.total);
            thread::spawn(move || {
                let logger = context.intern(&format!("T{}", p));
                for i in 0..200u64 {
                    context.emit(&logger, LogLevel::Info, i).unwrap();
                    if i % 20 == 19 {
                        context.flush().unwrap();
                        // Everything this thread emitted is through
                        assert!(total.load(Ordering::Relaxed) >= (i + 1) as usize);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    tally.assert_sequences(6, 200);
    assert!(context.metrics().flushes() >= 60);
}

#[test]
fn test_shutdown_racing_producers_loses_nothing() {
    let tally = Tally::default();
    let context = Arc::new(
        LoggingContext::builder()
            .queue_capacity(8)
            .appender(tally.clone())
            .build()
            .unwrap(),
    );

    const PRODUCERS: usize = 4;
    const PER_PRODUCER: u64 = 5_000;

    let handles = spawn_producers(&context, PRODUCERS, PER_PRODUCER);
    thread::sleep(Duration::from_millis(5));
    assert!(context.shutdown());
    for handle in handles {
        handle.join().unwrap();
    }
    context.flush().unwrap();

    assert_eq!(tally.total.load(Ordering::Relaxed), PRODUCERS * PER_PRODUCER as usize);
    tally.assert_sequences(PRODUCERS, PER_PRODUCER);
    assert!(context.is_shutdown_complete());
}

#[test]
fn test_slow_appender_applies_backpressure() {
    let tally = Tally {
        delay: Some(Duration::from_micros(200)),
        ..Tally::default()
    };
    let context = Arc::new(
        LoggingContext::builder()
            .queue_capacity(4)
            .appender(tally.clone())
            .build()
            .unwrap(),
    );

    for handle in spawn_producers(&context, 3, 300) {
        handle.join().unwrap();
    }
    context.flush().unwrap();

    assert_eq!(tally.total.load(Ordering::Relaxed), 900);
    tally.assert_sequences(3, 300);
    assert!(context.metrics().consumer_busy_time() >= Duration::from_millis(100));
}
