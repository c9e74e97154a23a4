//! Background consumer thread
//!
//! The only reader of the record queue. It formats and writes every committed
//! record under the appender lock, answers flush requests and exits once the
//! queue is completing and drained.

use super::appender_set::AppenderSet;
use super::error::{LoggerError, Result};
use super::metrics::PipelineMetrics;
use super::queue::{RecordQueue, Take, TakenSlot};
use super::record::ThreadTag;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub const CONSUMER_THREAD_NAME: &str = "linelog-consumer";

/// State shared by producers and the consumer.
#[derive(Debug)]
pub(crate) struct Pipeline {
    pub queue: RecordQueue,
    pub appenders: Mutex<AppenderSet>,
    pub metrics: Arc<PipelineMetrics>,
    /// Thread id of the consumer once it runs
    consumer_thread: OnceLock<u64>,
    shutdown_complete: AtomicBool,
}

impl Pipeline {
    pub fn new(queue: RecordQueue, appenders: AppenderSet, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            queue,
            appenders: Mutex::new(appenders),
            metrics,
            consumer_thread: OnceLock::new(),
            shutdown_complete: AtomicBool::new(false),
        }
    }

    pub fn is_consumer_thread(&self) -> bool {
        self.consumer_thread.get() == Some(&ThreadTag::current().id)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::SeqCst)
    }
}

/// Start the consumer thread.
pub(crate) fn spawn(pipeline: Arc<Pipeline>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(CONSUMER_THREAD_NAME.to_string())
        .spawn(move || run(&pipeline))
        .map_err(LoggerError::ConsumerSpawn)
}

/// Marks the pipeline finished however `run` exits. If it exits early,
/// producers fall back to the synchronous path and flush waiters are woken.
struct ExitGuard<'p>(&'p Pipeline);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if self.0.queue.begin_shutdown() {
            eprintln!("[LOGGER ERROR] Consumer thread stopped before shutdown was requested");
        }
        let discarded = self.0.queue.discard_ready();
        if discarded > 0 {
            eprintln!("[LOGGER ERROR] Consumer thread stopped with {} unprocessed records", discarded);
        }
        self.0.shutdown_complete.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn run(pipeline: &Pipeline) {
    let _ = pipeline.consumer_thread.set(ThreadTag::current().id);
    let _guard = ExitGuard(pipeline);

    loop {
        let taken = match pipeline.queue.try_take() {
            Some(taken) => taken,
            None => {
                // Going idle: push buffered lines out before waiting
                pipeline.appenders.lock().flush_all();
                match pipeline.queue.try_take_or_wait() {
                    Take::Record(taken) => taken,
                    Take::ShutdownExhausted => break,
                }
            }
        };
        process(pipeline, taken);
    }

    pipeline.appenders.lock().flush_all();
}

fn process(pipeline: &Pipeline, mut taken: TakenSlot<'_>) {
    let started = Instant::now();
    let mut appenders = pipeline.appenders.lock();

    match taken.take_flush_signal() {
        Some(signal) => {
            appenders.flush_all();
            pipeline.metrics.record_flush();
            signal.raise();
        }
        None => appenders.process(&taken),
    }

    drop(appenders);
    pipeline.metrics.record_consumer_busy(started.elapsed());
}
