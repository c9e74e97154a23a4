//! Ordered appenders plus the fatal-error sink
//!
//! Every record goes to every appender. One appender failing, by error or by
//! panic, is reported to the fatal sink and does not keep the record from the
//! others.

use super::appender::Appender;
use super::error::{LoggerError, Result};
use super::metrics::PipelineMetrics;
use super::record::Record;
use chrono::Local;
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SET_ID: AtomicU64 = AtomicU64::new(1);

// Set id and pending records while this thread is inside an `AppenderSet`
thread_local! {
    static BACKLOG: RefCell<Option<(u64, VecDeque<Record>)>> = const { RefCell::new(None) };
}

/// Whether the current thread is delivering a record to any appender set.
pub(crate) fn is_dispatching() -> bool {
    BACKLOG.with(|backlog| backlog.borrow().is_some())
}

/// Whether the current thread is inside the appender set `set_id`.
pub(crate) fn is_dispatching_to(set_id: u64) -> bool {
    BACKLOG.with(|backlog| matches!(*backlog.borrow(), Some((id, _)) if id == set_id))
}

/// Queue a record emitted from inside an appender of set `set_id`. It is
/// delivered right after the record currently being processed. Hands the
/// record back if this thread is not inside that set.
pub(crate) fn defer(set_id: u64, record: Record) -> std::result::Result<(), Record> {
    BACKLOG.with(|backlog| match backlog.borrow_mut().as_mut() {
        Some((id, queue)) if *id == set_id => {
            queue.push_back(record);
            Ok(())
        }
        _ => Err(record),
    })
}

fn next_deferred() -> Option<Record> {
    BACKLOG.with(|backlog| {
        backlog
            .borrow_mut()
            .as_mut()
            .and_then(|(_, queue)| queue.pop_front())
    })
}

struct DispatchScope;

impl DispatchScope {
    /// `None` when this thread is already dispatching.
    fn enter(set_id: u64) -> Option<Self> {
        BACKLOG.with(|backlog| {
            let mut backlog = backlog.borrow_mut();
            if backlog.is_some() {
                None
            } else {
                *backlog = Some((set_id, VecDeque::new()));
                Some(DispatchScope)
            }
        })
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        BACKLOG.with(|backlog| *backlog.borrow_mut() = None);
    }
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Where appender failures are reported.
///
/// Lines are appended to the fatal-error file when one is configured; if it
/// cannot be written the report goes to stderr.
#[derive(Debug, Clone, Default)]
pub struct FatalSink {
    path: Option<PathBuf>,
}

impl FatalSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn report(&self, appender: &str, error: &LoggerError) {
        let line = format!(
            "{} [FATAL] appender '{}' failed: {}",
            Local::now().to_rfc3339(),
            appender,
            error
        );

        let Some(ref path) = self.path else {
            eprintln!("[LOGGER CRITICAL] {}", line);
            return;
        };
        if let Err(e) = Self::append_line(path, &line) {
            eprintln!(
                "[LOGGER CRITICAL] {} (fatal-error file '{}' unavailable: {})",
                line,
                path.display(),
                e
            );
        }
    }

    fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        file.flush()
    }
}

pub struct AppenderSet {
    id: u64,
    appenders: Vec<Box<dyn Appender>>,
    fatal: FatalSink,
    metrics: Arc<PipelineMetrics>,
}

impl AppenderSet {
    pub fn new(fatal: FatalSink, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            id: NEXT_SET_ID.fetch_add(1, Ordering::Relaxed),
            appenders: Vec::new(),
            fatal,
            metrics,
        }
    }

    /// Process-unique id, used to route records emitted from inside an
    /// appender back to this set.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn push(&mut self, appender: Box<dyn Appender>) {
        self.appenders.push(appender);
    }

    pub fn len(&self) -> usize {
        self.appenders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appenders.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.appenders.iter().map(|a| a.name())
    }

    pub fn fatal_sink(&self) -> &FatalSink {
        &self.fatal
    }

    /// Deliver `record` to every appender, then any record those appenders
    /// emitted meanwhile on this thread.
    pub fn process(&mut self, record: &Record) {
        self.scoped(|set| set.deliver(record));
    }

    /// Flush every appender; failures are reported like append failures.
    pub fn flush_all(&mut self) {
        self.scoped(|set| {
            for appender in set.appenders.iter_mut() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| appender.flush()));
                Self::check(&set.fatal, &set.metrics, appender.name(), result);
            }
        });
    }

    fn scoped(&mut self, work: impl FnOnce(&mut Self)) {
        let Some(_scope) = DispatchScope::enter(self.id) else {
            // Already dispatching higher up this stack
            work(self);
            return;
        };

        work(self);
        while let Some(deferred) = next_deferred() {
            self.deliver(&deferred);
        }
    }

    fn deliver(&mut self, record: &Record) {
        let mut clean = true;
        for appender in self.appenders.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| appender.append(record)));
            clean &= Self::check(&self.fatal, &self.metrics, appender.name(), result);
        }
        if clean {
            self.metrics.record_written();
        }
    }

    fn check(
        fatal: &FatalSink,
        metrics: &PipelineMetrics,
        name: &str,
        result: std::thread::Result<Result<()>>,
    ) -> bool {
        let error = match result {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e,
            Err(payload) => LoggerError::appender_panic(name, panic_message(payload.as_ref())),
        };
        metrics.record_appender_failure();
        fatal.report(name, &error);
        false
    }
}

impl std::fmt::Debug for AppenderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppenderSet")
            .field("id", &self.id)
            .field("appenders", &self.names().collect::<Vec<_>>())
            .field("fatal", &self.fatal)
            .finish()
    }
}
