//! Interned logger names
//!
//! Every logger name that reaches the pipeline goes through a [`NameRegistry`]
//! once. The registry hands out [`LoggerName`] values that share one
//! allocation per distinct name, so compiled filters can compare names by
//! pointer instead of by content.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An interned logger name.
///
/// Equality is pointer identity. Two `LoggerName`s produced by the same
/// registry for the same text are always equal; names from different
/// registries never are.
#[derive(Clone)]
pub struct LoggerName(Arc<str>);

impl LoggerName {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn ptr_eq(&self, other: &LoggerName) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for LoggerName {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for LoggerName {}

impl Hash for LoggerName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const u8 as usize).hash(state);
    }
}

impl fmt::Debug for LoggerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoggerName").field(&self.as_str()).finish()
    }
}

impl fmt::Display for LoggerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for LoggerName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Deduplicating table of logger names.
///
/// Lookups of already known names only take the read lock.
#[derive(Default)]
pub struct NameRegistry {
    names: RwLock<HashSet<Arc<str>>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical [`LoggerName`] for `name`, registering it on first use.
    pub fn intern(&self, name: &str) -> LoggerName {
        if let Some(existing) = self.names.read().get(name) {
            return LoggerName(Arc::clone(existing));
        }

        let mut names = self.names.write();
        if let Some(existing) = names.get(name) {
            return LoggerName(Arc::clone(existing));
        }
        let interned: Arc<str> = Arc::from(name);
        names.insert(Arc::clone(&interned));
        LoggerName(interned)
    }

    /// Look up a name without registering it.
    pub fn get(&self, name: &str) -> Option<LoggerName> {
        self.names.read().get(name).map(|n| LoggerName(Arc::clone(n)))
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
