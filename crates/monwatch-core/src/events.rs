//! Bounded, timestamped event feed consumed by the presentation layer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use tokio::sync::broadcast;

/// Default number of retained entries.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// One rendered feed line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub text: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.text)
    }
}

struct EventLogInner {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    appended: u64,
}

/// Append-only, capacity-bounded event log.
///
/// Cheaply cloneable handle; clones share the same entries. Consumers
/// either take a finite [`snapshot`] on demand or receive a push per new
/// entry via [`feed`]. The feed is lossy for consumers that fall behind;
/// the retained snapshot is the source of truth.
///
/// [`snapshot`]: EventLog::snapshot
/// [`feed`]: EventLog::feed
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Mutex<EventLogInner>>,
    notify: broadcast::Sender<LogEntry>,
}

impl EventLog {
    /// Create a log retaining up to `capacity` entries, oldest dropped
    /// first.
    pub fn new(capacity: usize) -> Self {
        let (notify, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(EventLogInner {
                entries: VecDeque::new(),
                capacity: capacity.max(1),
                appended: 0,
            })),
            notify,
        }
    }

    /// Append one line, stamped with the current wall-clock time.
    pub fn append(&self, text: impl Into<String>) {
        let entry = LogEntry {
            at: Local::now(),
            text: text.into(),
        };
        {
            let mut inner = self.inner.lock().unwrap();
            inner.entries.push_back(entry.clone());
            if inner.entries.len() > inner.capacity {
                inner.entries.pop_front();
            }
            inner.appended += 1;
        }
        // No receivers is fine; the snapshot still records the entry.
        let _ = self.notify.send(entry);
    }

    /// Finite copy of the retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.inner.lock().unwrap().entries.iter().cloned().collect()
    }

    /// Receiver pushed one message per appended entry.
    pub fn feed(&self) -> broadcast::Receiver<LogEntry> {
        self.notify.subscribe()
    }

    /// Total entries ever appended, including evicted ones.
    pub fn appended(&self) -> u64 {
        self.inner.lock().unwrap().appended
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Returns `true` if nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
