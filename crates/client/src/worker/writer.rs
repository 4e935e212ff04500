//! Detached cache writes.
//!
//! Each store runs on its own task so the response path never waits on
//! SQLite. Failures are logged and kept in a bounded log for inspection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use safenest_core::{CacheDb, CacheEntry};
use serde::Serialize;
use tokio::task::JoinHandle;

use super::lock;

/// Number of write failures kept before the oldest is dropped.
const FAILURE_LOG_CAPACITY: usize = 32;

/// A cache write that did not land.
#[derive(Debug, Clone, Serialize)]
pub struct WriteFailure {
    pub partition: String,
    pub url: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct FailureLog {
    entries: VecDeque<WriteFailure>,
}

impl FailureLog {
    fn push(&mut self, failure: WriteFailure) {
        if self.entries.len() == FAILURE_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(failure);
    }
}

/// Fire-and-forget writer for runtime cache stores.
pub struct CacheWriter {
    cache: CacheDb,
    pending: Mutex<Vec<JoinHandle<()>>>,
    failures: Arc<Mutex<FailureLog>>,
}

impl CacheWriter {
    pub fn new(cache: CacheDb) -> Self {
        Self { cache, pending: Mutex::new(Vec::new()), failures: Arc::new(Mutex::new(FailureLog::default())) }
    }

    /// Store an entry on a background task.
    ///
    /// Returns immediately; the outcome is only visible through the log
    /// and `failures()`.
    pub fn store(&self, entry: CacheEntry) {
        let cache = self.cache.clone();
        let failures = Arc::clone(&self.failures);

        let handle = tokio::spawn(async move {
            let result = cache.put_entry(&entry).await;
            match result {
                Ok(()) => tracing::debug!(partition = %entry.partition, "stored {} {}", entry.method, entry.url),
                Err(e) => {
                    tracing::warn!(partition = %entry.partition, url = %entry.url, "cache write failed: {e}");
                    lock(&failures).push(WriteFailure {
                        partition: entry.partition,
                        url: entry.url,
                        error: e.to_string(),
                        at: Utc::now(),
                    });
                }
            }
        });

        let mut pending = lock(&self.pending);
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// Wait for every write started so far.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *lock(&self.pending));
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("cache write task did not complete: {e}");
            }
        }
    }

    /// Writes started but not yet finished.
    pub fn pending(&self) -> usize {
        lock(&self.pending).iter().filter(|handle| !handle.is_finished()).count()
    }

    /// Most recent write failures, oldest first.
    pub fn failures(&self) -> Vec<WriteFailure> {
        lock(&self.failures).entries.iter().cloned().collect()
    }
}
