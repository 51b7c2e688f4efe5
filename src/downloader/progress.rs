// Progress store - job-keyed progress shared between runners and pollers

use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::models::ProgressEntry;

/// Shared progress map. Each `put` replaces the whole entry for its key.
pub trait ProgressStore: Send + Sync {
    fn put(&self, job_id: &str, entry: ProgressEntry);

    fn get(&self, job_id: &str) -> Option<ProgressEntry>;

    /// Poll semantics: unknown ids read as `{percent: 0, status: unknown}`
    fn snapshot(&self, job_id: &str) -> ProgressEntry {
        self.get(job_id).unwrap_or_else(ProgressEntry::unknown)
    }
}

impl<T: ProgressStore + ?Sized> ProgressStore for Arc<T> {
    fn put(&self, job_id: &str, entry: ProgressEntry) {
        (**self).put(job_id, entry)
    }

    fn get(&self, job_id: &str) -> Option<ProgressEntry> {
        (**self).get(job_id)
    }
}

/// Bounded in-memory store; entries expire after `time_to_idle` without reads or writes.
#[derive(Clone)]
pub struct MemoryProgressStore {
    entries: Cache<String, ProgressEntry>,
}

impl MemoryProgressStore {
    pub fn new(max_capacity: u64, time_to_idle: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(time_to_idle)
                .build(),
        }
    }
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(60 * 60))
    }
}

impl ProgressStore for MemoryProgressStore {
    fn put(&self, job_id: &str, entry: ProgressEntry) {
        self.entries.insert(job_id.to_string(), entry);
    }

    fn get(&self, job_id: &str) -> Option<ProgressEntry> {
        self.entries.get(job_id)
    }
}
