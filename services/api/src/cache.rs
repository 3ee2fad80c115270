use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub(crate) const OPEN_JOBS_KEY: &str = "jobs:open";

pub(crate) fn job_key(job_id: &str) -> String {
    format!("jobs:{job_id}")
}

/// Read-through cache for rendered JSON responses. The marketplace core never sees it.
pub(crate) trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: &str, value: Value, ttl: Duration);
    fn invalidate(&self, key: &str);
    fn invalidate_all(&self);
}

#[derive(Default)]
pub(crate) struct InMemoryResponseCache {
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl ResponseCache for InMemoryResponseCache {
    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let (expires_at, value) = entries.get(key)?;
        if *expires_at > Instant::now() {
            return Some(value.clone());
        }
        entries.remove(key);
        None
    }

    fn put(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), (Instant::now() + ttl, value));
    }

    fn invalidate(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn invalidate_all(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
