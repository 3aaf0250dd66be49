//! Plan record cache: bounded, TTL-evicted, insertion-ordered.
//!
//! On a miss the caller rehydrates from the persistent trace store.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::trajectory::TraceStore;

use super::PlanRecord;

/// In-memory plan record cache, mutated under a process-wide lock.
pub struct PlanCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
}

struct Inner {
    records: HashMap<String, (PlanRecord, Instant)>,
    /// Insertion order for eviction
    order: VecDeque<String>,
}

impl PlanCache {
    pub fn new(ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl: Duration::from_millis(ttl_ms),
            max_entries,
        }
    }

    /// Insert a plan record, evicting the oldest insertion past capacity.
    pub fn insert(&self, record: PlanRecord) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let trace_id = record.trace_id.clone();
        if inner.records.insert(trace_id.clone(), (record, Instant::now())).is_none() {
            inner.order.push_back(trace_id);
        }
        while inner.order.len() > self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.records.remove(&oldest);
            }
        }
    }

    /// Fetch a live record from the cache alone.
    pub fn get(&self, trace_id: &str) -> Option<PlanRecord> {
        let Ok(inner) = self.inner.lock() else {
            return None;
        };
        inner
            .records
            .get(trace_id)
            .filter(|(_, at)| at.elapsed() <= self.ttl)
            .map(|(record, _)| record.clone())
    }

    /// Fetch with a trace-store fallback: a cache miss tries the persisted
    /// task trace and re-seeds the cache on success.
    pub fn get_or_rehydrate(&self, trace_id: &str, store: &TraceStore) -> Option<PlanRecord> {
        if let Some(record) = self.get(trace_id) {
            return Some(record);
        }
        let payload = store.load_task_trace(trace_id).ok().flatten()?;
        let record: PlanRecord = serde_json::from_str(&payload).ok()?;
        self.insert(record.clone());
        tracing::debug!(trace_id, "plan record rehydrated from trace store");
        Some(record)
    }

    /// Drop expired entries; returns how many were pruned.
    pub fn prune(&self) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let before = inner.records.len();
        let ttl = self.ttl;
        inner.records.retain(|_, (_, at)| at.elapsed() <= ttl);
        let records = &inner.records;
        let retained: Vec<String> = inner
            .order
            .iter()
            .filter(|id| records.contains_key(*id))
            .cloned()
            .collect();
        inner.order = retained.into();
        before - inner.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{build_plan, ResonanceBundle, ToolRegistry};

    fn record(goal: &str) -> PlanRecord {
        build_plan(goal, &ResonanceBundle::default(), &ToolRegistry::new())
    }

    #[test]
    fn insert_get_roundtrip() {
        let cache = PlanCache::new(60_000, 8);
        let plan = record("explain retrieval");
        cache.insert(plan.clone());
        assert_eq!(cache.get(&plan.trace_id).unwrap().goal, plan.goal);
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn capacity_evicts_oldest_insertion() {
        let cache = PlanCache::new(60_000, 2);
        let a = record("a");
        let b = record("b");
        let c = record("c");
        cache.insert(a.clone());
        cache.insert(b.clone());
        cache.insert(c.clone());
        assert!(cache.get(&a.trace_id).is_none());
        assert!(cache.get(&b.trace_id).is_some());
        assert!(cache.get(&c.trace_id).is_some());
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = PlanCache::new(0, 8);
        let plan = record("short lived");
        cache.insert(plan.clone());
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get(&plan.trace_id).is_none());
        assert_eq!(cache.prune(), 1);
    }

    #[test]
    fn rehydrates_from_trace_store() {
        let cache = PlanCache::new(60_000, 8);
        let store = TraceStore::in_memory().unwrap();
        let plan = record("persisted goal");
        store
            .save_task_trace(&plan.trace_id, &serde_json::to_string(&plan).unwrap())
            .unwrap();
        let loaded = cache.get_or_rehydrate(&plan.trace_id, &store).unwrap();
        assert_eq!(loaded.goal, "persisted goal");
        // Now cached.
        assert!(cache.get(&plan.trace_id).is_some());
    }
}
