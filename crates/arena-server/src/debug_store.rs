//! Hybrid trace storage for the debug surface: an in-memory ring buffer of
//! recently completed traces, bridged to the on-disk [`TraceStore`].
//!
//! The ring buffer always works; disk persistence is a best-effort bridge —
//! a write failure is logged and swallowed, never surfaced to the caller.

use std::collections::VecDeque;
use std::sync::Mutex;

use arena_memory::TraceStore;
use arena_types::ReasoningTrace;

const DEFAULT_CAPACITY: usize = 1000;

/// In-memory ring buffer of [`ReasoningTrace`]s, bridged to a [`TraceStore`]
/// for on-disk episode lookups.
pub struct DebugStore {
    buffer: Mutex<VecDeque<ReasoningTrace>>,
    capacity: usize,
    trace_store: TraceStore,
}

impl DebugStore {
    pub fn new(trace_store: TraceStore) -> Self {
        Self::with_capacity(trace_store, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(trace_store: TraceStore, capacity: usize) -> Self {
        DebugStore {
            buffer: Mutex::new(VecDeque::new()),
            capacity,
            trace_store,
        }
    }

    /// Append a completed trace to the in-memory buffer. Disk persistence is
    /// already handled by [`TraceStore::end_trace`], which this method does
    /// not duplicate.
    pub fn record(&self, trace: ReasoningTrace) {
        let mut buffer = self.buffer.lock().expect("debug store mutex poisoned");
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(trace);
    }

    pub fn recent_traces(
        &self,
        limit: usize,
        agent_id: Option<&str>,
        tick_start: Option<u64>,
        tick_end: Option<u64>,
    ) -> Vec<ReasoningTrace> {
        let buffer = self.buffer.lock().expect("debug store mutex poisoned");
        let mut matching: Vec<ReasoningTrace> = buffer
            .iter()
            .filter(|t| agent_id.is_none_or(|id| t.agent_id == id))
            .filter(|t| tick_start.is_none_or(|start| t.tick >= start))
            .filter(|t| tick_end.is_none_or(|end| t.tick <= end))
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.tick);
        let start = matching.len().saturating_sub(limit);
        matching.split_off(start)
    }

    pub fn get_episode_traces(&self, agent_id: &str, episode_id: &str) -> Vec<ReasoningTrace> {
        self.trace_store
            .get_episode_traces(agent_id, episode_id)
            .unwrap_or_default()
    }

    pub fn list_agents(&self) -> Vec<String> {
        let buffer = self.buffer.lock().expect("debug store mutex poisoned");
        let mut agents: std::collections::BTreeSet<String> =
            buffer.iter().map(|t| t.agent_id.clone()).collect();
        agents.extend(self.trace_store.list_agents());
        agents.into_iter().collect()
    }

    pub fn list_episodes(&self, agent_id: &str) -> Vec<String> {
        self.trace_store.list_episodes(agent_id)
    }

    pub fn clear(&self) {
        self.buffer.lock().expect("debug store mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn trace(agent_id: &str, tick: u64) -> ReasoningTrace {
        ReasoningTrace::new(agent_id, tick, "episode-1")
    }

    #[test]
    fn recent_traces_filters_by_agent_and_tick_range() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(TraceStore::new(dir.path()));
        store.record(trace("a1", 1));
        store.record(trace("a1", 5));
        store.record(trace("a2", 3));

        let all = store.recent_traces(10, None, None, None);
        assert_eq!(all.len(), 3);

        let a1_only = store.recent_traces(10, Some("a1"), None, None);
        assert_eq!(a1_only.len(), 2);

        let ranged = store.recent_traces(10, Some("a1"), Some(2), Some(10));
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].tick, 5);
    }

    #[test]
    fn recent_traces_respects_capacity_and_limit() {
        let dir = tempdir().unwrap();
        let store = DebugStore::with_capacity(TraceStore::new(dir.path()), 2);
        store.record(trace("a1", 1));
        store.record(trace("a1", 2));
        store.record(trace("a1", 3));
        assert_eq!(store.recent_traces(10, None, None, None).len(), 2);
        assert_eq!(store.recent_traces(1, None, None, None).len(), 1);
    }

    #[test]
    fn clear_empties_the_ring_buffer() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(TraceStore::new(dir.path()));
        store.record(trace("a1", 1));
        store.clear();
        assert!(store.recent_traces(10, None, None, None).is_empty());
    }
}
