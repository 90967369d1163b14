//! Reasoning trace persistence.
//!
//! Traces are stored as JSONL files (one JSON object per line) under
//! `{traces_dir}/{agent_id}/{episode_id}.jsonl`, append-only, for cheap
//! writes and easy tailing in [`TraceStore::watch`], which polls for bytes
//! appended since the last read and hands each new line to a callback.
//!
//! # Example
//!
//! ```rust
//! use arena_memory::trace_store::TraceStore;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = TraceStore::new(dir.path());
//!
//! store.start_trace("agent-1", 0);
//! store.add_step("agent-1", 0, "observe", serde_json::json!({"position": [0.0, 0.0, 0.0]}));
//! let trace = store.end_trace("agent-1").unwrap();
//! assert_eq!(trace.steps.len(), 1);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use arena_types::ReasoningTrace;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors arising from trace persistence.
#[derive(Debug, Error)]
pub enum TraceStoreError {
    #[error("io error reading/writing trace file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed trace record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("blocking task panicked: {0}")]
    TaskPanic(String),
}

fn default_traces_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AGENT_ARENA_TRACES_DIR") {
        return PathBuf::from(dir);
    }
    dirs_home().join(".agent_arena").join("traces")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

struct Inner {
    current_traces: Mutex<HashMap<String, ReasoningTrace>>,
    episode_ids: Mutex<HashMap<String, String>>,
    write_lock: Mutex<()>,
}

/// Stores and retrieves reasoning traces, one JSONL file per episode.
#[derive(Clone)]
pub struct TraceStore {
    traces_dir: PathBuf,
    inner: Arc<Inner>,
}

static SHARED: OnceLock<TraceStore> = OnceLock::new();

impl TraceStore {
    /// Open (creating if needed) a trace store rooted at `traces_dir`.
    pub fn new(traces_dir: impl AsRef<Path>) -> Self {
        let traces_dir = traces_dir.as_ref().to_path_buf();
        let _ = std::fs::create_dir_all(&traces_dir);
        TraceStore {
            traces_dir,
            inner: Arc::new(Inner {
                current_traces: Mutex::new(HashMap::new()),
                episode_ids: Mutex::new(HashMap::new()),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Process-wide shared instance, rooted at `AGENT_ARENA_TRACES_DIR` or `~/.agent_arena/traces`.
    pub fn shared() -> TraceStore {
        SHARED.get_or_init(|| TraceStore::new(default_traces_dir())).clone()
    }

    pub fn traces_dir(&self) -> &Path {
        &self.traces_dir
    }

    /// Set (or generate) the current episode for an agent.
    pub fn set_episode(&self, agent_id: &str, episode_id: Option<String>) -> String {
        let episode_id = episode_id.unwrap_or_else(|| {
            format!(
                "ep_{}_{}",
                unix_timestamp_secs(),
                &Uuid::new_v4().to_string()[..6]
            )
        });
        self.inner
            .episode_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(agent_id.to_string(), episode_id.clone());
        let _ = std::fs::create_dir_all(self.traces_dir.join(agent_id));
        episode_id
    }

    /// Get the current episode for an agent, creating one if needed.
    pub fn get_episode(&self, agent_id: &str) -> String {
        let existing = self
            .inner
            .episode_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(agent_id)
            .cloned();
        match existing {
            Some(id) => id,
            None => self.set_episode(agent_id, None),
        }
    }

    /// Start a new in-progress trace for a decision.
    pub fn start_trace(&self, agent_id: &str, tick: u64) -> ReasoningTrace {
        let episode_id = self.get_episode(agent_id);
        let trace = ReasoningTrace::new(agent_id, tick, episode_id);
        self.inner
            .current_traces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(agent_id.to_string(), trace.clone());
        trace
    }

    /// Append a step to the current trace, starting one automatically if none is open
    /// for this `(agent_id, tick)`.
    pub fn add_step(&self, agent_id: &str, tick: u64, name: &str, data: Value) {
        let mut current = self
            .inner
            .current_traces
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let needs_new = match current.get(agent_id) {
            Some(trace) => trace.tick != tick,
            None => true,
        };
        if needs_new {
            drop(current);
            self.start_trace(agent_id, tick);
            current = self
                .inner
                .current_traces
                .lock()
                .unwrap_or_else(|e| e.into_inner());
        }
        if let Some(trace) = current.get_mut(agent_id) {
            trace.add_step(name, data);
        }
    }

    /// End and persist the current trace for an agent.
    pub fn end_trace(&self, agent_id: &str) -> Option<ReasoningTrace> {
        let trace = self
            .inner
            .current_traces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(agent_id)?;
        let _ = self.write_trace(&trace);
        Some(trace)
    }

    fn write_trace(&self, trace: &ReasoningTrace) -> Result<(), TraceStoreError> {
        let agent_dir = self.traces_dir.join(&trace.agent_id);
        std::fs::create_dir_all(&agent_dir)?;
        let trace_file = agent_dir.join(format!("{}.jsonl", trace.episode_id));
        let _guard = self.inner.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let line = serde_json::to_string(trace)?;
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(trace_file)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Most recent persisted trace for an agent (across all episodes).
    pub fn get_last_decision(&self, agent_id: &str) -> Result<Option<ReasoningTrace>, TraceStoreError> {
        let agent_dir = self.traces_dir.join(agent_id);
        if !agent_dir.exists() {
            return Ok(None);
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&agent_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        files.sort_by_key(|p| {
            std::fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });
        let Some(latest) = files.last() else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(latest)?;
        let Some(last_line) = content.lines().last() else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(last_line)?))
    }

    /// All traces recorded for one episode, in append order.
    pub fn get_episode_traces(
        &self,
        agent_id: &str,
        episode_id: &str,
    ) -> Result<Vec<ReasoningTrace>, TraceStoreError> {
        let trace_file = self.traces_dir.join(agent_id).join(format!("{episode_id}.jsonl"));
        if !trace_file.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(trace_file)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(TraceStoreError::from))
            .collect()
    }

    /// Every agent directory that has traces on disk.
    pub fn list_agents(&self) -> Vec<String> {
        std::fs::read_dir(&self.traces_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Episode ids for an agent, most recently modified first.
    pub fn list_episodes(&self, agent_id: &str) -> Vec<String> {
        let agent_dir = self.traces_dir.join(agent_id);
        let mut files: Vec<PathBuf> = match std::fs::read_dir(&agent_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
                .collect(),
            Err(_) => return Vec::new(),
        };
        files.sort_by_key(|p| {
            std::cmp::Reverse(
                std::fs::metadata(p)
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            )
        });
        files
            .into_iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect()
    }

    /// Path to a trace file, defaulting to the agent's current episode.
    pub fn trace_file(&self, agent_id: &str, episode_id: Option<&str>) -> Option<PathBuf> {
        let episode_id = match episode_id {
            Some(id) => id.to_string(),
            None => {
                let current = self
                    .inner
                    .episode_ids
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(agent_id)
                    .cloned();
                match current {
                    Some(id) => id,
                    None => self.list_episodes(agent_id).into_iter().next()?,
                }
            }
        };
        let path = self.traces_dir.join(agent_id).join(format!("{episode_id}.jsonl"));
        path.exists().then_some(path)
    }

    /// Tail-follow an agent's current trace file, invoking `callback` with
    /// each newly appended [`ReasoningTrace`] line. Tolerates episode
    /// rotation: if `trace_file` starts pointing at a different path, the
    /// read offset resets to 0 rather than re-delivering the old file's
    /// lines. Returns a [`WatchHandle`] that stops the poll loop.
    pub fn watch<F>(&self, agent_id: &str, callback: F, poll_interval: Duration) -> WatchHandle
    where
        F: Fn(ReasoningTrace) + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_task = Arc::clone(&stop_flag);
        let store = self.clone();
        let agent_id = agent_id.to_string();

        let join_handle = tokio::spawn(async move {
            let mut last_position: u64 = 0;
            let mut current_file: Option<PathBuf> = None;

            while !stop_flag_task.load(Ordering::SeqCst) {
                let Some(trace_file) = store.trace_file(&agent_id, None) else {
                    tokio::time::sleep(poll_interval).await;
                    continue;
                };

                if current_file.as_ref() != Some(&trace_file) {
                    current_file = Some(trace_file.clone());
                    last_position = 0;
                }

                match read_new_lines(&trace_file, &mut last_position) {
                    Ok(lines) => {
                        for line in lines {
                            match serde_json::from_str::<ReasoningTrace>(&line) {
                                Ok(trace) => callback(trace),
                                Err(e) => tracing::error!(error = %e, "malformed trace line while watching"),
                            }
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "error watching traces"),
                }

                tokio::time::sleep(poll_interval).await;
            }
        });

        WatchHandle {
            stop_flag,
            abort_handle: join_handle.abort_handle(),
            join_handle: Some(join_handle),
            grace_period: poll_interval + Duration::from_millis(100),
        }
    }
}

/// Stop handle for a [`TraceStore::watch`] poll loop.
pub struct WatchHandle {
    stop_flag: Arc<AtomicBool>,
    abort_handle: tokio::task::AbortHandle,
    join_handle: Option<tokio::task::JoinHandle<()>>,
    grace_period: Duration,
}

impl WatchHandle {
    /// Signal the poll loop to stop and wait for it to wind down, aborting
    /// it outright if it hasn't exited within one poll interval plus slack.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(join_handle) = self.join_handle.take()
            && tokio::time::timeout(self.grace_period, join_handle).await.is_err()
        {
            self.abort_handle.abort();
        }
    }
}

/// Read bytes appended since `last_position`, advancing it, and split them
/// into non-empty lines. Mirrors the original's seek/readlines/tell loop.
fn read_new_lines(path: &Path, last_position: &mut u64) -> std::io::Result<Vec<String>> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(*last_position))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    *last_position += buf.len() as u64;
    Ok(buf.lines().map(|l| l.to_string()).filter(|l| !l.trim().is_empty()).collect())
}

fn unix_timestamp_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_trace_persists_to_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());

        store.start_trace("agent-1", 5);
        store.add_step("agent-1", 5, "observe", serde_json::json!({"tick": 5}));
        store.add_step("agent-1", 5, "decide", serde_json::json!({"tool": "idle"}));
        let trace = store.end_trace("agent-1").expect("trace was active");

        assert_eq!(trace.steps.len(), 2);
        assert!(trace.steps[1].elapsed_ms >= trace.steps[0].elapsed_ms);

        let reloaded = store.get_last_decision("agent-1").unwrap().unwrap();
        assert_eq!(reloaded.trace_id, trace.trace_id);
    }

    #[test]
    fn add_step_without_explicit_start_creates_trace() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());

        store.add_step("agent-2", 1, "observe", serde_json::json!(null));
        let trace = store.end_trace("agent-2").unwrap();
        assert_eq!(trace.steps.len(), 1);
    }

    #[test]
    fn tick_change_rotates_trace() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());

        store.add_step("agent-3", 1, "observe", serde_json::json!(null));
        store.add_step("agent-3", 2, "observe", serde_json::json!(null));

        let trace = store.end_trace("agent-3").unwrap();
        assert_eq!(trace.tick, 2);
        assert_eq!(trace.steps.len(), 1);
    }

    #[test]
    fn episode_traces_read_back_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());
        let episode = store.set_episode("agent-4", Some("ep_test".to_string()));

        for tick in 0..3 {
            store.add_step("agent-4", tick, "observe", serde_json::json!(null));
            store.end_trace("agent-4");
        }

        let traces = store.get_episode_traces("agent-4", &episode).unwrap();
        assert_eq!(traces.len(), 3);
        assert_eq!(traces[0].tick, 0);
        assert_eq!(traces[2].tick, 2);
    }

    #[test]
    fn list_agents_and_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());
        store.add_step("agent-5", 0, "observe", serde_json::json!(null));
        store.end_trace("agent-5");

        assert!(store.list_agents().contains(&"agent-5".to_string()));
        assert_eq!(store.list_episodes("agent-5").len(), 1);
    }

    #[tokio::test]
    async fn watch_receives_appended_traces() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());
        store.set_episode("agent-6", Some("ep_watch".to_string()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let handle = store.watch(
            "agent-6",
            move |trace| seen_cb.lock().unwrap().push(trace.tick),
            Duration::from_millis(20),
        );

        store.add_step("agent-6", 0, "observe", serde_json::json!(null));
        store.end_trace("agent-6");
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn watch_resets_offset_on_episode_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());
        store.set_episode("agent-7", Some("ep_a".to_string()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let handle = store.watch(
            "agent-7",
            move |trace| seen_cb.lock().unwrap().push(trace.episode_id.clone()),
            Duration::from_millis(20),
        );

        store.add_step("agent-7", 0, "observe", serde_json::json!(null));
        store.end_trace("agent-7");
        tokio::time::sleep(Duration::from_millis(60)).await;

        store.set_episode("agent-7", Some("ep_b".to_string()));
        store.add_step("agent-7", 0, "observe", serde_json::json!(null));
        store.end_trace("agent-7");
        tokio::time::sleep(Duration::from_millis(60)).await;

        handle.stop().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["ep_a", "ep_b"]);
    }

    #[tokio::test]
    async fn watch_stop_halts_within_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());
        let handle = store.watch("agent-8", |_trace| {}, Duration::from_millis(20));

        let started = std::time::Instant::now();
        handle.stop().await;
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
