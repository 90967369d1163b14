//! The HTTP IPC surface: a thin JSON-REST bridge between a simulation host
//! and the agents registered in a [`BehaviorRegistry`].
//!
//! Mirrors `MinimalIPCServer`: observation in, `decide`, decision out, with
//! no tool dispatch or behavior management of its own. `/tick` additionally
//! fans a batch of per-agent observations out across a bounded worker pool.

use std::sync::Arc;
use std::time::Instant;

use arena_memory::TraceStore;
use arena_runtime::run_tick;
use arena_types::{ArenaError, Decision, Observation};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::debug_store::DebugStore;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::observation_tracker::ObservationTracker;
use crate::registry::BehaviorRegistry;

const DEBUG_VIEWER_HTML: &str = include_str!("debug_viewer.html");

/// Default bind port, matching `MinimalIPCServer`'s default.
pub const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_WORKERS: usize = 4;

#[derive(Clone)]
struct AppState {
    registry: BehaviorRegistry,
    metrics: Arc<Metrics>,
    trace_store: Option<TraceStore>,
    observation_tracker: Option<Arc<ObservationTracker>>,
    debug_store: Option<Arc<DebugStore>>,
    max_workers: usize,
    enable_debug: bool,
}

/// The agent-arena IPC server.
///
/// Agents are registered into a [`BehaviorRegistry`] ahead of time (by the
/// caller, e.g. a CLI bootstrap); this struct only owns the HTTP surface and
/// the shared counters/debug subsystems around it. When debug mode is
/// enabled, behaviors registered with a trace store wired via
/// `arena_runtime::BehaviorContext::with_trace_store` have their traces
/// mirrored into the in-memory [`DebugStore`] after every tick.
pub struct ArenaServer {
    host: String,
    port: u16,
    max_workers: usize,
    enable_debug: bool,
    registry: BehaviorRegistry,
    trace_store: Option<TraceStore>,
}

impl ArenaServer {
    pub fn new(registry: BehaviorRegistry) -> Self {
        ArenaServer {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_workers: DEFAULT_MAX_WORKERS,
            enable_debug: false,
            registry,
            trace_store: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Enable the `/debug/*` endpoints, bridging the in-memory trace ring
    /// buffer to `trace_store` for on-disk episode lookups.
    pub fn with_debug(mut self, trace_store: TraceStore) -> Self {
        self.enable_debug = true;
        self.trace_store = Some(trace_store);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn state(&self) -> AppState {
        AppState {
            registry: self.registry.clone(),
            metrics: Arc::new(Metrics::new()),
            max_workers: self.max_workers,
            enable_debug: self.enable_debug,
            trace_store: self.trace_store.clone(),
            observation_tracker: self.enable_debug.then(|| Arc::new(ObservationTracker::default())),
            debug_store: self.trace_store.clone().map(|store| Arc::new(DebugStore::new(store))),
        }
    }

    /// Build the axum [`Router`] for this server, without binding a socket.
    /// Exposed separately so tests can drive it in-process with `tower`.
    pub fn router(&self) -> Router {
        let state = self.state();

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/", get(root))
            .route("/observe", post(observe))
            .route("/tools/execute", post(tools_execute))
            .route("/tick", post(tick));

        if self.enable_debug {
            router = router
                .route("/debug", get(debug_viewer))
                .route("/debug/observations", get(debug_observations))
                .route("/debug/changes", get(debug_changes))
                .route("/debug/reset", post(debug_reset))
                .route("/debug/traces", get(debug_traces))
                .route("/debug/agents", get(debug_agents))
                .route("/debug/episodes", get(debug_episodes));
        }

        router.with_state(state)
    }

    /// Bind and serve until the process is terminated.
    pub async fn run(self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "arena-server listening");
        axum::serve(listener, self.router()).await
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "debug": state.enable_debug,
        "metrics": state.metrics.snapshot(),
        "registered_agents": state.registry.agent_count().await,
    }))
}

async fn tools_execute(Json(_request): Json<Value>) -> Json<Value> {
    Json(json!({"success": true, "result": Value::Null, "error": ""}))
}

async fn observe(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<Value>, ApiError> {
    let agent_id = body
        .get("agent_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ArenaError::Validation("observation missing agent_id".to_string()))?
        .to_string();

    if let Some(tracker) = &state.observation_tracker {
        if let Ok(observation) = serde_json::from_value::<Observation>(body.clone()) {
            tracker.track(&observation, body.clone());
        }
    }

    let observation: Observation =
        serde_json::from_value(body).map_err(|e| ArenaError::Validation(format!("invalid observation: {e}")))?;

    let handle = state
        .registry
        .get(&agent_id)
        .await
        .ok_or_else(|| ArenaError::NotFound(format!("no behavior registered for '{agent_id}'")))?;

    let decision = {
        let mut behavior = handle.lock().await;
        run_tick(behavior.as_mut(), &observation, &[]).await
    };

    mirror_trace_to_debug_store(&state, &agent_id);
    state.metrics.record_observation();

    Ok(Json(json!({
        "agent_id": agent_id,
        "tool": decision.tool,
        "params": decision.params,
        "reasoning": decision.reasoning.unwrap_or_else(|| "Agent decision".to_string()),
    })))
}

#[derive(Deserialize)]
struct TickRequest {
    #[serde(default)]
    tick: u64,
    #[serde(default)]
    agents: Vec<TickAgentEntry>,
}

#[derive(Deserialize)]
struct TickAgentEntry {
    agent_id: String,
    #[serde(default)]
    observations: Value,
}

async fn tick(State(state): State<AppState>, Json(request): Json<TickRequest>) -> Json<Value> {
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(state.max_workers));
    let agent_count = request.agents.len() as u64;
    let tick = request.tick;

    let mut handles = Vec::with_capacity(request.agents.len());
    for entry in request.agents {
        let state = state.clone();
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let decision = tick_one_agent(&state, tick, &entry.agent_id, entry.observations).await;
            (entry.agent_id, decision)
        }));
    }

    let mut actions = Vec::with_capacity(handles.len());
    for handle in handles {
        let (agent_id, decision) = match handle.await {
            Ok(pair) => pair,
            Err(join_err) => (
                "unknown".to_string(),
                Decision::idle(Some(format!("agent task panicked: {join_err}"))),
            ),
        };
        actions.push(json!({"agent_id": agent_id, "action": decision}));
    }

    state.metrics.record_tick(agent_count, started.elapsed().as_secs_f64() * 1000.0);

    Json(json!({"tick": tick, "actions": actions}))
}

/// Run one agent's `decide` for a `/tick` batch entry. Any failure — missing
/// behavior, a malformed observation, or a caught panic propagated from the
/// spawned task — degrades to an idle [`Decision`] rather than failing the
/// whole batch.
async fn tick_one_agent(state: &AppState, tick: u64, agent_id: &str, mut raw_observation: Value) -> Decision {
    if let Value::Object(map) = &mut raw_observation {
        map.entry("agent_id").or_insert_with(|| json!(agent_id));
        map.entry("tick").or_insert_with(|| json!(tick));
    }

    if let Some(tracker) = &state.observation_tracker {
        if let Ok(observation) = serde_json::from_value::<Observation>(raw_observation.clone()) {
            tracker.track(&observation, raw_observation.clone());
        }
    }

    let observation: Observation = match serde_json::from_value(raw_observation) {
        Ok(obs) => obs,
        Err(e) => return Decision::idle(Some(format!("Error: invalid observation: {e}"))),
    };

    let Some(handle) = state.registry.get(agent_id).await else {
        return Decision::idle(Some(format!("Error: no behavior registered for '{agent_id}'")));
    };

    let decision = {
        let mut behavior = handle.lock().await;
        run_tick(behavior.as_mut(), &observation, &[]).await
    };

    mirror_trace_to_debug_store(state, agent_id);
    decision
}

/// After a `decide` call, copy whatever trace the behavior just persisted
/// (if it was wired with a trace store) into the in-memory debug buffer.
fn mirror_trace_to_debug_store(state: &AppState, agent_id: &str) {
    let (Some(trace_store), Some(debug_store)) = (&state.trace_store, &state.debug_store) else {
        return;
    };
    if let Ok(Some(trace)) = trace_store.get_last_decision(agent_id) {
        debug_store.record(trace);
    }
}

#[derive(Deserialize)]
struct DebugQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    agent_id: Option<String>,
    tick_start: Option<u64>,
    tick_end: Option<u64>,
}

fn default_limit() -> usize {
    50
}

async fn debug_viewer() -> axum::response::Html<&'static str> {
    axum::response::Html(DEBUG_VIEWER_HTML)
}

async fn debug_observations(State(state): State<AppState>, Query(q): Query<DebugQuery>) -> Json<Value> {
    let tracker = state.observation_tracker.expect("debug routes require a tracker");
    let observations = tracker.recent(q.limit, q.agent_id.as_deref());
    Json(json!({"observations": observations, "count": observations.len()}))
}

async fn debug_changes(State(state): State<AppState>, Query(q): Query<DebugQuery>) -> Json<Value> {
    let tracker = state.observation_tracker.expect("debug routes require a tracker");
    let changes = tracker.changes(q.limit, q.agent_id.as_deref());
    Json(json!({"changes": changes, "count": changes.len()}))
}

async fn debug_reset(State(state): State<AppState>) -> Json<Value> {
    if let Some(tracker) = &state.observation_tracker {
        tracker.clear();
    }
    if let Some(store) = &state.debug_store {
        store.clear();
    }
    Json(json!({"status": "reset"}))
}

async fn debug_traces(State(state): State<AppState>, Query(q): Query<DebugQuery>) -> Json<Value> {
    let store = state.debug_store.expect("debug routes require a debug store");
    let traces = store.recent_traces(q.limit, q.agent_id.as_deref(), q.tick_start, q.tick_end);
    Json(json!({"traces": traces, "count": traces.len()}))
}

async fn debug_agents(State(state): State<AppState>) -> Json<Value> {
    let store = state.debug_store.expect("debug routes require a debug store");
    let mut agents: std::collections::BTreeSet<String> = store.list_agents().into_iter().collect();
    if let Some(tracker) = &state.observation_tracker {
        agents.extend(tracker.known_agents());
    }
    Json(json!({"agents": agents.into_iter().collect::<Vec<_>>()}))
}

#[derive(Deserialize)]
struct EpisodesQuery {
    agent_id: String,
}

async fn debug_episodes(State(state): State<AppState>, Query(q): Query<EpisodesQuery>) -> Json<Value> {
    let store = state.debug_store.expect("debug routes require a debug store");
    let episodes = store.list_episodes(&q.agent_id);
    Json(json!({"agent_id": q.agent_id, "episodes": episodes}))
}
