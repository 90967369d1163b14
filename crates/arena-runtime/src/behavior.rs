//! The three-tier Behavior contract.
//!
//! - [`Behavior`] — the full, user-implemented tier: `decide` receives the
//!   raw [`Observation`] and tool list and returns a [`Decision`] directly.
//! - [`SimpleBehavior`] via [`SimpleAdapter`] — the simplified tier: the user
//!   only names a tool; [`crate::heuristics`] fills in its parameters.
//! - [`llm::LlmBehavior`][crate::llm_behavior::LlmBehavior] — the LLM tier:
//!   wraps an [`crate::llm::LlmBackend`], builds a prompt, and parses its
//!   response (see [`crate::parsing`]).
//!
//! Every tier shares one [`BehaviorContext`]: the framework updates its
//! spatial memory from each observation before `decide` runs, and finalizes
//! any trace step the implementation logged during `decide` once it returns.

use arena_memory::TraceStore;
use arena_spatial::SpatialMemory;
use arena_types::{Decision, Observation, ToolSchema};
use async_trait::async_trait;
use serde_json::Value;

use crate::heuristics::{self, SimpleContext};

/// Framework-managed state threaded through every Behavior tier: the
/// per-agent spatial memory and, if tracing is enabled, a handle to the
/// trace store and the `(agent_id, tick)` pair new steps are attributed to.
pub struct BehaviorContext {
    agent_id: String,
    tick: u64,
    trace_store: Option<TraceStore>,
    world_map: SpatialMemory,
}

impl BehaviorContext {
    pub fn new(agent_id: impl Into<String>) -> Self {
        BehaviorContext {
            agent_id: agent_id.into(),
            tick: 0,
            trace_store: None,
            world_map: SpatialMemory::new(),
        }
    }

    pub fn with_trace_store(mut self, store: TraceStore) -> Self {
        self.trace_store = Some(store);
        self
    }

    /// Override the spatial memory's stale threshold and experience log cap
    /// (defaults come from [`SpatialMemory::new`]).
    pub fn with_spatial_config(mut self, stale_threshold: u64, experience_cap: usize) -> Self {
        self.world_map = SpatialMemory::with_config(stale_threshold, experience_cap);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Spatial memory accumulated for this agent. Updated from each
    /// observation by the tick orchestrator before `decide` runs.
    pub fn world_map(&mut self) -> &mut SpatialMemory {
        &mut self.world_map
    }

    /// Record a reasoning step against the currently active trace, if tracing
    /// is enabled. A no-op otherwise.
    pub fn log_step(&self, name: impl Into<String>, data: Value) {
        if let Some(store) = &self.trace_store {
            store.add_step(&self.agent_id, self.tick, &name.into(), data);
        }
    }

    /// The tick of the most recently started trace (0 before any tick runs).
    pub(crate) fn current_tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn update_world_map(&mut self, observation: &Observation) {
        self.world_map.update_from_observation(observation);
    }

    /// Open a new trace for this tick, if tracing is enabled.
    pub(crate) fn begin_trace(&mut self, tick: u64) {
        self.tick = tick;
        if let Some(store) = &self.trace_store {
            store.start_trace(&self.agent_id, tick);
        }
    }

    /// Persist and clear whatever trace is currently open.
    pub(crate) fn finalize_trace(&self) {
        if let Some(store) = &self.trace_store {
            store.end_trace(&self.agent_id);
        }
    }

    /// Clear spatial memory and rotate the trace episode. The default
    /// `on_episode_start` for every tier calls this; an override that
    /// doesn't call it must reproduce the cleanup itself.
    pub fn rotate_episode(&mut self) {
        self.world_map.clear();
        if let Some(store) = &self.trace_store {
            store.set_episode(&self.agent_id, None);
        }
    }
}

/// Full-tier Behavior: the user controls the entire `decide` call.
#[async_trait]
pub trait Behavior: Send {
    async fn decide(&mut self, observation: &Observation, tools: &[ToolSchema]) -> Decision;

    fn context(&mut self) -> &mut BehaviorContext;

    fn on_episode_start(&mut self) {
        self.context().rotate_episode();
    }

    fn on_episode_end(&mut self, _success: bool, _metrics: Option<Value>) {}

    fn on_tool_result(&mut self, _tool: &str, _result: &Value) {}
}

/// Simplified-tier Behavior: name a tool, let the framework fill parameters.
pub trait SimpleBehavior: Send {
    fn decide_simple(&mut self, context: &SimpleContext) -> String;
}

/// Bridges a [`SimpleBehavior`] into the full [`Behavior`] contract, applying
/// [`heuristics::infer_params`] to whatever tool name the user returns.
pub struct SimpleAdapter<B> {
    inner: B,
    context: BehaviorContext,
    goal: Option<String>,
}

impl<B: SimpleBehavior> SimpleAdapter<B> {
    pub fn new(agent_id: impl Into<String>, inner: B) -> Self {
        SimpleAdapter {
            inner,
            context: BehaviorContext::new(agent_id),
            goal: None,
        }
    }

    pub fn with_trace_store(mut self, store: TraceStore) -> Self {
        self.context = self.context.with_trace_store(store);
        self
    }

    pub fn with_spatial_config(mut self, stale_threshold: u64, experience_cap: usize) -> Self {
        self.context = self.context.with_spatial_config(stale_threshold, experience_cap);
        self
    }

    pub fn set_goal(&mut self, goal: impl Into<String>) {
        self.goal = Some(goal.into());
    }
}

#[async_trait]
impl<B: SimpleBehavior> Behavior for SimpleAdapter<B> {
    async fn decide(&mut self, observation: &Observation, _tools: &[ToolSchema]) -> Decision {
        let simple_context = SimpleContext::from_observation(observation, self.goal.clone());
        let tool = self.inner.decide_simple(&simple_context);
        let params = heuristics::infer_params(&tool, &simple_context);
        Decision {
            tool,
            params,
            reasoning: None,
        }
    }

    fn context(&mut self) -> &mut BehaviorContext {
        &mut self.context
    }
}
