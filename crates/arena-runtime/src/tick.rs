//! The per-agent tick orchestrator.
//!
//! Wraps one [`Behavior`] invocation with the framework-managed steps around
//! it: spatial-memory update, episode-boundary detection, trace lifecycle.
//! Fan-out across many agents for a batched `/tick` request (the bounded
//! worker pool and panic containment) is the HTTP layer's concern, since that
//! is where the per-agent registry and its locking live.

use arena_types::{Decision, Observation, ToolSchema};

use crate::behavior::Behavior;

/// Run one `decide` invocation through the framework's pre/post hooks:
///
/// 1. If `observation.tick` is strictly less than the last tick this
///    Behavior saw, treat it as an implicit episode boundary and call
///    `on_episode_start` before anything else (§4.7).
/// 2. Update the Behavior's spatial memory from `observation`.
/// 3. Open a new trace for `(agent_id, tick)`, if tracing is enabled.
/// 4. Call `decide`.
/// 5. Finalize (persist) whatever trace is open, regardless of outcome.
pub async fn run_tick(
    behavior: &mut dyn Behavior,
    observation: &Observation,
    tools: &[ToolSchema],
) -> Decision {
    let tick = observation.tick;

    if tick < behavior.context().current_tick() {
        behavior.on_episode_start();
    }

    {
        let ctx = behavior.context();
        ctx.update_world_map(observation);
        ctx.begin_trace(tick);
    }

    let decision = behavior.decide(observation, tools).await;

    behavior.context().finalize_trace();

    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{BehaviorContext, SimpleAdapter, SimpleBehavior};
    use crate::heuristics::SimpleContext;
    use arena_memory::TraceStore;
    use tempfile::tempdir;

    struct EchoBehavior;

    impl SimpleBehavior for EchoBehavior {
        fn decide_simple(&mut self, ctx: &SimpleContext) -> String {
            if ctx.nearby_resources.is_empty() {
                "idle".to_string()
            } else {
                "move_to".to_string()
            }
        }
    }

    fn observation(tick: u64) -> Observation {
        Observation {
            agent_id: "a1".to_string(),
            tick,
            position: [0.0, 0.0, 0.0],
            rotation: None,
            velocity: None,
            visible_entities: Vec::new(),
            nearby_resources: Vec::new(),
            nearby_hazards: Vec::new(),
            nearby_stations: Vec::new(),
            inventory: Vec::new(),
            health: 100.0,
            energy: 100.0,
            exploration: None,
            scenario_name: String::new(),
            objective: None,
            current_progress: Default::default(),
            custom: Default::default(),
        }
    }

    #[tokio::test]
    async fn run_tick_updates_world_map_before_decide() {
        let mut adapter = SimpleAdapter::new("a1", EchoBehavior);
        let mut obs = observation(1);
        obs.nearby_resources.push(arena_types::ResourceInfo {
            name: "berry_1".to_string(),
            resource_type: "berry".to_string(),
            position: [1.0, 0.0, 0.0],
            distance: 1.0,
        });
        let decision = run_tick(&mut adapter, &obs, &[]).await;
        assert_eq!(decision.tool, "move_to");
        assert_eq!(adapter.context().world_map().len(), 1);
    }

    #[tokio::test]
    async fn run_tick_persists_a_trace_per_decision() {
        let dir = tempdir().unwrap();
        let store = TraceStore::new(dir.path());
        let context = BehaviorContext::new("a1").with_trace_store(store.clone());
        struct Wrapper {
            inner: EchoBehavior,
            context: BehaviorContext,
        }
        #[async_trait::async_trait]
        impl Behavior for Wrapper {
            async fn decide(
                &mut self,
                observation: &Observation,
                _tools: &[ToolSchema],
            ) -> Decision {
                self.context.log_step("observed", serde_json::json!({"tick": observation.tick}));
                let ctx = SimpleContext::from_observation(observation, None);
                Decision::idle(Some(self.inner.decide_simple(&ctx)))
            }
            fn context(&mut self) -> &mut BehaviorContext {
                &mut self.context
            }
        }
        let mut wrapper = Wrapper {
            inner: EchoBehavior,
            context,
        };
        run_tick(&mut wrapper, &observation(1), &[]).await;
        assert_eq!(store.list_episodes("a1").len(), 1);
        let episode = store.list_episodes("a1").remove(0);
        let traces = store.get_episode_traces("a1", &episode).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].steps.len(), 1);
        assert_eq!(traces[0].steps[0].name, "observed");
    }

    #[tokio::test]
    async fn tick_regression_triggers_episode_reset() {
        let mut adapter = SimpleAdapter::new("a1", EchoBehavior);
        run_tick(&mut adapter, &observation(10), &[]).await;
        let mut earlier = observation(2);
        earlier.nearby_resources.push(arena_types::ResourceInfo {
            name: "berry_1".to_string(),
            resource_type: "berry".to_string(),
            position: [1.0, 0.0, 0.0],
            distance: 1.0,
        });
        run_tick(&mut adapter, &earlier, &[]).await;
        // The episode reset clears the world map before re-populating it
        // from `earlier`'s own observation, so exactly one object remains.
        assert_eq!(adapter.context().world_map().len(), 1);
    }
}
