//! The LLM-powered Behavior tier: wraps an [`LlmBackend`] and bridges it into
//! the full [`Behavior`] contract via prompt construction, sliding-window
//! memory, and [`crate::parsing`].

use std::sync::Arc;

use arena_memory::{SlidingWindowError, SlidingWindowMemory, TraceStore};
use arena_types::{Decision, Observation, ToolSchema};
use async_trait::async_trait;
use serde_json::json;

use crate::behavior::{Behavior, BehaviorContext};
use crate::llm::LlmBackend;
use crate::parsing;

const DEFAULT_MEMORY_CAPACITY: usize = 10;

/// An agent whose decisions come from an [`LlmBackend`].
///
/// Builds a prompt from the system prompt, a sliding window of recent
/// observations, and the current observation; calls
/// [`LlmBackend::generate_with_tools`]; and parses the reply with
/// [`parsing::parse_decision`]. Backend errors degrade to an idle Decision
/// carrying the error in `reasoning`, never a panic.
pub struct LlmBehavior {
    context: BehaviorContext,
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    memory: SlidingWindowMemory,
}

impl LlmBehavior {
    pub fn new(
        agent_id: impl Into<String>,
        backend: Arc<dyn LlmBackend>,
        system_prompt: impl Into<String>,
    ) -> Self {
        LlmBehavior {
            context: BehaviorContext::new(agent_id),
            backend,
            system_prompt: system_prompt.into(),
            memory: SlidingWindowMemory::new(DEFAULT_MEMORY_CAPACITY)
                .expect("default memory capacity is non-zero"),
        }
    }

    pub fn with_trace_store(mut self, store: TraceStore) -> Self {
        self.context = self.context.with_trace_store(store);
        self
    }

    pub fn with_memory_capacity(mut self, capacity: usize) -> Result<Self, SlidingWindowError> {
        self.memory = SlidingWindowMemory::new(capacity)?;
        Ok(self)
    }

    fn build_prompt(&self, observation: &Observation) -> String {
        let mut parts = vec![self.system_prompt.clone(), String::new()];

        let summary = self.memory.summarize();
        if self.memory.len() > 1 {
            parts.push(summary);
            parts.push(String::new());
        }

        parts.push("Current observation:".to_string());
        parts.push(format!("  Tick: {}", observation.tick));
        parts.push(format!("  Position: {:?}", observation.position));
        parts.push(format!("  Health: {}", observation.health));
        parts.push(format!("  Energy: {}", observation.energy));
        if !observation.nearby_resources.is_empty() {
            parts.push(format!(
                "  Nearby resources: {}",
                observation.nearby_resources.len()
            ));
        }
        if !observation.nearby_hazards.is_empty() {
            parts.push(format!(
                "  Nearby hazards: {}",
                observation.nearby_hazards.len()
            ));
        }
        if observation.inventory.is_empty() {
            parts.push("  Inventory: empty".to_string());
        } else {
            parts.push(format!("  Inventory: {} items", observation.inventory.len()));
        }
        parts.push(String::new());
        parts.push("Choose an action based on the observation above.".to_string());

        parts.join("\n")
    }
}

#[async_trait]
impl Behavior for LlmBehavior {
    async fn decide(&mut self, observation: &Observation, tools: &[ToolSchema]) -> Decision {
        self.memory.store(observation.clone());
        let prompt = self.build_prompt(observation);
        self.context.log_step("prompt", json!({"text": prompt, "length": prompt.len()}));

        match self.backend.generate_with_tools(&prompt, tools, None).await {
            Ok(result) => {
                self.context.log_step(
                    "response",
                    json!({"text": result.text, "tokens_used": result.tokens_used}),
                );
                let decision = parsing::parse_decision(&result);
                self.context.log_step(
                    "decision",
                    json!({"tool": decision.tool, "params": decision.params}),
                );
                decision
            }
            Err(err) => {
                self.context.log_step("error", json!({"message": err.to_string()}));
                Decision::idle(Some(format!("Error: {err}")))
            }
        }
    }

    fn context(&mut self) -> &mut BehaviorContext {
        &mut self.context
    }

    fn on_episode_start(&mut self) {
        self.context.rotate_episode();
        self.memory.clear();
    }
}
