//! `arena-runtime` – the agent decision engine.
//!
//! Wraps one [`Behavior`] invocation per tick with the framework-managed
//! steps around it: spatial-memory update, episode-boundary detection, and
//! trace lifecycle.
//!
//! # Modules
//!
//! - [`behavior`] – [`Behavior`][behavior::Behavior]: the full tier, plus
//!   [`SimpleBehavior`][behavior::SimpleBehavior]/[`SimpleAdapter`][behavior::SimpleAdapter],
//!   the simplified tier bridged through [`heuristics::infer_params`].
//! - [`heuristics`] – [`SimpleContext`][heuristics::SimpleContext] and the
//!   fixed parameter-inference rules the simplified tier relies on.
//! - [`llm`] – [`LlmBackend`][llm::LlmBackend] and [`HttpBackend`][llm::HttpBackend]:
//!   an OpenAI-compatible async HTTP client carrying forward rate limiting,
//!   a token budget circuit breaker, and a TLS/localhost-only endpoint check.
//!   [`STABILITY_GUIDELINES`][llm::STABILITY_GUIDELINES] is injected into
//!   every system-role message to discourage repetitive action loops.
//! - [`llm_behavior`] – [`LlmBehavior`][llm_behavior::LlmBehavior]: the LLM
//!   tier, building a prompt from a sliding window of observations and
//!   parsing the reply with [`parsing`].
//! - [`parsing`] – [`parse_decision`][parsing::parse_decision]: turns
//!   free-form or structured LLM output into a [`Decision`][arena_types::Decision].
//! - [`tick`] – [`run_tick`][tick::run_tick]: the per-agent tick orchestrator.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.
//!   Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export to
//!   Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod behavior;
pub mod heuristics;
pub mod llm;
pub mod llm_behavior;
pub mod parsing;
pub mod telemetry;
pub mod tick;

pub use behavior::{Behavior, BehaviorContext, SimpleAdapter, SimpleBehavior};
pub use heuristics::SimpleContext;
pub use llm::{ChatMessage, FinishReason, GenerationResult, HttpBackend, LlmBackend, LlmError, Role, STABILITY_GUIDELINES};
pub use llm_behavior::LlmBehavior;
pub use parsing::{parse_decision, parse_decision_text};
pub use telemetry::{init_tracing, TracerProviderGuard};
pub use tick::run_tick;
