//! `arena-server` – the JSON-REST IPC surface for a tick-driven agent runtime.
//!
//! Boots a lightweight HTTP server (default port `5000`) that bridges a
//! simulation host to the [`Behavior`]s registered in a [`BehaviorRegistry`]:
//!
//! * `GET /health`, `GET /` — liveness and status/metrics.
//! * `POST /observe` — single-agent observation in, decision out.
//! * `POST /tick` — a batch of agents' observations, dispatched across a
//!   bounded worker pool, decisions out in request order.
//! * `POST /tools/execute` — acknowledgement-only; tool execution happens on
//!   the simulation host, not here.
//! * `GET /debug/*` — observation/trace inspection and a trace-viewer page,
//!   registered only when debug mode is enabled.
//!
//! # Usage
//!
//! ```rust,no_run
//! use arena_server::{ArenaServer, BehaviorRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = BehaviorRegistry::new();
//!     // registry.register("agent-1", Box::new(...)).await;
//!     ArenaServer::new(registry)
//!         .run()
//!         .await
//!         .expect("arena server failed");
//! }
//! ```
//!
//! [`Behavior`]: arena_runtime::Behavior

pub mod debug_store;
pub mod error;
pub mod metrics;
pub mod observation_tracker;
pub mod registry;
pub mod server;

pub use debug_store::DebugStore;
pub use error::ApiError;
pub use metrics::{Metrics, MetricsSnapshot};
pub use observation_tracker::{ObservationEntry, ObservationTracker};
pub use registry::{BehaviorHandle, BehaviorRegistry};
pub use server::{ArenaServer, DEFAULT_PORT};
