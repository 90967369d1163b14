//! Persistent and semi-persistent memory for tick-driven agents.
//!
//! # Modules
//!
//! - [`sliding_window`] – [`SlidingWindowMemory`][sliding_window::SlidingWindowMemory]:
//!   FIFO window of the N most recent observations.
//! - [`trace_store`] – [`TraceStore`][trace_store::TraceStore]: JSONL-backed
//!   persistence for reasoning traces, one file per `(agent_id, episode_id)`.
//! - [`semantic`] – [`SqliteSemanticStore`][semantic::SqliteSemanticStore]: an
//!   optional SQLite-backed semantic index for free-text recall over
//!   arbitrary records (see `arena-spatial`'s `query_semantic`).

pub mod semantic;
pub mod sliding_window;
pub mod trace_store;

pub use semantic::{SemanticCallbacks, SemanticError, SemanticHit, SqliteSemanticStore};
pub use sliding_window::{SlidingWindowError, SlidingWindowMemory};
pub use trace_store::{TraceStore, TraceStoreError, WatchHandle};
