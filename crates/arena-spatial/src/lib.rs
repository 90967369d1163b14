//! Spatial memory for tick-driven agents.
//!
//! Tracks remembered [`arena_types::WorldObject`]s in a uniform 3D grid so an
//! agent's decisions can be informed by things that are no longer in view —
//! where the last hazard was, which resources are nearby, what happened last
//! tick. See [`grid::SpatialMemory`] for the primary entry point.

pub mod grid;

pub use grid::{SemanticIndex, SpatialMemory, SpatialQueryResult};
