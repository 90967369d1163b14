//! FIFO sliding-window observation memory.
//!
//! Keeps the `capacity` most recent [`Observation`]s for one agent. Oldest
//! entries are dropped once capacity is exceeded; nothing here is persisted.
//!
//! # Example
//!
//! ```rust
//! use arena_memory::sliding_window::SlidingWindowMemory;
//! use arena_types::Observation;
//!
//! let mut memory = SlidingWindowMemory::new(2).unwrap();
//! for tick in 0..3 {
//!     let obs: Observation = serde_json::from_value(serde_json::json!({
//!         "agent_id": "a1", "tick": tick, "position": [0.0, 0.0, 0.0],
//!     })).unwrap();
//!     memory.store(obs);
//! }
//! assert_eq!(memory.len(), 2);
//! assert_eq!(memory.retrieve(None)[0].tick, 2);
//! ```

use arena_types::Observation;
use thiserror::Error;

/// Errors constructing a [`SlidingWindowMemory`].
#[derive(Debug, Error)]
pub enum SlidingWindowError {
    #[error("capacity must be at least 1")]
    ZeroCapacity,
}

/// Keeps the `capacity` most recent observations, most recent first on retrieval.
#[derive(Debug, Clone)]
pub struct SlidingWindowMemory {
    capacity: usize,
    observations: Vec<Observation>,
}

impl SlidingWindowMemory {
    pub fn new(capacity: usize) -> Result<Self, SlidingWindowError> {
        if capacity < 1 {
            return Err(SlidingWindowError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            observations: Vec::new(),
        })
    }

    /// Store an observation, evicting the oldest if over capacity.
    pub fn store(&mut self, observation: Observation) {
        self.observations.push(observation);
        if self.observations.len() > self.capacity {
            let overflow = self.observations.len() - self.capacity;
            self.observations.drain(0..overflow);
        }
    }

    /// Retrieve stored observations, most recent first, optionally truncated to `limit`.
    pub fn retrieve(&self, limit: Option<usize>) -> Vec<&Observation> {
        let limit = limit.unwrap_or(self.observations.len());
        self.observations.iter().rev().take(limit).collect()
    }

    /// Human-readable summary of the current window.
    pub fn summarize(&self) -> String {
        if self.observations.is_empty() {
            return "No observations in memory.".to_string();
        }

        let mut lines = vec![format!(
            "Memory (last {} observations):",
            self.observations.len()
        )];
        for obs in self.observations.iter().rev() {
            lines.push(format!("\n[Tick {}]", obs.tick));
            lines.push(format!("  Position: {:?}", obs.position));
            if !obs.nearby_resources.is_empty() {
                lines.push(format!(
                    "  Nearby resources: {}",
                    obs.nearby_resources.len()
                ));
            }
            if !obs.nearby_hazards.is_empty() {
                lines.push(format!("  Nearby hazards: {}", obs.nearby_hazards.len()));
            }
            lines.push(format!(
                "  Health: {:.0}, Energy: {:.0}",
                obs.health, obs.energy
            ));
        }
        lines.join("\n")
    }

    pub fn clear(&mut self) {
        self.observations.clear();
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
