//! Server-wide counters exposed on `GET /`.

use std::sync::Mutex;

use serde::Serialize;

/// Tick/observation counters and an exponentially-smoothed tick latency.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_ticks: u64,
    pub total_agents_processed: u64,
    pub total_observations_processed: u64,
    pub avg_tick_time_ms: f64,
}

struct State {
    total_ticks: u64,
    total_agents_processed: u64,
    total_observations_processed: u64,
    avg_tick_time_ms: f64,
}

/// Smoothing weight applied to each new tick-time sample: `avg = avg*0.9 + sample*0.1`.
const SMOOTHING_WEIGHT: f64 = 0.1;

pub struct Metrics {
    state: Mutex<State>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            state: Mutex::new(State {
                total_ticks: 0,
                total_agents_processed: 0,
                total_observations_processed: 0,
                avg_tick_time_ms: 0.0,
            }),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one `/observe` call.
    pub fn record_observation(&self) {
        let mut s = self.state.lock().expect("metrics mutex poisoned");
        s.total_observations_processed += 1;
    }

    /// Record one completed `/tick` batch of `agent_count` agents that took
    /// `elapsed_ms`.
    pub fn record_tick(&self, agent_count: u64, elapsed_ms: f64) {
        let mut s = self.state.lock().expect("metrics mutex poisoned");
        s.total_ticks += 1;
        s.total_agents_processed += agent_count;
        s.total_observations_processed += agent_count;
        if s.total_ticks == 1 {
            s.avg_tick_time_ms = elapsed_ms;
        } else {
            s.avg_tick_time_ms = s.avg_tick_time_ms * (1.0 - SMOOTHING_WEIGHT) + elapsed_ms * SMOOTHING_WEIGHT;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let s = self.state.lock().expect("metrics mutex poisoned");
        MetricsSnapshot {
            total_ticks: s.total_ticks,
            total_agents_processed: s.total_agents_processed,
            total_observations_processed: s.total_observations_processed,
            avg_tick_time_ms: s.avg_tick_time_ms,
        }
    }
}
