//! Per-agent visibility-change tracking for the debug surface.
//!
//! Compares each arriving observation's resource/hazard name sets to the
//! previous observation for the same agent and records what was gained or
//! lost, in a bounded ring buffer.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use arena_types::Observation;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

const DEFAULT_CAPACITY: usize = 1000;

/// One tracked observation with its visibility-change analysis.
#[derive(Debug, Clone, Serialize)]
pub struct ObservationEntry {
    pub tick: u64,
    pub agent_id: String,
    pub timestamp: String,
    pub position: [f64; 3],
    pub visible_resources: Vec<String>,
    pub visible_hazards: Vec<String>,
    pub gained_resources: Vec<String>,
    pub lost_resources: Vec<String>,
    pub gained_hazards: Vec<String>,
    pub lost_hazards: Vec<String>,
    pub raw_observation: Value,
}

impl ObservationEntry {
    pub fn has_changes(&self) -> bool {
        !self.gained_resources.is_empty()
            || !self.lost_resources.is_empty()
            || !self.gained_hazards.is_empty()
            || !self.lost_hazards.is_empty()
    }
}

struct State {
    entries: VecDeque<ObservationEntry>,
    last_visible: std::collections::HashMap<String, (HashSet<String>, HashSet<String>)>,
}

/// Tracks observations and detects visibility changes, per agent.
pub struct ObservationTracker {
    state: Mutex<State>,
    capacity: usize,
}

impl Default for ObservationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ObservationTracker {
    pub fn new(capacity: usize) -> Self {
        ObservationTracker {
            state: Mutex::new(State {
                entries: VecDeque::new(),
                last_visible: std::collections::HashMap::new(),
            }),
            capacity,
        }
    }

    /// Record `observation`, returning its computed [`ObservationEntry`].
    pub fn track(&self, observation: &Observation, raw: Value) -> ObservationEntry {
        let current_resources: HashSet<String> = observation
            .nearby_resources
            .iter()
            .map(|r| r.name.clone())
            .collect();
        let current_hazards: HashSet<String> = observation
            .nearby_hazards
            .iter()
            .map(|h| h.name.clone())
            .collect();

        let mut state = self.state.lock().expect("observation tracker mutex poisoned");
        let (last_resources, last_hazards) = state
            .last_visible
            .get(&observation.agent_id)
            .cloned()
            .unwrap_or_default();

        let mut gained_resources: Vec<String> =
            current_resources.difference(&last_resources).cloned().collect();
        let mut lost_resources: Vec<String> =
            last_resources.difference(&current_resources).cloned().collect();
        let mut gained_hazards: Vec<String> =
            current_hazards.difference(&last_hazards).cloned().collect();
        let mut lost_hazards: Vec<String> =
            last_hazards.difference(&current_hazards).cloned().collect();
        gained_resources.sort();
        lost_resources.sort();
        gained_hazards.sort();
        lost_hazards.sort();

        state.last_visible.insert(
            observation.agent_id.clone(),
            (current_resources.clone(), current_hazards.clone()),
        );

        let mut visible_resources: Vec<String> = current_resources.into_iter().collect();
        let mut visible_hazards: Vec<String> = current_hazards.into_iter().collect();
        visible_resources.sort();
        visible_hazards.sort();

        let entry = ObservationEntry {
            tick: observation.tick,
            agent_id: observation.agent_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            position: observation.position,
            visible_resources,
            visible_hazards,
            gained_resources,
            lost_resources,
            gained_hazards,
            lost_hazards,
            raw_observation: raw,
        };

        if state.entries.len() >= self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(entry.clone());
        entry
    }

    pub fn recent(&self, limit: usize, agent_id: Option<&str>) -> Vec<ObservationEntry> {
        let state = self.state.lock().expect("observation tracker mutex poisoned");
        filtered_tail(&state.entries, limit, agent_id, |_| true)
    }

    pub fn changes(&self, limit: usize, agent_id: Option<&str>) -> Vec<ObservationEntry> {
        let state = self.state.lock().expect("observation tracker mutex poisoned");
        filtered_tail(&state.entries, limit, agent_id, ObservationEntry::has_changes)
    }

    pub fn known_agents(&self) -> Vec<String> {
        let state = self.state.lock().expect("observation tracker mutex poisoned");
        let mut agents: Vec<String> = state.last_visible.keys().cloned().collect();
        agents.sort();
        agents
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().expect("observation tracker mutex poisoned");
        state.entries.clear();
        state.last_visible.clear();
    }
}

fn filtered_tail(
    entries: &VecDeque<ObservationEntry>,
    limit: usize,
    agent_id: Option<&str>,
    predicate: impl Fn(&ObservationEntry) -> bool,
) -> Vec<ObservationEntry> {
    let matching: Vec<&ObservationEntry> = entries
        .iter()
        .filter(|e| agent_id.is_none_or(|id| e.agent_id == id))
        .filter(|e| predicate(e))
        .collect();
    let start = matching.len().saturating_sub(limit);
    matching[start..].iter().map(|e| (*e).clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_types::{HazardInfo, ResourceInfo};

    fn observation(tick: u64, resources: Vec<&str>) -> Observation {
        Observation {
            agent_id: "a1".to_string(),
            tick,
            position: [0.0, 0.0, 0.0],
            rotation: None,
            velocity: None,
            visible_entities: Vec::new(),
            nearby_resources: resources
                .into_iter()
                .map(|n| ResourceInfo {
                    name: n.to_string(),
                    resource_type: "berry".to_string(),
                    position: [0.0, 0.0, 0.0],
                    distance: 1.0,
                })
                .collect(),
            nearby_hazards: Vec::<HazardInfo>::new(),
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

    #[test]
    fn first_observation_for_an_agent_is_all_gained() {
        let tracker = ObservationTracker::new(10);
        let entry = tracker.track(&observation(1, vec!["berry_1"]), Value::Null);
        assert_eq!(entry.gained_resources, vec!["berry_1".to_string()]);
        assert!(entry.lost_resources.is_empty());
        assert!(entry.has_changes());
    }

    #[test]
    fn second_observation_reports_gained_and_lost() {
        let tracker = ObservationTracker::new(10);
        tracker.track(&observation(1, vec!["berry_1"]), Value::Null);
        let entry = tracker.track(&observation(2, vec!["berry_2"]), Value::Null);
        assert_eq!(entry.gained_resources, vec!["berry_2".to_string()]);
        assert_eq!(entry.lost_resources, vec!["berry_1".to_string()]);
    }

    #[test]
    fn changes_excludes_entries_with_no_visibility_delta() {
        let tracker = ObservationTracker::new(10);
        tracker.track(&observation(1, vec!["berry_1"]), Value::Null);
        tracker.track(&observation(2, vec!["berry_1"]), Value::Null);
        assert_eq!(tracker.changes(10, None).len(), 1);
        assert_eq!(tracker.recent(10, None).len(), 2);
    }

    #[test]
    fn ring_buffer_evicts_oldest_beyond_capacity() {
        let tracker = ObservationTracker::new(2);
        tracker.track(&observation(1, vec![]), Value::Null);
        tracker.track(&observation(2, vec![]), Value::Null);
        tracker.track(&observation(3, vec![]), Value::Null);
        let recent = tracker.recent(10, None);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].tick, 2);
        assert_eq!(recent[1].tick, 3);
    }

    #[test]
    fn clear_resets_entries_and_visibility_state() {
        let tracker = ObservationTracker::new(10);
        tracker.track(&observation(1, vec!["berry_1"]), Value::Null);
        tracker.clear();
        assert!(tracker.recent(10, None).is_empty());
        let entry = tracker.track(&observation(2, vec!["berry_1"]), Value::Null);
        assert_eq!(entry.gained_resources, vec!["berry_1".to_string()]);
    }
}
