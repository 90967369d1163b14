//! Value types shared by every crate in the workspace: the wire schemas
//! exchanged with the simulation host (`Observation`, `Decision`, `ToolSchema`),
//! the per-agent spatial-memory records (`WorldObject`, `ExperienceEvent`),
//! and the reasoning-trace shapes persisted by the trace store
//! (`TraceStep`, `ReasoningTrace`).

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// A 3D world-space position.
pub type Position = [f64; 3];

/// Information about a visible entity (other agents, NPCs, dynamic props).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub position: Position,
    pub distance: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// Information about a nearby collectible resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub position: Position,
    pub distance: f64,
}

/// Information about a nearby hazard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HazardInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub hazard_type: String,
    pub position: Position,
    pub distance: f64,
    #[serde(default)]
    pub damage: f64,
}

/// Information about a nearby, non-collectible interaction point (e.g. a crafting bench).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StationInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub station_type: String,
    pub position: Position,
    pub distance: f64,
}

/// One stack of an inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemInfo {
    pub id: String,
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// A potential exploration frontier in one compass direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExploreTarget {
    pub direction: String,
    pub distance: f64,
    pub position: Position,
}

/// World-exploration progress passed through verbatim from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExplorationInfo {
    pub exploration_percentage: f64,
    pub total_cells: u64,
    pub seen_cells: u64,
    #[serde(default)]
    pub frontiers_by_direction: HashMap<String, f64>,
    #[serde(default)]
    pub explore_targets: Vec<ExploreTarget>,
}

/// A scenario-defined success metric. Advisory only — the core never evaluates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricDefinition {
    pub target: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub lower_is_better: bool,
    #[serde(default)]
    pub required: bool,
}

fn default_weight() -> f64 {
    1.0
}

/// A scenario-defined goal, passed through from the host unevaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Objective {
    pub description: String,
    #[serde(default)]
    pub success_metrics: HashMap<String, MetricDefinition>,
    #[serde(default)]
    pub time_limit: u64,
}

/// Immutable per-agent, per-tick perception snapshot sent by the simulation host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    pub agent_id: String,
    pub tick: u64,
    pub position: Position,
    #[serde(default)]
    pub rotation: Option<Position>,
    #[serde(default)]
    pub velocity: Option<Position>,
    #[serde(default)]
    pub visible_entities: Vec<EntityInfo>,
    #[serde(default)]
    pub nearby_resources: Vec<ResourceInfo>,
    #[serde(default)]
    pub nearby_hazards: Vec<HazardInfo>,
    #[serde(default)]
    pub nearby_stations: Vec<StationInfo>,
    #[serde(default)]
    pub inventory: Vec<ItemInfo>,
    #[serde(default = "default_vital")]
    pub health: f64,
    #[serde(default = "default_vital")]
    pub energy: f64,
    #[serde(default)]
    pub exploration: Option<ExplorationInfo>,
    #[serde(default)]
    pub scenario_name: String,
    #[serde(default)]
    pub objective: Option<Objective>,
    #[serde(default)]
    pub current_progress: HashMap<String, f64>,
    #[serde(default)]
    pub custom: serde_json::Map<String, Value>,
}

fn default_vital() -> f64 {
    100.0
}

/// What a Behavior returns for one tick: a tool invocation plus optional reasoning.
///
/// `reasoning` is omitted from the encoded JSON entirely when absent — it is
/// never serialized as `null` — matching the wire format the original SDK produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reasoning: Option<String>,
}

impl Decision {
    pub const IDLE_TOOL: &'static str = "idle";

    /// An idle decision, optionally annotated with why nothing was done.
    pub fn idle(reasoning: impl Into<Option<String>>) -> Self {
        Decision {
            tool: Self::IDLE_TOOL.to_string(),
            params: serde_json::Map::new(),
            reasoning: reasoning.into(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.tool == Self::IDLE_TOOL
    }
}

/// Advertised capability: name, description, and a JSON-Schema-shaped parameter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    /// OpenAI-style `{type: "function", function: {...}}` wire shape.
    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    /// Anthropic-style `{name, description, input_schema}` wire shape.
    pub fn to_anthropic_format(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.parameters,
        })
    }
}

/// The kind of a world object remembered in spatial memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Resource,
    Hazard,
    Entity,
    Obstacle,
}

/// Lifecycle state of a remembered world object.
///
/// Once `Collected` or `Destroyed`, this is a terminal state: re-observation
/// of the same name must never move it back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    Active,
    Collected,
    Destroyed,
    Unknown,
}

impl ObjectStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ObjectStatus::Collected | ObjectStatus::Destroyed)
    }
}

/// A remembered entity in one agent's spatial memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorldObject {
    pub name: String,
    pub object_type: ObjectType,
    pub subtype: String,
    pub position: Position,
    pub last_seen_tick: u64,
    #[serde(default = "default_status")]
    pub status: ObjectStatus,
    #[serde(default)]
    pub damage: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

fn default_status() -> ObjectStatus {
    ObjectStatus::Active
}

impl WorldObject {
    pub fn distance_to(&self, pos: Position) -> f64 {
        let dx = self.position[0] - pos[0];
        let dy = self.position[1] - pos[1];
        let dz = self.position[2] - pos[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A significant episodic record (collision, damage, pickup, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExperienceEvent {
    pub tick: u64,
    pub event_type: String,
    pub description: String,
    pub position: Position,
    #[serde(default)]
    pub object_name: Option<String>,
    #[serde(default)]
    pub damage_taken: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// One stage of a decision's internal processing, e.g. `"observe"`, `"prompt"`, `"decide"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub name: String,
    pub data: Value,
    pub timestamp: f64,
    pub elapsed_ms: f64,
}

/// All steps recorded while producing one `(agent_id, tick, episode_id)` decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub agent_id: String,
    pub tick: u64,
    #[serde(default)]
    pub episode_id: String,
    pub trace_id: String,
    pub start_time: f64,
    #[serde(default)]
    pub steps: Vec<TraceStep>,
}

impl ReasoningTrace {
    /// Start a new trace for `agent_id` at `tick`, stamped with the current time.
    pub fn new(agent_id: impl Into<String>, tick: u64, episode_id: impl Into<String>) -> Self {
        ReasoningTrace {
            agent_id: agent_id.into(),
            tick,
            episode_id: episode_id.into(),
            trace_id: Uuid::new_v4().to_string()[..8].to_string(),
            start_time: unix_timestamp(),
            steps: Vec::new(),
        }
    }

    /// Append a step, timestamped relative to `start_time`.
    pub fn add_step(&mut self, name: impl Into<String>, data: Value) -> &TraceStep {
        let now = unix_timestamp();
        let elapsed_ms = (now - self.start_time) * 1000.0;
        self.steps.push(TraceStep {
            name: name.into(),
            data,
            timestamp: now,
            elapsed_ms,
        });
        self.steps.last().expect("just pushed")
    }
}

fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Error kinds surfaced at the HTTP boundary (§7 of the design document).
///
/// Deliberately narrow: the server maps each variant to exactly one status
/// class, so handlers never need to inspect a message string to decide how
/// to respond.
#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no behavior registered for agent {0:?}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_observation() -> Observation {
        Observation {
            agent_id: "a1".to_string(),
            tick: 5,
            position: [1.0, 2.0, 3.0],
            rotation: Some([0.0, 90.0, 0.0]),
            velocity: None,
            visible_entities: vec![EntityInfo {
                id: "e1".to_string(),
                entity_type: "agent".to_string(),
                position: [4.0, 0.0, 0.0],
                distance: 3.0,
                metadata: serde_json::Map::new(),
            }],
            nearby_resources: vec![ResourceInfo {
                name: "berry_1".to_string(),
                resource_type: "berry".to_string(),
                position: [2.0, 0.0, 0.0],
                distance: 1.0,
            }],
            nearby_hazards: vec![HazardInfo {
                name: "fire_1".to_string(),
                hazard_type: "fire".to_string(),
                position: [5.0, 0.0, 0.0],
                distance: 4.0,
                damage: 10.0,
            }],
            nearby_stations: vec![],
            inventory: vec![ItemInfo {
                id: "i1".to_string(),
                name: "stick".to_string(),
                quantity: 2,
            }],
            health: 80.0,
            energy: 60.0,
            exploration: Some(ExplorationInfo {
                exploration_percentage: 12.5,
                total_cells: 800,
                seen_cells: 100,
                frontiers_by_direction: HashMap::from([("north".to_string(), 30.0)]),
                explore_targets: vec![ExploreTarget {
                    direction: "north".to_string(),
                    distance: 30.0,
                    position: [0.0, 0.0, 30.0],
                }],
            }),
            scenario_name: "foraging".to_string(),
            objective: Some(Objective {
                description: "Collect resources".to_string(),
                success_metrics: HashMap::from([(
                    "resources_collected".to_string(),
                    MetricDefinition {
                        target: 10.0,
                        weight: 1.0,
                        lower_is_better: false,
                        required: true,
                    },
                )]),
                time_limit: 600,
            }),
            current_progress: HashMap::from([("resources_collected".to_string(), 3.0)]),
            custom: serde_json::Map::new(),
        }
    }

    #[test]
    fn observation_roundtrips_through_json() {
        let obs = sample_observation();
        let json = serde_json::to_value(&obs).unwrap();
        let back: Observation = serde_json::from_value(json).unwrap();
        assert_eq!(obs, back);
    }

    #[test]
    fn observation_defaults_fill_missing_fields() {
        let json = serde_json::json!({
            "agent_id": "a2",
            "tick": 0,
            "position": [0.0, 0.0, 0.0],
        });
        let obs: Observation = serde_json::from_value(json).unwrap();
        assert_eq!(obs.health, 100.0);
        assert_eq!(obs.energy, 100.0);
        assert!(obs.nearby_resources.is_empty());
        assert!(obs.objective.is_none());
    }

    #[test]
    fn decision_omits_reasoning_key_when_none() {
        let decision = Decision::idle(None);
        let json = serde_json::to_value(&decision).unwrap();
        assert!(!json.as_object().unwrap().contains_key("reasoning"));
    }

    #[test]
    fn decision_includes_reasoning_key_when_present() {
        let decision = Decision::idle(Some("waiting".to_string()));
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["reasoning"], "waiting");
    }

    #[test]
    fn decision_idle_roundtrip() {
        let decision = Decision::idle(Some("nothing to do".to_string()));
        assert!(decision.is_idle());
        let json = serde_json::to_value(&decision).unwrap();
        let back: Decision = serde_json::from_value(json).unwrap();
        assert_eq!(decision, back);
    }

    #[test]
    fn tool_schema_openai_format() {
        let schema = ToolSchema {
            name: "move_to".to_string(),
            description: "Move to a position".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        };
        let openai = schema.to_openai_format();
        assert_eq!(openai["type"], "function");
        assert_eq!(openai["function"]["name"], "move_to");
    }

    #[test]
    fn tool_schema_anthropic_format() {
        let schema = ToolSchema {
            name: "pickup".to_string(),
            description: "Pick up an item".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        };
        let anthropic = schema.to_anthropic_format();
        assert_eq!(anthropic["name"], "pickup");
        assert!(anthropic.get("input_schema").is_some());
    }

    #[test]
    fn world_object_status_is_terminal() {
        assert!(ObjectStatus::Collected.is_terminal());
        assert!(ObjectStatus::Destroyed.is_terminal());
        assert!(!ObjectStatus::Active.is_terminal());
        assert!(!ObjectStatus::Unknown.is_terminal());
    }

    #[test]
    fn world_object_distance_to() {
        let obj = WorldObject {
            name: "r1".to_string(),
            object_type: ObjectType::Resource,
            subtype: "berry".to_string(),
            position: [3.0, 0.0, 4.0],
            last_seen_tick: 1,
            status: ObjectStatus::Active,
            damage: 0.0,
            metadata: serde_json::Map::new(),
        };
        assert!((obj.distance_to([0.0, 0.0, 0.0]) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn world_object_roundtrip() {
        let obj = WorldObject {
            name: "h1".to_string(),
            object_type: ObjectType::Hazard,
            subtype: "fire".to_string(),
            position: [1.0, 2.0, 3.0],
            last_seen_tick: 42,
            status: ObjectStatus::Destroyed,
            damage: 15.0,
            metadata: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&obj).unwrap();
        let back: WorldObject = serde_json::from_value(json).unwrap();
        assert_eq!(obj, back);
    }

    #[test]
    fn experience_event_roundtrip() {
        let event = ExperienceEvent {
            tick: 7,
            event_type: "collision".to_string(),
            description: "hit a rock".to_string(),
            position: [1.0, 0.0, 1.0],
            object_name: Some("rock_1".to_string()),
            damage_taken: 5.0,
            metadata: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        let back: ExperienceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn reasoning_trace_roundtrip() {
        let trace = ReasoningTrace {
            agent_id: "a1".to_string(),
            tick: 5,
            episode_id: "ep_1_abcdef".to_string(),
            trace_id: "8hexdig".to_string(),
            start_time: 1000.0,
            steps: vec![
                TraceStep {
                    name: "observe".to_string(),
                    data: serde_json::json!({"position": [0.0, 0.0, 0.0]}),
                    timestamp: 1000.0,
                    elapsed_ms: 0.0,
                },
                TraceStep {
                    name: "decide".to_string(),
                    data: serde_json::json!({"tool": "move_to"}),
                    timestamp: 1000.05,
                    elapsed_ms: 50.0,
                },
            ],
        };
        let json = serde_json::to_value(&trace).unwrap();
        let back: ReasoningTrace = serde_json::from_value(json).unwrap();
        assert_eq!(trace, back);
        assert!(back.steps[0].elapsed_ms <= back.steps[1].elapsed_ms);
    }

    #[test]
    fn arena_error_display() {
        let err = ArenaError::NotFound("a9".to_string());
        assert!(err.to_string().contains("a9"));

        let err = ArenaError::Validation("bad position".to_string());
        assert!(err.to_string().contains("bad position"));
    }
}
