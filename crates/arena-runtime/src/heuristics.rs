//! Parameter-inference heuristics for the simplified behavior adapter.
//!
//! A [`crate::behavior::SimpleBehavior`] only picks a tool name; these
//! functions fill in its parameters from a [`SimpleContext`] the same way the
//! framework does it for the full [`crate::behavior::Behavior`] tier.

use arena_types::{HazardInfo, Position, ResourceInfo};
use serde_json::{Map, Value};

/// Simplified per-tick context handed to [`crate::behavior::SimpleBehavior::decide`].
#[derive(Debug, Clone)]
pub struct SimpleContext {
    pub position: Position,
    pub nearby_resources: Vec<ResourceInfo>,
    pub nearby_hazards: Vec<HazardInfo>,
    pub inventory: Vec<String>,
    pub goal: Option<String>,
    pub tick: u64,
}

impl SimpleContext {
    pub fn from_observation(obs: &arena_types::Observation, goal: Option<String>) -> Self {
        SimpleContext {
            position: obs.position,
            nearby_resources: obs.nearby_resources.clone(),
            nearby_hazards: obs.nearby_hazards.clone(),
            inventory: obs.inventory.iter().map(|item| item.name.clone()).collect(),
            goal,
            tick: obs.tick,
        }
    }
}

fn position_value(pos: Position) -> Value {
    Value::from(vec![pos[0], pos[1], pos[2]])
}

fn nearest_resource(ctx: &SimpleContext) -> Option<&ResourceInfo> {
    ctx.nearby_resources
        .iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

fn nearest_hazard(ctx: &SimpleContext) -> Option<&HazardInfo> {
    ctx.nearby_hazards
        .iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Escape position 5 units along the vector from `hazard` to `agent`.
///
/// If the agent sits exactly on the hazard the vector has no direction; an
/// arbitrary axis is used rather than leaving the agent in place, since
/// staying on the hazard is the one outcome this heuristic must avoid.
fn escape_position(agent: Position, hazard: Position) -> Position {
    const ESCAPE_DISTANCE: f64 = 5.0;
    let delta = [
        agent[0] - hazard[0],
        agent[1] - hazard[1],
        agent[2] - hazard[2],
    ];
    let dist = (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt();
    if dist > 0.0 {
        [
            agent[0] + (delta[0] / dist) * ESCAPE_DISTANCE,
            agent[1] + (delta[1] / dist) * ESCAPE_DISTANCE,
            agent[2] + (delta[2] / dist) * ESCAPE_DISTANCE,
        ]
    } else {
        [agent[0] + ESCAPE_DISTANCE, agent[1], agent[2]]
    }
}

fn move_to_params(ctx: &SimpleContext) -> Map<String, Value> {
    let target = if let Some(resource) = nearest_resource(ctx) {
        resource.position
    } else if let Some(hazard) = nearest_hazard(ctx) {
        escape_position(ctx.position, hazard.position)
    } else {
        ctx.position
    };
    let mut params = Map::new();
    params.insert("target_position".to_string(), position_value(target));
    params
}

fn pickup_params(ctx: &SimpleContext) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(resource) = nearest_resource(ctx) {
        params.insert(
            "item_id".to_string(),
            Value::String(resource.name.clone()),
        );
    }
    params
}

fn first_inventory_params(ctx: &SimpleContext) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(item) = ctx.inventory.first() {
        params.insert("item_name".to_string(), Value::String(item.clone()));
    }
    params
}

/// Fill in parameters for `tool` given `ctx`, per the simplified adapter's
/// fixed heuristic set (move_to / pickup / drop / use); any other tool name
/// gets empty parameters.
pub fn infer_params(tool: &str, ctx: &SimpleContext) -> Map<String, Value> {
    match tool {
        "move_to" => move_to_params(ctx),
        "pickup" => pickup_params(ctx),
        "drop" | "use" => first_inventory_params(ctx),
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(position: Position) -> SimpleContext {
        SimpleContext {
            position,
            nearby_resources: Vec::new(),
            nearby_hazards: Vec::new(),
            inventory: Vec::new(),
            goal: None,
            tick: 1,
        }
    }

    fn resource(name: &str, position: Position, distance: f64) -> ResourceInfo {
        ResourceInfo {
            name: name.to_string(),
            resource_type: "berry".to_string(),
            position,
            distance,
        }
    }

    fn hazard(name: &str, position: Position, distance: f64) -> HazardInfo {
        HazardInfo {
            name: name.to_string(),
            hazard_type: "fire".to_string(),
            position,
            distance,
            damage: 10.0,
        }
    }

    #[test]
    fn move_to_targets_nearest_resource() {
        let mut c = ctx([0.0, 0.0, 0.0]);
        c.nearby_resources = vec![
            resource("far", [9.0, 0.0, 0.0], 9.0),
            resource("near", [2.0, 0.0, 0.0], 2.0),
        ];
        let params = infer_params("move_to", &c);
        assert_eq!(
            params.get("target_position").unwrap(),
            &Value::from(vec![2.0, 0.0, 0.0])
        );
    }

    #[test]
    fn move_to_escapes_nearest_hazard_when_no_resources() {
        let mut c = ctx([2.0, 0.0, 0.0]);
        c.nearby_hazards = vec![hazard("fire_1", [0.0, 0.0, 0.0], 2.0)];
        let params = infer_params("move_to", &c);
        let target = params.get("target_position").unwrap().as_array().unwrap();
        assert_eq!(target[0].as_f64().unwrap(), 7.0);
        assert_eq!(target[1].as_f64().unwrap(), 0.0);
        assert_eq!(target[2].as_f64().unwrap(), 0.0);
    }

    #[test]
    fn move_to_stays_in_place_on_zero_distance_hazard() {
        let c = {
            let mut c = ctx([1.0, 1.0, 1.0]);
            c.nearby_hazards = vec![hazard("fire_1", [1.0, 1.0, 1.0], 0.0)];
            c
        };
        let params = infer_params("move_to", &c);
        let target = params.get("target_position").unwrap().as_array().unwrap();
        assert_eq!(target[0].as_f64().unwrap(), 6.0);
    }

    #[test]
    fn move_to_stays_put_with_no_resources_or_hazards() {
        let c = ctx([3.0, 4.0, 5.0]);
        let params = infer_params("move_to", &c);
        assert_eq!(
            params.get("target_position").unwrap(),
            &Value::from(vec![3.0, 4.0, 5.0])
        );
    }

    #[test]
    fn pickup_targets_nearest_resource_by_name() {
        let mut c = ctx([0.0, 0.0, 0.0]);
        c.nearby_resources = vec![resource("apple_1", [1.0, 0.0, 0.0], 1.0)];
        let params = infer_params("pickup", &c);
        assert_eq!(params.get("item_id").unwrap(), "apple_1");
    }

    #[test]
    fn pickup_is_empty_with_no_resources() {
        let c = ctx([0.0, 0.0, 0.0]);
        assert!(infer_params("pickup", &c).is_empty());
    }

    #[test]
    fn drop_and_use_target_first_inventory_item() {
        let mut c = ctx([0.0, 0.0, 0.0]);
        c.inventory = vec!["torch".to_string(), "key".to_string()];
        assert_eq!(infer_params("drop", &c).get("item_name").unwrap(), "torch");
        assert_eq!(infer_params("use", &c).get("item_name").unwrap(), "torch");
    }

    #[test]
    fn unknown_tool_gets_empty_params() {
        let c = ctx([0.0, 0.0, 0.0]);
        assert!(infer_params("dance", &c).is_empty());
    }
}
