//! Uniform-grid spatial memory.
//!
//! Tracks [`WorldObject`]s (resources, hazards, entities, obstacles) by
//! position so an agent can answer "what's near me" and "what do I know
//! about the world" even for objects currently out of line-of-sight.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`SpatialMemory`] | Per-agent store: object map + grid index + experience log. |
//! | [`SpatialQueryResult`] | One hit from a proximity or semantic query. |
//! | [`SemanticIndex`] | Optional delegate for [`SpatialMemory::query_semantic`]. |
//!
//! # Example
//!
//! ```rust
//! use arena_spatial::grid::SpatialMemory;
//! use arena_types::{Observation, ObjectType};
//!
//! let mut memory = SpatialMemory::new();
//! let observation: Observation = serde_json::from_value(serde_json::json!({
//!     "agent_id": "a1", "tick": 1, "position": [0.0, 0.0, 0.0],
//!     "nearby_resources": [{"name": "berry_1", "type": "berry", "position": [2.0, 0.0, 0.0], "distance": 2.0}]
//! })).unwrap();
//! memory.update_from_observation(&observation);
//!
//! let nearby = memory.query_near_position([0.0, 0.0, 0.0], 5.0, None, false, true);
//! assert_eq!(nearby.len(), 1);
//! assert_eq!(nearby[0].object.name, "berry_1");
//! ```

use std::collections::{HashMap, HashSet};

use arena_types::{
    EntityInfo, ExperienceEvent, HazardInfo, ObjectStatus, ObjectType, Observation, ResourceInfo,
    WorldObject,
};

/// Fixed cell size of the uniform grid, in world units.
pub const GRID_CELL_SIZE: f64 = 10.0;

/// Default staleness threshold, in ticks, before an unseen object is stale.
pub const DEFAULT_STALE_THRESHOLD: u64 = 100;

/// Default cap on the experience log.
pub const DEFAULT_EXPERIENCE_CAP: usize = 50;

type GridCell = (i64, i64, i64);

fn pos_to_grid(pos: [f64; 3]) -> GridCell {
    (
        pos[0].div_euclid(GRID_CELL_SIZE) as i64,
        pos[1].div_euclid(GRID_CELL_SIZE) as i64,
        pos[2].div_euclid(GRID_CELL_SIZE) as i64,
    )
}

/// A delegate for [`SpatialMemory::query_semantic`]. Left unimplemented by
/// the core — callers that want semantic search plug in a concrete index
/// (e.g. an embedding store) satisfying this trait.
pub trait SemanticIndex: Send + Sync {
    /// Store or refresh the embedding for one object.
    fn store(&mut self, obj: &WorldObject);
    /// Return `(name, score)` pairs for the `k` best matches above `threshold`.
    fn query(&self, text: &str, k: usize, threshold: f64) -> Vec<(String, f64)>;
    fn clear(&mut self);
}

/// One hit from a proximity or semantic query.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialQueryResult {
    pub object: WorldObject,
    pub distance: f64,
    /// Semantic similarity score; `1.0` for non-semantic (proximity/type) queries.
    pub score: f64,
    /// Ticks since the object was last seen.
    pub staleness: u64,
}

/// Per-agent store of remembered [`WorldObject`]s plus a bounded experience log,
/// indexed by a uniform 3D grid for proximity queries.
pub struct SpatialMemory {
    objects: HashMap<String, WorldObject>,
    grid: HashMap<GridCell, HashSet<String>>,
    experiences: Vec<ExperienceEvent>,
    experience_cap: usize,
    stale_threshold: u64,
    current_tick: u64,
    semantic: Option<Box<dyn SemanticIndex>>,
}

impl Default for SpatialMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialMemory {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_STALE_THRESHOLD, DEFAULT_EXPERIENCE_CAP)
    }

    pub fn with_config(stale_threshold: u64, experience_cap: usize) -> Self {
        SpatialMemory {
            objects: HashMap::new(),
            grid: HashMap::new(),
            experiences: Vec::new(),
            experience_cap,
            stale_threshold,
            current_tick: 0,
            semantic: None,
        }
    }

    /// Attach a semantic index to back [`Self::query_semantic`].
    pub fn with_semantic_index(mut self, index: Box<dyn SemanticIndex>) -> Self {
        self.semantic = Some(index);
        self
    }

    fn add_to_grid(&mut self, obj: &WorldObject) {
        self.grid
            .entry(pos_to_grid(obj.position))
            .or_default()
            .insert(obj.name.clone());
    }

    fn remove_from_grid(&mut self, obj: &WorldObject) {
        let cell = pos_to_grid(obj.position);
        if let Some(names) = self.grid.get_mut(&cell) {
            names.remove(&obj.name);
            if names.is_empty() {
                self.grid.remove(&cell);
            }
        }
    }

    fn nearby_cells(&self, center: [f64; 3], radius: f64) -> Vec<GridCell> {
        let (cx, cy, cz) = pos_to_grid(center);
        let span = (radius / GRID_CELL_SIZE) as i64 + 1;
        let mut cells = Vec::new();
        for dx in -span..=span {
            for dy in -span..=span {
                for dz in -span..=span {
                    cells.push((cx + dx, cy + dy, cz + dz));
                }
            }
        }
        cells
    }

    fn store_or_update(&mut self, mut obj: WorldObject) {
        if let Some(existing) = self.objects.get(&obj.name) {
            self.remove_from_grid(existing);
            if existing.status.is_terminal() {
                obj.status = existing.status;
            }
        }
        self.add_to_grid(&obj);
        if let Some(index) = self.semantic.as_mut() {
            index.store(&obj);
        }
        self.objects.insert(obj.name.clone(), obj);
    }

    /// Update spatial memory with every resource, hazard, and entity visible
    /// in `observation`. Existing objects keep a terminal (`collected`/
    /// `destroyed`) status across updates.
    pub fn update_from_observation(&mut self, observation: &Observation) {
        self.current_tick = observation.tick;

        for resource in &observation.nearby_resources {
            self.store_or_update(world_object_from_resource(resource, observation.tick));
        }
        for hazard in &observation.nearby_hazards {
            self.store_or_update(world_object_from_hazard(hazard, observation.tick));
        }
        for entity in &observation.visible_entities {
            self.store_or_update(world_object_from_entity(entity, observation.tick));
        }
    }

    /// Mark an object collected. Returns whether it was known.
    pub fn mark_collected(&mut self, name: &str) -> bool {
        match self.objects.get_mut(name) {
            Some(obj) => {
                obj.status = ObjectStatus::Collected;
                true
            }
            None => false,
        }
    }

    /// Mark an object destroyed. Returns whether it was known.
    pub fn mark_destroyed(&mut self, name: &str) -> bool {
        match self.objects.get_mut(name) {
            Some(obj) => {
                obj.status = ObjectStatus::Destroyed;
                true
            }
            None => false,
        }
    }

    /// Objects within `radius` of `center`, sorted by ascending distance.
    pub fn query_near_position(
        &self,
        center: [f64; 3],
        radius: f64,
        object_type: Option<ObjectType>,
        include_collected: bool,
        include_stale: bool,
    ) -> Vec<SpatialQueryResult> {
        let mut candidates: HashSet<&str> = HashSet::new();
        for cell in self.nearby_cells(center, radius) {
            if let Some(names) = self.grid.get(&cell) {
                candidates.extend(names.iter().map(String::as_str));
            }
        }

        let mut results: Vec<SpatialQueryResult> = candidates
            .into_iter()
            .filter_map(|name| self.objects.get(name))
            .filter(|obj| object_type.is_none_or(|t| obj.object_type == t))
            .filter(|obj| include_collected || !obj.status.is_terminal())
            .filter_map(|obj| {
                let distance = obj.distance_to(center);
                if distance > radius {
                    return None;
                }
                let staleness = self.current_tick.saturating_sub(obj.last_seen_tick);
                if !include_stale && staleness > self.stale_threshold {
                    return None;
                }
                Some(SpatialQueryResult {
                    object: obj.clone(),
                    distance,
                    score: 1.0,
                    staleness,
                })
            })
            .collect();

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results
    }

    /// Linear scan for every object of `object_type` (optionally narrowed by `subtype`).
    pub fn query_by_type(
        &self,
        object_type: ObjectType,
        subtype: Option<&str>,
        include_collected: bool,
    ) -> Vec<WorldObject> {
        self.objects
            .values()
            .filter(|obj| obj.object_type == object_type)
            .filter(|obj| subtype.is_none_or(|s| obj.subtype == s))
            .filter(|obj| include_collected || !obj.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Delegate to the attached [`SemanticIndex`], joining results back to live objects.
    pub fn query_semantic(
        &self,
        text: &str,
        limit: usize,
        include_collected: bool,
    ) -> Vec<SpatialQueryResult> {
        let Some(index) = self.semantic.as_ref() else {
            return Vec::new();
        };

        index
            .query(text, limit * 2, 0.0)
            .into_iter()
            .filter_map(|(name, score)| self.objects.get(&name).map(|obj| (obj, score)))
            .filter(|(obj, _)| include_collected || !obj.status.is_terminal())
            .map(|(obj, score)| SpatialQueryResult {
                object: obj.clone(),
                distance: 0.0,
                score,
                staleness: self.current_tick.saturating_sub(obj.last_seen_tick),
            })
            .take(limit)
            .collect()
    }

    pub fn get_object(&self, name: &str) -> Option<&WorldObject> {
        self.objects.get(name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Record a significant experience. Collisions also materialize an
    /// `obstacle` WorldObject at the collision position.
    pub fn record_experience(&mut self, event: ExperienceEvent) {
        if event.event_type == "collision" {
            if let Some(name) = event.object_name.clone() {
                self.store_or_update(WorldObject {
                    name,
                    object_type: ObjectType::Obstacle,
                    subtype: "collision".to_string(),
                    position: event.position,
                    last_seen_tick: event.tick,
                    status: ObjectStatus::Active,
                    damage: 0.0,
                    metadata: serde_json::Map::new(),
                });
            }
        }

        self.experiences.push(event);
        if self.experiences.len() > self.experience_cap {
            self.experiences.remove(0);
        }
    }

    /// Most recent experiences, oldest first, at most `limit`.
    pub fn recent_experiences(&self, limit: usize) -> &[ExperienceEvent] {
        let start = self.experiences.len().saturating_sub(limit);
        &self.experiences[start..]
    }

    /// Clear objects, grid, experiences, and any attached semantic index, atomically.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.grid.clear();
        self.experiences.clear();
        if let Some(index) = self.semantic.as_mut() {
            index.clear();
        }
    }
}

fn world_object_from_resource(resource: &ResourceInfo, tick: u64) -> WorldObject {
    WorldObject {
        name: resource.name.clone(),
        object_type: ObjectType::Resource,
        subtype: resource.resource_type.clone(),
        position: resource.position,
        last_seen_tick: tick,
        status: ObjectStatus::Active,
        damage: 0.0,
        metadata: serde_json::Map::new(),
    }
}

fn world_object_from_hazard(hazard: &HazardInfo, tick: u64) -> WorldObject {
    WorldObject {
        name: hazard.name.clone(),
        object_type: ObjectType::Hazard,
        subtype: hazard.hazard_type.clone(),
        position: hazard.position,
        last_seen_tick: tick,
        status: ObjectStatus::Active,
        damage: hazard.damage,
        metadata: serde_json::Map::new(),
    }
}

fn world_object_from_entity(entity: &EntityInfo, tick: u64) -> WorldObject {
    WorldObject {
        name: entity.id.clone(),
        object_type: ObjectType::Entity,
        subtype: entity.entity_type.clone(),
        position: entity.position,
        last_seen_tick: tick,
        status: ObjectStatus::Active,
        damage: 0.0,
        metadata: entity.metadata.clone(),
    }
}
