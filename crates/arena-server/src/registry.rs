//! The per-agent Behavior registry.
//!
//! A plain `RwLock<HashMap<...>>` guards only registration/lookup; each
//! agent's own `Mutex<Box<dyn Behavior>>` serializes that agent's own ticks
//! without blocking lookups for other agents (§5's "DashMap-free" registry
//! shape).

use std::collections::HashMap;
use std::sync::Arc;

use arena_runtime::Behavior;
use tokio::sync::{Mutex, RwLock};

/// Shared handle to one registered agent's behavior.
pub type BehaviorHandle = Arc<Mutex<Box<dyn Behavior>>>;

/// Thread-safe map from `agent_id` to its registered [`Behavior`].
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    inner: Arc<RwLock<HashMap<String, BehaviorHandle>>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, agent_id: impl Into<String>, behavior: Box<dyn Behavior>) {
        let mut map = self.inner.write().await;
        map.insert(agent_id.into(), Arc::new(Mutex::new(behavior)));
    }

    pub async fn get(&self, agent_id: &str) -> Option<BehaviorHandle> {
        let map = self.inner.read().await;
        map.get(agent_id).cloned()
    }

    pub async fn agent_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_runtime::{SimpleAdapter, SimpleBehavior, SimpleContext};

    struct Idle;
    impl SimpleBehavior for Idle {
        fn decide_simple(&mut self, _ctx: &SimpleContext) -> String {
            "idle".to_string()
        }
    }

    #[tokio::test]
    async fn register_then_get_returns_the_same_behavior() {
        let registry = BehaviorRegistry::new();
        registry
            .register("a1", Box::new(SimpleAdapter::new("a1", Idle)))
            .await;
        assert!(registry.get("a1").await.is_some());
        assert!(registry.get("a2").await.is_none());
        assert_eq!(registry.agent_count().await, 1);
    }
}
