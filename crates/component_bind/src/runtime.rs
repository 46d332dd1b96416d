//! The owning runtime seen from an entity, and a reference implementation.
//!
//! Entities only talk to their runtime through the [`Runtime`] trait: to
//! reach the identity registry, to learn whether editor-only state is
//! needed, to activate components, and to be dropped on deletion. [`World`]
//! is the in-process runtime used by the CLI and by tests.

use std::fmt;
use std::sync::Arc;

use dashmap::DashSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::component::Component;
use crate::entity::Entity;
use crate::error::BindResult;
use crate::factory::ComponentFactory;
use crate::identity::{Guid, IdentityRegistry};
use crate::snapshot::EntitySnapshot;

/// Services an entity needs from whoever owns it.
pub trait Runtime: Send + Sync {
    /// Identity registry entities register into
    fn registry(&self) -> &IdentityRegistry;

    /// Whether editor-only state (rename tracking, metadata) is kept
    fn editor_enabled(&self) -> bool;

    /// Component-activation path, called once per component when it becomes
    /// live on an attached entity
    fn add_component(&self, entity: &Entity, component: Arc<dyn Component>);

    /// Called by a deleting entity, before it releases its identifiers
    fn remove(&self, entity: &Entity);
}

// ─────────────────────────────────────────────────────────────────────────────
// World
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Keep editor-only state on attached entities
    pub editor: bool,
}

/// In-process runtime tracking entities and their activated components.
pub struct World {
    config: WorldConfig,
    registry: IdentityRegistry,
    // Keyed by identity; GUIDs can change after attach
    entities: DashSet<Entity>,
    components: Mutex<Vec<Arc<dyn Component>>>,
}

impl World {
    pub fn new(config: WorldConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: IdentityRegistry::new(),
            entities: DashSet::new(),
            components: Mutex::new(Vec::new()),
        })
    }

    /// A world with default settings
    pub fn default_shared() -> Arc<Self> {
        Self::new(WorldConfig::default())
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Attach an entity and start tracking it
    pub fn add(self: &Arc<Self>, entity: &Entity) -> BindResult<()> {
        let runtime: Arc<dyn Runtime> = self.clone();
        entity.attach(runtime)?;
        self.entities.insert(entity.clone());
        Ok(())
    }

    /// A tracked entity by GUID
    pub fn get(&self, guid: Guid) -> Option<Entity> {
        self.entities
            .iter()
            .find(|e| e.key().guid() == guid)
            .map(|e| e.key().clone())
    }

    /// Tracked entities in GUID order
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.entities.iter().map(|e| e.key().clone()).collect();
        entities.sort_by_key(Entity::guid);
        entities
    }

    /// Activated components in activation order
    pub fn active_components(&self) -> Vec<Arc<dyn Component>> {
        self.components.lock().clone()
    }

    /// Suspend or resume every tracked entity that allows it
    pub fn suspend_all(&self, suspended: bool) {
        for entity in self.entities() {
            if !entity.cannot_suspend() {
                entity.set_suspended(suspended);
            }
        }
    }

    /// Delete every tracked entity
    pub fn clear(&self) {
        let entities = self.entities();
        let count = entities.len();
        for entity in entities {
            entity.delete();
        }
        debug!(count, "Cleared world");
    }

    /// Build, attach and track every entity of a scene, in order
    pub fn load_scene(
        self: &Arc<Self>,
        scene: Vec<EntitySnapshot>,
        factory: &ComponentFactory,
    ) -> BindResult<Vec<Entity>> {
        let mut loaded = Vec::with_capacity(scene.len());
        for snapshot in scene {
            let entity = Entity::load(snapshot, factory)?;
            self.add(&entity)?;
            loaded.push(entity);
        }
        info!(entities = loaded.len(), "Loaded scene");
        Ok(loaded)
    }

    /// Save every tracked serializable entity, in GUID order
    pub fn save_scene(&self, factory: &ComponentFactory) -> BindResult<Vec<EntitySnapshot>> {
        self.entities()
            .iter()
            .filter(|entity| entity.is_serializable())
            .map(|entity| entity.save(factory))
            .collect()
    }

    /// Number of tracked entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Runtime for World {
    fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    fn editor_enabled(&self) -> bool {
        self.config.editor
    }

    fn add_component(&self, entity: &Entity, component: Arc<dyn Component>) {
        debug!(entity = %entity, component = component.as_ref().type_name(), "Activated component");
        self.components.lock().push(component);
    }

    fn remove(&self, entity: &Entity) {
        self.entities.remove(entity);
        self.components.lock().retain(|component| {
            component
                .base()
                .entity()
                .is_some_and(|owner| owner != *entity)
        });
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("entities", &self.entities.len())
            .field("components", &self.components.lock().len())
            .finish()
    }
}
