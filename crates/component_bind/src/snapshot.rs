//! Persisted form of entities and scenes.
//!
//! ```json
//! {
//!   "type": "Door",
//!   "guid": 12,
//!   "id": "front_door",
//!   "linked_commands": [
//!     { "target_entity": { "guid": 3 }, "target_command": "Open", "source_command": "OnUse" }
//!   ],
//!   "components": [
//!     { "name": "health", "type": "BasicHealth", "data": { "hit_points": 10 } }
//!   ]
//! }
//! ```
//!
//! A scene is a JSON array of entity snapshots.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::component::Component;
use crate::entity::Entity;
use crate::error::BindResult;
use crate::factory::ComponentFactory;
use crate::identity::Guid;
use crate::link::CommandLink;

/// One named component in persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub data: Value,
}

/// An entity in persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub guid: Guid,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub linked_commands: Vec<CommandLink>,
    #[serde(default)]
    pub components: Vec<ComponentRecord>,
}

impl Entity {
    /// Capture the entity's persisted form.
    ///
    /// Only serializable components are written; each gets its `on_save`
    /// hook first, then the entity-level save notification fires.
    pub fn save(&self, factory: &ComponentFactory) -> BindResult<EntitySnapshot> {
        let mut components = Vec::new();
        for (name, component) in self.components() {
            if !component.base().is_serializable() {
                continue;
            }
            component.on_save();
            components.push(factory.save(&name, component.as_ref())?);
        }

        if let Some(on_save) = self.on_save() {
            on_save.execute();
        }

        Ok(EntitySnapshot {
            type_name: self.type_name().to_string(),
            guid: self.guid(),
            id: self.id(),
            linked_commands: self.links().iter().map(|link| link.as_ref().clone()).collect(),
            components,
        })
    }

    /// Build an unregistered entity from its persisted form
    pub fn load(snapshot: EntitySnapshot, factory: &ComponentFactory) -> BindResult<Entity> {
        let entity = Entity::with_guid(snapshot.type_name, snapshot.guid);
        entity.set_id(snapshot.id);
        for link in snapshot.linked_commands {
            entity.add_link(link);
        }
        entity.set_components(&snapshot.components, factory)?;
        debug!(entity = %entity, components = snapshot.components.len(), "Loaded entity");
        Ok(entity)
    }

    /// Replace the component collection with freshly built components
    pub fn set_components(&self, records: &[ComponentRecord], factory: &ComponentFactory) -> BindResult<()> {
        let entries = records
            .iter()
            .map(|record| Ok((record.name.clone(), factory.create(record)?)))
            .collect::<BindResult<Vec<(String, Arc<dyn Component>)>>>()?;
        self.replace_components(entries)
    }
}

/// Parse a scene from JSON text
pub fn parse_scene(json: &str) -> BindResult<Vec<EntitySnapshot>> {
    Ok(serde_json::from_str(json)?)
}

/// Read a scene file
pub fn read_scene(path: &Path) -> BindResult<Vec<EntitySnapshot>> {
    let content = std::fs::read_to_string(path)?;
    parse_scene(&content)
}

/// Render a scene as pretty-printed JSON
pub fn scene_to_json(scene: &[EntitySnapshot]) -> BindResult<String> {
    Ok(serde_json::to_string_pretty(scene)?)
}
