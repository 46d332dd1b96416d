//! Declarative cross-entity command wiring.
//!
//! A [`CommandLink`] says "when my command `source_command` runs, run
//! `target_command` on `target_entity`". Only the three names are persisted;
//! the concrete commands are resolved lazily and cached.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::Command;
use crate::entity::WeakEntity;
use crate::handle::Handle;
use crate::identity::IdentityRegistry;

/// Resolution state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Only names are known
    Unresolved,
    /// The source command is bound; the target has not been reached yet
    SourceResolved,
    /// A target command is cached
    Resolved,
}

#[derive(Default)]
struct Resolution {
    source: Option<Command>,
    // The cached target is only trusted while the handle still resolves to
    // the same entity.
    target: Option<(WeakEntity, Command)>,
}

/// Persisted command link owned by the source entity.
#[derive(Default, Serialize, Deserialize)]
pub struct CommandLink {
    #[serde(default)]
    pub target_entity: Handle,
    #[serde(default)]
    pub target_command: String,
    #[serde(default)]
    pub source_command: String,
    #[serde(skip)]
    resolution: Mutex<Resolution>,
}

impl CommandLink {
    pub fn new(
        target_entity: impl Into<Handle>,
        target_command: impl Into<String>,
        source_command: impl Into<String>,
    ) -> Self {
        Self {
            target_entity: target_entity.into(),
            target_command: target_command.into(),
            source_command: source_command.into(),
            resolution: Mutex::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        let resolution = self.resolution.lock();
        match (&resolution.source, &resolution.target) {
            (_, Some(_)) => LinkState::Resolved,
            (Some(_), None) => LinkState::SourceResolved,
            (None, None) => LinkState::Unresolved,
        }
    }

    /// The bound source command, if any
    pub fn source(&self) -> Option<Command> {
        self.resolution.lock().source.clone()
    }

    /// Bind the source side. Only the first binding sticks; returns true if
    /// this call bound it.
    pub(crate) fn resolve_source(&self, command: &Command) -> bool {
        let mut resolution = self.resolution.lock();
        if resolution.source.is_some() {
            return false;
        }
        resolution.source = Some(command.clone());
        true
    }

    /// Run the target command.
    ///
    /// Uses the cached target while the handle still resolves to the entity
    /// it was cached from, otherwise looks the command up again. A target
    /// entity or command that cannot be found makes this a no-op; returns
    /// whether a command ran.
    pub fn invoke(&self, registry: &IdentityRegistry) -> bool {
        let Some(target) = self.target_entity.resolve(registry) else {
            self.resolution.lock().target = None;
            debug!(handle = %self.target_entity, command = %self.target_command, "Link target entity not found");
            return false;
        };

        let cached = {
            let resolution = self.resolution.lock();
            match &resolution.target {
                Some((entity, command)) if entity.points_to(&target) => Some(command.clone()),
                _ => None,
            }
        };

        let command = match cached {
            Some(command) => command,
            None => {
                let Some(command) = target.command(&self.target_command) else {
                    debug!(entity = %target, command = %self.target_command, "Link target command not found");
                    return false;
                };
                self.resolution.lock().target = Some((target.downgrade(), command.clone()));
                command
            }
        };

        command.execute();
        true
    }

    /// Drop both cached resolutions
    pub fn reset(&self) {
        *self.resolution.lock() = Resolution::default();
    }
}

impl Clone for CommandLink {
    /// Copies the persisted names; the clone starts unresolved.
    fn clone(&self) -> Self {
        Self::new(
            self.target_entity,
            self.target_command.clone(),
            self.source_command.clone(),
        )
    }
}

impl PartialEq for CommandLink {
    fn eq(&self, other: &Self) -> bool {
        self.target_entity == other.target_entity
            && self.target_command == other.target_command
            && self.source_command == other.source_command
    }
}

impl fmt::Debug for CommandLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandLink")
            .field("target_entity", &self.target_entity)
            .field("target_command", &self.target_command)
            .field("source_command", &self.source_command)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::runtime::World;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_command(hits: &Arc<AtomicUsize>) -> Command {
        let counter = hits.clone();
        Command::with_action(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_missing_target_is_noop() {
        let world = World::default_shared();
        let link = CommandLink::new(Handle::from(crate::Guid(99)), "Jump", "Trigger");

        assert!(!link.invoke(world.registry()));
        assert_eq!(link.state(), LinkState::Unresolved);
    }

    #[test]
    fn test_resolves_once_target_appears() {
        let world = World::default_shared();
        let target = Entity::new("Target");
        world.add(&target).unwrap();
        let link = CommandLink::new(&target, "Jump", "Trigger");

        // Entity exists, command does not yet
        assert!(!link.invoke(world.registry()));

        let hits = Arc::new(AtomicUsize::new(0));
        target
            .add_command("Jump", counting_command(&hits), Default::default(), None)
            .unwrap();

        assert!(link.invoke(world.registry()));
        assert_eq!(link.state(), LinkState::Resolved);
        assert!(link.invoke(world.registry()));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cached_target_reused() {
        let world = World::default_shared();
        let target = Entity::new("Target");
        world.add(&target).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        target
            .add_command("Jump", counting_command(&hits), Default::default(), None)
            .unwrap();
        let link = CommandLink::new(&target, "Jump", "Trigger");
        assert!(link.invoke(world.registry()));

        // A cached target keeps firing after its name is unregistered
        target.remove_command("Jump");
        assert!(link.invoke(world.registry()));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_deleted_target_drops_cache() {
        let world = World::default_shared();
        let target = Entity::new("Target");
        world.add(&target).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        target
            .add_command("Jump", counting_command(&hits), Default::default(), None)
            .unwrap();
        let link = CommandLink::new(&target, "Jump", "Trigger");
        assert!(link.invoke(world.registry()));

        target.delete();

        assert!(!link.invoke(world.registry()));
        assert_eq!(link.state(), LinkState::Unresolved);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_serialized_form_has_names_only() {
        let link = CommandLink::new(Handle::from(crate::Guid(4)), "Open", "OnEnter");
        link.resolve_source(&Command::new());

        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "target_entity": { "guid": 4 },
                "target_command": "Open",
                "source_command": "OnEnter",
            })
        );

        let back: CommandLink = serde_json::from_value(json).unwrap();
        assert_eq!(back, link);
        assert_eq!(back.state(), LinkState::Unresolved);
    }
}
