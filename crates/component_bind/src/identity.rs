//! Identity registry: GUID and string-identifier resolution.
//!
//! The registry is the sole source of truth for "which live entity does this
//! identifier name". Entities insert and remove themselves through their own
//! lifecycle methods; everything else only reads.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::Entity;
use crate::error::{BindError, BindResult};

// ─────────────────────────────────────────────────────────────────────────────
// Guid
// ─────────────────────────────────────────────────────────────────────────────

/// Process-scoped numeric entity identifier.
///
/// `Guid::NULL` (0) and `Guid::MAX` are reserved and never assigned to a
/// live entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(pub u64);

impl Guid {
    /// The unassigned identifier.
    pub const NULL: Guid = Guid(0);

    /// Upper bound of the generator. Never registered.
    pub const MAX: Guid = Guid(u64::MAX);

    /// Check if this is the unassigned identifier
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Guid {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Maps GUIDs and non-empty string identifiers to live entities.
///
/// One registry is owned by each runtime; tests construct isolated instances.
pub struct IdentityRegistry {
    by_guid: DashMap<Guid, Entity>,
    by_id: DashMap<String, Entity>,
    next_guid: AtomicU64,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    /// Create an empty registry. The first generated GUID is 1.
    pub fn new() -> Self {
        Self {
            by_guid: DashMap::new(),
            by_id: DashMap::new(),
            next_guid: AtomicU64::new(1),
        }
    }

    /// Create a new registry wrapped in an Arc
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register an entity under its GUID and, if set, its string identifier.
    ///
    /// A null GUID is replaced by a freshly generated one. A pre-set GUID
    /// (deserialized entities) advances the generator past it so it is never
    /// handed out again. The entity's GUID is only written once both entries
    /// are in place.
    pub fn register(&self, entity: &Entity) -> BindResult<Guid> {
        let preset = entity.guid();
        let guid = if preset.is_null() {
            self.allocate()?
        } else if preset == Guid::MAX {
            return Err(BindError::ReservedGuid(preset));
        } else {
            preset
        };

        match self.by_guid.entry(guid) {
            Entry::Occupied(existing) => {
                if existing.get() != entity {
                    return Err(BindError::DuplicateGuid(guid));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(entity.clone());
            }
        }

        let id = entity.id();
        if !id.is_empty() {
            if let Err(e) = self.insert_id(&id, entity) {
                self.by_guid.remove_if(&guid, |_, e| e == entity);
                return Err(e);
            }
        }

        entity.set_guid(guid);
        self.next_guid.fetch_max(guid.0 + 1, Ordering::SeqCst);
        debug!(%guid, id = %id, "Registered entity");
        Ok(guid)
    }

    // Hand out the next GUID. `Guid::MAX` is never handed out.
    fn allocate(&self) -> BindResult<Guid> {
        self.next_guid
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next < u64::MAX).then(|| next + 1)
            })
            .map(Guid)
            .map_err(|_| BindError::GuidsExhausted)
    }

    /// Remove an entity's GUID entry and current string-identifier entry.
    ///
    /// Entries that point at a different entity are left alone.
    pub fn unregister(&self, entity: &Entity) {
        let guid = entity.guid();
        if !guid.is_null() {
            self.by_guid.remove_if(&guid, |_, e| e == entity);
        }
        let id = entity.id();
        if !id.is_empty() {
            self.by_id.remove_if(&id, |_, e| e == entity);
        }
    }

    /// Remove a string-identifier entry if it points at `entity`
    pub fn release_id(&self, id: &str, entity: &Entity) {
        if !id.is_empty() {
            self.by_id.remove_if(id, |_, e| e == entity);
        }
    }

    /// Drop the entity's current GUID entry and register it under a fresh one.
    ///
    /// If the generator is exhausted the entity keeps its current GUID.
    pub fn renew_guid(&self, entity: &Entity) -> BindResult<Guid> {
        let guid = self.allocate()?;
        let old = entity.guid();
        if !old.is_null() {
            self.by_guid.remove_if(&old, |_, e| e == entity);
        }
        self.by_guid.insert(guid, entity.clone());
        entity.set_guid(guid);
        Ok(guid)
    }

    /// Move an entity's string-identifier entry from `old` to `new`.
    ///
    /// Empty identifiers are not indexed. Fails if `new` already names a
    /// different live entity; the old entry is removed either way.
    pub fn rename(&self, entity: &Entity, old: &str, new: &str) -> BindResult<()> {
        if !old.is_empty() {
            self.by_id.remove_if(old, |_, e| e == entity);
        }
        if !new.is_empty() {
            self.insert_id(new, entity)?;
        }
        Ok(())
    }

    fn insert_id(&self, id: &str, entity: &Entity) -> BindResult<()> {
        match self.by_id.entry(id.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get() != entity {
                    return Err(BindError::DuplicateId(id.to_string()));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(entity.clone());
            }
        }
        Ok(())
    }

    /// Look up a live entity by GUID. The null GUID matches nothing.
    pub fn lookup(&self, guid: Guid) -> Option<Entity> {
        if guid.is_null() {
            return None;
        }
        self.by_guid.get(&guid).map(|r| r.value().clone())
    }

    /// Look up a live entity by string identifier
    pub fn lookup_id(&self, id: &str) -> Option<Entity> {
        if id.is_empty() {
            return None;
        }
        self.by_id.get(id).map(|r| r.value().clone())
    }

    /// Check if a GUID is registered
    pub fn contains(&self, guid: Guid) -> bool {
        self.by_guid.contains_key(&guid)
    }

    /// The GUID the next auto-assignment will hand out
    pub fn peek_next_guid(&self) -> Guid {
        Guid(self.next_guid.load(Ordering::SeqCst))
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.by_guid.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.by_guid.is_empty()
    }
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("entities", &self.by_guid.len())
            .field("ids", &self.by_id.len())
            .field("next_guid", &self.peek_next_guid())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_fresh_guid() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        let b = Entity::new("Test");

        let ga = registry.register(&a).unwrap();
        let gb = registry.register(&b).unwrap();

        assert_eq!(ga, Guid(1));
        assert_eq!(gb, Guid(2));
        assert_eq!(a.guid(), ga);
        assert_eq!(registry.lookup(ga).unwrap(), a);
        assert_eq!(registry.lookup(gb).unwrap(), b);
    }

    #[test]
    fn test_preset_guid_advances_counter() {
        let registry = IdentityRegistry::new();
        let loaded = Entity::new("Test");
        loaded.set_guid(Guid(40));
        registry.register(&loaded).unwrap();

        assert_eq!(registry.peek_next_guid(), Guid(41));

        let fresh = Entity::new("Test");
        assert_eq!(registry.register(&fresh).unwrap(), Guid(41));
    }

    #[test]
    fn test_null_guid_never_resolves() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        registry.register(&a).unwrap();

        assert!(registry.lookup(Guid::NULL).is_none());
        assert!(registry.lookup_id("").is_none());
    }

    #[test]
    fn test_register_indexes_string_id() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        a.set_id("player");
        registry.register(&a).unwrap();

        assert_eq!(registry.lookup_id("player").unwrap(), a);
    }

    #[test]
    fn test_duplicate_string_id_rejected() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        a.set_id("player");
        registry.register(&a).unwrap();

        let b = Entity::new("Test");
        b.set_id("player");
        let result = registry.register(&b);

        assert!(matches!(result, Err(BindError::DuplicateId(_))));
        assert_eq!(registry.lookup_id("player").unwrap(), a);
        // The failed registration leaves no GUID entry behind
        assert!(registry.lookup(b.guid()).is_none());
    }

    #[test]
    fn test_duplicate_guid_rejected() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        a.set_guid(Guid(7));
        registry.register(&a).unwrap();

        let b = Entity::new("Test");
        b.set_guid(Guid(7));
        assert!(matches!(registry.register(&b), Err(BindError::DuplicateGuid(Guid(7)))));
    }

    #[test]
    fn test_unregister_removes_both_entries() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        a.set_id("door");
        let guid = registry.register(&a).unwrap();

        registry.unregister(&a);

        assert!(registry.lookup(guid).is_none());
        assert!(registry.lookup_id("door").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rename_moves_id_entry() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        a.set_id("old");
        registry.register(&a).unwrap();

        registry.rename(&a, "old", "new").unwrap();

        assert!(registry.lookup_id("old").is_none());
        assert_eq!(registry.lookup_id("new").unwrap(), a);
    }

    #[test]
    fn test_renew_guid() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        let first = registry.register(&a).unwrap();

        let second = registry.renew_guid(&a).unwrap();

        assert_ne!(first, second);
        assert!(registry.lookup(first).is_none());
        assert_eq!(registry.lookup(second).unwrap(), a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_max_preset_guid_rejected() {
        let registry = IdentityRegistry::new();
        let a = Entity::with_guid("Test", Guid::MAX);

        assert!(matches!(registry.register(&a), Err(BindError::ReservedGuid(_))));
        assert!(registry.is_empty());
        assert_eq!(registry.peek_next_guid(), Guid(1));
    }

    #[test]
    fn test_exhausted_generator_leaves_guid_untouched() {
        let registry = IdentityRegistry::new();
        let last = Entity::with_guid("Test", Guid(u64::MAX - 1));
        registry.register(&last).unwrap();
        assert_eq!(registry.peek_next_guid(), Guid::MAX);

        let fresh = Entity::new("Test");
        assert!(matches!(registry.register(&fresh), Err(BindError::GuidsExhausted)));
        assert!(fresh.guid().is_null());

        assert!(matches!(registry.renew_guid(&last), Err(BindError::GuidsExhausted)));
        assert_eq!(last.guid(), Guid(u64::MAX - 1));
        assert_eq!(registry.lookup(last.guid()).unwrap(), last);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_register_keeps_null_guid() {
        let registry = IdentityRegistry::new();
        let a = Entity::new("Test");
        a.set_id("player");
        registry.register(&a).unwrap();

        let b = Entity::new("Test");
        b.set_id("player");
        assert!(registry.register(&b).is_err());
        assert!(b.guid().is_null());

        let loaded = Entity::with_guid("Test", a.guid());
        assert!(registry.register(&loaded).is_err());
        assert_eq!(loaded.guid(), a.guid());
        assert_eq!(registry.lookup(a.guid()).unwrap(), a);
    }
}
