//! Weak, serializable entity references.
//!
//! A handle is a lightweight, copyable reference that names an entity without
//! owning it. It holds nothing but the GUID and resolves through an
//! [`IdentityRegistry`] on every access.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::identity::{Guid, IdentityRegistry};

/// Weak reference to an entity by GUID.
///
/// Equality is GUID equality, against other handles and against entities.
/// The null handle resolves to nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle {
    #[serde(default)]
    guid: Guid,
}

impl Handle {
    /// The handle that names no entity.
    pub const NULL: Handle = Handle { guid: Guid::NULL };

    /// Create a handle from a raw GUID
    pub fn new(guid: Guid) -> Self {
        Self { guid }
    }

    /// The referenced GUID
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Check if this handle names no entity
    pub fn is_null(&self) -> bool {
        self.guid.is_null()
    }

    /// Resolve to the live entity currently registered under this GUID.
    ///
    /// Never cached: a deleted target resolves to `None`, a re-registered one
    /// resolves to its replacement.
    pub fn resolve(&self, registry: &IdentityRegistry) -> Option<Entity> {
        registry.lookup(self.guid)
    }

    /// Point this handle at an entity, or at nothing.
    pub fn set(&mut self, entity: Option<&Entity>) {
        *self = Self::from(entity);
    }
}

impl From<&Entity> for Handle {
    fn from(entity: &Entity) -> Self {
        Self {
            guid: entity.guid(),
        }
    }
}

impl From<Option<&Entity>> for Handle {
    fn from(entity: Option<&Entity>) -> Self {
        entity.map(Handle::from).unwrap_or_default()
    }
}

impl From<Guid> for Handle {
    fn from(guid: Guid) -> Self {
        Self { guid }
    }
}

impl PartialEq<Entity> for Handle {
    fn eq(&self, other: &Entity) -> bool {
        self.guid == other.guid()
    }
}

impl PartialEq<Handle> for Entity {
    fn eq(&self, other: &Handle) -> bool {
        self.guid() == other.guid
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.guid)
    }
}
