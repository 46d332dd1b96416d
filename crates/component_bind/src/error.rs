//! Error types for the entity/component core.

use crate::identity::Guid;

/// Errors raised by caller-contract violations and (de)serialization.
///
/// Lookups never produce these: an absent entity, component, property or
/// command is reported as `None`.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("Component name already in use on entity: {0}")]
    DuplicateComponent(String),

    #[error("Property name already in use on entity: {0}")]
    DuplicateProperty(String),

    #[error("Command name already in use on entity: {0}")]
    DuplicateCommand(String),

    #[error("GUID already registered to another entity: {0}")]
    DuplicateGuid(Guid),

    #[error("GUID is reserved: {0}")]
    ReservedGuid(Guid),

    #[error("No GUIDs left to assign")]
    GuidsExhausted,

    #[error("String identifier already registered to another entity: {0}")]
    DuplicateId(String),

    #[error("Entity is not attached to a runtime: {0}")]
    NotAttached(String),

    #[error("Entity is already attached to a runtime: {0}")]
    AlreadyAttached(String),

    #[error("Entity has been deleted: {0}")]
    Deleted(String),

    #[error("Component type already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Unknown component type: {0}")]
    UnknownComponentType(String),

    #[error("Component type has no registered serializer: {0}")]
    UnregisteredComponent(String),

    #[error("Invalid field {field} on {component}: {reason}")]
    InvalidField {
        component: String,
        field: String,
        reason: String,
    },

    #[error("Failed to parse: {0}")]
    ParseError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate.
pub type BindResult<T> = Result<T, BindError>;
