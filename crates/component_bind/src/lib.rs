//! Component Bind - entity/component runtime core
//!
//! Manages the identity, composition, teardown and cross-entity command
//! wiring of entities built from heterogeneous components.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Runtime (World)                           │
//! │  IdentityRegistry: GUID → Entity, string id → Entity         │
//! │  activated components                                        │
//! └────────┬──────────────────────────────────────────▲─────────┘
//!          │ attach / add_component                   │ remove
//!          ▼                                          │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Entity                               │
//! │  ComponentStore (by name + by type ancestry)                 │
//! │  properties · commands · bindings · command links            │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲
//!          │ Handle (GUID only, resolved on every access)
//! ```
//!
//! Entities are single-lock aggregates: no lock is held while components,
//! bindings, commands or the runtime are called, so every callback may
//! re-enter the entity.

pub mod binding;
pub mod command;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod factory;
pub mod handle;
pub mod identity;
pub mod link;
pub mod property;
pub mod runtime;
pub mod snapshot;
pub mod store;

mod signal;

pub use binding::{Binding, BindingId, CommandBinding, NotifyBinding};
pub use command::{Command, CommandEntry, Permissions};
pub use component::{Ancestry, AsAny, Component, ComponentBase, TypeView};
pub use config::BindConfig;
pub use entity::{Entity, LifecycleState, WeakEntity};
pub use error::{BindError, BindResult};
pub use factory::{ComponentFactory, ComponentSchema, DynamicComponent, FieldKind, FieldSpec};
pub use handle::Handle;
pub use identity::{Guid, IdentityRegistry};
pub use link::{CommandLink, LinkState};
pub use property::{AnyProperty, EditorData, Property, PropertyEntry};
pub use runtime::{Runtime, World, WorldConfig};
pub use signal::{Action, ListenerId};
pub use snapshot::{ComponentRecord, EntitySnapshot};
pub use store::ComponentStore;
