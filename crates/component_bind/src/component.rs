//! The component contract and type-ancestry declarations.
//!
//! Rust has no runtime base-class walk, so each component declares the types
//! it can be looked up as. An [`Ancestry`] lists one view per type: the
//! concrete type first, then any capability traits (`dyn Trait`) the
//! component implements. The entity's type index holds one entry per view.
//!
//! ```ignore
//! trait Health: Component {
//!     fn hit_points(&self) -> i32;
//! }
//!
//! impl Component for RegeneratingHealth {
//!     fn base(&self) -> &ComponentBase {
//!         &self.base
//!     }
//!
//!     fn ancestry(self: Arc<Self>) -> Ancestry {
//!         ancestry!(self, dyn Health)
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::command::Command;
use crate::entity::{Entity, WeakEntity};
use crate::property::Property;

// ─────────────────────────────────────────────────────────────────────────────
// Component trait
// ─────────────────────────────────────────────────────────────────────────────

/// Downcasting support, implemented for every `'static + Send + Sync` type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    /// Rust name of the concrete type
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A behavior/data unit attached to exactly one entity.
pub trait Component: AsAny {
    /// Shared state every component carries
    fn base(&self) -> &ComponentBase;

    /// Types this component can be looked up as, most-derived first.
    ///
    /// The default is the concrete type only. Override with [`ancestry!`]
    /// to add capability traits.
    fn ancestry(self: Arc<Self>) -> Ancestry {
        Ancestry::of(self)
    }

    /// Called immediately before the component is serialized
    fn on_save(&self) {}

    /// Deletion hook, run by the owning entity during teardown
    fn delete(&self) {
        self.base().delete.execute();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Component Base
// ─────────────────────────────────────────────────────────────────────────────

/// State shared by all components.
pub struct ComponentBase {
    /// Paused without being removed. Toggled in bulk by the entity.
    pub suspended: Property<bool>,
    /// Executed when the component is deleted
    pub delete: Command,
    serializable: AtomicBool,
    entity: OnceLock<WeakEntity>,
}

impl Default for ComponentBase {
    fn default() -> Self {
        Self {
            suspended: Property::new(false),
            delete: Command::new(),
            serializable: AtomicBool::new(true),
            entity: OnceLock::new(),
        }
    }
}

impl ComponentBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the component is included when its entity is saved
    pub fn is_serializable(&self) -> bool {
        self.serializable.load(Ordering::Relaxed)
    }

    pub fn set_serializable(&self, serializable: bool) {
        self.serializable.store(serializable, Ordering::Relaxed);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    /// The owning entity, if bound and still alive
    pub fn entity(&self) -> Option<Entity> {
        self.entity.get().and_then(WeakEntity::upgrade)
    }

    /// Whether the back-reference has been set
    pub fn is_bound(&self) -> bool {
        self.entity.get().is_some()
    }

    /// Set the back-reference. It can be set exactly once; binding again to
    /// the same entity is a no-op, binding to another entity is refused.
    pub(crate) fn bind_entity(&self, entity: &Entity) -> bool {
        if self.entity.set(entity.downgrade()).is_ok() {
            return true;
        }
        let same = self
            .entity
            .get()
            .is_some_and(|existing| existing.points_to(entity));
        if !same {
            warn!(entity = %entity, "Component is already bound to another entity");
        }
        same
    }
}

impl fmt::Debug for ComponentBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBase")
            .field("suspended", &self.suspended.get())
            .field("serializable", &self.is_serializable())
            .field("bound", &self.is_bound())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ancestry
// ─────────────────────────────────────────────────────────────────────────────

/// A component seen as one specific type (concrete or `dyn Trait`).
#[derive(Clone)]
pub struct TypeView {
    type_id: TypeId,
    type_name: &'static str,
    // Holds an `Arc<T>` for the view's `T`
    view: Arc<dyn Any + Send + Sync>,
}

impl TypeView {
    pub fn of<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            view: Arc::new(value),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The component as `T`, if this is the view for `T`
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.view.downcast_ref::<Arc<T>>().cloned()
    }
}

impl fmt::Debug for TypeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Ordered set of type views for one component, most-derived first.
#[derive(Clone, Default, Debug)]
pub struct Ancestry {
    views: Vec<TypeView>,
}

impl Ancestry {
    /// Start an ancestry from the component's concrete type
    pub fn of<T: ?Sized + Send + Sync + 'static>(component: Arc<T>) -> Self {
        Self {
            views: vec![TypeView::of(component)],
        }
    }

    /// Add a view. A type already present is not added twice.
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, view: Arc<T>) -> Self {
        if !self.contains(TypeId::of::<T>()) {
            self.views.push(TypeView::of(view));
        }
        self
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.views.iter().any(|v| v.type_id == type_id)
    }

    pub fn find(&self, type_id: TypeId) -> Option<&TypeView> {
        self.views.iter().find(|v| v.type_id == type_id)
    }

    /// The component as `T`, if `T` is one of its views
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.find(TypeId::of::<T>()).and_then(TypeView::downcast)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeView> {
        self.views.iter()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.views.iter().map(|v| v.type_id)
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.views.iter().map(|v| v.type_name).collect()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// Build an [`Ancestry`] from `self: Arc<Self>` plus capability views.
///
/// `ancestry!(self, dyn Health, dyn Damageable)`
#[macro_export]
macro_rules! ancestry {
    ($this:expr $(, $view:ty)* $(,)?) => {{
        let this = $this;
        $crate::Ancestry::of(::std::sync::Arc::clone(&this))
            $(.with::<$view>(::std::sync::Arc::clone(&this) as ::std::sync::Arc<$view>))*
    }};
}

#[cfg(test)]
pub(crate) mod testing {
    //! Components shared by the crate's unit tests.

    use super::*;
    use serde::{Deserialize, Serialize};

    pub trait Health: Component {
        fn hit_points(&self) -> i32;
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct BasicHealth {
        #[serde(skip)]
        pub base: ComponentBase,
        pub hit_points: i32,
    }

    impl BasicHealth {
        pub fn new(hit_points: i32) -> Arc<Self> {
            Arc::new(Self {
                hit_points,
                ..Default::default()
            })
        }
    }

    impl Component for BasicHealth {
        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn ancestry(self: Arc<Self>) -> Ancestry {
            ancestry!(self, dyn Health)
        }
    }

    impl Health for BasicHealth {
        fn hit_points(&self) -> i32 {
            self.hit_points
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct RegeneratingHealth {
        #[serde(skip)]
        pub base: ComponentBase,
        pub hit_points: i32,
        pub rate: f32,
    }

    impl RegeneratingHealth {
        pub fn new(hit_points: i32, rate: f32) -> Arc<Self> {
            Arc::new(Self {
                hit_points,
                rate,
                ..Default::default()
            })
        }
    }

    impl Component for RegeneratingHealth {
        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn ancestry(self: Arc<Self>) -> Ancestry {
            ancestry!(self, dyn Health)
        }
    }

    impl Health for RegeneratingHealth {
        fn hit_points(&self) -> i32 {
            self.hit_points
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct Label {
        #[serde(skip)]
        pub base: ComponentBase,
        pub text: String,
    }

    impl Label {
        pub fn new(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                ..Default::default()
            })
        }
    }

    impl Component for Label {
        fn base(&self) -> &ComponentBase {
            &self.base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_default_ancestry_is_concrete_type() {
        let label = Label::new("hi");
        let ancestry = label.clone().ancestry();

        assert_eq!(ancestry.len(), 1);
        assert!(ancestry.contains(TypeId::of::<Label>()));
        let back = ancestry.downcast::<Label>().unwrap();
        assert!(Arc::ptr_eq(&back, &label));
    }

    #[test]
    fn test_ancestry_macro_adds_trait_views() {
        let health = RegeneratingHealth::new(10, 0.5);
        let ancestry = health.clone().ancestry();

        assert_eq!(ancestry.len(), 2);
        assert!(ancestry.contains(TypeId::of::<RegeneratingHealth>()));
        let as_trait = ancestry.downcast::<dyn Health>().unwrap();
        assert_eq!(as_trait.hit_points(), 10);
        assert!(ancestry.downcast::<BasicHealth>().is_none());
    }

    #[test]
    fn test_ancestry_through_trait_object() {
        let component: Arc<dyn Component> = BasicHealth::new(3);
        let ancestry = component.ancestry();
        assert!(ancestry.contains(TypeId::of::<BasicHealth>()));
        assert!(ancestry.contains(TypeId::of::<dyn Health>()));
    }

    #[test]
    fn test_base_defaults() {
        let base = ComponentBase::new();
        assert!(base.is_serializable());
        assert!(!base.is_suspended());
        assert!(!base.is_bound());
        assert!(base.entity().is_none());
    }

    #[test]
    fn test_bind_entity_exactly_once() {
        let label = Label::new("x");
        let first = Entity::new("Test");
        let second = Entity::new("Test");

        assert!(label.base().bind_entity(&first));
        assert!(label.base().bind_entity(&first));
        assert!(!label.base().bind_entity(&second));
        assert_eq!(label.base().entity().unwrap(), first);
    }
}
