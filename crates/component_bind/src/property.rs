//! Observable values and the per-entity property registry entries.
//!
//! `Property<T>` is the minimal observable container the core needs: a shared
//! value with change notification. Entities expose properties by name through
//! [`PropertyEntry`] so editors, serializers and links can reach them without
//! knowing the owning component's type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::signal::{ListenerId, Listeners};

// ─────────────────────────────────────────────────────────────────────────────
// Property
// ─────────────────────────────────────────────────────────────────────────────

/// Shared observable value.
///
/// Clones share the same underlying value and listener list.
pub struct Property<T> {
    inner: Arc<PropertyInner<T>>,
}

struct PropertyInner<T> {
    value: RwLock<T>,
    listeners: Listeners,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    /// Create a property holding `value`
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                value: RwLock::new(value),
                listeners: Listeners::default(),
            }),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Store a new value and notify every listener.
    ///
    /// Listeners run after the write lock is released, so they may read or
    /// write this property again.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.inner.listeners.notify();
    }

    /// Notify listeners without changing the value
    pub fn changed(&self) {
        self.inner.listeners.notify();
    }

    /// Register a change listener
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    /// Remove a change listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Check if two properties share the same value cell
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Property<T> {
    /// Store `value` only if it differs from the current one.
    ///
    /// Returns true if a write (and notification) happened.
    pub fn set_if_changed(&self, value: T) -> bool {
        if self.with(|current| *current == value) {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property")
            .field(&*self.inner.value.read())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Type-erased access
// ─────────────────────────────────────────────────────────────────────────────

/// Object-safe view of a `Property<T>` for name-keyed registries.
pub trait AnyProperty: Send + Sync {
    /// Downcast hook; the concrete type is `Property<T>`
    fn as_any(&self) -> &dyn Any;

    /// Name of the value type `T`
    fn value_type(&self) -> &'static str;
}

impl<T: Clone + Send + Sync + 'static> AnyProperty for Property<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Editor-facing metadata attached to a registered property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorData {
    pub description: Option<String>,
    pub read_only: bool,
}

/// A property registered on an entity under a name.
#[derive(Clone)]
pub struct PropertyEntry {
    property: Arc<dyn AnyProperty>,
    editor: Option<EditorData>,
}

impl PropertyEntry {
    pub fn new<T: Clone + Send + Sync + 'static>(
        property: Property<T>,
        editor: Option<EditorData>,
    ) -> Self {
        Self {
            property: Arc::new(property),
            editor,
        }
    }

    /// The type-erased property
    pub fn property(&self) -> &Arc<dyn AnyProperty> {
        &self.property
    }

    /// Editor metadata; only present when the runtime runs in editor mode
    pub fn editor(&self) -> Option<&EditorData> {
        self.editor.as_ref()
    }

    /// Recover the typed property, or `None` if `T` is not its value type
    pub fn downcast<T: Clone + Send + Sync + 'static>(&self) -> Option<Property<T>> {
        self.property.as_any().downcast_ref::<Property<T>>().cloned()
    }

    /// Name of the stored value type
    pub fn value_type(&self) -> &'static str {
        self.property.value_type()
    }
}

impl fmt::Debug for PropertyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEntry")
            .field("value_type", &self.value_type())
            .field("editor", &self.editor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_notifies_listeners() {
        let prop = Property::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        prop.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        prop.set(2);
        prop.set(2);

        assert_eq!(prop.get(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_set_if_changed_suppresses_redundant_writes() {
        let prop = Property::new(false);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        prop.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!prop.set_if_changed(false));
        assert!(prop.set_if_changed(true));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_can_read_during_notify() {
        let prop = Property::new(String::from("a"));
        let seen = Arc::new(RwLock::new(String::new()));
        let (p, s) = (prop.clone(), seen.clone());
        prop.subscribe(move || {
            *s.write() = p.get();
        });

        prop.set("b".to_string());
        assert_eq!(*seen.read(), "b");
    }

    #[test]
    fn test_unsubscribe() {
        let prop = Property::new(0u32);
        let id = prop.subscribe(|| {});
        assert_eq!(prop.listener_count(), 1);
        assert!(prop.unsubscribe(id));
        assert!(!prop.unsubscribe(id));
        assert_eq!(prop.listener_count(), 0);
    }

    #[test]
    fn test_entry_downcast() {
        let prop = Property::new(3.5f32);
        let entry = PropertyEntry::new(prop.clone(), None);

        let typed = entry.downcast::<f32>().unwrap();
        assert!(typed.ptr_eq(&prop));
        assert!(entry.downcast::<i32>().is_none());
        assert_eq!(entry.value_type(), "f32");
    }
}
