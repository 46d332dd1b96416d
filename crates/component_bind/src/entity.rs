//! Entities: identity, components, properties, commands and teardown.
//!
//! An [`Entity`] is a cheap, clonable reference to shared entity state. All
//! mutable state sits behind one lock that is never held while calling out
//! to components, bindings, commands or the runtime, so any of those may
//! call back into the entity.
//!
//! ## Lifecycle
//!
//! ```text
//! Unregistered ──attach(runtime)──▶ Registered ──delete()──▶ Deleted
//!      │                                                       ▲
//!      └───────────────────────delete()────────────────────────┘
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::binding::{Binding, BindingId, BindingLedger, CommandBinding, NotifyBinding};
use crate::command::{Command, CommandEntry, Permissions};
use crate::component::Component;
use crate::error::{BindError, BindResult};
use crate::handle::Handle;
use crate::identity::Guid;
use crate::link::CommandLink;
use crate::property::{EditorData, Property, PropertyEntry};
use crate::runtime::Runtime;
use crate::store::ComponentStore;

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle State
// ─────────────────────────────────────────────────────────────────────────────

/// Where an entity is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed or deserialized; no runtime yet
    Unregistered,
    /// Attached to a runtime and present in its identity registry
    Registered,
    /// Torn down. Terminal.
    Deleted,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate root owning components, properties, commands and identity.
///
/// Clones refer to the same entity; equality is identity.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

/// Non-owning reference to an entity, used for back-references and in
/// callbacks the entity itself owns.
#[derive(Clone)]
pub struct WeakEntity {
    inner: Weak<EntityInner>,
}

struct EntityInner {
    guid: AtomicU64,
    type_name: String,
    id: Property<String>,
    active: AtomicBool,
    editor_can_delete: AtomicBool,
    serializable: AtomicBool,
    cannot_suspend: AtomicBool,
    cannot_suspend_by_distance: AtomicBool,
    added: AtomicBool,
    delete: Command,
    state: Mutex<EntityState>,
}

struct EntityState {
    lifecycle: LifecycleState,
    runtime: Option<Weak<dyn Runtime>>,
    editor: bool,
    // String identifier as last written to the registry
    indexed_id: String,
    components: ComponentStore,
    properties: HashMap<String, PropertyEntry>,
    commands: HashMap<String, CommandEntry>,
    bindings: BindingLedger,
    links: Vec<Arc<CommandLink>>,
    // Forwarding bindings installed for links whose source is bound
    link_bindings: Vec<(Arc<CommandLink>, BindingId)>,
    on_save: Option<Command>,
    editor_selected: Option<Property<bool>>,
}

impl EntityState {
    fn new() -> Self {
        Self {
            lifecycle: LifecycleState::Unregistered,
            runtime: None,
            editor: false,
            indexed_id: String::new(),
            components: ComponentStore::new(),
            properties: HashMap::new(),
            commands: HashMap::new(),
            bindings: BindingLedger::new(),
            links: Vec::new(),
            link_bindings: Vec::new(),
            on_save: None,
            editor_selected: None,
        }
    }

    fn runtime(&self) -> Option<Arc<dyn Runtime>> {
        self.runtime.as_ref().and_then(Weak::upgrade)
    }
}

impl Entity {
    /// Create an unregistered entity with the given type tag
    pub fn new(type_name: impl Into<String>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EntityInner>| {
            let weak = WeakEntity {
                inner: weak.clone(),
            };
            EntityInner {
                guid: AtomicU64::new(0),
                type_name: type_name.into(),
                id: Property::new(String::new()),
                active: AtomicBool::new(true),
                editor_can_delete: AtomicBool::new(true),
                serializable: AtomicBool::new(true),
                cannot_suspend: AtomicBool::new(false),
                cannot_suspend_by_distance: AtomicBool::new(false),
                added: AtomicBool::new(false),
                delete: Command::with_action(move || {
                    if let Some(entity) = weak.upgrade() {
                        entity.delete();
                    }
                }),
                state: Mutex::new(EntityState::new()),
            }
        });
        Self { inner }
    }

    /// Create an unregistered entity that keeps a pre-existing GUID
    pub fn with_guid(type_name: impl Into<String>, guid: Guid) -> Self {
        let entity = Self::new(type_name);
        entity.set_guid(guid);
        entity
    }

    // ── Identity ────────────────────────────────────────────────────────────

    pub fn guid(&self) -> Guid {
        Guid(self.inner.guid.load(Ordering::SeqCst))
    }

    pub(crate) fn set_guid(&self, guid: Guid) {
        self.inner.guid.store(guid.0, Ordering::SeqCst);
    }

    /// The string identifier, empty if unset
    pub fn id(&self) -> String {
        self.inner.id.get()
    }

    /// Set the string identifier.
    ///
    /// In editor mode the registry follows the change; otherwise the name
    /// registered at attach time stays indexed until deletion.
    pub fn set_id(&self, id: impl Into<String>) {
        self.inner.id.set(id.into());
    }

    /// The observable string identifier
    pub fn id_property(&self) -> Property<String> {
        self.inner.id.clone()
    }

    /// Informational type tag
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    /// A weak, serializable reference to this entity
    pub fn handle(&self) -> Handle {
        Handle::from(self)
    }

    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Take a fresh GUID from the runtime's registry
    pub fn renew_guid(&self) -> BindResult<Guid> {
        let runtime = self.require_runtime()?;
        runtime.registry().renew_guid(self)
    }

    // ── Flags ───────────────────────────────────────────────────────────────

    /// False once deleted
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.state.lock().lifecycle
    }

    pub fn editor_can_delete(&self) -> bool {
        self.inner.editor_can_delete.load(Ordering::Relaxed)
    }

    pub fn set_editor_can_delete(&self, value: bool) {
        self.inner.editor_can_delete.store(value, Ordering::Relaxed);
    }

    pub fn is_serializable(&self) -> bool {
        self.inner.serializable.load(Ordering::Relaxed)
    }

    pub fn set_serializable(&self, value: bool) {
        self.inner.serializable.store(value, Ordering::Relaxed);
    }

    pub fn cannot_suspend(&self) -> bool {
        self.inner.cannot_suspend.load(Ordering::Relaxed)
    }

    pub fn set_cannot_suspend(&self, value: bool) {
        self.inner.cannot_suspend.store(value, Ordering::Relaxed);
    }

    /// Opt out of distance-based suspension only
    pub fn cannot_suspend_by_distance(&self) -> bool {
        self.inner.cannot_suspend_by_distance.load(Ordering::Relaxed)
    }

    pub fn set_cannot_suspend_by_distance(&self, value: bool) {
        self.inner
            .cannot_suspend_by_distance
            .store(value, Ordering::Relaxed);
    }

    /// True once the entity has been attached to a runtime. Stays set after
    /// deletion.
    pub fn is_added(&self) -> bool {
        self.inner.added.load(Ordering::SeqCst)
    }

    /// The owning runtime, while attached and alive
    pub fn runtime(&self) -> Option<Arc<dyn Runtime>> {
        self.inner.state.lock().runtime()
    }

    /// Whether the owning runtime was in editor mode at attach time
    pub fn is_editor(&self) -> bool {
        self.inner.state.lock().editor
    }

    fn require_runtime(&self) -> BindResult<Arc<dyn Runtime>> {
        self.runtime()
            .ok_or_else(|| BindError::NotAttached(self.to_string()))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Register with a runtime.
    ///
    /// Assigns or validates the GUID, indexes the string identifier, sets up
    /// editor-only state when the runtime is in editor mode, then hands every
    /// held component to the runtime in insertion order.
    pub fn attach(&self, runtime: Arc<dyn Runtime>) -> BindResult<()> {
        match self.lifecycle() {
            LifecycleState::Unregistered => {}
            LifecycleState::Registered => return Err(BindError::AlreadyAttached(self.to_string())),
            LifecycleState::Deleted => return Err(BindError::Deleted(self.to_string())),
        }

        runtime.registry().register(self)?;
        self.inner.added.store(true, Ordering::SeqCst);
        let editor = runtime.editor_enabled();

        {
            let mut state = self.inner.state.lock();
            state.lifecycle = LifecycleState::Registered;
            state.runtime = Some(Arc::downgrade(&runtime));
            state.editor = editor;
            state.indexed_id = self.id();
            if editor {
                state.on_save = Some(Command::new());
                state.editor_selected = Some(Property::new(false));
            }
        }

        if editor {
            self.add_binding(self.rename_binding(&runtime));
        }

        let components = self.inner.state.lock().components.snapshot();
        for (_, component) in components {
            component.base().bind_entity(self);
            runtime.add_component(self, component);
        }

        debug!(entity = %self, editor, "Attached entity");
        Ok(())
    }

    // Keeps the registry's string-identifier entry in step with the `id`
    // property while editing.
    fn rename_binding(&self, runtime: &Arc<dyn Runtime>) -> NotifyBinding {
        let weak = self.downgrade();
        let runtime = Arc::downgrade(runtime);
        NotifyBinding::new(
            move || {
                let (Some(entity), Some(runtime)) = (weak.upgrade(), runtime.upgrade()) else {
                    return;
                };
                let new_id = entity.id();
                let old_id = entity.inner.state.lock().indexed_id.clone();
                if old_id == new_id {
                    return;
                }
                // Only a name the registry accepted counts as indexed
                let indexed = match runtime.registry().rename(&entity, &old_id, &new_id) {
                    Ok(()) => new_id,
                    Err(e) => {
                        warn!(entity = %entity, "Identifier not indexed: {}", e);
                        String::new()
                    }
                };
                entity.inner.state.lock().indexed_id = indexed;
            },
            &self.inner.id,
        )
    }

    /// Set every component's suspended flag, writing only where it differs.
    pub fn set_suspended(&self, suspended: bool) {
        let components = self.inner.state.lock().components.snapshot();
        for (_, component) in components {
            let flag = &component.base().suspended;
            if flag.get() != suspended {
                flag.set(suspended);
            }
        }
    }

    /// Tear the entity down. Idempotent.
    ///
    /// Order: components (emptied before their hooks run), owned bindings,
    /// property and command registries, runtime notification, registry
    /// release.
    pub fn delete(&self) {
        if self
            .inner
            .active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let (components, runtime) = {
            let mut state = self.inner.state.lock();
            state.lifecycle = LifecycleState::Deleted;
            (state.components.take_all(), state.runtime())
        };
        for (_, component) in &components {
            component.delete();
        }

        let bindings = {
            let mut state = self.inner.state.lock();
            state.link_bindings.clear();
            state.bindings.drain()
        };
        for binding in &bindings {
            binding.delete();
        }

        let (indexed_id, links) = {
            let mut state = self.inner.state.lock();
            state.commands.clear();
            state.properties.clear();
            state.on_save = None;
            state.editor_selected = None;
            state.runtime = None;
            (std::mem::take(&mut state.indexed_id), state.links.clone())
        };
        for link in &links {
            link.reset();
        }

        if let Some(runtime) = runtime {
            runtime.remove(self);
            let registry = runtime.registry();
            registry.unregister(self);
            registry.release_id(&indexed_id, self);
        }

        debug!(entity = %self, components = components.len(), "Deleted entity");
    }

    /// A command whose action deletes this entity
    pub fn delete_command(&self) -> Command {
        self.inner.delete.clone()
    }

    // ── Components ──────────────────────────────────────────────────────────

    /// Add a component under a unique name. It becomes the type-lookup result
    /// for every type in its ancestry.
    pub fn add(&self, name: &str, component: Arc<dyn Component>) -> BindResult<()> {
        self.add_with(name, component, true)
    }

    /// Add a component, indexing it only for types with no current occupant
    pub fn add_without_overwriting(&self, name: &str, component: Arc<dyn Component>) -> BindResult<()> {
        self.add_with(name, component, false)
    }

    /// Add a non-serialized component under a generated name
    pub fn add_anonymous(&self, component: Arc<dyn Component>) -> BindResult<String> {
        component.base().set_serializable(false);
        let name = Uuid::new_v4().to_string();
        self.add(&name, component)?;
        Ok(name)
    }

    /// [`add_anonymous`](Self::add_anonymous) with non-overwriting indexing
    pub fn add_anonymous_without_overwriting(&self, component: Arc<dyn Component>) -> BindResult<String> {
        component.base().set_serializable(false);
        let name = Uuid::new_v4().to_string();
        self.add_without_overwriting(&name, component)?;
        Ok(name)
    }

    fn add_with(&self, name: &str, component: Arc<dyn Component>, overwrite: bool) -> BindResult<()> {
        let runtime = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == LifecycleState::Deleted {
                return Err(BindError::Deleted(self.to_string()));
            }
            if overwrite {
                state.components.insert(name, Arc::clone(&component))?;
            } else {
                state
                    .components
                    .insert_without_overwriting(name, Arc::clone(&component))?;
            }
            state.runtime()
        };

        if let Some(runtime) = runtime {
            component.base().bind_entity(self);
            runtime.add_component(self, component);
        }
        Ok(())
    }

    /// The component currently indexed for type `T` (concrete or `dyn Trait`)
    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.inner.state.lock().components.get::<T>()
    }

    /// The component stored under `name`, if it can be viewed as `T`
    pub fn get_named<T: ?Sized + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.inner.state.lock().components.get_named::<T>(name)
    }

    /// The component stored under `name`
    pub fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.inner.state.lock().components.component(name)
    }

    /// Every component viewable as `T`, in insertion order.
    ///
    /// Iterates a snapshot, so the entity may be changed while iterating.
    pub fn get_all<T: ?Sized + 'static>(&self) -> impl Iterator<Item = Arc<T>> + use<T> {
        self.inner.state.lock().components.all::<T>().into_iter()
    }

    /// The component indexed for `T`, creating and adding an anonymous one
    /// if there is none
    pub fn get_or_create<T: Component + Default>(&self) -> BindResult<Arc<T>> {
        if let Some(existing) = self.get::<T>() {
            return Ok(existing);
        }
        let component = Arc::new(T::default());
        self.add_anonymous(component.clone())?;
        Ok(component)
    }

    /// The component named `name`, creating and adding one if absent
    pub fn get_or_create_named<T: Component + Default>(&self, name: &str) -> BindResult<Arc<T>> {
        self.get_or_create_named_flagged(name).map(|(component, _)| component)
    }

    /// Like [`get_or_create_named`](Self::get_or_create_named), also reporting
    /// whether the component was created
    pub fn get_or_create_named_flagged<T: Component + Default>(&self, name: &str) -> BindResult<(Arc<T>, bool)> {
        if let Some(existing) = self.get_named::<T>(name) {
            return Ok((existing, false));
        }
        let component = Arc::new(T::default());
        self.add(name, component.clone())?;
        Ok((component, true))
    }

    /// The component named `name`, creating one with non-overwriting
    /// indexing if absent
    pub fn get_or_create_without_overwriting<T: Component + Default>(&self, name: &str) -> BindResult<Arc<T>> {
        if let Some(existing) = self.get_named::<T>(name) {
            return Ok(existing);
        }
        let component = Arc::new(T::default());
        self.add_without_overwriting(name, component.clone())?;
        Ok(component)
    }

    /// Create and add a default component, anonymously if no name is given
    pub fn create<T: Component + Default>(&self, name: Option<&str>) -> BindResult<Arc<T>> {
        let component = Arc::new(T::default());
        match name {
            Some(name) => self.add(name, component.clone())?,
            None => {
                self.add_anonymous(component.clone())?;
            }
        }
        Ok(component)
    }

    /// Remove the component stored under `name`. Absent names are a no-op.
    pub fn remove_named(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.inner.state.lock().components.remove(name)
    }

    /// Remove a component by reference. Returns false if it is not held.
    pub fn remove(&self, component: &Arc<dyn Component>) -> bool {
        self.inner.state.lock().components.remove_component(component)
    }

    /// Replace the whole component collection, rebuilding both indices.
    ///
    /// Components are handed to the runtime if the entity is attached.
    pub fn replace_components(&self, entries: Vec<(String, Arc<dyn Component>)>) -> BindResult<()> {
        let runtime = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == LifecycleState::Deleted {
                return Err(BindError::Deleted(self.to_string()));
            }
            state.components.replace_all(entries.iter().cloned())?;
            state.runtime()
        };

        if let Some(runtime) = runtime {
            for (_, component) in entries {
                component.base().bind_entity(self);
                runtime.add_component(self, component);
            }
        }
        Ok(())
    }

    /// `(name, component)` pairs in insertion order
    pub fn components(&self) -> Vec<(String, Arc<dyn Component>)> {
        self.inner.state.lock().components.snapshot()
    }

    pub fn component_count(&self) -> usize {
        self.inner.state.lock().components.len()
    }

    /// Whether any component is indexed for type `T`
    pub fn has<T: ?Sized + 'static>(&self) -> bool {
        self.inner
            .state
            .lock()
            .components
            .occupant::<T>()
            .is_some()
    }

    /// Type index as (type name, occupant name), sorted by type name
    pub fn type_index(&self) -> Vec<(&'static str, String)> {
        self.inner.state.lock().components.type_index()
    }

    /// Type names a stored component is indexed under
    pub fn component_types(&self, name: &str) -> Option<Vec<&'static str>> {
        self.inner
            .state
            .lock()
            .components
            .ancestry(name)
            .map(|ancestry| ancestry.type_names())
    }

    /// Whether a stored component declares `type_id`
    pub fn component_declares(&self, name: &str, type_id: TypeId) -> bool {
        self.inner
            .state
            .lock()
            .components
            .ancestry(name)
            .is_some_and(|ancestry| ancestry.contains(type_id))
    }

    /// Check the component index invariants
    pub fn is_consistent(&self) -> bool {
        self.inner.state.lock().components.is_consistent()
    }

    // ── Properties ──────────────────────────────────────────────────────────

    /// Expose a property by name. Requires an attached entity; description
    /// and read-only metadata are kept only in editor mode.
    pub fn add_property<T: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
        property: Property<T>,
        description: Option<&str>,
        read_only: bool,
    ) -> BindResult<()> {
        let data = EditorData {
            description: description.map(str::to_string),
            read_only,
        };
        self.add_property_with(name, property, data)
    }

    /// Expose a property with prepared editor metadata
    pub fn add_property_with<T: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
        property: Property<T>,
        editor_data: EditorData,
    ) -> BindResult<()> {
        let mut state = self.inner.state.lock();
        if state.runtime().is_none() {
            return Err(BindError::NotAttached(self.to_string()));
        }
        if state.properties.contains_key(name) {
            return Err(BindError::DuplicateProperty(name.to_string()));
        }
        let editor = state.editor.then_some(editor_data);
        state
            .properties
            .insert(name.to_string(), PropertyEntry::new(property, editor));
        Ok(())
    }

    /// Remove a property. Absent names are a no-op.
    pub fn remove_property(&self, name: &str) {
        self.inner.state.lock().properties.remove(name);
    }

    /// Typed property lookup; `None` if absent or of another value type
    pub fn get_property<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<Property<T>> {
        let entry = self.property(name)?;
        let typed = entry.downcast::<T>();
        if typed.is_none() {
            debug!(
                entity = %self,
                property = name,
                stored = entry.value_type(),
                requested = std::any::type_name::<T>(),
                "Property type mismatch"
            );
        }
        typed
    }

    /// Type-erased property lookup
    pub fn property(&self, name: &str) -> Option<PropertyEntry> {
        self.inner.state.lock().properties.get(name).cloned()
    }

    /// Registered properties, sorted by name
    pub fn properties(&self) -> Vec<(String, PropertyEntry)> {
        let mut entries: Vec<_> = self
            .inner
            .state
            .lock()
            .properties
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Expose a command by name. Requires an attached entity.
    ///
    /// Every persisted link whose source is `name` and is still unbound gets
    /// bound to this command, so executing it also fires the link.
    pub fn add_command(
        &self,
        name: &str,
        command: Command,
        permissions: Permissions,
        description: Option<&str>,
    ) -> BindResult<()> {
        let pending = {
            let mut state = self.inner.state.lock();
            if state.runtime().is_none() {
                return Err(BindError::NotAttached(self.to_string()));
            }
            if state.commands.contains_key(name) {
                return Err(BindError::DuplicateCommand(name.to_string()));
            }
            let description = description.filter(|_| state.editor).map(str::to_string);
            state.commands.insert(
                name.to_string(),
                CommandEntry {
                    key: name.to_string(),
                    command: command.clone(),
                    permissions,
                    description,
                },
            );
            state
                .links
                .iter()
                .filter(|link| link.source_command == name && link.resolve_source(&command))
                .cloned()
                .collect::<Vec<_>>()
        };

        for link in pending {
            self.install_forwarding(&command, link);
        }
        Ok(())
    }

    fn install_forwarding(&self, command: &Command, link: Arc<CommandLink>) {
        let weak = self.downgrade();
        let target = Arc::clone(&link);
        let binding = CommandBinding::new(command, move || {
            if let Some(entity) = weak.upgrade() {
                entity.linked_command_call(&target);
            }
        });
        let id = self.add_binding(binding);
        self.inner.state.lock().link_bindings.push((link, id));
    }

    /// Remove a command and every link that uses it as source. Absent names
    /// are a no-op.
    pub fn remove_command(&self, name: &str) {
        let bindings = {
            let mut state = self.inner.state.lock();
            state.commands.remove(name);
            state.links.retain(|link| link.source_command != name);
            take_link_bindings(&mut state, |link| link.source_command == name)
        };
        for binding in bindings {
            binding.delete();
        }
    }

    /// The command registered under `name`
    pub fn command(&self, name: &str) -> Option<Command> {
        self.inner
            .state
            .lock()
            .commands
            .get(name)
            .map(|entry| entry.command.clone())
    }

    /// The full registry entry for `name`
    pub fn command_entry(&self, name: &str) -> Option<CommandEntry> {
        self.inner.state.lock().commands.get(name).cloned()
    }

    /// Registered commands, sorted by name
    pub fn commands(&self) -> Vec<CommandEntry> {
        let mut entries: Vec<_> = self.inner.state.lock().commands.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    // ── Links ───────────────────────────────────────────────────────────────

    /// Persist a command link. If its source command is already registered,
    /// it is bound immediately.
    pub fn add_link(&self, link: CommandLink) -> Arc<CommandLink> {
        let link = Arc::new(link);
        let source = {
            let mut state = self.inner.state.lock();
            state.links.push(Arc::clone(&link));
            state
                .commands
                .get(&link.source_command)
                .map(|entry| entry.command.clone())
        };
        if let Some(command) = source {
            if link.resolve_source(&command) {
                self.install_forwarding(&command, Arc::clone(&link));
            }
        }
        link
    }

    /// Remove a persisted link and its forwarding binding
    pub fn remove_link(&self, link: &Arc<CommandLink>) -> bool {
        let (removed, bindings) = {
            let mut state = self.inner.state.lock();
            let before = state.links.len();
            state.links.retain(|l| !Arc::ptr_eq(l, link));
            let removed = state.links.len() != before;
            (removed, take_link_bindings(&mut state, |l| std::ptr::eq(l, Arc::as_ptr(link))))
        };
        for binding in bindings {
            binding.delete();
        }
        removed
    }

    /// Persisted links, in insertion order
    pub fn links(&self) -> Vec<Arc<CommandLink>> {
        self.inner.state.lock().links.clone()
    }

    /// Fire a link's target command. A target that cannot be resolved makes
    /// this a no-op; returns whether a command ran.
    pub fn linked_command_call(&self, link: &CommandLink) -> bool {
        match self.runtime() {
            Some(runtime) => link.invoke(runtime.registry()),
            None => false,
        }
    }

    // ── Bindings ────────────────────────────────────────────────────────────

    /// Take ownership of a binding; it is deleted with the entity
    pub fn add_binding(&self, binding: impl Binding + 'static) -> BindingId {
        self.inner.state.lock().bindings.push(Box::new(binding))
    }

    /// Delete and drop one owned binding
    pub fn remove_binding(&self, id: BindingId) -> bool {
        let binding = self.inner.state.lock().bindings.take(id);
        match binding {
            Some(binding) => {
                binding.delete();
                true
            }
            None => false,
        }
    }

    pub fn binding_count(&self) -> usize {
        self.inner.state.lock().bindings.len()
    }

    // ── Editor ──────────────────────────────────────────────────────────────

    /// Whole-entity save notification (editor mode only)
    pub fn on_save(&self) -> Option<Command> {
        self.inner.state.lock().on_save.clone()
    }

    /// Editor selection flag (editor mode only)
    pub fn editor_selected(&self) -> Option<Property<bool>> {
        self.inner.state.lock().editor_selected.clone()
    }
}

fn take_link_bindings(
    state: &mut EntityState,
    matches: impl Fn(&CommandLink) -> bool,
) -> Vec<Box<dyn Binding>> {
    let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.link_bindings)
        .into_iter()
        .partition(|(link, _)| matches(link.as_ref()));
    state.link_bindings = kept;
    removed
        .into_iter()
        .filter_map(|(_, id)| state.bindings.take(id))
        .collect()
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id();
        if id.is_empty() {
            write!(f, "{} [{}]", self.guid(), self.inner.type_name)
        } else {
            write!(f, "{} [{}]", id, self.inner.type_name)
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("guid", &self.guid())
            .field("id", &self.id())
            .field("type", &self.inner.type_name)
            .field("active", &self.is_active())
            .finish()
    }
}

impl WeakEntity {
    pub fn upgrade(&self) -> Option<Entity> {
        self.inner.upgrade().map(|inner| Entity { inner })
    }

    /// Whether this refers to `entity`
    pub fn points_to(&self, entity: &Entity) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&entity.inner))
    }
}

impl fmt::Debug for WeakEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(entity) => write!(f, "WeakEntity({})", entity),
            None => f.write_str("WeakEntity(dropped)"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
