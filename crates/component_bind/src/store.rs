//! Per-entity component storage with name and type indices.
//!
//! Components are keyed by a unique name. Independently, every type a
//! component declares in its [`Ancestry`] gets an entry in the type index
//! pointing at one "occupant" component, which is what type-based lookup
//! returns.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{Ancestry, Component, TypeView};
use crate::error::{BindError, BindResult};

struct Slot {
    component: Arc<dyn Component>,
    ancestry: Ancestry,
    // Insertion order
    seq: u64,
}

struct TypeEntry {
    owner: String,
    view: TypeView,
}

/// Name- and type-indexed set of components.
#[derive(Default)]
pub struct ComponentStore {
    by_name: HashMap<String, Slot>,
    by_type: HashMap<TypeId, TypeEntry>,
    next_seq: u64,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component. Every type in its ancestry now resolves to it,
    /// replacing any previous occupant.
    pub fn insert(&mut self, name: &str, component: Arc<dyn Component>) -> BindResult<()> {
        self.insert_with(name, component, true)
    }

    /// Add a component, indexing it only for types that have no occupant yet.
    pub fn insert_without_overwriting(
        &mut self,
        name: &str,
        component: Arc<dyn Component>,
    ) -> BindResult<()> {
        self.insert_with(name, component, false)
    }

    fn insert_with(
        &mut self,
        name: &str,
        component: Arc<dyn Component>,
        overwrite: bool,
    ) -> BindResult<()> {
        if self.by_name.contains_key(name) {
            return Err(BindError::DuplicateComponent(name.to_string()));
        }

        let ancestry = Arc::clone(&component).ancestry();
        for view in ancestry.iter() {
            if overwrite || !self.by_type.contains_key(&view.type_id()) {
                self.by_type.insert(
                    view.type_id(),
                    TypeEntry {
                        owner: name.to_string(),
                        view: view.clone(),
                    },
                );
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_name.insert(
            name.to_string(),
            Slot {
                component,
                ancestry,
                seq,
            },
        );
        Ok(())
    }

    /// The current occupant for type `T`
    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.view.downcast())
    }

    /// The component stored under `name`, as `T`
    pub fn get_named<T: ?Sized + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.by_name
            .get(name)
            .and_then(|slot| slot.ancestry.downcast())
    }

    /// The component stored under `name`
    pub fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.by_name.get(name).map(|slot| Arc::clone(&slot.component))
    }

    /// Name of the current occupant for type `T`
    pub fn occupant<T: ?Sized + 'static>(&self) -> Option<&str> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|entry| entry.owner.as_str())
    }

    /// Every component that has `T` in its ancestry, in insertion order
    pub fn all<T: ?Sized + 'static>(&self) -> Vec<Arc<T>> {
        self.ordered()
            .into_iter()
            .filter_map(|(_, slot)| slot.ancestry.downcast::<T>())
            .collect()
    }

    /// The declared ancestry of the component stored under `name`
    pub fn ancestry(&self, name: &str) -> Option<&Ancestry> {
        self.by_name.get(name).map(|slot| &slot.ancestry)
    }

    /// Find the name a component is stored under
    pub fn name_of(&self, component: &Arc<dyn Component>) -> Option<String> {
        self.by_name
            .iter()
            .find(|(_, slot)| same_component(&slot.component, component))
            .map(|(name, _)| name.clone())
    }

    /// Remove the component stored under `name`, re-deriving type entries it
    /// occupied.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Component>> {
        let slot = self.by_name.remove(name)?;
        self.rederive(name, &slot.ancestry);
        Some(slot.component)
    }

    /// Remove a component by reference. Returns false if it is not stored.
    pub fn remove_component(&mut self, component: &Arc<dyn Component>) -> bool {
        match self.name_of(component) {
            Some(name) => self.remove(&name).is_some(),
            None => false,
        }
    }

    // For each type the removed component occupied, hand the entry to the
    // most recently added remaining component with the same view, or drop it.
    fn rederive(&mut self, removed: &str, ancestry: &Ancestry) {
        for type_id in ancestry.type_ids() {
            let occupied = self
                .by_type
                .get(&type_id)
                .is_some_and(|entry| entry.owner == removed);
            if !occupied {
                continue;
            }

            let replacement = self
                .by_name
                .iter()
                .filter_map(|(name, slot)| {
                    slot.ancestry
                        .find(type_id)
                        .map(|view| (slot.seq, name, view))
                })
                .max_by_key(|(seq, _, _)| *seq)
                .map(|(_, name, view)| TypeEntry {
                    owner: name.clone(),
                    view: view.clone(),
                });

            match replacement {
                Some(entry) => {
                    self.by_type.insert(type_id, entry);
                }
                None => {
                    self.by_type.remove(&type_id);
                }
            }
        }
    }

    /// Empty the store, returning its contents in insertion order
    pub fn take_all(&mut self) -> Vec<(String, Arc<dyn Component>)> {
        let entries = self.snapshot();
        self.by_name.clear();
        self.by_type.clear();
        entries
    }

    /// Replace the whole collection, rebuilding both indices with the same
    /// overwrite rule as [`insert`](Self::insert).
    ///
    /// The new set is built aside; on error the current contents are kept.
    pub fn replace_all(
        &mut self,
        entries: impl IntoIterator<Item = (String, Arc<dyn Component>)>,
    ) -> BindResult<()> {
        let mut rebuilt = ComponentStore::new();
        for (name, component) in entries {
            rebuilt.insert(&name, component)?;
        }
        *self = rebuilt;
        Ok(())
    }

    /// Contents in insertion order
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn Component>)> {
        self.ordered()
            .into_iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(&slot.component)))
            .collect()
    }

    /// Type index as (type name, occupant name), sorted by type name
    pub fn type_index(&self) -> Vec<(&'static str, String)> {
        let mut index: Vec<_> = self
            .by_type
            .values()
            .map(|entry| (entry.view.type_name(), entry.owner.clone()))
            .collect();
        index.sort();
        index
    }

    /// Check the index invariants: every type entry points at a stored
    /// component that declares that type, and every declared type of every
    /// stored component has an occupant.
    pub fn is_consistent(&self) -> bool {
        let entries_valid = self.by_type.iter().all(|(type_id, entry)| {
            self.by_name
                .get(&entry.owner)
                .is_some_and(|slot| slot.ancestry.contains(*type_id))
        });
        let views_covered = self
            .by_name
            .values()
            .all(|slot| slot.ancestry.type_ids().all(|t| self.by_type.contains_key(&t)));
        entries_valid && views_covered
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Component names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.ordered()
            .into_iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn ordered(&self) -> Vec<(&String, &Slot)> {
        let mut slots: Vec<_> = self.by_name.iter().collect();
        slots.sort_by_key(|(_, slot)| slot.seq);
        slots
    }
}

fn same_component(a: &Arc<dyn Component>, b: &Arc<dyn Component>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
