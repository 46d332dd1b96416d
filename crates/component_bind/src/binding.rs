//! Reactive subscriptions owned by an entity.
//!
//! A binding is anything that must be torn down when its owner goes away.
//! Entities keep theirs in a [`BindingLedger`] and delete them all, in order,
//! during entity deletion.

use parking_lot::Mutex;

use crate::command::Command;
use crate::property::Property;
use crate::signal::ListenerId;

/// A subscription that can be torn down.
///
/// `delete` must be idempotent.
pub trait Binding: Send + Sync {
    fn delete(&self);
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Runs a callback whenever a property changes.
pub struct NotifyBinding {
    unsubscribe: Mutex<Option<Unsubscribe>>,
}

impl NotifyBinding {
    pub fn new<T: Clone + Send + Sync + 'static>(
        callback: impl Fn() + Send + Sync + 'static,
        property: &Property<T>,
    ) -> Self {
        let id = property.subscribe(callback);
        let property = property.clone();
        Self {
            unsubscribe: Mutex::new(Some(Box::new(move || {
                property.unsubscribe(id);
            }))),
        }
    }
}

impl Binding for NotifyBinding {
    fn delete(&self) {
        let unsubscribe = self.unsubscribe.lock().take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }
}

/// Runs a callback whenever a command executes.
pub struct CommandBinding {
    command: Command,
    listener: Mutex<Option<ListenerId>>,
}

impl CommandBinding {
    pub fn new(command: &Command, callback: impl Fn() + Send + Sync + 'static) -> Self {
        let id = command.subscribe(callback);
        Self {
            command: command.clone(),
            listener: Mutex::new(Some(id)),
        }
    }
}

impl Binding for CommandBinding {
    fn delete(&self) {
        let listener = self.listener.lock().take();
        if let Some(id) = listener {
            self.command.unsubscribe(id);
        }
    }
}

/// Identifies a binding within one entity's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

/// Ordered list of bindings owned by an entity.
#[derive(Default)]
pub struct BindingLedger {
    entries: Vec<(BindingId, Box<dyn Binding>)>,
    next_id: u64,
}

impl BindingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a binding
    pub fn push(&mut self, binding: Box<dyn Binding>) -> BindingId {
        let id = BindingId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, binding));
        id
    }

    /// Remove a binding without deleting it; the caller deletes it once no
    /// lock is held.
    pub fn take(&mut self, id: BindingId) -> Option<Box<dyn Binding>> {
        let index = self.entries.iter().position(|(existing, _)| *existing == id)?;
        Some(self.entries.remove(index).1)
    }

    /// Remove every binding, in insertion order, without deleting them
    pub fn drain(&mut self) -> Vec<Box<dyn Binding>> {
        self.entries.drain(..).map(|(_, binding)| binding).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_binding_follows_property() {
        let prop = Property::new(0);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let binding = NotifyBinding::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            &prop,
        );

        prop.set(1);
        binding.delete();
        prop.set(2);
        binding.delete();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(prop.listener_count(), 0);
    }

    #[test]
    fn test_command_binding_follows_command() {
        let command = Command::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let binding = CommandBinding::new(&command, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        command.execute();
        binding.delete();
        command.execute();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(command.listener_count(), 0);
    }

    #[test]
    fn test_ledger_take_and_drain() {
        let command = Command::new();
        let mut ledger = BindingLedger::new();
        let first = ledger.push(Box::new(CommandBinding::new(&command, || {})));
        ledger.push(Box::new(CommandBinding::new(&command, || {})));
        assert_eq!(command.listener_count(), 2);

        let taken = ledger.take(first).unwrap();
        taken.delete();
        assert!(ledger.take(first).is_none());
        assert_eq!(command.listener_count(), 1);

        for binding in ledger.drain() {
            binding.delete();
        }
        assert!(ledger.is_empty());
        assert_eq!(command.listener_count(), 0);
    }
}
