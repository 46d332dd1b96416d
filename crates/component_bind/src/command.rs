//! Invokable actions and the per-entity command registry entries.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::signal::{Action, ListenerId, Listeners};

// ─────────────────────────────────────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────────────────────────────────────

/// Shared invokable action.
///
/// Executing a command runs its action (if any) and then every listener, in
/// subscription order. Clones share the same action and listeners.
#[derive(Clone, Default)]
pub struct Command {
    inner: Arc<CommandInner>,
}

#[derive(Default)]
struct CommandInner {
    action: RwLock<Option<Action>>,
    listeners: Listeners,
}

impl Command {
    /// Create a command with no action
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a command that runs `action` when executed
    pub fn with_action(action: impl Fn() + Send + Sync + 'static) -> Self {
        let command = Self::new();
        command.set_action(action);
        command
    }

    /// Replace the command's action
    pub fn set_action(&self, action: impl Fn() + Send + Sync + 'static) {
        *self.inner.action.write() = Some(Arc::new(action));
    }

    /// Remove the command's action; listeners still fire on execute
    pub fn clear_action(&self) {
        *self.inner.action.write() = None;
    }

    /// Run the action, then every listener.
    ///
    /// No lock is held while callbacks run.
    pub fn execute(&self) {
        let action = self.inner.action.read().clone();
        if let Some(action) = action {
            action();
        }
        self.inner.listeners.notify();
    }

    /// Register a listener that runs after the action on every execute
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Check if two commands are the same underlying command
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("has_action", &self.inner.action.read().is_some())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command Registry Entry
// ─────────────────────────────────────────────────────────────────────────────

/// What an editor may do with a registered command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permissions {
    /// May be the source or target of a command link
    #[default]
    Linkable,
    /// May be executed directly from an editor
    Executable,
    LinkableAndExecutable,
}

impl Permissions {
    pub fn is_linkable(&self) -> bool {
        matches!(self, Permissions::Linkable | Permissions::LinkableAndExecutable)
    }

    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            Permissions::Executable | Permissions::LinkableAndExecutable
        )
    }
}

/// A command registered on an entity under a name.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub key: String,
    pub command: Command,
    pub permissions: Permissions,
    /// Only retained when the runtime runs in editor mode
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_execute_runs_action_then_listeners() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (a, l) = (order.clone(), order.clone());
        let command = Command::with_action(move || a.lock().push("action"));
        command.subscribe(move || l.lock().push("listener"));

        command.execute();

        assert_eq!(*order.lock(), vec!["action", "listener"]);
    }

    #[test]
    fn test_execute_without_action() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let command = Command::new();
        command.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        command.execute();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_execute() {
        let command = Command::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<parking_lot::Mutex<Option<ListenerId>>> = Arc::default();

        let (cmd, counter, id_slot) = (command.clone(), hits.clone(), slot.clone());
        let id = command.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *id_slot.lock() {
                cmd.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        command.execute();
        command.execute();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_permissions() {
        assert!(Permissions::default().is_linkable());
        assert!(!Permissions::Linkable.is_executable());
        assert!(Permissions::LinkableAndExecutable.is_executable());
        assert!(!Permissions::Executable.is_linkable());
    }
}
