//! Listener lists shared by properties and commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Callback type stored by properties and commands.
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// Identifies one subscription on a property or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered list of change listeners.
///
/// Notification snapshots the list first, so a listener may subscribe or
/// unsubscribe (itself or others) while being called.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: Mutex<Vec<(ListenerId, Action)>>,
    next_id: AtomicU64,
}

impl Listeners {
    pub(crate) fn subscribe(&self, action: Action) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, action));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub(crate) fn notify(&self) {
        let snapshot: Vec<Action> = self
            .entries
            .lock()
            .iter()
            .map(|(_, action)| Arc::clone(action))
            .collect();
        for action in snapshot {
            action();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
