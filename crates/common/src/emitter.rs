//! Named-event publish/subscribe
//!
//! A small emitter keyed by event name, each name holding an ordered list of
//! listeners. Dispatch works on a snapshot of the list taken before any
//! listener runs, and no lock is held while listeners execute, so a listener
//! may subscribe or unsubscribe from inside its own callback.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Shared listener callback
pub type Listener<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Token returned when a listener is registered, used to remove it later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Event emitter delivering payloads of type `P`
pub struct EventEmitter<P: ?Sized> {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener<P>)>>>,
}

impl<P: ?Sized> EventEmitter<P> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Register a listener for `event`, appended after existing ones
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: Listener<P> = Arc::new(listener);
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one listener. Returns false if it was not registered for `event`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };

        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;

        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Deliver `payload` to every listener of `event` in registration order
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, payload: &P) -> usize {
        let snapshot: Vec<Listener<P>> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(event) {
                Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return 0,
            }
        };

        for listener in &snapshot {
            listener(payload);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Drop every listener of every event
    pub fn remove_all_listeners(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<P: ?Sized> Default for EventEmitter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized> fmt::Debug for EventEmitter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(event, list)| (event.as_str(), list.len()))
            .collect();
        f.debug_struct("EventEmitter")
            .field("listeners", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_in_registration_order() {
        let emitter: EventEmitter<str> = EventEmitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            emitter.on("data", move |payload: &str| {
                order.lock().unwrap().push(format!("{}:{}", tag, payload));
            });
        }

        assert_eq!(emitter.emit("data", "x"), 3);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["first:x", "second:x", "third:x"]
        );
    }

    #[test]
    fn test_emit_unknown_event() {
        let emitter: EventEmitter<str> = EventEmitter::new();
        emitter.on("data", |_: &str| panic!("wrong event"));
        assert_eq!(emitter.emit("other", "x"), 0);
    }

    #[test]
    fn test_off_removes_only_that_listener() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let hits = Arc::new(AtomicU64::new(0));

        let h = Arc::clone(&hits);
        let a = emitter.on("data", move |v: &u32| {
            h.fetch_add(*v as u64, Ordering::SeqCst);
        });
        let h = Arc::clone(&hits);
        let _b = emitter.on("data", move |v: &u32| {
            h.fetch_add(*v as u64 * 100, Ordering::SeqCst);
        });

        assert!(emitter.off("data", a));
        assert!(!emitter.off("data", a));
        assert!(!emitter.off("other", a));

        emitter.emit("data", &1);
        assert_eq!(hits.load(Ordering::SeqCst), 100);
        assert_eq!(emitter.listener_count("data"), 1);
    }

    #[test]
    fn test_remove_all_listeners() {
        let emitter: EventEmitter<str> = EventEmitter::new();
        emitter.on("a", |_: &str| {});
        emitter.on("b", |_: &str| {});

        emitter.remove_all_listeners();

        assert_eq!(emitter.listener_count("a"), 0);
        assert_eq!(emitter.listener_count("b"), 0);
        assert_eq!(emitter.emit("a", "x"), 0);
    }

    #[test]
    fn test_listener_added_during_dispatch_misses_current_frame() {
        let emitter: Arc<EventEmitter<str>> = Arc::new(EventEmitter::new());
        let late_hits = Arc::new(AtomicU64::new(0));

        let inner = Arc::clone(&emitter);
        let hits = Arc::clone(&late_hits);
        emitter.on("data", move |_: &str| {
            let hits = Arc::clone(&hits);
            inner.on("data", move |_: &str| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(emitter.emit("data", "x"), 1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count("data"), 2);
    }

    #[test]
    fn test_listener_removed_during_dispatch_still_runs_this_time() {
        let emitter: Arc<EventEmitter<str>> = Arc::new(EventEmitter::new());
        let second_hits = Arc::new(AtomicU64::new(0));
        let second_id = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&emitter);
        let target = Arc::clone(&second_id);
        emitter.on("data", move |_: &str| {
            if let Some(id) = *target.lock().unwrap() {
                inner.off("data", id);
            }
        });
        let hits = Arc::clone(&second_hits);
        let id = emitter.on("data", move |_: &str| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        *second_id.lock().unwrap() = Some(id);

        emitter.emit("data", "x");
        emitter.emit("data", "y");

        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }
}
