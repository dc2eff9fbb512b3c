//! The page-side event-handler table.
//!
//! Each event type maps to an ordered list of callbacks; insertion order
//! is dispatch order. Rust closures carry no comparable identity, so
//! removal is keyed by the [`HandlerId`] returned at registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
pub struct EventHandlerTable {
    next_id: AtomicU64,
    map: RwLock<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
}

impl EventHandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event_type: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.map
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event_type.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove one handler by identity. Returns whether it was present.
    pub fn remove(&self, event_type: &str, id: HandlerId) -> bool {
        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());
        let Some(handlers) = map.get_mut(event_type) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            map.remove(event_type);
        }
        removed
    }

    /// Drop every handler. Returns the event types that were registered,
    /// so the caller can release the matching host subscriptions.
    pub fn clear(&self) -> Vec<String> {
        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());
        let types = map.keys().cloned().collect();
        map.clear();
        types
    }

    pub fn has(&self, event_type: &str) -> bool {
        self.map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(event_type)
    }

    /// Dispatch synchronously to every handler for `event_type`, in
    /// registration order. Returns how many handlers ran.
    pub fn dispatch(&self, event_type: &str, payload: &Value) -> usize {
        let handlers: Vec<EventHandler> = {
            let map = self.map.read().unwrap_or_else(|e| e.into_inner());
            match map.get(event_type) {
                Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return 0,
            }
        };
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recording_handler(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> EventHandler {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        Arc::new(move |payload: &Value| {
            log.lock().unwrap().push(format!("{tag}:{payload}"));
        })
    }

    #[test]
    fn dispatch_runs_in_registration_order() {
        let table = EventHandlerTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        table.add("change", recording_handler(&log, "a"));
        table.add("change", recording_handler(&log, "b"));

        let count = table.dispatch("change", &json!(1));
        assert_eq!(count, 2);
        assert_eq!(log.lock().unwrap().as_slice(), ["a:1", "b:1"]);
    }

    #[test]
    fn remove_by_identity() {
        let table = EventHandlerTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = table.add("change", recording_handler(&log, "a"));
        table.add("change", recording_handler(&log, "b"));

        assert!(table.remove("change", first));
        assert!(!table.remove("change", first), "second removal is a no-op");

        table.dispatch("change", &json!(2));
        assert_eq!(log.lock().unwrap().as_slice(), ["b:2"]);
    }

    #[test]
    fn removing_last_handler_drops_the_type() {
        let table = EventHandlerTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = table.add("close", recording_handler(&log, "x"));
        assert!(table.has("close"));
        table.remove("close", id);
        assert!(!table.has("close"));
    }

    #[test]
    fn clear_reports_registered_types() {
        let table = EventHandlerTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        table.add("open", recording_handler(&log, "a"));
        table.add("close", recording_handler(&log, "b"));

        let mut types = table.clear();
        types.sort();
        assert_eq!(types, ["close", "open"]);
        assert_eq!(table.dispatch("open", &json!(null)), 0);
    }

    #[test]
    fn dispatch_unknown_type_is_zero() {
        let table = EventHandlerTable::new();
        assert_eq!(table.dispatch("nothing", &json!(null)), 0);
    }
}
