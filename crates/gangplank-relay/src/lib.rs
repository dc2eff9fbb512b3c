//! Bridges host-IDE native events to the webview side, gated by
//! subscription.
//!
//! The relay holds a fixed table of event-type name → host event source,
//! built once at construction: the set of *possible* event types is static,
//! only the *subscribed* subset varies at runtime. On [`EventRelay::run`]
//! it attaches exactly one listener per table entry; each listener checks
//! subscription membership at fire time before forwarding, so a
//! subscription change affects only events observed strictly after it.
//!
//! Some host events carry promise-valued sub-fields (a terminal's process
//! id resolves asynchronously); their sources emit
//! [`EventPayload::Deferred`] and the relay awaits resolution before
//! forwarding. Ordering is preserved within one event only — concurrent
//! events of different types may forward out of order, which is fine since
//! consumers key on the event type.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::future::BoxFuture;
use serde_json::Value;

/// Reserved event type, implicitly subscribed during the readiness
/// handshake. When it fires with a payload naming this plugin's own
/// manifest id, the host coordinator shuts down in an orderly fashion.
pub const BEFORE_UNINSTALL_EVENT: &str = "gangplank.plugin.beforeUninstall";

/// One fired event's payload: either immediately available, or still
/// resolving asynchronous sub-fields.
pub enum EventPayload {
    Ready(Value),
    Deferred(BoxFuture<'static, Value>),
}

pub type EventListener = Box<dyn Fn(EventPayload) + Send + Sync>;

/// Detach handle returned by [`EventSource::attach`].
pub struct Attachment {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Attachment {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// An attachment with nothing to tear down.
    pub fn noop() -> Self {
        Self { detach: None }
    }

    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

/// One host-IDE event source (an `onDid…` emitter of the host API).
pub trait EventSource: Send + Sync {
    fn attach(&self, listener: EventListener) -> Attachment;
}

/// Receives `(event type, resolved payload)` for every forwarded event;
/// installed by the host coordinator, which broadcasts `plugin.onEvent`
/// into every live container.
pub type RelayForwarder = Arc<dyn Fn(String, Value) + Send + Sync>;

/// The subscription-gated bridge from host events to remote calls.
pub struct EventRelay {
    sources: Vec<(String, Arc<dyn EventSource>)>,
    subscribed: Arc<RwLock<HashSet<String>>>,
    forward: RelayForwarder,
    attachments: Mutex<Vec<Attachment>>,
    attached: AtomicBool,
}

impl EventRelay {
    /// Build the relay over a fixed event table. The table cannot change
    /// after construction.
    pub fn new(sources: Vec<(String, Arc<dyn EventSource>)>, forward: RelayForwarder) -> Self {
        Self {
            sources,
            subscribed: Arc::new(RwLock::new(HashSet::new())),
            forward,
            attachments: Mutex::new(Vec::new()),
            attached: AtomicBool::new(false),
        }
    }

    /// Mark an event type as subscribed. Unknown event-type names are
    /// silently ignored — event sets evolve across host versions and a
    /// stale subscriber is not an error. Returns whether a subscription
    /// now exists.
    pub fn subscribe(&self, event_type: &str) -> bool {
        if !self.sources.iter().any(|(name, _)| name == event_type) {
            tracing::debug!(event_type, "subscribe ignored for unknown event type");
            return false;
        }
        self.subscribed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event_type.to_string());
        true
    }

    pub fn unsubscribe(&self, event_type: &str) {
        self.subscribed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(event_type);
    }

    pub fn unsubscribe_all(&self) {
        self.subscribed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn is_subscribed(&self, event_type: &str) -> bool {
        self.subscribed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(event_type)
    }

    pub fn known_types(&self) -> Vec<&str> {
        self.sources.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Attach one listener per table entry. Idempotent — a second `run`
    /// does not double-attach.
    pub fn run(&self) {
        if self.attached.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut attachments = self.attachments.lock().unwrap_or_else(|e| e.into_inner());
        for (event_type, source) in &self.sources {
            let name = event_type.clone();
            let subscribed = Arc::clone(&self.subscribed);
            let forward = Arc::clone(&self.forward);

            let listener: EventListener = Box::new(move |payload| {
                let gate = subscribed.read().unwrap_or_else(|e| e.into_inner());
                if !gate.contains(&name) {
                    return;
                }
                drop(gate);
                match payload {
                    EventPayload::Ready(value) => forward(name.clone(), value),
                    EventPayload::Deferred(future) => {
                        let forward = Arc::clone(&forward);
                        let name = name.clone();
                        tokio::spawn(async move {
                            forward(name, future.await);
                        });
                    }
                }
            });
            attachments.push(source.attach(listener));
        }
        tracing::debug!(sources = self.sources.len(), "event relay attached");
    }

    /// Detach every listener and drop all subscriptions. Terminal.
    pub fn dispose(&self) {
        let mut attachments = self.attachments.lock().unwrap_or_else(|e| e.into_inner());
        for attachment in attachments.drain(..) {
            attachment.detach();
        }
        self.unsubscribe_all();
    }
}

/// An [`EventSource`] fired by hand. Backs the host-side tests and suits
/// embedders that adapt callback-style host emitters.
#[derive(Default)]
pub struct ManualEventSource {
    listeners: Mutex<Vec<EventListener>>,
}

impl ManualEventSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fire(&self, payload: EventPayload) {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let mut payload = Some(payload);
        for listener in listeners.iter() {
            // Each attach gets its own delivery; with a single listener the
            // payload moves without cloning the deferred future.
            match payload.take() {
                Some(p) => listener(p),
                None => break,
            }
        }
    }

    pub fn fire_ready(&self, value: Value) {
        self.fire(EventPayload::Ready(value));
    }
}

impl EventSource for ManualEventSource {
    fn attach(&self, listener: EventListener) -> Attachment {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
        Attachment::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn collecting_forwarder() -> (RelayForwarder, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let forward: RelayForwarder = Arc::new(move |event_type, payload| {
            let _ = tx.send((event_type, payload));
        });
        (forward, rx)
    }

    fn relay_with(
        types: &[&str],
    ) -> (
        EventRelay,
        Vec<Arc<ManualEventSource>>,
        mpsc::UnboundedReceiver<(String, Value)>,
    ) {
        let sources: Vec<Arc<ManualEventSource>> =
            types.iter().map(|_| ManualEventSource::new()).collect();
        let table = types
            .iter()
            .zip(&sources)
            .map(|(name, src)| {
                (
                    name.to_string(),
                    Arc::clone(src) as Arc<dyn EventSource>,
                )
            })
            .collect();
        let (forward, rx) = collecting_forwarder();
        (EventRelay::new(table, forward), sources, rx)
    }

    #[tokio::test]
    async fn unsubscribed_events_are_not_forwarded() {
        let (relay, sources, mut rx) = relay_with(&["workspace.onDidChangeTextDocument"]);
        relay.run();

        sources[0].fire_ready(json!({"uri": "file:///a.rs"}));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribed_events_forward_once() {
        let (relay, sources, mut rx) = relay_with(&["workspace.onDidChangeTextDocument"]);
        relay.run();
        assert!(relay.subscribe("workspace.onDidChangeTextDocument"));

        sources[0].fire_ready(json!({"uri": "file:///a.rs"}));
        let (event_type, payload) = rx.recv().await.unwrap();
        assert_eq!(event_type, "workspace.onDidChangeTextDocument");
        assert_eq!(payload["uri"], "file:///a.rs");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_takes_effect_for_later_events() {
        let (relay, sources, mut rx) = relay_with(&["window.onDidCloseTerminal"]);
        relay.run();
        relay.subscribe("window.onDidCloseTerminal");
        sources[0].fire_ready(json!(1));
        rx.recv().await.unwrap();

        relay.unsubscribe("window.onDidCloseTerminal");
        sources[0].fire_ready(json!(2));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_event_type_subscribe_is_ignored() {
        let (relay, _sources, _rx) = relay_with(&["window.onDidOpenTerminal"]);
        assert!(!relay.subscribe("window.onDidInventNewEvent"));
        assert!(!relay.is_subscribed("window.onDidInventNewEvent"));
    }

    #[tokio::test]
    async fn deferred_payloads_resolve_before_forwarding() {
        let (relay, sources, mut rx) = relay_with(&["window.onDidOpenTerminal"]);
        relay.run();
        relay.subscribe("window.onDidOpenTerminal");

        sources[0].fire(EventPayload::Deferred(Box::pin(async {
            // Simulates a promise-valued process id.
            tokio::task::yield_now().await;
            json!({"processId": 4242})
        })));

        let (event_type, payload) = rx.recv().await.unwrap();
        assert_eq!(event_type, "window.onDidOpenTerminal");
        assert_eq!(payload["processId"], 4242);
    }

    #[tokio::test]
    async fn run_is_idempotent() {
        let (relay, sources, mut rx) = relay_with(&["window.onDidOpenTerminal"]);
        relay.run();
        relay.run();
        relay.subscribe("window.onDidOpenTerminal");

        sources[0].fire_ready(json!(1));
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err(), "double attach would forward twice");
    }

    #[tokio::test]
    async fn dispose_clears_subscriptions() {
        let (relay, sources, mut rx) = relay_with(&[BEFORE_UNINSTALL_EVENT]);
        relay.run();
        relay.subscribe(BEFORE_UNINSTALL_EVENT);
        relay.dispose();

        sources[0].fire_ready(json!({"pluginId": "x"}));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
