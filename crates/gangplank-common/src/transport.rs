//! The transport seam between the page and the host.
//!
//! The actual delivery mechanism (webview postMessage, websocket, …) lives
//! outside this SDK. The core only requires: deliver a named call with
//! arguments to the remote side and resolve with its return value — or
//! resolve with the failure sentinel if no transport is bound yet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::errors::SdkError;
use crate::message::RemoteMessage;
use crate::readiness::ReadinessSignal;
use crate::Result;

/// Outbound half: carries one envelope to the remote side.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn deliver(&self, message: RemoteMessage) -> Result<Value>;
}

/// Inbound half: the receiving side of the boundary. Both coordinators
/// implement this.
#[async_trait]
pub trait MessageEndpoint: Send + Sync {
    async fn handle_call(&self, message: RemoteMessage) -> Result<Value>;
}

/// A bindable transport slot.
///
/// Calls made before [`Messaging::bind`] resolve to `Value::Bool(false)`
/// rather than erroring — handshake-style callers check the boolean result.
pub struct Messaging {
    slot: RwLock<Option<Arc<dyn MessageTransport>>>,
}

impl Messaging {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub fn bind(&self, transport: Arc<dyn MessageTransport>) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(transport);
    }

    pub fn is_bound(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub async fn call(&self, from: &str, func: &str, args: Vec<Value>) -> Result<Value> {
        let transport = {
            let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
            slot.clone()
        };
        match transport {
            Some(transport) => {
                transport
                    .deliver(RemoteMessage::new(from, func, args))
                    .await
            }
            None => {
                tracing::debug!(func, "call before transport bind, resolving to false");
                Ok(Value::Bool(false))
            }
        }
    }
}

impl Default for Messaging {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process transport: delivers straight into the remote endpoint's
/// dispatch. The reference transport for tests and single-process embedders.
pub struct LocalTransport {
    remote: Arc<dyn MessageEndpoint>,
}

impl LocalTransport {
    pub fn new(remote: Arc<dyn MessageEndpoint>) -> Arc<Self> {
        Arc::new(Self { remote })
    }
}

#[async_trait]
impl MessageTransport for LocalTransport {
    async fn deliver(&self, message: RemoteMessage) -> Result<Value> {
        self.remote.handle_call(message).await
    }
}

struct QueuedCall {
    func: String,
    args: Vec<Value>,
    reply: oneshot::Sender<Result<Value>>,
}

/// A FIFO call queue that holds outbound calls until a readiness gate
/// resolves.
///
/// Both sides use one: the host's webview container gates on that page's
/// page-initialized signal; the page coordinator gates on backend-ready.
/// Calls enqueued before the gate resolves are delivered afterwards, in
/// enqueue order; the gate's *value* does not block delivery — a gate
/// resolved `false` still drains, and the transport reports the outcome.
pub struct CallQueue {
    label: String,
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedCall>>>,
    closed: Arc<AtomicBool>,
}

impl CallQueue {
    /// Create the queue and spawn its drain task. Must run inside a tokio
    /// runtime.
    pub fn new(
        label: impl Into<String>,
        gate: ReadinessSignal,
        messaging: Arc<Messaging>,
        from: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let from = from.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedCall>();
        let closed = Arc::new(AtomicBool::new(false));

        let task_closed = Arc::clone(&closed);
        let task_label = label.clone();
        tokio::spawn(async move {
            gate.wait().await;
            while let Some(call) = rx.recv().await {
                if task_closed.load(Ordering::SeqCst) {
                    let _ = call
                        .reply
                        .send(Err(SdkError::QueueClosed(task_label.clone())));
                    continue;
                }
                let result = messaging.call(&from, &call.func, call.args).await;
                let _ = call.reply.send(result);
            }
        });

        Self {
            label,
            sender: Mutex::new(Some(tx)),
            closed,
        }
    }

    pub async fn call(&self, func: &str, args: Vec<Value>) -> Result<Value> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
            let Some(sender) = sender.as_ref() else {
                return Err(SdkError::QueueClosed(self.label.clone()));
            };
            let queued = QueuedCall {
                func: func.to_string(),
                args,
                reply: reply_tx,
            };
            if sender.send(queued).is_err() {
                return Err(SdkError::QueueClosed(self.label.clone()));
            }
        }
        reply_rx
            .await
            .map_err(|_| SdkError::QueueClosed(self.label.clone()))?
    }

    /// Close the queue. Enqueued-but-undelivered calls fail with
    /// [`SdkError::QueueClosed`]; later `call`s fail immediately. The owner
    /// must also resolve the gate, or pending replies never settle.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoEndpoint;

    #[async_trait]
    impl MessageEndpoint for EchoEndpoint {
        async fn handle_call(&self, message: RemoteMessage) -> Result<Value> {
            Ok(json!({ "func": message.func, "args": message.args }))
        }
    }

    #[tokio::test]
    async fn unbound_call_resolves_to_false_sentinel() {
        let messaging = Messaging::new();
        assert!(!messaging.is_bound());
        let result = messaging.call("page", "plugin.onPageInit", vec![]).await;
        assert_eq!(result.unwrap(), Value::Bool(false));
    }

    #[tokio::test]
    async fn bound_call_reaches_the_endpoint() {
        let messaging = Messaging::new();
        messaging.bind(LocalTransport::new(Arc::new(EchoEndpoint)));
        assert!(messaging.is_bound());

        let result = messaging
            .call("page", "plugin.log", vec![json!("INFO")])
            .await
            .unwrap();
        assert_eq!(result["func"], "plugin.log");
        assert_eq!(result["args"], json!(["INFO"]));
    }

    struct RecordingEndpoint {
        order: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageEndpoint for RecordingEndpoint {
        async fn handle_call(&self, message: RemoteMessage) -> Result<Value> {
            self.order.lock().unwrap().push(message.func);
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn queue_holds_calls_until_gate_resolves_then_fifo() {
        let endpoint = Arc::new(RecordingEndpoint {
            order: std::sync::Mutex::new(Vec::new()),
        });
        let messaging = Arc::new(Messaging::new());
        messaging.bind(LocalTransport::new(
            Arc::clone(&endpoint) as Arc<dyn MessageEndpoint>
        ));

        let gate = ReadinessSignal::new();
        let queue = Arc::new(CallQueue::new(
            "test",
            gate.clone(),
            Arc::clone(&messaging),
            "page",
        ));

        let mut pending = Vec::new();
        for func in ["first", "second", "third"] {
            let queue = Arc::clone(&queue);
            pending.push(tokio::spawn(async move { queue.call(func, vec![]).await }));
        }
        tokio::task::yield_now().await;
        assert!(endpoint.order.lock().unwrap().is_empty(), "delivered early");

        gate.resolve(true);
        for task in pending {
            task.await.unwrap().unwrap();
        }
        assert_eq!(
            endpoint.order.lock().unwrap().as_slice(),
            ["first", "second", "third"]
        );
    }

    #[tokio::test]
    async fn closed_queue_fails_pending_and_later_calls() {
        let messaging = Arc::new(Messaging::new());
        let gate = ReadinessSignal::new();
        let queue = Arc::new(CallQueue::new(
            "test",
            gate.clone(),
            Arc::clone(&messaging),
            "page",
        ));

        let early = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.call("early", vec![]).await })
        };
        tokio::task::yield_now().await;

        queue.close();
        gate.resolve(false);

        let err = early.await.unwrap().unwrap_err();
        assert!(matches!(err, SdkError::QueueClosed(_)));

        let err = queue.call("late", vec![]).await.unwrap_err();
        assert!(matches!(err, SdkError::QueueClosed(_)));
    }
}
