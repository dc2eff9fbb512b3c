//! Remote-call envelope, target addressing, and dispatch tables.
//!
//! A call crossing the page/host boundary is addressed either as
//! `"<view-type>::<function>"` (targeting one webview container), as a bare
//! dotted id (`plugin.log`, `plugin.onPageInit`, …) targeting a built-in
//! operation of the receiving side, or under the reserved [`HOST_API_PREFIX`]
//! which resolves against the allow-listed [`HostApiRegistry`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SdkError;
use crate::Result;

/// Reserved prefix exposing the host IDE API surface. A call to
/// `ide.window.showMessage` resolves to the registry entry
/// `window.showMessage`.
pub const HOST_API_PREFIX: &str = "ide.";

pub fn new_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// The wire envelope for one remote call.
///
/// Inbound values missing `from` or `func` are not Gangplank traffic and
/// must be dropped without error; [`RemoteMessage::parse`] encodes that
/// guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMessage {
    /// Sender identity: a view type, or `"host"` for the extension host.
    pub from: String,
    /// Target function id, possibly `"<view-type>::<function>"`.
    pub func: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
}

impl RemoteMessage {
    pub fn new(from: impl Into<String>, func: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            from: from.into(),
            func: func.into(),
            args,
            correlation: Some(new_correlation_id()),
        }
    }

    /// Parse an inbound value. Returns `None` for anything that is not an
    /// object carrying non-empty `from` and `func` fields — foreign
    /// postMessage noise, by design dropped silently by callers.
    pub fn parse(value: &Value) -> Option<Self> {
        let message: Self = serde_json::from_value(value.clone()).ok()?;
        if message.from.is_empty() || message.func.is_empty() {
            return None;
        }
        Some(message)
    }
}

/// A parsed call target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// `"<view-type>::<function>"` — addressed to one webview container.
    Container { view_type: String, func: String },
    /// `ide.`-prefixed — resolved against the [`HostApiRegistry`]. Carries
    /// the remaining dotted path.
    HostApi(String),
    /// A bare function id handled by the receiving side's own tables.
    Builtin(String),
}

impl CallTarget {
    pub fn parse(identifier: &str) -> Self {
        if let Some((view_type, func)) = identifier.split_once("::") {
            return Self::Container {
                view_type: view_type.to_string(),
                func: func.to_string(),
            };
        }
        if let Some(rest) = identifier.strip_prefix(HOST_API_PREFIX) {
            return Self::HostApi(rest.to_string());
        }
        Self::Builtin(identifier.to_string())
    }
}

pub type CallArgs = Vec<Value>;

/// An async handler for one registered function. Receives the full envelope
/// so handshake handlers can read the sender identity.
pub type CallHandler = Arc<dyn Fn(RemoteMessage) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wrap an async closure into a [`CallHandler`].
pub fn call_handler<F, Fut>(f: F) -> CallHandler
where
    F: Fn(RemoteMessage) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |message| Box::pin(f(message)))
}

/// An ordered list of exposed functions, built explicitly in each unit's
/// constructor and merged into the receiving side's [`CallRouter`].
#[derive(Default)]
pub struct CallTable {
    entries: Vec<(String, CallHandler)>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn expose(mut self, name: impl Into<String>, handler: CallHandler) -> Self {
        self.entries.push((name.into(), handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, CallHandler)> {
        self.entries
    }
}

/// The explicit dispatch table for one side of the boundary.
pub struct CallRouter {
    handlers: RwLock<HashMap<String, CallHandler>>,
}

impl CallRouter {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: impl Into<String>, handler: CallHandler) {
        let name = name.into();
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(func = %name, "call handler replaced an earlier registration");
        }
    }

    pub fn register_table(&self, table: CallTable) {
        for (name, handler) in table.into_entries() {
            self.register(name, handler);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub async fn dispatch(&self, message: RemoteMessage) -> Result<Value> {
        let handler = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            handlers.get(&message.func).cloned()
        };
        match handler {
            Some(handler) => handler(message).await,
            None => Err(SdkError::UnknownFunction(message.func)),
        }
    }
}

impl Default for CallRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Allow-listed registry of host IDE API entry points, built once at
/// startup. The statically auditable replacement for reflective dotted-path
/// dispatch: only keys registered here are reachable through
/// [`HOST_API_PREFIX`].
pub struct HostApiRegistry {
    entries: HashMap<String, CallHandler>,
}

impl HostApiRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, path: impl Into<String>, handler: CallHandler) -> &mut Self {
        self.entries.insert(path.into(), handler);
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn dispatch(&self, path: &str, message: RemoteMessage) -> Result<Value> {
        match self.entries.get(path) {
            Some(handler) => handler(message).await,
            None => Err(SdkError::UnknownFunction(format!(
                "{HOST_API_PREFIX}{path}"
            ))),
        }
    }
}

impl Default for HostApiRegistry {
    fn default() -> Self {
        Self::new()
    }
}
