//! The page coordinator: mirror of the host coordinator on the webview
//! side, one instance per page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use gangplank_common::message::{CallRouter, CallTarget};
use gangplank_common::{
    protocol, CallQueue, L10nTable, LogLevel, MessageEndpoint, MessageTransport, Messaging,
    ReadinessSignal, RemoteMessage, Result, SdkError, Unit, UnitRegistry,
};

use crate::builtin::DefaultFrontendUnit;
use crate::dom::{ContextMenuHook, DomReadyState, MenuItem, PageDom};
use crate::handlers::{EventHandlerTable, HandlerId};

/// Collects everything one page needs before launch.
///
/// One coordinator per page, by construction discipline — build it in the
/// page's entry script and pass the `Arc` around. Bind the transport here
/// when the channel already exists at construction time, so the readiness
/// handshake finds it; a transport bound later loses the handshake (the
/// call resolves to the unbound sentinel and the page settles not-ready).
pub struct PageCoordinatorBuilder {
    dom: Arc<dyn PageDom>,
    units: Vec<Arc<dyn Unit>>,
    transport: Option<Arc<dyn MessageTransport>>,
}

impl PageCoordinatorBuilder {
    pub fn new(dom: Arc<dyn PageDom>) -> Self {
        Self {
            dom,
            units: Vec::new(),
            transport: None,
        }
    }

    /// Register a frontend unit. Duplicates (by name) collapse to the
    /// first registration; the built-in default unit is always appended.
    pub fn unit(mut self, unit: Arc<dyn Unit>) -> Self {
        self.units.push(unit);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn MessageTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Construct the coordinator and spawn its lifecycle driver. Must run
    /// inside a tokio runtime. Fails loudly if the host capability object
    /// was already acquired on this page.
    pub fn launch(self) -> Result<Arc<PageCoordinator>> {
        self.dom.suppress_reload_keys();
        let api = self.dom.acquire_host_api()?;

        let l10n = L10nTable::from_value(&api.i18n);
        let messaging = Arc::new(Messaging::new());
        if let Some(transport) = self.transport {
            messaging.bind(transport);
        }

        let dom_ready = ReadinessSignal::new();
        let backend_ready = ReadinessSignal::new();
        let queue = CallQueue::new(
            api.view_type.clone(),
            backend_ready.clone(),
            Arc::clone(&messaging),
            api.view_type.clone(),
        );

        let coordinator = Arc::new_cyclic(|weak: &Weak<PageCoordinator>| {
            let mut units = UnitRegistry::new();
            for unit in self.units {
                units.register(unit);
            }
            units.register(DefaultFrontendUnit::new(weak.clone()));

            PageCoordinator {
                dom: self.dom,
                messaging,
                units,
                router: CallRouter::new(),
                handlers: EventHandlerTable::new(),
                l10n,
                view_type: api.view_type,
                ext_data: api.ext_data,
                extension_path: api.extension_path,
                dom_ready,
                backend_ready,
                queue,
                stopped: AtomicBool::new(false),
            }
        });

        for unit in coordinator.units.iter() {
            coordinator.router.register_table(unit.calls());
        }

        tokio::spawn(Arc::clone(&coordinator).drive_lifecycle());
        Ok(coordinator)
    }
}

/// Frontend-side coordinator for one webview page.
pub struct PageCoordinator {
    dom: Arc<dyn PageDom>,
    messaging: Arc<Messaging>,
    units: UnitRegistry,
    router: CallRouter,
    handlers: EventHandlerTable,
    l10n: L10nTable,
    view_type: String,
    ext_data: Value,
    extension_path: String,
    dom_ready: ReadinessSignal,
    backend_ready: ReadinessSignal,
    queue: CallQueue,
    stopped: AtomicBool,
}

impl PageCoordinator {
    pub fn builder(dom: Arc<dyn PageDom>) -> PageCoordinatorBuilder {
        PageCoordinatorBuilder::new(dom)
    }

    pub fn view_type(&self) -> &str {
        &self.view_type
    }

    pub fn ext_data(&self) -> &Value {
        &self.ext_data
    }

    pub fn extension_path(&self) -> &str {
        &self.extension_path
    }

    /// Resolves once the host acknowledged `plugin.onPageInit`; the value
    /// is the host's readiness outcome.
    pub fn backend_ready(&self) -> &ReadinessSignal {
        &self.backend_ready
    }

    /// The transport slot toward the host, for embedders that bind the
    /// channel after construction.
    pub fn messaging(&self) -> &Arc<Messaging> {
        &self.messaging
    }

    async fn drive_lifecycle(self: Arc<Self>) {
        match self.dom.ready_state() {
            DomReadyState::Loading => {
                let signal = self.dom_ready.clone();
                self.dom.on_content_loaded(Box::new(move || {
                    signal.resolve(true);
                }));
            }
            DomReadyState::Interactive | DomReadyState::Complete => {
                self.dom_ready.resolve(true);
            }
        }
        self.dom_ready.wait().await;

        let init_ok = match self.units.init_all().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "frontend unit initialization failed");
                false
            }
        };
        if !init_ok {
            self.backend_ready.resolve(false);
            return;
        }

        // The handshake call bypasses the queue: it must cross the
        // boundary ahead of any deferred application traffic.
        let ack = self
            .messaging
            .call(
                &self.view_type,
                protocol::ON_PAGE_INIT,
                vec![Value::String(self.view_type.clone())],
            )
            .await;
        let ok = match ack {
            Ok(Value::Bool(true)) => true,
            Ok(other) => {
                tracing::warn!(ack = %other, "backend declined page init");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "page init handshake failed");
                false
            }
        };
        self.backend_ready.resolve(ok);
        if !ok {
            return;
        }
        tracing::debug!(view_type = %self.view_type, "page ready");

        if let Err(e) = self.units.run_all().await {
            tracing::error!(error = %e, "frontend unit run failed");
        }
    }

    /// Dispatch a remote call to the host (or, via `"vt::fn"`, to another
    /// container's page through the host). Calls made before the
    /// handshake completes queue rather than fail, and deliver in order
    /// afterwards.
    pub async fn call(&self, identifier: &str, args: Vec<Value>) -> Result<Value> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SdkError::Stopped);
        }
        self.queue.call(identifier, args).await
    }

    /// Subscribe to a host event: remote-register first, then append the
    /// handler to the local table. The returned id is the handle for
    /// removal.
    pub async fn subscribe_event(
        &self,
        event_type: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<HandlerId> {
        self.call(
            protocol::SUBSCRIBE_EVENT,
            vec![Value::String(event_type.to_string())],
        )
        .await?;
        Ok(self.handlers.add(event_type, Arc::new(handler)))
    }

    /// Drop one handler: remote-unregister the event type, then remove
    /// locally by identity.
    pub async fn unsubscribe_event(&self, event_type: &str, id: HandlerId) -> Result<bool> {
        self.call(
            protocol::UNSUBSCRIBE_EVENT,
            vec![Value::String(event_type.to_string())],
        )
        .await?;
        Ok(self.handlers.remove(event_type, id))
    }

    /// Drop every handler and tell the host to release every
    /// subscription.
    pub async fn unsubscribe_all_events(&self) -> Result<()> {
        self.call(protocol::UNSUBSCRIBE_ALL_EVENTS, vec![]).await?;
        self.handlers.clear();
        Ok(())
    }

    /// Synchronous local dispatch to every handler registered for
    /// `event_type`, in registration order. Returns how many ran.
    pub fn on_event(&self, event_type: &str, payload: &Value) -> usize {
        self.handlers.dispatch(event_type, payload)
    }

    /// Log locally and forward to the host's output channel.
    pub async fn log(&self, level: LogLevel, message: &str) -> Result<Value> {
        match level {
            LogLevel::Debug => tracing::debug!(target: "gangplank", "{message}"),
            LogLevel::Info => tracing::info!(target: "gangplank", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "gangplank", "{message}"),
            LogLevel::Error => tracing::error!(target: "gangplank", "{message}"),
        }
        self.call(
            protocol::LOG,
            vec![
                Value::String(level.as_str().to_string()),
                Value::String(message.to_string()),
            ],
        )
        .await
    }

    /// Pure lookup with positional `%n` substitution; a missing key
    /// resolves to the empty string.
    pub fn localize(&self, key: &str, args: &[&str]) -> String {
        self.l10n.localize(key, args)
    }

    /// Map an extension-relative path onto the webview resource scheme.
    pub fn to_webview_resource(&self, path: &str) -> String {
        let root = self.dom.resource_root();
        format!(
            "{}/{}",
            root.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn create_webview_panel(
        &self,
        options: Value,
        override_existing: bool,
    ) -> Result<Value> {
        self.call(
            protocol::CREATE_WEBVIEW_PANEL,
            vec![options, Value::Bool(override_existing)],
        )
        .await
    }

    pub async fn create_webview_view_dialog(&self, options: Value) -> Result<Value> {
        self.call(protocol::CREATE_WEBVIEW_VIEW_DIALOG, vec![options])
            .await
    }

    pub async fn dispose_webview(&self, view_type: &str) -> Result<Value> {
        self.call(
            protocol::DISPOSE_WEBVIEW_CONTAINER,
            vec![Value::String(view_type.to_string())],
        )
        .await
    }

    /// Install (or replace) the right-click handler for `target`,
    /// contributing `items` into the event's menu — replacing whatever an
    /// upstream handler attached, or concatenating after it when
    /// `extend` is set.
    pub fn register_context_menu(&self, target: &str, items: Vec<MenuItem>, extend: bool) {
        let hook: ContextMenuHook = Arc::new(move |event| {
            if extend {
                event.menu.extend(items.iter().cloned());
            } else {
                event.menu = items.clone();
            }
        });
        self.dom.set_context_menu_hook(target, hook);
    }

    /// Terminal shutdown: stop the units, release host subscriptions,
    /// clear the handler table, close the call queue.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.units.stop_all().await;
        if self.backend_ready.peek() == Some(true) {
            if let Err(e) = self.queue.call(protocol::UNSUBSCRIBE_ALL_EVENTS, vec![]).await {
                tracing::debug!(error = %e, "releasing subscriptions at stop failed");
            }
        }
        self.handlers.clear();
        self.backend_ready.resolve(false);
        self.queue.close();
        tracing::debug!(view_type = %self.view_type, "page coordinator stopped");
    }
}

#[async_trait]
impl MessageEndpoint for PageCoordinator {
    async fn handle_call(&self, message: RemoteMessage) -> Result<Value> {
        match CallTarget::parse(&message.func) {
            // Container-addressed ids never terminate here; hand the bare
            // function to this page's table.
            CallTarget::Container { func, .. } => {
                self.router
                    .dispatch(RemoteMessage {
                        func,
                        ..message
                    })
                    .await
            }
            _ => self.router.dispatch(message).await,
        }
    }
}
