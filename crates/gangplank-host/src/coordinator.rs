//! The extension-host coordinator: single point of truth for backend
//! units, webview containers, and the readiness handshake.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use gangplank_common::message::{CallRouter, CallTarget, HostApiRegistry};
use gangplank_common::{
    protocol, L10nTable, LogLevel, MessageEndpoint, ReadinessSignal, RemoteMessage, Result,
    SdkError, Unit, UnitRegistry,
};
use gangplank_relay::{EventRelay, EventSource, RelayForwarder, BEFORE_UNINSTALL_EVENT};

use crate::builtin::DefaultBackendUnit;
use crate::container::{RenderDeps, WebviewContainer};
use crate::context::{HostContext, OutputSink, TemplateKind, WebviewOptions};
use crate::html::{TemplateEngine, TemplateRegistry};

/// Collects everything one extension-host process needs before launch.
///
/// Exactly one coordinator exists per process; that invariant is
/// construction discipline — build it once at activation and pass the
/// `Arc` to whatever needs it. There is no global instance.
pub struct HostCoordinatorBuilder {
    context: Arc<dyn HostContext>,
    units: Vec<Arc<dyn Unit>>,
    event_sources: Vec<(String, Arc<dyn EventSource>)>,
    templates: TemplateRegistry,
    host_api: HostApiRegistry,
    initial_webview: Option<WebviewOptions>,
}

impl HostCoordinatorBuilder {
    pub fn new(context: Arc<dyn HostContext>) -> Self {
        Self {
            context,
            units: Vec::new(),
            event_sources: Vec::new(),
            templates: TemplateRegistry::new(),
            host_api: HostApiRegistry::new(),
            initial_webview: None,
        }
    }

    /// Register a backend unit. Duplicates (by name) collapse to the first
    /// registration. Zero units is legal — the built-in default unit is
    /// always appended.
    pub fn unit(mut self, unit: Arc<dyn Unit>) -> Self {
        self.units.push(unit);
        self
    }

    /// Add one entry to the fixed event table bridged to the page side.
    pub fn event_source(
        mut self,
        event_type: impl Into<String>,
        source: Arc<dyn EventSource>,
    ) -> Self {
        self.event_sources.push((event_type.into(), source));
        self
    }

    pub fn template_engine(mut self, kind: TemplateKind, engine: Arc<dyn TemplateEngine>) -> Self {
        self.templates.register(kind, engine);
        self
    }

    /// Allow-list one host-API entry point, reachable from the page as
    /// `ide.<path>`.
    pub fn host_api(
        mut self,
        path: impl Into<String>,
        handler: gangplank_common::CallHandler,
    ) -> Self {
        self.host_api.register(path, handler);
        self
    }

    /// Container to create immediately at launch; its page drives the
    /// readiness handshake.
    pub fn initial_webview(mut self, options: WebviewOptions) -> Self {
        self.initial_webview = Some(options);
        self
    }

    /// Construct the coordinator and spawn its lifecycle driver. Must run
    /// inside a tokio runtime. Fails if the manifest cannot be read or the
    /// initial container cannot render.
    pub fn launch(self) -> Result<Arc<HostCoordinator>> {
        let extension_path = self.context.extension_path();
        let manifest_path = extension_path.join("package.json");
        let manifest: Value = match std::fs::read_to_string(&manifest_path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(_) => return Err(SdkError::ManifestNotFound(manifest_path)),
        };
        let plugin_id = manifest
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let output_name = if plugin_id.is_empty() {
            "Gangplank".to_string()
        } else {
            plugin_id.clone()
        };

        let l10n = L10nTable::load(&extension_path, &self.context.locale());
        let l10n_value = l10n.to_value();

        let coordinator = Arc::new_cyclic(|weak: &Weak<HostCoordinator>| {
            let forward_weak = weak.clone();
            let forward: RelayForwarder = Arc::new(move |event_type: String, payload: Value| {
                if let Some(coordinator) = forward_weak.upgrade() {
                    tokio::spawn(async move {
                        coordinator.on_relay_event(event_type, payload).await;
                    });
                }
            });
            let relay = EventRelay::new(self.event_sources, forward);

            let mut units = UnitRegistry::new();
            for unit in self.units {
                units.register(unit);
            }
            units.register(DefaultBackendUnit::new(weak.clone()));

            HostCoordinator {
                context: self.context,
                extension_path,
                manifest,
                plugin_id,
                output_name,
                l10n,
                l10n_value,
                units,
                router: CallRouter::new(),
                host_api: self.host_api,
                templates: self.templates,
                relay,
                containers: RwLock::new(HashMap::new()),
                output: Mutex::new(None),
                init_done: ReadinessSignal::new(),
                page_init: ReadinessSignal::new(),
                ready: ReadinessSignal::new(),
                stopped: AtomicBool::new(false),
            }
        });

        for unit in coordinator.units.iter() {
            coordinator.router.register_table(unit.calls());
        }

        if let Some(options) = self.initial_webview {
            coordinator.create_webview_panel(options, false)?;
        }

        tokio::spawn(Arc::clone(&coordinator).drive_lifecycle());
        Ok(coordinator)
    }
}

/// Backend-side coordinator for one extension-host process.
pub struct HostCoordinator {
    context: Arc<dyn HostContext>,
    extension_path: PathBuf,
    manifest: Value,
    plugin_id: String,
    output_name: String,
    l10n: L10nTable,
    l10n_value: Value,
    units: UnitRegistry,
    router: CallRouter,
    host_api: HostApiRegistry,
    templates: TemplateRegistry,
    relay: EventRelay,
    containers: RwLock<HashMap<String, Arc<WebviewContainer>>>,
    output: Mutex<Option<Arc<dyn OutputSink>>>,
    /// Resolves once every unit's init has settled; value is the outcome.
    pub(crate) init_done: ReadinessSignal,
    /// Resolves when the first page reports `plugin.onPageInit`.
    pub(crate) page_init: ReadinessSignal,
    ready: ReadinessSignal,
    stopped: AtomicBool,
}

impl HostCoordinator {
    pub fn builder(context: Arc<dyn HostContext>) -> HostCoordinatorBuilder {
        HostCoordinatorBuilder::new(context)
    }

    /// Overall readiness: both sides initialized and the handshake done.
    pub fn ready(&self) -> &ReadinessSignal {
        &self.ready
    }

    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    pub fn extension_path(&self) -> &PathBuf {
        &self.extension_path
    }

    pub fn localize(&self, key: &str, args: &[&str]) -> String {
        self.l10n.localize(key, args)
    }

    pub fn container(&self, view_type: &str) -> Option<Arc<WebviewContainer>> {
        self.containers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(view_type)
            .cloned()
    }

    pub(crate) fn relay(&self) -> &EventRelay {
        &self.relay
    }

    fn render_deps(&self) -> RenderDeps<'_> {
        RenderDeps {
            extension_path: &self.extension_path,
            l10n: &self.l10n_value,
            templates: &self.templates,
        }
    }

    async fn drive_lifecycle(self: Arc<Self>) {
        let init_ok = match self.units.init_all().await {
            Ok(()) => true,
            Err(e) => {
                self.log(LogLevel::Error, &format!("unit initialization failed: {e}"));
                false
            }
        };
        self.init_done.resolve(init_ok);
        if !init_ok {
            self.ready.resolve(false);
            return;
        }

        // Wait for the page side, then complete the handshake.
        let page_ok = self.page_init.wait().await;
        self.relay.subscribe(BEFORE_UNINSTALL_EVENT);
        self.relay.run();
        if !page_ok {
            self.log(LogLevel::Warn, "page initialization reported failure");
            self.ready.resolve(false);
            return;
        }
        self.ready.resolve(true);
        tracing::debug!(plugin = %self.plugin_id, "readiness handshake complete");

        if let Err(e) = self.units.run_all().await {
            self.log(LogLevel::Error, &format!("unit run failed: {e}"));
        }
    }

    pub(crate) async fn on_relay_event(self: &Arc<Self>, event_type: String, payload: Value) {
        if event_type == BEFORE_UNINSTALL_EVENT {
            let target = payload
                .get("pluginId")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if target == self.plugin_id {
                self.log(LogLevel::Info, "plugin is being uninstalled, stopping");
                self.stop().await;
                return;
            }
        }
        self.broadcast_event(&event_type, &payload).await;
    }

    /// Deliver one event to every live container's page.
    pub(crate) async fn broadcast_event(&self, event_type: &str, payload: &Value) {
        let containers: Vec<_> = {
            let map = self.containers.read().unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        for container in containers {
            let args = vec![Value::String(event_type.to_string()), payload.clone()];
            if let Err(e) = container.call(protocol::ON_EVENT, args).await {
                tracing::debug!(
                    view_type = %container.view_type(),
                    event_type,
                    error = %e,
                    "event delivery failed"
                );
            }
        }
    }

    /// Dispatch a remote call to a webview container.
    ///
    /// `"<view-type>::<function>"` addresses one container; a bare
    /// function id is legal only while exactly one container is live.
    /// The call queues until the target page's initialization signal
    /// resolves.
    pub async fn call(&self, identifier: &str, args: Vec<Value>) -> Result<Value> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SdkError::Stopped);
        }
        let (container, func) = match CallTarget::parse(identifier) {
            CallTarget::Container { view_type, func } => {
                let container = self
                    .container(&view_type)
                    .ok_or(SdkError::TargetNotFound(view_type))?;
                (container, func)
            }
            _ => {
                let map = self.containers.read().unwrap_or_else(|e| e.into_inner());
                match map.len() {
                    0 => return Err(SdkError::TargetNotFound(identifier.to_string())),
                    1 => {
                        let container = map.values().next().cloned().ok_or_else(|| {
                            SdkError::TargetNotFound(identifier.to_string())
                        })?;
                        drop(map);
                        (container, identifier.to_string())
                    }
                    n => return Err(SdkError::AmbiguousTarget(n)),
                }
            }
        };
        container.call(&func, args).await
    }

    /// Create a container, or reuse the live one for this view type:
    /// with `override_existing` the content/title/icon are re-rendered in
    /// place, otherwise the existing container is returned untouched.
    /// Either way the surface is revealed unless `preserve_focus`.
    pub fn create_webview_panel(
        self: &Arc<Self>,
        options: WebviewOptions,
        override_existing: bool,
    ) -> Result<Arc<WebviewContainer>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SdkError::Stopped);
        }
        if let Some(existing) = self.container(&options.view_type) {
            if override_existing {
                tracing::debug!(view_type = %options.view_type, "overriding webview container");
                existing.update(options, self.render_deps())?;
            } else if !options.preserve_focus {
                existing.reveal(false);
            }
            return Ok(existing);
        }

        let view_type = options.view_type.clone();
        let container = WebviewContainer::create(&self.context, options, self.render_deps())?;

        // Inbound traffic from this page routes through the coordinator's
        // dispatch, so pages can call builtins and other containers.
        let inbound_weak = Arc::downgrade(self);
        container.set_inbound_hook(Arc::new(move |message: RemoteMessage| {
            if let Some(coordinator) = inbound_weak.upgrade() {
                tokio::spawn(async move {
                    if let Err(e) = coordinator.handle_call(message).await {
                        tracing::debug!(error = %e, "inbound message dispatch failed");
                    }
                });
            }
        }));

        let untrack_weak = Arc::downgrade(self);
        let untrack_view_type = view_type.clone();
        container.on_dispose(Box::new(move || {
            if let Some(coordinator) = untrack_weak.upgrade() {
                coordinator.untrack(&untrack_view_type);
            }
        }));

        self.containers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(view_type, Arc::clone(&container));
        Ok(container)
    }

    fn untrack(&self, view_type: &str) {
        let removed = self
            .containers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(view_type);
        if removed.is_some() {
            tracing::debug!(view_type, "container untracked after disposal");
        }
    }

    /// Dispose one named container, or every container when `view_type`
    /// is `None`.
    pub fn dispose(&self, view_type: Option<&str>) -> Result<()> {
        match view_type {
            Some(view_type) => {
                let container = self
                    .containers
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(view_type)
                    .ok_or_else(|| SdkError::TargetNotFound(view_type.to_string()))?;
                container.dispose();
                Ok(())
            }
            None => {
                let all: Vec<_> = self
                    .containers
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .drain()
                    .map(|(_, container)| container)
                    .collect();
                for container in all {
                    container.dispose();
                }
                Ok(())
            }
        }
    }

    /// Terminal shutdown: stop every unit, dispose every container,
    /// release relay subscriptions. Further calls fail with `Stopped`.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.units.stop_all().await;
        let _ = self.dispose(None);
        self.relay.dispose();
        self.ready.resolve(false);
        self.log(LogLevel::Info, "coordinator stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Write one line to the process-wide output channel, created lazily
    /// on first use, and mirror it to tracing.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "gangplank", "{message}"),
            LogLevel::Info => tracing::info!(target: "gangplank", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "gangplank", "{message}"),
            LogLevel::Error => tracing::error!(target: "gangplank", "{message}"),
        }
        let sink = {
            let mut output = self.output.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(output.get_or_insert_with(|| {
                self.context.create_output_channel(&self.output_name)
            }))
        };
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        sink.append_line(&format!("[{timestamp}][{level}] {message}"));
    }
}

#[async_trait]
impl MessageEndpoint for HostCoordinator {
    async fn handle_call(&self, message: RemoteMessage) -> Result<Value> {
        match CallTarget::parse(&message.func) {
            CallTarget::Container { view_type, func } => {
                let container = self
                    .container(&view_type)
                    .ok_or(SdkError::TargetNotFound(view_type))?;
                container.call(&func, message.args).await
            }
            CallTarget::HostApi(path) => self.host_api.dispatch(&path, message).await,
            CallTarget::Builtin(_) => self.router.dispatch(message).await,
        }
    }
}
