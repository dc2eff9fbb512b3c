//! One live webview surface plus its rendering and messaging state.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{json, Value};

use gangplank_common::{
    CallQueue, Messaging, ReadinessSignal, RemoteMessage, Result, SdkError,
};

use crate::context::{HostContext, WebviewOptions, WebviewSurface};
use crate::html::{self, TemplateRegistry};

/// Everything rendering needs from the coordinator.
pub(crate) struct RenderDeps<'a> {
    pub extension_path: &'a Path,
    pub l10n: &'a Value,
    pub templates: &'a TemplateRegistry,
}

pub(crate) type InboundHook = Arc<dyn Fn(RemoteMessage) + Send + Sync>;
pub type MessageHandler = Arc<dyn Fn(RemoteMessage) + Send + Sync>;

/// A rendered webview surface owned by the host coordinator.
///
/// Outbound calls queue until this page's initialization signal resolves;
/// inbound messages are guarded against foreign postMessage traffic.
/// Disposal is terminal — the same view type needs a fresh container
/// afterwards.
pub struct WebviewContainer {
    view_type: String,
    options: Mutex<WebviewOptions>,
    surface: Arc<dyn WebviewSurface>,
    page_ready: ReadinessSignal,
    messaging: Arc<Messaging>,
    queue: CallQueue,
    disposed: AtomicBool,
    dispose_listeners: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    inbound: RwLock<Option<InboundHook>>,
    local_handler: RwLock<Option<MessageHandler>>,
}

impl WebviewContainer {
    pub(crate) fn create(
        context: &Arc<dyn HostContext>,
        options: WebviewOptions,
        deps: RenderDeps<'_>,
    ) -> Result<Arc<Self>> {
        let surface = context.create_webview(&options)?;
        let html = render_html(&options, &deps, &surface.resource_root())?;
        surface.set_html(&html);
        surface.set_title(&options.title);
        if let Some(icon) = &options.icon {
            surface.set_icon(&deps.extension_path.join(icon));
        }

        let view_type = options.view_type.clone();
        let page_ready = ReadinessSignal::new();
        let messaging = Arc::new(Messaging::new());
        let queue = CallQueue::new(
            view_type.clone(),
            page_ready.clone(),
            Arc::clone(&messaging),
            gangplank_common::protocol::HOST_SENDER,
        );

        let container = Arc::new(Self {
            view_type,
            options: Mutex::new(options),
            surface,
            page_ready,
            messaging,
            queue,
            disposed: AtomicBool::new(false),
            dispose_listeners: Mutex::new(Vec::new()),
            inbound: RwLock::new(None),
            local_handler: RwLock::new(None),
        });

        // Host-side disposal (user closed the tab) tears this container
        // down the same way an explicit dispose() does.
        let weak = Arc::downgrade(&container);
        container.surface.on_dispose(Box::new(move || {
            if let Some(container) = weak.upgrade() {
                container.dispose();
            }
        }));

        tracing::debug!(view_type = %container.view_type, "webview container created");
        Ok(container)
    }

    pub fn view_type(&self) -> &str {
        &self.view_type
    }

    /// Snapshot of the container's current configuration.
    pub fn options(&self) -> WebviewOptions {
        self.options
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn page_ready(&self) -> &ReadinessSignal {
        &self.page_ready
    }

    /// The transport slot for this container's page. The embedder binds it
    /// once the page's channel exists.
    pub fn messaging(&self) -> &Arc<Messaging> {
        &self.messaging
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Queue a remote call to this container's page. Delivery starts once
    /// the page-initialized signal resolves; order is enqueue order.
    pub async fn call(&self, func: &str, args: Vec<Value>) -> Result<Value> {
        if self.is_disposed() {
            return Err(SdkError::ContainerDisposed(self.view_type.clone()));
        }
        self.queue.call(func, args).await.map_err(|e| match e {
            SdkError::QueueClosed(_) => SdkError::ContainerDisposed(self.view_type.clone()),
            other => other,
        })
    }

    /// Handle one inbound postMessage value. Values lacking `from`/`func`
    /// are not ours and are dropped without error.
    pub fn handle_message(&self, message: Value) {
        let Some(message) = RemoteMessage::parse(&message) else {
            tracing::trace!(view_type = %self.view_type, "foreign message dropped");
            return;
        };
        let inbound = self
            .inbound
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(inbound) = inbound {
            inbound(message.clone());
        }
        let handler = self
            .local_handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    pub(crate) fn set_inbound_hook(&self, hook: InboundHook) {
        *self.inbound.write().unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }

    /// Register a handler for guarded inbound messages, replacing any
    /// earlier one.
    pub fn set_message_handler(&self, handler: MessageHandler) {
        *self.local_handler.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Fire-and-forget broadcast to the surface.
    pub fn post_message(&self, message: Value) {
        self.surface.post_message(message);
    }

    pub fn reveal(&self, preserve_focus: bool) {
        self.surface.reveal(preserve_focus);
    }

    /// Override path: re-render content and refresh title/icon in place.
    pub(crate) fn update(&self, options: WebviewOptions, deps: RenderDeps<'_>) -> Result<()> {
        if self.is_disposed() {
            return Err(SdkError::ContainerDisposed(self.view_type.clone()));
        }
        let html = render_html(&options, &deps, &self.surface.resource_root())?;
        self.surface.set_html(&html);
        self.surface.set_title(&options.title);
        if let Some(icon) = &options.icon {
            self.surface.set_icon(&deps.extension_path.join(icon));
        }
        if !options.preserve_focus {
            self.surface.reveal(false);
        }
        *self.options.lock().unwrap_or_else(|e| e.into_inner()) = options;
        Ok(())
    }

    /// Register a dispose listener; fired exactly once. Registering on an
    /// already-disposed container fires immediately.
    pub fn on_dispose(&self, listener: Box<dyn FnOnce() + Send>) {
        if self.is_disposed() {
            listener();
            return;
        }
        self.dispose_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Idempotent teardown: surface disposed, pending calls failed,
    /// listeners notified exactly once each.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue.close();
        // Unblock the drain task if the page never initialized.
        self.page_ready.resolve(false);
        self.surface.dispose();

        let listeners: Vec<_> = self
            .dispose_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for listener in listeners {
            listener();
        }
        tracing::debug!(view_type = %self.view_type, "webview container disposed");
    }
}

fn render_html(
    options: &WebviewOptions,
    deps: &RenderDeps<'_>,
    resource_root: &str,
) -> Result<String> {
    if options.url.starts_with("http://") || options.url.starts_with("https://") {
        return Ok(html::iframe_shell(&options.url));
    }

    let template_path = deps.extension_path.join(&options.url);
    let source = std::fs::read_to_string(&template_path).map_err(|e| {
        SdkError::Template(format!(
            "template '{}' not readable: {e}",
            template_path.display()
        ))
    })?;

    let engine = deps.templates.get(options.template_engine)?;
    let data = json!({ "l10n": deps.l10n, "extData": options.ext_data });
    let rendered = engine.render(&source, &data)?;

    let script = html::bootstrap_script(
        &options.view_type,
        &options.ext_data,
        deps.l10n,
        &deps.extension_path.to_string_lossy(),
    );
    let with_bootstrap = html::inject_bootstrap(&rendered, &script);
    Ok(html::rewrite_resource_refs(&with_bootstrap, resource_root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gangplank_common::L10nTable;
    use std::path::PathBuf;

    fn deps_in(dir: &Path) -> (PathBuf, Value, TemplateRegistry) {
        (
            dir.to_path_buf(),
            L10nTable::empty().to_value(),
            TemplateRegistry::new(),
        )
    }

    #[test]
    fn remote_url_renders_iframe_shell() {
        let dir = std::env::temp_dir();
        let (path, l10n, templates) = deps_in(&dir);
        let deps = RenderDeps {
            extension_path: &path,
            l10n: &l10n,
            templates: &templates,
        };
        let options = WebviewOptions::new("remote", "Remote", "https://example.com/app");
        let html = render_html(&options, &deps, "res://x").unwrap();
        assert!(html.contains(r#"<iframe src="https://example.com/app""#));
        assert!(!html.contains("acquirePluginHost"));
    }

    #[test]
    fn local_template_gets_bootstrap_and_rewriting() {
        let dir = std::env::temp_dir().join(format!("gangplank-render-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("index.html"),
            r#"<html><head><link href="app.css"></head><body></body></html>"#,
        )
        .unwrap();

        let (path, l10n, templates) = deps_in(&dir);
        let deps = RenderDeps {
            extension_path: &path,
            l10n: &l10n,
            templates: &templates,
        };
        let options = WebviewOptions::new("main", "Main", "index.html");
        let html = render_html(&options, &deps, "res://ext").unwrap();
        assert!(html.contains("acquirePluginHost"));
        assert!(html.contains(r#"href="res://ext/app.css""#));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_template_is_a_template_error() {
        let dir = std::env::temp_dir();
        let (path, l10n, templates) = deps_in(&dir);
        let deps = RenderDeps {
            extension_path: &path,
            l10n: &l10n,
            templates: &templates,
        };
        let options = WebviewOptions::new("main", "Main", "no-such-template.html");
        let err = render_html(&options, &deps, "res://x").unwrap_err();
        assert!(matches!(err, SdkError::Template(_)));
    }
}
