//! Shared fakes: a host context with in-memory webview surfaces, and a
//! page DOM, wired together over the in-process transport.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use gangplank_common::{LocalTransport, MessageEndpoint, Result};
use gangplank_host::{
    HostContext, HostCoordinator, OutputSink, WebviewContainer, WebviewOptions, WebviewSurface,
};
use gangplank_page::{
    ContextMenuHook, DomReadyState, OnceHostApi, PageCoordinator, PageDom, PageHostApi,
};

pub struct FakeSurface {
    pub html: Mutex<Vec<String>>,
    pub titles: Mutex<Vec<String>>,
    pub icons: Mutex<Vec<PathBuf>>,
    pub reveals: AtomicUsize,
    pub posted: Mutex<Vec<Value>>,
    disposed: AtomicBool,
    dispose_callbacks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl FakeSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            html: Mutex::new(Vec::new()),
            titles: Mutex::new(Vec::new()),
            icons: Mutex::new(Vec::new()),
            reveals: AtomicUsize::new(0),
            posted: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            dispose_callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// What the host does when the user closes the tab.
    pub fn simulate_user_close(&self) {
        self.dispose();
    }
}

impl WebviewSurface for FakeSurface {
    fn set_title(&self, title: &str) {
        self.titles.lock().unwrap().push(title.to_string());
    }

    fn set_icon(&self, path: &Path) {
        self.icons.lock().unwrap().push(path.to_path_buf());
    }

    fn set_html(&self, html: &str) {
        self.html.lock().unwrap().push(html.to_string());
    }

    fn reveal(&self, _preserve_focus: bool) {
        self.reveals.fetch_add(1, Ordering::SeqCst);
    }

    fn post_message(&self, message: Value) {
        self.posted.lock().unwrap().push(message);
    }

    fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>) {
        self.dispose_callbacks.lock().unwrap().push(callback);
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks: Vec<_> = self.dispose_callbacks.lock().unwrap().drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }

    fn resource_root(&self) -> String {
        "res://demo-ext".to_string()
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub lines: Mutex<Vec<String>>,
}

impl OutputSink for CollectingSink {
    fn append_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub struct FakeContext {
    pub dir: PathBuf,
    pub surfaces: Mutex<HashMap<String, Arc<FakeSurface>>>,
    pub output: Arc<CollectingSink>,
}

impl FakeContext {
    /// A context rooted in a fresh temp directory seeded with a manifest,
    /// a localization file, and a page template.
    pub fn new() -> Arc<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "gangplank=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let dir = std::env::temp_dir().join(format!(
            "gangplank-test-{}-{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("package.json"),
            json!({
                "name": "demo-plugin",
                "version": "1.0.0",
                "displayName": "Demo Plugin"
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.join("package.nls.json"),
            json!({ "app.title": "Demo %1" }).to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.join("index.html"),
            r#"<html><head><link href="app.css"></head><body><img src="logo.png"></body></html>"#,
        )
        .unwrap();

        Arc::new(Self {
            dir,
            surfaces: Mutex::new(HashMap::new()),
            output: Arc::new(CollectingSink::default()),
        })
    }

    pub fn surface(&self, view_type: &str) -> Arc<FakeSurface> {
        self.surfaces
            .lock()
            .unwrap()
            .get(view_type)
            .cloned()
            .expect("surface not created")
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

impl HostContext for FakeContext {
    fn extension_path(&self) -> PathBuf {
        self.dir.clone()
    }

    fn create_webview(&self, options: &WebviewOptions) -> Result<Arc<dyn WebviewSurface>> {
        let surface = FakeSurface::new();
        self.surfaces
            .lock()
            .unwrap()
            .insert(options.view_type.clone(), Arc::clone(&surface));
        Ok(surface)
    }

    fn create_output_channel(&self, _name: &str) -> Arc<dyn OutputSink> {
        Arc::clone(&self.output) as Arc<dyn OutputSink>
    }
}

pub struct FakeDom {
    api: OnceHostApi,
    pub reload_keys_suppressed: AtomicBool,
    pub menus: Mutex<HashMap<String, ContextMenuHook>>,
}

impl FakeDom {
    pub fn new(view_type: &str) -> Arc<Self> {
        Arc::new(Self {
            api: OnceHostApi::new(PageHostApi {
                view_type: view_type.to_string(),
                ext_data: json!({ "seed": 1 }),
                i18n: json!({ "page.greeting": "hi %1" }),
                extension_path: "/ext/demo".to_string(),
            }),
            reload_keys_suppressed: AtomicBool::new(false),
            menus: Mutex::new(HashMap::new()),
        })
    }
}

impl PageDom for FakeDom {
    fn ready_state(&self) -> DomReadyState {
        DomReadyState::Complete
    }

    fn on_content_loaded(&self, callback: Box<dyn FnOnce() + Send>) {
        callback();
    }

    fn suppress_reload_keys(&self) {
        self.reload_keys_suppressed.store(true, Ordering::SeqCst);
    }

    fn acquire_host_api(&self) -> Result<PageHostApi> {
        self.api.acquire()
    }

    fn set_context_menu_hook(&self, target: &str, hook: ContextMenuHook) {
        self.menus.lock().unwrap().insert(target.to_string(), hook);
    }

    fn resource_root(&self) -> String {
        "res://demo-page".to_string()
    }
}

/// Bind both directions of the in-process transport between a container
/// and its page. Call before the page's lifecycle driver is first polled.
pub fn wire(
    host: &Arc<HostCoordinator>,
    container: &Arc<WebviewContainer>,
    page: &Arc<PageCoordinator>,
) {
    page.messaging().bind(LocalTransport::new(
        Arc::clone(host) as Arc<dyn MessageEndpoint>
    ));
    container.messaging().bind(LocalTransport::new(
        Arc::clone(page) as Arc<dyn MessageEndpoint>
    ));
}

/// Poll `cond` across scheduler turns; single-threaded tests make this
/// deterministic without wall-clock waits.
pub async fn settle(cond: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    cond()
}
