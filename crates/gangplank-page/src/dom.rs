//! Seams to the browser environment hosting the page.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gangplank_common::{Result, SdkError};

/// Mirror of `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomReadyState {
    Loading,
    Interactive,
    Complete,
}

/// One entry contributed to a context menu.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub label: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl MenuItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            enabled: true,
        }
    }
}

/// A right-click event on a registered DOM target. Hooks contribute into
/// `menu`; an upstream handler may already have attached entries.
#[derive(Debug, Clone)]
pub struct ContextMenuEvent {
    pub target: String,
    pub menu: Vec<MenuItem>,
}

pub type ContextMenuHook = Arc<dyn Fn(&mut ContextMenuEvent) + Send + Sync>;

/// The capability object the bootstrap script exposes to the page,
/// acquired exactly once per page load.
#[derive(Debug, Clone)]
pub struct PageHostApi {
    pub view_type: String,
    pub ext_data: Value,
    pub i18n: Value,
    pub extension_path: String,
}

/// The page's browser environment.
pub trait PageDom: Send + Sync {
    fn ready_state(&self) -> DomReadyState;

    /// Register a one-shot DOM-content-loaded callback. Only consulted
    /// when [`PageDom::ready_state`] still reports `Loading`.
    fn on_content_loaded(&self, callback: Box<dyn FnOnce() + Send>);

    /// Suppress default browser handling of reload/help keys so they
    /// cannot navigate away from the plugin page.
    fn suppress_reload_keys(&self);

    /// Hand out the host capability object. Implementations must fail
    /// with [`SdkError::AlreadyAcquired`] on the second call — acquiring
    /// twice is a programming mistake by the plugin author, surfaced
    /// loudly. [`OnceHostApi`] provides the latch.
    fn acquire_host_api(&self) -> Result<PageHostApi>;

    /// Install or replace the right-click handler for one DOM target.
    fn set_context_menu_hook(&self, target: &str, hook: ContextMenuHook);

    /// Base of the webview resource URI scheme for this page.
    fn resource_root(&self) -> String;
}

/// One-shot acquisition latch backing [`PageDom::acquire_host_api`].
pub struct OnceHostApi {
    api: Mutex<Option<PageHostApi>>,
}

impl OnceHostApi {
    pub fn new(api: PageHostApi) -> Self {
        Self {
            api: Mutex::new(Some(api)),
        }
    }

    pub fn acquire(&self) -> Result<PageHostApi> {
        self.api
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(SdkError::AlreadyAcquired)
    }
}
