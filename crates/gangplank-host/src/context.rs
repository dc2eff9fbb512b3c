//! Seams to the host IDE.
//!
//! The extension context, webview surfaces, and output channels are
//! primitives the host IDE provides; the coordinator reaches them only
//! through these traits, so embedders adapt whatever host API they run
//! inside (and tests substitute fakes).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gangplank_common::Result;

/// Which template engine renders a local page. Engines other than `None`
/// are external collaborators registered into the
/// [`TemplateRegistry`](crate::html::TemplateRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    #[default]
    None,
    Ejs,
    Pug,
}

/// Configuration for one webview container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebviewOptions {
    /// Unique key; at most one live container per view type.
    pub view_type: String,
    pub title: String,
    /// Where the host should place the surface ("main", "sidebar",
    /// "dialog", …). Interpreted by the host adapter.
    #[serde(default = "default_target_area")]
    pub target_area: String,
    /// Icon path relative to the extension root.
    #[serde(default)]
    pub icon: Option<String>,
    /// Local template reference (relative to the extension root) or a
    /// remote `http(s)` URL, which is wrapped in an iframe shell.
    pub url: String,
    /// Arbitrary data handed to the page through the bootstrap capability.
    #[serde(default)]
    pub ext_data: Value,
    #[serde(default)]
    pub preserve_focus: bool,
    #[serde(default)]
    pub template_engine: TemplateKind,
}

fn default_target_area() -> String {
    "main".to_string()
}

impl WebviewOptions {
    pub fn new(
        view_type: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            view_type: view_type.into(),
            title: title.into(),
            target_area: default_target_area(),
            icon: None,
            url: url.into(),
            ext_data: Value::Null,
            preserve_focus: false,
            template_engine: TemplateKind::None,
        }
    }
}

/// One webview surface of the host IDE (a panel or a view).
pub trait WebviewSurface: Send + Sync {
    fn set_title(&self, title: &str);
    fn set_icon(&self, path: &Path);
    fn set_html(&self, html: &str);
    /// Bring the surface to the front; `preserve_focus` keeps keyboard
    /// focus where it is.
    fn reveal(&self, preserve_focus: bool);
    /// Fire-and-forget broadcast into the page; no delivery guarantee
    /// beyond what the host webview API provides.
    fn post_message(&self, message: Value);
    /// Invoked when the host disposes the surface from its side (e.g. the
    /// user closes the tab).
    fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>);
    fn dispose(&self);
    /// Base of the host's webview resource URI scheme; relative page
    /// references are rewritten under it.
    fn resource_root(&self) -> String;
}

/// A named output channel of the host IDE.
pub trait OutputSink: Send + Sync {
    fn append_line(&self, line: &str);
}

/// The extension context handed to the coordinator at construction.
pub trait HostContext: Send + Sync {
    /// Root directory of the installed extension; the manifest and
    /// localization files live here.
    fn extension_path(&self) -> PathBuf;

    fn locale(&self) -> String {
        "en".to_string()
    }

    fn create_webview(&self, options: &WebviewOptions) -> Result<Arc<dyn WebviewSurface>>;

    fn create_output_channel(&self, name: &str) -> Arc<dyn OutputSink>;
}
