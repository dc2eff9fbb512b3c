//! Page HTML assembly: templating, the bootstrap capability script, and
//! resource-reference rewriting.
//!
//! Template rendering itself is an external collaborator behind
//! [`TemplateEngine`]; the SDK only ships the passthrough engine for
//! [`TemplateKind::None`]. What the SDK does own is the bootstrap script
//! injected into every locally-rendered page and the rewriting of relative
//! `src`/`href` references onto the host's webview resource scheme.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use serde_json::Value;

use gangplank_common::{Result, SdkError};

use crate::context::TemplateKind;

/// Renders a page template with `{ "l10n": …, "extData": … }`.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, source: &str, data: &Value) -> Result<String>;
}

/// The `TemplateKind::None` engine: the source is already HTML.
pub struct PassthroughTemplate;

impl TemplateEngine for PassthroughTemplate {
    fn render(&self, source: &str, _data: &Value) -> Result<String> {
        Ok(source.to_string())
    }
}

/// Engine lookup by [`TemplateKind`]. `None` is always present; ejs/pug
/// must be registered by the embedder before a container asks for them.
pub struct TemplateRegistry {
    engines: HashMap<TemplateKind, Arc<dyn TemplateEngine>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        let mut engines: HashMap<TemplateKind, Arc<dyn TemplateEngine>> = HashMap::new();
        engines.insert(TemplateKind::None, Arc::new(PassthroughTemplate));
        Self { engines }
    }

    pub fn register(&mut self, kind: TemplateKind, engine: Arc<dyn TemplateEngine>) {
        self.engines.insert(kind, engine);
    }

    pub fn get(&self, kind: TemplateKind) -> Result<Arc<dyn TemplateEngine>> {
        self.engines.get(&kind).cloned().ok_or_else(|| {
            SdkError::Template(format!("no template engine registered for {kind:?}"))
        })
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn js_literal(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// The script injected at the head of every locally-templated page.
///
/// Defines the global factory `acquirePluginHost()` returning a frozen
/// object with the four read-only accessors; a second invocation throws.
pub fn bootstrap_script(
    view_type: &str,
    ext_data: &Value,
    l10n: &Value,
    extension_path: &str,
) -> String {
    format!(
        r#"<script>
(function () {{
    var acquired = false;
    var api = Object.freeze({{
        getViewType: function () {{ return {view_type}; }},
        getExtData: function () {{ return {ext_data}; }},
        getI18n: function () {{ return {l10n}; }},
        getExtensionPath: function () {{ return {extension_path}; }}
    }});
    window.acquirePluginHost = function () {{
        if (acquired) {{
            throw new Error('acquirePluginHost() may only be called once per page load');
        }}
        acquired = true;
        return api;
    }};
}})();
</script>"#,
        view_type = js_literal(&Value::String(view_type.to_string())),
        ext_data = js_literal(ext_data),
        l10n = js_literal(l10n),
        extension_path = js_literal(&Value::String(extension_path.to_string())),
    )
}

/// Insert the bootstrap script right after `<head…>`, or after `<html…>`,
/// or at the very top when neither tag is present.
pub fn inject_bootstrap(html: &str, script: &str) -> String {
    for tag in ["<head", "<html"] {
        if let Some(start) = find_tag(html, tag) {
            if let Some(end) = html[start..].find('>') {
                let at = start + end + 1;
                return format!("{}{}{}", &html[..at], script, &html[at..]);
            }
        }
    }
    format!("{script}{html}")
}

fn find_tag(html: &str, tag: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    lower.find(tag)
}

/// Rewrite relative `src`/`href` attribute values under `resource_root`.
/// Absolute references (a scheme, `//`, `#`, `data:`) are left alone.
pub fn rewrite_resource_refs(html: &str, resource_root: &str) -> String {
    static ATTR_RE: OnceLock<Regex> = OnceLock::new();
    static SCHEME_RE: OnceLock<Regex> = OnceLock::new();
    let attr_re = ATTR_RE
        .get_or_init(|| Regex::new(r#"(?i)\b(src|href)\s*=\s*"([^"]*)""#).expect("attr regex"));
    let scheme_re = SCHEME_RE
        .get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*:").expect("scheme regex"));

    let root = resource_root.trim_end_matches('/');
    attr_re
        .replace_all(html, |caps: &Captures<'_>| {
            let attr = &caps[1];
            let value = &caps[2];
            if value.is_empty()
                || value.starts_with('#')
                || value.starts_with("//")
                || scheme_re.is_match(value)
            {
                return caps[0].to_string();
            }
            let trimmed = value.trim_start_matches("./").trim_start_matches('/');
            format!(r#"{attr}="{root}/{trimmed}""#)
        })
        .into_owned()
}

/// Shell document embedding a remote page instead of inlining it.
pub fn iframe_shell(url: &str) -> String {
    let escaped = url.replace('"', "&quot;");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<style>html, body, iframe {{ margin: 0; padding: 0; border: 0; width: 100%; height: 100%; }}</style>
</head>
<body>
<iframe src="{escaped}" allow="clipboard-read; clipboard-write"></iframe>
</body>
</html>"#
    )
}
