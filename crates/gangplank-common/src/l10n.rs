//! Localization tables.
//!
//! Localized strings live next to the manifest as `package.nls.json` files,
//! keyed by locale. The table is loaded once per process; lookups never
//! fail — a missing key localizes to the empty string.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

/// A flat `key -> string` localization table.
#[derive(Debug, Clone, Default)]
pub struct L10nTable {
    entries: HashMap<String, String>,
}

impl L10nTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from a JSON object. Nested objects flatten with dotted
    /// keys; non-string leaves are skipped.
    pub fn from_value(value: &Value) -> Self {
        let mut entries = HashMap::new();
        flatten_into(&mut entries, "", value);
        Self { entries }
    }

    /// Load the table for `locale` from `dir`, falling back through
    /// `package.nls.<locale>.json` → `package.nls.<lang>.json` →
    /// `package.nls.json` → empty. Missing or unparseable files are not
    /// errors; they fall through the chain.
    pub fn load(dir: &Path, locale: &str) -> Self {
        let locale = locale.to_ascii_lowercase();
        let lang = locale
            .split(['-', '_'])
            .next()
            .unwrap_or(&locale)
            .to_string();

        let mut candidates = vec![format!("package.nls.{locale}.json")];
        if lang != locale {
            candidates.push(format!("package.nls.{lang}.json"));
        }
        candidates.push("package.nls.json".to_string());

        for candidate in candidates {
            let path = dir.join(&candidate);
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    tracing::debug!(file = %candidate, "localization table loaded");
                    return Self::from_value(&value);
                }
                Err(e) => {
                    tracing::warn!(file = %candidate, error = %e, "unparseable localization file skipped");
                }
            }
        }
        Self::empty()
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up `key` and substitute positional placeholders `%1`..`%9` with
    /// `args`. A missing key resolves to the empty string, never an error.
    /// `%%` escapes a literal percent sign; placeholders without a matching
    /// argument stay verbatim.
    pub fn localize(&self, key: &str, args: &[&str]) -> String {
        let Some(template) = self.lookup(key) else {
            return String::new();
        };
        substitute(template, args)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The table as a JSON object, for embedding into the page bootstrap.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

fn flatten_into(entries: &mut HashMap<String, String>, prefix: &str, value: &Value) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, value) in map {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::String(s) => {
                entries.insert(full_key, s.clone());
            }
            Value::Object(_) => flatten_into(entries, &full_key, value),
            _ => {}
        }
    }
}

fn substitute(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(d @ '1'..='9') => {
                let index = d.to_digit(10).unwrap() as usize - 1;
                if let Some(arg) = args.get(index) {
                    chars.next();
                    out.push_str(arg);
                } else {
                    out.push('%');
                }
            }
            _ => out.push('%'),
        }
    }
    out
}
