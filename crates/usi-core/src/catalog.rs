//! Catalog model
//!
//! The background context delivers one catalog per page load, pre-filtered
//! to the scripts and styles matching the page URL. The catalog is received
//! once, owned by the engine, and never mutated afterwards; the CSP fallback
//! path works on a derived copy instead.
//!
//! Buckets are `BTreeMap`s keyed by filename, so iteration order (and the
//! equal-weight tie-break downstream) is lexicographic regardless of how the
//! background serialized the catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{CapabilitySet, Scope, Timing};

/// Error type for catalog decoding.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Malformed catalog: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One stylesheet delivered by the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleEntry {
    pub code: String,
    #[serde(default)]
    pub weight: f64,
}

/// One lifecycle-injected script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub code: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default, rename = "grant", alias = "grants")]
    pub grants: CapabilitySet,
}

/// One context-menu script, executed on explicit user invocation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub code: String,
    /// Human-readable menu title.
    pub name: String,
    #[serde(default, rename = "grant", alias = "grants")]
    pub grants: CapabilitySet,
}

/// Scripts of one scope, separated by timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingBuckets {
    #[serde(default, rename = "document-start")]
    pub document_start: BTreeMap<String, ScriptEntry>,
    #[serde(default, rename = "document-end")]
    pub document_end: BTreeMap<String, ScriptEntry>,
    #[serde(default, rename = "document-idle")]
    pub document_idle: BTreeMap<String, ScriptEntry>,
}

impl TimingBuckets {
    pub fn bucket(&self, timing: Timing) -> &BTreeMap<String, ScriptEntry> {
        match timing {
            Timing::DocumentStart => &self.document_start,
            Timing::DocumentEnd => &self.document_end,
            Timing::DocumentIdle => &self.document_idle,
        }
    }

    pub fn is_empty(&self) -> bool {
        Timing::ALL.iter().all(|t| self.bucket(*t).is_empty())
    }
}

/// The `js` section: lifecycle scopes plus the context-menu subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsCatalog {
    #[serde(default)]
    pub page: TimingBuckets,
    #[serde(default)]
    pub content: TimingBuckets,
    #[serde(default)]
    pub auto: TimingBuckets,
    /// Keyed by scope, then filename. Not lifecycle-timed.
    #[serde(default, rename = "context-menu")]
    pub context_menu: BTreeMap<String, BTreeMap<String, MenuEntry>>,
}

impl JsCatalog {
    pub fn scope_bucket(&self, scope: Scope) -> &TimingBuckets {
        match scope {
            Scope::Page => &self.page,
            Scope::Content => &self.content,
            Scope::Auto => &self.auto,
        }
    }
}

/// The full set of assets delivered to one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub css: BTreeMap<String, StyleEntry>,
    #[serde(default)]
    pub js: JsCatalog,
}

impl Catalog {
    /// Decode a catalog from its JSON wire form. Missing or empty sections
    /// are legitimate, not errors.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.css.is_empty()
            && self.js.page.is_empty()
            && self.js.content.is_empty()
            && self.js.auto.is_empty()
            && self.js.context_menu.is_empty()
    }

    /// Derived catalog holding only the `js.auto` subtree, used by the CSP
    /// fallback re-dispatch. The original catalog is left untouched.
    pub fn auto_subtree(&self) -> Catalog {
        Catalog {
            css: BTreeMap::new(),
            js: JsCatalog {
                auto: self.js.auto.clone(),
                ..JsCatalog::default()
            },
        }
    }

    /// Locate a context-menu script by filename, scanning all scopes.
    /// Scope keys that don't parse are skipped.
    pub fn find_context_menu_script(&self, filename: &str) -> Option<(Scope, &MenuEntry)> {
        for (scope_key, scripts) in &self.js.context_menu {
            let Some(scope) = Scope::from_key(scope_key) else {
                continue;
            };
            if let Some(entry) = scripts.get(filename) {
                return Some((scope, entry));
            }
        }
        None
    }
}
