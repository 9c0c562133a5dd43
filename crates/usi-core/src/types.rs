//! Core type definitions for the injection engine
//!
//! These types map directly to the catalog wire format delivered by the
//! background context and are used throughout the engine.

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Execution Scope
// =============================================================================

/// Execution context a script is injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Runs with the host page's own globals.
    Page,
    /// Runs in the content layer, isolated from the page's globals.
    Content,
    /// Prefer page scope, fall back to content scope on a CSP block.
    Auto,
}

impl Scope {
    /// Parse from a catalog scope key.
    pub fn from_key(s: &str) -> Option<Self> {
        match s {
            "page" => Some(Self::Page),
            "content" => Some(Self::Content),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Content => "content",
            Self::Auto => "auto",
        }
    }
}

// =============================================================================
// Injection Timing
// =============================================================================

/// Document lifecycle milestone gating a script's injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Timing {
    DocumentStart,
    DocumentEnd,
    DocumentIdle,
}

impl Timing {
    /// All timings in document order. Buckets are walked in this order so
    /// start-gated scripts are scheduled before end- and idle-gated ones.
    pub const ALL: [Timing; 3] = [Self::DocumentStart, Self::DocumentEnd, Self::DocumentIdle];

    /// Parse from a catalog timing key.
    pub fn from_key(s: &str) -> Option<Self> {
        match s {
            "document-start" => Some(Self::DocumentStart),
            "document-end" => Some(Self::DocumentEnd),
            "document-idle" => Some(Self::DocumentIdle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentStart => "document-start",
            Self::DocumentEnd => "document-end",
            Self::DocumentIdle => "document-idle",
        }
    }
}

// =============================================================================
// Document Ready State
// =============================================================================

/// Snapshot of `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    /// Parse from the DOM's readyState string.
    pub fn from_dom(s: &str) -> Self {
        match s {
            "loading" => Self::Loading,
            "interactive" => Self::Interactive,
            // Unknown values only appear on exotic hosts; treat them as the
            // terminal state so nothing waits forever.
            _ => Self::Complete,
        }
    }
}

// =============================================================================
// Capabilities (Grants)
// =============================================================================

/// A bridged API function a page-scoped script may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Capability {
    OpenInTab,
    CloseTab,
    SetValue,
    GetValue,
    DeleteValue,
    ListValues,
}

impl Capability {
    /// All capabilities, in the order their aliases appear in the `GM`
    /// namespace of wrapped code.
    pub const ALL: [Capability; 6] = [
        Self::OpenInTab,
        Self::CloseTab,
        Self::SetValue,
        Self::GetValue,
        Self::DeleteValue,
        Self::ListValues,
    ];

    /// Parse a grant name from the catalog.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "openInTab" => Some(Self::OpenInTab),
            "closeTab" => Some(Self::CloseTab),
            "setValue" => Some(Self::SetValue),
            "getValue" => Some(Self::GetValue),
            "deleteValue" => Some(Self::DeleteValue),
            "listValues" => Some(Self::ListValues),
            _ => None,
        }
    }

    /// Alias the capability is exposed under inside the `GM` namespace.
    pub fn alias(&self) -> &'static str {
        match self {
            Self::OpenInTab => "openInTab",
            Self::CloseTab => "closeTab",
            Self::SetValue => "setValue",
            Self::GetValue => "getValue",
            Self::DeleteValue => "deleteValue",
            Self::ListValues => "listValues",
        }
    }

    fn bit(&self) -> CapabilitySet {
        match self {
            Self::OpenInTab => CapabilitySet::OPEN_IN_TAB,
            Self::CloseTab => CapabilitySet::CLOSE_TAB,
            Self::SetValue => CapabilitySet::SET_VALUE,
            Self::GetValue => CapabilitySet::GET_VALUE,
            Self::DeleteValue => CapabilitySet::DELETE_VALUE,
            Self::ListValues => CapabilitySet::LIST_VALUES,
        }
    }
}

bitflags::bitflags! {
    /// Set of capabilities granted to one script.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CapabilitySet: u8 {
        const OPEN_IN_TAB = 1 << 0;
        const CLOSE_TAB = 1 << 1;
        const SET_VALUE = 1 << 2;
        const GET_VALUE = 1 << 3;
        const DELETE_VALUE = 1 << 4;
        const LIST_VALUES = 1 << 5;
    }
}

impl CapabilitySet {
    pub fn grant(&mut self, cap: Capability) {
        self.insert(cap.bit());
    }

    pub fn grants(&self, cap: Capability) -> bool {
        self.contains(cap.bit())
    }

    /// Granted capabilities in alias order.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|cap| self.grants(*cap))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::empty();
        for cap in iter {
            set.grant(cap);
        }
        set
    }
}

/// The catalog carries grants as an array of names. Unrecognized names are
/// reported and dropped rather than failing the whole catalog.
impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let names: Vec<String> = Vec::deserialize(deserializer)?;
        let mut set = Self::empty();
        for name in &names {
            match Capability::from_name(name) {
                Some(cap) => set.grant(cap),
                None => log::warn!("Ignoring unknown grant {name}"),
            }
        }
        Ok(set)
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.capabilities().map(|cap| cap.alias()))
    }
}
