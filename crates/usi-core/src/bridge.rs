//! Capability bridge
//!
//! Two-sided relay between page-scope injected code and the privileged
//! background. The page side is JS text (see `stubs`); this module owns the
//! wire model and the content-side half: filter incoming page messages by
//! the page-load uid, forward them to the background, and relay the response
//! back tagged so the originating stub (and only it) resolves.
//!
//! Every message direction is a closed `name`-tagged enum, so an unknown
//! tag fails decoding instead of being silently dispatched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Page -> Content
// =============================================================================

/// Envelope around a capability request posted by a stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMessage {
    /// Page-load-unique correlation id.
    pub id: String,
    #[serde(flatten)]
    pub request: PageRequest,
}

/// Capability request bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum PageRequest {
    #[serde(rename = "API_OPEN_TAB")]
    OpenTab { url: String, active: bool },
    #[serde(rename = "API_CLOSE_TAB")]
    CloseTab,
    #[serde(rename = "API_SET_VALUE")]
    SetValue {
        filename: String,
        key: String,
        value: Value,
    },
    #[serde(rename = "API_GET_VALUE", rename_all = "camelCase")]
    GetValue {
        filename: String,
        key: String,
        #[serde(default)]
        default_value: Value,
    },
    #[serde(rename = "API_DELETE_VALUE")]
    DeleteValue { filename: String, key: String },
    #[serde(rename = "API_LIST_VALUES")]
    ListValues { filename: String },
}

// =============================================================================
// Content -> Background
// =============================================================================

/// Requests sent over the extension message channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum BackgroundRequest {
    #[serde(rename = "REQ_USERSCRIPTS")]
    RequestUserscripts,
    #[serde(rename = "REQ_PLATFORM")]
    RequestPlatform,
    #[serde(rename = "CONTEXT_CREATE", rename_all = "camelCase")]
    ContextCreate {
        menu_item_id: String,
        title: String,
        url: String,
    },
    #[serde(rename = "CONTEXT_REMOVE", rename_all = "camelCase")]
    ContextRemove { menu_item_id: String },
    #[serde(rename = "API_OPEN_TAB")]
    OpenTab { url: String, active: bool },
    #[serde(rename = "API_CLOSE_TAB")]
    CloseTab,
    #[serde(rename = "API_SET_VALUE")]
    SetValue {
        filename: String,
        key: String,
        value: Value,
    },
    #[serde(rename = "API_GET_VALUE", rename_all = "camelCase")]
    GetValue {
        filename: String,
        key: String,
        #[serde(default)]
        default_value: Value,
    },
    #[serde(rename = "API_DELETE_VALUE")]
    DeleteValue { filename: String, key: String },
    #[serde(rename = "API_LIST_VALUES")]
    ListValues { filename: String },
}

/// Background response to `REQ_USERSCRIPTS`.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogResponse {
    pub code: crate::catalog::Catalog,
}

/// Background response to `REQ_PLATFORM`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformResponse {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// Background -> Content
// =============================================================================

/// Unsolicited messages from the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum BackgroundEvent {
    #[serde(rename = "CONTEXT_RUN", rename_all = "camelCase")]
    ContextRun { menu_item_id: String },
}

// =============================================================================
// Content -> Page
// =============================================================================

/// Envelope around a relayed response posted back to the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    pub id: String,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum ResponsePayload {
    #[serde(rename = "RESP_OPEN_TAB")]
    OpenTab { response: Value },
    #[serde(rename = "RESP_SET_VALUE")]
    SetValue { filename: String, response: Value },
    #[serde(rename = "RESP_GET_VALUE")]
    GetValue { filename: String, response: Value },
    #[serde(rename = "RESP_DELETE_VALUE")]
    DeleteValue { filename: String, response: Value },
    #[serde(rename = "RESP_LIST_VALUES")]
    ListValues { filename: String, response: Value },
}

impl ResponsePayload {
    /// Wire tag of this response.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::OpenTab { .. } => "RESP_OPEN_TAB",
            Self::SetValue { .. } => "RESP_SET_VALUE",
            Self::GetValue { .. } => "RESP_GET_VALUE",
            Self::DeleteValue { .. } => "RESP_DELETE_VALUE",
            Self::ListValues { .. } => "RESP_LIST_VALUES",
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::OpenTab { .. } => None,
            Self::SetValue { filename, .. }
            | Self::GetValue { filename, .. }
            | Self::DeleteValue { filename, .. }
            | Self::ListValues { filename, .. } => Some(filename),
        }
    }
}

// =============================================================================
// Pending call correlation
// =============================================================================

/// Expected-response state for one in-flight capability call. Mirrors the
/// matching rule compiled into the stubs: correlation id, response tag, and
/// (for value-store calls) filename equality.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub id: String,
    pub tag: &'static str,
    pub filename: Option<String>,
}

impl PendingCall {
    /// Build the pending state a stub would hold for this request. Returns
    /// `None` for fire-and-forget requests (`closeTab`).
    pub fn for_request(uid: &str, request: &PageRequest) -> Option<Self> {
        let (tag, filename) = match request {
            PageRequest::OpenTab { .. } => ("RESP_OPEN_TAB", None),
            PageRequest::CloseTab => return None,
            PageRequest::SetValue { filename, .. } => ("RESP_SET_VALUE", Some(filename.clone())),
            PageRequest::GetValue { filename, .. } => ("RESP_GET_VALUE", Some(filename.clone())),
            PageRequest::DeleteValue { filename, .. } => {
                ("RESP_DELETE_VALUE", Some(filename.clone()))
            }
            PageRequest::ListValues { filename } => ("RESP_LIST_VALUES", Some(filename.clone())),
        };
        Some(Self {
            id: uid.to_string(),
            tag,
            filename,
        })
    }

    pub fn matches(&self, response: &PageResponse) -> bool {
        if response.id != self.id || response.payload.tag() != self.tag {
            return false;
        }
        match &self.filename {
            Some(filename) => response.payload.filename() == Some(filename.as_str()),
            None => true,
        }
    }
}

// =============================================================================
// Content-side relay
// =============================================================================

/// What to do with one accepted page message.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayAction {
    /// Forward to the background and post the response back with `reply`.
    RoundTrip {
        forward: BackgroundRequest,
        reply: ReplyTemplate,
    },
    /// Forward to the background; no response crosses back.
    Forward { forward: BackgroundRequest },
}

/// Everything needed to build the page response once the background answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyTemplate {
    id: String,
    kind: ReplyKind,
}

#[derive(Debug, Clone, PartialEq)]
enum ReplyKind {
    OpenTab,
    SetValue(String),
    GetValue(String),
    DeleteValue(String),
    ListValues(String),
}

impl ReplyTemplate {
    pub fn into_response(self, response: Value) -> PageResponse {
        let payload = match self.kind {
            ReplyKind::OpenTab => ResponsePayload::OpenTab { response },
            ReplyKind::SetValue(filename) => ResponsePayload::SetValue { filename, response },
            ReplyKind::GetValue(filename) => ResponsePayload::GetValue { filename, response },
            ReplyKind::DeleteValue(filename) => {
                ResponsePayload::DeleteValue { filename, response }
            }
            ReplyKind::ListValues(filename) => ResponsePayload::ListValues { filename, response },
        };
        PageResponse {
            id: self.id,
            payload,
        }
    }
}

/// The single content-side boundary listener.
#[derive(Debug, Clone)]
pub struct Relay {
    uid: String,
}

impl Relay {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Filter one raw message from the page boundary. Messages not addressed
    /// to this page load, without a recognized tag, or failing the request's
    /// own sanity checks are dropped.
    pub fn handle_page_message(&self, raw: &Value) -> Option<RelayAction> {
        if raw.get("id").and_then(Value::as_str) != Some(self.uid.as_str()) {
            return None;
        }
        let message: PageMessage = match serde_json::from_value(raw.clone()) {
            Ok(message) => message,
            Err(err) => {
                log::debug!("Dropping unrecognized page message: {err}");
                return None;
            }
        };
        let id = message.id;
        let action = match message.request {
            PageRequest::OpenTab { url, active } => {
                // requests that don't supply a url are ignored
                if url.is_empty() {
                    return None;
                }
                RelayAction::RoundTrip {
                    forward: BackgroundRequest::OpenTab { url, active },
                    reply: ReplyTemplate {
                        id,
                        kind: ReplyKind::OpenTab,
                    },
                }
            }
            PageRequest::CloseTab => RelayAction::Forward {
                forward: BackgroundRequest::CloseTab,
            },
            PageRequest::SetValue {
                filename,
                key,
                value,
            } => RelayAction::RoundTrip {
                forward: BackgroundRequest::SetValue {
                    filename: filename.clone(),
                    key,
                    value,
                },
                reply: ReplyTemplate {
                    id,
                    kind: ReplyKind::SetValue(filename),
                },
            },
            PageRequest::GetValue {
                filename,
                key,
                default_value,
            } => RelayAction::RoundTrip {
                forward: BackgroundRequest::GetValue {
                    filename: filename.clone(),
                    key,
                    default_value,
                },
                reply: ReplyTemplate {
                    id,
                    kind: ReplyKind::GetValue(filename),
                },
            },
            PageRequest::DeleteValue { filename, key } => RelayAction::RoundTrip {
                forward: BackgroundRequest::DeleteValue {
                    filename: filename.clone(),
                    key,
                },
                reply: ReplyTemplate {
                    id,
                    kind: ReplyKind::DeleteValue(filename),
                },
            },
            PageRequest::ListValues { filename } => RelayAction::RoundTrip {
                forward: BackgroundRequest::ListValues {
                    filename: filename.clone(),
                },
                reply: ReplyTemplate {
                    id,
                    kind: ReplyKind::ListValues(filename),
                },
            },
        };
        Some(action)
    }
}
