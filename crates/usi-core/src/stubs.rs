//! Capability stub sources
//!
//! Each granted capability embeds one of these function sources into the
//! wrapped page-scope code. A stub posts a request across the page boundary
//! tagged with the page-load uid and resolves with the relayed response;
//! value-store stubs additionally match on the originating filename so one
//! script's call never resolves with another script's response. Every stub
//! removes its own one-time listener after a match.
//!
//! The `uid` and `filename` constants the stubs reference are provided by
//! the injection preamble (see `inject::wrap_code`).

use crate::types::Capability;

const OPEN_IN_TAB: &str = r#"function GM_openInTab(url, openInBackground) {
    return new Promise(resolve => {
        const callback = e => {
            if (e.data.id !== uid || e.data.name !== "RESP_OPEN_TAB") return;
            resolve(e.data.response);
            window.removeEventListener("message", callback);
        };
        window.addEventListener("message", callback);
        const active = openInBackground === true ? false : true;
        window.postMessage({id: uid, name: "API_OPEN_TAB", url: url, active: active});
    });
}"#;

const CLOSE_TAB: &str = r#"function GM_closeTab() {
    window.postMessage({id: uid, name: "API_CLOSE_TAB"});
}"#;

const SET_VALUE: &str = r#"function GM_setValue(key, value) {
    return new Promise(resolve => {
        const callback = e => {
            if (e.data.id !== uid || e.data.name !== "RESP_SET_VALUE" || e.data.filename !== filename) return;
            resolve(e.data.response);
            window.removeEventListener("message", callback);
        };
        window.addEventListener("message", callback);
        window.postMessage({id: uid, name: "API_SET_VALUE", filename: filename, key: key, value: value});
    });
}"#;

const GET_VALUE: &str = r#"function GM_getValue(key, defaultValue) {
    return new Promise(resolve => {
        const callback = e => {
            if (e.data.id !== uid || e.data.name !== "RESP_GET_VALUE" || e.data.filename !== filename) return;
            resolve(e.data.response);
            window.removeEventListener("message", callback);
        };
        window.addEventListener("message", callback);
        window.postMessage({id: uid, name: "API_GET_VALUE", filename: filename, key: key, defaultValue: defaultValue});
    });
}"#;

const DELETE_VALUE: &str = r#"function GM_deleteValue(key) {
    return new Promise(resolve => {
        const callback = e => {
            if (e.data.id !== uid || e.data.name !== "RESP_DELETE_VALUE" || e.data.filename !== filename) return;
            resolve(e.data.response);
            window.removeEventListener("message", callback);
        };
        window.addEventListener("message", callback);
        window.postMessage({id: uid, name: "API_DELETE_VALUE", filename: filename, key: key});
    });
}"#;

const LIST_VALUES: &str = r#"function GM_listValues() {
    return new Promise(resolve => {
        const callback = e => {
            if (e.data.id !== uid || e.data.name !== "RESP_LIST_VALUES" || e.data.filename !== filename) return;
            resolve(e.data.response);
            window.removeEventListener("message", callback);
        };
        window.addEventListener("message", callback);
        window.postMessage({id: uid, name: "API_LIST_VALUES", filename: filename});
    });
}"#;

impl Capability {
    /// JS source of the stub function for this capability.
    pub fn stub_source(&self) -> &'static str {
        match self {
            Self::OpenInTab => OPEN_IN_TAB,
            Self::CloseTab => CLOSE_TAB,
            Self::SetValue => SET_VALUE,
            Self::GetValue => GET_VALUE,
            Self::DeleteValue => DELETE_VALUE,
            Self::ListValues => LIST_VALUES,
        }
    }

    /// Name of the stub function registered under the `GM` alias.
    pub fn stub_name(&self) -> &'static str {
        match self {
            Self::OpenInTab => "GM_openInTab",
            Self::CloseTab => "GM_closeTab",
            Self::SetValue => "GM_setValue",
            Self::GetValue => "GM_getValue",
            Self::DeleteValue => "GM_deleteValue",
            Self::ListValues => "GM_listValues",
        }
    }
}
