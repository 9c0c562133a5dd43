//! WebAssembly content-script bindings for the injection engine
//!
//! Wires the pure engine in `usi-core` to the real page: DOM insertion for
//! the `InjectSink` seam, lifecycle and boundary event listeners, and the
//! `browser.runtime` message channel to the privileged background. All state
//! lives in thread-locals; a content script runs on a single thread for the
//! lifetime of one page load.

use std::cell::RefCell;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MessageEvent, SecurityPolicyViolationEvent};

use usi_core::bridge::{CatalogResponse, PlatformResponse};
use usi_core::inject::Injector;
use usi_core::menu::MenuItem;
use usi_core::{
    BackgroundEvent, BackgroundRequest, Engine, InjectJob, InjectSink, MenuDiscovery,
    PageLocation, ReadyState, Relay, RelayAction,
};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["browser", "runtime"], js_name = sendMessage, catch)]
    fn runtime_send_message(message: &JsValue) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["browser", "runtime", "onMessage"], js_name = addListener)]
    fn runtime_add_listener(callback: &JsValue);
}

thread_local! {
    static UID: String = new_uid();
    static ENGINE: RefCell<Engine> = RefCell::new(Engine::new(UID.with(String::clone)));
    static RELAY: Relay = Relay::new(UID.with(String::clone));
}

/// Random 8-character base-36 token, unique per page load.
fn new_uid() -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut uid = String::with_capacity(8);
    for _ in 0..8 {
        let index = (js_sys::Math::random() * DIGITS.len() as f64) as usize % DIGITS.len();
        uid.push(DIGITS[index] as char);
    }
    uid
}

// =============================================================================
// JS boundary helpers
// =============================================================================

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&json)
}

fn from_js<T: serde::de::DeserializeOwned>(value: &JsValue) -> Option<T> {
    let json = js_sys::JSON::stringify(value).ok()?;
    let json = String::from(json);
    serde_json::from_str(&json).ok()
}

/// Forward a request over the extension message channel; the callback runs
/// with the background's response. Failures degrade to a dropped call, never
/// a page-breaking error.
fn send_to_background<F>(request: &BackgroundRequest, on_response: F)
where
    F: FnMut(JsValue) + 'static,
{
    let Ok(message) = to_js(request) else { return };
    let Ok(promise) = runtime_send_message(&message) else {
        return;
    };
    let closure = Closure::wrap(Box::new(on_response) as Box<dyn FnMut(JsValue)>);
    let _ = promise.then(&closure);
    closure.forget();
}

fn current_ready_state() -> ReadyState {
    web_sys::window()
        .and_then(|w| w.document())
        .map(|d| ReadyState::from_dom(&d.ready_state()))
        .unwrap_or(ReadyState::Complete)
}

fn is_top_frame() -> bool {
    let Some(window) = web_sys::window() else {
        return false;
    };
    match window.top() {
        Ok(Some(top)) => js_sys::Object::is(window.as_ref(), top.as_ref()),
        _ => false,
    }
}

fn page_location() -> Option<PageLocation> {
    let location = web_sys::window()?.location();
    Some(PageLocation {
        protocol: location.protocol().ok()?,
        hostname: location.hostname().ok()?,
        pathname: location.pathname().ok()?,
    })
}

// =============================================================================
// DOM insertion sink
// =============================================================================

/// `InjectSink` over the live document.
struct DomSink;

impl InjectSink for DomSink {
    fn append_style(&mut self, _filename: &str, css: &str) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let (Ok(tag), Some(head)) = (document.create_element("style"), document.head()) else {
            return;
        };
        tag.set_text_content(Some(css));
        let _ = head.append_child(&tag);
    }

    fn append_page_script(&mut self, _filename: &str, code: &str) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let (Ok(tag), Some(body)) = (document.create_element("script"), document.body()) else {
            return;
        };
        tag.set_text_content(Some(code));
        let _ = body.append_child(&tag);
    }

    fn eval_in_content(&mut self, filename: &str, code: &str) {
        if let Err(err) = js_sys::eval(code) {
            web_sys::console::error_2(&JsValue::from_str(&format!("Error running {filename}")), &err);
        }
    }
}

// =============================================================================
// Console logging
// =============================================================================

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let line = JsValue::from_str(&record.args().to_string());
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

// =============================================================================
// Event handlers
// =============================================================================

/// Run due jobs against the live document. Injected code executes
/// synchronously and can dispatch events that land back in the handlers
/// above, so this must only be called after the `ENGINE` borrow has ended.
fn execute_jobs(jobs: Vec<InjectJob>) {
    if jobs.is_empty() {
        return;
    }
    let uid = UID.with(String::clone);
    let mut sink = DomSink;
    let mut injector = Injector::new(&uid, &mut sink);
    for job in jobs {
        injector.run(job);
    }
}

fn on_ready_state_change() {
    let state = current_ready_state();
    let jobs = ENGINE.with(|e| e.borrow_mut().ready_state_changed(state));
    execute_jobs(jobs);
}

fn on_content_loaded() {
    let jobs = ENGINE.with(|e| e.borrow_mut().content_loaded());
    execute_jobs(jobs);
}

fn on_security_policy_violation(event: SecurityPolicyViolationEvent) {
    let state = current_ready_state();
    let jobs = ENGINE.with(|e| {
        e.borrow_mut()
            .security_policy_violation(&event.effective_directive(), state)
    });
    execute_jobs(jobs);
}

fn on_page_message(event: MessageEvent) {
    let Some(raw) = from_js::<serde_json::Value>(&event.data()) else {
        return;
    };
    match RELAY.with(|relay| relay.handle_page_message(&raw)) {
        Some(RelayAction::RoundTrip { forward, reply }) => {
            let mut reply = Some(reply);
            send_to_background(&forward, move |response| {
                let Some(reply) = reply.take() else { return };
                let response =
                    from_js::<serde_json::Value>(&response).unwrap_or(serde_json::Value::Null);
                let page_response = reply.into_response(response);
                let (Some(window), Ok(message)) = (web_sys::window(), to_js(&page_response))
                else {
                    return;
                };
                let _ = window.post_message(&message, "*");
            });
        }
        Some(RelayAction::Forward { forward }) => send_to_background(&forward, |_| {}),
        None => {}
    }
}

fn on_runtime_message(request: JsValue) {
    let Some(event) = from_js::<BackgroundEvent>(&request) else {
        return;
    };
    match event {
        BackgroundEvent::ContextRun { menu_item_id } => {
            let top = is_top_frame();
            let job = ENGINE.with(|e| e.borrow_mut().context_menu_run(&menu_item_id, top));
            if let Some(job) = job {
                execute_jobs(vec![job]);
            }
        }
    }
}

fn on_context_menu() {
    if current_ready_state() == ReadyState::Complete {
        discover_menu_items();
        return;
    }
    // urls can change while the page is loading; register once the final
    // url is known
    let Some(window) = web_sys::window() else { return };
    let closure = Closure::wrap(Box::new(move |_: web_sys::Event| discover_menu_items())
        as Box<dyn FnMut(web_sys::Event)>);
    let _ = window.add_event_listener_with_callback("load", closure.as_ref().unchecked_ref());
    closure.forget();
}

fn discover_menu_items() {
    let top = is_top_frame();
    let Some(location) = page_location() else { return };
    let discovery = ENGINE.with(|e| e.borrow().discover_menu_items(&location, top));
    match discovery {
        MenuDiscovery::NotEligible => {}
        MenuDiscovery::PlatformUnknown => {
            send_to_background(&BackgroundRequest::RequestPlatform, move |response| {
                let Some(parsed) = from_js::<PlatformResponse>(&response) else {
                    return;
                };
                if let Some(error) = parsed.error {
                    log::error!("{error}");
                }
                if let Some(platform) = parsed.platform {
                    ENGINE.with(|e| e.borrow_mut().set_platform(platform));
                    discover_menu_items();
                }
            });
        }
        MenuDiscovery::Items(items) => register_menu_items(items),
    }
}

fn register_menu_items(items: Vec<MenuItem>) {
    for item in items {
        let menu_item_id = item.menu_item_id.clone();
        let request = BackgroundRequest::ContextCreate {
            menu_item_id: item.menu_item_id,
            title: item.title,
            url: item.url,
        };
        send_to_background(&request, move |_response| {
            let install = ENGINE.with(|e| e.borrow_mut().register_menu_item(&menu_item_id));
            if install {
                install_beforeunload_listener();
            }
        });
    }
}

fn install_beforeunload_listener() {
    let Some(window) = web_sys::window() else { return };
    let closure = Closure::wrap(Box::new(move |_: web_sys::Event| {
        let ids = ENGINE.with(|e| e.borrow().unload_removals().to_vec());
        for menu_item_id in ids {
            send_to_background(&BackgroundRequest::ContextRemove { menu_item_id }, |_| {});
        }
    }) as Box<dyn FnMut(web_sys::Event)>);
    let _ = window.add_event_listener_with_callback("beforeunload", closure.as_ref().unchecked_ref());
    closure.forget();
}

// =============================================================================
// Wiring
// =============================================================================

fn listen<F>(target: &web_sys::EventTarget, name: &str, handler: F)
where
    F: FnMut(web_sys::Event) + 'static,
{
    let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(web_sys::Event)>);
    let _ = target.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
    closure.forget();
}

#[wasm_bindgen(start)]
pub fn start() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }

    let Some(window) = web_sys::window() else { return };
    let Some(document) = window.document() else { return };

    listen(&document, "readystatechange", |_| on_ready_state_change());
    listen(&document, "DOMContentLoaded", |_| on_content_loaded());
    listen(&document, "securitypolicyviolation", |event| {
        if let Ok(event) = event.dyn_into::<SecurityPolicyViolationEvent>() {
            on_security_policy_violation(event);
        }
    });
    listen(&document, "contextmenu", |_| on_context_menu());
    listen(&window, "message", |event| {
        if let Ok(event) = event.dyn_into::<MessageEvent>() {
            on_page_message(event);
        }
    });

    let runtime_callback =
        Closure::wrap(Box::new(on_runtime_message) as Box<dyn FnMut(JsValue)>);
    runtime_add_listener(runtime_callback.as_ref());
    runtime_callback.forget();

    // request the catalog immediately
    send_to_background(&BackgroundRequest::RequestUserscripts, |response| {
        let Some(parsed) = from_js::<CatalogResponse>(&response) else {
            return;
        };
        let state = current_ready_state();
        let jobs = ENGINE.with(|e| e.borrow_mut().attach(parsed.code, state));
        execute_jobs(jobs);
    });
}
