//! Userscript Injection Engine Core
//!
//! This crate provides the page-side injection engine for the userscript
//! manager's content layer. Given a catalog of scripts and stylesheets
//! delivered by the privileged background context, it injects each asset at
//! the correct lifecycle timing, in the correct execution scope, in priority
//! order, retries auto-scoped scripts once when blocked by a strict CSP, and
//! models the restricted capability bridge between injected page code and
//! the background.
//!
//! The crate has no browser types. The host page is abstracted behind the
//! `InjectSink` trait plus explicit lifecycle inputs, so the whole engine is
//! testable off-browser; the wasm crate wires it to the real DOM.
//!
//! # Modules
//!
//! - `types`: scope, timing, ready-state and capability definitions
//! - `catalog`: wire model of the delivered catalog
//! - `order`: weight-descending injection ordering
//! - `schedule`: lifecycle gates and the deferred-job queue
//! - `inject`: code wrapping and the host insertion seam
//! - `stubs`: capability stub JS sources
//! - `bridge`: message wire model and the content-side relay
//! - `fallback`: one-shot CSP fallback state machine
//! - `menu`: context-menu registration and run-request resolution
//! - `engine`: the catalog controller tying it all together

pub mod bridge;
pub mod catalog;
pub mod engine;
pub mod fallback;
pub mod inject;
pub mod menu;
pub mod order;
pub mod schedule;
pub mod stubs;
pub mod types;

// Re-export commonly used types
pub use bridge::{BackgroundEvent, BackgroundRequest, PendingCall, Relay, RelayAction};
pub use catalog::{Catalog, CatalogError};
pub use engine::{Engine, InjectJob};
pub use inject::InjectSink;
pub use menu::{MenuDiscovery, PageLocation};
pub use types::{Capability, CapabilitySet, ReadyState, Scope, Timing};
