//! Context-menu registrar
//!
//! Context-menu scripts are user-triggered: on a right-click in the top
//! frame their filenames are registered with the background as menu entries,
//! keyed by a normalized URL so the identity survives query-parameter churn.
//! The menu item id round-trips through the background; on a run request the
//! filename is recovered by splitting on the separator. The feature is
//! restricted to macOS hosts; the platform identity is queried from the
//! background once and cached.

use crate::catalog::Catalog;
use crate::types::{CapabilitySet, Scope};

/// Separator joining normalized URL and filename inside a menu item id.
/// Must stay stable for interop with the background; it cannot occur in a
/// legitimate URL or filename.
pub const MENU_ID_SEPARATOR: &str = "&$&";

/// The only host platform with context-menu OS integration.
const MENU_PLATFORM: &str = "macos";

/// The pieces of `window.location` menu identity is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    /// Including the trailing colon, e.g. `https:`.
    pub protocol: String,
    pub hostname: String,
    pub pathname: String,
}

/// Protocol + hostname + pathname, with a single trailing slash stripped
/// when the path is longer than the root. Query and fragment are deliberately
/// excluded.
pub fn normalize_url(location: &PageLocation) -> String {
    let mut pathname = location.pathname.as_str();
    if pathname.len() > 1 && pathname.ends_with('/') {
        pathname = &pathname[..pathname.len() - 1];
    }
    format!("{}//{}{}", location.protocol, location.hostname, pathname)
}

/// Deterministic menu item id: `<normalized-url>&$&<filename>`.
pub fn menu_item_id(normalized_url: &str, filename: &str) -> String {
    format!("{normalized_url}{MENU_ID_SEPARATOR}{filename}")
}

/// Recover the filename from a menu item id.
pub fn filename_from_menu_item_id(menu_item_id: &str) -> Option<&str> {
    menu_item_id
        .split_once(MENU_ID_SEPARATOR)
        .map(|(_, filename)| filename)
}

/// One menu entry to create with the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub menu_item_id: String,
    pub title: String,
    pub url: String,
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuDiscovery {
    /// Nested frame or unsupported platform; nothing to do.
    NotEligible,
    /// The platform has not been resolved yet; query the background and
    /// retry with the answer cached.
    PlatformUnknown,
    /// Menu entries to register.
    Items(Vec<MenuItem>),
}

/// A context-menu script resolved for immediate execution.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuRun {
    pub filename: String,
    pub code: String,
    pub scope: Scope,
    pub grants: CapabilitySet,
}

/// Resolve a background run request against the catalog. A filename no
/// longer present is a silent miss. When the CSP fallback has fired,
/// auto-scoped scripts are forced into content scope.
pub fn resolve_run_request(
    catalog: &Catalog,
    menu_item_id: &str,
    fallback_attempted: bool,
) -> Option<MenuRun> {
    let filename = filename_from_menu_item_id(menu_item_id)?;
    let (scope, entry) = catalog.find_context_menu_script(filename)?;
    let scope = if fallback_attempted && scope == Scope::Auto {
        log::warn!("Attempting fallback injection for {filename}");
        Scope::Content
    } else {
        scope
    };
    Some(MenuRun {
        filename: filename.to_string(),
        code: entry.code.clone(),
        scope,
        grants: entry.grants,
    })
}

/// Tracks the cached platform, the registered menu ids, and the one-shot
/// beforeunload registration for this frame.
#[derive(Debug, Default)]
pub struct MenuRegistrar {
    platform: Option<String>,
    beforeunload_installed: bool,
    registered: Vec<String>,
}

impl MenuRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn set_platform(&mut self, platform: impl Into<String>) {
        self.platform = Some(platform.into());
    }

    /// Enumerate the catalog's context-menu scripts for registration.
    pub fn discover(
        &self,
        catalog: &Catalog,
        location: &PageLocation,
        is_top_frame: bool,
    ) -> MenuDiscovery {
        if !is_top_frame {
            return MenuDiscovery::NotEligible;
        }
        match self.platform.as_deref() {
            None => return MenuDiscovery::PlatformUnknown,
            Some(MENU_PLATFORM) => {}
            Some(_) => return MenuDiscovery::NotEligible,
        }
        let url = normalize_url(location);
        let mut items = Vec::new();
        for scripts in catalog.js.context_menu.values() {
            for (filename, entry) in scripts {
                items.push(MenuItem {
                    menu_item_id: menu_item_id(&url, filename),
                    title: entry.name.clone(),
                    url: url.clone(),
                });
            }
        }
        MenuDiscovery::Items(items)
    }

    /// Record a created menu entry. Returns true when this registration must
    /// also install the frame's single beforeunload listener.
    pub fn register(&mut self, menu_item_id: &str) -> bool {
        if !self.registered.iter().any(|id| id == menu_item_id) {
            self.registered.push(menu_item_id.to_string());
        }
        if self.beforeunload_installed {
            return false;
        }
        self.beforeunload_installed = true;
        true
    }

    /// Menu ids to remove with the background when the page unloads. A
    /// refresh recreates every entry, so removal of all of them is correct.
    pub fn unload_removals(&self) -> &[String] {
        &self.registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(pathname: &str) -> PageLocation {
        PageLocation {
            protocol: "https:".to_string(),
            hostname: "example.com".to_string(),
            pathname: pathname.to_string(),
        }
    }

    fn menu_catalog() -> Catalog {
        Catalog::from_json(
            r#"{"js": {"context-menu": {
                "auto": {"auto.js": {"code": "1", "name": "Auto Item", "grant": []}},
                "page": {"page.js": {"code": "2", "name": "Page Item", "grant": []}}
            }}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_url_strips_single_trailing_slash() {
        assert_eq!(normalize_url(&location("/path/")), "https://example.com/path");
        assert_eq!(normalize_url(&location("/path")), "https://example.com/path");
        // the root path is left alone
        assert_eq!(normalize_url(&location("/")), "https://example.com/");
    }

    #[test]
    fn test_menu_item_id_round_trip() {
        let url = normalize_url(&location("/path/"));
        let id = menu_item_id(&url, "foo.js");
        assert_eq!(id, "https://example.com/path&$&foo.js");
        assert_eq!(filename_from_menu_item_id(&id), Some("foo.js"));
        assert_eq!(filename_from_menu_item_id("no-separator"), None);
    }

    #[test]
    fn test_discover_gating() {
        let catalog = menu_catalog();
        let mut registrar = MenuRegistrar::new();

        assert_eq!(
            registrar.discover(&catalog, &location("/"), false),
            MenuDiscovery::NotEligible
        );
        assert_eq!(
            registrar.discover(&catalog, &location("/"), true),
            MenuDiscovery::PlatformUnknown
        );

        registrar.set_platform("ios");
        assert_eq!(
            registrar.discover(&catalog, &location("/"), true),
            MenuDiscovery::NotEligible
        );

        registrar.set_platform("macos");
        let MenuDiscovery::Items(items) = registrar.discover(&catalog, &location("/p/"), true)
        else {
            panic!("expected items");
        };
        let ids: Vec<_> = items.iter().map(|i| i.menu_item_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "https://example.com/p&$&auto.js",
                "https://example.com/p&$&page.js"
            ]
        );
        assert_eq!(items[0].title, "Auto Item");
    }

    #[test]
    fn test_beforeunload_installed_once() {
        let mut registrar = MenuRegistrar::new();
        assert!(registrar.register("u&$&a.js"));
        assert!(!registrar.register("u&$&b.js"));
        assert!(!registrar.register("u&$&a.js"));
        assert_eq!(registrar.unload_removals(), &["u&$&a.js", "u&$&b.js"]);
    }

    #[test]
    fn test_resolve_run_request() {
        let catalog = menu_catalog();

        let run = resolve_run_request(&catalog, "https://example.com/p&$&page.js", false).unwrap();
        assert_eq!(run.scope, Scope::Page);
        assert_eq!(run.code, "2");

        // auto scope forced to content once the fallback has fired
        let run = resolve_run_request(&catalog, "https://example.com/p&$&auto.js", true).unwrap();
        assert_eq!(run.scope, Scope::Content);
        let run = resolve_run_request(&catalog, "https://example.com/p&$&auto.js", false).unwrap();
        assert_eq!(run.scope, Scope::Auto);

        // lookup miss is silent
        assert!(resolve_run_request(&catalog, "https://example.com/p&$&gone.js", false).is_none());
        assert!(resolve_run_request(&catalog, "garbage", false).is_none());
    }
}
