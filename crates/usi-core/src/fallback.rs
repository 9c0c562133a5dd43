//! CSP fallback monitor
//!
//! A page with a strict script-src policy will block the inline script
//! elements used for page-scope injection. That failure is not an exception;
//! it surfaces as a securitypolicyviolation notification. On the first
//! script-related violation the monitor hands back the catalog's `js.auto`
//! subtree for an immediate content-scope re-dispatch, then never again for
//! this page load. Violations can also be raised by other extensions, so the
//! auto bucket being empty (or the catalog not having arrived yet) still
//! consumes the one attempt.

use crate::catalog::Catalog;

/// One-shot fallback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackState {
    #[default]
    Normal,
    Attempted,
}

#[derive(Debug, Default)]
pub struct CspMonitor {
    state: FallbackState,
}

impl CspMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempted(&self) -> bool {
        self.state == FallbackState::Attempted
    }

    /// Observe one policy violation. Returns the subtree to re-dispatch in
    /// fallback mode when this violation qualifies, `None` otherwise.
    pub fn on_violation(
        &mut self,
        effective_directive: &str,
        catalog: Option<&Catalog>,
    ) -> Option<Catalog> {
        if !effective_directive.starts_with("script-src") {
            return None;
        }
        let retry = match (self.state, catalog) {
            (FallbackState::Normal, Some(catalog)) if !catalog.js.auto.is_empty() => {
                Some(catalog.auto_subtree())
            }
            _ => None,
        };
        self.state = FallbackState::Attempted;
        retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_auto() -> Catalog {
        Catalog::from_json(
            r#"{"js": {"auto": {"document-end": {"a.js": {"code": "1", "weight": 0, "grant": []}}}}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_fallback_fires_once() {
        let catalog = catalog_with_auto();
        let mut monitor = CspMonitor::new();

        let retry = monitor.on_violation("script-src", Some(&catalog));
        assert!(retry.is_some());
        assert!(!retry.unwrap().js.auto.is_empty());
        assert!(monitor.attempted());

        // a second violation triggers nothing
        assert!(monitor.on_violation("script-src", Some(&catalog)).is_none());
    }

    #[test]
    fn test_unrelated_directive_is_ignored() {
        let catalog = catalog_with_auto();
        let mut monitor = CspMonitor::new();
        assert!(monitor.on_violation("style-src", Some(&catalog)).is_none());
        assert!(!monitor.attempted());
        // a later script violation still gets its attempt
        assert!(monitor.on_violation("script-src", Some(&catalog)).is_some());
    }

    #[test]
    fn test_script_src_elem_qualifies() {
        let catalog = catalog_with_auto();
        let mut monitor = CspMonitor::new();
        assert!(monitor
            .on_violation("script-src-elem", Some(&catalog))
            .is_some());
    }

    #[test]
    fn test_attempt_consumed_even_without_retry() {
        let catalog = catalog_with_auto();

        // catalog not yet delivered
        let mut monitor = CspMonitor::new();
        assert!(monitor.on_violation("script-src", None).is_none());
        assert!(monitor.attempted());
        assert!(monitor.on_violation("script-src", Some(&catalog)).is_none());

        // empty auto bucket
        let mut monitor = CspMonitor::new();
        let empty = Catalog::default();
        assert!(monitor.on_violation("script-src", Some(&empty)).is_none());
        assert!(monitor.attempted());
    }
}
