//! Catalog controller
//!
//! Owns the catalog for one page load and drives the other components: walks
//! css then js by scope, timing and weight, schedules each asset for its
//! lifecycle gate, and hands due jobs back to the caller. The host layer
//! feeds lifecycle transitions, CSP violations and context-menu requests in;
//! everything else is internal.
//!
//! Entry points return the due [`InjectJob`]s instead of executing them.
//! Injected code runs synchronously and can itself dispatch lifecycle
//! events, so the host must be free to re-enter the engine while a job
//! executes; it runs the returned jobs through an [`Injector`] only after
//! releasing whatever guards its engine state.
//!
//! The catalog is written exactly once at attach and only read afterwards.
//! The CSP fallback path re-dispatches a derived copy of `js.auto` with
//! every scope forced to `content`, bypassing the timing gates (a reactive
//! retry is by definition already past them).

use crate::catalog::Catalog;
use crate::fallback::CspMonitor;
use crate::menu::{self, MenuDiscovery, MenuRegistrar, PageLocation};
use crate::order::sort_by_weight;
use crate::schedule::Scheduler;
use crate::types::{CapabilitySet, ReadyState, Scope, Timing};

/// One injection, either due now or held by the scheduler until its gate.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectJob {
    Style {
        filename: String,
        code: String,
    },
    Script {
        filename: String,
        code: String,
        scope: Scope,
        grants: CapabilitySet,
    },
}

/// The page-side injection engine. One instance per page load.
pub struct Engine {
    uid: String,
    catalog: Option<Catalog>,
    scheduler: Scheduler<InjectJob>,
    csp: CspMonitor,
    menu: MenuRegistrar,
}

impl Engine {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            catalog: None,
            scheduler: Scheduler::new(),
            csp: CspMonitor::new(),
            menu: MenuRegistrar::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    pub fn fallback_attempted(&self) -> bool {
        self.csp.attempted()
    }

    /// Receive the catalog. An empty catalog is valid and injects nothing;
    /// a second delivery is ignored. Returns the jobs due immediately.
    pub fn attach(&mut self, catalog: Catalog, state: ReadyState) -> Vec<InjectJob> {
        if self.catalog.is_some() {
            log::debug!("Catalog already attached, ignoring");
            return Vec::new();
        }
        let mut due = Vec::new();
        if !catalog.is_empty() {
            self.load(&catalog, state, false, &mut due);
        }
        self.catalog = Some(catalog);
        due
    }

    /// Walk the catalog; schedule everything, collecting the jobs that are
    /// already due (in fallback mode, all of them).
    fn load(
        &mut self,
        catalog: &Catalog,
        state: ReadyState,
        fallback: bool,
        due: &mut Vec<InjectJob>,
    ) {
        for (filename, entry) in sort_by_weight(catalog.css.iter(), |e| e.weight) {
            let job = InjectJob::Style {
                filename: filename.clone(),
                code: entry.code.clone(),
            };
            if let Some(job) = self.scheduler.schedule_style(state, job) {
                due.push(job);
            }
        }
        for scope in [Scope::Page, Scope::Content, Scope::Auto] {
            let buckets = catalog.js.scope_bucket(scope);
            for timing in Timing::ALL {
                let bucket = buckets.bucket(timing);
                if bucket.is_empty() {
                    continue;
                }
                for (filename, entry) in sort_by_weight(bucket.iter(), |e| e.weight) {
                    let scope = if fallback {
                        log::warn!("Attempting fallback injection for {filename}");
                        Scope::Content
                    } else {
                        scope
                    };
                    let job = InjectJob::Script {
                        filename: filename.clone(),
                        code: entry.code.clone(),
                        scope,
                        grants: entry.grants,
                    };
                    if fallback {
                        // a reactive retry is already past its timing gate
                        due.push(job);
                    } else if let Some(job) = self.scheduler.schedule(timing, state, job) {
                        due.push(job);
                    }
                }
            }
        }
    }

    /// Feed a document readyState transition; returns the jobs now due.
    pub fn ready_state_changed(&mut self, state: ReadyState) -> Vec<InjectJob> {
        self.scheduler.ready_state_changed(state)
    }

    /// Feed the content-loaded event; returns the jobs now due.
    pub fn content_loaded(&mut self) -> Vec<InjectJob> {
        self.scheduler.content_loaded()
    }

    /// Feed a security-policy violation. At most one fallback re-dispatch
    /// happens per page load; its jobs come back for immediate execution.
    pub fn security_policy_violation(
        &mut self,
        effective_directive: &str,
        state: ReadyState,
    ) -> Vec<InjectJob> {
        let mut due = Vec::new();
        if let Some(subtree) = self.csp.on_violation(effective_directive, self.catalog.as_ref()) {
            self.load(&subtree, state, true, &mut due);
        }
        due
    }

    /// Resolve a context-menu run request into an immediate job. Top frame
    /// only; a missing filename is a silent miss. The script's declared
    /// timing is ignored.
    pub fn context_menu_run(&mut self, menu_item_id: &str, is_top_frame: bool) -> Option<InjectJob> {
        if !is_top_frame {
            return None;
        }
        let catalog = self.catalog.as_ref()?;
        let run = menu::resolve_run_request(catalog, menu_item_id, self.csp.attempted())?;
        Some(InjectJob::Script {
            filename: run.filename,
            code: run.code,
            scope: run.scope,
            grants: run.grants,
        })
    }

    /// Enumerate context-menu entries for registration on a right-click.
    pub fn discover_menu_items(
        &self,
        location: &PageLocation,
        is_top_frame: bool,
    ) -> MenuDiscovery {
        let Some(catalog) = self.catalog.as_ref() else {
            return MenuDiscovery::NotEligible;
        };
        self.menu.discover(catalog, location, is_top_frame)
    }

    pub fn platform(&self) -> Option<&str> {
        self.menu.platform()
    }

    pub fn set_platform(&mut self, platform: impl Into<String>) {
        self.menu.set_platform(platform);
    }

    /// Record a created menu entry; true when the frame's beforeunload
    /// listener still needs to be installed.
    pub fn register_menu_item(&mut self, menu_item_id: &str) -> bool {
        self.menu.register(menu_item_id)
    }

    /// Menu ids to remove with the background on unload.
    pub fn unload_removals(&self) -> &[String] {
        self.menu.unload_removals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::test_sink::RecordingSink;
    use crate::inject::Injector;

    fn catalog(json: &str) -> Catalog {
        Catalog::from_json(json).unwrap()
    }

    fn names(records: &[(String, String)]) -> Vec<&str> {
        records.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn execute(jobs: Vec<InjectJob>, sink: &mut RecordingSink) {
        let mut injector = Injector::new("uid1", sink);
        for job in jobs {
            injector.run(job);
        }
    }

    #[test]
    fn test_complete_page_injects_immediately() {
        // end-to-end: css and idle-timed page js on an already-complete page
        let mut sink = RecordingSink::default();
        let mut engine = Engine::new("uid1");
        let jobs = engine.attach(
            catalog(
                r#"{
                    "css": {"a.css": {"code": "body{color:red}", "weight": 1}},
                    "js": {"page": {"document-idle": {
                        "b.js": {"code": "console.log(1)", "weight": 5, "grant": []}
                    }}}
                }"#,
            ),
            ReadyState::Complete,
        );
        execute(jobs, &mut sink);
        assert_eq!(names(&sink.styles), vec!["a.css"]);
        assert_eq!(names(&sink.page_scripts), vec!["b.js"]);
        assert!(sink.page_scripts[0].1.contains("console.log(1)"));
    }

    #[test]
    fn test_weight_order_within_bucket() {
        let mut sink = RecordingSink::default();
        let mut engine = Engine::new("uid1");
        let jobs = engine.attach(
            catalog(
                r#"{"js": {"page": {"document-idle": {
                    "low.js": {"code": "1", "weight": 1, "grant": []},
                    "high.js": {"code": "2", "weight": 10, "grant": []},
                    "mid.js": {"code": "3", "weight": 5, "grant": []}
                }}}}"#,
            ),
            ReadyState::Complete,
        );
        execute(jobs, &mut sink);
        assert_eq!(names(&sink.page_scripts), vec!["high.js", "mid.js", "low.js"]);
    }

    #[test]
    fn test_equal_weight_ties_are_lexicographic() {
        let mut sink = RecordingSink::default();
        let mut engine = Engine::new("uid1");
        let jobs = engine.attach(
            catalog(
                r#"{"js": {"page": {"document-idle": {
                    "z.js": {"code": "1", "weight": 0, "grant": []},
                    "a.js": {"code": "2", "weight": 0, "grant": []},
                    "m.js": {"code": "3", "weight": 0, "grant": []}
                }}}}"#,
            ),
            ReadyState::Complete,
        );
        execute(jobs, &mut sink);
        assert_eq!(names(&sink.page_scripts), vec!["a.js", "m.js", "z.js"]);
    }

    #[test]
    fn test_deferred_injection_fires_once_per_gate() {
        let mut sink = RecordingSink::default();
        let mut engine = Engine::new("uid1");
        let jobs = engine.attach(
            catalog(
                r#"{
                    "css": {"s.css": {"code": "x", "weight": 0}},
                    "js": {
                        "page": {
                            "document-start": {"start.js": {"code": "1", "weight": 0, "grant": []}},
                            "document-end": {"end.js": {"code": "2", "weight": 0, "grant": []}},
                            "document-idle": {"idle.js": {"code": "3", "weight": 0, "grant": []}}
                        }
                    }
                }"#,
            ),
            ReadyState::Loading,
        );
        assert!(jobs.is_empty());

        execute(engine.ready_state_changed(ReadyState::Interactive), &mut sink);
        assert_eq!(names(&sink.page_scripts), vec!["start.js"]);

        execute(engine.content_loaded(), &mut sink);
        assert_eq!(names(&sink.page_scripts), vec!["start.js", "end.js"]);
        assert_eq!(names(&sink.styles), vec!["s.css"]);

        execute(engine.ready_state_changed(ReadyState::Complete), &mut sink);
        assert_eq!(
            names(&sink.page_scripts),
            vec!["start.js", "end.js", "idle.js"]
        );

        // no gate fires twice
        assert!(engine.ready_state_changed(ReadyState::Complete).is_empty());
        assert!(engine.content_loaded().is_empty());
    }

    #[test]
    fn test_reentrant_lifecycle_event_during_injection() {
        // an injected script can synchronously dispatch the next lifecycle
        // event while an earlier batch is still executing; no engine state
        // is held across execution, so the nested call simply yields the
        // next batch
        let mut sink = RecordingSink::default();
        let mut engine = Engine::new("uid1");
        let jobs = engine.attach(
            catalog(
                r#"{"js": {"page": {
                    "document-start": {"start.js": {"code": "1", "weight": 0, "grant": []}},
                    "document-idle": {"idle.js": {"code": "2", "weight": 0, "grant": []}}
                }}}"#,
            ),
            ReadyState::Loading,
        );
        assert!(jobs.is_empty());

        let first = engine.ready_state_changed(ReadyState::Interactive);
        // before the first batch runs, its script's synchronous side effect
        // pushes the document straight to complete
        let nested = engine.ready_state_changed(ReadyState::Complete);
        execute(first, &mut sink);
        execute(nested, &mut sink);
        assert_eq!(names(&sink.page_scripts), vec!["start.js", "idle.js"]);
    }

    #[test]
    fn test_empty_catalog_is_fine() {
        let mut engine = Engine::new("uid1");
        assert!(engine.attach(Catalog::default(), ReadyState::Loading).is_empty());
        assert!(engine.ready_state_changed(ReadyState::Complete).is_empty());
    }

    #[test]
    fn test_second_attach_is_ignored() {
        let mut engine = Engine::new("uid1");
        let c = catalog(
            r#"{"js": {"page": {"document-idle": {"a.js": {"code": "1", "weight": 0, "grant": []}}}}}"#,
        );
        assert_eq!(engine.attach(c.clone(), ReadyState::Complete).len(), 1);
        assert!(engine.attach(c, ReadyState::Complete).is_empty());
    }

    #[test]
    fn test_csp_fallback_reinjects_auto_into_content() {
        let mut sink = RecordingSink::default();
        let mut engine = Engine::new("uid1");
        let jobs = engine.attach(
            catalog(
                r#"{"js": {
                    "auto": {"document-idle": {"auto.js": {"code": "1", "weight": 0, "grant": []}}},
                    "page": {"document-idle": {"page.js": {"code": "2", "weight": 0, "grant": []}}}
                }}"#,
            ),
            ReadyState::Complete,
        );
        execute(jobs, &mut sink);
        // auto prefers page scope on the first pass
        assert_eq!(names(&sink.page_scripts), vec!["page.js", "auto.js"]);
        assert!(sink.content_scripts.is_empty());

        let retry = engine.security_policy_violation("script-src", ReadyState::Complete);
        execute(retry, &mut sink);
        // only the auto subtree retries, in content scope, immediately
        assert_eq!(names(&sink.content_scripts), vec!["auto.js"]);
        assert_eq!(sink.page_scripts.len(), 2);
        assert!(engine.fallback_attempted());

        // second violation changes nothing
        assert!(engine
            .security_policy_violation("script-src", ReadyState::Complete)
            .is_empty());
    }

    #[test]
    fn test_fallback_bypasses_timing_gate() {
        let mut sink = RecordingSink::default();
        let mut engine = Engine::new("uid1");
        let jobs = engine.attach(
            catalog(
                r#"{"js": {"auto": {"document-idle": {"auto.js": {"code": "1", "weight": 0, "grant": []}}}}}"#,
            ),
            ReadyState::Loading,
        );
        assert!(jobs.is_empty());

        // violation arrives while still loading; the retry runs immediately
        let retry = engine.security_policy_violation("script-src", ReadyState::Loading);
        execute(retry, &mut sink);
        assert_eq!(names(&sink.content_scripts), vec!["auto.js"]);
    }

    #[test]
    fn test_unrelated_violation_is_ignored() {
        let mut engine = Engine::new("uid1");
        engine.attach(
            catalog(
                r#"{"js": {"auto": {"document-end": {"a.js": {"code": "1", "weight": 0, "grant": []}}}}}"#,
            ),
            ReadyState::Complete,
        );
        assert!(engine
            .security_policy_violation("img-src", ReadyState::Complete)
            .is_empty());
        assert!(!engine.fallback_attempted());
    }

    #[test]
    fn test_context_menu_run() {
        let mut sink = RecordingSink::default();
        let mut engine = Engine::new("uid1");
        engine.attach(
            catalog(
                r#"{"js": {"context-menu": {
                    "auto": {"menu.js": {"code": "menuCode()", "name": "Menu", "grant": []}}
                }}}"#,
            ),
            ReadyState::Loading,
        );

        // nested frames never run menu scripts
        assert!(engine
            .context_menu_run("https://example.com&$&menu.js", false)
            .is_none());

        // runs immediately even though the page is still loading
        let job = engine
            .context_menu_run("https://example.com&$&menu.js", true)
            .unwrap();
        execute(vec![job], &mut sink);
        assert_eq!(names(&sink.page_scripts), vec!["menu.js"]);

        // user-triggered scripts may run repeatedly
        assert!(engine
            .context_menu_run("https://example.com&$&menu.js", true)
            .is_some());

        // lookup miss is silent
        assert!(engine
            .context_menu_run("https://example.com&$&gone.js", true)
            .is_none());
    }

    #[test]
    fn test_context_menu_run_respects_fallback_state() {
        let mut engine = Engine::new("uid1");
        engine.attach(
            catalog(
                r#"{"js": {
                    "auto": {"document-end": {"a.js": {"code": "1", "weight": 0, "grant": []}}},
                    "context-menu": {"auto": {"menu.js": {"code": "2", "name": "Menu", "grant": []}}}
                }}"#,
            ),
            ReadyState::Complete,
        );
        engine.security_policy_violation("script-src", ReadyState::Complete);
        let job = engine
            .context_menu_run("https://example.com&$&menu.js", true)
            .unwrap();
        let InjectJob::Script { scope, .. } = job else {
            panic!("expected a script job");
        };
        assert_eq!(scope, Scope::Content);
    }
}
