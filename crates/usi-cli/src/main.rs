//! Userscript Injector CLI
//!
//! Developer tool for inspecting catalog files and previewing the injection
//! plan the engine would execute for them.

use std::fs;

use clap::{Parser, Subcommand};

use usi_core::catalog::Catalog;
use usi_core::inject::{wrap_code, Injector};
use usi_core::{Engine, InjectJob, InjectSink, ReadyState, Scope, Timing};

#[derive(Parser)]
#[command(name = "usi-cli")]
#[command(about = "Userscript catalog inspector and injection-plan preview")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a page load and print the injection plan in execution order
    Plan {
        /// Catalog JSON file
        #[arg(short, long)]
        input: String,

        /// readyState at catalog delivery: loading, interactive or complete
        #[arg(short, long, default_value = "loading")]
        ready_state: String,

        /// Also simulate a script-src CSP violation after delivery
        #[arg(long)]
        csp_fallback: bool,
    },

    /// Validate a catalog file and print its contents summary
    Validate {
        /// Catalog JSON file
        #[arg(short, long)]
        input: String,
    },

    /// Print the wrapped executable unit for one script in the catalog
    Wrap {
        /// Catalog JSON file
        #[arg(short, long)]
        input: String,

        /// Script filename to wrap
        #[arg(short, long)]
        filename: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Plan {
            input,
            ready_state,
            csp_fallback,
        } => cmd_plan(&input, &ready_state, csp_fallback),
        Commands::Validate { input } => cmd_validate(&input),
        Commands::Wrap { input, filename } => cmd_wrap(&input, &filename),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_catalog(path: &str) -> Result<Catalog, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    Catalog::from_json(&content).map_err(|e| e.to_string())
}

fn parse_ready_state(s: &str) -> Result<ReadyState, String> {
    match s {
        "loading" => Ok(ReadyState::Loading),
        "interactive" => Ok(ReadyState::Interactive),
        "complete" => Ok(ReadyState::Complete),
        _ => Err(format!("Unknown ready state '{s}'")),
    }
}

// =============================================================================
// plan
// =============================================================================

/// Records what the engine would inject, tagged with the lifecycle phase it
/// ran in.
#[derive(Default)]
struct PlanSink {
    phase: String,
    rows: Vec<(String, &'static str, String, usize)>,
}

impl PlanSink {
    fn set_phase(&mut self, phase: &str) {
        self.phase = phase.to_string();
    }

    fn run_jobs(&mut self, jobs: Vec<InjectJob>) {
        let mut injector = Injector::new("plan-preview", self);
        for job in jobs {
            injector.run(job);
        }
    }
}

impl InjectSink for PlanSink {
    fn append_style(&mut self, filename: &str, css: &str) {
        self.rows
            .push((self.phase.clone(), "css", filename.to_string(), css.len()));
    }

    fn append_page_script(&mut self, filename: &str, code: &str) {
        self.rows.push((
            self.phase.clone(),
            "js/page",
            filename.to_string(),
            code.len(),
        ));
    }

    fn eval_in_content(&mut self, filename: &str, code: &str) {
        self.rows.push((
            self.phase.clone(),
            "js/content",
            filename.to_string(),
            code.len(),
        ));
    }
}

fn cmd_plan(input: &str, ready_state: &str, csp_fallback: bool) -> Result<(), String> {
    let catalog = load_catalog(input)?;
    let state = parse_ready_state(ready_state)?;

    let mut sink = PlanSink::default();
    let mut engine = Engine::new("plan-preview");

    sink.set_phase("delivery");
    let jobs = engine.attach(catalog, state);
    sink.run_jobs(jobs);

    if csp_fallback {
        sink.set_phase("csp-fallback");
        let jobs = engine.security_policy_violation("script-src", state);
        sink.run_jobs(jobs);
    }

    // walk the remaining lifecycle so deferred assets show up too
    if state == ReadyState::Loading {
        sink.set_phase("interactive");
        let jobs = engine.ready_state_changed(ReadyState::Interactive);
        sink.run_jobs(jobs);
        sink.set_phase("content-loaded");
        let jobs = engine.content_loaded();
        sink.run_jobs(jobs);
    }
    if state != ReadyState::Complete {
        sink.set_phase("complete");
        let jobs = engine.ready_state_changed(ReadyState::Complete);
        sink.run_jobs(jobs);
    }

    if sink.rows.is_empty() {
        println!("Nothing to inject");
        return Ok(());
    }

    println!("{:<16} {:<12} {:<40} {}", "PHASE", "TYPE", "FILE", "BYTES");
    for (phase, kind, filename, bytes) in &sink.rows {
        println!("{phase:<16} {kind:<12} {filename:<40} {bytes}");
    }
    Ok(())
}

// =============================================================================
// validate
// =============================================================================

fn cmd_validate(input: &str) -> Result<(), String> {
    let catalog = load_catalog(input)?;

    println!("Catalog OK");
    println!("  css: {} file(s)", catalog.css.len());
    for scope in [Scope::Page, Scope::Content, Scope::Auto] {
        let buckets = catalog.js.scope_bucket(scope);
        for timing in Timing::ALL {
            let bucket = buckets.bucket(timing);
            if !bucket.is_empty() {
                println!(
                    "  js/{}/{}: {} file(s)",
                    scope.as_str(),
                    timing.as_str(),
                    bucket.len()
                );
            }
        }
    }
    let menu_count: usize = catalog.js.context_menu.values().map(|m| m.len()).sum();
    if menu_count > 0 {
        println!("  js/context-menu: {menu_count} file(s)");
    }
    Ok(())
}

// =============================================================================
// wrap
// =============================================================================

fn cmd_wrap(input: &str, filename: &str) -> Result<(), String> {
    let catalog = load_catalog(input)?;

    for scope in [Scope::Page, Scope::Content, Scope::Auto] {
        let buckets = catalog.js.scope_bucket(scope);
        for timing in Timing::ALL {
            if let Some(entry) = buckets.bucket(timing).get(filename) {
                println!("{}", wrap_code("preview", filename, &entry.code, entry.grants));
                return Ok(());
            }
        }
    }
    if let Some((_, entry)) = catalog.find_context_menu_script(filename) {
        println!("{}", wrap_code("preview", filename, &entry.code, entry.grants));
        return Ok(());
    }
    Err(format!("No script named '{filename}' in the catalog"))
}
