//! Asset injection
//!
//! The engine never touches the DOM itself; everything goes through the
//! [`InjectSink`] seam the host layer implements. `Injector` prepares the
//! payload: styles pass through unchanged, scripts get wrapped in a closed
//! IIFE carrying the capability preamble, the `GM` namespace and a sourceURL
//! marker for stack-trace attribution.

use crate::engine::InjectJob;
use crate::types::{CapabilitySet, Scope};

/// Host-side insertion boundary. Implemented over the real DOM by the wasm
/// layer and by recording fakes in tests.
pub trait InjectSink {
    /// Append a style element with the given text to the document head.
    fn append_style(&mut self, filename: &str, css: &str);
    /// Materialize code as an inline script element in the document body,
    /// running with the page's own globals.
    fn append_page_script(&mut self, filename: &str, code: &str);
    /// Evaluate code directly in the content layer's execution context,
    /// isolated from the page's globals.
    fn eval_in_content(&mut self, filename: &str, code: &str);
}

/// Wrap user code into an executable unit: capability preamble, stub
/// functions, `GM` alias namespace, then the code itself, closed over by an
/// IIFE with a trailing sourceURL comment (whitespace in the filename
/// replaced with hyphens).
pub fn wrap_code(uid: &str, filename: &str, code: &str, grants: CapabilitySet) -> String {
    let mut api = String::new();
    let mut aliases: Vec<String> = Vec::new();
    if !grants.is_empty() {
        // uid and filename land inside string literals; escape so a quote
        // or backslash in a filename cannot terminate them
        api.push_str(&format!(
            "const uid = \"{}\";const filename = \"{}\";",
            uid.escape_default(),
            filename.escape_default()
        ));
    }
    for cap in grants.capabilities() {
        api.push('\n');
        api.push_str(cap.stub_source());
        aliases.push(format!("{}: {}", cap.alias(), cap.stub_name()));
    }
    let gm = format!("const GM = {{{}}};", aliases.join(","));
    let marker: String = filename
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("(function() {{\n{api}\n{gm}\n{code}\n//# sourceURL={marker}\n}})();")
}

/// Performs the actual insertion for one asset.
pub struct Injector<'a, S: InjectSink> {
    uid: &'a str,
    sink: &'a mut S,
}

impl<'a, S: InjectSink> Injector<'a, S> {
    pub fn new(uid: &'a str, sink: &'a mut S) -> Self {
        Self { uid, sink }
    }

    /// No dedup and no removal path; injected styles persist until unload.
    pub fn inject_style(&mut self, filename: &str, code: &str) {
        log::info!("Injecting {filename}");
        self.sink.append_style(filename, code);
    }

    pub fn inject_script(&mut self, filename: &str, code: &str, scope: Scope, grants: CapabilitySet) {
        log::info!("Injecting {filename}");
        let wrapped = wrap_code(self.uid, filename, code, grants);
        if scope == Scope::Content {
            self.sink.eval_in_content(filename, &wrapped);
        } else {
            self.sink.append_page_script(filename, &wrapped);
        }
    }

    /// Execute one job handed back by the engine. Callers run this after
    /// releasing any engine state; injected code executes synchronously and
    /// may dispatch events that feed the engine again.
    pub fn run(&mut self, job: InjectJob) {
        match job {
            InjectJob::Style { filename, code } => self.inject_style(&filename, &code),
            InjectJob::Script {
                filename,
                code,
                scope,
                grants,
            } => self.inject_script(&filename, &code, scope, grants),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_sink {
    use super::InjectSink;

    /// Records every insertion for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub styles: Vec<(String, String)>,
        pub page_scripts: Vec<(String, String)>,
        pub content_scripts: Vec<(String, String)>,
    }

    impl InjectSink for RecordingSink {
        fn append_style(&mut self, filename: &str, css: &str) {
            self.styles.push((filename.to_string(), css.to_string()));
        }

        fn append_page_script(&mut self, filename: &str, code: &str) {
            self.page_scripts.push((filename.to_string(), code.to_string()));
        }

        fn eval_in_content(&mut self, filename: &str, code: &str) {
            self.content_scripts.push((filename.to_string(), code.to_string()));
        }
    }
}
