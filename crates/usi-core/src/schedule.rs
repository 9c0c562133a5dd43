//! Timing scheduler
//!
//! Maps a declared timing to a concrete lifecycle gate and holds jobs until
//! the page reaches it. The host layer feeds lifecycle transitions in
//! (`ready_state_changed`, `content_loaded`); due jobs come back out in the
//! order they were scheduled. Each job fires exactly once; a drained gate
//! holds nothing afterwards.
//!
//! Jobs are plain data rather than stored closures so the queue stays
//! inspectable and the engine keeps ownership of its side effects.

use crate::types::{ReadyState, Timing};

/// Lifecycle moment a deferred job is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// readyState transition into "interactive".
    Interactive,
    /// The content-loaded event (DOMContentLoaded).
    ContentLoaded,
    /// readyState transition into "complete".
    Complete,
}

/// Deferred-injection queue, generic over the job payload.
#[derive(Debug)]
pub struct Scheduler<T> {
    pending: Vec<(Gate, T)>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Schedule a job for its timing given the current ready state. Returns
    /// the job back when it is already due and should run right now.
    pub fn schedule(&mut self, timing: Timing, state: ReadyState, job: T) -> Option<T> {
        let gate = match timing {
            Timing::DocumentStart => {
                if state != ReadyState::Loading {
                    return Some(job);
                }
                Gate::Interactive
            }
            Timing::DocumentEnd => {
                if state != ReadyState::Loading {
                    return Some(job);
                }
                Gate::ContentLoaded
            }
            Timing::DocumentIdle => {
                if state == ReadyState::Complete {
                    return Some(job);
                }
                Gate::Complete
            }
        };
        self.pending.push((gate, job));
        None
    }

    /// Styles have no timing dimension: inject once the document has left
    /// "loading", else wait for content-loaded.
    pub fn schedule_style(&mut self, state: ReadyState, job: T) -> Option<T> {
        if state != ReadyState::Loading {
            return Some(job);
        }
        self.pending.push((Gate::ContentLoaded, job));
        None
    }

    /// Feed a readyState transition; returns the jobs now due.
    pub fn ready_state_changed(&mut self, state: ReadyState) -> Vec<T> {
        match state {
            ReadyState::Loading => Vec::new(),
            ReadyState::Interactive => self.take(Gate::Interactive),
            ReadyState::Complete => self.take(Gate::Complete),
        }
    }

    /// Feed the content-loaded event; returns the jobs now due.
    pub fn content_loaded(&mut self) -> Vec<T> {
        self.take(Gate::ContentLoaded)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take(&mut self, gate: Gate) -> Vec<T> {
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending.len());
        for (g, job) in self.pending.drain(..) {
            if g == gate {
                due.push(job);
            } else {
                remaining.push((g, job));
            }
        }
        self.pending = remaining;
        due
    }
}
