//! Debouncing state machine for live search.
//!
//! Text changes arrive in bursts. The [`Debouncer`] waits for a quiet
//! period before dispatching one search, tags each dispatch with a
//! monotonically increasing generation, and only accepts the response
//! whose generation is the latest one dispatched (last writer wins).
//!
//! ```text
//!            on_change            poll (deadline passed)
//!   Idle ─────────────▶ Pending ─────────────────────────▶ InFlight
//!    ▲                    ▲                                   │
//!    │                    └────────── on_change ──────────────┤
//!    └──────────── on_response(latest generation) ────────────┘
//! ```
//!
//! Nothing is ever aborted: superseded requests run to completion and their
//! results are dropped by [`Debouncer::on_response`]. Time is supplied by the
//! caller, so the machine is runtime-agnostic and deterministic in tests.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Externally visible state of the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// No timer armed, no request outstanding for the latest generation.
    Idle,
    /// A change is waiting for the quiescence window to elapse.
    Pending,
    /// The latest dispatched request has not answered yet.
    InFlight,
}

/// A search request the caller must now issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub generation: u64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    text: String,
    deadline: Option<Instant>,
    latest_generation: u64,
    outstanding: BTreeSet<u64>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            text: String::new(),
            deadline: None,
            latest_generation: 0,
            outstanding: BTreeSet::new(),
        }
    }

    /// Record a text change and restart the quiescence timer.
    pub fn on_change(&mut self, text: impl Into<String>, now: Instant) {
        self.text = text.into();
        self.deadline = Some(now + self.window);
    }

    /// When the armed timer expires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Emit a dispatch if the quiescence window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Dispatch> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.latest_generation += 1;
                self.outstanding.insert(self.latest_generation);
                Some(Dispatch {
                    generation: self.latest_generation,
                    text: self.text.clone(),
                })
            }
            _ => None,
        }
    }

    /// Deliver the response for `generation`.
    ///
    /// Returns the result only when `generation` is the latest dispatched
    /// one and has not been answered before; everything else is stale.
    pub fn on_response<T>(&mut self, generation: u64, result: T) -> Option<T> {
        let was_outstanding = self.outstanding.remove(&generation);
        if was_outstanding && generation == self.latest_generation {
            Some(result)
        } else {
            tracing::debug!(
                generation,
                latest = self.latest_generation,
                "discarding stale search response"
            );
            None
        }
    }

    pub fn state(&self) -> DebounceState {
        if self.deadline.is_some() {
            DebounceState::Pending
        } else if self.outstanding.contains(&self.latest_generation) {
            DebounceState::InFlight
        } else {
            DebounceState::Idle
        }
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest_generation
    }

    /// Number of dispatched requests whose responses are still awaited.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
