//! Quiescence-window batching for raw change events.
//!
//! Native sources emit bursts of raw events for a single logical action
//! (an editor save writes a temp file, renames it, touches metadata).
//! The buffer collects such a burst and releases it as one batch once no
//! new event has arrived for the configured window.

use std::time::{Duration, Instant};

use super::event::{ChangeEvent, EventBatch};

/// Accumulates events until the stream has been quiet for `window`.
#[derive(Debug)]
pub struct QuiescenceBuffer {
    /// Events received since the last batch was taken.
    batch: EventBatch,
    /// Arrival time of the most recent event.
    last_arrival: Option<Instant>,
    /// How long the stream must stay quiet before the batch is ready.
    window: Duration,
}

impl QuiescenceBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            batch: EventBatch::new(),
            last_arrival: None,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an event that arrived at `now`.
    ///
    /// Resets the quiescence timer.
    pub fn push(&mut self, event: ChangeEvent, now: Instant) {
        self.batch.push(event);
        self.last_arrival = Some(now);
    }

    /// When the pending batch becomes ready, if anything is pending.
    ///
    /// A window too large to add to the arrival time never elapses.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_arrival.and_then(|at| at.checked_add(self.window))
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Take the batch if its window has elapsed.
    ///
    /// Never returns an empty batch.
    pub fn take(&mut self, now: Instant) -> Option<EventBatch> {
        if !self.is_ready(now) {
            return None;
        }
        self.take_now()
    }

    /// Take whatever is pending regardless of the window.
    pub fn take_now(&mut self) -> Option<EventBatch> {
        self.last_arrival = None;
        if self.batch.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.batch))
    }

    pub fn has_pending(&self) -> bool {
        !self.batch.is_empty()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}
