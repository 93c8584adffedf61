use std::time::{Duration, Instant};

use crate::native::RawEvent;

/// Collects raw events that arrive within one latency window
///
/// Window opens with the first pending event. Consecutive events for
/// the same path are merged into one with combined flags.
#[derive(Debug)]
pub(crate) struct Coalescer {
    latency: Duration,
    pending: Vec<RawEvent>,
    deadline: Option<Instant>,
}

impl Coalescer {
    pub fn new(latency: Duration) -> Self {
        Coalescer {
            latency,
            pending: vec![],
            deadline: None,
        }
    }

    pub fn push(&mut self, event: RawEvent, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.latency);
        }
        match self.pending.last_mut() {
            Some(last) if last.path == event.path => last.flags |= event.flags,
            _ => self.pending.push(event),
        }
    }

    /// Time left until current window expires, `idle` if nothing is pending
    pub fn timeout(&self, now: Instant, idle: Duration) -> Duration {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(idle)
    }

    /// Returns collected batch if window has expired
    pub fn flush_due(&mut self, now: Instant) -> Option<Vec<RawEvent>> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Returns collected batch regardless of window
    pub fn flush(&mut self) -> Option<Vec<RawEvent>> {
        self.deadline = None;
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
