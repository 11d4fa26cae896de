//! Cool-down gate that refuses requests for a while after a reset.

use core::ops::Add;
use core::time::Duration;

use crate::telemetry::TelemetryInstant;

/// One-shot blocking window; re-engaging restarts it.
#[derive(Copy, Clone, Debug)]
pub struct CooldownGate<Instant> {
    ready_at: Option<Instant>,
}

impl<Instant> CooldownGate<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    #[must_use]
    pub const fn new() -> Self {
        Self { ready_at: None }
    }

    /// Blocks until `now + window`, replacing any running window.
    pub fn engage(&mut self, now: Instant, window: Duration) -> Instant {
        let deadline = now + window;
        self.ready_at = Some(deadline);
        deadline
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.ready_at.is_some()
    }

    /// Instant at which the gate opens again, if it is closed.
    #[must_use]
    pub fn ready_at(&self) -> Option<Instant> {
        self.ready_at
    }

    /// Opens the gate once its window has elapsed. Returns `true` on the poll
    /// that released it.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.ready_at {
            Some(deadline) if now >= deadline => {
                self.ready_at = None;
                true
            }
            _ => false,
        }
    }
}

impl<Instant> CooldownGate<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant> + TelemetryInstant,
{
    /// Time left in the window, `None` when the gate is open or its window
    /// has already elapsed.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.ready_at
            .filter(|&deadline| deadline > now)
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

impl<Instant> Default for CooldownGate<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    fn default() -> Self {
        Self::new()
    }
}
