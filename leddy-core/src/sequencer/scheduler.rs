//! Deadline-driven toggle scheduler.
//!
//! The scheduler never sleeps on its own: the owning event loop asks for
//! [`ToggleScheduler::next_deadline`], waits until then, and calls
//! [`ToggleScheduler::poll`]. Each firing flips the relay once and the next
//! firing is scheduled one interval after the current instant, so late polls
//! never bunch toggles together.

use core::ops::Add;
use core::time::Duration;

use super::RelayDriver;

/// Result of polling the scheduler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome<Instant> {
    /// No sequence is armed.
    Idle,
    /// Armed, but the next firing is still in the future.
    Waiting,
    /// The relay was flipped and more toggles remain.
    Toggled { relay_on: bool, remaining: u16 },
    /// The final firing ran; the scheduler is idle again.
    Completed {
        /// Relay level after the final firing, `None` when it fired without toggling.
        relay_on: Option<bool>,
        toggles: u16,
        armed_at: Instant,
    },
}

/// Snapshot of a sequence that was cancelled or replaced before finishing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AbandonedSequence<Instant> {
    pub toggles: u16,
    pub remaining: u16,
    pub armed_at: Instant,
}

#[derive(Copy, Clone, Debug)]
struct ArmedSequence<Instant> {
    toggles: u16,
    remaining: u16,
    interval: Duration,
    armed_at: Instant,
    next_fire: Instant,
}

/// Recurring relay toggler armed with a fixed toggle count.
#[derive(Copy, Clone, Debug)]
pub struct ToggleScheduler<Instant> {
    armed: Option<ArmedSequence<Instant>>,
}

impl<Instant> ToggleScheduler<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    #[must_use]
    pub const fn new() -> Self {
        Self { armed: None }
    }

    /// Starts a sequence of `count` toggles, the first one `interval` after `now`.
    ///
    /// Any in-flight sequence is dropped without completing; it is returned so
    /// the caller can record what was abandoned.
    pub fn arm(
        &mut self,
        count: u16,
        interval: Duration,
        now: Instant,
    ) -> Option<AbandonedSequence<Instant>> {
        let abandoned = self.cancel();
        self.armed = Some(ArmedSequence {
            toggles: count,
            remaining: count,
            interval,
            armed_at: now,
            next_fire: now + interval,
        });
        abandoned
    }

    /// Stops the in-flight sequence, if any, without completing it.
    pub fn cancel(&mut self) -> Option<AbandonedSequence<Instant>> {
        self.armed.take().map(|sequence| AbandonedSequence {
            toggles: sequence.toggles,
            remaining: sequence.remaining,
            armed_at: sequence.armed_at,
        })
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Toggles still outstanding (zero when idle).
    #[must_use]
    pub fn remaining(&self) -> u16 {
        self.armed.map_or(0, |sequence| sequence.remaining)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed.map(|sequence| sequence.next_fire)
    }

    #[must_use]
    pub fn armed_at(&self) -> Option<Instant> {
        self.armed.map(|sequence| sequence.armed_at)
    }

    /// Runs at most one firing if its deadline has passed.
    pub fn poll<R>(&mut self, now: Instant, relay: &mut R) -> TickOutcome<Instant>
    where
        R: RelayDriver + ?Sized,
    {
        let Some(mut sequence) = self.armed else {
            return TickOutcome::Idle;
        };

        if now < sequence.next_fire {
            return TickOutcome::Waiting;
        }

        let relay_on = (sequence.remaining > 0).then(|| relay.toggle());
        sequence.remaining = sequence.remaining.saturating_sub(1);

        match relay_on {
            Some(relay_on) if sequence.remaining > 0 => {
                sequence.next_fire = now + sequence.interval;
                self.armed = Some(sequence);
                TickOutcome::Toggled {
                    relay_on,
                    remaining: sequence.remaining,
                }
            }
            _ => {
                self.armed = None;
                TickOutcome::Completed {
                    relay_on,
                    toggles: sequence.toggles,
                    armed_at: sequence.armed_at,
                }
            }
        }
    }
}

impl<Instant> Default for ToggleScheduler<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + u64::try_from(rhs.as_micros()).unwrap())
        }
    }

    fn ms(value: u64) -> MockInstant {
        MockInstant(value * 1_000)
    }

    #[derive(Default)]
    struct CountingRelay {
        on: bool,
        writes: u32,
    }

    impl RelayDriver for CountingRelay {
        fn set_relay(&mut self, on: bool) {
            self.on = on;
            self.writes += 1;
        }

        fn relay_on(&self) -> bool {
            self.on
        }
    }

    const INTERVAL: Duration = Duration::from_millis(200);

    #[test]
    fn fires_once_per_interval_and_completes() {
        let mut scheduler = ToggleScheduler::new();
        let mut relay = CountingRelay::default();

        assert!(scheduler.arm(3, INTERVAL, ms(0)).is_none());
        assert_eq!(scheduler.next_deadline(), Some(ms(200)));

        assert_eq!(scheduler.poll(ms(199), &mut relay), TickOutcome::Waiting);
        assert_eq!(
            scheduler.poll(ms(200), &mut relay),
            TickOutcome::Toggled {
                relay_on: true,
                remaining: 2
            }
        );
        assert_eq!(scheduler.next_deadline(), Some(ms(400)));
        assert_eq!(
            scheduler.poll(ms(400), &mut relay),
            TickOutcome::Toggled {
                relay_on: false,
                remaining: 1
            }
        );
        assert_eq!(
            scheduler.poll(ms(600), &mut relay),
            TickOutcome::Completed {
                relay_on: Some(true),
                toggles: 3,
                armed_at: ms(0)
            }
        );
        assert!(!scheduler.is_armed());
        assert_eq!(scheduler.poll(ms(800), &mut relay), TickOutcome::Idle);
        assert_eq!(relay.writes, 3);
    }

    #[test]
    fn late_poll_reschedules_from_now() {
        let mut scheduler = ToggleScheduler::new();
        let mut relay = CountingRelay::default();
        scheduler.arm(2, INTERVAL, ms(0));

        scheduler.poll(ms(750), &mut relay);
        assert_eq!(scheduler.next_deadline(), Some(ms(950)));
        assert_eq!(relay.writes, 1);
    }

    #[test]
    fn rearm_supersedes_in_flight_sequence() {
        let mut scheduler = ToggleScheduler::new();
        let mut relay = CountingRelay::default();
        scheduler.arm(5, INTERVAL, ms(0));
        scheduler.poll(ms(200), &mut relay);

        let abandoned = scheduler.arm(2, INTERVAL, ms(300)).expect("sequence was armed");
        assert_eq!(abandoned.toggles, 5);
        assert_eq!(abandoned.remaining, 4);
        assert_eq!(abandoned.armed_at, ms(0));
        assert_eq!(scheduler.remaining(), 2);
        assert_eq!(scheduler.next_deadline(), Some(ms(500)));
    }

    #[test]
    fn zero_count_completes_on_first_firing_without_toggling() {
        let mut scheduler = ToggleScheduler::new();
        let mut relay = CountingRelay::default();
        scheduler.arm(0, INTERVAL, ms(0));

        assert_eq!(
            scheduler.poll(ms(200), &mut relay),
            TickOutcome::Completed {
                relay_on: None,
                toggles: 0,
                armed_at: ms(0)
            }
        );
        assert_eq!(relay.writes, 0);
    }

    #[test]
    fn cancel_drops_sequence_silently() {
        let mut scheduler = ToggleScheduler::new();
        let mut relay = CountingRelay::default();
        scheduler.arm(4, INTERVAL, ms(0));

        assert!(scheduler.cancel().is_some());
        assert!(scheduler.cancel().is_none());
        assert_eq!(scheduler.poll(ms(1_000), &mut relay), TickOutcome::Idle);
    }
}
