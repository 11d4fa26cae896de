//! Telemetry event catalog and the fixed-size history kept by the sequencer.
//!
//! Every request outcome, relay write and gate transition is recorded with a
//! timestamp so the `history` command and the emulator transcripts can explain
//! what the relay did and why. Everything here stays `no_std` compatible.

use core::{fmt, time::Duration};

use heapless::HistoryBuf;

use crate::modes::Mode;
use crate::sequencer::RejectionKind;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Default number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

/// Kinds of events recorded by the sequencer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryEventKind {
    RequestRejected(RejectionKind),
    /// A toggle sequence started towards the given mode.
    SequenceArmed(Mode),
    /// A running sequence towards the given mode was replaced by a newer request.
    SequenceSuperseded(Mode),
    RelayToggled,
    SequenceComplete(Mode),
    ForcedOff,
    ResetApplied,
    CooldownReleased,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::RequestRejected(kind) => write!(f, "request-rejected {kind}"),
            TelemetryEventKind::SequenceArmed(mode) => write!(f, "sequence-armed {mode}"),
            TelemetryEventKind::SequenceSuperseded(mode) => {
                write!(f, "sequence-superseded {mode}")
            }
            TelemetryEventKind::RelayToggled => f.write_str("relay-toggled"),
            TelemetryEventKind::SequenceComplete(mode) => write!(f, "sequence-complete {mode}"),
            TelemetryEventKind::ForcedOff => f.write_str("forced-off"),
            TelemetryEventKind::ResetApplied => f.write_str("reset-applied"),
            TelemetryEventKind::CooldownReleased => f.write_str("cooldown-released"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    Sequence(SequenceTelemetry),
    Relay(RelayTelemetry),
    Cooldown(CooldownTelemetry),
}

impl TelemetryPayload {
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Toggle bookkeeping for a sequence event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequenceTelemetry {
    /// Toggles the sequence was armed with.
    pub toggles: u16,
    /// Toggles still outstanding when the event was recorded.
    pub remaining: u16,
    /// Time between arming and this event, when known.
    pub duration: Option<Duration>,
}

impl SequenceTelemetry {
    #[must_use]
    pub const fn new(toggles: u16, remaining: u16, duration: Option<Duration>) -> Self {
        Self {
            toggles,
            remaining,
            duration,
        }
    }
}

/// Relay write payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RelayTelemetry {
    pub on: bool,
    pub elapsed_since_previous: Option<Duration>,
}

/// Gate window payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CooldownTelemetry {
    pub window: Duration,
}

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_relay_write_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_relay_write_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord<TInstant>> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a relay toggle and the time elapsed since the previous one.
    pub fn record_relay_toggle(&mut self, on: bool, timestamp: TInstant) -> EventId {
        let elapsed = self
            .last_relay_write_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_relay_write_at = Some(timestamp);

        self.record(
            TelemetryEventKind::RelayToggled,
            TelemetryPayload::Relay(RelayTelemetry {
                on,
                elapsed_since_previous: elapsed,
            }),
            timestamp,
        )
    }

    pub fn record_rejection(&mut self, kind: RejectionKind, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::RequestRejected(kind),
            TelemetryPayload::none(),
            timestamp,
        )
    }

    pub fn record_sequence_armed(
        &mut self,
        target: Mode,
        toggles: u16,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::SequenceArmed(target),
            TelemetryPayload::Sequence(SequenceTelemetry::new(toggles, toggles, None)),
            timestamp,
        )
    }

    /// Records a sequence abandoned mid-flight by a newer request.
    pub fn record_sequence_superseded(
        &mut self,
        target: Mode,
        toggles: u16,
        remaining: u16,
        started_at: Option<TInstant>,
        timestamp: TInstant,
    ) -> EventId {
        let duration = started_at.map(|start| timestamp.saturating_duration_since(start));
        self.record(
            TelemetryEventKind::SequenceSuperseded(target),
            TelemetryPayload::Sequence(SequenceTelemetry::new(toggles, remaining, duration)),
            timestamp,
        )
    }

    pub fn record_sequence_completion(
        &mut self,
        target: Mode,
        toggles: u16,
        started_at: Option<TInstant>,
        timestamp: TInstant,
    ) -> EventId {
        let duration = started_at.map(|start| timestamp.saturating_duration_since(start));
        self.record(
            TelemetryEventKind::SequenceComplete(target),
            TelemetryPayload::Sequence(SequenceTelemetry::new(toggles, 0, duration)),
            timestamp,
        )
    }

    pub fn record_forced_off(&mut self, timestamp: TInstant) -> EventId {
        self.last_relay_write_at = Some(timestamp);
        self.record(
            TelemetryEventKind::ForcedOff,
            TelemetryPayload::none(),
            timestamp,
        )
    }

    pub fn record_reset(&mut self, window: Duration, timestamp: TInstant) -> EventId {
        self.last_relay_write_at = Some(timestamp);
        self.record(
            TelemetryEventKind::ResetApplied,
            TelemetryPayload::Cooldown(CooldownTelemetry { window }),
            timestamp,
        )
    }

    pub fn record_cooldown_released(&mut self, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::CooldownReleased,
            TelemetryPayload::none(),
            timestamp,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
    struct MicrosInstant(u64);

    impl TelemetryInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    #[test]
    fn records_elapsed_between_relay_toggles() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();

        let first = recorder.record_relay_toggle(true, MicrosInstant(100));
        assert_eq!(first, 0);
        match recorder.latest().copied().unwrap().details {
            TelemetryPayload::Relay(details) => {
                assert!(details.on);
                assert_eq!(details.elapsed_since_previous, None);
            }
            other => panic!("expected relay payload, got {other:?}"),
        }

        let second = recorder.record_relay_toggle(false, MicrosInstant(200_100));
        assert_eq!(second, 1);
        match recorder.latest().copied().unwrap().details {
            TelemetryPayload::Relay(details) => {
                let elapsed = details.elapsed_since_previous.expect("missing elapsed");
                assert_eq!(elapsed, Duration::from_millis(200));
            }
            other => panic!("expected relay payload, got {other:?}"),
        }
    }

    #[test]
    fn completion_carries_sequence_duration() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        recorder.record_sequence_armed(Mode::Ring(3), 5, MicrosInstant(0));
        recorder.record_sequence_completion(
            Mode::Ring(3),
            5,
            Some(MicrosInstant(0)),
            MicrosInstant(1_000_000),
        );

        let record = recorder.latest().copied().unwrap();
        assert_eq!(record.event, TelemetryEventKind::SequenceComplete(Mode::Ring(3)));
        match record.details {
            TelemetryPayload::Sequence(details) => {
                assert_eq!(details.toggles, 5);
                assert_eq!(details.remaining, 0);
                assert_eq!(details.duration, Some(Duration::from_secs(1)));
            }
            other => panic!("expected sequence payload, got {other:?}"),
        }
    }

    #[test]
    fn ring_keeps_only_the_newest_records() {
        let mut recorder = TelemetryRecorder::<MicrosInstant, 4>::new();
        for step in 0..6 {
            recorder.record_cooldown_released(MicrosInstant(step));
        }

        assert_eq!(recorder.len(), 4);
        let ids: heapless::Vec<EventId, 4> =
            recorder.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids.as_slice(), &[2, 3, 4, 5]);
    }

    #[test]
    fn event_kinds_render_compact_labels() {
        use core::fmt::Write;

        let mut text: heapless::String<48> = heapless::String::new();
        write!(text, "{}", TelemetryEventKind::SequenceArmed(Mode::Ring(2))).unwrap();
        assert_eq!(text.as_str(), "sequence-armed ring#2");

        text.clear();
        write!(
            text,
            "{}",
            TelemetryEventKind::RequestRejected(RejectionKind::Blocked)
        )
        .unwrap();
        assert_eq!(text.as_str(), "request-rejected blocked");
    }
}
