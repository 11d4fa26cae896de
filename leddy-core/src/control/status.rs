//! Status and history rendering shared by the firmware console and emulator.
//!
//! [`StatusFormatter`] keeps the textual rendering of a [`StatusSnapshot`]
//! identical across front-ends; [`write_history_line`] does the same for
//! telemetry records.

use core::fmt;
use core::time::Duration;

use crate::modes::{Mode, ModeRing};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecord};

/// Point-in-time view of the sequencer surfaced by the `status` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub mode_name: &'static str,
    pub last_mode: Mode,
    pub last_name: &'static str,
    pub relay_on: bool,
    pub pending_toggles: u16,
    /// Time left in the reset cool-down, `None` when requests are accepted.
    pub cooldown_remaining: Option<Duration>,
}

impl StatusSnapshot {
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        self.cooldown_remaining.is_some()
    }
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the mode line (e.g. `mode current=blue last=sunny relay=on pending=3`).
    pub fn write_mode_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "mode current={} last={} relay={} pending={}",
            self.snapshot.mode_name,
            self.snapshot.last_name,
            on_off(self.snapshot.relay_on),
            self.snapshot.pending_toggles
        )
    }

    /// Writes the cool-down line (e.g. `gate blocked=true ready-in=+9.8s`).
    pub fn write_gate_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("gate blocked=")?;
        writer.write_str(if self.snapshot.is_blocked() {
            "true"
        } else {
            "false"
        })?;
        writer.write_str(" ready-in=")?;
        write_duration(writer, self.snapshot.cooldown_remaining)
    }
}

/// Writes one telemetry record (e.g. `#4 relay-toggled relay=on dt=+200ms`).
///
/// Modes carried by the event are rendered with their ring names.
pub fn write_history_line<W, I>(
    writer: &mut W,
    ring: &ModeRing,
    record: &TelemetryRecord<I>,
) -> fmt::Result
where
    W: fmt::Write,
    I: Copy,
{
    write!(writer, "#{} ", record.id)?;
    match record.event {
        TelemetryEventKind::SequenceArmed(mode) => {
            write!(writer, "sequence-armed {}", ring.name(mode))?;
        }
        TelemetryEventKind::SequenceSuperseded(mode) => {
            write!(writer, "sequence-superseded {}", ring.name(mode))?;
        }
        TelemetryEventKind::SequenceComplete(mode) => {
            write!(writer, "sequence-complete {}", ring.name(mode))?;
        }
        event => write!(writer, "{event}")?,
    }
    match record.details {
        TelemetryPayload::None => Ok(()),
        TelemetryPayload::Sequence(sequence) => {
            write!(
                writer,
                " toggles={} remaining={} took=",
                sequence.toggles, sequence.remaining
            )?;
            write_duration(writer, sequence.duration)
        }
        TelemetryPayload::Relay(relay) => {
            write!(writer, " relay={} dt=", on_off(relay.on))?;
            write_duration(writer, relay.elapsed_since_previous)
        }
        TelemetryPayload::Cooldown(cooldown) => {
            writer.write_str(" window=")?;
            write_duration(writer, Some(cooldown.window))
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

pub(crate) fn write_duration<W: fmt::Write>(
    writer: &mut W,
    duration: Option<Duration>,
) -> fmt::Result {
    match duration {
        None => writer.write_str("n/a"),
        Some(value) if value >= Duration::from_secs(1) => {
            let millis = value.as_millis();
            let seconds = millis / 1_000;
            let tenths = (millis % 1_000) / 100;
            write!(writer, "+{seconds}.{tenths}s")
        }
        Some(value) => write!(writer, "+{}ms", value.as_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::LEDDY_RING;
    use crate::telemetry::{RelayTelemetry, SequenceTelemetry};
    use heapless::String;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            mode: Mode::Ring(3),
            mode_name: "blue",
            last_mode: Mode::Ring(1),
            last_name: "sunny",
            relay_on: true,
            pending_toggles: 3,
            cooldown_remaining: None,
        }
    }

    #[test]
    fn renders_mode_line() {
        let snapshot = snapshot();
        let mut line: String<96> = String::new();
        StatusFormatter::new(&snapshot)
            .write_mode_line(&mut line)
            .unwrap();
        assert_eq!(
            line.as_str(),
            "mode current=blue last=sunny relay=on pending=3"
        );
    }

    #[test]
    fn renders_gate_line_while_blocked() {
        let mut snapshot = snapshot();
        snapshot.cooldown_remaining = Some(Duration::from_millis(9_850));
        let mut line: String<64> = String::new();
        StatusFormatter::new(&snapshot)
            .write_gate_line(&mut line)
            .unwrap();
        assert_eq!(line.as_str(), "gate blocked=true ready-in=+9.8s");

        snapshot.cooldown_remaining = None;
        line.clear();
        StatusFormatter::new(&snapshot)
            .write_gate_line(&mut line)
            .unwrap();
        assert_eq!(line.as_str(), "gate blocked=false ready-in=n/a");
    }

    #[test]
    fn renders_relay_history_line() {
        let record = TelemetryRecord {
            id: 4,
            timestamp: 800_u32,
            event: TelemetryEventKind::RelayToggled,
            details: TelemetryPayload::Relay(RelayTelemetry {
                on: true,
                elapsed_since_previous: Some(Duration::from_millis(200)),
            }),
        };
        let mut line: String<64> = String::new();
        write_history_line(&mut line, &LEDDY_RING, &record).unwrap();
        assert_eq!(line.as_str(), "#4 relay-toggled relay=on dt=+200ms");
    }

    #[test]
    fn history_lines_use_ring_names() {
        let record = TelemetryRecord {
            id: 7,
            timestamp: 0_u32,
            event: TelemetryEventKind::SequenceArmed(Mode::Ring(3)),
            details: TelemetryPayload::Sequence(SequenceTelemetry::new(5, 5, None)),
        };
        let mut line: String<64> = String::new();
        write_history_line(&mut line, &LEDDY_RING, &record).unwrap();
        assert_eq!(
            line.as_str(),
            "#7 sequence-armed blue toggles=5 remaining=5 took=n/a"
        );

        let record = TelemetryRecord {
            event: TelemetryEventKind::SequenceComplete(Mode::Ring(1)),
            details: TelemetryPayload::None,
            ..record
        };
        line.clear();
        write_history_line(&mut line, &LEDDY_RING, &record).unwrap();
        assert_eq!(line.as_str(), "#7 sequence-complete sunny");
    }
}
