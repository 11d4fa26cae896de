//! Logging helpers for sequencer telemetry.
//!
//! The sequencer keeps its own bounded history; this module mirrors new
//! records and state reports to defmt on the target and stdout on the host so
//! bring-up sessions see the relay cadence without opening the console.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write;

use heapless::String;
use leddy_core::control::status::write_history_line;
use leddy_core::modes::ModeRing;
use leddy_core::sequencer::{RejectionKind, StateReport};
use leddy_core::telemetry::{EventId, TelemetryInstant, TelemetryRecorder};

const LOG_LINE_LEN: usize = 96;

/// Forwards telemetry records to the log exactly once each.
#[derive(Default)]
pub struct TelemetryLogger {
    next_id: EventId,
}

impl TelemetryLogger {
    #[must_use]
    pub const fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Logs every record appended since the previous call.
    pub fn drain<I, const CAPACITY: usize>(
        &mut self,
        ring: &ModeRing,
        recorder: &TelemetryRecorder<I, CAPACITY>,
    ) where
        I: TelemetryInstant,
    {
        for record in recorder.oldest_first() {
            if !self.is_unseen(record.id) {
                continue;
            }
            self.next_id = record.id.wrapping_add(1);

            let mut line: String<LOG_LINE_LEN> = String::new();
            if write_history_line(&mut line, ring, record).is_err() {
                emit_log("telemetry", "record truncated");
            }
            emit_log("telemetry", &line);
        }
    }

    fn is_unseen(&self, id: EventId) -> bool {
        id.wrapping_sub(self.next_id) < EventId::MAX / 2
    }
}

/// Logs a state report as it is published.
pub fn log_state_report(report: &StateReport) {
    let mut line: String<LOG_LINE_LEN> = String::new();
    if write!(line, "{report}").is_err() {
        emit_log("state", "report truncated");
    }
    emit_log("state", &line);
}

/// Logs a refused request.
pub fn log_rejection(source: &'static str, kind: RejectionKind) {
    let mut line: String<LOG_LINE_LEN> = String::new();
    if write!(line, "{source} request rejected: {kind}").is_err() {
        line.clear();
    }
    emit_log("sequencer", &line);
}

#[cfg(target_os = "none")]
pub fn emit_log(topic: &'static str, message: &str) {
    defmt::info!("{=str}: {=str}", topic, message);
}

#[cfg(not(target_os = "none"))]
pub fn emit_log(topic: &'static str, message: &str) {
    println!("{topic}: {message}");
}

#[cfg(target_os = "none")]
pub fn emit_warning(topic: &'static str, message: &str) {
    defmt::warn!("{=str}: {=str}", topic, message);
}

#[cfg(not(target_os = "none"))]
pub fn emit_warning(topic: &'static str, message: &str) {
    println!("warn {topic}: {message}");
}
