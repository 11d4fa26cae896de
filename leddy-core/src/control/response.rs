//! Text replies for executed control lines.
//!
//! Both front-ends answer a line with one or more `\n`-terminated lines
//! produced here. `wait` has no meaning outside the emulator, so front-ends
//! that support it intercept [`CommandOutcome::Wait`] before rendering.

use core::fmt;

use crate::sequencer::{Accepted, Clock, ModeSequencer, RelayDriver, StatePublisher};

use super::catalog::Usage;
use super::dispatch::{CommandError, CommandOutcome, write_help_index};
use super::status::{StatusFormatter, write_duration, write_history_line};

/// Renders the reply for one executed control line.
pub fn write_response<W, R, C, P>(
    writer: &mut W,
    sequencer: &ModeSequencer<R, C, P>,
    result: &Result<CommandOutcome, CommandError<'_, C::Instant>>,
) -> fmt::Result
where
    W: fmt::Write,
    R: RelayDriver,
    C: Clock,
    P: StatePublisher,
{
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(error) => return writeln!(writer, "error: {error}"),
    };

    match outcome {
        CommandOutcome::Applied { accepted, .. } => {
            write_accepted(writer, sequencer, *accepted)?;
            writer.write_char('\n')
        }
        CommandOutcome::Status => {
            let snapshot = sequencer.status();
            let formatter = StatusFormatter::new(&snapshot);
            formatter.write_mode_line(writer)?;
            writer.write_char('\n')?;
            formatter.write_gate_line(writer)?;
            writer.write_char('\n')
        }
        CommandOutcome::History => {
            for record in sequencer.telemetry().oldest_first() {
                write_history_line(writer, sequencer.ring(), record)?;
                writer.write_char('\n')?;
            }
            Ok(())
        }
        CommandOutcome::HelpIndex => write_help_index(writer),
        CommandOutcome::HelpTopic(spec) => {
            writeln!(writer, "{}", Usage(spec))?;
            writeln!(writer, "  {}", spec.summary)
        }
        CommandOutcome::Wait(_) => writeln!(writer, "error: wait is only available in the emulator"),
    }
}

fn write_accepted<W, R, C, P>(
    writer: &mut W,
    sequencer: &ModeSequencer<R, C, P>,
    accepted: Accepted,
) -> fmt::Result
where
    W: fmt::Write,
    R: RelayDriver,
    C: Clock,
    P: StatePublisher,
{
    let ring = sequencer.ring();
    match accepted {
        Accepted::Unchanged => write!(
            writer,
            "ok state={} unchanged",
            ring.name(sequencer.current_mode())
        ),
        Accepted::Sequencing { target, toggles } => {
            write!(writer, "ok state={} toggles={toggles}", ring.name(target))
        }
        Accepted::ForcedOff => writer.write_str("ok state=off forced-off"),
        Accepted::Reset => {
            writer.write_str("ok state=off reset cooldown=")?;
            write_duration(writer, Some(sequencer.config().cooldown))
        }
    }
}
