use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::time::Duration;

use leddy_core::control::dispatch::{CommandOutcome, ControlExecutor};
use leddy_core::control::response::write_response;
use leddy_core::control::status::write_history_line;
use leddy_core::modes::LEDDY_RING;
use leddy_core::sequencer::{
    Clock, IndicatorLed, MirroredRelay, ModeSequencer, RelayDriver, StatePublisher, StateReport,
};
use leddy_core::telemetry::{EventId, TelemetryInstant};

/// Simulated instant, in milliseconds since the session started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(u64);

impl SimInstant {
    pub fn since_start(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Clock that only moves when the session advances it.
#[derive(Debug, Default)]
pub struct SimClock {
    now: Cell<SimInstant>,
}

impl SimClock {
    fn set(&self, instant: SimInstant) {
        self.now.set(instant);
    }
}

impl Clock for SimClock {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.now.get()
    }
}

#[derive(Debug, Default)]
pub struct SimRelay {
    on: bool,
    writes: usize,
}

impl SimRelay {
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl RelayDriver for SimRelay {
    fn set_relay(&mut self, on: bool) {
        self.on = on;
        self.writes += 1;
    }

    fn relay_on(&self) -> bool {
        self.on
    }
}

#[derive(Debug, Default)]
pub struct SimLed {
    lit: bool,
}

impl SimLed {
    pub fn is_lit(&self) -> bool {
        self.lit
    }
}

impl IndicatorLed for SimLed {
    fn set_lit(&mut self, lit: bool) {
        self.lit = lit;
    }
}

/// Collects published reports until the session narrates them.
#[derive(Debug, Default)]
pub struct ReportLog {
    pending: Vec<StateReport>,
}

impl ReportLog {
    fn take(&mut self) -> Vec<StateReport> {
        std::mem::take(&mut self.pending)
    }
}

impl StatePublisher for ReportLog {
    fn publish(&mut self, report: StateReport) {
        self.pending.push(report);
    }
}

pub type EmulatedSequencer = ModeSequencer<MirroredRelay<SimRelay, SimLed>, SimClock, ReportLog>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Walkthrough,
    Cooldown,
}

impl TranscriptProfile {
    pub const ALL: [Self; 2] = [Self::Walkthrough, Self::Cooldown];

    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Walkthrough => "transcripts/emulator-walkthrough.log",
            TranscriptProfile::Cooldown => "transcripts/emulator-cooldown.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Walkthrough => "Leddy emulator walkthrough transcript",
            TranscriptProfile::Cooldown => "Leddy emulator reset cool-down transcript",
        }
    }

    /// Scripted console input replayed by `capture_transcripts`.
    pub fn script(self) -> &'static [&'static str] {
        match self {
            TranscriptProfile::Walkthrough => &[
                "help",
                "status",
                "state blue",
                "wait 1s",
                "state sunny",
                "wait 500ms",
                "button short",
                "state blue",
                "wait 1s",
                "on false",
                "on true",
                "wait 1s",
                "status",
                "history",
            ],
            TranscriptProfile::Cooldown => &[
                "state sunnyblue",
                "wait 1s",
                "state reset",
                "state blue",
                "wait 5s",
                "button long",
                "state reset",
                "wait 9s",
                "status",
                "wait 1s",
                "state resume",
                "wait 1s",
                "status",
            ],
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("walkthrough") {
            Ok(Self::Walkthrough)
        } else if tag.eq_ignore_ascii_case("cooldown") {
            Ok(Self::Cooldown)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

/// Interactive console bound to a simulated fixture.
pub struct Session {
    executor: ControlExecutor<EmulatedSequencer>,
    transcript: Option<TranscriptLogger>,
    next_record: EventId,
}

impl Session {
    /// Creates a session that only answers on stdout.
    pub fn new() -> Self {
        let mut session = Self::build();
        session.sequencer_mut().publisher_mut().take();
        session
    }

    /// Creates a session that also writes the profile's transcript file.
    pub fn with_transcript(profile: TranscriptProfile) -> io::Result<Self> {
        let mut session = Self::build();
        let mut transcript = TranscriptLogger::new(profile)?;
        for report in session.sequencer_mut().publisher_mut().take() {
            let line = format!("event {report}");
            transcript.append_line(Duration::ZERO, TranscriptRole::Emulator, &line)?;
        }
        session.transcript = Some(transcript);
        Ok(session)
    }

    fn build() -> Self {
        let relay = MirroredRelay::new(SimRelay::default(), SimLed::default());
        let mut sequencer =
            ModeSequencer::new(LEDDY_RING, relay, SimClock::default(), ReportLog::default());
        sequencer.bring_up();

        let mut session = Self {
            executor: ControlExecutor::new(sequencer),
            transcript: None,
            next_record: 0,
        };
        session.skip_history();
        session
    }

    pub fn sequencer(&self) -> &EmulatedSequencer {
        self.executor.sink()
    }

    fn sequencer_mut(&mut self) -> &mut EmulatedSequencer {
        self.executor.sink_mut()
    }

    /// Simulated time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.sequencer().clock().now().since_start()
    }

    /// Executes one console line at the current simulated instant.
    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.elapsed();
        self.record(elapsed, TranscriptRole::Host, &[trimmed.to_string()])?;

        let result = self.executor.execute(trimmed);
        let mut lines = Vec::new();
        if let Ok(CommandOutcome::Wait(duration)) = &result {
            lines.extend(self.advance(*duration));
            lines.push(format!(
                "ok waited {} now={}",
                format_offset(*duration),
                format_offset(self.elapsed())
            ));
        } else {
            let mut reply = String::new();
            write_response(&mut reply, self.sequencer(), &result)
                .map_err(|_| io::Error::other("failed to render reply"))?;
            lines.extend(reply.lines().map(str::to_string));
            self.skip_history();
            lines.extend(self.drain_reports());
        }

        self.record(elapsed, TranscriptRole::Emulator, &lines)?;
        Ok(lines)
    }

    /// Moves simulated time forward, polling the sequencer at every deadline
    /// it reports on the way.
    pub fn advance(&mut self, duration: Duration) -> Vec<String> {
        let target = self.sequencer().clock().now() + duration;
        let mut lines = Vec::new();

        while let Some(deadline) = self.sequencer().next_deadline()
            && deadline <= target
        {
            self.sequencer().clock().set(deadline);
            self.sequencer_mut().poll();
            lines.extend(self.drain_history());
            lines.extend(self.drain_reports());
        }

        self.sequencer().clock().set(target);
        lines
    }

    fn drain_history(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let ring = *self.executor.sink().ring();
        for record in self.executor.sink().telemetry().oldest_first() {
            if record.id.wrapping_sub(self.next_record) >= EventId::MAX / 2 {
                continue;
            }
            self.next_record = record.id.wrapping_add(1);

            let mut line = format!("[{}] ", format_offset(record.timestamp.since_start()));
            if write_history_line(&mut line, &ring, record).is_ok() {
                lines.push(line);
            }
        }
        lines
    }

    /// Marks every recorded event as already narrated.
    fn skip_history(&mut self) {
        if let Some(latest) = self.sequencer().telemetry().latest() {
            self.next_record = latest.id.wrapping_add(1);
        }
    }

    fn drain_reports(&mut self) -> Vec<String> {
        let at = format_offset(self.elapsed());
        self.sequencer_mut()
            .publisher_mut()
            .take()
            .into_iter()
            .map(|report| format!("[{at}] event {report}"))
            .collect()
    }

    fn record(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        lines: &[String],
    ) -> io::Result<()> {
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(elapsed, role, line)?;
            }
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are simulated milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn format_offset(duration: Duration) -> String {
    format!("+{}.{:03}s", duration.as_secs(), duration.subsec_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leddy_core::modes::Mode;

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).unwrap()
    }

    #[test]
    fn wait_walks_the_relay_to_the_target() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, "state blue"), ["ok state=blue toggles=5"]);

        let lines = run(&mut session, "wait 1s");
        let toggles = lines.iter().filter(|line| line.contains("relay-toggled")).count();
        assert_eq!(toggles, 5);
        assert!(
            lines
                .iter()
                .any(|line| line.ends_with("event state=blue relay=on reason=sequence-complete"))
        );
        assert_eq!(lines.last().unwrap(), "ok waited +1.000s now=+1.000s");

        let relay = session.sequencer().relay();
        assert!(relay.relay().relay_on());
        assert!(relay.led().is_lit());
        assert_eq!(relay.relay().writes(), 6);
    }

    #[test]
    fn reset_blocks_until_the_cooldown_passes() {
        let mut session = Session::new();
        assert_eq!(
            run(&mut session, "state reset"),
            [
                "ok state=off reset cooldown=+10.0s",
                "[+0.000s] event state=off relay=off reason=reset"
            ]
        );
        let refused = run(&mut session, "state sunny");
        assert!(refused[0].starts_with("error: rejected:"), "{refused:?}");

        let lines = run(&mut session, "wait 10s");
        assert!(lines.iter().any(|line| line.contains("cooldown-released")));
        assert_eq!(run(&mut session, "state sunny"), ["ok state=sunny toggles=1"]);
    }

    #[test]
    fn forced_off_reports_immediately() {
        let mut session = Session::new();
        run(&mut session, "state sunny");
        run(&mut session, "wait 200ms");
        let lines = run(&mut session, "on false");
        assert_eq!(lines[0], "ok state=off forced-off");
        assert!(lines[1].ends_with("event state=off relay=off reason=forced-off"));
        assert_eq!(session.sequencer().last_mode(), Mode::Ring(1));
    }

    #[test]
    fn profiles_parse_from_tags() {
        assert_eq!(TranscriptProfile::from_tag("COOLDOWN"), Ok(TranscriptProfile::Cooldown));
        assert!(TranscriptProfile::from_tag("reboot").is_err());
    }

    #[test]
    fn offsets_render_with_millisecond_precision() {
        assert_eq!(format_offset(Duration::from_millis(10_200)), "+10.200s");
    }
}
