//! Control command dispatcher.
//!
//! Glues parsed control lines to sequencer requests. Commands that only read
//! state (`status`, `history`, `help`) or that belong to a particular
//! front-end (`wait`) are handed back to the caller as a [`CommandOutcome`] so
//! the firmware and emulator can render them their own way.

use core::fmt;
use core::time::Duration;

use crate::modes::{Mode, ModeRing};
use crate::sequencer::{
    Accepted, Clock, ModeSequencer, Rejection, RelayDriver, Request, StatePublisher,
};

use super::catalog::{self, CommandSpec};
use super::grammar::{self, Command, StateArg};

/// Command execution successes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A request reached the sequencer and was accepted.
    Applied { request: Request, accepted: Accepted },
    Status,
    History,
    /// `help` without a topic.
    HelpIndex,
    /// `help <command>`.
    HelpTopic(&'static CommandSpec),
    /// Simulated time should advance by the given amount.
    Wait(Duration),
}

/// Errors surfaced while executing a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError<'a, Instant> {
    Parse(grammar::ParseError<'a>),
    /// `state` named something that is neither an action nor a ring member.
    UnknownMode(&'a str),
    UnknownTopic(&'a str),
    Rejected(Rejection<Instant>),
}

impl<'a, Instant> From<grammar::ParseError<'a>> for CommandError<'a, Instant> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl<Instant> From<Rejection<Instant>> for CommandError<'_, Instant> {
    fn from(rejection: Rejection<Instant>) -> Self {
        Self::Rejected(rejection)
    }
}

impl<Instant> fmt::Display for CommandError<'_, Instant> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => write!(f, "parse error: {error}"),
            CommandError::UnknownMode(name) => write!(f, "unknown mode `{name}`"),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
            CommandError::Rejected(rejection) => write!(f, "rejected: {rejection}"),
        }
    }
}

type CommandResult<'a, S> =
    Result<CommandOutcome, CommandError<'a, <S as RequestSink>::Instant>>;

/// Anything that can take sequencer requests.
pub trait RequestSink {
    type Instant: Copy;

    /// Ring used to resolve mode names.
    fn ring(&self) -> &ModeRing;

    /// Applies a request.
    ///
    /// # Errors
    ///
    /// Returns the sink's [`Rejection`] when the request is refused.
    fn submit(&mut self, request: Request) -> Result<Accepted, Rejection<Self::Instant>>;
}

impl<R, C, P> RequestSink for ModeSequencer<R, C, P>
where
    R: RelayDriver,
    C: Clock,
    P: StatePublisher,
{
    type Instant = C::Instant;

    fn ring(&self) -> &ModeRing {
        ModeSequencer::ring(self)
    }

    fn submit(&mut self, request: Request) -> Result<Accepted, Rejection<Self::Instant>> {
        ModeSequencer::submit(self, request)
    }
}

/// Dispatches control lines into a [`RequestSink`].
pub struct ControlExecutor<S> {
    sink: S,
}

impl<S> ControlExecutor<S> {
    pub const fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S> ControlExecutor<S>
where
    S: RequestSink,
{
    /// Parses and executes a control line.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] for malformed lines, unknown mode names or
    /// help topics, and requests the sequencer refused.
    pub fn execute<'a>(&mut self, line: &'a str) -> CommandResult<'a, S> {
        let command = grammar::parse(line)?;
        self.dispatch(command)
    }

    /// Executes an already parsed command.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub fn dispatch<'a>(&mut self, command: Command<'a>) -> CommandResult<'a, S> {
        match command {
            Command::State(arg) => {
                let request = self.resolve_state(arg)?;
                self.apply(request)
            }
            Command::Power(true) => self.apply(Request::ResumeLast),
            Command::Power(false) => self.apply(Request::Mode(Mode::Off)),
            Command::Button(event) => self.apply(event.request()),
            Command::Status => Ok(CommandOutcome::Status),
            Command::History => Ok(CommandOutcome::History),
            Command::Help(help) => match help.topic {
                None => Ok(CommandOutcome::HelpIndex),
                Some(topic) => catalog::find(topic)
                    .map(CommandOutcome::HelpTopic)
                    .ok_or(CommandError::UnknownTopic(topic)),
            },
            Command::Wait(duration) => Ok(CommandOutcome::Wait(duration)),
        }
    }

    fn resolve_state<'a>(
        &self,
        arg: StateArg<'a>,
    ) -> Result<Request, CommandError<'a, S::Instant>> {
        match arg {
            StateArg::Step => Ok(Request::Step),
            StateArg::Reset => Ok(Request::Reset),
            StateArg::Resume => Ok(Request::ResumeLast),
            StateArg::Mode(name) => self
                .sink
                .ring()
                .lookup(name)
                .map(Request::Mode)
                .ok_or(CommandError::UnknownMode(name)),
        }
    }

    fn apply<'a>(&mut self, request: Request) -> CommandResult<'a, S> {
        let accepted = self.sink.submit(request)?;
        Ok(CommandOutcome::Applied { request, accepted })
    }
}

/// Writes the `help` index, one `usage  summary` line per command.
pub fn write_help_index<W: fmt::Write>(writer: &mut W) -> fmt::Result {
    for spec in catalog::commands() {
        writeln!(writer, "{}  {}", catalog::Usage(spec), spec.summary)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::ButtonEvent;
    use crate::modes::LEDDY_RING;
    use heapless::Vec as HeaplessVec;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct MockInstant(u64);

    struct RecordingSink {
        ring: ModeRing,
        refuse: bool,
        requests: HeaplessVec<Request, 8>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                ring: LEDDY_RING,
                refuse: false,
                requests: HeaplessVec::new(),
            }
        }
    }

    impl RequestSink for RecordingSink {
        type Instant = MockInstant;

        fn ring(&self) -> &ModeRing {
            &self.ring
        }

        fn submit(&mut self, request: Request) -> Result<Accepted, Rejection<MockInstant>> {
            if self.refuse {
                return Err(Rejection::Blocked {
                    ready_at: MockInstant(10_000),
                });
            }
            self.requests.push(request).unwrap();
            Ok(Accepted::Unchanged)
        }
    }

    fn executor() -> ControlExecutor<RecordingSink> {
        ControlExecutor::new(RecordingSink::new())
    }

    #[test]
    fn state_names_resolve_through_the_ring() {
        let mut executor = executor();
        executor.execute("state sunnyblue").unwrap();
        executor.execute("state OFF").unwrap();
        executor.execute("state step").unwrap();
        executor.execute("state reset").unwrap();
        executor.execute("state resume").unwrap();

        assert_eq!(
            executor.sink().requests.as_slice(),
            &[
                Request::Mode(Mode::Ring(2)),
                Request::Mode(Mode::Off),
                Request::Step,
                Request::Reset,
                Request::ResumeLast,
            ]
        );
    }

    #[test]
    fn unknown_mode_is_reported_without_submitting() {
        let mut executor = executor();
        let error = executor.execute("state purple").unwrap_err();
        assert_eq!(error, CommandError::UnknownMode("purple"));
        assert!(executor.sink().requests.is_empty());
    }

    #[test]
    fn power_topic_maps_to_resume_and_off() {
        let mut executor = executor();
        let outcome = executor.execute("on true").unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Applied {
                request: Request::ResumeLast,
                accepted: Accepted::Unchanged,
            }
        );
        executor.execute("on 0").unwrap();
        assert_eq!(
            executor.sink().requests.as_slice(),
            &[Request::ResumeLast, Request::Mode(Mode::Off)]
        );
    }

    #[test]
    fn button_events_follow_their_binding() {
        let mut executor = executor();
        executor.execute("button short").unwrap();
        executor.execute("button hold").unwrap();
        assert_eq!(
            executor.sink().requests.as_slice(),
            &[ButtonEvent::ShortPress.request(), Request::Mode(Mode::Off)]
        );
    }

    #[test]
    fn rejection_is_surfaced() {
        let mut executor = executor();
        executor.sink_mut().refuse = true;
        let error = executor.execute("state blue").unwrap_err();
        assert_eq!(
            error,
            CommandError::Rejected(Rejection::Blocked {
                ready_at: MockInstant(10_000)
            })
        );
    }

    #[test]
    fn read_only_commands_are_returned_to_the_caller() {
        let mut executor = executor();
        assert_eq!(executor.execute("status").unwrap(), CommandOutcome::Status);
        assert_eq!(executor.execute("history").unwrap(), CommandOutcome::History);
        assert_eq!(executor.execute("help").unwrap(), CommandOutcome::HelpIndex);
        assert!(matches!(
            executor.execute("help wait").unwrap(),
            CommandOutcome::HelpTopic(spec) if spec.name == "wait"
        ));
        assert_eq!(
            executor.execute("help teleport").unwrap_err(),
            CommandError::UnknownTopic("teleport")
        );
        assert_eq!(
            executor.execute("wait 2s").unwrap(),
            CommandOutcome::Wait(Duration::from_secs(2))
        );
        assert!(executor.sink().requests.is_empty());
    }

    #[test]
    fn parse_error_is_returned() {
        let mut executor = executor();
        assert!(matches!(
            executor.execute("state").unwrap_err(),
            CommandError::Parse(_)
        ));
    }

    #[test]
    fn help_index_lists_every_command() {
        let mut text: heapless::String<1024> = heapless::String::new();
        write_help_index(&mut text).unwrap();
        assert_eq!(text.lines().count(), catalog::commands().len());
        assert!(text.starts_with("state <off|sunny|sunnyblue|blue|step|reset|resume>"));
    }
}
