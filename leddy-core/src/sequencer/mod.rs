//! Mode sequencer shared between firmware and host targets.
//!
//! [`ModeSequencer`] owns the believed fixture mode, turns requests into relay
//! toggle sequences, and guards them with the reset cool-down. It is driven
//! from a single event loop: requests arrive through [`ModeSequencer::submit`]
//! (or the boolean wrappers), and the loop calls [`ModeSequencer::poll`]
//! whenever [`ModeSequencer::next_deadline`] passes. Hardware, time and the
//! outbound notification channel are injected through the traits below.

use core::{fmt, ops::Add, time::Duration};

use crate::control::status::StatusSnapshot;
use crate::modes::{Mode, ModeRing, RESET_COOLDOWN, TOGGLE_INTERVAL, TogglePlan, toggle_plan};
use crate::telemetry::{TelemetryInstant, TelemetryRecorder};

pub mod gate;
pub mod scheduler;

pub use gate::CooldownGate;
pub use scheduler::{AbandonedSequence, TickOutcome, ToggleScheduler};

/// Number of telemetry records the sequencer keeps for diagnostics.
pub const SEQUENCER_HISTORY: usize = 32;

/// Abstraction over the relay output.
pub trait RelayDriver {
    /// Drives the relay closed (`true`) or open (`false`).
    fn set_relay(&mut self, on: bool);

    /// Reports the level last written to the relay.
    fn relay_on(&self) -> bool;

    /// Flips the relay and returns the new level.
    fn toggle(&mut self) -> bool {
        let next = !self.relay_on();
        self.set_relay(next);
        next
    }
}

/// Indicator that mirrors the relay level.
pub trait IndicatorLed {
    fn set_lit(&mut self, lit: bool);
}

/// Relay driver that repeats every write onto an indicator LED.
pub struct MirroredRelay<R, L> {
    relay: R,
    led: L,
}

impl<R, L> MirroredRelay<R, L>
where
    R: RelayDriver,
    L: IndicatorLed,
{
    pub fn new(relay: R, led: L) -> Self {
        Self { relay, led }
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    pub fn into_parts(self) -> (R, L) {
        (self.relay, self.led)
    }
}

impl<R, L> RelayDriver for MirroredRelay<R, L>
where
    R: RelayDriver,
    L: IndicatorLed,
{
    fn set_relay(&mut self, on: bool) {
        self.relay.set_relay(on);
        self.led.set_lit(on);
    }

    fn relay_on(&self) -> bool {
        self.relay.relay_on()
    }
}

/// Monotonic time source used to stamp requests and schedule toggles.
pub trait Clock {
    type Instant: Copy + Ord + Add<Duration, Output = Self::Instant> + TelemetryInstant;

    fn now(&self) -> Self::Instant;
}

/// Why a state report was emitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishReason {
    BringUp,
    SequenceComplete,
    ForcedOff,
    Reset,
}

impl PublishReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            PublishReason::BringUp => "bring-up",
            PublishReason::SequenceComplete => "sequence-complete",
            PublishReason::ForcedOff => "forced-off",
            PublishReason::Reset => "reset",
        }
    }
}

/// State-change notification delivered to the [`StatePublisher`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StateReport {
    pub mode: Mode,
    pub name: &'static str,
    pub relay_on: bool,
    pub reason: PublishReason,
}

impl fmt::Display for StateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={} relay={} reason={}",
            self.name,
            if self.relay_on { "on" } else { "off" },
            self.reason.label()
        )
    }
}

/// Outbound channel for state reports.
pub trait StatePublisher {
    fn publish(&mut self, report: StateReport);
}

/// Publisher that discards every report.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopPublisher;

impl StatePublisher for NoopPublisher {
    fn publish(&mut self, _: StateReport) {}
}

/// When requests are refused.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockPolicy {
    /// Only the post-reset cool-down blocks; a new request supersedes a running sequence.
    #[default]
    CooldownOnly,
    /// Additionally refuse requests while a toggle sequence is running.
    WhileSequencing,
}

/// Timing and policy knobs for [`ModeSequencer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequencerConfig {
    pub toggle_interval: Duration,
    pub cooldown: Duration,
    pub block_policy: BlockPolicy,
}

impl SequencerConfig {
    pub const DEFAULT: Self = Self {
        toggle_interval: TOGGLE_INTERVAL,
        cooldown: RESET_COOLDOWN,
        block_policy: BlockPolicy::CooldownOnly,
    };

    #[must_use]
    pub const fn with_block_policy(mut self, policy: BlockPolicy) -> Self {
        self.block_policy = policy;
        self
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Requests accepted by [`ModeSequencer::submit`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    Mode(Mode),
    Step,
    Reset,
    ResumeLast,
}

/// Successful request outcomes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Accepted {
    /// The fixture is already believed to be in the requested mode.
    Unchanged,
    Sequencing { target: Mode, toggles: u16 },
    ForcedOff,
    Reset,
}

/// Compact rejection classification used for telemetry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RejectionKind {
    Blocked,
    Busy,
    UnknownMode,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectionKind::Blocked => "blocked",
            RejectionKind::Busy => "busy",
            RejectionKind::UnknownMode => "unknown-mode",
        })
    }
}

/// Reason a request was refused. Refused requests leave all state untouched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection<Instant> {
    /// The reset cool-down is running.
    Blocked { ready_at: Instant },
    /// A sequence is running and the policy forbids superseding it.
    Busy { remaining: u16 },
    /// The mode does not belong to the configured ring.
    UnknownMode(Mode),
}

impl<Instant> Rejection<Instant> {
    #[must_use]
    pub const fn kind(&self) -> RejectionKind {
        match self {
            Rejection::Blocked { .. } => RejectionKind::Blocked,
            Rejection::Busy { .. } => RejectionKind::Busy,
            Rejection::UnknownMode(_) => RejectionKind::UnknownMode,
        }
    }
}

impl<Instant> fmt::Display for Rejection<Instant> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Blocked { .. } => f.write_str("state changes blocked after reset"),
            Rejection::Busy { remaining } => {
                write!(f, "sequence in progress ({remaining} toggles left)")
            }
            Rejection::UnknownMode(mode) => write!(f, "mode {mode} is not part of the ring"),
        }
    }
}

/// Snapshot of the sequencer's bookkeeping.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequencerState {
    pub current: Mode,
    pub last: Mode,
    pub pending_toggles: u16,
    pub blocked: bool,
}

/// Believed-state machine that walks the fixture between modes.
pub struct ModeSequencer<R, C, P>
where
    C: Clock,
{
    ring: ModeRing,
    config: SequencerConfig,
    relay: R,
    clock: C,
    publisher: P,
    current: Mode,
    last: Mode,
    scheduler: ToggleScheduler<C::Instant>,
    gate: CooldownGate<C::Instant>,
    telemetry: TelemetryRecorder<C::Instant, SEQUENCER_HISTORY>,
}

impl<R, C, P> ModeSequencer<R, C, P>
where
    R: RelayDriver,
    C: Clock,
    P: StatePublisher,
{
    /// Creates a sequencer with the default 200 ms cadence and 10 s cool-down.
    pub fn new(ring: ModeRing, relay: R, clock: C, publisher: P) -> Self {
        Self::with_config(ring, relay, clock, publisher, SequencerConfig::DEFAULT)
    }

    pub fn with_config(
        ring: ModeRing,
        relay: R,
        clock: C,
        publisher: P,
        config: SequencerConfig,
    ) -> Self {
        Self {
            ring,
            config,
            relay,
            clock,
            publisher,
            current: Mode::Off,
            last: Mode::Off,
            scheduler: ToggleScheduler::new(),
            gate: CooldownGate::new(),
            telemetry: TelemetryRecorder::new(),
        }
    }

    /// Opens the relay and announces the initial `off` state.
    pub fn bring_up(&mut self) {
        self.relay.set_relay(false);
        self.publish(PublishReason::BringUp);
    }

    /// Applies a request, reporting why it was refused when it is.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when the cool-down is running, when the block
    /// policy forbids superseding a running sequence, or when the requested
    /// mode is not part of the ring. `Request::Reset` is never refused.
    pub fn submit(&mut self, request: Request) -> Result<Accepted, Rejection<C::Instant>> {
        let now = self.clock.now();
        self.release_gate(now);

        let outcome = match request {
            Request::Reset => Ok(self.apply_reset(now)),
            Request::Mode(target) => self.transition(target, now),
            Request::Step => self.transition(self.ring.next(self.current), now),
            Request::ResumeLast => {
                let target = if self.last.is_off() {
                    self.ring.first()
                } else {
                    self.last
                };
                self.transition(target, now)
            }
        };

        if let Err(rejection) = &outcome {
            self.telemetry.record_rejection(rejection.kind(), now);
        }

        outcome
    }

    /// Requests a specific mode. Returns `false` when the request was refused.
    pub fn request_mode(&mut self, target: Mode) -> bool {
        self.submit(Request::Mode(target)).is_ok()
    }

    /// Advances to the next mode in ring order, wrapping through `OFF`.
    pub fn step(&mut self) -> bool {
        self.submit(Request::Step).is_ok()
    }

    /// Forces `OFF` and starts the cool-down. Always succeeds.
    pub fn reset(&mut self) -> bool {
        self.submit(Request::Reset).is_ok()
    }

    /// Returns to the last non-`OFF` mode, or the first ring member.
    pub fn resume_last(&mut self) -> bool {
        self.submit(Request::ResumeLast).is_ok()
    }

    /// Drives the cool-down and toggle deadlines that have passed.
    pub fn poll(&mut self) {
        let now = self.clock.now();
        self.release_gate(now);

        match self.scheduler.poll(now, &mut self.relay) {
            TickOutcome::Idle | TickOutcome::Waiting => {}
            TickOutcome::Toggled { relay_on, .. } => {
                self.telemetry.record_relay_toggle(relay_on, now);
            }
            TickOutcome::Completed {
                relay_on,
                toggles,
                armed_at,
            } => {
                if let Some(relay_on) = relay_on {
                    self.telemetry.record_relay_toggle(relay_on, now);
                }
                self.telemetry
                    .record_sequence_completion(self.current, toggles, Some(armed_at), now);
                self.on_sequence_complete();
            }
        }
    }

    /// Announces the state reached by a finished sequence.
    pub fn on_sequence_complete(&mut self) {
        self.publish(PublishReason::SequenceComplete);
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<C::Instant> {
        match (self.scheduler.next_deadline(), self.gate.ready_at()) {
            (Some(toggle), Some(gate)) => Some(toggle.min(gate)),
            (toggle, gate) => toggle.or(gate),
        }
    }

    #[must_use]
    pub fn current_mode(&self) -> Mode {
        self.current
    }

    #[must_use]
    pub fn last_mode(&self) -> Mode {
        self.last
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.gate.is_blocked()
    }

    #[must_use]
    pub fn is_sequencing(&self) -> bool {
        self.scheduler.is_armed()
    }

    #[must_use]
    pub fn state(&self) -> SequencerState {
        SequencerState {
            current: self.current,
            last: self.last,
            pending_toggles: self.scheduler.remaining(),
            blocked: self.gate.is_blocked(),
        }
    }

    /// Builds the status view rendered by the `status` command.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let now = self.clock.now();
        StatusSnapshot {
            mode: self.current,
            mode_name: self.ring.name(self.current),
            last_mode: self.last,
            last_name: self.ring.name(self.last),
            relay_on: self.relay.relay_on(),
            pending_toggles: self.scheduler.remaining(),
            cooldown_remaining: self.gate.remaining(now),
        }
    }

    /// Report describing the current believed state.
    #[must_use]
    pub fn report(&self, reason: PublishReason) -> StateReport {
        StateReport {
            mode: self.current,
            name: self.ring.name(self.current),
            relay_on: self.relay.relay_on(),
            reason,
        }
    }

    pub fn ring(&self) -> &ModeRing {
        &self.ring
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    pub fn telemetry(&self) -> &TelemetryRecorder<C::Instant, SEQUENCER_HISTORY> {
        &self.telemetry
    }

    fn release_gate(&mut self, now: C::Instant) {
        if self.gate.poll(now) {
            self.telemetry.record_cooldown_released(now);
        }
    }

    fn admit(&self) -> Result<(), Rejection<C::Instant>> {
        if let Some(ready_at) = self.gate.ready_at() {
            return Err(Rejection::Blocked { ready_at });
        }

        if self.config.block_policy == BlockPolicy::WhileSequencing && self.scheduler.is_armed() {
            return Err(Rejection::Busy {
                remaining: self.scheduler.remaining(),
            });
        }

        Ok(())
    }

    fn transition(
        &mut self,
        target: Mode,
        now: C::Instant,
    ) -> Result<Accepted, Rejection<C::Instant>> {
        self.admit()?;

        if !self.ring.contains(target) {
            return Err(Rejection::UnknownMode(target));
        }

        match toggle_plan(&self.ring, self.current, target) {
            TogglePlan::Hold => Ok(Accepted::Unchanged),
            TogglePlan::ForceOff => {
                self.last = self.current;
                self.current = Mode::Off;
                self.force_off();
                self.telemetry.record_forced_off(now);
                self.publish(PublishReason::ForcedOff);
                Ok(Accepted::ForcedOff)
            }
            TogglePlan::Toggles(toggles) => {
                // Distance is computed from the believed mode even when a
                // sequence is cut short, so the fixture can drift here.
                let superseded = self.current;
                if let Some(abandoned) =
                    self.scheduler
                        .arm(toggles, self.config.toggle_interval, now)
                {
                    self.telemetry.record_sequence_superseded(
                        superseded,
                        abandoned.toggles,
                        abandoned.remaining,
                        Some(abandoned.armed_at),
                        now,
                    );
                }

                self.last = self.current;
                self.current = target;
                self.telemetry.record_sequence_armed(target, toggles, now);
                Ok(Accepted::Sequencing { target, toggles })
            }
        }
    }

    fn apply_reset(&mut self, now: C::Instant) -> Accepted {
        if !self.current.is_off() {
            self.last = self.current;
        }
        self.current = Mode::Off;
        self.force_off();

        self.gate.engage(now, self.config.cooldown);
        self.telemetry.record_reset(self.config.cooldown, now);
        self.publish(PublishReason::Reset);
        Accepted::Reset
    }

    fn force_off(&mut self) {
        // A cancelled sequence never reports completion.
        self.scheduler.cancel();
        self.relay.set_relay(false);
    }

    fn publish(&mut self, reason: PublishReason) {
        let report = self.report(reason);
        self.publisher.publish(report);
    }
}
