use core::ops::Add;
use core::time::Duration;
use std::cell::Cell;
use std::rc::Rc;

use leddy_core::modes::{LEDDY_RING, Mode};
use leddy_core::sequencer::{
    Accepted, BlockPolicy, Clock, IndicatorLed, MirroredRelay, ModeSequencer, PublishReason,
    Rejection, RelayDriver, Request, SequencerConfig, StatePublisher, StateReport,
};
use leddy_core::telemetry::{TelemetryEventKind, TelemetryInstant};

const SUNNY: Mode = Mode::Ring(1);
const SUNNYBLUE: Mode = Mode::Ring(2);
const BLUE: Mode = Mode::Ring(3);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MockInstant(u64);

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + u64::try_from(rhs.as_millis()).unwrap())
    }
}

impl TelemetryInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Clone, Default)]
struct MockClock(Rc<Cell<u64>>);

impl MockClock {
    fn set(&self, millis: u64) {
        self.0.set(millis);
    }
}

impl Clock for MockClock {
    type Instant = MockInstant;

    fn now(&self) -> MockInstant {
        MockInstant(self.0.get())
    }
}

#[derive(Default)]
struct MockRelay {
    on: bool,
    writes: Vec<bool>,
}

impl RelayDriver for MockRelay {
    fn set_relay(&mut self, on: bool) {
        self.on = on;
        self.writes.push(on);
    }

    fn relay_on(&self) -> bool {
        self.on
    }
}

#[derive(Default)]
struct MockLed {
    lit: bool,
}

impl IndicatorLed for MockLed {
    fn set_lit(&mut self, lit: bool) {
        self.lit = lit;
    }
}

#[derive(Default)]
struct Reports(Vec<StateReport>);

impl StatePublisher for Reports {
    fn publish(&mut self, report: StateReport) {
        self.0.push(report);
    }
}

impl Reports {
    fn completions(&self) -> usize {
        self.0
            .iter()
            .filter(|report| report.reason == PublishReason::SequenceComplete)
            .count()
    }
}

struct Harness {
    clock: MockClock,
    sequencer: ModeSequencer<MockRelay, MockClock, Reports>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SequencerConfig::DEFAULT)
    }

    fn with_config(config: SequencerConfig) -> Self {
        let clock = MockClock::default();
        let mut sequencer = ModeSequencer::with_config(
            LEDDY_RING,
            MockRelay::default(),
            clock.clone(),
            Reports::default(),
            config,
        );
        sequencer.bring_up();
        Self { clock, sequencer }
    }

    /// Polls every deadline up to and including `millis`, then parks the clock there.
    fn run_until(&mut self, millis: u64) {
        loop {
            match self.sequencer.next_deadline() {
                Some(deadline) if deadline.0 <= millis => {
                    self.clock.set(deadline.0);
                    self.sequencer.poll();
                }
                _ => break,
            }
        }
        self.clock.set(millis);
    }

    fn settle(&mut self, target: Mode) {
        assert!(self.sequencer.request_mode(target));
        let now = self.clock.now().0;
        self.run_until(now + 2_000);
        assert!(!self.sequencer.is_sequencing());
    }

    fn toggles_since(&self, writes_before: usize) -> usize {
        self.sequencer.relay().writes.len() - writes_before
    }

    fn reports(&self) -> &[StateReport] {
        &self.sequencer.publisher().0
    }
}

#[test]
fn bring_up_opens_relay_and_announces_off() {
    let harness = Harness::new();
    assert_eq!(harness.sequencer.relay().writes, vec![false]);
    assert_eq!(
        harness.reports(),
        &[StateReport {
            mode: Mode::Off,
            name: "off",
            relay_on: false,
            reason: PublishReason::BringUp,
        }]
    );
}

#[test]
fn off_to_blue_takes_five_toggles_at_200ms() {
    let mut harness = Harness::new();

    assert_eq!(
        harness.sequencer.submit(Request::Mode(BLUE)),
        Ok(Accepted::Sequencing {
            target: BLUE,
            toggles: 5
        })
    );
    assert_eq!(harness.sequencer.current_mode(), BLUE);
    assert_eq!(harness.sequencer.last_mode(), Mode::Off);
    assert_eq!(harness.sequencer.state().pending_toggles, 5);

    harness.run_until(999);
    assert_eq!(harness.sequencer.relay().writes.len(), 1 + 4);
    assert_eq!(harness.sequencer.publisher().completions(), 0);

    harness.run_until(1_000);
    assert_eq!(
        harness.sequencer.relay().writes,
        vec![false, true, false, true, false, true]
    );
    let last = harness.reports().last().copied().unwrap();
    assert_eq!(last.name, "blue");
    assert!(last.relay_on);
    assert_eq!(last.reason, PublishReason::SequenceComplete);
    assert_eq!(harness.sequencer.publisher().completions(), 1);
}

#[test]
fn ring_to_ring_distances() {
    let mut harness = Harness::new();
    harness.settle(SUNNY);

    let before = harness.sequencer.relay().writes.len();
    harness.settle(SUNNYBLUE);
    assert_eq!(harness.toggles_since(before), 2);

    let before = harness.sequencer.relay().writes.len();
    harness.settle(BLUE);
    assert_eq!(harness.toggles_since(before), 2);

    let before = harness.sequencer.relay().writes.len();
    harness.settle(SUNNY);
    assert_eq!(harness.toggles_since(before), 2);

    let before = harness.sequencer.relay().writes.len();
    harness.settle(Mode::Ring(3));
    harness.settle(SUNNYBLUE);
    assert_eq!(harness.toggles_since(before), 4 + 4);
    assert!(harness.sequencer.relay().relay_on());
}

#[test]
fn same_mode_request_is_a_no_op() {
    let mut harness = Harness::new();
    harness.settle(SUNNY);
    let writes = harness.sequencer.relay().writes.len();
    let reports = harness.reports().len();

    assert_eq!(harness.sequencer.submit(Request::Mode(SUNNY)), Ok(Accepted::Unchanged));
    assert!(!harness.sequencer.is_sequencing());
    assert_eq!(harness.sequencer.relay().writes.len(), writes);
    assert_eq!(harness.reports().len(), reports);
    assert_eq!(harness.sequencer.last_mode(), Mode::Off);
}

#[test]
fn step_walks_the_ring_and_wraps_through_off() {
    let mut harness = Harness::new();
    let mut visited = Vec::new();

    for _ in 0..4 {
        assert!(harness.sequencer.step());
        let now = harness.clock.now().0;
        harness.run_until(now + 2_000);
        visited.push(harness.sequencer.current_mode());
    }

    assert_eq!(visited, vec![SUNNY, SUNNYBLUE, BLUE, Mode::Off]);
    assert!(!harness.sequencer.relay().relay_on());
    let last = harness.reports().last().copied().unwrap();
    assert_eq!(last.reason, PublishReason::ForcedOff);
    assert_eq!(last.name, "off");
}

#[test]
fn force_off_cancels_running_sequence_without_completion() {
    let mut harness = Harness::new();
    assert!(harness.sequencer.request_mode(BLUE));
    harness.run_until(400);
    assert_eq!(harness.sequencer.state().pending_toggles, 3);

    assert_eq!(
        harness.sequencer.submit(Request::Mode(Mode::Off)),
        Ok(Accepted::ForcedOff)
    );
    assert!(!harness.sequencer.relay().relay_on());
    assert!(!harness.sequencer.is_sequencing());
    assert_eq!(harness.sequencer.next_deadline(), None);
    assert_eq!(harness.sequencer.last_mode(), BLUE);

    harness.run_until(5_000);
    assert_eq!(harness.sequencer.publisher().completions(), 0);
    assert_eq!(
        harness.reports().last().map(|report| report.reason),
        Some(PublishReason::ForcedOff)
    );
}

#[test]
fn rerequest_supersedes_and_completes_once() {
    let mut harness = Harness::new();
    assert!(harness.sequencer.request_mode(BLUE));
    harness.run_until(300);

    // Distance is taken from the believed mode, not from where the relay got to.
    assert_eq!(
        harness.sequencer.submit(Request::Mode(SUNNY)),
        Ok(Accepted::Sequencing {
            target: SUNNY,
            toggles: 2
        })
    );
    assert_eq!(harness.sequencer.next_deadline(), Some(MockInstant(500)));

    harness.run_until(5_000);
    assert_eq!(harness.sequencer.publisher().completions(), 1);
    assert_eq!(harness.reports().last().unwrap().name, "sunny");
    assert_eq!(harness.sequencer.relay().writes.len(), 1 + 1 + 2);
    assert!(
        harness
            .sequencer
            .telemetry()
            .oldest_first()
            .any(|record| record.event == TelemetryEventKind::SequenceSuperseded(BLUE))
    );
}

#[test]
fn reset_blocks_requests_for_ten_seconds() {
    let mut harness = Harness::new();
    harness.settle(BLUE);
    harness.run_until(3_000);

    assert!(harness.sequencer.reset());
    assert!(!harness.sequencer.relay().relay_on());
    assert_eq!(harness.sequencer.current_mode(), Mode::Off);
    assert!(harness.sequencer.is_blocked());
    assert_eq!(
        harness.reports().last().map(|report| (report.name, report.reason)),
        Some(("off", PublishReason::Reset))
    );

    harness.run_until(12_999);
    let reports = harness.reports().len();
    assert_eq!(
        harness.sequencer.submit(Request::Mode(SUNNY)),
        Err(Rejection::Blocked {
            ready_at: MockInstant(13_000)
        })
    );
    assert!(!harness.sequencer.step());
    assert!(!harness.sequencer.resume_last());
    assert_eq!(harness.sequencer.current_mode(), Mode::Off);
    assert_eq!(harness.reports().len(), reports);

    harness.run_until(13_000);
    assert!(!harness.sequencer.is_blocked());
    assert!(harness.sequencer.request_mode(SUNNY));
}

#[test]
fn reset_while_off_restarts_the_window() {
    let mut harness = Harness::new();
    assert!(harness.sequencer.reset());
    harness.run_until(6_000);
    assert!(harness.sequencer.reset());

    harness.run_until(10_000);
    assert!(harness.sequencer.is_blocked());
    assert!(!harness.sequencer.request_mode(BLUE));

    harness.run_until(16_000);
    assert!(!harness.sequencer.is_blocked());
    assert!(harness.sequencer.request_mode(BLUE));
}

#[test]
fn resume_last_returns_to_previous_mode() {
    let mut harness = Harness::new();
    assert_eq!(
        harness.sequencer.submit(Request::ResumeLast),
        Ok(Accepted::Sequencing {
            target: SUNNY,
            toggles: 1
        })
    );
    let now = harness.clock.now().0;
    harness.run_until(now + 1_000);

    harness.settle(BLUE);
    assert!(harness.sequencer.request_mode(Mode::Off));
    assert!(harness.sequencer.resume_last());
    assert_eq!(harness.sequencer.current_mode(), BLUE);
    assert_eq!(harness.sequencer.state().pending_toggles, 5);
}

#[test]
fn reset_remembers_mode_for_resume() {
    let mut harness = Harness::new();
    harness.settle(SUNNYBLUE);
    assert!(harness.sequencer.reset());
    assert_eq!(harness.sequencer.last_mode(), SUNNYBLUE);

    let now = harness.clock.now().0;
    harness.run_until(now + 10_000);
    assert!(harness.sequencer.resume_last());
    assert_eq!(harness.sequencer.current_mode(), SUNNYBLUE);
}

#[test]
fn unknown_mode_is_rejected_without_side_effects() {
    let mut harness = Harness::new();
    assert_eq!(
        harness.sequencer.submit(Request::Mode(Mode::Ring(7))),
        Err(Rejection::UnknownMode(Mode::Ring(7)))
    );
    assert_eq!(harness.sequencer.current_mode(), Mode::Off);
    assert!(!harness.sequencer.is_sequencing());
    assert!(matches!(
        harness.sequencer.telemetry().latest().map(|record| record.event),
        Some(TelemetryEventKind::RequestRejected(_))
    ));
}

#[test]
fn while_sequencing_policy_refuses_instead_of_superseding() {
    let config = SequencerConfig::DEFAULT.with_block_policy(BlockPolicy::WhileSequencing);
    let mut harness = Harness::with_config(config);
    assert!(harness.sequencer.request_mode(BLUE));
    harness.run_until(200);

    assert_eq!(
        harness.sequencer.submit(Request::Mode(SUNNY)),
        Err(Rejection::Busy { remaining: 4 })
    );
    assert_eq!(harness.sequencer.current_mode(), BLUE);
    assert!(harness.sequencer.reset());
}

#[test]
fn status_reports_pending_work_and_cooldown() {
    let mut harness = Harness::new();
    assert!(harness.sequencer.request_mode(SUNNYBLUE));
    harness.run_until(200);

    let status = harness.sequencer.status();
    assert_eq!(status.mode_name, "sunnyblue");
    assert_eq!(status.last_name, "off");
    assert_eq!(status.pending_toggles, 2);
    assert!(status.relay_on);
    assert_eq!(status.cooldown_remaining, None);

    harness.sequencer.reset();
    harness.run_until(2_200);
    assert_eq!(
        harness.sequencer.status().cooldown_remaining,
        Some(Duration::from_secs(8))
    );

    // The window ends at 10.2 s; status must not wait for the next poll.
    harness.clock.set(10_200);
    let status = harness.sequencer.status();
    assert!(!status.is_blocked());
    assert_eq!(status.cooldown_remaining, None);
}

#[test]
fn mirrored_led_follows_every_relay_write() {
    let clock = MockClock::default();
    let relay = MirroredRelay::new(MockRelay::default(), MockLed::default());
    let mut sequencer = ModeSequencer::new(LEDDY_RING, relay, clock.clone(), Reports::default());
    sequencer.bring_up();
    assert!(sequencer.request_mode(SUNNY));

    clock.set(200);
    sequencer.poll();
    assert!(sequencer.relay().relay().relay_on());
    assert!(sequencer.relay().led().lit);

    sequencer.reset();
    assert!(!sequencer.relay().led().lit);
}
