//! Queues and reply plumbing between the USB console, the button and the
//! sequencer task.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::{String, Vec};
use leddy_core::button::ButtonEvent;
use leddy_core::control::dispatch::{CommandError, CommandOutcome, ControlExecutor};
use leddy_core::control::response::write_response;
use leddy_core::sequencer::{Clock, ModeSequencer, RelayDriver, StatePublisher, StateReport};

use crate::console::ConsoleLine;
use crate::status;
use crate::telemetry;

/// Work items consumed by the sequencer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlRequest {
    /// A complete console line.
    Line(ConsoleLine),
    /// A classified press of the physical button.
    Button(ButtonEvent),
}

pub const REQUEST_QUEUE_DEPTH: usize = 4;
pub type RequestQueue = Channel<CriticalSectionRawMutex, ControlRequest, REQUEST_QUEUE_DEPTH>;

/// Size of a single USB CDC packet.
pub const FRAME_LEN: usize = 64;
pub type ConsoleFrame = Vec<u8, FRAME_LEN>;

/// Deep enough for a full `history` reply, so replies are never cut short
/// while the host keeps reading.
pub const OUTBOUND_QUEUE_DEPTH: usize = 40;
pub type OutboundQueue = Channel<CriticalSectionRawMutex, ConsoleFrame, OUTBOUND_QUEUE_DEPTH>;

/// Requests headed for the sequencer task.
pub static REQUEST_QUEUE: RequestQueue = Channel::new();
/// Console output headed for the USB task.
pub static OUTBOUND_QUEUE: OutboundQueue = Channel::new();

/// Room for a full `history` dump.
pub const REPLY_CAPACITY: usize = 2048;
pub type Reply = String<REPLY_CAPACITY>;

const TRUNCATED: &str = "... (truncated)\n";

/// Executes one request and renders the console reply, if any.
///
/// Button presses have no console to answer; their effect is announced
/// through the state publisher instead.
pub fn handle_request<R, C, P>(
    executor: &mut ControlExecutor<ModeSequencer<R, C, P>>,
    request: &ControlRequest,
) -> Option<Reply>
where
    R: RelayDriver,
    C: Clock,
    P: StatePublisher,
{
    match request {
        ControlRequest::Line(line) => {
            let result = executor.execute(line);
            if let Err(CommandError::Rejected(rejection)) = &result {
                telemetry::log_rejection("console", rejection.kind());
            }
            Some(render_reply(executor.sink(), &result))
        }
        ControlRequest::Button(event) => {
            if let Err(rejection) = executor.sink_mut().submit(event.request()) {
                telemetry::log_rejection("button", rejection.kind());
            }
            None
        }
    }
}

fn render_reply<R, C, P>(
    sequencer: &ModeSequencer<R, C, P>,
    result: &Result<CommandOutcome, CommandError<'_, C::Instant>>,
) -> Reply
where
    R: RelayDriver,
    C: Clock,
    P: StatePublisher,
{
    let mut reply = Reply::new();
    if write_response(&mut reply, sequencer, result).is_err() {
        while reply.len() > REPLY_CAPACITY - TRUNCATED.len() {
            reply.pop();
        }
        if reply.push_str(TRUNCATED).is_err() {
            reply.clear();
        }
    }
    reply
}

/// Splits text into USB-sized frames, expanding `\n` to `\r\n`.
pub struct FrameEncoder<'a> {
    bytes: core::slice::Iter<'a, u8>,
    newline_due: bool,
}

impl<'a> FrameEncoder<'a> {
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes().iter(),
            newline_due: false,
        }
    }
}

impl Iterator for FrameEncoder<'_> {
    type Item = ConsoleFrame;

    fn next(&mut self) -> Option<ConsoleFrame> {
        let mut frame = ConsoleFrame::new();
        while !frame.is_full() {
            let byte = if core::mem::take(&mut self.newline_due) {
                b'\n'
            } else {
                match self.bytes.next() {
                    Some(b'\n') => {
                        self.newline_due = true;
                        b'\r'
                    }
                    Some(&byte) => byte,
                    None => break,
                }
            };
            if frame.push(byte).is_err() {
                break;
            }
        }
        (!frame.is_empty()).then_some(frame)
    }
}

/// Queues `text` for the console without waiting for room.
///
/// Returns `false` once the queue is full; the remaining frames are dropped.
pub fn try_queue_text(queue: &OutboundQueue, text: &str) -> bool {
    FrameEncoder::new(text).all(|frame| queue.try_send(frame).is_ok())
}

/// Publishes state reports to the console while a host is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsolePublisher;

impl StatePublisher for ConsolePublisher {
    fn publish(&mut self, report: StateReport) {
        telemetry::log_state_report(&report);
        if !status::host_attached() {
            return;
        }

        let mut line: String<FRAME_LEN> = String::new();
        if writeln!(line, "event {report}").is_err() {
            telemetry::emit_warning("console", "state report truncated");
            return;
        }
        if !try_queue_text(&OUTBOUND_QUEUE, &line) {
            telemetry::emit_warning("console", "dropping state report (queue full)");
        }
    }
}
