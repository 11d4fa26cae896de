#![no_std]

// Relay-pulse mode sequencing for the Leddy fixture.
//
// The fixture changes colour by counting power cycles on its mains input, so
// everything here reduces to deciding how many times to flip one relay and
// when. The crate avoids the Rust standard library so the firmware and the
// host emulator share the same state machine, grammar and telemetry.

pub mod button;
pub mod control;
pub mod modes;
pub mod sequencer;
pub mod telemetry;
