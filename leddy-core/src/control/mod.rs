//! Line-oriented control protocol shared between firmware and emulator.
//!
//! Lines are lexed and parsed by [`grammar`] against the vocabulary in
//! [`catalog`], then [`dispatch`] turns them into sequencer requests and [`response`]
//! renders the reply.

pub mod catalog;
pub mod dispatch;
pub mod grammar;
pub mod response;
pub mod status;
