#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared link state for the firmware target.
//!
//! The USB task owns the CDC interface; everything else only needs to know
//! whether a host is listening before it queues output.

use portable_atomic::{AtomicBool, Ordering};

/// Tracks whether a host has asserted DTR on the console interface.
static HOST_ATTACHED: AtomicBool = AtomicBool::new(false);

/// Updates the cached host attachment flag.
pub fn set_host_attached(attached: bool) {
    HOST_ATTACHED.store(attached, Ordering::Relaxed);
}

/// Returns `true` while a host terminal holds the console open.
pub fn host_attached() -> bool {
    HOST_ATTACHED.load(Ordering::Relaxed)
}
