//! Monotonic time for the sequencer, backed by the Embassy time driver.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::ops::Add;
use core::time::Duration;

use embassy_time::Instant;
use leddy_core::telemetry::TelemetryInstant;

/// Embassy instant that speaks `core::time::Duration`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(Instant::from_micros(micros))
    }

    #[must_use]
    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl Add<Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self::from_micros(self.as_micros().saturating_add(micros))
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.as_micros().saturating_sub(earlier.as_micros()))
    }
}

/// Sequencer clock reading the Embassy time driver.
#[cfg(target_os = "none")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyClock;

#[cfg(target_os = "none")]
impl leddy_core::sequencer::Clock for EmbassyClock {
    type Instant = FirmwareInstant;

    fn now(&self) -> FirmwareInstant {
        FirmwareInstant(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_core_durations() {
        let start = FirmwareInstant::from_micros(1_000);
        let later = start + Duration::from_millis(200);
        assert_eq!(later.as_micros(), 201_000);
        assert_eq!(later.saturating_duration_since(start), Duration::from_millis(200));
        assert_eq!(start.saturating_duration_since(later), Duration::ZERO);
    }

    #[test]
    fn addition_saturates() {
        let end = FirmwareInstant::from_micros(u64::MAX - 1);
        assert_eq!((end + Duration::from_secs(10)).as_micros(), u64::MAX);
    }
}
