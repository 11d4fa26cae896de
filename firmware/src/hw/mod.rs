//! Board wiring: relay coil driver, indicator LED and the mode button.

use embassy_stm32::gpio::Output;
use leddy_core::sequencer::{IndicatorLed, MirroredRelay, RelayDriver};

/// Relay driven through a low-side transistor; high energises the coil.
pub struct HardwareRelay<'d> {
    pin: Output<'d>,
}

impl<'d> HardwareRelay<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

impl RelayDriver for HardwareRelay<'_> {
    fn set_relay(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }

    fn relay_on(&self) -> bool {
        self.pin.is_set_high()
    }
}

/// Indicator LED lit while the relay is closed.
pub struct StatusLed<'d> {
    pin: Output<'d>,
}

impl<'d> StatusLed<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

impl IndicatorLed for StatusLed<'_> {
    fn set_lit(&mut self, lit: bool) {
        if lit {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

/// Relay output as seen by the sequencer.
pub type FixtureRelay = MirroredRelay<HardwareRelay<'static>, StatusLed<'static>>;
