use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use leddy_core::control::dispatch::ControlExecutor;
use leddy_core::modes::LEDDY_RING;
use leddy_core::sequencer::{MirroredRelay, ModeSequencer};
use static_cell::StaticCell;

use crate::clock::EmbassyClock;
use crate::control::ConsolePublisher;
use crate::hw::{HardwareRelay, StatusLed};
use crate::usb;

mod button_task;
mod sequencer_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        EXTI0,
        PA5,
        PA6,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    let relay = MirroredRelay::new(
        HardwareRelay::new(Output::new(PA6, Level::Low, Speed::Low)),
        StatusLed::new(Output::new(PA5, Level::Low, Speed::Low)),
    );
    let sequencer = ModeSequencer::new(LEDDY_RING, relay, EmbassyClock, ConsolePublisher);
    let executor = ControlExecutor::new(sequencer);

    // Active low with the internal pull-up.
    let button = ExtiInput::new(PA0, EXTI0, Pull::Up);

    spawner
        .spawn(sequencer_task::run(executor))
        .expect("failed to spawn sequencer task");

    spawner
        .spawn(button_task::run(button))
        .expect("failed to spawn button task");

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    core::future::pending::<()>().await;
}
