use embassy_futures::select::select;
use embassy_stm32::exti::ExtiInput;
use embassy_time::{Instant, Timer};
use leddy_core::button::PressClassifier;

use crate::clock::FirmwareInstant;
use crate::control::{ControlRequest, REQUEST_QUEUE};

/// Debounces the mode button and forwards classified presses.
#[embassy_executor::task]
pub async fn run(mut button: ExtiInput<'static>) -> ! {
    let requests = REQUEST_QUEUE.sender();
    let mut classifier: PressClassifier<FirmwareInstant> = PressClassifier::default();

    loop {
        let deadline = classifier.next_deadline();
        let wake = async {
            match deadline {
                Some(at) => Timer::at(at.into_embassy()).await,
                None => core::future::pending::<()>().await,
            }
        };

        // Edge or deadline, the classifier only needs a fresh sample.
        select(button.wait_for_any_edge(), wake).await;
        let now = FirmwareInstant::from(Instant::now());
        let event = classifier.update(button.is_low(), now);

        if let Some(event) = event {
            defmt::info!("button: {}", event);
            requests.send(ControlRequest::Button(event)).await;
        }
    }
}
