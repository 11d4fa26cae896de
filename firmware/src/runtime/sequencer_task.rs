use embassy_futures::select::{Either, select};
use embassy_time::Timer;
use leddy_core::control::dispatch::ControlExecutor;
use leddy_core::sequencer::ModeSequencer;

use crate::clock::EmbassyClock;
use crate::control::{ConsolePublisher, OUTBOUND_QUEUE, REQUEST_QUEUE, handle_request, try_queue_text};
use crate::hw::FixtureRelay;
use crate::status;
use crate::telemetry::TelemetryLogger;

pub type FixtureSequencer = ModeSequencer<FixtureRelay, EmbassyClock, ConsolePublisher>;

/// Owns the sequencer: applies queued requests and wakes for toggle and
/// cool-down deadlines. Console output is queued without waiting.
#[embassy_executor::task]
pub async fn run(mut executor: ControlExecutor<FixtureSequencer>) -> ! {
    let requests = REQUEST_QUEUE.receiver();
    let mut logger = TelemetryLogger::new();

    executor.sink_mut().bring_up();
    defmt::info!("sequencer: relay open, mode off");

    loop {
        let deadline = executor.sink().next_deadline();
        let wake = async {
            match deadline {
                Some(at) => Timer::at(at.into_embassy()).await,
                None => core::future::pending::<()>().await,
            }
        };

        match select(requests.receive(), wake).await {
            Either::First(request) => {
                if let Some(reply) = handle_request(&mut executor, &request)
                    && status::host_attached()
                    && !try_queue_text(&OUTBOUND_QUEUE, &reply)
                {
                    defmt::warn!("sequencer: console reply truncated (queue full)");
                }
            }
            Either::Second(()) => executor.sink_mut().poll(),
        }

        logger.drain(executor.sink().ring(), executor.sink().telemetry());
    }
}
