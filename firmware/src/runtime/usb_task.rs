use super::USB_STORAGE;
use crate::console::LineAssembler;
use crate::control::{ConsoleFrame, ControlRequest, OUTBOUND_QUEUE, REQUEST_QUEUE, try_queue_text};
use crate::status;
use crate::usb::{self, UsbDeviceStrings};
use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::driver::EndpointError;

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let usb::UsbConsole { mut device, port } =
        usb::UsbConsole::new(driver, storage, UsbDeviceStrings::default());

    join(device.run(), run_console(port)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn run_console<D>(port: usb::ConsolePort<D>) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let usb::ConsolePort {
        mut sender,
        mut receiver,
        control,
    } = port;
    let requests = REQUEST_QUEUE.sender();
    let outbound = OUTBOUND_QUEUE.receiver();
    let mut assembler = LineAssembler::new();
    let mut ingress = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut pending_tx: Option<ConsoleFrame> = None;

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &mut sender).await;
        pending_tx.take();
        assembler.clear();
        // Output queued while detached is stale.
        while outbound.try_receive().is_ok() {}
        status::set_host_attached(true);

        defmt::info!("usb: console connected");

        loop {
            match select3(
                receiver.read_packet(&mut ingress),
                async {
                    if pending_tx.is_none() {
                        pending_tx = Some(outbound.receive().await);
                    }

                    let result = match pending_tx.as_ref() {
                        Some(frame) => sender.write_packet(frame).await,
                        None => Ok(()),
                    };
                    if result.is_ok() {
                        pending_tx = None;
                    }
                    result
                },
                control.control_changed(),
            )
            .await
            {
                Either3::First(Ok(count)) => {
                    for &byte in &ingress[..count] {
                        match assembler.ingest(byte) {
                            Ok(Some(line)) => {
                                // Never block here: the sequencer may be waiting on our output.
                                if requests.try_send(ControlRequest::Line(line)).is_err() {
                                    defmt::warn!("usb: request queue full, line dropped");
                                    queue_notice("error: busy, line dropped\n");
                                }
                            }
                            Ok(None) => {}
                            Err(error) => {
                                defmt::warn!("usb: console input rejected: {}", error);
                                queue_notice(error.message());
                            }
                        }
                    }
                }
                Either3::First(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console interface disabled");
                    break;
                }
                Either3::First(Err(_)) => {
                    defmt::warn!("usb: console read error");
                }
                Either3::Second(Ok(())) => {}
                Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console write disabled");
                    break;
                }
                Either3::Second(Err(_)) => {
                    defmt::warn!("usb: console write error");
                }
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: host dropped DTR");
                        break;
                    }
                }
            }
        }

        status::set_host_attached(false);
    }
}

fn queue_notice(text: &str) {
    if !try_queue_text(&OUTBOUND_QUEUE, text) {
        defmt::warn!("usb: console output queue full");
    }
}

async fn wait_for_dtr<D>(
    control: &embassy_usb::class::cdc_acm::ControlChanged<'static>,
    sender: &mut embassy_usb::class::cdc_acm::Sender<'static, D>,
) where
    D: embassy_usb::driver::Driver<'static>,
{
    while !sender.dtr() {
        control.control_changed().await;
    }
}
