//! USB serial <-> UART bridge task
//!
//! Forwards bytes between the CDC-ACM data port and UART0 in both
//! directions and logs every byte with its transfer index. A host setting
//! the bootloader line rate on the CDC port reboots into the USB bootloader.

use defmt::*;
use embassy_futures::select::{select3, Either3};
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embassy_time::Timer;
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::driver::EndpointError;
use embedded_io_async::{Read, Write};

use uartbridge_core::bridge::{Bridge, Side};

use crate::usb::{UsbDriver, MAX_PACKET_SIZE};

/// How often the CDC line coding is checked while the link is idle
const LINE_CODING_POLL_MS: u64 = 100;

/// Bridge task - shuttles bytes between the host and the RS232 side
#[embassy_executor::task]
pub async fn bridge_task(
    mut cdc: CdcAcmClass<'static, UsbDriver>,
    mut tx: BufferedUartTx,
    mut rx: BufferedUartRx,
    bootloader_baudrate: u32,
) {
    info!("Bridge task started");

    let mut bridge = Bridge::new();
    let mut usb_buf = [0u8; MAX_PACKET_SIZE as usize];
    let mut uart_buf = [0u8; MAX_PACKET_SIZE as usize];

    loop {
        cdc.wait_connection().await;
        info!("CDC connected");

        loop {
            let coding = cdc.line_coding();
            if coding.data_rate() == bootloader_baudrate {
                info!("CDC line coding {} baud: resetting to bootloader", coding.data_rate());
                Timer::after_millis(10).await;
                embassy_rp::rom_data::reset_to_usb_boot(0, 0);
            }

            let event = select3(
                cdc.read_packet(&mut usb_buf),
                rx.read(&mut uart_buf),
                Timer::after_millis(LINE_CODING_POLL_MS),
            )
            .await;

            match event {
                Either3::First(Ok(n)) => {
                    log_transfers(&mut bridge, Side::Usb, &usb_buf[..n]);
                    if let Err(e) = tx.write_all(&usb_buf[..n]).await {
                        warn!("UART write error: {:?}", e);
                    }
                }
                Either3::First(Err(EndpointError::Disabled)) => {
                    info!("CDC disconnected");
                    break;
                }
                Either3::First(Err(e)) => {
                    warn!("CDC read error: {:?}", e);
                }
                Either3::Second(Ok(0)) => {}
                Either3::Second(Ok(n)) => {
                    log_transfers(&mut bridge, Side::Uart, &uart_buf[..n]);
                    match cdc.write_packet(&uart_buf[..n]).await {
                        Ok(()) => {}
                        Err(EndpointError::Disabled) => {
                            info!("CDC disconnected");
                            break;
                        }
                        Err(e) => {
                            warn!("CDC write error: {:?}", e);
                        }
                    }
                }
                Either3::Second(Err(e)) => {
                    warn!("UART read error: {:?}", e);
                }
                Either3::Third(()) => {}
            }
        }
    }
}

/// Number each forwarded byte and log it as `<index> <source>: 0x<byte>`
fn log_transfers(bridge: &mut Bridge, from: Side, bytes: &[u8]) {
    for &byte in bytes {
        let t = bridge.record(from, byte);
        trace!("{} {}: {=u8:#04x}", t.index, t.from.name(), t.byte);
    }
}
