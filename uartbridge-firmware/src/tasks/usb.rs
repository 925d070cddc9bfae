//! USB device task

use defmt::*;
use embassy_usb::UsbDevice;

use crate::usb::UsbDriver;

/// Runs the USB device state machine and control pipe
#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    info!("USB task started");
    device.run().await
}
