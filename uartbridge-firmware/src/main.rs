//! UART Bridge - USB to RS232 adapter firmware
//!
//! Main firmware binary for RP2040 boards. Exposes a CDC-ACM serial port
//! bridged to UART0 and a mass-storage view of a flash sector store in
//! one composite USB device.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::{UART0, USB};
use embassy_rp::uart::{BufferedInterruptHandler, Uart};
use embassy_rp::usb::{Driver, InterruptHandler as UsbInterruptHandler};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use uartbridge_core::config::BridgeConfig;
use uartbridge_core::msc::MscDevice;
use uartbridge_core::storage::{FlashDisk, SharedDisk};
use uartbridge_hal::SECTOR_SIZE;
use uartbridge_hal_rp2040::{Rp2040Flash, FLASH_SIZE};

mod channels;
mod config;
mod tasks;
mod usb;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => UsbInterruptHandler<USB>;
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

// Sector store and mass-storage unit, shared by reference between tasks
static DISK: StaticCell<tasks::Disk> = StaticCell::new();
static MSC: StaticCell<tasks::Msc> = StaticCell::new();
static BLOCK_BUF: StaticCell<[u8; SECTOR_SIZE]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("UART bridge firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    let config = load_config();

    // UART0 on GPIO0 (TX) / GPIO1 (RX)
    let uart_config = config::uart_config(&config.uart.line);
    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);
    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config);
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (tx, rx) = uart.split();
    info!("UART initialized at {} baud", config.uart.line.baudrate);

    // Sector store at the top of flash
    let flash = Rp2040Flash::new(p.FLASH);
    let store = FlashDisk::new(flash, config.storage.sector_count);
    let disk: &'static tasks::Disk = DISK.init(SharedDisk::new(store));
    let msc: &'static tasks::Msc = MSC.init(MscDevice::new(disk, config.msc));
    let block_buf = BLOCK_BUF.init([0u8; SECTOR_SIZE]);
    info!(
        "Sector store: {} sectors of {} bytes",
        disk.sector_count(),
        SECTOR_SIZE
    );

    // Composite USB device
    let driver = Driver::new(p.USB, Irqs);
    let parts = usb::build(driver, &config);
    info!("USB device built");

    spawner.spawn(tasks::usb_task(parts.device)).unwrap();
    spawner
        .spawn(tasks::bridge_task(
            parts.cdc,
            tx,
            rx,
            config.uart.bootloader_baudrate,
        ))
        .unwrap();
    spawner
        .spawn(tasks::msc_task(msc, parts.msc_in, parts.msc_out, block_buf))
        .unwrap();
    spawner
        .spawn(tasks::storage_task(disk, msc, config.storage.start_delay_ms))
        .unwrap();

    info!("All tasks spawned, firmware running");
}

/// Load the compiled-in configuration, falling back to defaults if it
/// does not fit this board
fn load_config() -> BridgeConfig {
    let config = config::bridge_config();
    match config.validate(FLASH_SIZE) {
        Ok(()) => {
            info!("Configuration loaded");
            config
        }
        Err(e) => {
            warn!("Invalid configuration ({:?}), using defaults", e);
            // The linker script was sized for the configured store
            BridgeConfig {
                storage: config.storage,
                ..BridgeConfig::default()
            }
        }
    }
}
