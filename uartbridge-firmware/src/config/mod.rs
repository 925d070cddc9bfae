//! Build-time device configuration
//!
//! `bridge.toml` is validated by `build.rs` and turned into constants here.

use uartbridge_core::config::{BridgeConfig, MscIdentity, StorageSettings, UartSettings, UsbIdentity};
use uartbridge_hal::serial::{DataBits, Parity, StopBits};
use uartbridge_hal::UartConfig;

mod generated {
    use super::{DataBits, Parity, StopBits};

    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

/// Device configuration compiled into the firmware
pub fn bridge_config() -> BridgeConfig {
    use generated::*;

    BridgeConfig {
        usb: UsbIdentity {
            vendor_id: USB_VENDOR_ID,
            product_id: USB_PRODUCT_ID,
            device_release: USB_DEVICE_RELEASE,
            manufacturer: USB_MANUFACTURER,
            product: USB_PRODUCT,
            serial_number: USB_SERIAL_NUMBER,
            max_power_ma: USB_MAX_POWER_MA,
        },
        uart: UartSettings {
            line: UartConfig {
                baudrate: UART_BAUDRATE,
                data_bits: UART_DATA_BITS,
                parity: UART_PARITY,
                stop_bits: UART_STOP_BITS,
            },
            bootloader_baudrate: UART_BOOTLOADER_BAUDRATE,
        },
        storage: StorageSettings {
            sector_count: STORAGE_SECTOR_COUNT,
            start_delay_ms: STORAGE_START_DELAY_MS,
        },
        msc: MscIdentity {
            vendor: MSC_VENDOR,
            product: MSC_PRODUCT,
            revision: MSC_REVISION,
            block_size: MSC_BLOCK_SIZE,
            writable: MSC_WRITABLE,
        },
    }
}

/// UART line settings in the form `embassy-rp` expects
pub fn uart_config(line: &UartConfig) -> embassy_rp::uart::Config {
    let mut config = embassy_rp::uart::Config::default();
    config.baudrate = line.baudrate;
    config.data_bits = match line.data_bits {
        DataBits::Seven => embassy_rp::uart::DataBits::DataBits7,
        DataBits::Eight => embassy_rp::uart::DataBits::DataBits8,
    };
    config.parity = match line.parity {
        Parity::None => embassy_rp::uart::Parity::ParityNone,
        Parity::Even => embassy_rp::uart::Parity::ParityEven,
        Parity::Odd => embassy_rp::uart::Parity::ParityOdd,
    };
    config.stop_bits = match line.stop_bits {
        StopBits::One => embassy_rp::uart::StopBits::STOP1,
        StopBits::Two => embassy_rp::uart::StopBits::STOP2,
    };
    config
}
