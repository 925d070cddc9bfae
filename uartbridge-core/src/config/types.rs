//! Configuration type definitions
//!
//! These types describe one bridge device. The firmware fills them from
//! constants generated at build time; `Default` is the reference device.

use uartbridge_hal::{UartConfig, SECTOR_SIZE};

/// USB device descriptor identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsbIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// bcdDevice
    pub device_release: u16,
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: &'static str,
    /// Bus power requested in the configuration descriptor
    pub max_power_ma: u16,
}

impl Default for UsbIdentity {
    fn default() -> Self {
        Self {
            vendor_id: 0xCAFE,
            product_id: 0xB0BA,
            device_release: 0x0100,
            manufacturer: "DIY",
            product: "RS232 Bridge",
            serial_number: "123456",
            max_power_ma: 100,
        }
    }
}

/// Hardware UART the bridge forwards to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartSettings {
    pub line: UartConfig,
    /// A host setting this line rate on the CDC port asks for the bootloader
    pub bootloader_baudrate: u32,
}

impl Default for UartSettings {
    fn default() -> Self {
        Self {
            line: UartConfig::default(),
            bootloader_baudrate: 1200,
        }
    }
}

/// Placement and bring-up of the sector store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageSettings {
    /// Sectors reserved at the end of flash
    pub sector_count: u32,
    /// Delay before the filesystem is mounted
    pub start_delay_ms: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sector_count: 128,
            start_delay_ms: 5000,
        }
    }
}

/// SCSI identity and block geometry of the mass-storage unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MscIdentity {
    /// INQUIRY vendor identification (at most 8 bytes)
    pub vendor: &'static str,
    /// INQUIRY product identification (at most 16 bytes), also the USB
    /// interface name
    pub product: &'static str,
    /// INQUIRY product revision (at most 4 bytes)
    pub revision: &'static str,
    /// Block size advertised to the host
    pub block_size: u32,
    /// Accept WRITE(10) from the host
    pub writable: bool,
}

impl Default for MscIdentity {
    fn default() -> Self {
        Self {
            vendor: "DIY",
            product: "RS232 Storage",
            revision: "1.0",
            block_size: SECTOR_SIZE as u32,
            writable: false,
        }
    }
}

/// Complete device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeConfig {
    pub usb: UsbIdentity,
    pub uart: UartSettings,
    pub storage: StorageSettings,
    pub msc: MscIdentity,
}
