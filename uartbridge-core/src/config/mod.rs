//! Configuration types
//!
//! Values arrive from the firmware's build-time configuration and are
//! checked once at boot with [`BridgeConfig::validate`].

pub mod types;

pub use types::*;

use uartbridge_hal::SECTOR_SIZE;

/// Smallest store that still holds a partition table and a FAT12 volume
pub const MIN_SECTORS: u32 = 16;

/// Flash kept for the boot stage and the firmware image
///
/// The store may only occupy what lies past this point; the linker script
/// gives the image everything in front of the store.
pub const FIRMWARE_RESERVED: usize = 512 * 1024;

/// Smallest block size a host will accept
pub const MIN_BLOCK_SIZE: u32 = 512;

pub const MAX_VENDOR_LEN: usize = 8;
pub const MAX_PRODUCT_LEN: usize = 16;
pub const MAX_REVISION_LEN: usize = 4;

/// USB string descriptors carry at most 126 UTF-16 units
pub const MAX_USB_STRING_LEN: usize = 126;

/// Configuration validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A required string is empty
    EmptyString { field: &'static str },
    /// A string does not fit its descriptor field
    StringTooLong { field: &'static str, max: usize },
    /// Block size is not a power of two in `[512, SECTOR_SIZE]`
    InvalidBlockSize(u32),
    /// Sector count outside what the chip can hold
    InvalidSectorCount { count: u32, min: u32, max: u32 },
    /// UART baud rate of zero
    ZeroBaudrate,
}

impl BridgeConfig {
    /// Check every field against protocol limits and a chip of `flash_size` bytes
    pub fn validate(&self, flash_size: usize) -> Result<(), ConfigError> {
        check_string("manufacturer", self.usb.manufacturer, MAX_USB_STRING_LEN)?;
        check_string("product", self.usb.product, MAX_USB_STRING_LEN)?;
        check_string("serial_number", self.usb.serial_number, MAX_USB_STRING_LEN)?;

        check_string("msc.vendor", self.msc.vendor, MAX_VENDOR_LEN)?;
        check_string("msc.product", self.msc.product, MAX_PRODUCT_LEN)?;
        check_string("msc.revision", self.msc.revision, MAX_REVISION_LEN)?;

        let block_size = self.msc.block_size;
        if !block_size.is_power_of_two()
            || block_size < MIN_BLOCK_SIZE
            || block_size > SECTOR_SIZE as u32
        {
            return Err(ConfigError::InvalidBlockSize(block_size));
        }

        let max = max_sectors(flash_size);
        let count = self.storage.sector_count;
        if count < MIN_SECTORS || count > max {
            return Err(ConfigError::InvalidSectorCount {
                count,
                min: MIN_SECTORS,
                max,
            });
        }

        if self.uart.line.baudrate == 0 || self.uart.bootloader_baudrate == 0 {
            return Err(ConfigError::ZeroBaudrate);
        }
        Ok(())
    }
}

/// Sectors available to the store on a chip of `flash_size` bytes
pub fn max_sectors(flash_size: usize) -> u32 {
    let free = flash_size.saturating_sub(FIRMWARE_RESERVED);
    u32::try_from(free / SECTOR_SIZE).unwrap_or(u32::MAX)
}

fn check_string(field: &'static str, value: &str, max: usize) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::EmptyString { field });
    }
    if value.len() > max {
        return Err(ConfigError::StringTooLong { field, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLASH_2MB: usize = 2 * 1024 * 1024;

    #[test]
    fn test_defaults_are_reference_device() {
        let config = BridgeConfig::default();
        assert_eq!(config.usb.vendor_id, 0xCAFE);
        assert_eq!(config.usb.product_id, 0xB0BA);
        assert_eq!(config.usb.device_release, 0x0100);
        assert_eq!(config.usb.product, "RS232 Bridge");
        assert_eq!(config.uart.line.baudrate, 38400);
        assert_eq!(config.uart.bootloader_baudrate, 1200);
        assert_eq!(config.storage.sector_count, 128);
        assert_eq!(config.storage.start_delay_ms, 5000);
        assert!(!config.msc.writable);
        assert_eq!(config.validate(FLASH_2MB), Ok(()));
    }

    #[test]
    fn test_vendor_too_long() {
        let mut config = BridgeConfig::default();
        config.msc.vendor = "TOOLONGVENDOR";
        assert_eq!(
            config.validate(FLASH_2MB),
            Err(ConfigError::StringTooLong {
                field: "msc.vendor",
                max: 8
            })
        );
    }

    #[test]
    fn test_empty_serial_rejected() {
        let mut config = BridgeConfig::default();
        config.usb.serial_number = "";
        assert_eq!(
            config.validate(FLASH_2MB),
            Err(ConfigError::EmptyString {
                field: "serial_number"
            })
        );
    }

    #[test]
    fn test_block_size_bounds() {
        let mut config = BridgeConfig::default();
        for ok in [512, 1024, 2048, 4096] {
            config.msc.block_size = ok;
            assert_eq!(config.validate(FLASH_2MB), Ok(()));
        }
        for bad in [0, 256, 1000, 8192] {
            config.msc.block_size = bad;
            assert_eq!(
                config.validate(FLASH_2MB),
                Err(ConfigError::InvalidBlockSize(bad))
            );
        }
    }

    #[test]
    fn test_sector_count_must_fit_chip() {
        let mut config = BridgeConfig::default();
        config.storage.sector_count = 385;
        assert_eq!(
            config.validate(FLASH_2MB),
            Err(ConfigError::InvalidSectorCount {
                count: 385,
                min: MIN_SECTORS,
                max: 384
            })
        );

        config.storage.sector_count = MIN_SECTORS - 1;
        assert!(config.validate(FLASH_2MB).is_err());
    }

    #[test]
    fn test_store_never_reaches_firmware_image() {
        let mut config = BridgeConfig::default();
        // Whole chip: would erase the running image on first format
        config.storage.sector_count = 512;
        assert!(matches!(
            config.validate(FLASH_2MB),
            Err(ConfigError::InvalidSectorCount { max: 384, .. })
        ));

        config.storage.sector_count = max_sectors(FLASH_2MB);
        assert_eq!(config.validate(FLASH_2MB), Ok(()));
        let store_start = FLASH_2MB - config.storage.sector_count as usize * SECTOR_SIZE;
        assert!(store_start >= FIRMWARE_RESERVED);
    }

    #[test]
    fn test_chip_smaller_than_reservation_has_no_room() {
        assert_eq!(max_sectors(FIRMWARE_RESERVED), 0);
        assert_eq!(max_sectors(FIRMWARE_RESERVED / 2), 0);
        assert!(BridgeConfig::default().validate(FIRMWARE_RESERVED).is_err());
    }

    #[test]
    fn test_zero_baud_rejected() {
        let mut config = BridgeConfig::default();
        config.uart.line.baudrate = 0;
        assert_eq!(config.validate(FLASH_2MB), Err(ConfigError::ZeroBaudrate));
    }
}
