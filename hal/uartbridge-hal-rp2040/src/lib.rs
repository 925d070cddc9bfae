//! RP2040-specific HAL for the uartbridge firmware
//!
//! This crate provides RP2040-specific implementations of the shared
//! `uartbridge-hal` traits:
//!
//! - Raw flash driver (implements `NorFlash` and
//!   `uartbridge_hal::MappedFlash`) over the execute-in-place mapping of
//!   the external QSPI flash

#![no_std]

pub mod flash;

// Re-export shared traits from uartbridge-hal for convenience
pub use uartbridge_hal::{MappedFlash, NorFlash};

pub use flash::{Rp2040Flash, FLASH_SIZE};
