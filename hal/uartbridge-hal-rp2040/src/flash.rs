//! Raw flash driver for RP2040
//!
//! The RP2040 executes from external QSPI flash mapped at [`XIP_BASE`].
//! Reads go straight through that mapping; erase and write go through
//! the boot ROM routines wrapped by `embassy-rp`, which flush the XIP
//! cache afterwards so the mapping stays coherent.
//!
//! Implements `embedded-storage`'s `NorFlash` by delegating to `embassy-rp`,
//! which already rejects unaligned and out-of-bounds requests, and adds
//! the `MappedFlash` view from `uartbridge-hal`.

use embassy_rp::flash::{Blocking, Error, Flash, ERASE_SIZE, PAGE_SIZE};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;

use uartbridge_hal::flash::{ErrorType, MappedFlash, NorFlash, ReadNorFlash};

/// Flash fitted on the Raspberry Pi Pico
pub const FLASH_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// Start of the execute-in-place window
pub const XIP_BASE: usize = 0x1000_0000;

const _: () = assert!(ERASE_SIZE == uartbridge_hal::SECTOR_SIZE);
const _: () = assert!(PAGE_SIZE == uartbridge_hal::PAGE_SIZE);

/// RP2040 raw flash implementation
pub struct Rp2040Flash<'d> {
    flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>,
}

impl<'d> Rp2040Flash<'d> {
    /// Take ownership of the flash peripheral
    pub fn new(flash: Peri<'d, FLASH>) -> Self {
        Self {
            flash: Flash::new_blocking(flash),
        }
    }
}

impl ErrorType for Rp2040Flash<'_> {
    type Error = Error;
}

impl ReadNorFlash for Rp2040Flash<'_> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Error> {
        self.flash.blocking_read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE
    }
}

impl NorFlash for Rp2040Flash<'_> {
    const WRITE_SIZE: usize = PAGE_SIZE;
    const ERASE_SIZE: usize = ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Error> {
        self.flash.blocking_erase(from, to)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        self.flash.blocking_write(offset, bytes)
    }
}

impl MappedFlash for Rp2040Flash<'_> {
    fn contents(&self) -> &[u8] {
        // SAFETY: the XIP window maps the whole chip read-only for the life
        // of the program. Mutation only happens through `&mut self`, so no
        // slice handed out here can be alive across an erase/write.
        unsafe { core::slice::from_raw_parts(XIP_BASE as *const u8, FLASH_SIZE) }
    }
}
