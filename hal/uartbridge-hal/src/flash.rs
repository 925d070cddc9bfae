//! Raw NOR flash abstractions
//!
//! NOR flash can be read like memory, but writing is split into two
//! primitives with different granularity:
//!
//! - **erase** resets a whole sector to `0xFF`
//! - **write** can only clear bits (1 → 0) and works on pages
//!
//! Erase, write and their alignment and bounds rules come from
//! `embedded-storage`'s [`NorFlash`]. [`MappedFlash`] only adds the
//! memory-mapped view the sector store reads through.

pub use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashError, NorFlashErrorKind,
    ReadNorFlash,
};

/// Erase granularity in bytes
pub const SECTOR_SIZE: usize = 4096;

/// Program granularity in bytes
pub const PAGE_SIZE: usize = 256;

/// Value of every byte after an erase
pub const ERASED_BYTE: u8 = 0xFF;

const _: () = assert!(SECTOR_SIZE % PAGE_SIZE == 0);

/// One erase sector worth of bytes
pub type Sector = [u8; SECTOR_SIZE];

/// NOR flash that is also readable as plain memory
///
/// Offsets are relative to the start of the chip, not to any reserved
/// region. Implementations must not perform their own read-modify-write:
/// `write` only ever clears bits.
pub trait MappedFlash: NorFlash {
    /// Read-only view of the whole chip
    ///
    /// The returned slice is exactly `capacity()` bytes long and reflects
    /// the result of every completed erase/write.
    fn contents(&self) -> &[u8];
}
