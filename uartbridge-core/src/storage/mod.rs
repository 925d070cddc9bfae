//! Flash-backed block storage
//!
//! The tail of the chip's flash is exposed as a fixed array of
//! erase-sector sized blocks. [`FlashDisk`] is the only code path that
//! erases or programs flash; [`SharedDisk`] hands it out to the
//! filesystem and mass-storage consumers.

pub mod disk;
pub mod region;
pub mod shared;

#[cfg(test)]
pub(crate) mod mock;

pub use disk::{DiskError, FlashDisk, FlashFault, WriteOutcome};
pub use region::FlashRegion;
pub use shared::SharedDisk;
