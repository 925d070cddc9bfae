//! Shared handle to the one sector store
//!
//! The filesystem adapter and the mass-storage responder both hold a
//! `&SharedDisk`. Every access is serialized through a blocking mutex, so
//! the two can never interleave inside a sector write.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use uartbridge_hal::{MappedFlash, Sector, SECTOR_SIZE};

use super::disk::{DiskError, FlashDisk, WriteOutcome};

/// Sector store behind a critical-section mutex
pub struct SharedDisk<F> {
    disk: Mutex<CriticalSectionRawMutex, RefCell<FlashDisk<F>>>,
}

impl<F: MappedFlash> SharedDisk<F> {
    /// Wrap a sector store for sharing
    pub fn new(disk: FlashDisk<F>) -> Self {
        Self {
            disk: Mutex::new(RefCell::new(disk)),
        }
    }

    /// Run `f` with exclusive access to the store
    ///
    /// `f` must not call back into this `SharedDisk`.
    pub fn with<R>(&self, f: impl FnOnce(&mut FlashDisk<F>) -> R) -> R {
        self.disk.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Number of usable sectors
    pub fn sector_count(&self) -> u32 {
        self.with(|disk| disk.sector_count())
    }

    /// Copy sector `index` into `buf`
    pub fn read_into(&self, index: u32, buf: &mut Sector) -> Result<(), DiskError> {
        self.with(|disk| {
            buf.copy_from_slice(disk.read_sector(index)?);
            Ok(())
        })
    }

    /// Copy `buf.len()` bytes starting `offset` bytes into sector `index`
    pub fn read_bytes(&self, index: u32, offset: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        let end = check_span(offset, buf.len())?;
        self.with(|disk| {
            buf.copy_from_slice(&disk.read_sector(index)?[offset..end]);
            Ok(())
        })
    }

    /// Replace sector `index` with `payload`
    pub fn write(&self, index: u32, payload: &[u8]) -> Result<WriteOutcome, DiskError> {
        self.with(|disk| disk.write_sector(index, payload))
    }

    /// Overwrite `data.len()` bytes starting `offset` bytes into sector `index`
    ///
    /// The rest of the sector keeps its current contents.
    pub fn patch(&self, index: u32, offset: usize, data: &[u8]) -> Result<WriteOutcome, DiskError> {
        let end = check_span(offset, data.len())?;
        self.with(|disk| {
            let mut sector = [0u8; SECTOR_SIZE];
            sector.copy_from_slice(disk.read_sector(index)?);
            sector[offset..end].copy_from_slice(data);
            disk.write_sector(index, &sector)
        })
    }
}

fn check_span(offset: usize, len: usize) -> Result<usize, DiskError> {
    match offset.checked_add(len) {
        Some(end) if end <= SECTOR_SIZE => Ok(end),
        _ => Err(DiskError::SizeMismatch {
            len: offset.saturating_add(len),
            expected: SECTOR_SIZE,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::MemFlash;

    fn shared() -> SharedDisk<MemFlash> {
        SharedDisk::new(FlashDisk::new(MemFlash::new(4), 4))
    }

    #[test]
    fn test_read_into_copies_sector() {
        let disk = shared();
        disk.write(1, &[0x33; SECTOR_SIZE]).unwrap();

        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_into(1, &mut buf).unwrap();
        assert_eq!(buf, [0x33; SECTOR_SIZE]);
        assert_eq!(disk.sector_count(), 4);
    }

    #[test]
    fn test_read_bytes_partial() {
        let disk = shared();
        let mut payload = [0u8; SECTOR_SIZE];
        payload[100..104].copy_from_slice(&[1, 2, 3, 4]);
        disk.write(0, &payload).unwrap();

        let mut buf = [0u8; 4];
        disk.read_bytes(0, 100, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_read_bytes_past_sector_end_rejected() {
        let disk = shared();
        let mut buf = [0u8; 8];
        assert!(matches!(
            disk.read_bytes(0, SECTOR_SIZE - 4, &mut buf),
            Err(DiskError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_patch_keeps_rest_of_sector() {
        let disk = shared();
        disk.write(2, &[0xAA; SECTOR_SIZE]).unwrap();
        disk.patch(2, 512, &[0x00; 512]).unwrap();

        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_into(2, &mut buf).unwrap();
        assert!(buf[..512].iter().all(|&b| b == 0xAA));
        assert!(buf[512..1024].iter().all(|&b| b == 0x00));
        assert!(buf[1024..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_patch_out_of_range_sector() {
        let disk = shared();
        assert_eq!(
            disk.patch(4, 0, &[0u8; 16]),
            Err(DiskError::OutOfRange { index: 4, count: 4 })
        );
    }
}
