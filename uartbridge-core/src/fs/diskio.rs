//! FatFS-style disk interface over the shared sector store
//!
//! The filesystem library addresses the disk in native sectors, so no
//! translation is needed here: LBA `n` is sector `n` of the store.

use uartbridge_hal::{MappedFlash, SECTOR_SIZE};

use crate::storage::{DiskError, SharedDisk};

/// `disk_ioctl` command: flush pending writes
pub const CTRL_SYNC: u8 = 0;
/// `disk_ioctl` command: number of sectors
pub const GET_SECTOR_COUNT: u8 = 1;
/// `disk_ioctl` command: bytes per sector
pub const GET_SECTOR_SIZE: u8 = 2;
/// `disk_ioctl` command: erase block size in sectors
pub const GET_BLOCK_SIZE: u8 = 3;
/// `disk_ioctl` command: sectors no longer in use
pub const CTRL_TRIM: u8 = 4;

/// Drive status bit: not initialized
pub const STA_NOINIT: u8 = 0x01;

/// Native disk function result (`DRESULT`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DiskResult {
    Ok = 0,
    Error = 1,
    WriteProtected = 2,
    NotReady = 3,
    ParamError = 4,
}

impl From<DiskError> for DiskResult {
    fn from(e: DiskError) -> Self {
        if e.is_programming_error() {
            DiskResult::ParamError
        } else {
            DiskResult::Error
        }
    }
}

/// Supported `disk_ioctl` requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoctlRequest {
    Sync,
    SectorCount,
    SectorSize,
    BlockSize,
}

impl IoctlRequest {
    /// Decode a native command code; `None` for unsupported commands
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            CTRL_SYNC => Some(IoctlRequest::Sync),
            GET_SECTOR_COUNT => Some(IoctlRequest::SectorCount),
            GET_SECTOR_SIZE => Some(IoctlRequest::SectorSize),
            GET_BLOCK_SIZE => Some(IoctlRequest::BlockSize),
            _ => None,
        }
    }
}

/// Answer to an [`IoctlRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoctlResponse {
    /// Request acknowledged, nothing to report
    Done,
    SectorCount(u32),
    SectorSize(u16),
    /// Erase block size in units of sectors
    BlockSize(u32),
}

/// Placeholder timestamp for file metadata: 1980-01-01 00:00:00
///
/// Packed FAT date/time: year-1980 in bits 31..25, month in 24..21, day
/// in 20..16, time in the low half. No real-time clock is read.
pub const fn fat_time() -> u32 {
    (1 << 21) | (1 << 16)
}

/// Disk interface handed to the filesystem library
pub struct FatDisk<'a, F> {
    disk: &'a SharedDisk<F>,
}

impl<F> Clone for FatDisk<'_, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for FatDisk<'_, F> {}

impl<'a, F: MappedFlash> FatDisk<'a, F> {
    pub fn new(disk: &'a SharedDisk<F>) -> Self {
        Self { disk }
    }

    /// Drive status after initialization; the store is always ready
    pub fn initialize(&self) -> u8 {
        0
    }

    /// Current drive status flags
    pub fn status(&self) -> u8 {
        0
    }

    /// Number of sectors on the disk
    pub fn sector_count(&self) -> u32 {
        self.disk.sector_count()
    }

    /// Bytes per sector
    pub const fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }

    /// Read `count` sectors starting at `lba` into `buf`
    ///
    /// `buf` must be exactly `count` sectors long.
    pub fn read(&self, buf: &mut [u8], lba: u32, count: u32) -> Result<(), DiskError> {
        check_buffer(buf.len(), count)?;
        self.check_run(lba, count)?;
        for (chunk, index) in buf.chunks_exact_mut(SECTOR_SIZE).zip(lba..) {
            self.disk.read_bytes(index, 0, chunk)?;
        }
        Ok(())
    }

    /// Write `count` sectors from `buf` starting at `lba`
    ///
    /// The whole run is checked before the first sector is touched, so a
    /// rejected write leaves the disk as it was. Writes complete before
    /// returning, so there is nothing for a later sync to flush.
    pub fn write(&self, buf: &[u8], lba: u32, count: u32) -> Result<(), DiskError> {
        check_buffer(buf.len(), count)?;
        self.check_run(lba, count)?;
        for (chunk, index) in buf.chunks_exact(SECTOR_SIZE).zip(lba..) {
            self.disk.write(index, chunk)?;
        }
        Ok(())
    }

    /// Sectors `lba..lba + count` must all lie on the disk
    fn check_run(&self, lba: u32, count: u32) -> Result<(), DiskError> {
        let sectors = self.sector_count();
        match lba.checked_add(count) {
            Some(end) if end <= sectors => Ok(()),
            _ => Err(DiskError::OutOfRange {
                index: lba.max(sectors),
                count: sectors,
            }),
        }
    }

    /// Copy `buf.len()` bytes starting `offset` bytes into sector `lba`
    pub fn read_at(&self, lba: u32, offset: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        self.disk.read_bytes(lba, offset, buf)
    }

    /// Overwrite bytes starting `offset` bytes into sector `lba`
    ///
    /// The rest of the sector is kept.
    pub fn write_at(&self, lba: u32, offset: usize, data: &[u8]) -> Result<(), DiskError> {
        self.disk.patch(lba, offset, data).map(|_| ())
    }

    /// Handle a native `disk_ioctl` command code
    pub fn ioctl(&self, code: u8) -> Result<IoctlResponse, DiskResult> {
        let request = IoctlRequest::from_code(code).ok_or(DiskResult::ParamError)?;
        Ok(match request {
            IoctlRequest::Sync => IoctlResponse::Done,
            IoctlRequest::SectorCount => IoctlResponse::SectorCount(self.sector_count()),
            IoctlRequest::SectorSize => IoctlResponse::SectorSize(SECTOR_SIZE as u16),
            IoctlRequest::BlockSize => IoctlResponse::BlockSize(1),
        })
    }
}

fn check_buffer(len: usize, count: u32) -> Result<(), DiskError> {
    let expected = count as usize * SECTOR_SIZE;
    if len != expected {
        return Err(DiskError::SizeMismatch { len, expected });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::MemFlash;
    use crate::storage::FlashDisk;
    use std::vec;

    fn shared(sectors: u32) -> SharedDisk<MemFlash> {
        SharedDisk::new(FlashDisk::new(MemFlash::new(8), sectors))
    }

    #[test]
    fn test_multi_sector_roundtrip() {
        let disk = shared(4);
        let fat = FatDisk::new(&disk);

        let mut data = vec![0u8; 2 * SECTOR_SIZE];
        data[..SECTOR_SIZE].fill(0x11);
        data[SECTOR_SIZE..].fill(0x22);
        fat.write(&data, 1, 2).unwrap();

        let mut back = vec![0u8; 2 * SECTOR_SIZE];
        fat.read(&mut back, 1, 2).unwrap();
        assert_eq!(back, data);

        let mut single = vec![0u8; SECTOR_SIZE];
        fat.read(&mut single, 2, 1).unwrap();
        assert!(single.iter().all(|&b| b == 0x22));
    }

    #[test]
    fn test_buffer_must_match_count() {
        let disk = shared(4);
        let fat = FatDisk::new(&disk);
        let mut buf = vec![0u8; SECTOR_SIZE];

        assert_eq!(
            fat.read(&mut buf, 0, 2),
            Err(DiskError::SizeMismatch {
                len: SECTOR_SIZE,
                expected: 2 * SECTOR_SIZE
            })
        );
    }

    #[test]
    fn test_run_past_end_is_out_of_range() {
        let disk = shared(4);
        let fat = FatDisk::new(&disk);
        let data = vec![0u8; 2 * SECTOR_SIZE];

        let err = fat.write(&data, 3, 2).unwrap_err();
        assert_eq!(err, DiskError::OutOfRange { index: 4, count: 4 });
        assert_eq!(DiskResult::from(err), DiskResult::ParamError);
    }

    #[test]
    fn test_rejected_run_leaves_disk_untouched() {
        let disk = shared(4);
        let fat = FatDisk::new(&disk);
        let mut data = vec![0u8; 2 * SECTOR_SIZE];
        data[..SECTOR_SIZE].fill(0x11);
        let ops_before = disk.with(|d| d.flash_mut().ops.len());

        // Sector 3 is on the disk, sector 4 is not
        assert!(fat.write(&data, 3, 2).is_err());

        let mut last = vec![0u8; SECTOR_SIZE];
        fat.read(&mut last, 3, 1).unwrap();
        assert!(last.iter().all(|&b| b == 0xFF));
        assert_eq!(disk.with(|d| d.flash_mut().ops.len()), ops_before);

        let mut back = vec![0u8; 2 * SECTOR_SIZE];
        assert!(fat.read(&mut back, 3, 2).is_err());
    }

    #[test]
    fn test_wrapping_run_reports_disk_size() {
        let disk = shared(4);
        let fat = FatDisk::new(&disk);
        let data = vec![0u8; 2 * SECTOR_SIZE];

        assert_eq!(
            fat.write(&data, u32::MAX, 2),
            Err(DiskError::OutOfRange {
                index: u32::MAX,
                count: 4
            })
        );
        let mut back = vec![0u8; 2 * SECTOR_SIZE];
        assert_eq!(
            fat.read(&mut back, u32::MAX - 1, 2),
            Err(DiskError::OutOfRange {
                index: u32::MAX - 1,
                count: 4
            })
        );
    }

    #[test]
    fn test_byte_access_keeps_rest_of_sector() {
        let disk = shared(4);
        let fat = FatDisk::new(&disk);
        fat.write(&[0x33u8; SECTOR_SIZE], 1, 1).unwrap();

        fat.write_at(1, 100, b"abc").unwrap();
        let mut back = [0u8; 5];
        fat.read_at(1, 99, &mut back).unwrap();
        assert_eq!(&back, &[0x33, b'a', b'b', b'c', 0x33]);

        assert!(fat.write_at(4, 0, b"x").is_err());
        assert!(fat.read_at(1, SECTOR_SIZE - 1, &mut back).is_err());
    }

    #[test]
    fn test_ioctl_answers() {
        let disk = shared(6);
        let fat = FatDisk::new(&disk);

        assert_eq!(fat.ioctl(CTRL_SYNC), Ok(IoctlResponse::Done));
        assert_eq!(fat.ioctl(GET_SECTOR_COUNT), Ok(IoctlResponse::SectorCount(6)));
        assert_eq!(fat.ioctl(GET_SECTOR_SIZE), Ok(IoctlResponse::SectorSize(4096)));
        assert_eq!(fat.ioctl(GET_BLOCK_SIZE), Ok(IoctlResponse::BlockSize(1)));
        assert_eq!(fat.ioctl(CTRL_TRIM), Err(DiskResult::ParamError));
        assert_eq!(fat.ioctl(0x7F), Err(DiskResult::ParamError));
    }

    #[test]
    fn test_drive_always_ready() {
        let disk = shared(2);
        let fat = FatDisk::new(&disk);
        assert_eq!(fat.initialize() & STA_NOINIT, 0);
        assert_eq!(fat.status(), 0);
    }

    #[test]
    fn test_fat_time_is_jan_first_1980() {
        let t = fat_time();
        assert_eq!(t >> 25, 0); // year offset
        assert_eq!((t >> 21) & 0x0F, 1); // month
        assert_eq!((t >> 16) & 0x1F, 1); // day
        assert_eq!(t & 0xFFFF, 0); // time of day
        assert_eq!(t, 0x0021_0000);
    }
}
