//! Volume mount and first-boot format
//!
//! ```text
//! sector 0      MBR, one primary partition
//! sector 1      volume boot record
//!               FAT #1, FAT #2
//!               root directory (512 entries)
//!               data clusters
//! last 4        unpartitioned
//! ```
//!
//! Only the on-disk structures needed to recognise and create a FAT12
//! volume live here. Files and directories on it are reached through
//! [`FileSystem`](super::file::FileSystem).

use uartbridge_hal::{MappedFlash, SECTOR_SIZE};

use super::diskio::{fat_time, FatDisk, IoctlResponse, GET_SECTOR_COUNT};
use super::status::{FsError, FsStatus};
use crate::storage::DiskError;

// =============================================================================
// Layout constants
// =============================================================================

const SIGNATURE_OFFSET: usize = 510;
const SIGNATURE: [u8; 2] = [0x55, 0xAA];
const PARTITION_TABLE_OFFSET: usize = 446;

/// Type byte written for the partition
pub const PARTITION_TYPE_FAT12: u8 = 0x01;
/// Sectors left unpartitioned at the end of the disk (plus the MBR itself)
pub const PARTITION_MARGIN: u32 = 5;
/// First sector of the partition
pub const PARTITION_START: u32 = 1;

const RESERVED_SECTORS: u32 = 1;
const FAT_COUNT: u32 = 2;
const ROOT_ENTRIES: u32 = 512;
pub(super) const DIR_ENTRY_SIZE: u32 = 32;
const MEDIA_FIXED: u8 = 0xF8;
/// FAT12 holds at most this many clusters minus one
pub(super) const FAT12_CLUSTER_LIMIT: u32 = 4085;
const MAX_SECTORS_PER_CLUSTER: u32 = 128;

const VOLUME_LABEL: &[u8; 11] = b"NO NAME    ";
const FS_TYPE: &[u8; 8] = b"FAT12   ";

/// Geometry of a mounted volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VolumeInfo {
    /// Disk sector holding the boot record
    pub start_lba: u32,
    pub total_sectors: u32,
    /// Sectors in front of the first FAT, boot record included
    pub reserved_sectors: u32,
    pub fat_count: u32,
    pub fat_sectors: u32,
    pub root_entries: u32,
    pub sectors_per_cluster: u32,
    pub cluster_count: u32,
}

/// How [`install`] obtained a usable volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MountOutcome {
    /// An existing filesystem was found
    Reused(VolumeInfo),
    /// The disk was partitioned and formatted first
    Created(VolumeInfo),
}

impl MountOutcome {
    pub fn info(&self) -> VolumeInfo {
        match self {
            MountOutcome::Reused(info) | MountOutcome::Created(info) => *info,
        }
    }
}

/// Mount the volume, creating it first if the disk holds none
pub fn install<F: MappedFlash>(disk: &FatDisk<'_, F>) -> Result<MountOutcome, FsError> {
    match mount(disk) {
        Ok(info) => return Ok(MountOutcome::Reused(info)),
        Err(e) if e.status() == FsStatus::NoFilesystem => {}
        Err(e) => return Err(e),
    }

    let sectors = match disk.ioctl(GET_SECTOR_COUNT) {
        Ok(IoctlResponse::SectorCount(n)) => n,
        _ => return Err(FsError::new("fdisk", FsStatus::DiskErr)),
    };
    let size = sectors
        .checked_sub(PARTITION_MARGIN)
        .filter(|&n| n > 0)
        .ok_or(FsError::new("fdisk", FsStatus::MkfsAborted))?;

    fdisk(disk, size)?;
    mkfs(disk, PARTITION_START, size)?;
    mount(disk).map(MountOutcome::Created)
}

/// Find a FAT volume on the disk
///
/// Sector 0 is tried as a boot record first, then as a partition table.
pub fn mount<F: MappedFlash>(disk: &FatDisk<'_, F>) -> Result<VolumeInfo, FsError> {
    const OP: &str = "mount";
    let mut sector = [0u8; SECTOR_SIZE];

    disk.read(&mut sector, 0, 1).map_err(|e| io_error(OP, e))?;
    if let Some(info) = parse_boot_record(&sector, 0) {
        return Ok(info);
    }
    if sector[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2] != SIGNATURE {
        return Err(FsError::new(OP, FsStatus::NoFilesystem));
    }

    let entry = &sector[PARTITION_TABLE_OFFSET..PARTITION_TABLE_OFFSET + 16];
    let partition_type = entry[4];
    let start = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]);
    if !is_fat_type(partition_type) || start == 0 || start >= disk.sector_count() {
        return Err(FsError::new(OP, FsStatus::NoFilesystem));
    }

    disk.read(&mut sector, start, 1).map_err(|e| io_error(OP, e))?;
    parse_boot_record(&sector, start).ok_or(FsError::new(OP, FsStatus::NoFilesystem))
}

/// Write a partition table with one FAT12 partition of `size` sectors
pub fn fdisk<F: MappedFlash>(disk: &FatDisk<'_, F>, size: u32) -> Result<(), FsError> {
    const OP: &str = "fdisk";
    if PARTITION_START.saturating_add(size) > disk.sector_count() {
        return Err(FsError::new(OP, FsStatus::InvalidParameter));
    }

    let mut mbr = [0u8; SECTOR_SIZE];
    let entry = &mut mbr[PARTITION_TABLE_OFFSET..PARTITION_TABLE_OFFSET + 16];
    entry[0] = 0x00; // not bootable
    entry[1..4].copy_from_slice(&[0xFE, 0xFF, 0xFF]); // CHS unused
    entry[4] = PARTITION_TYPE_FAT12;
    entry[5..8].copy_from_slice(&[0xFE, 0xFF, 0xFF]);
    entry[8..12].copy_from_slice(&PARTITION_START.to_le_bytes());
    entry[12..16].copy_from_slice(&size.to_le_bytes());
    mbr[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2].copy_from_slice(&SIGNATURE);

    disk.write(&mbr, 0, 1).map_err(|e| io_error(OP, e))
}

/// Create an empty FAT12 volume on sectors `start..start + total`
pub fn mkfs<F: MappedFlash>(disk: &FatDisk<'_, F>, start: u32, total: u32) -> Result<(), FsError> {
    const OP: &str = "mkfs";
    let geometry = Geometry::plan(total).ok_or(FsError::new(OP, FsStatus::MkfsAborted))?;
    let mut sector = [0u8; SECTOR_SIZE];

    geometry.write_boot_record(&mut sector, start, total);
    disk.write(&sector, start, 1).map_err(|e| io_error(OP, e))?;

    // Both FAT copies, then the root directory, all zeroed except the
    // reserved entries at the head of each FAT.
    let fat_base = start + RESERVED_SECTORS;
    let area = FAT_COUNT * geometry.fat_sectors + root_dir_sectors();
    for i in 0..area {
        sector.fill(0);
        if i % geometry.fat_sectors == 0 && i < FAT_COUNT * geometry.fat_sectors {
            sector[..3].copy_from_slice(&[MEDIA_FIXED, 0xFF, 0xFF]);
        }
        disk.write(&sector, fat_base + i, 1)
            .map_err(|e| io_error(OP, e))?;
    }
    Ok(())
}

// =============================================================================
// Geometry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    sectors_per_cluster: u32,
    fat_sectors: u32,
    cluster_count: u32,
}

impl Geometry {
    /// Smallest cluster size that keeps the volume within FAT12 limits
    fn plan(total: u32) -> Option<Self> {
        let mut spc = 1;
        while spc <= MAX_SECTORS_PER_CLUSTER {
            if let Some(g) = Self::with_cluster_size(total, spc) {
                if g.cluster_count < FAT12_CLUSTER_LIMIT {
                    return Some(g);
                }
            } else {
                return None;
            }
            spc *= 2;
        }
        None
    }

    fn with_cluster_size(total: u32, spc: u32) -> Option<Self> {
        let fixed = RESERVED_SECTORS + root_dir_sectors();
        let mut fat_sectors = 1;
        loop {
            let data = total.checked_sub(fixed + FAT_COUNT * fat_sectors)?;
            let cluster_count = data / spc;
            if cluster_count == 0 {
                return None;
            }
            // 12 bits per entry, two reserved entries
            let fat_bytes = ((cluster_count + 2) * 3).div_ceil(2);
            let needed = fat_bytes.div_ceil(SECTOR_SIZE as u32);
            if needed <= fat_sectors {
                return Some(Self {
                    sectors_per_cluster: spc,
                    fat_sectors,
                    cluster_count,
                });
            }
            fat_sectors = needed;
        }
    }

    fn write_boot_record(&self, buf: &mut [u8; SECTOR_SIZE], start: u32, total: u32) {
        buf.fill(0);
        buf[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        buf[3..11].copy_from_slice(b"MSDOS5.0");
        buf[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        buf[13] = self.sectors_per_cluster as u8;
        buf[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
        buf[16] = FAT_COUNT as u8;
        buf[17..19].copy_from_slice(&(ROOT_ENTRIES as u16).to_le_bytes());
        if let Ok(small) = u16::try_from(total) {
            buf[19..21].copy_from_slice(&small.to_le_bytes());
        } else {
            buf[32..36].copy_from_slice(&total.to_le_bytes());
        }
        buf[21] = MEDIA_FIXED;
        buf[22..24].copy_from_slice(&(self.fat_sectors as u16).to_le_bytes());
        buf[24..26].copy_from_slice(&63u16.to_le_bytes()); // sectors per track
        buf[26..28].copy_from_slice(&255u16.to_le_bytes()); // heads
        buf[28..32].copy_from_slice(&start.to_le_bytes()); // hidden sectors
        buf[36] = 0x80; // drive number
        buf[38] = 0x29; // extended boot signature
        buf[39..43].copy_from_slice(&fat_time().to_le_bytes());
        buf[43..54].copy_from_slice(VOLUME_LABEL);
        buf[54..62].copy_from_slice(FS_TYPE);
        buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2].copy_from_slice(&SIGNATURE);
    }
}

fn root_dir_sectors() -> u32 {
    (ROOT_ENTRIES * DIR_ENTRY_SIZE).div_ceil(SECTOR_SIZE as u32)
}

fn is_fat_type(partition_type: u8) -> bool {
    matches!(
        partition_type,
        0x01 | 0x04 | 0x06 | 0x0B | 0x0C | 0x0E
    )
}

/// Parse a FAT boot record at disk sector `lba`
fn parse_boot_record(buf: &[u8; SECTOR_SIZE], lba: u32) -> Option<VolumeInfo> {
    if buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2] != SIGNATURE {
        return None;
    }
    if !matches!(buf[0], 0xEB | 0xE9) {
        return None;
    }
    let word = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]) as u32;
    let dword = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

    if word(11) != SECTOR_SIZE as u32 {
        return None;
    }
    let spc = buf[13] as u32;
    if spc == 0 || !spc.is_power_of_two() {
        return None;
    }
    let reserved = word(14);
    let fats = buf[16] as u32;
    let root_entries = word(17);
    let total = match word(19) {
        0 => dword(32),
        n => n,
    };
    let fat_sectors = word(22);
    if reserved == 0 || !(1..=2).contains(&fats) || fat_sectors == 0 {
        return None;
    }

    let root_sectors = (root_entries * DIR_ENTRY_SIZE).div_ceil(SECTOR_SIZE as u32);
    let data = total.checked_sub(reserved + fats * fat_sectors + root_sectors)?;
    let cluster_count = data / spc;
    if cluster_count == 0 {
        return None;
    }

    Some(VolumeInfo {
        start_lba: lba,
        total_sectors: total,
        reserved_sectors: reserved,
        fat_count: fats,
        fat_sectors,
        root_entries,
        sectors_per_cluster: spc,
        cluster_count,
    })
}

fn io_error(op: &'static str, e: DiskError) -> FsError {
    FsError::new(op, disk_status(e))
}

/// Result code for a failed store access
pub(super) fn disk_status(e: DiskError) -> FsStatus {
    if e.is_programming_error() {
        FsStatus::IntErr
    } else {
        FsStatus::DiskErr
    }
}
