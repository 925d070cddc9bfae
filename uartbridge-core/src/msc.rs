//! Mass-storage responder
//!
//! Answers the host's SCSI block commands from the shared sector store.
//! The host may be told a block size smaller than a native sector; block
//! addresses are translated to byte positions in the store, and a single
//! READ(10)/WRITE(10) may span several native sectors.

use core::sync::atomic::{AtomicBool, Ordering};

use uartbridge_hal::{MappedFlash, SECTOR_SIZE};
use uartbridge_protocol::scsi::{self, asc, opcode, sense_key, ScsiCommand, SenseData};

use crate::config::MscIdentity;
use crate::storage::{DiskError, SharedDisk};

/// Mass-storage command failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MscError {
    /// Filesystem not brought up yet
    NotReady,
    /// Host write while the unit is read-only
    WriteProtected,
    /// Opcode this responder does not implement
    Unsupported(u8),
    /// Transfer reaches past the last block
    OutOfRange { lba: u32 },
    Disk(DiskError),
}

impl From<DiskError> for MscError {
    fn from(e: DiskError) -> Self {
        MscError::Disk(e)
    }
}

impl MscError {
    /// Sense data reported to the host for this failure
    pub fn sense(&self) -> SenseData {
        match self {
            MscError::NotReady => SenseData::new(sense_key::NOT_READY, asc::MEDIUM_NOT_PRESENT),
            MscError::WriteProtected => SenseData::new(sense_key::DATA_PROTECT, asc::WRITE_PROTECTED),
            MscError::Unsupported(_) => {
                SenseData::new(sense_key::ILLEGAL_REQUEST, asc::INVALID_COMMAND_OPCODE)
            }
            MscError::OutOfRange { .. } => {
                SenseData::new(sense_key::ILLEGAL_REQUEST, asc::LBA_OUT_OF_RANGE)
            }
            MscError::Disk(DiskError::VerifyFailed { .. }) => {
                SenseData::new(sense_key::MEDIUM_ERROR, asc::WRITE_ERROR)
            }
            MscError::Disk(e) if e.is_programming_error() => {
                SenseData::new(sense_key::ILLEGAL_REQUEST, asc::INVALID_FIELD_IN_CDB)
            }
            MscError::Disk(_) => SenseData::new(sense_key::HARDWARE_ERROR, asc::NONE),
        }
    }
}

/// INQUIRY identification strings, space padded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InquiryIds {
    pub vendor: [u8; 8],
    pub product: [u8; 16],
    pub revision: [u8; 4],
}

/// Unit size as advertised to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capacity {
    pub block_count: u32,
    pub block_size: u32,
}

/// SCSI logical unit backed by the shared sector store
pub struct MscDevice<'a, F> {
    disk: &'a SharedDisk<F>,
    identity: MscIdentity,
    ready: AtomicBool,
}

impl<'a, F: MappedFlash> MscDevice<'a, F> {
    /// New unit, initially not ready
    ///
    /// `identity.block_size` must divide [`SECTOR_SIZE`]; the configuration
    /// is validated before this is called.
    pub fn new(disk: &'a SharedDisk<F>, identity: MscIdentity) -> Self {
        Self {
            disk,
            identity,
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Whether the host may access the medium
    pub fn test_unit_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn inquiry(&self) -> InquiryIds {
        InquiryIds {
            vendor: padded(self.identity.vendor),
            product: padded(self.identity.product),
            revision: padded(self.identity.revision),
        }
    }

    pub fn capacity(&self) -> Capacity {
        let block_size = self.block_size();
        let per_sector = SECTOR_SIZE as u32 / block_size;
        Capacity {
            block_count: self.disk.sector_count().saturating_mul(per_sector),
            block_size,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.identity.block_size
    }

    /// START STOP UNIT; the medium cannot be ejected so every request is accepted
    pub fn start_stop(&self, _power_condition: u8, _start: bool, _load_eject: bool) -> bool {
        true
    }

    pub fn is_writable(&self) -> bool {
        self.identity.writable
    }

    /// Copy `buf.len()` bytes starting `offset` bytes into block `lba`
    pub fn read10(&self, lba: u32, offset: u32, buf: &mut [u8]) -> Result<usize, MscError> {
        if !self.test_unit_ready() {
            return Err(MscError::NotReady);
        }
        let mut pos = self.byte_position(lba, offset, buf.len())?;
        for chunk in split_at_sectors(pos, buf.len()) {
            let (sector, within) = locate(pos);
            self.disk.read_bytes(sector, within, &mut buf[chunk.clone()])?;
            pos += chunk.len() as u64;
        }
        Ok(buf.len())
    }

    /// Store `data` starting `offset` bytes into block `lba`
    pub fn write10(&self, lba: u32, offset: u32, data: &[u8]) -> Result<usize, MscError> {
        if !self.is_writable() {
            return Err(MscError::WriteProtected);
        }
        if !self.test_unit_ready() {
            return Err(MscError::NotReady);
        }
        let mut pos = self.byte_position(lba, offset, data.len())?;
        for chunk in split_at_sectors(pos, data.len()) {
            let (sector, within) = locate(pos);
            self.disk.patch(sector, within, &data[chunk.clone()])?;
            pos += chunk.len() as u64;
        }
        Ok(data.len())
    }

    /// Commands outside the standard block set
    ///
    /// Only PREVENT ALLOW MEDIUM REMOVAL is accepted, with no data.
    pub fn scsi(&self, cdb: &[u8], _buf: &mut [u8]) -> Result<usize, MscError> {
        match cdb.first() {
            Some(&opcode::PREVENT_ALLOW_MEDIUM_REMOVAL) => Ok(0),
            Some(&op) => Err(MscError::Unsupported(op)),
            None => Err(MscError::Unsupported(0)),
        }
    }

    /// Answer a command that has no bulk block data
    ///
    /// Writes the response into `buf` and returns its length. READ(10) and
    /// WRITE(10) are streamed by the caller through [`Self::read10`] and
    /// [`Self::write10`] and are not handled here.
    pub fn respond(
        &self,
        command: &ScsiCommand,
        cdb: &[u8],
        last_sense: SenseData,
        buf: &mut [u8],
    ) -> Result<usize, MscError> {
        let capacity = self.capacity();
        match *command {
            ScsiCommand::TestUnitReady => {
                if self.test_unit_ready() {
                    Ok(0)
                } else {
                    Err(MscError::NotReady)
                }
            }
            ScsiCommand::RequestSense { allocation_length } => {
                Ok(copy_out(&last_sense.encode(), allocation_length as usize, buf))
            }
            ScsiCommand::Inquiry { allocation_length, .. } => {
                let ids = self.inquiry();
                let data = scsi::inquiry_response(&ids.vendor, &ids.product, &ids.revision);
                Ok(copy_out(&data, allocation_length as usize, buf))
            }
            ScsiCommand::ModeSense6 { allocation_length, .. } => {
                let data = scsi::mode_sense_response(!self.is_writable());
                Ok(copy_out(&data, allocation_length as usize, buf))
            }
            ScsiCommand::StartStopUnit { start, load_eject } => {
                let power_condition = cdb.get(4).map_or(0, |b| b >> 4);
                if self.start_stop(power_condition, start, load_eject) {
                    Ok(0)
                } else {
                    Err(MscError::Unsupported(opcode::START_STOP_UNIT))
                }
            }
            ScsiCommand::ReadFormatCapacities { allocation_length } => {
                let data =
                    scsi::format_capacities_response(capacity.block_count, capacity.block_size);
                Ok(copy_out(&data, allocation_length as usize, buf))
            }
            ScsiCommand::ReadCapacity10 => {
                if !self.test_unit_ready() {
                    return Err(MscError::NotReady);
                }
                let data =
                    scsi::read_capacity_response(capacity.block_count, capacity.block_size);
                Ok(copy_out(&data, data.len(), buf))
            }
            ScsiCommand::Read10 { .. } => Err(MscError::Unsupported(opcode::READ_10)),
            ScsiCommand::Write10 { .. } => Err(MscError::Unsupported(opcode::WRITE_10)),
            ScsiCommand::PreventAllowMediumRemoval { .. } | ScsiCommand::Other(_) => {
                self.scsi(cdb, buf)
            }
        }
    }

    /// Byte position of `offset` into block `lba`, checked against capacity
    fn byte_position(&self, lba: u32, offset: u32, len: usize) -> Result<u64, MscError> {
        let start = lba as u64 * self.block_size() as u64 + offset as u64;
        let total = self.disk.sector_count() as u64 * SECTOR_SIZE as u64;
        match start.checked_add(len as u64) {
            Some(end) if end <= total => Ok(start),
            _ => Err(MscError::OutOfRange { lba }),
        }
    }
}

/// Sector index and offset within it for a byte position
fn locate(pos: u64) -> (u32, usize) {
    let sector = (pos / SECTOR_SIZE as u64) as u32;
    let within = (pos % SECTOR_SIZE as u64) as usize;
    (sector, within)
}

/// Split `len` bytes starting at store position `pos` into per-sector buffer ranges
fn split_at_sectors(pos: u64, len: usize) -> impl Iterator<Item = core::ops::Range<usize>> {
    let first = SECTOR_SIZE - (pos % SECTOR_SIZE as u64) as usize;
    let mut done = 0;
    core::iter::from_fn(move || {
        if done >= len {
            return None;
        }
        let room = if done == 0 { first } else { SECTOR_SIZE };
        let n = room.min(len - done);
        let range = done..done + n;
        done += n;
        Some(range)
    })
}

/// Copy as much of `data` as both the host allocation and `buf` allow
fn copy_out(data: &[u8], allocation: usize, buf: &mut [u8]) -> usize {
    let n = data.len().min(allocation).min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    n
}

/// ASCII field padded with spaces, truncated to `N`
fn padded<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [b' '; N];
    let n = s.len().min(N);
    out[..n].copy_from_slice(&s.as_bytes()[..n]);
    out
}
