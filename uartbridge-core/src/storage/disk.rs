//! Sector store over raw NOR flash
//!
//! Presents the reserved flash region as `sector_count` sectors of
//! [`SECTOR_SIZE`] bytes. Reads are views straight into the mapped flash.
//! Writes avoid erasing whenever they can:
//!
//! 1. Find the first byte where the payload differs from flash. No
//!    difference means nothing is written at all.
//! 2. Round that offset down to a page boundary. Leading pages that match
//!    are left alone.
//! 3. Erase the sector only when the very first page differs.
//! 4. Program the pages from that boundary to the end of the sector.
//!
//! Program can only clear bits, so skipping the erase is only correct if
//! the differing pages do not need any bit set back to 1. Every write is
//! read back; a partial program that did not take is redone once as a
//! full erase and program, anything still wrong after that is reported.
//!
//! Erase and program run with interrupts masked: code executing from the
//! same flash must not be fetched while the chip is busy.

use uartbridge_hal::flash::{MappedFlash, NorFlashError, NorFlashErrorKind};
use uartbridge_hal::{Sector, PAGE_SIZE, SECTOR_SIZE};

use super::region::FlashRegion;

/// Errors from sector store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiskError {
    /// Sector index outside `[0, count)`
    OutOfRange { index: u32, count: u32 },
    /// Payload is not exactly one sector long
    SizeMismatch { len: usize, expected: usize },
    /// Erase or program primitive failed
    Flash(FlashFault),
    /// Flash contents did not match the payload after programming
    VerifyFailed { index: u32, offset: usize },
}

impl DiskError {
    /// Whether this error is a caller defect rather than a hardware fault
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            DiskError::OutOfRange { .. } | DiskError::SizeMismatch { .. }
        )
    }
}

/// Failure class reported by the flash driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashFault {
    /// Offset or length not aligned to the primitive's granularity
    NotAligned,
    /// Range extends past the end of the chip
    OutOfBounds,
    /// Controller reported a failure
    Other,
}

impl From<NorFlashErrorKind> for FlashFault {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => FlashFault::NotAligned,
            NorFlashErrorKind::OutOfBounds => FlashFault::OutOfBounds,
            _ => FlashFault::Other,
        }
    }
}

fn flash_error<E: NorFlashError>(e: E) -> DiskError {
    DiskError::Flash(e.kind().into())
}

/// What a successful sector write did to the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteOutcome {
    /// Payload already matched flash; nothing was erased or programmed
    Unchanged,
    /// Pages from `offset` to the end of the sector were programmed without erase
    Programmed { offset: usize },
    /// The sector was erased and programmed in full
    Rewritten,
    /// Programming from `offset` did not verify; the sector was rewritten
    Recovered { offset: usize },
}

/// Flash-backed array of sectors
pub struct FlashDisk<F> {
    flash: F,
    region: FlashRegion,
}

impl<F: MappedFlash> FlashDisk<F> {
    /// Use the last `sector_count` sectors of `flash` as storage
    ///
    /// The count is clamped to the size of the chip.
    pub fn new(flash: F, sector_count: u32) -> Self {
        debug_assert!(F::ERASE_SIZE == SECTOR_SIZE && PAGE_SIZE % F::WRITE_SIZE == 0);
        let region = FlashRegion::tail(flash.capacity(), sector_count);
        Self { flash, region }
    }

    /// Number of usable sectors
    pub fn sector_count(&self) -> u32 {
        self.region.sector_count()
    }

    /// Size of every sector in bytes
    pub const fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }

    /// Physical placement of the store
    pub fn region(&self) -> FlashRegion {
        self.region
    }

    /// Current contents of sector `index`
    pub fn read_sector(&self, index: u32) -> Result<&Sector, DiskError> {
        self.check_in_range(index)?;
        self.region
            .sector(self.flash.contents(), index)
            .ok_or(DiskError::Flash(FlashFault::OutOfBounds))
    }

    /// Replace the contents of sector `index` with `payload`
    ///
    /// `payload` must be exactly one sector long.
    pub fn write_sector(&mut self, index: u32, payload: &[u8]) -> Result<WriteOutcome, DiskError> {
        self.check_in_range(index)?;
        if payload.len() != SECTOR_SIZE {
            return Err(DiskError::SizeMismatch {
                len: payload.len(),
                expected: SECTOR_SIZE,
            });
        }

        let current = self.read_sector(index)?;
        let Some(mismatch) = current.iter().zip(payload).position(|(a, b)| a != b) else {
            return Ok(WriteOutcome::Unchanged);
        };
        let start = (mismatch / PAGE_SIZE) * PAGE_SIZE;

        if start == 0 {
            self.rewrite(index, payload)?;
            return Ok(WriteOutcome::Rewritten);
        }

        let sector_base = self.sector_base(index)?;
        let flash = &mut self.flash;
        interrupts_masked(|| flash.write(sector_base + start as u32, &payload[start..]))
            .map_err(flash_error)?;

        if self.verify(index, start, payload).is_ok() {
            return Ok(WriteOutcome::Programmed { offset: start });
        }
        self.rewrite(index, payload)?;
        Ok(WriteOutcome::Recovered { offset: start })
    }

    /// Erase the whole sector and program the whole payload, then verify
    fn rewrite(&mut self, index: u32, payload: &[u8]) -> Result<(), DiskError> {
        let sector_base = self.sector_base(index)?;
        let flash = &mut self.flash;
        interrupts_masked(|| {
            flash.erase(sector_base, sector_base + SECTOR_SIZE as u32)?;
            flash.write(sector_base, payload)
        })
        .map_err(flash_error)?;
        self.verify(index, 0, payload)
    }

    /// Compare flash against `payload` from byte `start` of the sector
    fn verify(&self, index: u32, start: usize, payload: &[u8]) -> Result<(), DiskError> {
        let written = self.read_sector(index)?;
        match written[start..]
            .iter()
            .zip(&payload[start..])
            .position(|(a, b)| a != b)
        {
            Some(at) => Err(DiskError::VerifyFailed {
                index,
                offset: start + at,
            }),
            None => Ok(()),
        }
    }

    fn sector_base(&self, index: u32) -> Result<u32, DiskError> {
        self.region
            .sector_offset(index)
            .ok_or(DiskError::OutOfRange {
                index,
                count: self.sector_count(),
            })
    }

    fn check_in_range(&self, index: u32) -> Result<(), DiskError> {
        if index < self.sector_count() {
            return Ok(());
        }
        Err(DiskError::OutOfRange {
            index,
            count: self.sector_count(),
        })
    }

    #[cfg(test)]
    pub(crate) fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }
}

fn interrupts_masked<R>(f: impl FnOnce() -> R) -> R {
    critical_section::with(|_| {
        #[cfg(test)]
        let _scope = super::mock::GuardScope::enter();
        f()
    })
}
