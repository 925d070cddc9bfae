//! Flash region locator
//!
//! The start of flash holds the running firmware image, so block storage
//! lives in the last `sector_count` sectors of the chip.

use core::ops::Range;

use uartbridge_hal::{Sector, SECTOR_SIZE};

/// Sub-range of flash reserved for block storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashRegion {
    /// Offset of the first reserved byte from the start of flash
    base: u32,
    /// Number of whole sectors in the region
    sector_count: u32,
}

impl FlashRegion {
    /// Reserve the last `requested` sectors of a chip of `flash_size` bytes
    ///
    /// Requests larger than the chip are clamped to the whole chip.
    pub fn tail(flash_size: usize, requested: u32) -> Self {
        let available = (flash_size.min(u32::MAX as usize) / SECTOR_SIZE) as u32;
        let sector_count = requested.min(available);
        Self {
            base: (available - sector_count) * SECTOR_SIZE as u32,
            sector_count,
        }
    }

    /// Offset of the region from the start of flash
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of sectors in the region
    pub fn sector_count(&self) -> u32 {
        self.sector_count
    }

    /// Size of the region in bytes
    pub fn size(&self) -> usize {
        self.sector_count as usize * SECTOR_SIZE
    }

    /// Physical byte range of the region
    pub fn range(&self) -> Range<u32> {
        self.base..self.base + self.size() as u32
    }

    /// Physical offset of sector `index`, or `None` outside the region
    pub fn sector_offset(&self, index: u32) -> Option<u32> {
        (index < self.sector_count).then(|| self.base + index * SECTOR_SIZE as u32)
    }

    /// The region's bytes within a view of the whole chip
    pub fn view<'a>(&self, flash: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.base as usize;
        flash.get(start..start + self.size())
    }

    /// Sector `index` within a view of the whole chip
    pub fn sector<'a>(&self, flash: &'a [u8], index: u32) -> Option<&'a Sector> {
        let start = self.sector_offset(index)? as usize;
        flash
            .get(start..start + SECTOR_SIZE)
            .and_then(|bytes| bytes.try_into().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHIP: usize = 2 * 1024 * 1024;

    #[test]
    fn test_region_is_tail_of_flash() {
        let region = FlashRegion::tail(CHIP, 16);
        assert_eq!(region.sector_count(), 16);
        assert_eq!(region.base() as usize, CHIP - 16 * SECTOR_SIZE);
        assert_eq!(region.range().end as usize, CHIP);
        assert_eq!(region.size(), 16 * SECTOR_SIZE);
    }

    #[test]
    fn test_request_clamped_to_chip() {
        let region = FlashRegion::tail(8 * SECTOR_SIZE, 100);
        assert_eq!(region.sector_count(), 8);
        assert_eq!(region.base(), 0);
    }

    #[test]
    fn test_partial_trailing_sector_ignored() {
        let region = FlashRegion::tail(4 * SECTOR_SIZE + 100, 2);
        assert_eq!(region.base() as usize, 2 * SECTOR_SIZE);
    }

    #[test]
    fn test_sector_offset_bounds() {
        let region = FlashRegion::tail(CHIP, 4);
        let base = region.base();
        assert_eq!(region.sector_offset(0), Some(base));
        assert_eq!(region.sector_offset(3), Some(base + 3 * SECTOR_SIZE as u32));
        assert_eq!(region.sector_offset(4), None);
        assert_eq!(region.sector_offset(u32::MAX), None);
    }

    #[test]
    fn test_sector_view_is_relative_to_region() {
        let mut flash = [0u8; 4 * SECTOR_SIZE];
        flash[2 * SECTOR_SIZE] = 0xAB;
        let region = FlashRegion::tail(flash.len(), 2);

        let first = region.sector(&flash, 0).unwrap();
        assert_eq!(first[0], 0xAB);
        assert!(region.sector(&flash, 2).is_none());
        assert_eq!(region.view(&flash).unwrap().len(), 2 * SECTOR_SIZE);
    }

    #[test]
    fn test_empty_region() {
        let region = FlashRegion::tail(CHIP, 0);
        assert_eq!(region.sector_count(), 0);
        assert_eq!(region.sector_offset(0), None);
        assert!(region.range().is_empty());
    }
}
