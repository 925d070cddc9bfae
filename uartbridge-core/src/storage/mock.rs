//! Instrumented in-memory NOR flash for host tests

use core::cell::Cell;
use std::vec;
use std::vec::Vec;

use uartbridge_hal::flash::{
    check_erase, check_read, check_write, ErrorType, MappedFlash, NorFlash, NorFlashErrorKind,
    ReadNorFlash, ERASED_BYTE,
};
use uartbridge_hal::{PAGE_SIZE, SECTOR_SIZE};

std::thread_local! {
    static GUARD_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Marks the current thread as inside the store's interrupt guard
pub(crate) struct GuardScope;

impl GuardScope {
    pub(crate) fn enter() -> Self {
        GUARD_DEPTH.with(|d| d.set(d.get() + 1));
        GuardScope
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|d| d.set(d.get() - 1));
    }
}

fn guarded() -> bool {
    GUARD_DEPTH.with(|d| d.get() > 0)
}

/// One recorded hardware operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Erase { offset: u32, len: u32 },
    Program { offset: u32, len: usize },
}

/// Vec-backed flash with NOR semantics
///
/// Write ANDs data into the array (bits can only be cleared), erase
/// resets whole sectors to `0xFF`. Every call is recorded in `ops`.
pub struct MemFlash {
    mem: Vec<u8>,
    pub ops: Vec<FlashOp>,
    /// Make the next write call fail with `NorFlashErrorKind::Other`
    pub fail_next_program: bool,
    /// Erase or write calls made outside the interrupt guard
    pub unguarded_ops: usize,
}

impl MemFlash {
    /// Chip of `sectors` erase sectors, initially erased
    pub fn new(sectors: usize) -> Self {
        Self {
            mem: vec![ERASED_BYTE; sectors * SECTOR_SIZE],
            ops: Vec::new(),
            fail_next_program: false,
            unguarded_ops: 0,
        }
    }

    /// Overwrite raw contents without going through erase/write
    pub fn fill(&mut self, offset: usize, bytes: &[u8]) {
        self.mem[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn erase_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, FlashOp::Erase { .. }))
            .count()
    }

    pub fn program_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, FlashOp::Program { .. }))
            .count()
    }

    fn note_guard(&mut self) {
        if !guarded() {
            self.unguarded_ops += 1;
        }
    }
}

impl ErrorType for MemFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MemFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), NorFlashErrorKind> {
        check_read(&*self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.mem[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.mem.len()
    }
}

impl NorFlash for MemFlash {
    const WRITE_SIZE: usize = PAGE_SIZE;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), NorFlashErrorKind> {
        check_erase(&*self, from, to)?;
        self.note_guard();
        self.ops.push(FlashOp::Erase {
            offset: from,
            len: to - from,
        });
        self.mem[from as usize..to as usize].fill(ERASED_BYTE);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), NorFlashErrorKind> {
        check_write(&*self, offset, bytes.len())?;
        self.note_guard();
        self.ops.push(FlashOp::Program {
            offset,
            len: bytes.len(),
        });
        if core::mem::take(&mut self.fail_next_program) {
            return Err(NorFlashErrorKind::Other);
        }
        let start = offset as usize;
        for (cell, byte) in self.mem[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= byte;
        }
        Ok(())
    }
}

impl MappedFlash for MemFlash {
    fn contents(&self) -> &[u8] {
        &self.mem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erase_requires_sector_alignment() {
        let mut flash = MemFlash::new(4);
        let sector = SECTOR_SIZE as u32;
        assert_eq!(flash.erase(0, sector), Ok(()));
        assert_eq!(
            flash.erase(PAGE_SIZE as u32, sector + PAGE_SIZE as u32),
            Err(NorFlashErrorKind::NotAligned)
        );
        assert_eq!(flash.erase(0, PAGE_SIZE as u32), Err(NorFlashErrorKind::NotAligned));
    }

    #[test]
    fn test_write_requires_page_alignment() {
        let mut flash = MemFlash::new(4);
        assert_eq!(flash.write(PAGE_SIZE as u32, &[0u8; PAGE_SIZE]), Ok(()));
        assert_eq!(flash.write(1, &[0u8; PAGE_SIZE]), Err(NorFlashErrorKind::NotAligned));
    }

    #[test]
    fn test_ranges_past_end_rejected() {
        let mut flash = MemFlash::new(4);
        let chip = (4 * SECTOR_SIZE) as u32;
        let last = chip - SECTOR_SIZE as u32;
        assert_eq!(flash.erase(last, chip), Ok(()));
        assert_eq!(
            flash.erase(last, chip + SECTOR_SIZE as u32),
            Err(NorFlashErrorKind::OutOfBounds)
        );
        assert_eq!(
            flash.write(chip, &[0u8; PAGE_SIZE]),
            Err(NorFlashErrorKind::OutOfBounds)
        );
        assert!(flash.ops.is_empty());
    }

    #[test]
    fn test_write_only_clears_bits() {
        let mut flash = MemFlash::new(1);
        flash.write(0, &[0xF0u8; PAGE_SIZE]).unwrap();
        flash.write(0, &[0x0Fu8; PAGE_SIZE]).unwrap();
        assert!(flash.contents()[..PAGE_SIZE].iter().all(|&b| b == 0));

        let mut back = [0xAAu8; 4];
        flash.read(PAGE_SIZE as u32, &mut back).unwrap();
        assert_eq!(back, [ERASED_BYTE; 4]);
    }

    #[test]
    fn test_unguarded_calls_are_counted() {
        let mut flash = MemFlash::new(1);
        flash.erase(0, SECTOR_SIZE as u32).unwrap();
        assert_eq!(flash.unguarded_ops, 1);

        let _scope = GuardScope::enter();
        flash.write(0, &[0u8; PAGE_SIZE]).unwrap();
        assert_eq!(flash.unguarded_ops, 1);
    }
}
