//! FAT12 on-disk structures
//!
//! Cluster chains, 32-byte directory entries and 8.3 short names, read
//! and written through [`FatDisk`]. Long file names are not used: entries
//! carrying them are skipped and only short names can be looked up.

use heapless::String;
use uartbridge_hal::{MappedFlash, SECTOR_SIZE};

use super::diskio::FatDisk;
use super::status::FsStatus;
use super::volume::{disk_status, VolumeInfo, DIR_ENTRY_SIZE};

// Directory entry attributes
pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = 0x0F;

/// First byte of the entry that ends a directory
const ENTRY_END: u8 = 0x00;
/// First byte of a deleted entry
const ENTRY_DELETED: u8 = 0xE5;
/// Stored first byte of a name that really starts with 0xE5
const ENTRY_KANJI_E5: u8 = 0x05;

/// Lowest cluster number that addresses data
const FIRST_CLUSTER: u32 = 2;
/// End-of-chain marker written by this code
const CHAIN_END: u32 = 0xFFF;
/// Entries at or above this value end a chain
const CHAIN_END_MIN: u32 = 0xFF8;

/// An 11-byte space-padded 8.3 name as stored on disk
pub type ShortName = [u8; 11];

/// Sector positions of every area of a mounted volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    fat_start: u32,
    fat_sectors: u32,
    fat_count: u32,
    root_start: u32,
    root_entries: u32,
    data_start: u32,
    sectors_per_cluster: u32,
    cluster_count: u32,
}

impl Layout {
    pub fn new(info: &VolumeInfo) -> Self {
        let fat_start = info.start_lba + info.reserved_sectors;
        let root_start = fat_start + info.fat_count * info.fat_sectors;
        let root_sectors = (info.root_entries * DIR_ENTRY_SIZE).div_ceil(SECTOR_SIZE as u32);
        Self {
            fat_start,
            fat_sectors: info.fat_sectors,
            fat_count: info.fat_count,
            root_start,
            root_entries: info.root_entries,
            data_start: root_start + root_sectors,
            sectors_per_cluster: info.sectors_per_cluster,
            cluster_count: info.cluster_count,
        }
    }

    /// Bytes in one cluster
    pub fn cluster_bytes(&self) -> u32 {
        self.sectors_per_cluster * SECTOR_SIZE as u32
    }

    fn cluster_lba(&self, cluster: u32) -> u32 {
        self.data_start + (cluster - FIRST_CLUSTER) * self.sectors_per_cluster
    }

    fn is_data_cluster(&self, cluster: u32) -> bool {
        (FIRST_CLUSTER..FIRST_CLUSTER + self.cluster_count).contains(&cluster)
    }
}

/// Where a directory's entries live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStart {
    /// Fixed root directory area
    Root,
    /// Cluster chain of a subdirectory
    Cluster(u32),
}

impl DirStart {
    /// Directory reached through an entry's first cluster
    ///
    /// `..` entries of first-level directories point at cluster 0.
    fn from_cluster(cluster: u32) -> Self {
        match cluster {
            0 => DirStart::Root,
            c => DirStart::Cluster(c),
        }
    }
}

/// Disk position of one directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    lba: u32,
    offset: usize,
}

/// The fields of a directory entry the file layer works with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirRecord {
    pub name: ShortName,
    pub attr: u8,
    pub first_cluster: u32,
    pub size: u32,
}

impl DirRecord {
    fn parse(raw: &[u8; DIR_ENTRY_SIZE as usize]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[..11]);
        Self {
            name,
            attr: raw[11],
            first_cluster: u16::from_le_bytes([raw[26], raw[27]]) as u32,
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    /// Full 32-byte entry with every timestamp set to `stamp`
    fn encode(&self, stamp: u32) -> [u8; DIR_ENTRY_SIZE as usize] {
        let mut raw = [0u8; DIR_ENTRY_SIZE as usize];
        raw[..11].copy_from_slice(&self.name);
        raw[11] = self.attr;
        let (time, date) = split_stamp(stamp);
        raw[14..16].copy_from_slice(&time);
        raw[16..18].copy_from_slice(&date);
        raw[18..20].copy_from_slice(&date);
        raw[22..24].copy_from_slice(&time);
        raw[24..26].copy_from_slice(&date);
        raw[26..28].copy_from_slice(&(self.first_cluster as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&self.size.to_le_bytes());
        raw
    }

    pub fn is_directory(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.attr & ATTR_READ_ONLY != 0
    }

    /// Long-name fragments, volume labels and the dot entries
    fn is_hidden_from_listing(&self) -> bool {
        self.attr & ATTR_LONG_NAME == ATTR_LONG_NAME
            || self.attr & ATTR_VOLUME_ID != 0
            || self.name[0] == b'.'
    }

    /// Printable `NAME.EXT` form
    pub fn display_name(&self) -> String<12> {
        let mut out = String::new();
        let base = trim_padding(&self.name[..8]);
        let ext = trim_padding(&self.name[8..]);
        for (i, &b) in base.iter().enumerate() {
            let b = if i == 0 && b == ENTRY_KANJI_E5 { ENTRY_DELETED } else { b };
            // 8 + 1 + 3 always fits
            let _ = out.push(char::from(b));
        }
        if !ext.is_empty() {
            let _ = out.push('.');
            for &b in ext {
                let _ = out.push(char::from(b));
            }
        }
        out
    }
}

/// FAT date and time halves of a packed timestamp
fn split_stamp(stamp: u32) -> ([u8; 2], [u8; 2]) {
    (
        (stamp as u16).to_le_bytes(),
        ((stamp >> 16) as u16).to_le_bytes(),
    )
}

fn trim_padding(field: &[u8]) -> &[u8] {
    let len = field.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &field[..len]
}

/// Encode one path component as an 8.3 name
pub fn short_name(component: &str) -> Result<ShortName, FsStatus> {
    let mut name = [b' '; 11];
    if component == "." || component == ".." {
        name[..component.len()].copy_from_slice(component.as_bytes());
        return Ok(name);
    }

    let (base, ext) = match component.rfind('.') {
        Some(dot) => (&component[..dot], &component[dot + 1..]),
        None => (component, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(FsStatus::InvalidName);
    }
    for (dst, &b) in name[..8].iter_mut().zip(base.as_bytes()) {
        *dst = short_char(b)?;
    }
    for (dst, &b) in name[8..].iter_mut().zip(ext.as_bytes()) {
        *dst = short_char(b)?;
    }
    Ok(name)
}

fn short_char(b: u8) -> Result<u8, FsStatus> {
    match b {
        b'a'..=b'z' => Ok(b.to_ascii_uppercase()),
        b'A'..=b'Z' | b'0'..=b'9' => Ok(b),
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'(' | b')' | b'-' | b'@' | b'^' | b'_'
        | b'`' | b'{' | b'}' | b'~' => Ok(b),
        _ => Err(FsStatus::InvalidName),
    }
}

/// A mounted FAT12 volume
pub struct Volume<'a, F> {
    disk: FatDisk<'a, F>,
    layout: Layout,
}

impl<F> Clone for Volume<'_, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for Volume<'_, F> {}

impl<'a, F: MappedFlash> Volume<'a, F> {
    pub fn new(disk: FatDisk<'a, F>, layout: Layout) -> Self {
        Self { disk, layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    // -------------------------------------------------------------------------
    // Byte access
    // -------------------------------------------------------------------------

    fn read_at(&self, lba: u32, offset: usize, buf: &mut [u8]) -> Result<(), FsStatus> {
        self.disk.read_at(lba, offset, buf).map_err(disk_status)
    }

    fn write_at(&self, lba: u32, offset: usize, data: &[u8]) -> Result<(), FsStatus> {
        self.disk.write_at(lba, offset, data).map_err(disk_status)
    }

    /// Read file data at byte `offset` of `cluster`, within one sector
    pub fn read_data(&self, cluster: u32, offset: u32, buf: &mut [u8]) -> Result<(), FsStatus> {
        let (lba, at) = self.data_position(cluster, offset)?;
        self.read_at(lba, at, buf)
    }

    /// Write file data at byte `offset` of `cluster`, within one sector
    pub fn write_data(&self, cluster: u32, offset: u32, data: &[u8]) -> Result<(), FsStatus> {
        let (lba, at) = self.data_position(cluster, offset)?;
        self.write_at(lba, at, data)
    }

    fn data_position(&self, cluster: u32, offset: u32) -> Result<(u32, usize), FsStatus> {
        if !self.layout.is_data_cluster(cluster) || offset >= self.layout.cluster_bytes() {
            return Err(FsStatus::IntErr);
        }
        let sector = SECTOR_SIZE as u32;
        Ok((
            self.layout.cluster_lba(cluster) + offset / sector,
            (offset % sector) as usize,
        ))
    }

    // -------------------------------------------------------------------------
    // Allocation table
    // -------------------------------------------------------------------------

    /// Sector and offset of byte `at` of FAT copy `copy`
    fn fat_byte(&self, copy: u32, at: u32) -> (u32, usize) {
        let sector = SECTOR_SIZE as u32;
        (
            self.layout.fat_start + copy * self.layout.fat_sectors + at / sector,
            (at % sector) as usize,
        )
    }

    /// Twelve-bit table entry for `cluster`
    pub fn fat_entry(&self, cluster: u32) -> Result<u32, FsStatus> {
        let at = cluster + cluster / 2;
        let mut pair = [0u8; 2];
        for (i, byte) in pair.iter_mut().enumerate() {
            let (lba, offset) = self.fat_byte(0, at + i as u32);
            self.read_at(lba, offset, core::slice::from_mut(byte))?;
        }
        let word = u16::from_le_bytes(pair) as u32;
        Ok(if cluster & 1 == 1 { word >> 4 } else { word & 0xFFF })
    }

    /// Store `value` for `cluster` in every FAT copy
    fn set_fat_entry(&self, cluster: u32, value: u32) -> Result<(), FsStatus> {
        let at = cluster + cluster / 2;
        let mut pair = [0u8; 2];
        for (i, byte) in pair.iter_mut().enumerate() {
            let (lba, offset) = self.fat_byte(0, at + i as u32);
            self.read_at(lba, offset, core::slice::from_mut(byte))?;
        }
        let word = u16::from_le_bytes(pair);
        let value = (value & 0xFFF) as u16;
        let word = if cluster & 1 == 1 {
            (word & 0x000F) | (value << 4)
        } else {
            (word & 0xF000) | value
        };
        let bytes = word.to_le_bytes();

        for copy in 0..self.layout.fat_count {
            let (lba, offset) = self.fat_byte(copy, at);
            if offset + 1 < SECTOR_SIZE {
                self.write_at(lba, offset, &bytes)?;
            } else {
                self.write_at(lba, offset, &bytes[..1])?;
                self.write_at(lba + 1, 0, &bytes[1..])?;
            }
        }
        Ok(())
    }

    /// Cluster after `cluster` in its chain, `None` at the end
    pub fn next_cluster(&self, cluster: u32) -> Result<Option<u32>, FsStatus> {
        let next = self.fat_entry(cluster)?;
        if next >= CHAIN_END_MIN {
            return Ok(None);
        }
        if !self.layout.is_data_cluster(next) {
            return Err(FsStatus::IntErr);
        }
        Ok(Some(next))
    }

    /// The `index`-th cluster of the chain starting at `first`
    pub fn nth_cluster(&self, first: u32, index: u32) -> Result<Option<u32>, FsStatus> {
        if first == 0 {
            return Ok(None);
        }
        if index > self.layout.cluster_count {
            return Ok(None);
        }
        let mut cluster = first;
        for _ in 0..index {
            match self.next_cluster(cluster)? {
                Some(next) => cluster = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cluster))
    }

    /// Last cluster and length of the chain starting at `first`
    pub fn chain_tail(&self, first: u32) -> Result<(u32, u32), FsStatus> {
        let mut cluster = first;
        let mut len = 1;
        while let Some(next) = self.next_cluster(cluster)? {
            cluster = next;
            len += 1;
            if len > self.layout.cluster_count {
                return Err(FsStatus::IntErr);
            }
        }
        Ok((cluster, len))
    }

    /// Claim a free cluster and append it after `prev`
    ///
    /// Returns `None` when the volume is full.
    pub fn allocate(&self, prev: Option<u32>) -> Result<Option<u32>, FsStatus> {
        let end = FIRST_CLUSTER + self.layout.cluster_count;
        for cluster in FIRST_CLUSTER..end {
            if self.fat_entry(cluster)? != 0 {
                continue;
            }
            self.set_fat_entry(cluster, CHAIN_END)?;
            if let Some(prev) = prev {
                self.set_fat_entry(prev, cluster)?;
            }
            return Ok(Some(cluster));
        }
        Ok(None)
    }

    /// Return every cluster of the chain starting at `first` to the free pool
    pub fn free_chain(&self, first: u32) -> Result<(), FsStatus> {
        let mut next = Some(first).filter(|&c| c != 0);
        let mut freed = 0;
        while let Some(cluster) = next {
            next = self.next_cluster(cluster)?;
            self.set_fat_entry(cluster, 0)?;
            freed += 1;
            if freed > self.layout.cluster_count {
                return Err(FsStatus::IntErr);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Directories
    // -------------------------------------------------------------------------

    /// Position of entry `index` of `dir`, `None` past its last entry
    fn slot(&self, dir: DirStart, index: u32) -> Result<Option<Slot>, FsStatus> {
        let sector = SECTOR_SIZE as u32;
        match dir {
            DirStart::Root => {
                if index >= self.layout.root_entries {
                    return Ok(None);
                }
                let byte = index * DIR_ENTRY_SIZE;
                Ok(Some(Slot {
                    lba: self.layout.root_start + byte / sector,
                    offset: (byte % sector) as usize,
                }))
            }
            DirStart::Cluster(first) => {
                let per_cluster = self.layout.cluster_bytes() / DIR_ENTRY_SIZE;
                let Some(cluster) = self.nth_cluster(first, index / per_cluster)? else {
                    return Ok(None);
                };
                let byte = (index % per_cluster) * DIR_ENTRY_SIZE;
                Ok(Some(Slot {
                    lba: self.layout.cluster_lba(cluster) + byte / sector,
                    offset: (byte % sector) as usize,
                }))
            }
        }
    }

    fn read_slot(&self, slot: Slot) -> Result<[u8; DIR_ENTRY_SIZE as usize], FsStatus> {
        let mut raw = [0u8; DIR_ENTRY_SIZE as usize];
        self.read_at(slot.lba, slot.offset, &mut raw)?;
        Ok(raw)
    }

    /// Entry `index` of `dir`
    ///
    /// `Ok(None)` once the directory ends; deleted slots come back as
    /// `Some(None)`.
    pub fn entry(&self, dir: DirStart, index: u32) -> Result<Option<Option<DirRecord>>, FsStatus> {
        let Some(slot) = self.slot(dir, index)? else {
            return Ok(None);
        };
        let raw = self.read_slot(slot)?;
        match raw[0] {
            ENTRY_END => Ok(None),
            ENTRY_DELETED => Ok(Some(None)),
            _ => Ok(Some(Some(DirRecord::parse(&raw)))),
        }
    }

    /// Entry of `dir` listed under `name`
    pub fn find(&self, dir: DirStart, name: &ShortName) -> Result<Option<(Slot, DirRecord)>, FsStatus> {
        let mut index = 0;
        while let Some(slot) = self.slot(dir, index)? {
            let raw = self.read_slot(slot)?;
            match raw[0] {
                ENTRY_END => break,
                ENTRY_DELETED => {}
                _ => {
                    let record = DirRecord::parse(&raw);
                    let skip = record.attr & ATTR_LONG_NAME == ATTR_LONG_NAME
                        || record.attr & ATTR_VOLUME_ID != 0;
                    if !skip && record.name == *name {
                        return Ok(Some((slot, record)));
                    }
                }
            }
            index += 1;
        }
        Ok(None)
    }

    /// Store a new entry in the first unused slot of `dir`
    ///
    /// A directory without a free slot fails with `Denied`.
    pub fn insert(&self, dir: DirStart, record: &DirRecord, stamp: u32) -> Result<Slot, FsStatus> {
        let mut index = 0;
        while let Some(slot) = self.slot(dir, index)? {
            let first = self.read_slot(slot)?[0];
            if first == ENTRY_END || first == ENTRY_DELETED {
                self.write_at(slot.lba, slot.offset, &record.encode(stamp))?;
                return Ok(slot);
            }
            index += 1;
        }
        Err(FsStatus::Denied)
    }

    /// Rewrite the entry at `slot` with new size and first cluster
    pub fn update(&self, slot: Slot, record: &DirRecord, stamp: u32) -> Result<(), FsStatus> {
        let mut raw = self.read_slot(slot)?;
        raw[11] = record.attr;
        let (time, date) = split_stamp(stamp);
        raw[18..20].copy_from_slice(&date);
        raw[22..24].copy_from_slice(&time);
        raw[24..26].copy_from_slice(&date);
        raw[26..28].copy_from_slice(&(record.first_cluster as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&record.size.to_le_bytes());
        self.write_at(slot.lba, slot.offset, &raw)
    }

    /// Directory holding the last component of `path`, and that component
    ///
    /// The component is `None` when `path` names the root itself.
    pub fn resolve_parent<'p>(&self, path: &'p str) -> Result<(DirStart, Option<&'p str>), FsStatus> {
        let mut parts = path.split('/').filter(|part| !part.is_empty()).peekable();
        let mut dir = DirStart::Root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                return Ok((dir, Some(part)));
            }
            let name = short_name(part)?;
            match self.find(dir, &name)? {
                Some((_, record)) if record.is_directory() => {
                    dir = DirStart::from_cluster(record.first_cluster);
                }
                _ => return Err(FsStatus::NoPath),
            }
        }
        Ok((dir, None))
    }

    /// Directory named by `path`
    pub fn resolve_dir(&self, path: &str) -> Result<DirStart, FsStatus> {
        let (parent, last) = self.resolve_parent(path)?;
        let Some(last) = last else {
            return Ok(DirStart::Root);
        };
        match self.find(parent, &short_name(last)?)? {
            Some((_, record)) if record.is_directory() => {
                Ok(DirStart::from_cluster(record.first_cluster))
            }
            _ => Err(FsStatus::NoPath),
        }
    }
}

/// Whether `record` belongs in a directory listing
pub fn is_listed(record: &DirRecord) -> bool {
    !record.is_hidden_from_listing()
}
