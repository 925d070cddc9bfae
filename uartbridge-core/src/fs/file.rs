//! Files and directories on the mounted volume
//!
//! Paths are `/`-separated 8.3 names, case-insensitive, relative to the
//! root of the one volume. Failures carry the name of the operation
//! ("open", "read", "lseek", ...) and a native result code in [`FsError`].
//!
//! File data goes straight to the store. The directory entry (size and
//! first cluster) is only brought up to date by [`File::sync`] and
//! [`File::close`].

use heapless::String;
use uartbridge_hal::{MappedFlash, SECTOR_SIZE};

use super::diskio::{fat_time, FatDisk};
use super::fat::{self, DirRecord, DirStart, Layout, Slot, Volume, ATTR_ARCHIVE};
use super::status::{FsError, FsStatus};
use super::volume::{mount, VolumeInfo, FAT12_CLUSTER_LIMIT};

/// Largest size a FAT file can have
const MAX_FILE_SIZE: u32 = u32::MAX;

/// How [`FileSystem::open_file`] opens a path
///
/// The flags follow FatFS `f_open` modes. With none of the create flags
/// set the file must already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    /// Fail with `NO_FILE` if the file is missing (the default)
    pub open_existing: bool,
    /// Create the file, failing with `EXIST` if it is already there
    pub create_new: bool,
    /// Create the file, truncating it if it is already there
    pub create_always: bool,
    /// Open the file, creating it if it is missing
    pub open_always: bool,
    /// Like `open_always`, with the position at the end of the file
    pub open_append: bool,
}

impl OpenFlags {
    fn creates(&self) -> bool {
        self.create_new || self.create_always || self.open_always || self.open_append
    }
}

/// The FAT volume on the sector store
pub struct FileSystem<'a, F> {
    volume: Volume<'a, F>,
    info: VolumeInfo,
}

impl<'a, F: MappedFlash> FileSystem<'a, F> {
    /// Mount the volume found on `disk`
    pub fn mount(disk: FatDisk<'a, F>) -> Result<Self, FsError> {
        let info = mount(&disk)?;
        if info.cluster_count >= FAT12_CLUSTER_LIMIT {
            return Err(FsError::new("mount", FsStatus::NoFilesystem));
        }
        Ok(Self {
            volume: Volume::new(disk, Layout::new(&info)),
            info,
        })
    }

    /// Geometry of the mounted volume
    pub fn info(&self) -> VolumeInfo {
        self.info
    }

    /// Open or create the file at `path`
    pub fn open_file(&self, path: &str, flags: OpenFlags) -> Result<File<'a, F>, FsError> {
        open_file(self.volume, path, flags).map_err(|status| FsError::new("open", status))
    }

    /// Open the directory at `path`; `/` is the root
    pub fn open_directory(&self, path: &str) -> Result<Directory<'a, F>, FsError> {
        let start = self
            .volume
            .resolve_dir(path)
            .map_err(|status| FsError::new("opendir", status))?;
        Ok(Directory {
            volume: self.volume,
            start,
        })
    }
}

fn open_file<'a, F: MappedFlash>(
    volume: Volume<'a, F>,
    path: &str,
    flags: OpenFlags,
) -> Result<File<'a, F>, FsStatus> {
    let (parent, last) = volume.resolve_parent(path)?;
    let name = fat::short_name(last.ok_or(FsStatus::InvalidName)?)?;

    let (entry, mut record) = match volume.find(parent, &name)? {
        Some(_) if flags.create_new => return Err(FsStatus::Exist),
        Some((_, record)) if record.is_directory() => return Err(FsStatus::NoFile),
        Some((_, record)) if record.is_read_only() && (flags.write || flags.create_always) => {
            return Err(FsStatus::Denied);
        }
        Some(found) => found,
        None if flags.creates() => {
            let record = DirRecord {
                name,
                attr: ATTR_ARCHIVE,
                first_cluster: 0,
                size: 0,
            };
            (volume.insert(parent, &record, fat_time())?, record)
        }
        None => return Err(FsStatus::NoFile),
    };

    if flags.create_always && (record.size != 0 || record.first_cluster != 0) {
        volume.free_chain(record.first_cluster)?;
        record.first_cluster = 0;
        record.size = 0;
        volume.update(entry, &record, fat_time())?;
    }

    let pos = if flags.open_append { record.size } else { 0 };
    Ok(File {
        volume,
        entry,
        record,
        pos,
        readable: flags.read,
        writable: flags.write,
        dirty: false,
    })
}

/// An open file
///
/// Dropping a file without [`close`](File::close) loses any size change
/// not yet written by [`sync`](File::sync).
pub struct File<'a, F> {
    volume: Volume<'a, F>,
    entry: Slot,
    record: DirRecord,
    pos: u32,
    readable: bool,
    writable: bool,
    dirty: bool,
}

impl<'a, F: MappedFlash> File<'a, F> {
    /// Current length in bytes
    pub fn size(&self) -> u32 {
        self.record.size
    }

    /// Current read/write position
    pub fn tell(&self) -> u32 {
        self.pos
    }

    /// Move the read/write position to `pos`
    ///
    /// Past the end of the file, a writable file grows to `pos` (as far as
    /// free space allows); a read-only one stops at its end.
    pub fn seek(&mut self, pos: u32) -> Result<(), FsError> {
        let op = |status| FsError::new("lseek", status);
        if pos <= self.record.size {
            self.pos = pos;
            return Ok(());
        }
        if !self.writable {
            self.pos = self.record.size;
            return Ok(());
        }
        let capacity = self.grow(pos).map_err(op)?;
        self.pos = pos.min(capacity);
        self.record.size = self.pos;
        self.dirty = true;
        Ok(())
    }

    /// Read from the current position into `buf`
    ///
    /// Returns the number of bytes read, short only at the end of the file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let op = |status| FsError::new("read", status);
        if !self.readable {
            return Err(op(FsStatus::Denied));
        }
        let remaining = (self.record.size - self.pos.min(self.record.size)) as usize;
        let len = buf.len().min(remaining);

        let mut done = 0;
        while done < len {
            let (cluster, offset, chunk) = self.span(len - done).map_err(op)?;
            self.volume
                .read_data(cluster, offset, &mut buf[done..done + chunk])
                .map_err(op)?;
            done += chunk;
            self.pos += chunk as u32;
        }
        Ok(done)
    }

    /// Read everything from the current position to the end into `buf`
    ///
    /// Fails with `NOT_ENOUGH_CORE` if `buf` cannot hold it.
    pub fn read_all<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b [u8], FsError> {
        let remaining = (self.record.size - self.pos.min(self.record.size)) as usize;
        if buf.len() < remaining {
            return Err(FsError::new("read", FsStatus::NotEnoughCore));
        }
        let n = self.read(&mut buf[..remaining])?;
        Ok(&buf[..n])
    }

    /// Write `data` at the current position
    ///
    /// Returns the number of bytes written, short only when the volume is
    /// full.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, FsError> {
        let op = |status| FsError::new("write", status);
        if !self.writable {
            return Err(op(FsStatus::Denied));
        }
        let wanted = u32::try_from(data.len()).unwrap_or(MAX_FILE_SIZE);
        let end = self.pos.saturating_add(wanted);
        let capacity = self.grow(end).map_err(op)?;
        let len = (end.min(capacity) - self.pos.min(capacity)) as usize;

        let mut done = 0;
        while done < len {
            let (cluster, offset, chunk) = self.span(len - done).map_err(op)?;
            self.volume
                .write_data(cluster, offset, &data[done..done + chunk])
                .map_err(op)?;
            done += chunk;
            self.pos += chunk as u32;
        }
        if done > 0 {
            self.record.size = self.record.size.max(self.pos);
            self.dirty = true;
        }
        Ok(done)
    }

    /// Write the size and first cluster back to the directory entry
    pub fn sync(&mut self) -> Result<(), FsError> {
        self.flush().map_err(|status| FsError::new("sync", status))
    }

    /// Sync and release the file
    pub fn close(mut self) -> Result<(), FsError> {
        self.flush().map_err(|status| FsError::new("close", status))
    }

    fn flush(&mut self) -> Result<(), FsStatus> {
        if !self.dirty {
            return Ok(());
        }
        self.record.attr |= ATTR_ARCHIVE;
        self.volume.update(self.entry, &self.record, fat_time())?;
        self.dirty = false;
        Ok(())
    }

    /// Cluster, offset inside it and length of the next contiguous piece
    /// of at most `max` bytes at the current position
    ///
    /// Pieces never cross a sector.
    fn span(&self, max: usize) -> Result<(u32, u32, usize), FsStatus> {
        let cluster_bytes = self.volume.layout().cluster_bytes();
        let cluster = self
            .volume
            .nth_cluster(self.record.first_cluster, self.pos / cluster_bytes)?
            .ok_or(FsStatus::IntErr)?;
        let offset = self.pos % cluster_bytes;
        let in_sector = SECTOR_SIZE - (offset as usize % SECTOR_SIZE);
        Ok((cluster, offset, max.min(in_sector)))
    }

    /// Make the chain long enough for `bytes` bytes
    ///
    /// Returns the capacity reached, which falls short of `bytes` only
    /// when the volume is full.
    fn grow(&mut self, bytes: u32) -> Result<u32, FsStatus> {
        let cluster_bytes = self.volume.layout().cluster_bytes();
        let needed = bytes.div_ceil(cluster_bytes);

        let (mut last, mut have) = match self.record.first_cluster {
            0 => (None, 0),
            first => {
                let (tail, len) = self.volume.chain_tail(first)?;
                (Some(tail), len)
            }
        };
        while have < needed {
            let Some(cluster) = self.volume.allocate(last)? else {
                break;
            };
            if last.is_none() {
                self.record.first_cluster = cluster;
                self.dirty = true;
            }
            last = Some(cluster);
            have += 1;
        }
        Ok(have.saturating_mul(cluster_bytes))
    }
}

/// One name in a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// `NAME.EXT` as stored on disk
    pub path: String<12>,
    pub is_directory: bool,
}

/// An open directory
pub struct Directory<'a, F> {
    volume: Volume<'a, F>,
    start: DirStart,
}

impl<'a, F: MappedFlash> Directory<'a, F> {
    /// Everything listed in the directory, from the first entry
    ///
    /// Dot entries, volume labels and long-name fragments are left out.
    pub fn entries(&self) -> Entries<'a, F> {
        Entries {
            volume: self.volume,
            start: self.start,
            index: 0,
            done: false,
        }
    }
}

/// Iterator over a directory listing
pub struct Entries<'a, F> {
    volume: Volume<'a, F>,
    start: DirStart,
    index: u32,
    done: bool,
}

impl<F: MappedFlash> Iterator for Entries<'_, F> {
    type Item = Result<Entry, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let slot = self.volume.entry(self.start, self.index);
            self.index += 1;
            match slot {
                Ok(Some(Some(record))) if fat::is_listed(&record) => {
                    return Some(Ok(Entry {
                        path: record.display_name(),
                        is_directory: record.is_directory(),
                    }));
                }
                Ok(Some(_)) => {}
                Ok(None) => self.done = true,
                Err(status) => {
                    self.done = true;
                    return Some(Err(FsError::new("readdir", status)));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::volume::install;
    use crate::storage::mock::MemFlash;
    use crate::storage::{FlashDisk, SharedDisk};
    use proptest::prelude::*;
    use std::vec;
    use std::vec::Vec;

    const RW_CREATE: OpenFlags = OpenFlags {
        read: true,
        write: true,
        open_existing: false,
        create_new: false,
        create_always: false,
        open_always: true,
        open_append: false,
    };

    const READ_ONLY: OpenFlags = OpenFlags {
        read: true,
        write: false,
        open_existing: true,
        create_new: false,
        create_always: false,
        open_always: false,
        open_append: false,
    };

    fn shared(sectors: u32) -> SharedDisk<MemFlash> {
        SharedDisk::new(FlashDisk::new(MemFlash::new(48), sectors))
    }

    fn filesystem(disk: &SharedDisk<MemFlash>) -> FileSystem<'_, MemFlash> {
        let fat = FatDisk::new(disk);
        install(&fat).unwrap();
        FileSystem::mount(fat).unwrap()
    }

    #[test]
    fn test_mount_blank_disk_fails() {
        let disk = shared(32);
        let err = FileSystem::mount(FatDisk::new(&disk)).err().unwrap();
        assert_eq!(err.op, "mount");
        assert_eq!(err.status(), FsStatus::NoFilesystem);
    }

    #[test]
    fn test_open_missing_file_without_create_fails() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let err = fs.open_file("/nonce.txt", READ_ONLY).err().unwrap();
        assert_eq!(err.op, "open");
        assert_eq!(err.status(), FsStatus::NoFile);
    }

    #[test]
    fn test_new_file_is_empty() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let mut file = fs.open_file("/nonce.txt", RW_CREATE).unwrap();
        assert_eq!(file.size(), 0);
        assert_eq!(file.tell(), 0);
        let mut buf = [0u8; 8];
        assert_eq!(file.read_all(&mut buf).unwrap(), b"");
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_close_reopen_read() {
        let disk = shared(32);
        let fs = filesystem(&disk);

        let mut file = fs.open_file("/hello.txt", RW_CREATE).unwrap();
        assert_eq!(file.write(b"hello, flash").unwrap(), 12);
        assert_eq!(file.tell(), 12);
        assert_eq!(file.size(), 12);
        file.close().unwrap();

        let mut file = fs.open_file("HELLO.TXT", READ_ONLY).unwrap();
        assert_eq!(file.size(), 12);
        let mut buf = [0u8; 32];
        assert_eq!(file.read_all(&mut buf).unwrap(), b"hello, flash");
    }

    #[test]
    fn test_size_reaches_directory_only_on_sync() {
        let disk = shared(32);
        let fs = filesystem(&disk);

        let mut file = fs.open_file("/log.txt", RW_CREATE).unwrap();
        file.write(b"abc").unwrap();
        assert_eq!(fs.open_file("/log.txt", READ_ONLY).unwrap().size(), 0);

        file.sync().unwrap();
        assert_eq!(fs.open_file("/log.txt", READ_ONLY).unwrap().size(), 3);
    }

    #[test]
    fn test_seek_then_overwrite_in_place() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let mut file = fs.open_file("/n.txt", RW_CREATE).unwrap();
        file.write(b"41").unwrap();

        file.seek(0).unwrap();
        file.write(b"42").unwrap();
        assert_eq!(file.size(), 2);
        file.seek(0).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(file.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"42");
    }

    #[test]
    fn test_seek_past_end() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let mut file = fs.open_file("/grow.bin", RW_CREATE).unwrap();
        file.seek(100).unwrap();
        assert_eq!(file.size(), 100);
        assert_eq!(file.tell(), 100);
        file.close().unwrap();

        let mut file = fs.open_file("/grow.bin", READ_ONLY).unwrap();
        file.seek(500).unwrap();
        assert_eq!(file.tell(), 100);
    }

    #[test]
    fn test_access_mode_is_enforced() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        fs.open_file("/a.txt", RW_CREATE).unwrap().close().unwrap();

        let mut reader = fs.open_file("/a.txt", READ_ONLY).unwrap();
        let err = reader.write(b"x").unwrap_err();
        assert_eq!((err.op, err.status()), ("write", FsStatus::Denied));

        let write_only = OpenFlags {
            write: true,
            ..OpenFlags::default()
        };
        let mut writer = fs.open_file("/a.txt", write_only).unwrap();
        let err = writer.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!((err.op, err.status()), ("read", FsStatus::Denied));
    }

    #[test]
    fn test_create_new_refuses_existing() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let create_new = OpenFlags {
            write: true,
            create_new: true,
            ..OpenFlags::default()
        };
        fs.open_file("/once.txt", create_new).unwrap().close().unwrap();
        let err = fs.open_file("/once.txt", create_new).err().unwrap();
        assert_eq!(err.status(), FsStatus::Exist);
    }

    #[test]
    fn test_create_always_truncates() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let mut file = fs.open_file("/t.txt", RW_CREATE).unwrap();
        file.write(&[7u8; 5000]).unwrap();
        file.close().unwrap();

        let truncate = OpenFlags {
            write: true,
            create_always: true,
            ..OpenFlags::default()
        };
        let file = fs.open_file("/t.txt", truncate).unwrap();
        assert_eq!(file.size(), 0);
        assert_eq!(fs.open_file("/t.txt", READ_ONLY).unwrap().size(), 0);
        // both clusters went back to the free pool
        assert_eq!(fs.volume.fat_entry(2).unwrap(), 0);
        assert_eq!(fs.volume.fat_entry(3).unwrap(), 0);
    }

    #[test]
    fn test_append_starts_at_end() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let mut file = fs.open_file("/app.txt", RW_CREATE).unwrap();
        file.write(b"one").unwrap();
        file.close().unwrap();

        let append = OpenFlags {
            read: true,
            write: true,
            open_append: true,
            ..OpenFlags::default()
        };
        let mut file = fs.open_file("/app.txt", append).unwrap();
        assert_eq!(file.tell(), 3);
        file.write(b"two").unwrap();
        file.seek(0).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(file.read_all(&mut buf).unwrap(), b"onetwo");
    }

    #[test]
    fn test_read_all_needs_room_for_whole_file() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let mut file = fs.open_file("/big.txt", RW_CREATE).unwrap();
        file.write(&[1u8; 10]).unwrap();
        file.seek(0).unwrap();
        let err = file.read_all(&mut [0u8; 4]).unwrap_err();
        assert_eq!((err.op, err.status()), ("read", FsStatus::NotEnoughCore));
    }

    #[test]
    fn test_write_stops_when_volume_full() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let clusters = fs.info().cluster_count as usize;
        let mut file = fs.open_file("/fill.bin", RW_CREATE).unwrap();

        let data = vec![0xA5u8; (clusters + 1) * SECTOR_SIZE];
        assert_eq!(file.write(&data).unwrap(), clusters * SECTOR_SIZE);
        assert_eq!(file.write(b"more").unwrap(), 0);
    }

    #[test]
    fn test_bad_paths() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        let status = |path| fs.open_file(path, RW_CREATE).err().unwrap().status();
        assert_eq!(status("/"), FsStatus::InvalidName);
        assert_eq!(status("/waytoolongname.txt"), FsStatus::InvalidName);
        assert_eq!(status("/nodir/file.txt"), FsStatus::NoPath);
    }

    #[test]
    fn test_directory_lists_created_files() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        fs.open_file("/nonce.txt", RW_CREATE).unwrap().close().unwrap();
        fs.open_file("/readme", RW_CREATE).unwrap().close().unwrap();

        let dir = fs.open_directory("/").unwrap();
        let entries: Vec<Entry> = dir.entries().map(|e| e.unwrap()).collect();
        let names: Vec<(&str, bool)> = entries
            .iter()
            .map(|e| (e.path.as_str(), e.is_directory))
            .collect();
        assert_eq!(names, [("NONCE.TXT", false), ("README", false)]);
        // listing again starts over
        assert_eq!(dir.entries().count(), 2);
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let disk = shared(32);
        let fs = filesystem(&disk);
        fs.open_file("/plain.txt", RW_CREATE).unwrap().close().unwrap();

        let err = fs.open_directory("/nope").err().unwrap();
        assert_eq!((err.op, err.status()), ("opendir", FsStatus::NoPath));
        let err = fs.open_directory("/plain.txt").err().unwrap();
        assert_eq!(err.status(), FsStatus::NoPath);
    }

    proptest! {
        #[test]
        fn prop_written_bytes_read_back(
            data in proptest::collection::vec(any::<u8>(), 0..3 * SECTOR_SIZE),
            at in 0u32..SECTOR_SIZE as u32 * 2,
        ) {
            let disk = shared(32);
            let fs = filesystem(&disk);
            let mut file = fs.open_file("/p.bin", RW_CREATE).unwrap();
            file.seek(at).unwrap();
            prop_assert_eq!(file.write(&data).unwrap(), data.len());
            file.close().unwrap();

            let mut file = fs.open_file("/p.bin", READ_ONLY).unwrap();
            prop_assert_eq!(file.size(), at + data.len() as u32);
            file.seek(at).unwrap();
            let mut back = vec![0u8; data.len()];
            prop_assert_eq!(file.read(&mut back).unwrap(), data.len());
            prop_assert_eq!(back, data);
        }
    }
}
