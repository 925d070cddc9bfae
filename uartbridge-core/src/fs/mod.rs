//! Filesystem-facing side of the sector store
//!
//! - [`diskio`] - the block interface a FatFS-style library drives
//! - [`status`] - native result codes and the error wrapper built from them
//! - [`volume`] - first-use bootstrap: find a FAT volume or create one
//! - [`file`] - files and directories on the mounted volume

pub mod diskio;
mod fat;
pub mod file;
pub mod status;
pub mod volume;

pub use diskio::{fat_time, DiskResult, FatDisk, IoctlRequest, IoctlResponse};
pub use file::{Directory, Entries, Entry, File, FileSystem, OpenFlags};
pub use status::{ErrorKind, FsError, FsStatus};
pub use volume::{install, MountOutcome, VolumeInfo};
