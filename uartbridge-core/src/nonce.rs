//! Boot nonce
//!
//! Every boot takes the number after the one stored in `/nonce.txt` and
//! writes it back, so logs from different runs can be told apart. The
//! file holds the number as decimal text; a missing or empty file counts
//! as -1, so the first boot gets 0.

use core::fmt::Write as _;

use heapless::String;
use uartbridge_hal::MappedFlash;

use crate::fs::{FileSystem, FsError, FsStatus, OpenFlags};

/// Where the last nonce is kept
pub const NONCE_PATH: &str = "/nonce.txt";

/// Longest text an `i32` prints as
const MAX_DIGITS: usize = 11;

/// Nonce file failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NonceError {
    /// The file could not be opened, read or written
    Fs(FsError),
    /// The file holds something other than a number
    Corrupted,
}

impl From<FsError> for NonceError {
    fn from(e: FsError) -> Self {
        NonceError::Fs(e)
    }
}

/// Parse stored nonce text; empty means no previous nonce
pub fn parse(text: &[u8]) -> Result<i32, NonceError> {
    if text.is_empty() {
        return Ok(-1);
    }
    if !text.iter().all(|b| b.is_ascii_digit() || *b == b'-') {
        return Err(NonceError::Corrupted);
    }
    core::str::from_utf8(text)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(NonceError::Corrupted)
}

/// Advance the nonce stored on `fs` and return the new value
pub fn advance<F: MappedFlash>(fs: &FileSystem<'_, F>) -> Result<i32, NonceError> {
    let flags = OpenFlags {
        read: true,
        write: true,
        open_always: true,
        ..OpenFlags::default()
    };
    let mut file = fs.open_file(NONCE_PATH, flags)?;

    let mut buf = [0u8; MAX_DIGITS];
    let previous = match file.read_all(&mut buf) {
        Ok(text) => parse(text)?,
        // Longer than any i32
        Err(e) if e.status() == FsStatus::NotEnoughCore => return Err(NonceError::Corrupted),
        Err(e) => return Err(e.into()),
    };
    let nonce = previous.checked_add(1).ok_or(NonceError::Corrupted)?;

    let mut text: String<MAX_DIGITS> = String::new();
    // MAX_DIGITS holds every i32
    let _ = write!(text, "{}", nonce);
    file.seek(0)?;
    file.write(text.as_bytes())?;
    file.close()?;
    Ok(nonce)
}
