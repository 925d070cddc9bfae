//! USB Mass Storage wire protocol
//!
//! The bridge exposes its sector store to the host as a SCSI disk over the
//! Bulk-Only Transport (BOT). Every exchange on the bulk endpoints is:
//!
//! ```text
//! host → device   CBW   31 bytes, carries a 6..16 byte SCSI CDB
//! (either way)    DATA  0..n bytes, direction and length from the CBW
//! device → host   CSW   13 bytes, echoes the tag, reports status
//! ```
//!
//! This crate only parses and encodes; it never touches USB hardware.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod bot;
pub mod scsi;

pub use bot::{CommandBlockWrapper, CommandStatus, CommandStatusWrapper, Direction, ProtocolError};
pub use scsi::{ScsiCommand, SenseData};
