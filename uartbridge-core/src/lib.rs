//! Board-agnostic core logic for the uartbridge firmware
//!
//! This crate contains everything that does not touch a specific chip:
//!
//! - Flash region location and the sector store over raw NOR flash
//! - Filesystem-facing disk I/O, status wrapping and first-use formatting
//! - Files and directories on the FAT12 volume, and the boot nonce kept in one
//! - Mass-storage responder (capacity, readiness, block translation)
//! - Byte bridge bookkeeping between the USB and UART sides
//! - Configuration types and validation

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod bridge;
pub mod config;
pub mod fs;
pub mod msc;
pub mod nonce;
pub mod storage;
