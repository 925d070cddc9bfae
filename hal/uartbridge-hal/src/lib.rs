//! uartbridge Hardware Abstraction Layer
//!
//! This crate defines the hardware traits the bridge firmware is written
//! against. Chip-specific crates implement them; the core logic and its
//! host tests only ever see these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  uartbridge-firmware / uartbridge-core  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  uartbridge-hal (this crate - traits)   │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!           ┌───────────────────┐
//!           │ uartbridge-hal-   │
//!           │      rp2040       │
//!           └───────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::MappedFlash`] - `embedded-storage` NOR flash that is also
//!   readable as memory
//!
//! [`serial::UartConfig`] carries the line settings shared by the core
//! configuration and the chip UART.

#![no_std]
#![deny(unsafe_code)]

pub mod flash;
pub mod serial;

// Re-export key items at crate root for convenience
pub use flash::{MappedFlash, NorFlash, NorFlashErrorKind, Sector, PAGE_SIZE, SECTOR_SIZE};
pub use serial::UartConfig;
