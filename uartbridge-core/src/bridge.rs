//! Byte bridge between the USB serial port and the hardware UART
//!
//! Bytes are forwarded one at a time in both directions. Every forwarded
//! byte gets a transfer index from a single counter shared by both
//! directions, so a log of transfers shows the interleaving on the wire.

/// One end of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Side {
    /// USB CDC data port (the host)
    Usb,
    /// Hardware UART (the device on the RS232 side)
    Uart,
}

impl Side {
    /// Label used in transfer logs
    pub fn name(self) -> &'static str {
        match self {
            Side::Usb => "USB",
            Side::Uart => "UART",
        }
    }
}

/// A byte forwarded across the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
    pub index: u32,
    /// Side the byte was read from
    pub from: Side,
    pub byte: u8,
}

/// Transfer bookkeeping for both directions
#[derive(Debug, Default)]
pub struct Bridge {
    next_index: u32,
}

impl Bridge {
    pub const fn new() -> Self {
        Self { next_index: 0 }
    }

    /// Number of transfers recorded so far (wraps)
    pub fn count(&self) -> u32 {
        self.next_index
    }

    /// Assign the next transfer index to `byte` read from `from`
    pub fn record(&mut self, from: Side, byte: u8) -> Transfer {
        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        Transfer { index, from, byte }
    }
}
