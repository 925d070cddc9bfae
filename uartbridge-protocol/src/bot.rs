//! Bulk-Only Transport wrappers
//!
//! CBW format (31 bytes, little endian):
//! - SIGNATURE (4 bytes): `USBC`
//! - TAG (4 bytes): echoed back in the CSW
//! - DATA LENGTH (4 bytes): bytes the host expects to move
//! - FLAGS (1 byte): bit 7 set for device-to-host
//! - LUN (1 byte): low nibble
//! - CB LENGTH (1 byte): 1..=16
//! - CB (16 bytes): SCSI command descriptor block, zero padded
//!
//! CSW format (13 bytes): `USBS`, tag, residue, status.

use heapless::Vec;

/// Interface class code for mass storage
pub const CLASS_MSC: u8 = 0x08;
/// SCSI transparent command set
pub const SUBCLASS_SCSI: u8 = 0x06;
/// Bulk-Only Transport
pub const PROTOCOL_BOT: u8 = 0x50;

/// Class request: highest logical unit number
pub const GET_MAX_LUN: u8 = 0xFE;
/// Class request: reset the transport state machine
pub const BULK_ONLY_RESET: u8 = 0xFF;

/// `USBC`
pub const CBW_SIGNATURE: u32 = 0x4342_5355;
/// `USBS`
pub const CSW_SIGNATURE: u32 = 0x5342_5355;

pub const CBW_LEN: usize = 31;
pub const CSW_LEN: usize = 13;
/// Longest SCSI command descriptor block
pub const MAX_CDB_LEN: usize = 16;

/// Errors while decoding a command block wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Packet is not exactly 31 bytes
    InvalidLength,
    /// First four bytes are not `USBC`
    InvalidSignature,
    /// CB LENGTH outside 1..=16
    InvalidCommandLength,
}

/// Direction of the data stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// No data stage
    None,
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// A decoded command block wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlockWrapper {
    pub tag: u32,
    pub data_transfer_length: u32,
    pub direction: Direction,
    pub lun: u8,
    /// SCSI command descriptor block
    pub command: Vec<u8, MAX_CDB_LEN>,
}

impl CommandBlockWrapper {
    /// Decode one CBW packet
    pub fn parse(packet: &[u8]) -> Result<Self, ProtocolError> {
        if packet.len() != CBW_LEN {
            return Err(ProtocolError::InvalidLength);
        }
        let word = |at: usize| {
            u32::from_le_bytes([packet[at], packet[at + 1], packet[at + 2], packet[at + 3]])
        };

        if word(0) != CBW_SIGNATURE {
            return Err(ProtocolError::InvalidSignature);
        }

        let cb_len = packet[14] as usize;
        if cb_len == 0 || cb_len > MAX_CDB_LEN {
            return Err(ProtocolError::InvalidCommandLength);
        }

        let data_transfer_length = word(8);
        let direction = if data_transfer_length == 0 {
            Direction::None
        } else if packet[12] & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        };

        let mut command = Vec::new();
        command
            .extend_from_slice(&packet[15..15 + cb_len])
            .map_err(|_| ProtocolError::InvalidCommandLength)?;

        Ok(Self {
            tag: word(4),
            data_transfer_length,
            direction,
            lun: packet[13] & 0x0F,
            command,
        })
    }

    /// SCSI operation code
    pub fn opcode(&self) -> u8 {
        self.command.first().copied().unwrap_or(0)
    }
}

/// Command outcome reported in the CSW
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandStatus {
    Passed = 0,
    Failed = 1,
    PhaseError = 2,
}

/// Command status wrapper sent after every command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandStatusWrapper {
    pub tag: u32,
    /// Bytes of the expected transfer that were not moved
    pub residue: u32,
    pub status: CommandStatus,
}

impl CommandStatusWrapper {
    /// Status for `cbw` after `transferred` data bytes were moved
    pub fn for_command(cbw: &CommandBlockWrapper, transferred: u32, status: CommandStatus) -> Self {
        Self {
            tag: cbw.tag,
            residue: cbw.data_transfer_length.saturating_sub(transferred),
            status,
        }
    }

    pub fn encode(&self) -> [u8; CSW_LEN] {
        let mut out = [0u8; CSW_LEN];
        out[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
        out[4..8].copy_from_slice(&self.tag.to_le_bytes());
        out[8..12].copy_from_slice(&self.residue.to_le_bytes());
        out[12] = self.status as u8;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cbw(tag: u32, len: u32, flags: u8, cdb: &[u8]) -> [u8; CBW_LEN] {
        let mut p = [0u8; CBW_LEN];
        p[0..4].copy_from_slice(b"USBC");
        p[4..8].copy_from_slice(&tag.to_le_bytes());
        p[8..12].copy_from_slice(&len.to_le_bytes());
        p[12] = flags;
        p[14] = cdb.len() as u8;
        p[15..15 + cdb.len()].copy_from_slice(cdb);
        p
    }

    #[test]
    fn test_signature_constants_match_ascii() {
        assert_eq!(CBW_SIGNATURE.to_le_bytes(), *b"USBC");
        assert_eq!(CSW_SIGNATURE.to_le_bytes(), *b"USBS");
    }

    #[test]
    fn test_parse_read10_cbw() {
        let cdb = [0x28, 0, 0, 0, 0, 8, 0, 0, 1, 0];
        let parsed = CommandBlockWrapper::parse(&cbw(0x1234, 512, 0x80, &cdb)).unwrap();

        assert_eq!(parsed.tag, 0x1234);
        assert_eq!(parsed.data_transfer_length, 512);
        assert_eq!(parsed.direction, Direction::In);
        assert_eq!(parsed.lun, 0);
        assert_eq!(parsed.command.as_slice(), &cdb);
        assert_eq!(parsed.opcode(), 0x28);
    }

    #[test]
    fn test_zero_length_has_no_data_stage() {
        let parsed = CommandBlockWrapper::parse(&cbw(1, 0, 0x80, &[0x00; 6])).unwrap();
        assert_eq!(parsed.direction, Direction::None);
    }

    #[test]
    fn test_out_direction() {
        let parsed = CommandBlockWrapper::parse(&cbw(1, 4096, 0x00, &[0x2A; 10])).unwrap();
        assert_eq!(parsed.direction, Direction::Out);
    }

    #[test]
    fn test_reject_bad_packets() {
        let good = cbw(1, 0, 0, &[0x00; 6]);

        assert_eq!(
            CommandBlockWrapper::parse(&good[..30]),
            Err(ProtocolError::InvalidLength)
        );

        let mut bad_sig = good;
        bad_sig[0] = b'X';
        assert_eq!(
            CommandBlockWrapper::parse(&bad_sig),
            Err(ProtocolError::InvalidSignature)
        );

        let mut no_cdb = good;
        no_cdb[14] = 0;
        assert_eq!(
            CommandBlockWrapper::parse(&no_cdb),
            Err(ProtocolError::InvalidCommandLength)
        );

        let mut long_cdb = good;
        long_cdb[14] = 17;
        assert_eq!(
            CommandBlockWrapper::parse(&long_cdb),
            Err(ProtocolError::InvalidCommandLength)
        );
    }

    #[test]
    fn test_csw_encoding() {
        let parsed = CommandBlockWrapper::parse(&cbw(0xDEADBEEF, 36, 0x80, &[0x12; 6])).unwrap();
        let csw = CommandStatusWrapper::for_command(&parsed, 20, CommandStatus::Failed);
        let bytes = csw.encode();

        assert_eq!(&bytes[0..4], b"USBS");
        assert_eq!(&bytes[4..8], &0xDEADBEEFu32.to_le_bytes());
        assert_eq!(&bytes[8..12], &16u32.to_le_bytes());
        assert_eq!(bytes[12], 1);
    }

    #[test]
    fn test_residue_never_negative() {
        let parsed = CommandBlockWrapper::parse(&cbw(1, 8, 0x80, &[0x03; 6])).unwrap();
        let csw = CommandStatusWrapper::for_command(&parsed, 18, CommandStatus::Passed);
        assert_eq!(csw.residue, 0);
    }

    proptest! {
        #[test]
        fn test_parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = CommandBlockWrapper::parse(&bytes);
        }

        #[test]
        fn test_valid_cdb_lengths_preserved(len in 1usize..=16, tag in any::<u32>()) {
            let cdb = [0xA5u8; 16];
            let parsed = CommandBlockWrapper::parse(&cbw(tag, 0, 0, &cdb[..len])).unwrap();
            prop_assert_eq!(parsed.command.len(), len);
            prop_assert_eq!(parsed.tag, tag);
        }
    }
}
