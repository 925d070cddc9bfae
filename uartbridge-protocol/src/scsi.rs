//! SCSI block commands used by a USB flash disk
//!
//! Multi-byte CDB fields and response fields are big endian.

use crate::bot::ProtocolError;

pub mod opcode {
    pub const TEST_UNIT_READY: u8 = 0x00;
    pub const REQUEST_SENSE: u8 = 0x03;
    pub const INQUIRY: u8 = 0x12;
    pub const MODE_SENSE_6: u8 = 0x1A;
    pub const START_STOP_UNIT: u8 = 0x1B;
    pub const PREVENT_ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;
    pub const READ_FORMAT_CAPACITIES: u8 = 0x23;
    pub const READ_CAPACITY_10: u8 = 0x25;
    pub const READ_10: u8 = 0x28;
    pub const WRITE_10: u8 = 0x2A;
}

/// Sense keys
pub mod sense_key {
    pub const NO_SENSE: u8 = 0x00;
    pub const NOT_READY: u8 = 0x02;
    pub const MEDIUM_ERROR: u8 = 0x03;
    pub const HARDWARE_ERROR: u8 = 0x04;
    pub const ILLEGAL_REQUEST: u8 = 0x05;
    pub const DATA_PROTECT: u8 = 0x07;
}

/// Additional sense codes
pub mod asc {
    pub const NONE: u8 = 0x00;
    pub const WRITE_ERROR: u8 = 0x0C;
    pub const UNRECOVERED_READ_ERROR: u8 = 0x11;
    pub const INVALID_COMMAND_OPCODE: u8 = 0x20;
    pub const LBA_OUT_OF_RANGE: u8 = 0x21;
    pub const INVALID_FIELD_IN_CDB: u8 = 0x24;
    pub const WRITE_PROTECTED: u8 = 0x27;
    pub const MEDIUM_NOT_PRESENT: u8 = 0x3A;
}

pub const INQUIRY_LEN: usize = 36;
pub const SENSE_LEN: usize = 18;
pub const READ_CAPACITY_LEN: usize = 8;
pub const FORMAT_CAPACITIES_LEN: usize = 12;
pub const MODE_SENSE_6_LEN: usize = 4;

/// A decoded command descriptor block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScsiCommand {
    TestUnitReady,
    RequestSense { allocation_length: u8 },
    Inquiry { evpd: bool, page: u8, allocation_length: u16 },
    ModeSense6 { page: u8, allocation_length: u8 },
    StartStopUnit { start: bool, load_eject: bool },
    PreventAllowMediumRemoval { prevent: bool },
    ReadFormatCapacities { allocation_length: u16 },
    ReadCapacity10,
    Read10 { lba: u32, blocks: u16 },
    Write10 { lba: u32, blocks: u16 },
    /// Anything not decoded above
    Other(u8),
}

impl ScsiCommand {
    /// Decode a CDB
    pub fn parse(cdb: &[u8]) -> Result<Self, ProtocolError> {
        let Some(&op) = cdb.first() else {
            return Err(ProtocolError::InvalidCommandLength);
        };
        let need = |len: usize| {
            if cdb.len() < len {
                Err(ProtocolError::InvalidCommandLength)
            } else {
                Ok(())
            }
        };
        let be16 = |at: usize| u16::from_be_bytes([cdb[at], cdb[at + 1]]);
        let be32 = |at: usize| u32::from_be_bytes([cdb[at], cdb[at + 1], cdb[at + 2], cdb[at + 3]]);

        Ok(match op {
            opcode::TEST_UNIT_READY => ScsiCommand::TestUnitReady,
            opcode::REQUEST_SENSE => {
                need(6)?;
                ScsiCommand::RequestSense {
                    allocation_length: cdb[4],
                }
            }
            opcode::INQUIRY => {
                need(6)?;
                ScsiCommand::Inquiry {
                    evpd: cdb[1] & 0x01 != 0,
                    page: cdb[2],
                    allocation_length: be16(3),
                }
            }
            opcode::MODE_SENSE_6 => {
                need(6)?;
                ScsiCommand::ModeSense6 {
                    page: cdb[2] & 0x3F,
                    allocation_length: cdb[4],
                }
            }
            opcode::START_STOP_UNIT => {
                need(6)?;
                ScsiCommand::StartStopUnit {
                    start: cdb[4] & 0x01 != 0,
                    load_eject: cdb[4] & 0x02 != 0,
                }
            }
            opcode::PREVENT_ALLOW_MEDIUM_REMOVAL => {
                need(6)?;
                ScsiCommand::PreventAllowMediumRemoval {
                    prevent: cdb[4] & 0x03 != 0,
                }
            }
            opcode::READ_FORMAT_CAPACITIES => {
                need(10)?;
                ScsiCommand::ReadFormatCapacities {
                    allocation_length: be16(7),
                }
            }
            opcode::READ_CAPACITY_10 => ScsiCommand::ReadCapacity10,
            opcode::READ_10 => {
                need(10)?;
                ScsiCommand::Read10 {
                    lba: be32(2),
                    blocks: be16(7),
                }
            }
            opcode::WRITE_10 => {
                need(10)?;
                ScsiCommand::Write10 {
                    lba: be32(2),
                    blocks: be16(7),
                }
            }
            other => ScsiCommand::Other(other),
        })
    }
}

/// Standard INQUIRY data for a removable direct-access device
pub fn inquiry_response(vendor: &[u8; 8], product: &[u8; 16], revision: &[u8; 4]) -> [u8; INQUIRY_LEN] {
    let mut out = [0u8; INQUIRY_LEN];
    out[0] = 0x00; // direct access block device
    out[1] = 0x80; // removable
    out[2] = 0x02; // SPC-2 version
    out[3] = 0x02; // response data format
    out[4] = (INQUIRY_LEN - 5) as u8;
    out[8..16].copy_from_slice(vendor);
    out[16..32].copy_from_slice(product);
    out[32..36].copy_from_slice(revision);
    out
}

/// READ CAPACITY (10) data: last addressable block and block length
pub fn read_capacity_response(block_count: u32, block_size: u32) -> [u8; READ_CAPACITY_LEN] {
    let mut out = [0u8; READ_CAPACITY_LEN];
    out[0..4].copy_from_slice(&block_count.saturating_sub(1).to_be_bytes());
    out[4..8].copy_from_slice(&block_size.to_be_bytes());
    out
}

/// READ FORMAT CAPACITIES data with one formatted-media descriptor
pub fn format_capacities_response(block_count: u32, block_size: u32) -> [u8; FORMAT_CAPACITIES_LEN] {
    let mut out = [0u8; FORMAT_CAPACITIES_LEN];
    out[3] = 8; // capacity list length
    out[4..8].copy_from_slice(&block_count.to_be_bytes());
    out[8] = 0x02; // formatted media
    out[9..12].copy_from_slice(&block_size.to_be_bytes()[1..]);
    out
}

/// MODE SENSE (6) header without block descriptors
pub fn mode_sense_response(write_protected: bool) -> [u8; MODE_SENSE_6_LEN] {
    let wp = if write_protected { 0x80 } else { 0x00 };
    [(MODE_SENSE_6_LEN - 1) as u8, 0x00, wp, 0x00]
}

/// Fixed-format sense data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenseData {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseData {
    pub const fn new(key: u8, asc: u8) -> Self {
        Self { key, asc, ascq: 0 }
    }

    pub fn encode(&self) -> [u8; SENSE_LEN] {
        let mut out = [0u8; SENSE_LEN];
        out[0] = 0x70; // current error, fixed format
        out[2] = self.key & 0x0F;
        out[7] = (SENSE_LEN - 8) as u8;
        out[12] = self.asc;
        out[13] = self.ascq;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read10() {
        let cdb = [0x28, 0, 0x00, 0x00, 0x01, 0x02, 0, 0x00, 0x04, 0];
        assert_eq!(
            ScsiCommand::parse(&cdb),
            Ok(ScsiCommand::Read10 {
                lba: 0x0102,
                blocks: 4
            })
        );
    }

    #[test]
    fn test_parse_write10() {
        let cdb = [0x2A, 0, 0, 0, 0, 7, 0, 0, 1, 0];
        assert_eq!(
            ScsiCommand::parse(&cdb),
            Ok(ScsiCommand::Write10 { lba: 7, blocks: 1 })
        );
    }

    #[test]
    fn test_parse_inquiry_and_sense() {
        assert_eq!(
            ScsiCommand::parse(&[0x12, 0, 0, 0, 36, 0]),
            Ok(ScsiCommand::Inquiry {
                evpd: false,
                page: 0,
                allocation_length: 36
            })
        );
        assert_eq!(
            ScsiCommand::parse(&[0x03, 0, 0, 0, 18, 0]),
            Ok(ScsiCommand::RequestSense {
                allocation_length: 18
            })
        );
    }

    #[test]
    fn test_parse_start_stop_bits() {
        assert_eq!(
            ScsiCommand::parse(&[0x1B, 0, 0, 0, 0x02, 0]),
            Ok(ScsiCommand::StartStopUnit {
                start: false,
                load_eject: true
            })
        );
    }

    #[test]
    fn test_unknown_opcode_is_other() {
        assert_eq!(ScsiCommand::parse(&[0x5A, 0, 0, 0, 0, 0]), Ok(ScsiCommand::Other(0x5A)));
        assert_eq!(ScsiCommand::parse(&[0x1E, 0, 0, 0, 1, 0]), Ok(ScsiCommand::PreventAllowMediumRemoval { prevent: true }));
    }

    #[test]
    fn test_short_cdb_rejected() {
        assert_eq!(ScsiCommand::parse(&[]), Err(ProtocolError::InvalidCommandLength));
        assert_eq!(
            ScsiCommand::parse(&[0x28, 0, 0, 0, 0, 0]),
            Err(ProtocolError::InvalidCommandLength)
        );
    }

    #[test]
    fn test_inquiry_layout() {
        let data = inquiry_response(b"DIY     ", b"RS232 Storage   ", b"1.0 ");
        assert_eq!(data[1], 0x80);
        assert_eq!(data[4], 31);
        assert_eq!(&data[8..16], b"DIY     ");
        assert_eq!(&data[16..32], b"RS232 Storage   ");
        assert_eq!(&data[32..36], b"1.0 ");
    }

    #[test]
    fn test_capacity_reports_last_lba() {
        let data = read_capacity_response(1024, 512);
        assert_eq!(&data[0..4], &[0, 0, 0x03, 0xFF]);
        assert_eq!(&data[4..8], &[0, 0, 0x02, 0x00]);

        assert_eq!(&read_capacity_response(0, 512)[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_format_capacities_layout() {
        let data = format_capacities_response(1024, 512);
        assert_eq!(data[3], 8);
        assert_eq!(&data[4..8], &[0, 0, 0x04, 0x00]);
        assert_eq!(data[8], 0x02);
        assert_eq!(&data[9..12], &[0x00, 0x02, 0x00]);
    }

    #[test]
    fn test_mode_sense_write_protect_bit() {
        assert_eq!(mode_sense_response(true), [3, 0, 0x80, 0]);
        assert_eq!(mode_sense_response(false), [3, 0, 0x00, 0]);
    }

    #[test]
    fn test_sense_encoding() {
        let sense = SenseData::new(sense_key::DATA_PROTECT, asc::WRITE_PROTECTED);
        let data = sense.encode();
        assert_eq!(data[0], 0x70);
        assert_eq!(data[2], 0x07);
        assert_eq!(data[7], 10);
        assert_eq!(data[12], 0x27);
        assert_eq!(data[13], 0);
    }
}
