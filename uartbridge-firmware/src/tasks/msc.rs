//! Mass-storage Bulk-Only Transport task
//!
//! Receives a CBW, runs the SCSI command against the responder, moves the
//! data stage in full-speed packets and finishes with a CSW.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_usb::driver::{Endpoint, EndpointError, EndpointIn, EndpointOut};

use uartbridge_core::msc::MscError;
use uartbridge_protocol::bot::{
    CommandBlockWrapper, CommandStatus, CommandStatusWrapper, Direction,
};
use uartbridge_protocol::scsi::{ScsiCommand, SenseData};

use super::Msc;
use crate::channels::MSC_RESET;
use crate::usb::{BulkIn, BulkOut, MAX_PACKET_SIZE};

const PACKET: usize = MAX_PACKET_SIZE as usize;

/// Largest non-block response (INQUIRY, sense, capacities)
const RESPONSE_BUF_SIZE: usize = 64;

/// MSC task - serves SCSI commands from the host
#[embassy_executor::task]
pub async fn msc_task(
    msc: &'static Msc,
    mut ep_in: BulkIn,
    mut ep_out: BulkOut,
    block_buf: &'static mut [u8],
) {
    info!("MSC task started");

    let mut sense = SenseData::default();
    let mut packet = [0u8; PACKET];

    loop {
        ep_out.wait_enabled().await;
        MSC_RESET.reset();

        let n = match select(ep_out.read(&mut packet), MSC_RESET.wait()).await {
            Either::First(Ok(n)) => n,
            Either::First(Err(EndpointError::Disabled)) => continue,
            Either::First(Err(e)) => {
                warn!("MSC: CBW read error: {:?}", e);
                continue;
            }
            Either::Second(()) => continue,
        };

        let cbw = match CommandBlockWrapper::parse(&packet[..n]) {
            Ok(cbw) => cbw,
            Err(e) => {
                warn!("MSC: invalid CBW ({} bytes): {:?}", n, e);
                continue;
            }
        };

        let (status, moved) = match ScsiCommand::parse(&cbw.command) {
            Ok(command) => {
                debug!("MSC: {:?} tag={=u32}", command, cbw.tag);
                execute(msc, &command, &cbw, &mut sense, &mut ep_in, &mut ep_out, block_buf).await
            }
            Err(e) => {
                warn!("MSC: bad CDB: {:?}", e);
                sense = MscError::Unsupported(cbw.opcode()).sense();
                (CommandStatus::Failed, 0)
            }
        };

        // Host still expects its data stage; pad IN with zeros, drain OUT
        let moved = match (status, cbw.direction) {
            (CommandStatus::Passed, _) => moved,
            (_, Direction::In) => {
                let rest = cbw.data_transfer_length.saturating_sub(moved);
                pad_in(&mut ep_in, rest).await;
                moved
            }
            (_, Direction::Out) => {
                let rest = cbw.data_transfer_length.saturating_sub(moved);
                drain_out(&mut ep_out, rest).await;
                moved
            }
            (_, Direction::None) => moved,
        };

        let csw = CommandStatusWrapper::for_command(&cbw, moved, status);
        if let Err(e) = ep_in.write(&csw.encode()).await {
            warn!("MSC: CSW write error: {:?}", e);
        }
    }
}

/// Run one command; returns the CSW status and data bytes moved
async fn execute(
    msc: &'static Msc,
    command: &ScsiCommand,
    cbw: &CommandBlockWrapper,
    sense: &mut SenseData,
    ep_in: &mut BulkIn,
    ep_out: &mut BulkOut,
    block_buf: &mut [u8],
) -> (CommandStatus, u32) {
    let expected = cbw.data_transfer_length;

    let result = match *command {
        ScsiCommand::Read10 { lba, blocks } => {
            let total = blocks as u32 * msc.block_size();
            if total > expected || (total > 0 && cbw.direction != Direction::In) {
                return (CommandStatus::PhaseError, 0);
            }
            read_blocks(msc, ep_in, lba, total).await
        }
        ScsiCommand::Write10 { lba, blocks } => {
            let total = blocks as u32 * msc.block_size();
            if total > expected || (total > 0 && cbw.direction != Direction::Out) {
                return (CommandStatus::PhaseError, 0);
            }
            write_blocks(msc, ep_out, lba, total, block_buf).await
        }
        _ => {
            let mut buf = [0u8; RESPONSE_BUF_SIZE];
            match msc.respond(command, &cbw.command, *sense, &mut buf) {
                Ok(len) => {
                    let len = len.min(expected as usize);
                    write_in(ep_in, &buf[..len], expected).await.map(|()| len as u32)
                }
                Err(e) => Err((e, 0)),
            }
        }
    };

    match result {
        Ok(moved) => {
            *sense = SenseData::default();
            (CommandStatus::Passed, moved)
        }
        Err((e, moved)) => {
            if matches!(e, MscError::Unsupported(_)) {
                warn!("MSC: unsupported SCSI operation {=u8:#04x}", cbw.opcode());
            } else {
                debug!("MSC: command failed: {:?}", e);
            }
            *sense = e.sense();
            (CommandStatus::Failed, moved)
        }
    }
}

/// Stream `total` bytes from block `lba` to the host
async fn read_blocks(
    msc: &'static Msc,
    ep_in: &mut BulkIn,
    lba: u32,
    total: u32,
) -> Result<u32, (MscError, u32)> {
    let mut packet = [0u8; PACKET];
    let mut offset = 0u32;
    while offset < total {
        let n = (total - offset).min(PACKET as u32) as usize;
        msc.read10(lba, offset, &mut packet[..n])
            .map_err(|e| (e, offset))?;
        if ep_in.write(&packet[..n]).await.is_err() {
            return Err((MscError::NotReady, offset));
        }
        offset += n as u32;
    }
    Ok(total)
}

/// Receive `total` bytes from the host and store them from block `lba`
///
/// Data is gathered one advertised block at a time so each block costs a
/// single read-modify-write of its sector. The count reported on failure
/// is what was taken off the bus, so the caller drains only the rest.
async fn write_blocks(
    msc: &'static Msc,
    ep_out: &mut BulkOut,
    lba: u32,
    total: u32,
    block_buf: &mut [u8],
) -> Result<u32, (MscError, u32)> {
    if !msc.is_writable() {
        return Err((MscError::WriteProtected, 0));
    }
    let block_size = msc.block_size() as usize;
    let block = &mut block_buf[..block_size];
    let mut offset = 0u32;

    while offset < total {
        let mut filled = 0;
        while filled < block_size {
            match ep_out.read(&mut block[filled..]).await {
                Ok(n) => filled += n,
                Err(_) => return Err((MscError::NotReady, offset + filled as u32)),
            }
        }
        msc.write10(lba, offset, block)
            .map_err(|e| (e, offset + block_size as u32))?;
        offset += block_size as u32;
    }
    Ok(total)
}

/// Send a short response, ending the transfer early if it is short
async fn write_in(ep_in: &mut BulkIn, data: &[u8], expected: u32) -> Result<(), (MscError, u32)> {
    for chunk in data.chunks(PACKET) {
        ep_in
            .write(chunk)
            .await
            .map_err(|_| (MscError::NotReady, 0))?;
    }
    if (data.len() as u32) < expected && data.len() % PACKET == 0 {
        // Zero-length packet marks the end of a short transfer
        ep_in.write(&[]).await.map_err(|_| (MscError::NotReady, 0))?;
    }
    Ok(())
}

async fn pad_in(ep_in: &mut BulkIn, mut remaining: u32) {
    let zeros = [0u8; PACKET];
    while remaining > 0 {
        let n = remaining.min(PACKET as u32) as usize;
        if ep_in.write(&zeros[..n]).await.is_err() {
            return;
        }
        remaining -= n as u32;
    }
}

async fn drain_out(ep_out: &mut BulkOut, mut remaining: u32) {
    let mut sink = [0u8; PACKET];
    while remaining > 0 {
        match ep_out.read(&mut sink).await {
            Ok(n) => remaining = remaining.saturating_sub(n as u32),
            Err(_) => return,
        }
    }
}
