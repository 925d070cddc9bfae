//! Filesystem bring-up task
//!
//! Waits out the start delay, then mounts the volume on the sector store,
//! creating one on first boot, and advances the boot nonce kept on it.
//! The mass-storage unit only reports ready once a volume is in place.

use defmt::*;
use embassy_time::Timer;

use uartbridge_core::fs::{install, FatDisk, FileSystem, MountOutcome};
use uartbridge_core::nonce::{self, NonceError};

use super::{Disk, Msc};

/// Storage task - mounts or formats the volume, then enables mass storage
#[embassy_executor::task]
pub async fn storage_task(disk: &'static Disk, msc: &'static Msc, start_delay_ms: u32) {
    info!("Storage task started");

    Timer::after_millis(start_delay_ms as u64).await;

    let fat = FatDisk::new(disk);
    match install(&fat) {
        Ok(MountOutcome::Reused(info)) => {
            info!(
                "Mounted volume at sector {}: {} clusters of {} sectors",
                info.start_lba, info.cluster_count, info.sectors_per_cluster
            );
        }
        Ok(MountOutcome::Created(info)) => {
            info!(
                "No filesystem found, created volume at sector {}: {} clusters",
                info.start_lba, info.cluster_count
            );
        }
        Err(e) => {
            error!("{} error: {} ({})", e.op, e.status().name(), e.code);
            return;
        }
    }

    let advanced = FileSystem::mount(fat)
        .map_err(NonceError::Fs)
        .and_then(|fs| nonce::advance(&fs));
    match advanced {
        Ok(n) => info!("Nonce: {}", n),
        Err(NonceError::Fs(e)) => {
            error!("{} error: {} ({})", e.op, e.status().name(), e.code);
        }
        Err(NonceError::Corrupted) => error!("Corrupted nonce file contents"),
    }

    msc.set_ready(true);
    info!("Mass storage ready");
}
