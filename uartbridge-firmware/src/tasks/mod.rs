//! Embassy async tasks
//!
//! Each task runs independently; the sector store and the mass-storage
//! unit are shared through `&'static` references.

pub mod bridge;
pub mod msc;
pub mod storage;
pub mod usb;

use uartbridge_core::msc::MscDevice;
use uartbridge_core::storage::SharedDisk;
use uartbridge_hal_rp2040::Rp2040Flash;

pub use bridge::bridge_task;
pub use msc::msc_task;
pub use storage::storage_task;
pub use usb::usb_task;

/// The one sector store on this board
pub type Disk = SharedDisk<Rp2040Flash<'static>>;

/// Mass-storage unit over [`Disk`]
pub type Msc = MscDevice<'static, Rp2040Flash<'static>>;
