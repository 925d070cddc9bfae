//! Inter-task signals
//!
//! Uses embassy-sync primitives for communication between the USB control
//! handler and the Embassy tasks.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Host issued a Bulk-Only Mass Storage Reset; the MSC task drops the
/// command in progress and waits for a fresh CBW
pub static MSC_RESET: Signal<CriticalSectionRawMutex, ()> = Signal::new();
