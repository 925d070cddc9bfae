//! USB composite device
//!
//! ```text
//! IAD 0  CDC-ACM   data port, bridged to UART0
//! IAD 1  MSC/BOT   read-only view of the flash sector store
//! ```

mod msc_control;

use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::{Builder, UsbDevice};
use static_cell::StaticCell;

use uartbridge_core::config::BridgeConfig;
use uartbridge_protocol::bot::{CLASS_MSC, PROTOCOL_BOT, SUBCLASS_SCSI};

pub use msc_control::MscControl;

/// Full-speed bulk/interrupt packet size
pub const MAX_PACKET_SIZE: u16 = 64;

pub type UsbDriver = Driver<'static, USB>;
pub type BulkIn = <UsbDriver as embassy_usb::driver::Driver<'static>>::EndpointIn;
pub type BulkOut = <UsbDriver as embassy_usb::driver::Driver<'static>>::EndpointOut;

// Static cells for descriptor and control buffers (must live forever)
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 0]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();
static MSC_CONTROL: StaticCell<MscControl> = StaticCell::new();

/// Everything the tasks need from the USB stack
pub struct UsbParts {
    pub device: UsbDevice<'static, UsbDriver>,
    pub cdc: CdcAcmClass<'static, UsbDriver>,
    pub msc_in: BulkIn,
    pub msc_out: BulkOut,
}

/// Build the composite device from the configured identity
pub fn build(driver: UsbDriver, config: &BridgeConfig) -> UsbParts {
    let mut usb_config = embassy_usb::Config::new(config.usb.vendor_id, config.usb.product_id);
    usb_config.manufacturer = Some(config.usb.manufacturer);
    usb_config.product = Some(config.usb.product);
    usb_config.serial_number = Some(config.usb.serial_number);
    usb_config.device_release = config.usb.device_release;
    usb_config.max_power = config.usb.max_power_ma;
    usb_config.max_packet_size_0 = MAX_PACKET_SIZE as u8;

    // Composite device with interface association descriptors
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let mut builder = Builder::new(
        driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([0; 0]),
        CONTROL_BUF.init([0; 64]),
    );

    let cdc = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), MAX_PACKET_SIZE);

    let msc_name = builder.string();
    let mut function = builder.function(CLASS_MSC, SUBCLASS_SCSI, PROTOCOL_BOT);
    let mut interface = function.interface();
    let msc_interface = interface.interface_number();
    let mut alt = interface.alt_setting(CLASS_MSC, SUBCLASS_SCSI, PROTOCOL_BOT, Some(msc_name));
    let msc_out = alt.endpoint_bulk_out(None, MAX_PACKET_SIZE);
    let msc_in = alt.endpoint_bulk_in(None, MAX_PACKET_SIZE);
    drop(function);

    builder.handler(MSC_CONTROL.init(MscControl::new(
        msc_interface,
        msc_name,
        config.msc.product,
    )));

    UsbParts {
        device: builder.build(),
        cdc,
        msc_in,
        msc_out,
    }
}
