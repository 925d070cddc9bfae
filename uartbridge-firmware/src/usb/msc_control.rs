//! Class requests on the mass-storage interface

use defmt::*;
use embassy_usb::control::{InResponse, OutResponse, Recipient, Request, RequestType};
use embassy_usb::types::{InterfaceNumber, StringIndex};
use embassy_usb::Handler;

use uartbridge_protocol::bot::{BULK_ONLY_RESET, GET_MAX_LUN};

use crate::channels::MSC_RESET;

/// Answers GET MAX LUN and BULK ONLY RESET, and names the interface
pub struct MscControl {
    interface: InterfaceNumber,
    name_index: StringIndex,
    name: &'static str,
}

impl MscControl {
    pub fn new(interface: InterfaceNumber, name_index: StringIndex, name: &'static str) -> Self {
        Self {
            interface,
            name_index,
            name,
        }
    }

    fn is_ours(&self, req: &Request) -> bool {
        req.request_type == RequestType::Class
            && req.recipient == Recipient::Interface
            && req.index == self.interface.0 as u16
    }
}

impl Handler for MscControl {
    fn control_in<'a>(&'a mut self, req: Request, buf: &'a mut [u8]) -> Option<InResponse<'a>> {
        if !self.is_ours(&req) {
            return None;
        }
        match req.request {
            GET_MAX_LUN if !buf.is_empty() => {
                // Single logical unit
                buf[0] = 0;
                Some(InResponse::Accepted(&buf[..1]))
            }
            _ => Some(InResponse::Rejected),
        }
    }

    fn control_out(&mut self, req: Request, _data: &[u8]) -> Option<OutResponse> {
        if !self.is_ours(&req) {
            return None;
        }
        match req.request {
            BULK_ONLY_RESET => {
                debug!("MSC: bulk-only reset");
                MSC_RESET.signal(());
                Some(OutResponse::Accepted)
            }
            _ => Some(OutResponse::Rejected),
        }
    }

    fn get_string(&mut self, index: StringIndex, _lang_id: u16) -> Option<&str> {
        (index == self.name_index).then_some(self.name)
    }
}
