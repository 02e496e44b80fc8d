//! SETUP packets
//!
//! The eight bytes that open every control transfer. The field layout is
//! fixed by USB 2.0, table 9-2, and is little endian on the wire.

use usb_device::{
    control::{Recipient, Request, RequestType},
    endpoint::EndpointAddress,
    UsbDirection,
};

/// `bmRequestType` direction bit
const DIRECTION_MASK: u8 = 0x80;
/// `bmRequestType` type field
const TYPE_MASK: u8 = 0x60;
const TYPE_SHIFT: u8 = 5;
/// `bmRequestType` recipient field
const RECIPIENT_MASK: u8 = 0x1F;

/// Standard request codes, re-exported from `usb-device`.
pub mod request {
    use super::Request;

    pub const GET_STATUS: u8 = Request::GET_STATUS;
    pub const CLEAR_FEATURE: u8 = Request::CLEAR_FEATURE;
    pub const SET_FEATURE: u8 = Request::SET_FEATURE;
    pub const SET_ADDRESS: u8 = Request::SET_ADDRESS;
    pub const GET_DESCRIPTOR: u8 = Request::GET_DESCRIPTOR;
    pub const SET_DESCRIPTOR: u8 = Request::SET_DESCRIPTOR;
    pub const GET_CONFIGURATION: u8 = Request::GET_CONFIGURATION;
    pub const SET_CONFIGURATION: u8 = Request::SET_CONFIGURATION;
    pub const GET_INTERFACE: u8 = Request::GET_INTERFACE;
    pub const SET_INTERFACE: u8 = Request::SET_INTERFACE;
    pub const SYNCH_FRAME: u8 = Request::SYNCH_FRAME;
}

/// Standard feature selectors.
pub mod feature {
    use super::Request;

    pub const ENDPOINT_HALT: u16 = Request::FEATURE_ENDPOINT_HALT;
    pub const DEVICE_REMOTE_WAKEUP: u16 = Request::FEATURE_DEVICE_REMOTE_WAKEUP;
    pub const TEST_MODE: u16 = 2;
}

/// A parsed SETUP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupPacket {
    /// `bmRequestType`
    pub request_type: u8,
    /// `bRequest`
    pub request: u8,
    /// `wValue`
    pub value: u16,
    /// `wIndex`
    pub index: u16,
    /// `wLength`
    pub length: u16,
}

impl SetupPacket {
    /// Size of a SETUP packet on the wire.
    pub const SIZE: usize = 8;

    /// Parse the raw packet captured by the hardware driver.
    pub const fn from_bytes(raw: [u8; Self::SIZE]) -> Self {
        SetupPacket {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    /// Produce the wire representation.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    /// Build a packet from its parts.
    pub fn new(
        direction: UsbDirection,
        kind: RequestType,
        recipient: Recipient,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Self {
        SetupPacket {
            request_type: (direction as u8 & DIRECTION_MASK)
                | ((kind as u8) << TYPE_SHIFT)
                | (recipient as u8 & RECIPIENT_MASK),
            request,
            value,
            index,
            length,
        }
    }

    /// Direction of the data stage.
    pub fn direction(&self) -> UsbDirection {
        if self.request_type & DIRECTION_MASK != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    /// Standard, class or vendor.
    pub fn kind(&self) -> RequestType {
        match (self.request_type & TYPE_MASK) >> TYPE_SHIFT {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    /// Who the request is addressed to.
    pub fn recipient(&self) -> Recipient {
        match self.request_type & RECIPIENT_MASK {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }

    /// Indicates a host-to-device request that carries a data stage.
    pub fn has_data_out(&self) -> bool {
        self.direction() == UsbDirection::Out && self.length > 0
    }

    /// Descriptor type of a GET_DESCRIPTOR / SET_DESCRIPTOR request.
    pub fn descriptor_type(&self) -> u8 {
        (self.value >> 8) as u8
    }

    /// Descriptor index of a GET_DESCRIPTOR / SET_DESCRIPTOR request.
    pub fn descriptor_index(&self) -> u8 {
        self.value as u8
    }

    /// Interface number, for interface recipients.
    pub fn interface(&self) -> u8 {
        self.index as u8
    }

    /// Endpoint address, for endpoint recipients.
    pub fn endpoint(&self) -> EndpointAddress {
        EndpointAddress::from(self.index as u8)
    }
}
