//! Descriptor registry and GET_DESCRIPTOR selection
//!
//! Applications register their descriptor set before the host enumerates
//! the device:
//!
//! - one `DEVICE` descriptor, and `CONFIGURATION` descriptors by index,
//!   describing the device at its natural speed;
//! - optionally, a `DEVICE_QUALIFIER` slot and `OTHER_SPEED_CONFIGURATION`
//!   slots holding the device and configuration descriptors for the other
//!   speed class;
//! - `STRING` descriptors by index and language, plus any other descriptor
//!   type the host may ask for directly (BOS, for instance).
//!
//! # Speed selection
//!
//! When the negotiated speed is in the same class as the natural speed
//! (both below high speed, or both at or above it), `DEVICE` and
//! `CONFIGURATION` requests resolve to their own slots, and the qualifier
//! and other-speed requests resolve only to the secondary slots. A device
//! that registered no secondary slots rejects them, as USB requires of a
//! full-speed only device.
//!
//! Otherwise, the roles swap. The qualifier and other-speed requests then
//! resolve to the primary descriptors, with the type byte patched and the
//! qualifier synthesized from the device descriptor. `DEVICE` and
//! `CONFIGURATION` requests fall back to the primary descriptors when the
//! secondary slots are missing.

mod registry;
mod tree;

pub use registry::{DescriptorData, DescriptorRegistry};
pub use tree::{Configuration, Descriptors, EndpointDescriptor, InterfaceDescriptor};

use crate::{
    error::{Error, Result},
    hardware::Speed,
};

/// Descriptor type codes.
pub mod descriptor_type {
    pub use usb_device::descriptor::descriptor_type::{
        CONFIGURATION, DEVICE, ENDPOINT, INTERFACE, STRING,
    };
    pub const DEVICE_QUALIFIER: u8 = 6;
    pub const OTHER_SPEED_CONFIGURATION: u8 = 7;
}

use descriptor_type::{
    CONFIGURATION, DEVICE, DEVICE_QUALIFIER, OTHER_SPEED_CONFIGURATION,
};

/// Length of a device descriptor
const DEVICE_LEN: usize = 18;
/// Length of a device qualifier descriptor
const QUALIFIER_LEN: usize = 10;

/// Registry slots, arranged by the speed the host negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slots {
    device: u8,
    configuration: u8,
    other_device: u8,
    other_configuration: u8,
}

impl Slots {
    fn new(negotiated: Speed, natural: Speed) -> Self {
        if negotiated.is_high_or_above() == natural.is_high_or_above() {
            Slots {
                device: DEVICE,
                configuration: CONFIGURATION,
                other_device: DEVICE_QUALIFIER,
                other_configuration: OTHER_SPEED_CONFIGURATION,
            }
        } else {
            Slots {
                device: DEVICE_QUALIFIER,
                configuration: OTHER_SPEED_CONFIGURATION,
                other_device: DEVICE,
                other_configuration: CONFIGURATION,
            }
        }
    }
}

impl DescriptorRegistry {
    /// Resolve a GET_DESCRIPTOR request to registered bytes, applying the
    /// speed selection rules.
    pub fn select(
        &self,
        kind: u8,
        index: u8,
        language: u16,
        negotiated: Speed,
        natural: Speed,
    ) -> Result<&[u8]> {
        let slots = Slots::new(negotiated, natural);
        match kind {
            DEVICE => self
                .lookup(slots.device, 0, 0)
                .or_else(|_| self.lookup(DEVICE, 0, 0)),
            CONFIGURATION => self
                .lookup(slots.configuration, index, 0)
                .or_else(|_| self.lookup(CONFIGURATION, index, 0)),
            DEVICE_QUALIFIER => self.lookup(slots.other_device, 0, 0),
            OTHER_SPEED_CONFIGURATION => self.lookup(slots.other_configuration, index, 0),
            _ => self.lookup(kind, index, language),
        }
    }

    /// Find the configuration descriptor that describes `value` at the
    /// negotiated speed.
    pub fn active_configuration(
        &self,
        value: u8,
        negotiated: Speed,
        natural: Speed,
    ) -> Option<&[u8]> {
        let slots = Slots::new(negotiated, natural);
        self.find_configuration(slots.configuration, value)
            .or_else(|| self.find_configuration(CONFIGURATION, value))
    }
}

/// Copy a resolved descriptor into `out`, as the host expects to see it
/// for a request of type `kind`.
///
/// Returns the length of the descriptor, taken from its own length field.
/// Only as much as fits in `out` is written; the caller decides what to do
/// with a descriptor that doesn't fit.
pub(crate) fn write_descriptor(kind: u8, bytes: &[u8], out: &mut [u8]) -> Result<usize> {
    if bytes.len() < 2 {
        return Err(Error::InvalidParams);
    }
    match kind {
        DEVICE_QUALIFIER if bytes.len() >= DEVICE_LEN => {
            let qualifier = [
                QUALIFIER_LEN as u8,
                DEVICE_QUALIFIER,
                bytes[2],  // bcdUSB
                bytes[3],  //
                bytes[4],  // bDeviceClass
                bytes[5],  // bDeviceSubClass
                bytes[6],  // bDeviceProtocol
                bytes[7],  // bMaxPacketSize0
                bytes[17], // bNumConfigurations
                0,
            ];
            copy(&qualifier, out);
            Ok(QUALIFIER_LEN)
        }
        DEVICE | DEVICE_QUALIFIER => {
            let len = (bytes[0] as usize).min(bytes.len());
            let written = copy(&bytes[..len], out);
            patch_type(kind, out, written);
            Ok(len)
        }
        CONFIGURATION | OTHER_SPEED_CONFIGURATION => {
            if bytes.len() < 4 {
                return Err(Error::InvalidParams);
            }
            let total = (u16::from_le_bytes([bytes[2], bytes[3]]) as usize).min(bytes.len());
            let written = copy(&bytes[..total], out);
            patch_type(kind, out, written);
            Ok(total)
        }
        _ => {
            copy(bytes, out);
            Ok(bytes.len())
        }
    }
}

fn copy(src: &[u8], out: &mut [u8]) -> usize {
    let size = src.len().min(out.len());
    out[..size].copy_from_slice(&src[..size]);
    size
}

fn patch_type(kind: u8, out: &mut [u8], written: usize) {
    if written > 1 {
        out[1] = kind;
    }
}
