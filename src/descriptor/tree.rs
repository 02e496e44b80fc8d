//! A read-only view of a configuration descriptor tree
//!
//! Class drivers use this to find the interfaces and endpoints they care
//! about when the device is configured.

use super::descriptor_type;
use crate::error::{Error, Result};
use usb_device::endpoint::EndpointAddress;

/// `bmAttributes` bit for self-powered configurations
const ATTRIBUTES_SELF_POWERED: u8 = 1 << 6;
/// `bmAttributes` bit for remote wakeup support
const ATTRIBUTES_REMOTE_WAKEUP: u8 = 1 << 5;

/// A validated configuration descriptor, followed by its interface,
/// endpoint and class-specific descriptors.
#[derive(Debug, Clone, Copy)]
pub struct Configuration<'a> {
    bytes: &'a [u8],
}

impl<'a> Configuration<'a> {
    /// Validate the configuration header, and bound the view by `wTotalLength`.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 9 || (bytes[0] as usize) < 9 {
            return Err(Error::InvalidParams);
        }
        if bytes[1] != descriptor_type::CONFIGURATION
            && bytes[1] != descriptor_type::OTHER_SPEED_CONFIGURATION
        {
            return Err(Error::InvalidParams);
        }
        let total = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        if total < bytes[0] as usize || total > bytes.len() {
            return Err(Error::InvalidParams);
        }
        Ok(Configuration {
            bytes: &bytes[..total],
        })
    }

    /// `bConfigurationValue`
    pub fn value(&self) -> u8 {
        self.bytes[5]
    }

    /// `bNumInterfaces`
    pub fn num_interfaces(&self) -> u8 {
        self.bytes[4]
    }

    /// `bmAttributes`
    pub fn attributes(&self) -> u8 {
        self.bytes[7]
    }

    /// Indicates that the configuration is self-powered.
    pub fn self_powered(&self) -> bool {
        self.attributes() & ATTRIBUTES_SELF_POWERED != 0
    }

    /// Indicates that the configuration supports remote wakeup.
    pub fn remote_wakeup(&self) -> bool {
        self.attributes() & ATTRIBUTES_REMOTE_WAKEUP != 0
    }

    /// The whole tree, `wTotalLength` bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Every descriptor after the configuration header, in order.
    pub fn descriptors(&self) -> Descriptors<'a> {
        Descriptors {
            rest: &self.bytes[self.bytes[0] as usize..],
        }
    }

    /// Every interface descriptor, including alternate settings.
    pub fn interfaces(&self) -> impl Iterator<Item = InterfaceDescriptor> + 'a {
        self.descriptors()
            .filter(|raw| raw[1] == descriptor_type::INTERFACE)
            .filter_map(InterfaceDescriptor::parse)
    }

    /// Find an interface descriptor by number and alternate setting.
    pub fn interface(&self, number: u8, alternate_setting: u8) -> Option<InterfaceDescriptor> {
        self.interfaces()
            .find(|iface| iface.number == number && iface.alternate_setting == alternate_setting)
    }

    /// The endpoints that belong to an interface's alternate setting.
    pub fn endpoints(
        &self,
        number: u8,
        alternate_setting: u8,
    ) -> impl Iterator<Item = EndpointDescriptor> + 'a {
        let mut inside = false;
        self.descriptors().filter_map(move |raw| {
            if raw[1] == descriptor_type::INTERFACE {
                inside = InterfaceDescriptor::parse(raw)
                    .map(|iface| {
                        iface.number == number && iface.alternate_setting == alternate_setting
                    })
                    .unwrap_or(false);
                None
            } else if inside && raw[1] == descriptor_type::ENDPOINT {
                EndpointDescriptor::parse(raw)
            } else {
                None
            }
        })
    }
}

/// Iterator over the raw descriptors of a configuration tree.
///
/// Each item starts with `bLength` and `bDescriptorType`. Iteration stops
/// at the first malformed length.
#[derive(Debug, Clone)]
pub struct Descriptors<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let length = *self.rest.first()? as usize;
        if length < 2 || length > self.rest.len() {
            self.rest = &[];
            return None;
        }
        let (raw, rest) = self.rest.split_at(length);
        self.rest = rest;
        Some(raw)
    }
}

/// USB 2.0 table 9-12
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub string_index: u8,
}

impl InterfaceDescriptor {
    fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 9 {
            return None;
        }
        Some(InterfaceDescriptor {
            number: raw[2],
            alternate_setting: raw[3],
            num_endpoints: raw[4],
            class: raw[5],
            sub_class: raw[6],
            protocol: raw[7],
            string_index: raw[8],
        })
    }
}

/// USB 2.0 table 9-13
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: EndpointAddress,
    /// `bmAttributes`; the low two bits are the transfer type.
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }
        Some(EndpointDescriptor {
            address: EndpointAddress::from(raw[2]),
            attributes: raw[3],
            max_packet_size: u16::from_le_bytes([raw[4], raw[5]]) & 0x07FF,
            interval: raw[6],
        })
    }

    /// Transfer type, bits 1..0 of `bmAttributes`: 0 control, 1 isochronous,
    /// 2 bulk, 3 interrupt.
    pub fn transfer_type(&self) -> u8 {
        self.attributes & 0b11
    }
}

#[cfg(test)]
mod tests {
    use super::Configuration;
    use crate::error::Error;
    use usb_device::UsbDirection;

    /// One CDC-like configuration: interface 0 with an interrupt endpoint,
    /// interface 1 with two bulk endpoints and an alternate setting.
    #[rustfmt::skip]
    const TREE: [u8; 62] = [
        9, 2, 62, 0, 2, 1, 0, 0xC0, 50,
        9, 4, 0, 0, 1, 0x02, 0x02, 0x01, 0,
        5, 0x24, 0x00, 0x10, 0x01,
        7, 5, 0x83, 0x03, 8, 0, 16,
        9, 4, 1, 0, 2, 0x0A, 0x00, 0x00, 0,
        7, 5, 0x02, 0x02, 64, 0, 0,
        7, 5, 0x81, 0x02, 64, 0, 0,
        9, 4, 1, 1, 0, 0x0A, 0x00, 0x00, 0,
    ];

    #[test]
    fn header() {
        let config = Configuration::parse(&TREE).unwrap();
        assert_eq!(config.value(), 1);
        assert_eq!(config.num_interfaces(), 2);
        assert!(config.self_powered());
        assert!(!config.remote_wakeup());
        assert_eq!(config.as_bytes().len(), 62);
    }

    #[test]
    fn interfaces() {
        let config = Configuration::parse(&TREE).unwrap();
        let numbers: Vec<(u8, u8)> = config
            .interfaces()
            .map(|iface| (iface.number, iface.alternate_setting))
            .collect();
        assert_eq!(numbers, [(0, 0), (1, 0), (1, 1)]);
        assert_eq!(config.interface(0, 0).unwrap().class, 0x02);
        assert!(config.interface(1, 1).is_some());
        assert!(config.interface(1, 2).is_none());
    }

    #[test]
    fn endpoints() {
        let config = Configuration::parse(&TREE).unwrap();

        let eps: Vec<_> = config.endpoints(0, 0).collect();
        assert_eq!(eps.len(), 1);
        assert_eq!(u8::from(eps[0].address), 0x83);
        assert_eq!(eps[0].transfer_type(), 3);
        assert_eq!(eps[0].interval, 16);

        let eps: Vec<_> = config.endpoints(1, 0).collect();
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].address.direction(), UsbDirection::Out);
        assert_eq!(eps[1].address.direction(), UsbDirection::In);
        assert_eq!(eps[1].max_packet_size, 64);

        assert_eq!(config.endpoints(1, 1).count(), 0);
    }

    #[test]
    fn total_length_bounds_the_view() {
        let mut bytes = TREE.to_vec();
        bytes.extend_from_slice(&[0xFF; 4]);
        let config = Configuration::parse(&bytes).unwrap();
        assert_eq!(config.as_bytes().len(), 62);
    }

    #[test]
    fn malformed() {
        assert_eq!(
            Configuration::parse(&TREE[..8]).unwrap_err(),
            Error::InvalidParams
        );
        // wTotalLength claims more than we have
        assert_eq!(
            Configuration::parse(&TREE[..30]).unwrap_err(),
            Error::InvalidParams
        );
        // Not a configuration descriptor
        let mut bytes = TREE;
        bytes[1] = 1;
        assert_eq!(
            Configuration::parse(&bytes).unwrap_err(),
            Error::InvalidParams
        );
    }

    #[test]
    fn truncated_tree_stops_iteration() {
        let mut bytes = TREE;
        // Corrupt the second interface's bLength
        bytes[30] = 0;
        let config = Configuration::parse(&bytes).unwrap();
        assert_eq!(config.interfaces().count(), 1);
    }
}
