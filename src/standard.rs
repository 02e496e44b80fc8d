//! USB chapter 9 standard requests
//!
//! Each handler returns the response length for device-to-host requests,
//! `0` for host-to-device requests, or an error that stalls the request.
//! Standard requests to an interface that aren't handled here, like a HID
//! report descriptor request, go to the interface's class driver.

use crate::{
    class::{ClassContext, ClassId},
    descriptor::{write_descriptor, Configuration},
    device::{DeviceFeatures, DeviceState, Usbd},
    error::{Error, Result},
    hardware::UsbHardware,
    notify::Notification,
    setup::{feature, request, SetupPacket},
    table::Binding,
};
use usb_device::{control::Recipient, UsbDirection};

/// Largest assignable device address
const MAX_ADDRESS: u16 = 127;

/// Copy `reply` into `data`, returning the full reply length.
///
/// The engine constrains the response by `wLength`.
fn reply(data: &mut [u8], reply: &[u8]) -> usize {
    let size = reply.len().min(data.len());
    data[..size].copy_from_slice(&reply[..size]);
    reply.len()
}

impl<H: UsbHardware> Usbd<H> {
    pub(crate) fn standard_request(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Result<usize> {
        match setup.recipient() {
            Recipient::Device => self.device_request(setup, data),
            Recipient::Interface => self.interface_request(setup, data),
            Recipient::Endpoint => self.endpoint_request(setup, data),
            _ => Err(Error::NotSupported),
        }
    }

    fn device_request(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Result<usize> {
        match (setup.direction(), setup.request) {
            (UsbDirection::In, request::GET_STATUS) => {
                Ok(reply(data, &self.features.bits().to_le_bytes()))
            }
            (UsbDirection::Out, request::CLEAR_FEATURE) => match setup.value {
                feature::DEVICE_REMOTE_WAKEUP => {
                    self.features.remove(DeviceFeatures::REMOTE_WAKEUP);
                    Ok(0)
                }
                _ => Err(Error::NotSupported),
            },
            (UsbDirection::Out, request::SET_FEATURE) => match setup.value {
                feature::DEVICE_REMOTE_WAKEUP => {
                    self.features.insert(DeviceFeatures::REMOTE_WAKEUP);
                    Ok(0)
                }
                feature::TEST_MODE if setup.index & 0xFF == 0 => {
                    // Takes effect after the status stage.
                    self.test_mode = (setup.index >> 8) as u8;
                    Ok(0)
                }
                _ => Err(Error::NotSupported),
            },
            (UsbDirection::Out, request::SET_ADDRESS) => self.set_address(setup.value),
            (UsbDirection::In, request::GET_DESCRIPTOR) => self.get_descriptor(setup, data),
            (UsbDirection::In, request::GET_CONFIGURATION) => {
                Ok(reply(data, &[self.configuration]))
            }
            (UsbDirection::Out, request::SET_CONFIGURATION) => {
                self.set_configuration(setup.value as u8)
            }
            _ => Err(Error::NotSupported),
        }
    }

    fn set_address(&mut self, address: u16) -> Result<usize> {
        if address > MAX_ADDRESS || self.state == DeviceState::Configured {
            return Err(Error::InvalidParams);
        }
        let address = address as u8;
        self.hw.set_address(address);
        self.state = if address != 0 {
            DeviceState::Addressed
        } else {
            DeviceState::Default
        };
        debug!("ADDRESS {} {:?}", address, self.state);
        Ok(0)
    }

    fn get_descriptor(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Result<usize> {
        let kind = setup.descriptor_type();
        let bytes = self.descriptors.select(
            kind,
            setup.descriptor_index(),
            setup.index,
            self.speed,
            self.config.natural_speed,
        )?;
        write_descriptor(kind, bytes, data)
    }

    fn set_configuration(&mut self, value: u8) -> Result<usize> {
        if self.state == DeviceState::Default {
            return Err(Error::InvalidParams);
        }
        if self.state == DeviceState::Configured {
            self.teardown();
            self.state = DeviceState::Addressed;
            self.configuration = 0;
        }
        if value == 0 {
            debug!("UNCONFIGURED");
            return Ok(0);
        }
        if let Err(err) = self.configure(value) {
            warn!("CONFIGURATION {} FAILED: {}", value, err);
            self.teardown();
            return Err(err);
        }
        self.state = DeviceState::Configured;
        self.configuration = value;
        self.outbox.push_back(Notification::Configured(value));
        debug!("CONFIGURED {}", value);
        Ok(0)
    }

    /// Rebuild the routing tables for configuration `value`, in class
    /// registration order.
    fn configure(&mut self, value: u8) -> Result<()> {
        let Usbd {
            hw,
            config,
            speed,
            features,
            descriptors,
            classes,
            table,
            outbox,
            ..
        } = self;
        let bytes = descriptors
            .active_configuration(value, *speed, config.natural_speed)
            .ok_or(Error::NotFound)?;
        let configuration = Configuration::parse(bytes)?;

        table.clear();
        features.set(DeviceFeatures::SELF_POWERED, configuration.self_powered());
        for (index, class) in classes.iter_mut().enumerate() {
            let mut ctx = ClassContext::new(ClassId::new(index), &mut *hw, table, outbox);
            class.configured(&mut ctx, &configuration)?;
        }
        Ok(())
    }

    fn interface_request(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Result<usize> {
        if self.state != DeviceState::Configured {
            return Err(Error::NotConfigured);
        }
        let iface = setup.interface();
        match (setup.direction(), setup.request) {
            (UsbDirection::In, request::GET_STATUS) => Ok(reply(data, &[0, 0])),
            (UsbDirection::In, request::GET_INTERFACE) => {
                self.claimed(iface)?;
                let alternate_setting = self.table.alternate_setting(iface).unwrap_or(0);
                Ok(reply(data, &[alternate_setting]))
            }
            (UsbDirection::Out, request::SET_INTERFACE) => {
                self.set_interface(setup, iface, setup.value as u8, data)
            }
            _ => self.class_setup(iface, setup, data),
        }
    }

    fn set_interface(
        &mut self,
        setup: &SetupPacket,
        iface: u8,
        alternate_setting: u8,
        data: &mut [u8],
    ) -> Result<usize> {
        self.claimed(iface)?;
        let exists = self
            .descriptors
            .active_configuration(self.configuration, self.speed, self.config.natural_speed)
            .and_then(|bytes| Configuration::parse(bytes).ok())
            .map(|config| config.interface(iface, alternate_setting).is_some())
            .unwrap_or(false);
        if !exists {
            return Err(Error::NotFound);
        }
        // Every class supports the default setting, even if it doesn't
        // handle the request.
        match self.class_setup(iface, setup, data) {
            Err(err) if alternate_setting != 0 => return Err(err),
            _ => {}
        }
        self.table.set_alternate_setting(iface, alternate_setting)?;
        debug!("IFACE{} ALTERNATE {}", iface, alternate_setting);
        Ok(0)
    }

    fn claimed(&self, iface: u8) -> Result<()> {
        match self.table.interface(iface) {
            Binding::Stub => Err(Error::NotFound),
            Binding::Class(_) => Ok(()),
        }
    }

    fn endpoint_request(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Result<usize> {
        let ep = setup.endpoint();
        if ep.index() != 0 {
            if self.state != DeviceState::Configured {
                return Err(Error::NotConfigured);
            }
            if self.table.endpoint(ep).is_none() {
                return Err(Error::NotFound);
            }
        }
        match (setup.direction(), setup.request) {
            (UsbDirection::In, request::GET_STATUS) => {
                let halted = self.hw.ep_is_stall(ep) as u8;
                Ok(reply(data, &[halted, 0]))
            }
            (UsbDirection::Out, request::CLEAR_FEATURE) if setup.value == feature::ENDPOINT_HALT => {
                self.hw.ep_clear_stall(ep);
                Ok(0)
            }
            (UsbDirection::Out, request::SET_FEATURE) if setup.value == feature::ENDPOINT_HALT => {
                self.hw.ep_set_stall(ep);
                Ok(0)
            }
            (UsbDirection::In, request::SYNCH_FRAME) => {
                let iface = self.table.endpoint(ep).ok_or(Error::NotFound)?;
                self.class_setup(iface, setup, data)
            }
            _ => Err(Error::NotSupported),
        }
    }
}
