//! The hardware driver boundary
//!
//! The engine never touches controller registers. It asks a [`UsbHardware`]
//! implementation to open, close, stall and transfer on endpoints, and it
//! learns about completions through [`Event`](crate::Event)s that the
//! hardware driver posts later.

use crate::buffer::IoBuffer;
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// Direct index to the OUT control endpoint
pub(crate) fn ctrl_ep0_out() -> EndpointAddress {
    // Constructor not currently const. Otherwise, this would
    // be a const.
    EndpointAddress::from_parts(0, UsbDirection::Out)
}

/// Direct index to the IN control endpoint
pub(crate) fn ctrl_ep0_in() -> EndpointAddress {
    EndpointAddress::from_parts(0, UsbDirection::In)
}

/// Negotiated USB bus speed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum Speed {
    /// 1.5 Mbit/s
    Low,
    /// 12 Mbit/s
    #[default]
    Full,
    /// 480 Mbit/s
    High,
    /// 5 Gbit/s
    Super,
}

impl Speed {
    /// Control endpoint max packet size at this speed.
    pub const fn ep0_size(self) -> u16 {
        match self {
            Speed::Low => 8,
            Speed::Full | Speed::High => 64,
            Speed::Super => 512,
        }
    }

    /// Indicates that this speed uses the high-speed descriptor rules
    /// (device qualifier, other-speed configuration).
    pub const fn is_high_or_above(self) -> bool {
        matches!(self, Speed::High | Speed::Super)
    }
}

/// Endpoint commands understood by a USB device controller driver.
///
/// All transfers are fire-and-forget. `ep_read()` and `ep_write()` take
/// ownership of the buffer; the driver returns it in a
/// [`ReadComplete`](crate::Event::ReadComplete) or
/// [`WriteComplete`](crate::Event::WriteComplete) event.
pub trait UsbHardware {
    /// Enable an endpoint.
    fn ep_open(&mut self, ep: EndpointAddress, kind: EndpointType, max_packet_size: u16);

    /// Disable an endpoint. Any transfer in progress must be flushed first.
    fn ep_close(&mut self, ep: EndpointAddress);

    /// Cancel the transfer in progress on `ep`.
    ///
    /// Returns the buffer that the endpoint owned, if any. The caller is
    /// now responsible for completing it as cancelled.
    fn ep_flush(&mut self, ep: EndpointAddress) -> Option<IoBuffer>;

    /// Set the endpoint halt condition.
    fn ep_set_stall(&mut self, ep: EndpointAddress);

    /// Clear the endpoint halt condition, resetting the data toggle.
    fn ep_clear_stall(&mut self, ep: EndpointAddress);

    /// Indicates if the endpoint is halted.
    fn ep_is_stall(&self, ep: EndpointAddress) -> bool;

    /// Receive up to `size` bytes into `buffer`.
    fn ep_read(&mut self, ep: EndpointAddress, buffer: IoBuffer, size: usize);

    /// Send the valid bytes of `buffer`. An empty buffer sends a zero-length packet.
    fn ep_write(&mut self, ep: EndpointAddress, buffer: IoBuffer);

    /// Assign the device address.
    ///
    /// USB requires the new address to take effect after the status stage of
    /// SET_ADDRESS. The hardware driver defers the register write as needed.
    fn set_address(&mut self, address: u8);

    /// The speed negotiated during the last bus reset.
    fn speed(&self) -> Speed;

    /// Enter a USB 2.0 test mode, selected by SET_FEATURE(TEST_MODE).
    ///
    /// The default does nothing.
    fn set_test_mode(&mut self, _selector: u8) {}
}

#[cfg(test)]
mod tests {
    use super::{ctrl_ep0_in, ctrl_ep0_out, Speed};
    use usb_device::UsbDirection;

    #[test]
    fn ep0_size() {
        assert_eq!(Speed::Low.ep0_size(), 8);
        assert_eq!(Speed::Full.ep0_size(), 64);
        assert_eq!(Speed::High.ep0_size(), 64);
        assert_eq!(Speed::Super.ep0_size(), 512);
    }

    #[test]
    fn speed_threshold() {
        assert!(!Speed::Full.is_high_or_above());
        assert!(Speed::High.is_high_or_above());
        assert!(Speed::Low < Speed::High);
    }

    #[test]
    fn control_endpoints() {
        assert_eq!(ctrl_ep0_out().index(), 0);
        assert_eq!(ctrl_ep0_out().direction(), UsbDirection::Out);
        assert_eq!(u8::from(ctrl_ep0_in()), 0x80);
    }
}
