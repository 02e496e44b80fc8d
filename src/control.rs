//! The control transfer engine
//!
//! Runs the SETUP, DATA and STATUS stages of one control transfer at a
//! time over endpoint 0. What a request *means* is decided elsewhere: the
//! standard request handlers, a class driver, or a vendor handler produce a
//! response length, or an error that becomes a STALL.
//!
//! Every state except [`SetupState::Request`] and
//! [`SetupState::VendorRequest`] has exactly one endpoint 0 transfer in
//! progress, and the engine holds no endpoint 0 transfer in those two.

use crate::{
    buffer::IoBuffer,
    device::Usbd,
    error::{Error, Result},
    hardware::{ctrl_ep0_in, ctrl_ep0_out, UsbHardware},
    notify::Notification,
    setup::SetupPacket,
    table::Binding,
};
use usb_device::{
    control::{Recipient, RequestType},
    UsbDirection,
};

/// Where the control transfer engine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupState {
    /// Idle, waiting for a SETUP packet.
    #[default]
    Request,
    /// Waiting for the application to answer a vendor request.
    VendorRequest,
    /// Sending the data stage.
    DataIn,
    /// Sending the data stage, to be followed by a zero-length packet.
    DataInZlp,
    /// Receiving the data stage.
    DataOut,
    /// Sending the zero-length status packet.
    StatusIn,
    /// Receiving the zero-length status packet.
    StatusOut,
}

/// Control transfer state.
#[derive(Debug, Default)]
pub(crate) struct Control {
    pub(crate) state: SetupState,
    /// Valid while `state` isn't `Request`.
    pub(crate) setup: SetupPacket,
    /// The control buffer, when it isn't lent to the hardware.
    pub(crate) buffer: Option<IoBuffer>,
}

/// An empty buffer for zero-length packets.
fn zlp() -> IoBuffer {
    IoBuffer::default()
}

impl<H: UsbHardware> Usbd<H> {
    pub(crate) fn on_setup(&mut self, raw: [u8; 8]) {
        if self.control.state != SetupState::Request {
            // The host gave up on the last transfer.
            warn!("SETUP DURING {:?}; ABORTING", self.control.state);
            self.abort_control();
        }
        debug_assert_eq!(self.control.state, SetupState::Request);

        let setup = SetupPacket::from_bytes(raw);
        self.control.setup = setup;
        trace!(
            "SETUP {:#04X} {:#04X} {:#06X} {:#06X} {}",
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            setup.length
        );

        let buffer = match self.take_buffer() {
            Ok(buffer) => buffer,
            Err(err) => return self.stall(&setup, err),
        };

        if setup.has_data_out() {
            let size = setup.length as usize;
            if size > buffer.capacity() {
                self.control.buffer = Some(buffer);
                return self.stall(&setup, Error::InvalidParams);
            }
            self.control.state = SetupState::DataOut;
            self.hw.ep_read(ctrl_ep0_out(), buffer, size);
        } else {
            self.process_request(buffer);
        }
    }

    pub(crate) fn on_ep0_read_complete(&mut self, mut buffer: IoBuffer, result: Result<usize>) {
        match (self.control.state, result) {
            (SetupState::DataOut, Ok(size)) => {
                buffer.set_len(size);
                self.process_request(buffer);
            }
            (SetupState::StatusOut, Ok(_)) => {
                self.restore_buffer(buffer);
                self.control.state = SetupState::Request;
            }
            (SetupState::DataOut | SetupState::StatusOut, Err(_err)) => {
                warn!("EP0 OUT FAILED {:?} IN {:?}", _err, self.control.state);
                self.restore_buffer(buffer);
                self.control.state = SetupState::Request;
            }
            (_state, _) => {
                warn!("STRAY EP0 OUT COMPLETION IN {:?}", _state);
                self.restore_buffer(buffer);
            }
        }
    }

    pub(crate) fn on_ep0_write_complete(&mut self, buffer: IoBuffer, result: Result<usize>) {
        self.restore_buffer(buffer);
        match (self.control.state, result) {
            (SetupState::DataInZlp, Ok(_)) => {
                self.control.state = SetupState::DataIn;
                self.hw.ep_write(ctrl_ep0_in(), zlp());
            }
            (SetupState::DataIn, Ok(_)) => {
                self.control.state = SetupState::StatusOut;
                self.hw.ep_read(ctrl_ep0_out(), zlp(), 0);
            }
            (SetupState::StatusIn, Ok(_)) => {
                self.control.state = SetupState::Request;
                self.status_complete();
            }
            (SetupState::DataIn | SetupState::DataInZlp | SetupState::StatusIn, Err(_err)) => {
                warn!("EP0 IN FAILED {:?} IN {:?}", _err, self.control.state);
                self.control.state = SetupState::Request;
            }
            (_state, _) => {
                warn!("STRAY EP0 IN COMPLETION IN {:?}", _state);
            }
        }
    }

    /// Side effects that USB defers until after the status stage.
    fn status_complete(&mut self) {
        let setup = self.control.setup;
        if setup.kind() == RequestType::Standard
            && setup.recipient() == Recipient::Device
            && setup.request == crate::setup::request::SET_FEATURE
            && setup.value == crate::setup::feature::TEST_MODE
        {
            debug!("TEST MODE {}", self.test_mode);
            self.hw.set_test_mode(self.test_mode);
        }
    }

    /// Decide the request held in `control.setup`, then start the
    /// response.
    fn process_request(&mut self, mut buffer: IoBuffer) {
        let setup = self.control.setup;
        let data: &mut [u8] = if setup.direction() == UsbDirection::In {
            let limit = buffer.capacity().min(setup.length as usize);
            &mut buffer.storage_mut()[..limit]
        } else {
            buffer.as_mut_slice()
        };

        match self.dispatch(&setup, data) {
            Ok(Some(size)) => self.respond(buffer, size),
            Ok(None) => {
                self.control.buffer = Some(buffer);
                self.control.state = SetupState::VendorRequest;
            }
            Err(err) => {
                self.control.buffer = Some(buffer);
                self.stall(&setup, err);
            }
        }
    }

    /// Route a request to whoever handles it.
    ///
    /// `Ok(None)` means that the application will answer later.
    fn dispatch(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Result<Option<usize>> {
        match (setup.kind(), setup.recipient()) {
            (RequestType::Standard, _) => self.standard_request(setup, data).map(Some),
            (RequestType::Vendor, Recipient::Device) => self.vendor_request(setup, data),
            (RequestType::Class | RequestType::Vendor, Recipient::Interface) => {
                self.class_setup(setup.interface(), setup, data).map(Some)
            }
            (RequestType::Class | RequestType::Vendor, Recipient::Endpoint) => {
                let ep = setup.endpoint();
                let iface = self.table.endpoint(ep).ok_or(Error::NotFound)?;
                self.class_setup(iface, setup, data).map(Some)
            }
            _ => Err(Error::NotSupported),
        }
    }

    /// Hand a request to the class that owns `iface`.
    pub(crate) fn class_setup(
        &mut self,
        iface: u8,
        setup: &SetupPacket,
        data: &mut [u8],
    ) -> Result<usize> {
        let binding = self.table.interface(iface);
        if binding == Binding::Stub {
            debug!("IFACE{} UNCLAIMED", iface);
        }
        self.with_binding(binding, |class, ctx| class.setup(ctx, iface, setup, data))
    }

    fn vendor_request(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Result<Option<usize>> {
        if let Some(handler) = self.vendor_handler.as_mut() {
            return handler.setup(setup, data).map(Some);
        }
        if !self.vendor_client {
            return Err(Error::NotSupported);
        }
        let data = if setup.has_data_out() {
            Some(IoBuffer::from_slice(data)?)
        } else {
            None
        };
        self.outbox.push_back(Notification::VendorRequest {
            setup: *setup,
            data,
        });
        Ok(None)
    }

    /// Start the data or status stage of a successful request.
    ///
    /// `size` is the full response length for device-to-host requests. A
    /// response that `wLength` allows, but that doesn't fit in the control
    /// buffer, stalls instead of reaching the host cut short.
    pub(crate) fn respond(&mut self, mut buffer: IoBuffer, size: usize) {
        let setup = self.control.setup;
        let length = setup.length as usize;
        if setup.direction() == UsbDirection::Out || length == 0 {
            self.control.buffer = Some(buffer);
            self.control.state = SetupState::StatusIn;
            self.hw.ep_write(ctrl_ep0_in(), zlp());
            return;
        }

        let size = size.min(length);
        if size > buffer.capacity() {
            self.control.buffer = Some(buffer);
            return self.stall(&setup, Error::OutOfMemory);
        }
        // An empty response still sends a zero-length data packet, and then
        // reads the status. The host is waiting on an IN data stage.
        buffer.set_len(size);
        let ep0_size = self.ep0_size as usize;
        self.control.state = if size > 0 && size < length && size % ep0_size == 0 {
            SetupState::DataInZlp
        } else {
            SetupState::DataIn
        };
        self.hw.ep_write(ctrl_ep0_in(), buffer);
    }

    /// Fail the request in `setup`.
    ///
    /// Stalls both directions of endpoint 0, unless the request targeted an
    /// endpoint. Then only the direction of the stage that the host will
    /// try next stalls.
    pub(crate) fn stall(&mut self, setup: &SetupPacket, _err: Error) {
        warn!(
            "STALL {:#04X} {:#04X}: {}",
            setup.request_type, setup.request, _err
        );
        if setup.recipient() == Recipient::Endpoint {
            let ep = if self.control.state == SetupState::Request && setup.has_data_out() {
                // Failed before the data stage was received
                ctrl_ep0_out()
            } else {
                // IN data stage, or IN status stage
                ctrl_ep0_in()
            };
            self.hw.ep_set_stall(ep);
        } else {
            self.hw.ep_set_stall(ctrl_ep0_out());
            self.hw.ep_set_stall(ctrl_ep0_in());
        }
        self.control.state = SetupState::Request;
    }

    /// Cancel the control transfer in progress, if any.
    ///
    /// A vendor request that the application hasn't taken yet is withdrawn.
    pub(crate) fn abort_control(&mut self) {
        if self.control.state == SetupState::VendorRequest {
            self.withdraw_vendor_request();
        }
        let ep = match self.control.state {
            SetupState::Request | SetupState::VendorRequest => None,
            SetupState::DataOut | SetupState::StatusOut => Some(ctrl_ep0_out()),
            SetupState::DataIn | SetupState::DataInZlp | SetupState::StatusIn => {
                Some(ctrl_ep0_in())
            }
        };
        if let Some(buffer) = ep.and_then(|ep| self.hw.ep_flush(ep)) {
            self.restore_buffer(buffer);
        }
        self.control.state = SetupState::Request;
    }

    /// Drop the notification for a vendor request that won't be answered.
    pub(crate) fn withdraw_vendor_request(&mut self) {
        self.outbox
            .retain(|notification| !matches!(notification, Notification::VendorRequest { .. }));
    }

    /// Borrow the control buffer, allocating it again if it went missing.
    pub(crate) fn take_buffer(&mut self) -> Result<IoBuffer> {
        match self.control.buffer.take() {
            Some(mut buffer) => {
                buffer.clear();
                Ok(buffer)
            }
            None => IoBuffer::with_capacity(self.config.control_buffer_size),
        }
    }

    /// Take back the control buffer. Zero-length packet buffers, and
    /// anything stale, are dropped.
    fn restore_buffer(&mut self, buffer: IoBuffer) {
        if self.control.buffer.is_none() && buffer.capacity() == self.config.control_buffer_size {
            self.control.buffer = Some(buffer);
        }
    }
}
