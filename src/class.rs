//! Class driver dispatch
//!
//! A class driver implements [`ClassDriver`]. The device context owns every
//! registered driver and calls into it when the device is configured, reset,
//! suspended or resumed, when the host sends a class or vendor request to one
//! of its interfaces, and when I/O on one of its endpoints completes.
//!
//! Interfaces and endpoints that nobody claimed route to [`Stub`], which
//! rejects requests and ignores everything else.

use crate::{
    buffer::IoBuffer,
    descriptor::Configuration,
    error::{Error, Result},
    hardware::UsbHardware,
    notify::Notification,
    setup::SetupPacket,
    table::RoutingTable,
};
use alloc::collections::VecDeque;
use usb_device::endpoint::{EndpointAddress, EndpointType};

/// Identifies a class driver registered with [`Usbd::add_class()`](crate::Usbd::add_class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(usize);

impl ClassId {
    /// Stands in for the owner of unclaimed slots.
    pub(crate) const STUB: ClassId = ClassId(usize::MAX);

    pub(crate) const fn new(index: usize) -> Self {
        ClassId(index)
    }

    /// Registration order of the class driver.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// An asynchronous message for a class driver.
#[derive(Debug)]
pub enum ClassMessage {
    /// A read on one of the class's endpoints finished. The buffer is back
    /// in the class's hands.
    ReadComplete {
        ep: EndpointAddress,
        buffer: IoBuffer,
        result: Result<usize>,
    },
    /// A write on one of the class's endpoints finished.
    WriteComplete {
        ep: EndpointAddress,
        buffer: IoBuffer,
        result: Result<usize>,
    },
    /// An application message, sent with
    /// [`Usbd::send_to_interface()`](crate::Usbd::send_to_interface).
    User {
        cmd: u32,
        param: u32,
        data: Option<IoBuffer>,
    },
}

/// Callbacks implemented by a USB class driver.
///
/// Every callback has a default, so a driver implements only what it needs.
/// `ctx` gives the driver access to the hardware and to the routing tables,
/// on behalf of this driver.
pub trait ClassDriver {
    /// The device entered the configured state.
    ///
    /// Inspect `config`, and claim the interfaces and endpoints that this
    /// driver handles. Returning an error fails the SET_CONFIGURATION
    /// request.
    fn configured(
        &mut self,
        ctx: &mut ClassContext<'_>,
        config: &Configuration<'_>,
    ) -> Result<()> {
        let _ = (ctx, config);
        Ok(())
    }

    /// The interface is being torn down.
    ///
    /// The routing tables are cleared after this returns. Endpoints that the
    /// driver didn't release are flushed and closed, and their buffers come
    /// back as cancelled completions.
    fn reset(&mut self, ctx: &mut ClassContext<'_>, iface: u8) {
        let _ = (ctx, iface);
    }

    /// The bus was suspended.
    fn suspend(&mut self, ctx: &mut ClassContext<'_>, iface: u8) {
        let _ = (ctx, iface);
    }

    /// The bus resumed.
    fn resume(&mut self, ctx: &mut ClassContext<'_>, iface: u8) {
        let _ = (ctx, iface);
    }

    /// Handle a request addressed to `iface`.
    ///
    /// For device-to-host requests, write the response into `data` and
    /// return its full length. The engine sends at most `wLength` bytes, and
    /// stalls if those don't fit in `data`. For host-to-device requests,
    /// `data` holds the data stage; return `Ok(0)` to accept it. An error
    /// stalls the request.
    fn setup(
        &mut self,
        ctx: &mut ClassContext<'_>,
        iface: u8,
        setup: &SetupPacket,
        data: &mut [u8],
    ) -> Result<usize> {
        let _ = (ctx, iface, setup, data);
        Err(Error::NotSupported)
    }

    /// Handle an endpoint completion or an application message.
    fn request(&mut self, ctx: &mut ClassContext<'_>, iface: u8, message: ClassMessage) {
        warn!("IFACE{} DROPPED {:?}", iface, message);
        let _ = (ctx, iface, message);
    }
}

/// The owner of unclaimed interfaces and endpoints.
///
/// Rejects every request, and drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stub;

impl ClassDriver for Stub {}

/// Handles vendor requests addressed to the device, in the message loop.
pub trait VendorHandler {
    /// Same contract as [`ClassDriver::setup()`].
    fn setup(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Result<usize>;
}

/// What a class driver may touch while it handles a callback.
pub struct ClassContext<'a> {
    id: ClassId,
    hw: &'a mut dyn UsbHardware,
    table: &'a mut RoutingTable,
    outbox: &'a mut VecDeque<Notification>,
}

impl<'a> ClassContext<'a> {
    pub(crate) fn new(
        id: ClassId,
        hw: &'a mut dyn UsbHardware,
        table: &'a mut RoutingTable,
        outbox: &'a mut VecDeque<Notification>,
    ) -> Self {
        ClassContext {
            id,
            hw,
            table,
            outbox,
        }
    }

    /// The driver being called.
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// The hardware driver, for reads and writes on claimed endpoints.
    pub fn hardware(&mut self) -> &mut dyn UsbHardware {
        &mut *self.hw
    }

    /// Claim `iface` for this driver.
    pub fn register_interface(&mut self, iface: u8) -> Result<()> {
        self.table.register_interface(iface, self.id)
    }

    /// Release `iface`. Its endpoints must be released first.
    pub fn unregister_interface(&mut self, iface: u8) -> Result<()> {
        self.table.unregister_interface(iface, self.id)
    }

    /// Claim `ep` for `iface`, and open it.
    pub fn register_endpoint(
        &mut self,
        iface: u8,
        ep: EndpointAddress,
        kind: EndpointType,
        max_packet_size: u16,
    ) -> Result<()> {
        self.table.register_endpoint(ep, iface, self.id)?;
        self.hw.ep_open(ep, kind, max_packet_size);
        Ok(())
    }

    /// Release `ep`, flushing and closing it.
    ///
    /// Returns the buffer that the hardware still held, if any. The
    /// transfer that used it did not happen.
    pub fn unregister_endpoint(
        &mut self,
        iface: u8,
        ep: EndpointAddress,
    ) -> Result<Option<IoBuffer>> {
        self.table.unregister_endpoint(ep, iface, self.id)?;
        let buffer = self.hw.ep_flush(ep);
        self.hw.ep_close(ep);
        Ok(buffer)
    }

    /// Current alternate setting of `iface`.
    pub fn alternate_setting(&self, iface: u8) -> Option<u8> {
        self.table.alternate_setting(iface)
    }

    /// Forward a notification to the application.
    pub fn post_user(&mut self, iface: u8, cmd: u32, param: u32) {
        self.outbox
            .push_back(Notification::User { iface, cmd, param });
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassContext, ClassDriver, ClassId, Stub};
    use crate::{
        error::Error,
        mock::{Call, MockHardware},
        notify::Notification,
        setup::SetupPacket,
        table::{Binding, RoutingTable},
    };
    use alloc::collections::VecDeque;
    use usb_device::endpoint::{EndpointAddress, EndpointType};

    #[test]
    fn stub_rejects_setup() {
        let mut hw = MockHardware::default();
        let mut table = RoutingTable::new(2, 2).unwrap();
        let mut outbox = VecDeque::new();
        let mut ctx = ClassContext::new(ClassId::new(0), &mut hw, &mut table, &mut outbox);

        let setup = SetupPacket::from_bytes([0xA1, 0x01, 0, 0, 0, 0, 8, 0]);
        let mut data = [0; 8];
        assert_eq!(
            Stub.setup(&mut ctx, 0, &setup, &mut data),
            Err(Error::NotSupported)
        );
        Stub.reset(&mut ctx, 0);
        Stub.suspend(&mut ctx, 0);
        Stub.resume(&mut ctx, 0);
        assert!(hw.calls.is_empty());
    }

    #[test]
    fn endpoint_claim_opens_and_release_flushes() {
        let ep = EndpointAddress::from(0x81);
        let id = ClassId::new(3);
        let mut hw = MockHardware::default();
        let mut table = RoutingTable::new(2, 4).unwrap();
        let mut outbox = VecDeque::new();

        {
            let mut ctx = ClassContext::new(id, &mut hw, &mut table, &mut outbox);
            ctx.register_interface(1).unwrap();
            ctx.register_endpoint(1, ep, EndpointType::Bulk, 64).unwrap();
            ctx.post_user(1, 7, 42);
        }
        assert_eq!(table.endpoint(ep), Some(1));
        assert_eq!(table.interface(1), Binding::Class(id));
        assert_eq!(hw.calls, [Call::Open(0x81, 64)]);
        assert_eq!(
            outbox.pop_front(),
            Some(Notification::User {
                iface: 1,
                cmd: 7,
                param: 42
            })
        );

        hw.start_write(ep, &[1, 2, 3]);
        hw.calls.clear();
        let mut ctx = ClassContext::new(id, &mut hw, &mut table, &mut outbox);
        let buffer = ctx.unregister_endpoint(1, ep).unwrap().unwrap();
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
        ctx.unregister_interface(1).unwrap();
        assert_eq!(hw.calls, [Call::Flush(0x81), Call::Close(0x81)]);
    }

    #[test]
    fn other_class_cannot_release() {
        let mut hw = MockHardware::default();
        let mut table = RoutingTable::new(2, 4).unwrap();
        let mut outbox = VecDeque::new();

        ClassContext::new(ClassId::new(0), &mut hw, &mut table, &mut outbox)
            .register_interface(0)
            .unwrap();
        let mut ctx = ClassContext::new(ClassId::new(1), &mut hw, &mut table, &mut outbox);
        assert_eq!(ctx.unregister_interface(0), Err(Error::AccessDenied));
        assert_eq!(
            ctx.register_endpoint(0, EndpointAddress::from(0x02), EndpointType::Bulk, 64),
            Err(Error::AccessDenied)
        );
    }
}
