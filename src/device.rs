//! The device context
//!
//! [`Usbd`] owns everything the engine needs: the hardware driver, the
//! descriptor registry, the registered class drivers, the routing tables,
//! and the state of the one control transfer that may be in flight. It's
//! driven by a single-threaded message loop that feeds it [`Event`]s.
//!
//! ```
//! use usbd_core::{Event, EventQueue, Usbd, UsbHardware};
//!
//! fn run<H: UsbHardware>(usbd: &mut Usbd<H>, queue: &EventQueue, cs: &bare_metal::CriticalSection) {
//!     while let Some(event) = queue.take(cs) {
//!         usbd.handle_event(event).ok();
//!     }
//!     while let Some(notification) = usbd.poll_notification() {
//!         // Forward to the application...
//!         # let _ = notification;
//!     }
//! }
//! ```

use crate::{
    buffer::IoBuffer,
    class::{ClassContext, ClassDriver, ClassId, ClassMessage, Stub, VendorHandler},
    config::Config,
    control::{Control, SetupState},
    descriptor::DescriptorRegistry,
    error::{Error, Result},
    event::Event,
    hardware::{ctrl_ep0_in, ctrl_ep0_out, Speed, UsbHardware},
    notify::Notification,
    setup::SetupPacket,
    table::{Binding, RoutingTable},
};
use alloc::{boxed::Box, collections::VecDeque, vec::Vec};
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// USB chapter 9 device states, as far as the engine tracks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// After bus reset, at address 0.
    #[default]
    Default,
    /// The host assigned an address.
    Addressed,
    /// The host selected a configuration.
    Configured,
}

bitflags::bitflags! {
    /// Device status bits, as reported by GET_STATUS(DEVICE).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFeatures : u16 {
        const SELF_POWERED = 1 << 0;
        const REMOTE_WAKEUP = 1 << 1;
    }
}

/// A USB device context.
pub struct Usbd<H> {
    pub(crate) hw: H,
    pub(crate) config: Config,
    active: bool,
    pub(crate) state: DeviceState,
    pub(crate) speed: Speed,
    pub(crate) ep0_size: u16,
    ep0_open: bool,
    suspended: bool,
    pub(crate) configuration: u8,
    pub(crate) features: DeviceFeatures,
    pub(crate) test_mode: u8,
    pub(crate) control: Control,
    pub(crate) descriptors: DescriptorRegistry,
    pub(crate) classes: Vec<Box<dyn ClassDriver>>,
    pub(crate) table: RoutingTable,
    pub(crate) outbox: VecDeque<Notification>,
    pub(crate) vendor_handler: Option<Box<dyn VendorHandler>>,
    pub(crate) vendor_client: bool,
}

impl<H: UsbHardware> Usbd<H> {
    /// Create a closed device context.
    ///
    /// Register descriptors and class drivers, then [`open()`](Usbd::open) it.
    pub fn new(hw: H, config: Config) -> Result<Self> {
        let table = RoutingTable::new(config.max_interfaces, config.max_endpoints)?;
        let speed = config.natural_speed;
        Ok(Usbd {
            hw,
            config,
            active: false,
            state: DeviceState::Default,
            speed,
            ep0_size: speed.ep0_size(),
            ep0_open: false,
            suspended: false,
            configuration: 0,
            features: Self::initial_features(&config),
            test_mode: 0,
            control: Control::default(),
            descriptors: DescriptorRegistry::new(),
            classes: Vec::new(),
            table,
            outbox: VecDeque::new(),
            vendor_handler: None,
            vendor_client: false,
        })
    }

    fn initial_features(config: &Config) -> DeviceFeatures {
        if config.self_powered {
            DeviceFeatures::SELF_POWERED
        } else {
            DeviceFeatures::empty()
        }
    }

    /// Add a class driver.
    ///
    /// Class drivers see `configured()` in the order they were added.
    pub fn add_class<C: ClassDriver + 'static>(&mut self, class: C) -> Result<ClassId> {
        self.classes
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)?;
        let id = ClassId::new(self.classes.len());
        self.classes.push(Box::new(class));
        Ok(id)
    }

    /// The descriptor registry.
    pub fn descriptors(&self) -> &DescriptorRegistry {
        &self.descriptors
    }

    /// The descriptor registry, for bulk registration.
    pub fn descriptors_mut(&mut self) -> &mut DescriptorRegistry {
        &mut self.descriptors
    }

    /// Register a descriptor backed by static data.
    pub fn register_descriptor(
        &mut self,
        kind: u8,
        index: u8,
        language: u16,
        data: &'static [u8],
    ) -> Result<()> {
        self.descriptors.register_static(kind, index, language, data)
    }

    /// Register a copy of a descriptor.
    pub fn register_descriptor_copy(
        &mut self,
        kind: u8,
        index: u8,
        language: u16,
        data: &[u8],
    ) -> Result<()> {
        self.descriptors.register_copy(kind, index, language, data)
    }

    /// Remove a descriptor.
    pub fn unregister_descriptor(&mut self, kind: u8, index: u8, language: u16) -> Result<()> {
        self.descriptors.unregister(kind, index, language)
    }

    /// Start handling events.
    ///
    /// Endpoint 0 comes up with the first bus reset.
    pub fn open(&mut self) -> Result<()> {
        if self.active {
            return Err(Error::AlreadyConfigured);
        }
        if self.control.buffer.is_none() {
            self.control.buffer = Some(IoBuffer::with_capacity(self.config.control_buffer_size)?);
        }
        self.speed = self.hw.speed();
        self.ep0_size = self.speed.ep0_size();
        self.state = DeviceState::Default;
        self.configuration = 0;
        self.features = Self::initial_features(&self.config);
        self.suspended = false;
        self.active = true;
        debug!("OPEN");
        Ok(())
    }

    /// Stop handling events, tearing down the configuration and releasing
    /// endpoint 0.
    pub fn close(&mut self) -> Result<()> {
        if !self.active {
            return Err(Error::NotActive);
        }
        if self.state == DeviceState::Configured {
            self.teardown();
        }
        self.close_ep0();
        self.control.buffer = None;
        self.state = DeviceState::Default;
        self.configuration = 0;
        self.active = false;
        debug!("CLOSE");
        Ok(())
    }

    /// Indicates that the context is open.
    pub fn is_open(&self) -> bool {
        self.active
    }

    /// Process one hardware event.
    ///
    /// Returns `NotActive` if the context isn't open; the event is dropped.
    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        if !self.active {
            return Err(Error::NotActive);
        }
        match event {
            Event::Reset(speed) => self.on_reset(speed),
            Event::Suspend => self.on_suspend(),
            Event::Wakeup => self.on_wakeup(),
            Event::Setup(raw) => self.on_setup(raw),
            Event::ReadComplete { ep, buffer, result } if ep.index() == 0 => {
                self.on_ep0_read_complete(buffer, result)
            }
            Event::WriteComplete { ep, buffer, result } if ep.index() == 0 => {
                self.on_ep0_write_complete(buffer, result)
            }
            Event::ReadComplete { ep, buffer, result } => {
                self.route_completion(ep, ClassMessage::ReadComplete { ep, buffer, result })
            }
            Event::WriteComplete { ep, buffer, result } => {
                self.route_completion(ep, ClassMessage::WriteComplete { ep, buffer, result })
            }
        }
        Ok(())
    }

    /// Send an application message to the class that owns `iface`.
    pub fn send_to_interface(
        &mut self,
        iface: u8,
        cmd: u32,
        param: u32,
        data: Option<IoBuffer>,
    ) -> Result<()> {
        if !self.active {
            return Err(Error::NotActive);
        }
        let binding = self.table.interface(iface);
        if binding == Binding::Stub {
            return Err(Error::NotConfigured);
        }
        self.with_binding(binding, |class, ctx| {
            class.request(ctx, iface, ClassMessage::User { cmd, param, data })
        });
        Ok(())
    }

    /// Take the oldest application notification.
    pub fn poll_notification(&mut self) -> Option<Notification> {
        self.outbox.pop_front()
    }

    /// Install the handler for device vendor requests.
    ///
    /// The handler answers in the message loop, and takes precedence over a
    /// vendor client.
    pub fn set_vendor_handler<V: VendorHandler + 'static>(&mut self, handler: V) {
        self.vendor_handler = Some(Box::new(handler));
    }

    /// Remove the vendor request handler.
    pub fn clear_vendor_handler(&mut self) {
        self.vendor_handler = None;
    }

    /// Ask for device vendor requests as [`Notification::VendorRequest`].
    ///
    /// Each one waits until [`vendor_response()`](Usbd::vendor_response).
    pub fn register_vendor_client(&mut self) -> Result<()> {
        if self.vendor_client {
            return Err(Error::AlreadyConfigured);
        }
        self.vendor_client = true;
        Ok(())
    }

    /// Stop receiving vendor requests. A request that's still waiting stalls.
    pub fn unregister_vendor_client(&mut self) -> Result<()> {
        if !self.vendor_client {
            return Err(Error::NotConfigured);
        }
        self.vendor_client = false;
        if self.control.state == SetupState::VendorRequest {
            let setup = self.control.setup;
            self.stall(&setup, Error::Cancelled);
            self.withdraw_vendor_request();
        }
        Ok(())
    }

    /// Answer the vendor request `request`, taken from a
    /// [`Notification::VendorRequest`].
    ///
    /// For device-to-host requests, `response` is the data stage. An error
    /// stalls the request. Returns `NotFound` if `request` isn't the one
    /// that's waiting; the host moved on, and the answer is dropped.
    pub fn vendor_response(
        &mut self,
        request: &SetupPacket,
        response: Result<&[u8]>,
    ) -> Result<()> {
        if !self.active {
            return Err(Error::NotActive);
        }
        if self.control.state != SetupState::VendorRequest || self.control.setup != *request {
            return Err(Error::NotFound);
        }
        let setup = self.control.setup;
        match response {
            Err(err) => self.stall(&setup, err),
            Ok(data) => match self.take_buffer() {
                Err(err) => {
                    self.stall(&setup, err);
                    return Err(err);
                }
                Ok(mut buffer) => {
                    let size = if setup.direction() == UsbDirection::In {
                        buffer.fill(data);
                        data.len()
                    } else {
                        0
                    };
                    self.respond(buffer, size);
                }
            },
        }
        Ok(())
    }

    /// Current device state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Current configuration value; 0 when not configured.
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// The speed negotiated during the last bus reset.
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Device status bits.
    pub fn features(&self) -> DeviceFeatures {
        self.features
    }

    /// The test mode selector, if the host enabled one.
    pub fn test_mode(&self) -> Option<u8> {
        (self.test_mode != 0).then_some(self.test_mode)
    }

    /// Where the control transfer engine is.
    pub fn setup_state(&self) -> SetupState {
        self.control.state
    }

    /// Indicates that the bus is suspended.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// The hardware driver.
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// The hardware driver, mutably.
    ///
    /// Endpoint 0 and claimed endpoints belong to the engine and its class
    /// drivers; don't start transfers on them from here.
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Call `f` with the driver behind `binding`, and a context on its behalf.
    pub(crate) fn with_binding<R>(
        &mut self,
        binding: Binding,
        f: impl FnOnce(&mut dyn ClassDriver, &mut ClassContext<'_>) -> R,
    ) -> R {
        let mut stub = Stub;
        let id = match binding {
            Binding::Class(id) if id.index() < self.classes.len() => id,
            _ => ClassId::STUB,
        };
        let class: &mut dyn ClassDriver = match self.classes.get_mut(id.index()) {
            Some(class) => class.as_mut(),
            None => &mut stub,
        };
        let mut ctx = ClassContext::new(id, &mut self.hw, &mut self.table, &mut self.outbox);
        f(class, &mut ctx)
    }

    fn route_completion(&mut self, ep: EndpointAddress, message: ClassMessage) {
        match self.table.endpoint(ep) {
            Some(iface) => {
                let binding = self.table.interface(iface);
                self.with_binding(binding, |class, ctx| class.request(ctx, iface, message));
            }
            None => {
                warn!("EP{} {:?} UNCLAIMED COMPLETION", ep.index(), ep.direction());
            }
        }
    }

    fn on_reset(&mut self, speed: Speed) {
        debug!("RESET {:?}", speed);
        self.abort_control();
        self.speed = speed;
        self.ep0_size = speed.ep0_size();
        // A configured device stays configured. Some hosts reset
        // spuriously, and expect the configuration to survive.
        if self.state != DeviceState::Configured {
            self.state = DeviceState::Default;
        }
        self.close_ep0();
        self.open_ep0();
        // Reset signaling ends a suspend. Classes that saw the suspend
        // see the resume.
        if self.suspended {
            self.suspended = false;
            if self.state == DeviceState::Configured {
                self.resume_classes();
            }
        }
        self.outbox.push_back(Notification::Reset);
    }

    fn on_suspend(&mut self) {
        if self.suspended {
            return;
        }
        debug!("SUSPEND");
        self.suspended = true;
        if self.state != DeviceState::Configured {
            return;
        }
        let claimed: Vec<(u8, ClassId)> = self.table.claimed_interfaces().collect();
        for (iface, id) in claimed {
            self.with_binding(Binding::Class(id), |class, ctx| class.suspend(ctx, iface));
        }
        self.close_ep0();
        self.outbox.push_back(Notification::Suspend);
    }

    fn on_wakeup(&mut self) {
        if !self.suspended {
            return;
        }
        debug!("WAKEUP");
        self.suspended = false;
        if self.state != DeviceState::Configured {
            return;
        }
        self.open_ep0();
        self.resume_classes();
    }

    fn resume_classes(&mut self) {
        let claimed: Vec<(u8, ClassId)> = self.table.claimed_interfaces().collect();
        for (iface, id) in claimed {
            self.with_binding(Binding::Class(id), |class, ctx| class.resume(ctx, iface));
        }
        self.outbox.push_back(Notification::Resume);
    }

    fn open_ep0(&mut self) {
        if self.ep0_open {
            return;
        }
        self.hw
            .ep_open(ctrl_ep0_out(), EndpointType::Control, self.ep0_size);
        self.hw
            .ep_open(ctrl_ep0_in(), EndpointType::Control, self.ep0_size);
        self.ep0_open = true;
    }

    fn close_ep0(&mut self) {
        self.abort_control();
        if !self.ep0_open {
            return;
        }
        self.hw.ep_close(ctrl_ep0_out());
        self.hw.ep_close(ctrl_ep0_in());
        self.ep0_open = false;
    }

    /// Reset every claimed interface, release every claimed endpoint, and
    /// clear the routing tables.
    pub(crate) fn teardown(&mut self) {
        let claimed: Vec<(u8, ClassId)> = self.table.claimed_interfaces().collect();
        for (iface, id) in claimed {
            self.with_binding(Binding::Class(id), |class, ctx| class.reset(ctx, iface));
        }

        let leftover: Vec<(EndpointAddress, u8)> = self.table.claimed_endpoints().collect();
        for (ep, iface) in leftover {
            let buffer = self.hw.ep_flush(ep);
            self.hw.ep_close(ep);
            let Some(buffer) = buffer else {
                continue;
            };
            let result = Err(Error::Cancelled);
            let message = match ep.direction() {
                UsbDirection::In => ClassMessage::WriteComplete { ep, buffer, result },
                UsbDirection::Out => ClassMessage::ReadComplete { ep, buffer, result },
            };
            let binding = self.table.interface(iface);
            self.with_binding(binding, |class, ctx| class.request(ctx, iface, message));
        }

        self.table.clear();
        debug!("TEARDOWN");
    }
}
