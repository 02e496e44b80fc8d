//! A recording hardware driver, and fixtures, for host-side tests

use crate::{
    buffer::IoBuffer,
    class::{ClassContext, ClassDriver, ClassMessage},
    control::SetupState,
    descriptor::{descriptor_type, Configuration},
    device::Usbd,
    error::{Error, Result},
    event::Event,
    hardware::{ctrl_ep0_in, ctrl_ep0_out, Speed, UsbHardware},
    setup::{request, SetupPacket},
    Config,
};
use alloc::{collections::BTreeMap, collections::BTreeSet, rc::Rc, vec::Vec};
use core::cell::RefCell;
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// A hardware command, as the mock saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(u8, u16),
    Close(u8),
    Flush(u8),
    SetStall(u8),
    ClearStall(u8),
    Read(u8, usize),
    Write(u8, Vec<u8>),
    SetAddress(u8),
    TestMode(u8),
}

#[derive(Debug)]
struct Pending {
    buffer: IoBuffer,
    /// `Some(size)` for reads.
    read: Option<usize>,
}

/// Keeps the buffers it's handed until a test completes them.
#[derive(Debug, Default)]
pub struct MockHardware {
    pub calls: Vec<Call>,
    pub speed: Speed,
    pending: BTreeMap<u8, Pending>,
    stalled: BTreeSet<u8>,
}

impl MockHardware {
    /// Start a write without going through the device context.
    pub fn start_write(&mut self, ep: EndpointAddress, data: &[u8]) {
        let buffer = IoBuffer::from_slice(data).unwrap();
        self.ep_write(ep, buffer);
    }

    /// Indicates that `ep` has a transfer in progress.
    pub fn is_pending(&self, ep: EndpointAddress) -> bool {
        self.pending.contains_key(&u8::from(ep))
    }

    /// The bytes of the write in progress on `ep`.
    pub fn pending_write(&self, ep: EndpointAddress) -> Option<Vec<u8>> {
        self.pending
            .get(&u8::from(ep))
            .filter(|pending| pending.read.is_none())
            .map(|pending| pending.buffer.as_slice().to_vec())
    }

    /// Finish the write in progress on `ep`.
    pub fn complete_write(&mut self, ep: EndpointAddress) -> Event {
        let pending = self.pending.remove(&u8::from(ep)).unwrap();
        assert!(pending.read.is_none(), "{:?} is reading", ep);
        let size = pending.buffer.len();
        Event::WriteComplete {
            ep,
            buffer: pending.buffer,
            result: Ok(size),
        }
    }

    /// Finish the read in progress on `ep`, as if the host sent `data`.
    pub fn complete_read(&mut self, ep: EndpointAddress, data: &[u8]) -> Event {
        let mut pending = self.pending.remove(&u8::from(ep)).unwrap();
        let size = pending.read.unwrap();
        let size = pending.buffer.fill(&data[..data.len().min(size)]);
        Event::ReadComplete {
            ep,
            buffer: pending.buffer,
            result: Ok(size),
        }
    }

    fn begin(&mut self, ep: EndpointAddress, pending: Pending) {
        let previous = self.pending.insert(u8::from(ep), pending);
        assert!(previous.is_none(), "{:?} already has a transfer", ep);
    }
}

impl UsbHardware for MockHardware {
    fn ep_open(&mut self, ep: EndpointAddress, _: EndpointType, max_packet_size: u16) {
        self.calls.push(Call::Open(ep.into(), max_packet_size));
    }
    fn ep_close(&mut self, ep: EndpointAddress) {
        self.calls.push(Call::Close(ep.into()));
    }
    fn ep_flush(&mut self, ep: EndpointAddress) -> Option<IoBuffer> {
        self.calls.push(Call::Flush(ep.into()));
        self.pending.remove(&u8::from(ep)).map(|pending| pending.buffer)
    }
    fn ep_set_stall(&mut self, ep: EndpointAddress) {
        self.calls.push(Call::SetStall(ep.into()));
        self.stalled.insert(ep.into());
    }
    fn ep_clear_stall(&mut self, ep: EndpointAddress) {
        self.calls.push(Call::ClearStall(ep.into()));
        self.stalled.remove(&u8::from(ep));
    }
    fn ep_is_stall(&self, ep: EndpointAddress) -> bool {
        self.stalled.contains(&u8::from(ep))
    }
    fn ep_read(&mut self, ep: EndpointAddress, buffer: IoBuffer, size: usize) {
        assert!(buffer.capacity() >= size);
        self.calls.push(Call::Read(ep.into(), size));
        self.begin(
            ep,
            Pending {
                buffer,
                read: Some(size),
            },
        );
    }
    fn ep_write(&mut self, ep: EndpointAddress, buffer: IoBuffer) {
        self.calls
            .push(Call::Write(ep.into(), buffer.as_slice().to_vec()));
        self.begin(ep, Pending { buffer, read: None });
    }
    fn set_address(&mut self, address: u8) {
        self.calls.push(Call::SetAddress(address));
    }
    fn speed(&self) -> Speed {
        self.speed
    }
    fn set_test_mode(&mut self, selector: u8) {
        self.calls.push(Call::TestMode(selector));
    }
}

#[rustfmt::skip]
pub static DEVICE: [u8; 18] = [
    18, 1, 0x00, 0x02, 0x00, 0x00, 0x00, 64,
    0x09, 0x12, 0x01, 0x00, 0x00, 0x01, 1, 2, 0, 1,
];

/// Configuration 1: vendor interface 0 with two bulk endpoints, and an
/// alternate setting without endpoints.
#[rustfmt::skip]
pub static CONFIG: [u8; 41] = [
    9, 2, 41, 0, 1, 1, 0, 0x80, 50,
    9, 4, 0, 0, 2, 0xFF, 0, 0, 0,
    7, 5, 0x81, 0x02, 64, 0, 0,
    7, 5, 0x01, 0x02, 64, 0, 0,
    9, 4, 0, 1, 0, 0xFF, 0, 0, 0,
];

pub static LANGUAGES: [u8; 4] = [4, 3, 0x09, 0x04];

/// What a [`TestClass`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassCall {
    Configured(u8),
    Reset(u8),
    Suspend(u8),
    Resume(u8),
    Setup(u8, u8),
    ReadComplete(u8, Result<usize>),
    WriteComplete(u8, Result<usize>),
    User(u8, u32, u32),
}

pub type CallLog = Rc<RefCell<Vec<ClassCall>>>;

/// Claims one interface and its default endpoints, and starts a read on
/// each OUT endpoint.
pub struct TestClass {
    pub iface: u8,
    pub calls: CallLog,
    /// Response to class IN requests.
    pub response: Vec<u8>,
    /// Accept non-zero alternate settings.
    pub alternate_ok: bool,
}

impl TestClass {
    pub fn new(iface: u8) -> (Self, CallLog) {
        let calls = CallLog::default();
        let class = TestClass {
            iface,
            calls: calls.clone(),
            response: Vec::new(),
            alternate_ok: true,
        };
        (class, calls)
    }

    fn log(&self, call: ClassCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl ClassDriver for TestClass {
    fn configured(
        &mut self,
        ctx: &mut ClassContext<'_>,
        config: &Configuration<'_>,
    ) -> Result<()> {
        self.log(ClassCall::Configured(config.value()));
        if config.interface(self.iface, 0).is_none() {
            return Ok(());
        }
        ctx.register_interface(self.iface)?;
        for ep in config.endpoints(self.iface, 0) {
            let kind = match ep.transfer_type() {
                3 => EndpointType::Interrupt,
                _ => EndpointType::Bulk,
            };
            ctx.register_endpoint(self.iface, ep.address, kind, ep.max_packet_size)?;
            if ep.address.direction() == UsbDirection::Out {
                let size = ep.max_packet_size as usize;
                let buffer = IoBuffer::with_capacity(size)?;
                ctx.hardware().ep_read(ep.address, buffer, size);
            }
        }
        Ok(())
    }

    fn reset(&mut self, _: &mut ClassContext<'_>, iface: u8) {
        self.log(ClassCall::Reset(iface));
    }

    fn suspend(&mut self, _: &mut ClassContext<'_>, iface: u8) {
        self.log(ClassCall::Suspend(iface));
    }

    fn resume(&mut self, _: &mut ClassContext<'_>, iface: u8) {
        self.log(ClassCall::Resume(iface));
    }

    fn setup(
        &mut self,
        _: &mut ClassContext<'_>,
        iface: u8,
        setup: &SetupPacket,
        data: &mut [u8],
    ) -> Result<usize> {
        self.log(ClassCall::Setup(iface, setup.request));
        if setup.request == request::SET_INTERFACE {
            return if setup.value == 0 || self.alternate_ok {
                Ok(0)
            } else {
                Err(Error::NotSupported)
            };
        }
        if setup.direction() == UsbDirection::In {
            // Write what fits; report the full length
            let size = self.response.len().min(data.len());
            data[..size].copy_from_slice(&self.response[..size]);
            Ok(self.response.len())
        } else {
            Ok(0)
        }
    }

    fn request(&mut self, _: &mut ClassContext<'_>, iface: u8, message: ClassMessage) {
        let call = match message {
            ClassMessage::ReadComplete { ep, result, .. } => {
                ClassCall::ReadComplete(ep.into(), result)
            }
            ClassMessage::WriteComplete { ep, result, .. } => {
                ClassCall::WriteComplete(ep.into(), result)
            }
            ClassMessage::User { cmd, param, .. } => ClassCall::User(iface, cmd, param),
        };
        self.log(call);
    }
}

/// An open device with the fixture descriptors, reset at full speed.
pub fn device() -> Usbd<MockHardware> {
    let mut usbd = Usbd::new(MockHardware::default(), Config::default()).unwrap();
    usbd.register_descriptor(descriptor_type::DEVICE, 0, 0, &DEVICE)
        .unwrap();
    usbd.register_descriptor(descriptor_type::CONFIGURATION, 0, 0, &CONFIG)
        .unwrap();
    usbd.register_descriptor(descriptor_type::STRING, 0, 0, &LANGUAGES)
        .unwrap();
    usbd.open().unwrap();
    usbd.handle_event(Event::Reset(Speed::Full)).unwrap();
    usbd.hardware_mut().calls.clear();
    while usbd.poll_notification().is_some() {}
    usbd
}

/// Deliver a SETUP packet.
pub fn setup(usbd: &mut Usbd<MockHardware>, raw: [u8; 8]) {
    usbd.hardware_mut().calls.clear();
    usbd.handle_event(Event::Setup(raw)).unwrap();
}

/// Run a device-to-host control transfer to completion.
///
/// Returns the data stage, or `None` if the request stalled.
pub fn control_read(usbd: &mut Usbd<MockHardware>, raw: [u8; 8]) -> Option<Vec<u8>> {
    setup(usbd, raw);
    let mut data = Vec::new();
    loop {
        match usbd.setup_state() {
            SetupState::DataIn | SetupState::DataInZlp => {
                let hw = usbd.hardware_mut();
                data.extend(hw.pending_write(ctrl_ep0_in()).unwrap());
                let event = hw.complete_write(ctrl_ep0_in());
                usbd.handle_event(event).unwrap();
            }
            SetupState::StatusOut => {
                let event = usbd.hardware_mut().complete_read(ctrl_ep0_out(), &[]);
                usbd.handle_event(event).unwrap();
                return Some(data);
            }
            SetupState::Request => return None,
            state => panic!("unexpected {:?}", state),
        }
    }
}

/// Run a host-to-device control transfer to completion.
///
/// Returns `false` if the request stalled.
pub fn control_write(usbd: &mut Usbd<MockHardware>, raw: [u8; 8], data: &[u8]) -> bool {
    setup(usbd, raw);
    if usbd.setup_state() == SetupState::DataOut {
        let event = usbd.hardware_mut().complete_read(ctrl_ep0_out(), data);
        usbd.handle_event(event).unwrap();
    }
    match usbd.setup_state() {
        SetupState::StatusIn => {
            let event = usbd.hardware_mut().complete_write(ctrl_ep0_in());
            usbd.handle_event(event).unwrap();
            true
        }
        SetupState::Request => false,
        state => panic!("unexpected {:?}", state),
    }
}

/// Address the device, and select configuration 1.
pub fn configure(usbd: &mut Usbd<MockHardware>) {
    assert!(control_write(usbd, [0x00, 0x05, 7, 0, 0, 0, 0, 0], &[]));
    assert!(control_write(usbd, [0x00, 0x09, 1, 0, 0, 0, 0, 0], &[]));
}
