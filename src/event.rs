//! Hardware events, and the queue that carries them out of interrupt context
//!
//! The hardware driver's interrupt handler never touches the device
//! context. It posts an [`Event`] into an [`EventQueue`], and the message
//! loop drains the queue into [`Usbd::handle_event()`](crate::Usbd::handle_event).

use crate::{buffer::IoBuffer, error::Result, hardware::Speed};
use alloc::collections::VecDeque;
use bare_metal::{CriticalSection, Mutex};
use core::cell::RefCell;
use usb_device::endpoint::EndpointAddress;

/// Something the hardware driver observed.
#[derive(Debug)]
pub enum Event {
    /// Bus reset, with the speed the host negotiated.
    Reset(Speed),
    /// The bus went idle.
    Suspend,
    /// The bus resumed.
    Wakeup,
    /// A SETUP packet arrived on endpoint 0.
    Setup([u8; 8]),
    /// A read finished. The buffer holds the bytes that arrived; `result` is
    /// the byte count, or the reason the read failed.
    ReadComplete {
        ep: EndpointAddress,
        buffer: IoBuffer,
        result: Result<usize>,
    },
    /// A write finished. `result` is the byte count, or the reason the
    /// write failed.
    WriteComplete {
        ep: EndpointAddress,
        buffer: IoBuffer,
        result: Result<usize>,
    },
}

/// A FIFO of [`Event`]s, shared between interrupt and thread context.
///
/// Events come out in the order they went in.
pub struct EventQueue {
    inner: Mutex<RefCell<VecDeque<Event>>>,
}

impl EventQueue {
    /// Create an empty queue, usable in a `static`.
    pub const fn new() -> Self {
        EventQueue {
            inner: Mutex::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Append an event.
    pub fn post(&self, cs: &CriticalSection, event: Event) {
        self.inner.borrow(cs).borrow_mut().push_back(event);
    }

    /// Remove the oldest event.
    pub fn take(&self, cs: &CriticalSection) -> Option<Event> {
        self.inner.borrow(cs).borrow_mut().pop_front()
    }

    /// Indicates that there's nothing to take.
    pub fn is_empty(&self, cs: &CriticalSection) -> bool {
        self.inner.borrow(cs).borrow().is_empty()
    }

    /// Append an event, masking interrupts for the duration.
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub fn post_free(&self, event: Event) {
        cortex_m::interrupt::free(|cs| self.post(cs, event));
    }

    /// Remove the oldest event, masking interrupts for the duration.
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub fn take_free(&self) -> Option<Event> {
        cortex_m::interrupt::free(|cs| self.take(cs))
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
