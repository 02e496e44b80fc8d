//! A USB device control-transfer engine and class-dispatch framework
//!
//! `usbd-core` sits between a USB device controller driver and a set of USB
//! class drivers. It enumerates the device for the host, answers the USB
//! chapter 9 standard requests, and routes class and vendor requests, and
//! endpoint completions, to the class driver that claimed the interface.
//!
//! The controller driver implements [`UsbHardware`], and reports what it
//! observes as [`Event`]s. Class drivers implement [`ClassDriver`]. The
//! [`Usbd`] device context ties them together in a single-threaded message
//! loop: it never blocks, and it never touches controller registers.
//!
//! # Example
//!
//! A class driver that claims interface 0, and echoes what it reads.
//!
//! ```
//! use usbd_core::{
//!     descriptor::Configuration, ClassContext, ClassDriver, ClassMessage, Result,
//! };
//! use usb_device::{endpoint::EndpointType, UsbDirection};
//!
//! struct Echo;
//!
//! impl ClassDriver for Echo {
//!     fn configured(&mut self, ctx: &mut ClassContext<'_>, config: &Configuration<'_>) -> Result<()> {
//!         if config.interface(0, 0).is_none() {
//!             return Ok(());
//!         }
//!         ctx.register_interface(0)?;
//!         for ep in config.endpoints(0, 0) {
//!             ctx.register_endpoint(0, ep.address, EndpointType::Bulk, ep.max_packet_size)?;
//!         }
//!         Ok(())
//!     }
//!
//!     fn request(&mut self, ctx: &mut ClassContext<'_>, _: u8, message: ClassMessage) {
//!         if let ClassMessage::ReadComplete { ep, buffer, result: Ok(_) } = message {
//!             let ep_in = usb_device::endpoint::EndpointAddress::from_parts(ep.index(), UsbDirection::In);
//!             ctx.hardware().ep_write(ep_in, buffer);
//!         }
//!     }
//! }
//! ```
//!
//! Register the descriptors and the class, then open the context:
//!
//! ```
//! # use usbd_core::{IoBuffer, Speed, UsbHardware};
//! # use usb_device::endpoint::{EndpointAddress, EndpointType};
//! # struct Controller;
//! # impl UsbHardware for Controller {
//! #     fn ep_open(&mut self, _: EndpointAddress, _: EndpointType, _: u16) {}
//! #     fn ep_close(&mut self, _: EndpointAddress) {}
//! #     fn ep_flush(&mut self, _: EndpointAddress) -> Option<IoBuffer> { None }
//! #     fn ep_set_stall(&mut self, _: EndpointAddress) {}
//! #     fn ep_clear_stall(&mut self, _: EndpointAddress) {}
//! #     fn ep_is_stall(&self, _: EndpointAddress) -> bool { false }
//! #     fn ep_read(&mut self, _: EndpointAddress, _: IoBuffer, _: usize) {}
//! #     fn ep_write(&mut self, _: EndpointAddress, _: IoBuffer) {}
//! #     fn set_address(&mut self, _: u8) {}
//! #     fn speed(&self) -> Speed { Speed::Full }
//! # }
//! # struct Echo;
//! # impl usbd_core::ClassDriver for Echo {}
//! use usbd_core::{descriptor::descriptor_type, Config, Event, Usbd};
//!
//! # #[rustfmt::skip]
//! static DEVICE: [u8; 18] = [
//!     18, 1, 0x00, 0x02, 0, 0, 0, 64,
//!     0x09, 0x12, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 1,
//! ];
//! static CONFIGURATION: [u8; 9] = [9, 2, 9, 0, 0, 1, 0, 0x80, 50];
//!
//! let mut usbd = Usbd::new(Controller, Config::default())?;
//! usbd.register_descriptor(descriptor_type::DEVICE, 0, 0, &DEVICE)?;
//! usbd.register_descriptor(descriptor_type::CONFIGURATION, 0, 0, &CONFIGURATION)?;
//! usbd.add_class(Echo)?;
//! usbd.open()?;
//!
//! // Events come from the controller's interrupt handler, through an EventQueue.
//! usbd.handle_event(Event::Reset(Speed::Full))?;
//! # Ok::<(), usbd_core::Error>(())
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
mod log;

mod buffer;
mod class;
mod config;
mod control;
mod device;
mod error;
mod event;
mod hardware;
mod notify;
mod setup;
mod standard;
mod table;

pub mod descriptor;

#[cfg(test)]
mod mock;

pub use buffer::IoBuffer;
pub use class::{ClassContext, ClassDriver, ClassId, ClassMessage, Stub, VendorHandler};
pub use config::Config;
pub use control::SetupState;
pub use device::{DeviceFeatures, DeviceState, Usbd};
pub use error::{Error, Result};
pub use event::{Event, EventQueue};
pub use hardware::{Speed, UsbHardware};
pub use notify::Notification;
pub use setup::{feature, request, SetupPacket};
