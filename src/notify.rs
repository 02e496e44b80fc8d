//! Notifications for the application that owns the device context

use crate::{buffer::IoBuffer, setup::SetupPacket};

/// An informational alert, drained with
/// [`Usbd::poll_notification()`](crate::Usbd::poll_notification).
#[derive(Debug, PartialEq, Eq)]
pub enum Notification {
    /// The host reset the bus.
    Reset,
    /// The bus was suspended while configured.
    Suspend,
    /// The bus resumed while configured.
    Resume,
    /// The host selected a configuration.
    Configured(u8),
    /// A vendor request is waiting for
    /// [`Usbd::vendor_response()`](crate::Usbd::vendor_response).
    ///
    /// `data` holds the data stage of a host-to-device request.
    VendorRequest {
        setup: SetupPacket,
        data: Option<IoBuffer>,
    },
    /// A class driver forwarded something to the application.
    User { iface: u8, cmd: u32, param: u32 },
}
