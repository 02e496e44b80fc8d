//! Errors returned at the API boundary
//!
//! Failures inside a control transfer never surface through these types;
//! they end as a STALL on endpoint 0. These errors are for the callers of
//! the registration and application APIs.

use core::fmt;
use usb_device::UsbError;

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the device context, the routing tables, and the
/// descriptor registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The slot or key is already claimed.
    AlreadyConfigured,
    /// The slot or key was never claimed.
    NotConfigured,
    /// The lookup found nothing.
    NotFound,
    /// A parameter is out of range or malformed.
    InvalidParams,
    /// The caller doesn't own the slot it tried to release.
    AccessDenied,
    /// The request isn't handled by this driver.
    NotSupported,
    /// The device context isn't open.
    NotActive,
    /// A buffer allocation failed.
    OutOfMemory,
    /// The I/O was flushed before it completed.
    Cancelled,
    /// The hardware driver reported a failure.
    Usb(UsbError),
}

impl From<UsbError> for Error {
    fn from(err: UsbError) -> Self {
        Error::Usb(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadyConfigured => f.write_str("already configured"),
            Error::NotConfigured => f.write_str("not configured"),
            Error::NotFound => f.write_str("not found"),
            Error::InvalidParams => f.write_str("invalid parameters"),
            Error::AccessDenied => f.write_str("access denied"),
            Error::NotSupported => f.write_str("not supported"),
            Error::NotActive => f.write_str("device not open"),
            Error::OutOfMemory => f.write_str("out of memory"),
            Error::Cancelled => f.write_str("cancelled"),
            Error::Usb(err) => write!(f, "hardware error: {:?}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use usb_device::UsbError;

    #[test]
    fn hardware_errors_convert() {
        let err: Error = UsbError::InvalidEndpoint.into();
        assert_eq!(err, Error::Usb(UsbError::InvalidEndpoint));
    }

    #[test]
    fn display() {
        assert_eq!(Error::AccessDenied.to_string(), "access denied");
        assert_eq!(
            Error::Usb(UsbError::WouldBlock).to_string(),
            "hardware error: WouldBlock"
        );
    }
}
