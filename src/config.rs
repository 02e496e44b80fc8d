//! Device context configuration

use crate::hardware::Speed;

/// Sizing and defaults for a [`Usbd`](crate::Usbd) device context.
///
/// ```
/// use usbd_core::{Config, Speed};
///
/// let config = Config {
///     natural_speed: Speed::High,
///     ..Config::default()
/// };
/// assert_eq!(config.control_buffer_size, 256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Size of the control transfer buffer.
    ///
    /// Bounds the largest descriptor, class or vendor payload that can
    /// travel over endpoint 0 in a single transfer.
    pub control_buffer_size: usize,
    /// Number of interface table slots.
    pub max_interfaces: usize,
    /// Number of endpoint numbers, including endpoint 0. Each number has an
    /// IN and an OUT slot.
    pub max_endpoints: usize,
    /// The speed that the registered `DEVICE` and `CONFIGURATION`
    /// descriptors describe.
    pub natural_speed: Speed,
    /// Initial self-powered status, until a configuration says otherwise.
    pub self_powered: bool,
}

impl Config {
    /// Defaults for a full-speed, bus-powered device.
    pub const fn new() -> Self {
        Config {
            control_buffer_size: 256,
            max_interfaces: 8,
            max_endpoints: 16,
            natural_speed: Speed::Full,
            self_powered: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
