//! Engine logging, contingent on the hidden `__log` feature
//!
//! `trace!` covers every SETUP packet, `debug!` the device state changes,
//! and `warn!` every STALL and every aborted or stray transfer. Without
//! `__log`, the macros expand to nothing.
//!
//! Don't route the logger over the USB device that this engine drives.

macro_rules! trace {
    ($($args:tt)*) => {
        #[cfg(feature = "__log")]
        ::__log::trace!($($args)*)
    };
}

macro_rules! debug {
    ($($args:tt)*) => {
        #[cfg(feature = "__log")]
        ::__log::debug!($($args)*)
    };
}

macro_rules! warn {
    ($($args:tt)*) => {
        #[cfg(feature = "__log")]
        ::__log::warn!($($args)*)
    };
}
