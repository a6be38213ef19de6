//! Error types.

use core::fmt;

use touchkey_bus_async::BusError;

use crate::board::Rail;

/// Errors surfaced by the touchkey driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The device is not enabled and probed. No bus access was attempted.
    NotReady,
    /// A bus transfer failed after exhausting its retries.
    BusTransferFailed(E),
    /// The controller reported a keycode outside the key map.
    InvalidKeycode(u8),
    /// A power rail could not be looked up.
    RegulatorUnavailable(Rail),
    /// Every firmware flash attempt failed.
    FirmwareUpdateFailed,
    /// A read asked for more than one status frame holds.
    FrameTooLong,
}

impl<E> From<BusError<E>> for Error<E> {
    fn from(err: BusError<E>) -> Self {
        match err {
            BusError::NotReady => Error::NotReady,
            BusError::Transfer(e) => Error::BusTransferFailed(e),
            BusError::FrameTooLong => Error::FrameTooLong,
        }
    }
}

/// A power rail lookup failed. Returned by [`Board`](crate::Board) rail operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegulatorUnavailable(pub Rail);

impl<E> From<RegulatorUnavailable> for Error<E> {
    fn from(err: RegulatorUnavailable) -> Self {
        Error::RegulatorUnavailable(err.0)
    }
}

/// Rejected control-plane input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The value could not be parsed or is out of range.
    Invalid,
    /// The attribute is read-only or write-only.
    NotSupported,
    /// No attribute with that name exists.
    UnknownAttribute,
    /// The controller did not answer.
    Device,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => f.write_str("invalid value"),
            Self::NotSupported => f.write_str("operation not supported"),
            Self::UnknownAttribute => f.write_str("unknown attribute"),
            Self::Device => f.write_str("device not responding"),
        }
    }
}
