//! Error type for the touchkey transport.

use embedded_hal::i2c::{Error, ErrorKind};

/// An error returned by [`TouchkeyBus`](crate::TouchkeyBus) operations.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BusError<E> {
    /// The device handle is not both enabled and probed. No bus access was attempted.
    NotReady,
    /// Every attempt failed; carries the error of the last one.
    Transfer(E),
    /// The requested offset and length do not fit in a single frame.
    FrameTooLong,
}

impl<E> BusError<E> {
    /// Returns `true` if the error came from the bus rather than from a precondition.
    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::Transfer(_))
    }
}

impl<E> Error for BusError<E>
where
    E: Error,
{
    #[inline]
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Transfer(e) => e.kind(),
            Self::NotReady | Self::FrameTooLong => ErrorKind::Other,
        }
    }
}
