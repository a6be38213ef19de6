//! Bounded-retry transport over an async I2C bus.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::{BusError, MAX_FRAME_LEN, RETRY_BACKOFF_MS, TRANSFER_ATTEMPTS};

/// Bookkeeping for one touchkey controller on the bus.
///
/// A handle is created when the device is probed and invalidated when it is
/// removed or when probing fails. Transfers are only attempted while the
/// handle is both `enabled` (the controller is powered) and `probed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    address: SevenBitAddress,
    enabled: bool,
    probed: bool,
}

impl DeviceHandle {
    /// Creates a handle for a freshly probed, still unpowered device.
    pub const fn new(address: SevenBitAddress) -> Self {
        Self {
            address,
            enabled: false,
            probed: true,
        }
    }

    /// The 7-bit bus address.
    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    /// Whether the controller is currently powered and accepting transfers.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the handle is still valid.
    pub fn is_probed(&self) -> bool {
        self.probed
    }

    /// Both preconditions for bus access hold.
    pub fn is_ready(&self) -> bool {
        self.enabled && self.probed
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Marks the handle as unusable. Only a new probe makes it valid again.
    pub fn invalidate(&mut self) {
        self.probed = false;
    }
}

/// Register-frame transport for the touchkey controller.
///
/// Owns the bus, a delay provider used for retry backoff and the
/// [`DeviceHandle`]. Every call makes at most [`TRANSFER_ATTEMPTS`] attempts,
/// sleeping [`RETRY_BACKOFF_MS`] after each failed one.
pub struct TouchkeyBus<I2cType, D> {
    i2c: I2cType,
    delay: D,
    handle: DeviceHandle,
}

impl<I2cType, ErrorType, D> TouchkeyBus<I2cType, D>
where
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
    D: DelayNs,
{
    /// Creates a new transport.
    ///
    /// # Arguments
    ///
    /// * `i2c` - An I2C peripheral that implements `embedded-hal-async::i2c::I2c`.
    /// * `delay` - A delay provider, e.g. `embassy_time::Delay`.
    /// * `address` - The controller's 7-bit address.
    pub fn new(i2c: I2cType, delay: D, address: SevenBitAddress) -> Self {
        Self {
            i2c,
            delay,
            handle: DeviceHandle::new(address),
        }
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut DeviceHandle {
        &mut self.handle
    }

    /// Sleeps using the transport's delay provider.
    ///
    /// The driver shares the transport's delay for its own settle times so
    /// that all blocking waits go through one provider.
    pub async fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }

    /// Reads `buf.len()` bytes of the status frame starting at `register`.
    ///
    /// The controller always streams its frame from offset zero, so the
    /// leading `register` bytes are read and discarded. A failed transfer is
    /// never partially copied into `buf`.
    pub async fn read(&mut self, register: u8, buf: &mut [u8]) -> Result<(), BusError<ErrorType>> {
        self.ensure_ready()?;

        let offset = register as usize;
        let len = offset + buf.len();
        if len > MAX_FRAME_LEN {
            return Err(BusError::FrameTooLong);
        }

        let mut frame = [0u8; MAX_FRAME_LEN];
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.i2c.read(self.handle.address, &mut frame[..len]).await {
                Ok(()) => {
                    buf.copy_from_slice(&frame[offset..len]);
                    return Ok(());
                }
                Err(err) => {
                    log::warn!("touchkey: read attempt {attempt} failed: {err:?}");
                    self.delay.delay_ms(RETRY_BACKOFF_MS).await;
                    if attempt >= TRANSFER_ATTEMPTS {
                        return Err(BusError::Transfer(err));
                    }
                }
            }
        }
    }

    /// Reads a fixed-size slice of the status frame.
    pub async fn read_frame<const N: usize>(
        &mut self,
        register: u8,
    ) -> Result<[u8; N], BusError<ErrorType>> {
        let mut buf = [0u8; N];
        self.read(register, &mut buf).await?;
        Ok(buf)
    }

    /// Writes a raw command to the controller.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), BusError<ErrorType>> {
        self.ensure_ready()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.i2c.write(self.handle.address, bytes).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log::warn!("touchkey: write attempt {attempt} failed: {err:?}");
                    self.delay.delay_ms(RETRY_BACKOFF_MS).await;
                    if attempt >= TRANSFER_ATTEMPTS {
                        return Err(BusError::Transfer(err));
                    }
                }
            }
        }
    }

    /// Gives back the bus and the delay provider.
    pub fn release(self) -> (I2cType, D) {
        (self.i2c, self.delay)
    }

    fn ensure_ready(&self) -> Result<(), BusError<ErrorType>> {
        if self.handle.is_ready() {
            Ok(())
        } else {
            log::error!(
                "touchkey: not ready (enabled: {}, probed: {})",
                self.handle.enabled,
                self.handle.probed
            );
            Err(BusError::NotReady)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    struct ScriptedI2c {
        failures_left: u8,
        attempts: u8,
        frame: [u8; 8],
        written: [u8; 4],
        written_len: usize,
    }

    impl ScriptedI2c {
        fn failing(failures: u8) -> Self {
            Self {
                failures_left: failures,
                attempts: 0,
                frame: [0x09, 0x0A, 0x03, 0x44, 0x55, 0x66, 0x77, 0x88],
                written: [0; 4],
                written_len: 0,
            }
        }
    }

    impl ErrorType for ScriptedI2c {
        type Error = ErrorKind;
    }

    impl I2c for ScriptedI2c {
        async fn transaction(
            &mut self,
            address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            assert_eq!(address, 0x20);
            self.attempts += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                match op {
                    Operation::Read(buf) => {
                        let len = buf.len();
                        buf.copy_from_slice(&self.frame[..len]);
                    }
                    Operation::Write(bytes) => {
                        self.written[..bytes.len()].copy_from_slice(bytes);
                        self.written_len = bytes.len();
                    }
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        total_ns: u64,
    }

    impl DelayNs for CountingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_ns += ns as u64;
        }
    }

    fn ready_bus(failures: u8) -> TouchkeyBus<ScriptedI2c, CountingDelay> {
        let mut bus = TouchkeyBus::new(
            ScriptedI2c::failing(failures),
            CountingDelay::default(),
            crate::TOUCHKEY_ADDRESS,
        );
        bus.handle_mut().set_enabled(true);
        bus
    }

    #[test]
    fn not_ready_never_touches_the_bus() {
        let mut bus = TouchkeyBus::new(
            ScriptedI2c::failing(0),
            CountingDelay::default(),
            crate::TOUCHKEY_ADDRESS,
        );
        let res = block_on(bus.write(&[1]));
        assert_eq!(res, Err(BusError::NotReady));

        bus.handle_mut().set_enabled(true);
        bus.handle_mut().invalidate();
        let res = block_on(bus.read_frame::<3>(0));
        assert_eq!(res, Err(BusError::NotReady));

        let (i2c, delay) = bus.release();
        assert_eq!(i2c.attempts, 0);
        assert_eq!(delay.total_ns, 0);
    }

    #[test]
    fn two_failures_exhaust_the_attempts() {
        // Would succeed on a third attempt, which must never be made.
        let mut bus = ready_bus(2);
        let res = block_on(bus.write(&[1]));
        assert!(matches!(res, Err(BusError::Transfer(ErrorKind::NoAcknowledge(_)))));

        let (i2c, delay) = bus.release();
        assert_eq!(i2c.attempts, 2);
        assert_eq!(i2c.written_len, 0);
        assert_eq!(delay.total_ns, 2 * 10_000_000);
    }

    #[test]
    fn one_failure_is_retried_after_backoff() {
        let mut bus = ready_bus(1);
        block_on(bus.write(&[2])).unwrap();

        let (i2c, delay) = bus.release();
        assert_eq!(i2c.attempts, 2);
        assert_eq!(&i2c.written[..i2c.written_len], &[2]);
        assert_eq!(delay.total_ns, 10_000_000);
    }

    #[test]
    fn reads_at_an_offset_of_the_frame() {
        let mut bus = ready_bus(0);
        let versions: [u8; 2] = block_on(bus.read_frame(1)).unwrap();
        assert_eq!(versions, [0x0A, 0x03]);

        let status: [u8; 3] = block_on(bus.read_frame(0)).unwrap();
        assert_eq!(status, [0x09, 0x0A, 0x03]);
    }

    #[test]
    fn oversized_frames_are_rejected_up_front() {
        let mut bus = ready_bus(0);
        let mut buf = [0u8; 8];
        let res = block_on(bus.read(30, &mut buf));
        assert_eq!(res, Err(BusError::FrameTooLong));
        assert_eq!(bus.release().0.attempts, 0);
    }
}
