//! Serial port abstraction for the link driver.
//!
//! The driver owns its serial channel exclusively and talks to it through
//! the [`SerialLink`] trait: single-byte non-blocking reads, blocking
//! writes, and the ability to *discard* whatever is pending in either
//! direction. The discard operations are the reason this crate defines its
//! own trait instead of reusing the `embedded-hal-nb`/`embedded-io` serial
//! traits: 3964R error recovery purges both directions before emitting NAK,
//! and those traits have no notion of throwing buffered bytes away.
//!
//! Implement [`SerialLink`] over your UART driver or OS serial port handle
//! (for `serialport`-style APIs, `purge_rx`/`purge_tx` map onto the input
//! and output buffer clears). For tests and simulations the crate ships
//! [`MemoryLink`], an in-memory port with scriptable receive bytes and an
//! inspectable transmit log.

#[cfg(feature = "std")]
use core::convert::Infallible;
#[cfg(feature = "std")]
use std::collections::VecDeque;

/// A byte channel to the peer device.
///
/// `read` is non-blocking in the `nb` sense: it returns
/// [`nb::Error::WouldBlock`] when no byte is pending, which the driver uses
/// to poll from `tick()` without stalling. Writes may block until the byte
/// is handed to the hardware; 3964R frames are short and the driver never
/// writes more than one frame per tick.
///
/// Transport-level failures surface through the associated `Error` type and
/// propagate out of [`tick()`](crate::driver::LinkDriver::tick); they are
/// distinct from protocol-level failures, which the driver handles
/// internally with NAK and retry.
pub trait SerialLink {
    /// Transport error reported by the underlying serial device.
    type Error: core::fmt::Debug;

    /// Reads one byte, or [`nb::Error::WouldBlock`] if none is pending.
    fn read(&mut self) -> nb::Result<u8, Self::Error>;

    /// Returns whether at least one byte is pending without consuming it.
    fn readable(&mut self) -> Result<bool, Self::Error>;

    /// Writes one byte.
    fn write(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Writes a whole buffer.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        for &byte in bytes {
            self.write(byte)?;
        }
        Ok(())
    }

    /// Discards everything received but not yet read.
    fn purge_rx(&mut self) -> Result<(), Self::Error>;

    /// Discards everything written but not yet transmitted.
    fn purge_tx(&mut self) -> Result<(), Self::Error>;
}

/// An in-memory [`SerialLink`] for tests, examples, and simulations.
///
/// Bytes "from the peer" are queued with [`feed`](MemoryLink::feed) and
/// consumed by the driver; everything the driver writes accumulates in
/// [`tx`](MemoryLink::tx) until inspected or purged. Purge calls are
/// counted so tests can assert on flush behavior.
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct MemoryLink {
    /// Bytes waiting to be read by the driver.
    pub rx: VecDeque<u8>,
    /// Bytes written by the driver, in order.
    pub tx: Vec<u8>,
    /// Number of receive-side purges.
    pub rx_purged: u32,
    /// Number of transmit-side purges.
    pub tx_purged: u32,
}

#[cfg(feature = "std")]
impl MemoryLink {
    /// Creates an empty port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes for the driver to read, as if the peer had sent them.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Takes and clears everything the driver has written so far.
    pub fn take_tx(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.tx)
    }
}

#[cfg(feature = "std")]
impl SerialLink for MemoryLink {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn readable(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.tx.push(byte);
        Ok(())
    }

    fn purge_rx(&mut self) -> Result<(), Self::Error> {
        self.rx.clear();
        self.rx_purged += 1;
        Ok(())
    }

    fn purge_tx(&mut self) -> Result<(), Self::Error> {
        self.tx.clear();
        self.tx_purged += 1;
        Ok(())
    }
}
