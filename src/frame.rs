//! Frame codec for the 3964R link procedure.
//!
//! This module converts between raw telegram payloads and the byte stream
//! that goes out on the wire. The procedure is code-transparent: any byte
//! value may appear in a payload. Transparency is achieved by doubling every
//! [`DLE`] inside the payload, so that the single `DLE ETX` sequence at the
//! end is unambiguous.
//!
//! A frame looks like this:
//!
//! ```text
//! payload (every DLE doubled) | DLE ETX | BCC
//! ```
//!
//! The block check character (BCC) is the XOR over the escaped payload and
//! the `DLE ETX` trailer. It is only present in 3964R mode ([`Mode::Bcc`]);
//! the plain 3964 variant ([`Mode::Plain`]) ends at the trailer.
//!
//! [`encode`] and [`decode`] are pure functions over fully collected byte
//! buffers. The incremental detection of the frame end on a live byte
//! stream is the business of the receive step in
//! [`LinkDriver`](crate::driver::LinkDriver), which feeds the collected
//! bytes to [`decode`] once the trailer (and BCC, if any) has been seen.

use crate::bcc::bcc;
use crate::consts::{DLE, ETX, TELEGRAM_MAX_LEN};
use thiserror::Error;

#[cfg(not(feature = "std"))]
use crate::consts::FRAME_MAX_LEN;

/// A telegram payload.
///
/// Bounded by [`TELEGRAM_MAX_LEN`] in `no_std` builds; with the `std`
/// feature this is a plain `Vec<u8>` and the bound is enforced by the
/// codec and by [`LinkDriver::submit`](crate::driver::LinkDriver::submit).
#[cfg(feature = "std")]
pub type Telegram = Vec<u8>;

/// A telegram payload.
///
/// Bounded by [`TELEGRAM_MAX_LEN`] in `no_std` builds; with the `std`
/// feature this is a plain `Vec<u8>` and the bound is enforced by the
/// codec and by [`LinkDriver::submit`](crate::driver::LinkDriver::submit).
#[cfg(not(feature = "std"))]
pub type Telegram = heapless::Vec<u8, TELEGRAM_MAX_LEN>;

/// An encoded frame, or the raw bytes collected while receiving one.
#[cfg(feature = "std")]
pub type FrameBuf = Vec<u8>;

/// An encoded frame, or the raw bytes collected while receiving one.
#[cfg(not(feature = "std"))]
pub type FrameBuf = heapless::Vec<u8, FRAME_MAX_LEN>;

/// Transmission variant of the link procedure.
///
/// The two variants differ only in the block check character: 3964R
/// protects every frame with an XOR checksum, plain 3964 relies on the
/// trailer alone. Both peers must be configured to the same variant.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum Mode {
    /// 3964R: frames end with `DLE ETX` followed by the block check
    /// character.
    #[default]
    Bcc,
    /// Plain 3964: frames end with `DLE ETX`, no block check character.
    Plain,
}

/// Why an incoming frame was rejected.
///
/// Any of these causes the receiver to answer with NAK and return to idle;
/// the variants exist so the rejection can be logged meaningfully and
/// asserted on in tests.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Error)]
pub enum FrameError {
    /// The frame is too short to hold a trailer (and BCC, in 3964R mode).
    #[error("frame too short")]
    Undersize,
    /// The received block check character does not match the frame
    /// contents.
    #[error("block check mismatch (expected {expected:#04x}, found {found:#04x})")]
    BccMismatch {
        /// BCC computed over the received stream.
        expected: u8,
        /// BCC byte the peer actually sent.
        found: u8,
    },
    /// The frame does not end with the `DLE ETX` sequence.
    #[error("missing DLE ETX trailer")]
    MissingTrailer,
    /// The decoded payload exceeds [`TELEGRAM_MAX_LEN`].
    #[error("telegram exceeds maximum length")]
    Overflow,
}

#[cfg(feature = "std")]
pub(crate) fn buf_push(buf: &mut Vec<u8>, byte: u8) -> bool {
    buf.push(byte);
    true
}

#[cfg(not(feature = "std"))]
pub(crate) fn buf_push<const N: usize>(buf: &mut heapless::Vec<u8, N>, byte: u8) -> bool {
    buf.push(byte).is_ok()
}

/// Encodes a telegram payload into a wire frame.
///
/// Every `DLE` in the payload is doubled, the `DLE ETX` trailer is
/// appended, and in [`Mode::Bcc`] the XOR block check over everything
/// produced so far is added as the final byte.
///
/// The payload must not exceed [`TELEGRAM_MAX_LEN`]; the driver guarantees
/// this for everything that reaches its send buffer.
pub fn encode(telegram: &[u8], mode: Mode) -> FrameBuf {
    debug_assert!(telegram.len() <= TELEGRAM_MAX_LEN);
    let mut frame = FrameBuf::new();
    for &byte in telegram {
        let _ = buf_push(&mut frame, byte);
        if byte == DLE {
            let _ = buf_push(&mut frame, DLE);
        }
    }
    let _ = buf_push(&mut frame, DLE);
    let _ = buf_push(&mut frame, ETX);
    if mode == Mode::Bcc {
        let check = bcc(&frame);
        let _ = buf_push(&mut frame, check);
    }
    frame
}

/// Decodes a fully collected wire frame back into the telegram payload.
///
/// In [`Mode::Bcc`] the last byte is taken as the received BCC and checked
/// against the XOR over the rest of the frame before the trailer is
/// inspected. The trailing `DLE ETX` is stripped and every doubled `DLE`
/// collapses back into one.
pub fn decode(raw: &[u8], mode: Mode) -> Result<Telegram, FrameError> {
    let stream = match mode {
        Mode::Bcc => {
            if raw.len() < 3 {
                return Err(FrameError::Undersize);
            }
            let (stream, check) = raw.split_at(raw.len() - 1);
            let expected = bcc(stream);
            if expected != check[0] {
                return Err(FrameError::BccMismatch {
                    expected,
                    found: check[0],
                });
            }
            stream
        }
        Mode::Plain => {
            if raw.len() < 2 {
                return Err(FrameError::Undersize);
            }
            raw
        }
    };
    if stream[stream.len() - 2..] != [DLE, ETX] {
        return Err(FrameError::MissingTrailer);
    }
    let body = &stream[..stream.len() - 2];
    let mut telegram = Telegram::new();
    let mut i = 0;
    while i < body.len() {
        let byte = body[i];
        if telegram.len() == TELEGRAM_MAX_LEN || !buf_push(&mut telegram, byte) {
            return Err(FrameError::Overflow);
        }
        if byte == DLE && body.get(i + 1) == Some(&DLE) {
            i += 2;
        } else {
            i += 1;
        }
    }
    Ok(telegram)
}
