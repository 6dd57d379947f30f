//! Constants used across the 3964R link procedure implementation.
//!
//! This module defines the protocol control bytes, the default timing
//! constants, the retry caps, and the buffer sizing used by the driver and
//! the frame codec.
//!
//! The timing constants carry the names they have in the classic 3964R
//! documentation (QVZ, ZVZ, BWZ, CWZ); the defaults follow the values used
//! by Siemens and Buderus peripherals. All of them can be overridden per
//! driver through [`Config`](crate::driver::Config).
//!
//! ## Key Concepts
//!
//! - **Control bytes**: STX/ETX/DLE/NAK, taken from DIN 66003 and sent as
//!   8-bit characters.
//! - **Timeouts**: how long the driver waits for an acknowledgement (QVZ),
//!   for the next character of a frame (ZVZ), and before retrying a failed
//!   block (BWZ) or connection (CWZ).
//! - **Retry caps**: how often a data block or connection attempt is retried
//!   before the telegram is abandoned.
//! - **Buffer sizing**: maximum telegram length and the frame length derived
//!   from it (worst case: every payload byte is a doubled DLE, plus the
//!   `DLE ETX` trailer and the block check character).

use core::time::Duration;

/// Start of text, opens the connection handshake.
pub const STX: u8 = 0x02;

/// End of text, second byte of the `DLE ETX` frame trailer.
pub const ETX: u8 = 0x03;

/// Data link escape, doubled inside payloads and used as the positive
/// acknowledgement character.
pub const DLE: u8 = 0x10;

/// Negative acknowledgement, emitted in runs of three on every error exit.
pub const NAK: u8 = 0x15;

/// Default acknowledgement timeout (QVZ, "Quittungsverzugszeit").
///
/// How long the peer may take to answer an STX or a completed data block
/// with DLE before the attempt counts as failed.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Default inter-character timeout (ZVZ, "Zeichenverzugszeit").
///
/// The longest gap allowed between two characters of an incoming frame, and
/// between our ready-to-receive DLE and the first data byte.
pub const CHAR_TIMEOUT: Duration = Duration::from_millis(220);

/// Default block retry wait (BWZ, "Blockwartezeit").
///
/// Applied after a data block was sent but not acknowledged; the next send
/// attempt is not started before this much time has passed.
pub const BLOCK_RETRY_WAIT: Duration = Duration::from_millis(4_000);

/// Default connect retry wait (CWZ).
///
/// Applied after a failed connection attempt; the next STX is not emitted
/// before this much time has passed.
pub const CONNECT_RETRY_WAIT: Duration = Duration::from_millis(3_000);

/// Default send cooldown after a successfully delivered telegram.
///
/// Gives the peer room to start a connection of its own between two of our
/// transmissions.
pub const SEND_COOLDOWN: Duration = Duration::from_millis(500);

/// Default delay before answering the peer's STX with our DLE.
///
/// Must stay strictly below the *peer's* acknowledgement timeout; the
/// default leaves 600 ms of margin against the default QVZ.
pub const ACK_DELAY: Duration = Duration::from_millis(1_400);

/// How often a data block is re-sent before the telegram is abandoned.
pub const MAX_SEND_RETRIES: u8 = 6;

/// How often a connection is re-attempted before the telegram is abandoned.
pub const MAX_CONNECT_RETRIES: u8 = 6;

/// Maximum length (in bytes) of a single telegram payload.
///
/// Applies to outgoing telegrams (longer submissions are rejected) and to
/// decoded incoming telegrams (longer frames are rejected as
/// [`FrameError::Overflow`](crate::frame::FrameError::Overflow)).
pub const TELEGRAM_MAX_LEN: usize = 128;

/// Maximum length (in bytes) of an encoded frame.
///
/// Worst case: every payload byte is a DLE and gets doubled, plus the
/// `DLE ETX` trailer and one block check character.
pub const FRAME_MAX_LEN: usize = TELEGRAM_MAX_LEN * 2 + 3;

/// Capacity of the outbound job queue in `no_std` builds.
///
/// With the `std` feature enabled the queue is unbounded and this constant
/// is not used for sizing.
pub const JOB_QUEUE_DEPTH: usize = 8;
