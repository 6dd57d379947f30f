//! # r3964
//!
//! A portable, no_std Rust driver for the 3964R / 3964 point-to-point
//! serial link procedure used by Siemens and Buderus PLC peripherals over
//! RS-232.
//!
//! This driver implements the full procedure in software:
//! - STX/DLE connection handshake with priority-based collision
//!   arbitration
//! - code-transparent framing (every payload DLE doubled, `DLE ETX`
//!   trailer, optional XOR block check character)
//! - acknowledgement, inter-character, and retry timing (QVZ, ZVZ, BWZ,
//!   CWZ) with configurable retry caps
//! - NAK-based error recovery and a clean "telegram abandoned" upcall once
//!   the caps are exhausted
//!
//! The physical serial port stays outside the crate behind the
//! [`SerialLink`](crate::port::SerialLink) trait, and time comes from a
//! [`Clock`](crate::timer::Clock), so the same driver runs on a bare-metal
//! UART with a hardware timer tick or on a desktop against an OS serial
//! port.
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std` (default) | Unbounded `Vec` buffers, [`StdClock`](crate::timer::StdClock), the [`MemoryLink`](crate::port::MemoryLink) test port |
//! | `timer-isr` (default) | `critical_section`-guarded global driver singleton plus declaration/servicing macros |
//! | `delay-loop` | Blocking polling loop over `embedded_hal::delay::DelayNs` |
//!
//! ## Usage
//!
//! ```rust
//! use r3964::driver::{Config, LinkDriver, LinkHandler};
//! use r3964::port::MemoryLink;
//! use r3964::timer::ManualClock;
//!
//! struct Printer;
//!
//! impl LinkHandler for Printer {
//!     fn on_read_success(&mut self, telegram: &[u8]) {
//!         println!("peer sent {telegram:02x?}");
//!     }
//! }
//!
//! let mut link = LinkDriver::new(
//!     MemoryLink::new(),
//!     ManualClock::new(),
//!     Printer,
//!     Config::default(),
//! )
//! .unwrap();
//! link.submit(&[0x31, 0x32]);
//! loop {
//!     link.tick().unwrap(); // call every few milliseconds
//!     # break; // the example has no peer to answer
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - The two peers of a link must agree on the framing variant
//!   ([`Mode`](crate::frame::Mode)) and be configured with *complementary*
//!   [`Priority`](crate::driver::Priority) values.
//! - `tick()` should run every few milliseconds; the tightest protocol
//!   deadline is the 220 ms inter-character window.
//! - Telegrams may be submitted from other threads or interrupt handlers;
//!   everything else belongs to the tick context. See [`crate::timer`] for
//!   the global-singleton helpers.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded
//! environments; the `std` feature is for desktop hosts and tests.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "timer-isr")]
pub use critical_section;

#[cfg(not(feature = "std"))]
pub use heapless;

pub(crate) mod bcc;
pub mod consts;
pub mod driver;
pub mod frame;
pub mod port;
pub mod queue;
pub mod timer;
