//! Timing sources and tick scheduling for the link driver.
//!
//! The 3964R procedure is timed against the wall clock: acknowledgement
//! and inter-character timeouts, retry waits, and the short pause before
//! our own DLE acknowledgement are all measured in real time, not in tick
//! counts. The driver therefore reads time through the [`Clock`] trait and
//! leaves the choice of timebase to the host:
//!
//! - [`StdClock`] (`std` feature): backed by [`std::time::Instant`].
//! - [`ManualClock`]: a counter the host advances itself, typically from a
//!   hardware timer interrupt on `no_std` targets, or explicitly in tests.
//!
//! How `tick()` gets called is equally host-specific. Two helpers are
//! provided behind feature gates:
//!
//! - `delay-loop`: [`run_link_tick_loop`], a blocking polling loop driven
//!   by an `embedded_hal::delay::DelayNs` provider.
//! - `timer-isr`: a `critical_section`-guarded global driver singleton
//!   ([`global_link_init`], [`global_link_setup`], [`global_link_tick`],
//!   [`submit_to_global_link`]) plus declaration and servicing macros
//!   (`init_link_driver!`, `setup_link_driver!`, `tick_link_timer!`,
//!   `submit_to_link!`), for hosts that tick from an interrupt or a
//!   dedicated thread while other contexts submit telegrams.
//!
//! A tick interval of a few milliseconds is plenty: the shortest protocol
//! timeout is the 220 ms inter-character window, and whole frames are
//! drained in a single tick once they sit in the receive buffer.

use core::cell::Cell;
use core::time::Duration;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// A monotonic time source.
///
/// `now` returns the time elapsed since an arbitrary fixed origin (driver
/// construction, boot, whatever the implementation picks). The driver only
/// ever subtracts readings, so the origin does not matter; the reading must
/// never go backwards.
pub trait Clock {
    /// Monotonic time since the clock's origin.
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Creates a clock whose origin is "now".
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// [`Clock`] advanced explicitly by the host.
///
/// On `no_std` targets this is typically fed from a periodic timer
/// interrupt (`advance` once per timer period); in tests it makes timeout
/// behavior fully deterministic. The internal `Cell` keeps `advance` and
/// `set` callable through a shared reference, so the clock can be read and
/// driven from the same critical section that owns the driver.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub const fn new() -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }

    /// Sets the absolute reading.
    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_sets() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(220));
        clock.advance(Duration::from_millis(30));
        assert_eq!(clock.now(), Duration::from_millis(250));
        clock.set(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[cfg(feature = "std")]
    #[test]
    fn std_clock_is_monotonic() {
        let clock = StdClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
