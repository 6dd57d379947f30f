use crate::driver::{LinkDriver, LinkHandler};
use crate::port::SerialLink;
use crate::timer::Clock;
use embedded_hal::delay::DelayNs;

/// Runs a blocking loop that repeatedly calls `tick()` on the link driver.
///
/// This is the simplest way to drive the procedure in environments without
/// interrupts or threads: the delay provider paces the polling. The loop
/// only returns when the serial port reports a transport error; protocol
/// errors are handled inside the driver and never end the loop.
///
/// # Arguments
/// - `driver`: the link driver to service.
/// - `delay`: a delay provider implementing `embedded_hal::delay::DelayNs`.
/// - `tick_ms`: pause between ticks, in milliseconds. A few milliseconds is
///   sufficient; it only has to be comfortably below the 220 ms
///   inter-character window.
///
/// # Notes
/// - The driver is borrowed mutably for the lifetime of the loop, so
///   telegrams can only be submitted from elsewhere through a shared
///   handle established beforehand (see the `timer-isr` helpers).
pub fn run_link_tick_loop<D, S, C, H>(
    driver: &mut LinkDriver<S, C, H>,
    delay: &mut D,
    tick_ms: u32,
) -> Result<(), S::Error>
where
    D: DelayNs,
    S: SerialLink,
    C: Clock,
    H: LinkHandler,
{
    loop {
        driver.tick()?;
        delay.delay_ms(tick_ms);
    }
}
