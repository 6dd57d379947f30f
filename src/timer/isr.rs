use crate::driver::{LinkDriver, LinkHandler};
use crate::port::SerialLink;
use crate::timer::Clock;
use core::cell::RefCell;
use critical_section::Mutex;

/// Creates the empty global driver slot for interrupt-driven servicing.
///
/// Declare the singleton as a `static`, fill it with
/// [`global_link_setup`], then service it from a timer interrupt with
/// [`global_link_tick`] while other contexts enqueue telegrams through
/// [`submit_to_global_link`].
///
/// # Example
/// ```rust
/// use core::cell::RefCell;
/// use critical_section::Mutex;
/// use r3964::driver::LinkDriver;
/// use r3964::port::MemoryLink;
/// use r3964::timer::{ManualClock, global_link_init};
///
/// static LINK: Mutex<RefCell<Option<LinkDriver<MemoryLink, ManualClock, ()>>>> =
///     global_link_init::<MemoryLink, ManualClock, ()>();
/// ```
pub const fn global_link_init<S, C, H>() -> Mutex<RefCell<Option<LinkDriver<S, C, H>>>>
where
    S: SerialLink,
    C: Clock,
    H: LinkHandler,
{
    Mutex::new(RefCell::new(None))
}

/// Stores a constructed driver in the global slot.
///
/// Call once from `main()` after opening the serial port; the driver is
/// constructed normally (so port errors during the initial NAK reset stay
/// visible to the caller) and then moved into the singleton.
pub fn global_link_setup<S, C, H>(
    global: &'static Mutex<RefCell<Option<LinkDriver<S, C, H>>>>,
    driver: LinkDriver<S, C, H>,
) where
    S: SerialLink,
    C: Clock,
    H: LinkHandler,
{
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(driver));
    });
}

/// Advances the global driver by one tick.
///
/// Safe to call before setup; it does nothing until a driver is stored.
/// Intended to be invoked from a periodic timer interrupt or scheduler.
pub fn global_link_tick<S, C, H>(
    global: &'static Mutex<RefCell<Option<LinkDriver<S, C, H>>>>,
) -> Result<(), S::Error>
where
    S: SerialLink,
    C: Clock,
    H: LinkHandler,
{
    critical_section::with(|cs| match global.borrow(cs).borrow_mut().as_mut() {
        Some(driver) => driver.tick(),
        None => Ok(()),
    })
}

/// Enqueues a telegram on the global driver.
///
/// Returns `false` if no driver has been stored yet, if the telegram is
/// longer than [`TELEGRAM_MAX_LEN`](crate::consts::TELEGRAM_MAX_LEN), or if
/// the queue is full.
pub fn submit_to_global_link<S, C, H>(
    global: &'static Mutex<RefCell<Option<LinkDriver<S, C, H>>>>,
    telegram: &[u8],
) -> bool
where
    S: SerialLink,
    C: Clock,
    H: LinkHandler,
{
    critical_section::with(|cs| {
        global
            .borrow(cs)
            .borrow()
            .as_ref()
            .is_some_and(|driver| driver.submit(telegram))
    })
}
