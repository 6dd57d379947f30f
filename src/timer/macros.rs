/// Declares a static global `LINK_DRIVER` singleton protected by a
/// `critical_section` mutex.
///
/// This creates the `static` slot that [`setup_link_driver!`],
/// [`tick_link_timer!`], and [`submit_to_link!`] operate on, for
/// interrupt-driven hosts where a timer ISR services the driver while the
/// main context (or other ISRs) submit telegrams.
///
/// # Arguments
/// - `$port`: concrete type implementing `SerialLink`
/// - `$clock`: concrete type implementing `Clock`
/// - `$handler`: concrete type implementing `LinkHandler`
///
/// # Example
/// ```rust,ignore
/// init_link_driver!(MyUart, MyTimebase, MyHandler);
/// ```
#[macro_export]
macro_rules! init_link_driver {
    ( $port:ty, $clock:ty, $handler:ty ) => {
        pub static LINK_DRIVER: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::driver::LinkDriver<$port, $clock, $handler>>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Stores a constructed driver in the `LINK_DRIVER` singleton declared by
/// [`init_link_driver!`].
///
/// # Example
/// ```rust,ignore
/// let driver = LinkDriver::new(uart, timebase, handler, Config::default())?;
/// setup_link_driver!(driver);
/// ```
#[macro_export]
macro_rules! setup_link_driver {
    ( $driver:expr ) => {
        $crate::timer::global_link_setup(&LINK_DRIVER, $driver)
    };
}

/// Advances the `LINK_DRIVER` singleton by one tick.
///
/// Invoke from the periodic timer interrupt. Does nothing (and returns
/// `Ok`) until the driver has been stored with [`setup_link_driver!`].
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     let _ = tick_link_timer!();
/// }
/// ```
#[macro_export]
macro_rules! tick_link_timer {
    () => {
        $crate::timer::global_link_tick(&LINK_DRIVER)
    };
}

/// Enqueues a telegram on the `LINK_DRIVER` singleton.
///
/// Returns `true` when the telegram was accepted into the job queue.
///
/// # Example
/// ```rust,ignore
/// let queued = submit_to_link!(&[0x31, 0x32]);
/// ```
#[macro_export]
macro_rules! submit_to_link {
    ( $telegram:expr ) => {
        $crate::timer::submit_to_global_link(&LINK_DRIVER, $telegram)
    };
}
