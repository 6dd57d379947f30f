//! Link driver for the 3964R/3964 serial procedure.
//!
//! This module provides the [`LinkDriver`] struct, a single-threaded
//! cooperative state machine that frames byte telegrams over a
//! point-to-point serial line with reliable delivery: STX/DLE connection
//! handshake, DLE-transparent payload, `DLE ETX` (+ BCC) trailer, NAK and
//! timed retries on every failure, and priority-based resolution when both
//! peers want to send at once.
//!
//! The driver owns three collaborators, supplied at construction:
//!
//! - a serial channel implementing [`SerialLink`],
//! - a monotonic [`Clock`],
//! - a [`LinkHandler`] that receives the upcalls (telegram received,
//!   telegram delivered, telegram abandoned).
//!
//! Everything happens inside [`tick()`](LinkDriver::tick), which the host
//! calls every few milliseconds from a loop, a thread, or a timer
//! interrupt (see [`crate::timer`]). `tick()` never blocks: the two short
//! pauses the procedure prescribes before emitting our own DLE
//! acknowledgement are implemented as deferred actions keyed off the
//! clock.
//!
//! ## Example
//!
//! ```rust
//! use r3964::driver::{Config, LinkDriver};
//! use r3964::port::MemoryLink;
//! use r3964::timer::ManualClock;
//!
//! let mut link =
//!     LinkDriver::new(MemoryLink::new(), ManualClock::new(), (), Config::default()).unwrap();
//! assert!(link.submit(&[0x31, 0x32]));
//! link.tick().unwrap(); // opens the handshake: STX goes out
//! assert_eq!(link.port.tx.last(), Some(&0x02));
//! ```
//!
//! ## Design Notes
//!
//! The six steps of the procedure live in the [`Step`] enum and are
//! dispatched exhaustively from `tick()`; there is no hidden global state.
//! The only surface other execution contexts may touch is
//! [`submit`](LinkDriver::submit), which appends to a
//! critical-section-guarded job queue.

use core::time::Duration;

use log::{debug, trace, warn};

use crate::consts::{
    ACK_DELAY, ACK_TIMEOUT, BLOCK_RETRY_WAIT, CHAR_TIMEOUT, CONNECT_RETRY_WAIT, DLE, ETX,
    MAX_CONNECT_RETRIES, MAX_SEND_RETRIES, NAK, SEND_COOLDOWN, STX, TELEGRAM_MAX_LEN,
};
use crate::frame::{self, FrameBuf, Mode, Telegram};
use crate::port::SerialLink;
use crate::queue::JobQueue;
use crate::timer::Clock;

/// Connection arbitration priority.
///
/// When both peers open a connection at the same time (both send STX), the
/// low-priority peer withdraws its send request and becomes the receiver.
/// The two peers of a link must be configured with *complementary*
/// priorities; two high-priority peers deadlock on every collision and two
/// low-priority peers both yield.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum Priority {
    /// Insist on sending when a collision occurs.
    #[default]
    High,
    /// Withdraw the send request and receive first when a collision occurs.
    Low,
}

/// One step of the link procedure's step chain.
///
/// The driver is always in exactly one step; transitions take effect on the
/// next tick. Every error exit emits three NAK bytes and leads back to
/// [`Idle`](Step::Idle).
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum Step {
    /// No transfer in progress. Watches for the peer's STX, pops queued
    /// jobs into the send buffer, and opens the handshake when allowed.
    #[default]
    Idle,
    /// We answered the peer's STX with our own STX (high priority, send
    /// pending) and now wait for the peer to yield with DLE.
    ForceConnect,
    /// The data block is out; waiting for the peer's DLE acknowledgement.
    BlockAck,
    /// Our STX is out; waiting for DLE (proceed), STX (collision), or
    /// anything else (failure).
    Connect,
    /// We acknowledged the peer's connect request with DLE and wait for
    /// the first data byte.
    RxAccept,
    /// Data bytes are streaming in; ends when the `DLE ETX` trailer (and
    /// BCC, in 3964R mode) is recognized.
    RxStream,
}

/// Driver configuration: arbitration, framing variant, timing, retry caps.
///
/// `Default` gives the classic 3964R parameter set (see
/// [`crate::consts`]). The timing fields keep their traditional names in
/// the docs: QVZ (acknowledgement delay), ZVZ (character delay), BWZ
/// (block wait), CWZ (connect wait).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Config {
    /// Collision arbitration role. Must be complementary to the peer's.
    pub priority: Priority,
    /// Framing variant: 3964R with block check, or plain 3964 without.
    pub mode: Mode,
    /// QVZ: how long the peer may take to acknowledge an STX or a data
    /// block with DLE.
    pub ack_timeout: Duration,
    /// ZVZ: longest allowed gap between two characters of an incoming
    /// frame.
    pub char_timeout: Duration,
    /// BWZ: wait before re-sending a data block that was not acknowledged.
    pub block_retry_wait: Duration,
    /// CWZ: wait before re-attempting a failed connection.
    pub connect_retry_wait: Duration,
    /// SPZ: send cooldown after a successfully delivered telegram.
    pub send_cooldown: Duration,
    /// SLP: pause before answering the peer with our DLE. Must be strictly
    /// shorter than the peer's QVZ.
    pub ack_delay: Duration,
    /// How many failed block transmissions abandon the telegram.
    pub max_send_retries: u8,
    /// How many failed connection attempts abandon the telegram.
    pub max_connect_retries: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            priority: Priority::default(),
            mode: Mode::default(),
            ack_timeout: ACK_TIMEOUT,
            char_timeout: CHAR_TIMEOUT,
            block_retry_wait: BLOCK_RETRY_WAIT,
            connect_retry_wait: CONNECT_RETRY_WAIT,
            send_cooldown: SEND_COOLDOWN,
            ack_delay: ACK_DELAY,
            max_send_retries: MAX_SEND_RETRIES,
            max_connect_retries: MAX_CONNECT_RETRIES,
        }
    }
}

/// Upcall interface the host supplies at construction.
///
/// All methods default to doing nothing, so implementors only override
/// what they care about. The driver invokes them from inside `tick()`;
/// they must not call back into the driver.
pub trait LinkHandler {
    /// An inbound telegram was received and validated.
    fn on_read_success(&mut self, _telegram: &[u8]) {}

    /// An outbound telegram was delivered and acknowledged by the peer.
    fn on_write_success(&mut self, _telegram: &[u8]) {}

    /// An outbound telegram was abandoned after exhausting the retry caps.
    fn on_write_fail(&mut self, _telegram: &[u8]) {}
}

/// No-op handler for hosts that only poll the driver's counters.
impl LinkHandler for () {}

/// Pending deferred action while an SLP pause runs.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Resume {
    /// Just wait, then carry on (pause before our ready-to-receive DLE).
    Dispatch,
    /// Write the frame acknowledgement DLE, then carry on next tick.
    AckThenDispatch,
}

/// Driver for the 3964R/3964 point-to-point link procedure.
///
/// See the [module documentation](crate::driver) for an overview. The
/// serial port, clock, and handler are public so the host (and tests) can
/// reach them directly; the protocol state is private and only advanced by
/// [`tick()`](LinkDriver::tick).
///
/// ## Sending
///
/// [`submit`](LinkDriver::submit) enqueues a telegram; the driver pops it
/// into its send buffer when idle, opens the connection, transmits the
/// encoded frame, and reports the outcome through the handler: exactly
/// one of [`on_write_success`](LinkHandler::on_write_success) or
/// [`on_write_fail`](LinkHandler::on_write_fail) per accepted telegram.
/// Telegrams are attempted strictly in submission order.
///
/// ## Receiving
///
/// Inbound frames are collected while in [`Step::RxStream`], validated,
/// and handed to [`on_read_success`](LinkHandler::on_read_success) in wire
/// order. Receiving is never gated by send cooldowns.
///
/// ## Counters
///
/// The four public counters give a cheap health surface without any
/// handler wiring: `tx_good`/`rx_good` count delivered and received
/// telegrams, `tx_bad` counts abandoned telegrams, `rx_bad` counts
/// rejected frames.
#[derive(Debug)]
pub struct LinkDriver<S, C, H>
where
    S: SerialLink,
    C: Clock,
    H: LinkHandler,
{
    /// The serial channel. Exclusively owned by the driver for its
    /// lifetime.
    pub port: S,
    /// The monotonic time source.
    pub clock: C,
    /// The upcall sink.
    pub handler: H,
    /// Telegrams delivered and acknowledged by the peer.
    pub tx_good: u16,
    /// Telegrams abandoned after exhausting the retry caps.
    pub tx_bad: u16,
    /// Telegrams received, validated, and handed to the handler.
    pub rx_good: u16,
    /// Frames rejected: bad block check, bad trailer, or overflow.
    pub rx_bad: u16,
    config: Config,
    queue: JobQueue,
    step: Step,
    last_step: Step,
    next_step: Step,
    new_step: bool,
    step_start: Duration,
    last_rx: Duration,
    resume_at: Option<(Duration, Resume)>,
    send_buf: Telegram,
    read_buf: FrameBuf,
    send_err: u8,
    connect_err: u8,
    send_at: Duration,
    dle_seen: bool,
    bcc_next: bool,
    running: bool,
}

impl<S, C, H> LinkDriver<S, C, H>
where
    S: SerialLink,
    C: Clock,
    H: LinkHandler,
{
    /// Creates a driver and forces the line into a defined state.
    ///
    /// Both port directions are purged and a single NAK is emitted so a
    /// peer stuck mid-frame from a previous session aborts and returns to
    /// idle. Errors are transport errors from the port.
    pub fn new(mut port: S, clock: C, handler: H, config: Config) -> Result<Self, S::Error> {
        port.purge_tx()?;
        port.purge_rx()?;
        port.write(NAK)?;
        debug!("link opened, line reset with NAK");
        let now = clock.now();
        Ok(Self {
            port,
            clock,
            handler,
            tx_good: 0,
            tx_bad: 0,
            rx_good: 0,
            rx_bad: 0,
            config,
            queue: JobQueue::new(),
            step: Step::Idle,
            last_step: Step::Idle,
            next_step: Step::Idle,
            new_step: false,
            step_start: now,
            last_rx: now,
            resume_at: None,
            send_buf: Telegram::new(),
            read_buf: FrameBuf::new(),
            send_err: 0,
            connect_err: 0,
            send_at: Duration::ZERO,
            dle_seen: false,
            bcc_next: false,
            running: false,
        })
    }

    /// Reconfigures arbitration priority and framing variant.
    ///
    /// Only allowed while the driver has never been ticked; returns `false`
    /// (and changes nothing) once it is running.
    pub fn set_mode(&mut self, priority: Priority, mode: Mode) -> bool {
        if self.running {
            return false;
        }
        self.config.priority = priority;
        self.config.mode = mode;
        true
    }

    /// Enqueues an outbound telegram.
    ///
    /// May be called from any context that can reach the driver (the queue
    /// is critical-section guarded). Returns `false` if the telegram
    /// exceeds [`TELEGRAM_MAX_LEN`] or the queue is full.
    pub fn submit(&self, telegram: &[u8]) -> bool {
        if telegram.len() > TELEGRAM_MAX_LEN {
            return false;
        }
        let mut job = Telegram::new();
        for &byte in telegram {
            let _ = frame::buf_push(&mut job, byte);
        }
        let queued = self.queue.submit(job);
        if queued {
            debug!("telegram queued ({} bytes)", telegram.len());
        }
        queued
    }

    /// The step the driver is currently in.
    pub fn step(&self) -> Step {
        self.step
    }

    /// The step the driver was in before the current one.
    pub fn last_step(&self) -> Step {
        self.last_step
    }

    /// Whether an outbound telegram is in flight (popped from the queue
    /// but neither delivered nor abandoned yet).
    pub fn busy(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Number of telegrams waiting in the job queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Failed block transmissions for the telegram in flight.
    pub fn send_errors(&self) -> u8 {
        self.send_err
    }

    /// Failed connection attempts for the telegram in flight.
    pub fn connect_errors(&self) -> u8 {
        self.connect_err
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Advances the procedure by one step.
    ///
    /// Call every few milliseconds. All byte I/O, state transitions, and
    /// handler upcalls happen here; the call never blocks. The returned
    /// error is a transport error from the serial port; protocol failures
    /// are recovered internally (NAK, retry, eventually
    /// [`on_write_fail`](LinkHandler::on_write_fail)) and never surface as
    /// `Err`.
    pub fn tick(&mut self) -> Result<(), S::Error> {
        self.running = true;
        let now = self.clock.now();

        // A deferred SLP pause is pending: do nothing until it elapses,
        // then emit the deferred DLE (if any) and give it one tick on the
        // wire before dispatching again.
        if let Some((due, action)) = self.resume_at {
            if now < due {
                return Ok(());
            }
            self.resume_at = None;
            if action == Resume::AckThenDispatch {
                trace!("tx DLE, frame acknowledged");
                self.port.write(DLE)?;
                return Ok(());
            }
        }

        if self.step != self.next_step {
            self.last_step = self.step;
            self.step = self.next_step;
            self.step_start = now;
            self.new_step = true;
            trace!("step {:?} -> {:?}", self.last_step, self.step);
        } else {
            self.new_step = false;
        }

        match self.step {
            Step::Idle => self.idle(now),
            Step::ForceConnect => self.force_connect(now),
            Step::BlockAck => self.block_ack(now),
            Step::Connect => self.connect(now),
            Step::RxAccept => self.rx_accept(now),
            Step::RxStream => self.rx_stream(now),
        }
    }

    /// Time spent in the current step.
    fn in_step(&self, now: Duration) -> Duration {
        now.saturating_sub(self.step_start)
    }

    fn goto(&mut self, step: Step) {
        self.next_step = step;
    }

    /// Common error exit: purge both directions, emit three NAK bytes,
    /// return to idle.
    fn nak(&mut self) -> Result<(), S::Error> {
        trace!("tx NAK NAK NAK");
        self.port.purge_tx()?;
        self.port.purge_rx()?;
        self.port.write_all(&[NAK, NAK, NAK])?;
        self.goto(Step::Idle);
        Ok(())
    }

    /// Encodes the send buffer and puts the whole frame on the wire.
    fn write_frame(&mut self) -> Result<(), S::Error> {
        let encoded = frame::encode(&self.send_buf, self.config.mode);
        trace!("tx frame ({} bytes)", encoded.len());
        self.port.write_all(&encoded)
    }

    /// Idle / arbitration.
    ///
    /// On (re-)entry, a telegram that has exhausted its retries is
    /// abandoned. Then: pop a job if the send buffer is free, and either
    /// react to the peer's STX or open a connection of our own.
    fn idle(&mut self, now: Duration) -> Result<(), S::Error> {
        if self.new_step
            && (self.send_err >= self.config.max_send_retries
                || self.connect_err >= self.config.max_connect_retries)
        {
            warn!(
                "telegram abandoned after {} connect / {} send failures",
                self.connect_err, self.send_err
            );
            self.handler.on_write_fail(&self.send_buf);
            self.tx_bad += 1;
            self.send_buf.clear();
            self.send_err = 0;
            self.connect_err = 0;
        }
        if self.send_buf.is_empty() {
            if let Some(job) = self.queue.take() {
                self.send_buf = job;
            }
        }
        let send_en = !self.send_buf.is_empty() && now >= self.send_at;
        match self.port.read() {
            Ok(STX) => {
                if self.config.priority == Priority::Low || !send_en {
                    trace!("rx STX, receiving");
                    self.resume_at = Some((now + self.config.ack_delay, Resume::Dispatch));
                    self.goto(Step::RxAccept);
                } else {
                    trace!("rx STX while send pending, insisting");
                    self.port.purge_tx()?;
                    self.port.write(STX)?;
                    self.goto(Step::ForceConnect);
                }
            }
            Ok(byte) => {
                debug!("rx {:#04x} at idle, expected STX", byte);
                self.nak()?;
            }
            Err(nb::Error::WouldBlock) => {
                if send_en {
                    trace!("tx STX, connecting");
                    self.port.purge_rx()?;
                    self.port.purge_tx()?;
                    self.port.write(STX)?;
                    self.goto(Step::Connect);
                }
            }
            Err(nb::Error::Other(err)) => return Err(err),
        }
        Ok(())
    }

    /// We insisted after a collision; the peer must yield with DLE within
    /// the acknowledgement delay.
    fn force_connect(&mut self, now: Duration) -> Result<(), S::Error> {
        if self.in_step(now) > self.config.ack_timeout {
            debug!("no answer to contested connect");
            self.connect_err += 1;
            self.send_at = now + self.config.connect_retry_wait;
            return self.nak();
        }
        match self.port.read() {
            Ok(DLE) => {
                self.write_frame()?;
                self.goto(Step::BlockAck);
            }
            Ok(byte) => {
                debug!("rx {:#04x} on contested connect, expected DLE", byte);
                self.connect_err += 1;
                self.send_at = now + self.config.connect_retry_wait;
                self.nak()?;
            }
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(err)) => return Err(err),
        }
        Ok(())
    }

    /// The data block is out; the peer must acknowledge it with DLE within
    /// the acknowledgement delay.
    fn block_ack(&mut self, now: Duration) -> Result<(), S::Error> {
        if self.in_step(now) > self.config.ack_timeout {
            debug!("data block not acknowledged in time");
            self.send_err += 1;
            self.send_at = now + self.config.block_retry_wait;
            return self.nak();
        }
        match self.port.read() {
            Ok(DLE) => {
                debug!("telegram delivered ({} bytes)", self.send_buf.len());
                self.handler.on_write_success(&self.send_buf);
                self.tx_good += 1;
                self.send_buf.clear();
                self.send_err = 0;
                self.connect_err = 0;
                self.send_at = now + self.config.send_cooldown;
                self.goto(Step::Idle);
            }
            Ok(byte) => {
                debug!("rx {:#04x} as block acknowledgement, expected DLE", byte);
                self.send_err += 1;
                self.send_at = now + self.config.block_retry_wait;
                self.nak()?;
            }
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(err)) => return Err(err),
        }
        Ok(())
    }

    /// Our STX is out; DLE clears us to send, STX is a collision, anything
    /// else is a failed attempt.
    fn connect(&mut self, now: Duration) -> Result<(), S::Error> {
        if self.in_step(now) > self.config.ack_timeout {
            debug!("connect not acknowledged in time");
            self.send_err += 1;
            self.send_at = now + self.config.connect_retry_wait;
            return self.nak();
        }
        match self.port.read() {
            Ok(DLE) => {
                self.write_frame()?;
                self.goto(Step::BlockAck);
            }
            Ok(STX) => match self.config.priority {
                Priority::Low => {
                    trace!("connect collision, yielding");
                    self.goto(Step::RxAccept);
                }
                Priority::High => {
                    debug!("connect collision between two high priority peers");
                    self.connect_err += 1;
                    self.send_at = now;
                    self.nak()?;
                }
            },
            Ok(byte) => {
                debug!("rx {:#04x} on connect, expected DLE", byte);
                self.connect_err += 1;
                self.send_at = now + self.config.connect_retry_wait;
                self.nak()?;
            }
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(err)) => return Err(err),
        }
        Ok(())
    }

    /// Send the ready-to-receive DLE, then the first data byte must arrive
    /// within the character delay. A byte that is already pending wins over
    /// an expired window.
    fn rx_accept(&mut self, now: Duration) -> Result<(), S::Error> {
        if self.new_step {
            self.port.purge_tx()?;
            self.port.purge_rx()?;
            trace!("tx DLE, ready to receive");
            self.port.write(DLE)?;
        }
        if self.port.readable()? {
            // the byte itself is consumed by the stream step
            self.goto(Step::RxStream);
        } else if self.in_step(now) > self.config.char_timeout {
            debug!("peer went silent after connect");
            return self.nak();
        }
        Ok(())
    }

    /// Drain the incoming stream, recognizing the frame end on the fly:
    /// `dle_seen` toggles on every DLE (odd count means the next ETX is the
    /// trailer), `bcc_next` marks the block check character as the one
    /// byte still missing. The character delay is judged only after the
    /// drain, so bytes that already arrived always count.
    fn rx_stream(&mut self, now: Duration) -> Result<(), S::Error> {
        if self.new_step {
            self.dle_seen = false;
            self.bcc_next = false;
            self.read_buf.clear();
            self.last_rx = self.step_start;
        }
        loop {
            let byte = match self.port.read() {
                Ok(byte) => byte,
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(err)) => return Err(err),
            };
            self.last_rx = now;
            if !frame::buf_push(&mut self.read_buf, byte) {
                debug!("receive buffer overflow");
                self.rx_bad += 1;
                self.nak()?;
                break;
            }
            if self.bcc_next {
                self.finish_frame(now)?;
                break;
            } else if byte == DLE {
                self.dle_seen = !self.dle_seen;
            } else if byte == ETX && self.dle_seen {
                match self.config.mode {
                    Mode::Bcc => self.bcc_next = true,
                    Mode::Plain => {
                        self.finish_frame(now)?;
                        break;
                    }
                }
            } else {
                self.dle_seen = false;
                self.bcc_next = false;
            }
        }
        // anything read above refreshed last_rx, so this only fires on a
        // tick that drained nothing
        if now.saturating_sub(self.last_rx) > self.config.char_timeout {
            debug!("gap in frame exceeded character delay");
            return self.nak();
        }
        Ok(())
    }

    /// The frame is complete: validate it, deliver the telegram, and
    /// schedule the deferred acknowledgement DLE.
    fn finish_frame(&mut self, now: Duration) -> Result<(), S::Error> {
        match frame::decode(&self.read_buf, self.config.mode) {
            Err(err) => {
                debug!("frame rejected: {}", err);
                self.rx_bad += 1;
                self.nak()
            }
            Ok(telegram) => {
                debug!("telegram received ({} bytes)", telegram.len());
                self.handler.on_read_success(&telegram);
                self.rx_good += 1;
                self.port.purge_rx()?;
                self.port.purge_tx()?;
                self.resume_at = Some((now + self.config.ack_delay, Resume::AckThenDispatch));
                self.goto(Step::Idle);
                Ok(())
            }
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::port::MemoryLink;
    use crate::timer::ManualClock;

    #[derive(Default)]
    struct Recorder {
        reads: Vec<Vec<u8>>,
        writes: Vec<Vec<u8>>,
        fails: Vec<Vec<u8>>,
    }

    impl LinkHandler for Recorder {
        fn on_read_success(&mut self, telegram: &[u8]) {
            self.reads.push(telegram.to_vec());
        }

        fn on_write_success(&mut self, telegram: &[u8]) {
            self.writes.push(telegram.to_vec());
        }

        fn on_write_fail(&mut self, telegram: &[u8]) {
            self.fails.push(telegram.to_vec());
        }
    }

    type Dut = LinkDriver<MemoryLink, ManualClock, Recorder>;

    fn dut(config: Config) -> Dut {
        let mut driver =
            LinkDriver::new(MemoryLink::new(), ManualClock::new(), Recorder::default(), config)
                .unwrap();
        driver.port.tx.clear();
        driver
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn construction_resets_the_line() {
        let driver = LinkDriver::new(
            MemoryLink::new(),
            ManualClock::new(),
            Recorder::default(),
            Config::default(),
        )
        .unwrap();
        assert_eq!(driver.port.tx, [NAK]);
        assert_eq!((driver.port.rx_purged, driver.port.tx_purged), (1, 1));
        assert_eq!(driver.step(), Step::Idle);
    }

    #[test]
    fn happy_path_send() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x31, 0x32]));
        d.tick().unwrap(); // STX out
        assert_eq!(d.port.tx, [STX]);
        d.port.feed(&[DLE]);
        d.tick().unwrap(); // cleared to send, frame out
        assert_eq!(d.port.tx, [STX, 0x31, 0x32, 0x10, 0x03, 0x10]);
        d.port.feed(&[DLE]);
        d.tick().unwrap(); // block acknowledged
        assert_eq!(d.handler.writes, [[0x31, 0x32]]);
        assert_eq!(d.tx_good, 1);
        assert!(!d.busy());
        assert_eq!((d.send_errors(), d.connect_errors()), (0, 0));
        assert_eq!(d.last_step(), Step::BlockAck);
    }

    #[test]
    fn send_cooldown_gates_the_next_connect() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x31]));
        d.tick().unwrap();
        d.port.feed(&[DLE]);
        d.tick().unwrap();
        d.port.feed(&[DLE]);
        d.tick().unwrap(); // first telegram delivered
        assert!(d.submit(&[0x32]));
        d.port.tx.clear();
        d.tick().unwrap(); // job popped, but cooldown holds it back
        assert!(d.port.tx.is_empty());
        assert!(d.busy());
        d.clock.advance(ms(501));
        d.tick().unwrap();
        assert_eq!(d.port.tx, [STX]);
    }

    #[test]
    fn happy_path_receive() {
        let mut d = dut(Config::default());
        d.port.feed(&[STX]);
        d.tick().unwrap(); // accept, acknowledgement deferred
        d.tick().unwrap(); // still pausing
        assert!(d.port.tx.is_empty());
        d.clock.advance(ms(1_400));
        d.tick().unwrap(); // ready to receive
        assert_eq!(d.port.tx, [DLE]);
        d.port.feed(&[0x41, 0x10, 0x10, 0x42, 0x10, 0x03, 0x10]);
        d.tick().unwrap(); // first byte noticed
        d.tick().unwrap(); // stream drained, telegram delivered
        assert_eq!(d.handler.reads, [[0x41, 0x10, 0x42]]);
        assert_eq!(d.rx_good, 1);
        d.clock.advance(ms(1_400));
        d.tick().unwrap(); // deferred frame acknowledgement
        assert_eq!(d.port.tx, [DLE]);
        d.tick().unwrap();
        assert_eq!(d.step(), Step::Idle);
    }

    #[test]
    fn corrupted_check_byte_is_refused() {
        let mut d = dut(Config::default());
        d.port.feed(&[STX]);
        d.tick().unwrap();
        d.clock.advance(ms(1_400));
        d.tick().unwrap();
        d.port.feed(&[0x41, 0x10, 0x10, 0x42, 0x10, 0x03, 0x11]); // check byte off by one bit
        d.tick().unwrap();
        d.tick().unwrap();
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        assert!(d.handler.reads.is_empty());
        assert_eq!(d.rx_bad, 1);
        d.tick().unwrap();
        assert_eq!(d.step(), Step::Idle);
    }

    #[test]
    fn plain_mode_ends_at_the_trailer() {
        let mut d = dut(Config {
            mode: Mode::Plain,
            ..Config::default()
        });
        d.port.feed(&[STX]);
        d.tick().unwrap();
        d.clock.advance(ms(1_400));
        d.tick().unwrap();
        d.port.feed(&[0x41, DLE, DLE, 0x42, DLE, ETX]);
        d.tick().unwrap();
        d.tick().unwrap();
        assert_eq!(d.handler.reads, [[0x41, DLE, 0x42]]);
    }

    #[test]
    fn junk_at_idle_draws_nak() {
        let mut d = dut(Config::default());
        d.port.feed(&[0x41]);
        d.tick().unwrap();
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        assert_eq!((d.send_errors(), d.connect_errors()), (0, 0));
    }

    #[test]
    fn idle_collision_high_priority_insists() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x01]));
        d.port.feed(&[STX]); // peer connects just as we want to send
        d.tick().unwrap();
        assert_eq!(d.port.tx, [STX]);
        d.port.feed(&[DLE]); // peer yields
        d.tick().unwrap();
        assert_eq!(d.port.tx[1..], [0x01, 0x10, 0x03, 0x12]);
        d.port.feed(&[DLE]);
        d.tick().unwrap();
        assert_eq!(d.handler.writes, [[0x01]]);
    }

    #[test]
    fn connect_collision_high_priority_retries_at_once() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x01]));
        d.tick().unwrap(); // our STX
        d.port.feed(&[STX]); // peer's STX crosses it
        d.tick().unwrap();
        assert_eq!(d.connect_errors(), 1);
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        d.tick().unwrap(); // no retry wait after a priority clash
        assert_eq!(d.port.tx, [STX]);
    }

    #[test]
    fn connect_collision_low_priority_yields_and_keeps_its_job() {
        let mut d = dut(Config {
            priority: Priority::Low,
            ..Config::default()
        });
        assert!(d.submit(&[0x77]));
        d.tick().unwrap(); // our STX
        assert_eq!(d.port.tx, [STX]);
        d.port.feed(&[STX]); // collision
        d.tick().unwrap(); // we yield
        d.tick().unwrap(); // ready to receive, no extra pause on this path
        assert_eq!(d.port.tx, [DLE]);
        d.port.feed(&frame::encode(&[0xaa], Mode::Bcc));
        d.tick().unwrap();
        d.tick().unwrap();
        assert_eq!(d.handler.reads, [[0xaa]]);
        assert!(d.busy()); // our own telegram is still waiting
        d.clock.advance(ms(1_400));
        d.tick().unwrap(); // deferred acknowledgement
        assert_eq!(d.port.tx, [DLE]);
        d.tick().unwrap(); // and only now our own connect again
        assert_eq!(d.port.tx, [STX]);
    }

    #[test]
    fn connect_timeout_counts_against_send() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x01]));
        d.tick().unwrap(); // STX out
        d.tick().unwrap(); // waiting
        d.clock.advance(ms(2_001));
        d.tick().unwrap();
        assert_eq!((d.send_errors(), d.connect_errors()), (1, 0));
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        // the connect retry wait gates the next attempt
        d.tick().unwrap();
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        d.clock.advance(ms(3_001));
        d.tick().unwrap();
        assert_eq!(d.port.tx, [STX]);
    }

    #[test]
    fn wrong_block_ack_schedules_block_retry() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x01]));
        d.tick().unwrap();
        d.port.feed(&[DLE]);
        d.tick().unwrap(); // frame out
        d.port.feed(&[NAK]); // peer refuses the block
        d.tick().unwrap();
        assert_eq!((d.send_errors(), d.connect_errors()), (1, 0));
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        d.tick().unwrap(); // block retry wait still running
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        d.clock.advance(ms(4_001));
        d.tick().unwrap(); // same telegram, fresh attempt
        assert_eq!(d.port.tx, [STX]);
        assert!(d.busy());
    }

    #[test]
    fn silence_after_ready_draws_nak() {
        let mut d = dut(Config::default());
        d.port.feed(&[STX]);
        d.tick().unwrap();
        d.clock.advance(ms(1_400));
        d.tick().unwrap(); // DLE out
        d.clock.advance(ms(221));
        d.tick().unwrap(); // nothing arrived inside the character delay
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        assert_eq!((d.send_errors(), d.connect_errors()), (0, 0));
    }

    #[test]
    fn byte_arriving_as_the_ready_window_expires_is_accepted() {
        let mut d = dut(Config::default());
        d.port.feed(&[STX]);
        d.tick().unwrap();
        d.clock.advance(ms(1_400));
        d.tick().unwrap(); // DLE out
        d.clock.advance(ms(221)); // the window has elapsed...
        d.port.feed(&frame::encode(&[0x41], Mode::Bcc));
        d.tick().unwrap(); // ...but the pending byte wins
        d.tick().unwrap();
        assert_eq!(d.handler.reads, [[0x41]]);
        assert!(d.port.tx.is_empty());
        assert_eq!(d.rx_bad, 0);
    }

    #[test]
    fn gap_inside_frame_draws_nak() {
        let mut d = dut(Config::default());
        d.port.feed(&[STX]);
        d.tick().unwrap();
        d.clock.advance(ms(1_400));
        d.tick().unwrap(); // DLE out
        d.port.feed(&[0x41]);
        d.tick().unwrap(); // stream opened
        d.tick().unwrap(); // first byte taken
        d.clock.advance(ms(221));
        d.tick().unwrap(); // and then silence
        assert_eq!(d.port.tx, [NAK, NAK, NAK]);
        assert!(d.handler.reads.is_empty());
        assert_eq!(d.rx_bad, 0);
    }

    #[test]
    fn late_tick_still_drains_bytes_that_beat_the_character_delay() {
        let mut d = dut(Config::default());
        d.port.feed(&[STX]);
        d.tick().unwrap();
        d.clock.advance(ms(1_400));
        d.tick().unwrap(); // DLE out
        d.port.feed(&[0x41]);
        d.tick().unwrap(); // stream opened
        d.tick().unwrap(); // first byte taken
        d.clock.advance(ms(221)); // this tick runs late...
        d.port.feed(&[0x10, 0x03, 0x52]);
        d.tick().unwrap(); // ...yet the waiting rest of the frame is drained
        assert_eq!(d.handler.reads, [[0x41]]);
        assert_eq!(d.rx_bad, 0);
    }

    #[test]
    fn telegram_is_abandoned_after_six_failed_connects() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x55]));
        for round in 0u8..6 {
            d.tick().unwrap(); // STX out
            assert_eq!(d.port.tx, [STX]);
            d.port.feed(&[0xff]); // junk instead of DLE
            d.tick().unwrap();
            assert_eq!(d.connect_errors(), round + 1);
            assert_eq!(d.port.tx, [NAK, NAK, NAK]);
            d.clock.advance(ms(3_001));
        }
        d.tick().unwrap(); // abandoned on idle entry
        assert_eq!(d.handler.fails, [[0x55]]);
        assert!(d.handler.writes.is_empty());
        assert!(!d.busy());
        assert_eq!((d.send_errors(), d.connect_errors()), (0, 0));
        assert_eq!(d.tx_bad, 1);
    }

    #[test]
    fn delivery_resets_the_failure_counters() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x01]));
        d.tick().unwrap();
        d.port.feed(&[0xff]); // one failed connect first
        d.tick().unwrap();
        assert_eq!(d.connect_errors(), 1);
        d.clock.advance(ms(3_001));
        d.tick().unwrap(); // retry
        d.port.feed(&[DLE]);
        d.tick().unwrap();
        d.port.feed(&[DLE]);
        d.tick().unwrap(); // delivered
        assert_eq!(d.handler.writes, [[0x01]]);
        assert_eq!((d.send_errors(), d.connect_errors()), (0, 0));
    }

    #[test]
    fn set_mode_refused_once_running() {
        let mut d = dut(Config::default());
        assert!(d.set_mode(Priority::Low, Mode::Plain));
        assert_eq!(d.config().priority, Priority::Low);
        assert_eq!(d.config().mode, Mode::Plain);
        d.tick().unwrap();
        assert!(!d.set_mode(Priority::High, Mode::Bcc));
        assert_eq!(d.config().priority, Priority::Low);
    }

    #[test]
    fn submit_rejects_oversized_telegrams() {
        let d = dut(Config::default());
        assert!(!d.submit(&[0u8; TELEGRAM_MAX_LEN + 1]));
        assert!(d.submit(&[0u8; TELEGRAM_MAX_LEN]));
        assert_eq!(d.pending(), 1);
    }

    #[test]
    fn jobs_are_sent_in_submission_order() {
        let mut d = dut(Config::default());
        assert!(d.submit(&[0x01]));
        assert!(d.submit(&[0x02]));
        assert_eq!(d.pending(), 2);
        for _ in 0..2 {
            d.tick().unwrap(); // STX
            d.port.feed(&[DLE]);
            d.tick().unwrap(); // frame
            d.port.feed(&[DLE]);
            d.tick().unwrap(); // acknowledged
            d.clock.advance(ms(501)); // cooldown
        }
        assert_eq!(d.handler.writes, [[0x01], [0x02]]);
        assert_eq!(d.tx_good, 2);
    }
}
