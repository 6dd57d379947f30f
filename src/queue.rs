//! Outbound job queue.
//!
//! Telegrams submitted by the host wait here until the driver is idle and
//! allowed to send. The queue is the only surface of the driver that other
//! execution contexts touch: producers may call
//! [`submit`](JobQueue::submit) from threads or interrupt handlers while
//! the driver pops jobs from its tick. Atomicity comes from
//! `critical_section`, the same primitive that guards the global driver
//! singleton, so the queue works identically on a bare-metal target and
//! under an OS (the `std` feature enables `critical-section/std`).
//!
//! Jobs are taken strictly in submission order; the driver moves at most
//! one job into its send buffer at a time.

use core::cell::RefCell;
use core::fmt;
use critical_section::Mutex;

use crate::frame::Telegram;

#[cfg(not(feature = "std"))]
use crate::consts::JOB_QUEUE_DEPTH;

#[cfg(feature = "std")]
type Jobs = std::collections::VecDeque<Telegram>;
#[cfg(not(feature = "std"))]
type Jobs = heapless::Deque<Telegram, JOB_QUEUE_DEPTH>;

#[cfg(feature = "std")]
fn push_job(jobs: &mut Jobs, job: Telegram) -> bool {
    jobs.push_back(job);
    true
}

#[cfg(not(feature = "std"))]
fn push_job(jobs: &mut Jobs, job: Telegram) -> bool {
    jobs.push_back(job).is_ok()
}

/// Concurrency-safe FIFO of pending outbound telegrams.
///
/// Bounded to [`JOB_QUEUE_DEPTH`](crate::consts::JOB_QUEUE_DEPTH) entries
/// in `no_std` builds; unbounded under `std`.
pub struct JobQueue {
    jobs: Mutex<RefCell<Jobs>>,
}

impl JobQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            jobs: Mutex::new(RefCell::new(Jobs::new())),
        }
    }

    /// Appends a telegram to the back of the queue.
    ///
    /// Returns `false` when the queue is full (`no_std` builds only).
    pub fn submit(&self, telegram: Telegram) -> bool {
        critical_section::with(|cs| {
            let mut jobs = self.jobs.borrow_ref_mut(cs);
            push_job(&mut jobs, telegram)
        })
    }

    /// Pops the oldest telegram, if any.
    pub fn take(&self) -> Option<Telegram> {
        critical_section::with(|cs| self.jobs.borrow_ref_mut(cs).pop_front())
    }

    /// Number of telegrams currently queued.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.jobs.borrow_ref(cs).len())
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue").finish_non_exhaustive()
    }
}
