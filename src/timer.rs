//! Hybrid wall-clock/monotonic timer. Picks the steady clock for anything firing within the next
//! second (avoiding wall-clock jitter/adjustment for near-future events) and the system clock
//! otherwise, matching the source's dual-clock scheduling choice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant as SteadyInstant;

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::strand::Strand;

/// Below this margin, `at`/`at_then_after` schedule on the steady clock instead of the system
/// clock.
const NEAR_FUTURE: Duration = Duration::from_secs(1);

/// Which clock(s) a timer's current schedule uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No schedule is armed.
    None,
    /// Firing on the system (wall) clock.
    System,
    /// Firing on the steady (monotonic) clock.
    Steady,
    /// A system-clock wait followed by a steady-clock wait (`*_then_after`).
    Both,
}

#[derive(Clone, Copy)]
enum FirePoint {
    System(SystemTime),
    Steady(SteadyInstant),
}

struct Inner {
    status: Mutex<Status>,
    fire_point: Mutex<Option<FirePoint>>,
    expired: AtomicBool,
    cancelled: AtomicBool,
    notify: Notify,
}

impl Inner {
    async fn wait_for_cancel(&self) {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return;
            }
            self.notify.notified().await;
        }
    }
}

/// A hybrid timer handle. Cheap to clone; clones share the same schedule and waiters.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<Inner>,
    strand: Strand,
}

impl Timer {
    /// Creates an unarmed timer bound to `runtime`'s strand pool.
    pub fn new(runtime: &Arc<Runtime>) -> Self {
        Self {
            inner: Arc::new(Inner {
                status: Mutex::new(Status::None),
                fire_point: Mutex::new(None),
                expired: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
            strand: Strand::new(runtime),
        }
    }

    /// The clock(s) the current schedule uses.
    pub fn status(&self) -> Status {
        *self.inner.status.lock()
    }

    fn rearm(&self) {
        self.inner.expired.store(false, Ordering::SeqCst);
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Schedules firing at `tp`.
    pub fn at(&self, tp: SystemTime) {
        self.rearm();
        let now = SystemTime::now();
        if tp > now + NEAR_FUTURE {
            *self.inner.status.lock() = Status::System;
            *self.inner.fire_point.lock() = Some(FirePoint::System(tp));
            self.arm_system(tp, None);
        } else {
            let wait = tp.duration_since(now).unwrap_or(Duration::ZERO);
            let deadline = SteadyInstant::now() + wait;
            *self.inner.status.lock() = Status::Steady;
            *self.inner.fire_point.lock() = Some(FirePoint::Steady(deadline));
            self.arm_steady_at(deadline, None);
        }
    }

    /// Schedules firing at `dt`, converted to a system time point.
    pub fn at_datetime(&self, dt: DateTime<Utc>) {
        self.at(dt.into());
    }

    /// Schedules firing after `du` on the steady clock.
    pub fn after(&self, du: Duration) {
        self.rearm();
        let deadline = SteadyInstant::now() + du;
        *self.inner.status.lock() = Status::Steady;
        *self.inner.fire_point.lock() = Some(FirePoint::Steady(deadline));
        self.arm_steady_at(deadline, None);
    }

    /// Waits until `tp` on the system clock, then `du` more on the steady clock.
    pub fn at_then_after(&self, tp: SystemTime, du: Duration) {
        self.rearm();
        *self.inner.status.lock() = Status::Both;
        *self.inner.fire_point.lock() = Some(FirePoint::System(tp));
        self.arm_system(tp, Some(du));
    }

    /// Waits until `dt` on the system clock, then `du` more on the steady clock.
    pub fn at_datetime_then_after(&self, dt: DateTime<Utc>, du: Duration) {
        self.at_then_after(dt.into(), du);
    }

    /// Fires `du` after `reference`'s scheduled fire point, preserving its clock choice. If
    /// `reference` has no schedule armed, behaves like `after(du)`.
    pub fn after_ref(&self, reference: &Timer, du: Duration) {
        self.rearm();
        let point = *reference.inner.fire_point.lock();
        match point {
            Some(FirePoint::System(tp)) => {
                let fire = tp + du;
                *self.inner.status.lock() = Status::System;
                *self.inner.fire_point.lock() = Some(FirePoint::System(fire));
                self.arm_system(fire, None);
            }
            Some(FirePoint::Steady(deadline)) => {
                let fire = deadline + du;
                *self.inner.status.lock() = Status::Steady;
                *self.inner.fire_point.lock() = Some(FirePoint::Steady(fire));
                self.arm_steady_at(fire, None);
            }
            None => self.after(du),
        }
    }

    fn arm_system(&self, tp: SystemTime, then_after: Option<Duration>) {
        let inner = Arc::clone(&self.inner);
        self.strand.post(async move {
            let wait = tp.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = inner.wait_for_cancel() => return,
            }
            if let Some(du) = then_after {
                tokio::select! {
                    _ = tokio::time::sleep(du) => {}
                    _ = inner.wait_for_cancel() => return,
                }
            }
            inner.expired.store(true, Ordering::SeqCst);
            inner.notify.notify_waiters();
        });
    }

    fn arm_steady_at(&self, deadline: SteadyInstant, then_after: Option<Duration>) {
        let inner = Arc::clone(&self.inner);
        self.strand.post(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = inner.wait_for_cancel() => return,
            }
            if let Some(du) = then_after {
                tokio::select! {
                    _ = tokio::time::sleep(du) => {}
                    _ = inner.wait_for_cancel() => return,
                }
            }
            inner.expired.store(true, Ordering::SeqCst);
            inner.notify.notify_waiters();
        });
    }

    /// Waits for the timer to fire. Resolves immediately if already expired at registration time.
    pub async fn async_wait(&self) -> Result<()> {
        loop {
            if self.inner.cancelled.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }
            if self.inner.expired.load(Ordering::SeqCst) {
                return Ok(());
            }
            self.inner.notify.notified().await;
        }
    }

    /// Aborts outstanding `async_wait` calls with `Error::Cancelled`.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }
}
