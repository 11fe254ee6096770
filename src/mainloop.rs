// Copyright 2016 Intel Corporation. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The event-loop contract consumed by the protocol engine.
//!
//! The stack does not own a main loop: it schedules timers, idles and
//! file-descriptor watches through the [`Scheduler`] trait and assumes every
//! callback it installs is dispatched on the thread that installed it.
//! Applications bridge this trait to whatever loop drives their process;
//! [`ManualScheduler`] is a deterministic implementation intended for tests
//! and development.

use std::cell::RefCell;
use std::collections::HashSet;
use std::time::Duration;

/// File descriptor type used by [`Scheduler::fd_watch_add`].
pub type RawFd = i32;

/// Opaque handle returned by [`Scheduler::timeout_add`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TimeoutHandle(pub(crate) u64);

/// Opaque handle returned by [`Scheduler::fd_watch_add`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WatchHandle(pub(crate) u64);

/// Abstract single-threaded scheduler.
///
/// Timer callbacks return `true` to stay armed for another period and `false`
/// to disarm, matching the convention of the surrounding runtime. Watches
/// fire whenever the descriptor becomes readable.
pub trait Scheduler {
    /// Schedules `cb` to run after `delay`, and again every `delay` for as
    /// long as it keeps returning `true`.
    fn timeout_add(&self, delay: Duration, cb: Box<dyn FnMut() -> bool>) -> TimeoutHandle;

    /// Cancels a pending timeout. Cancelling from inside the callback is
    /// permitted and prevents re-arming.
    fn timeout_del(&self, handle: TimeoutHandle);

    /// Schedules `cb` to run once, as soon as the loop is otherwise idle.
    fn idle_add(&self, cb: Box<dyn FnOnce()>);

    /// Invokes `cb` whenever `fd` is readable, until it returns `false` or
    /// the watch is removed.
    fn fd_watch_add(&self, fd: RawFd, cb: Box<dyn FnMut() -> bool>) -> WatchHandle;

    /// Removes a file-descriptor watch.
    fn fd_watch_del(&self, handle: WatchHandle);
}

struct Timer {
    id: u64,
    deadline: Duration,
    period: Duration,
    cb: Box<dyn FnMut() -> bool>,
}

struct Watch {
    id: u64,
    #[allow(dead_code)]
    fd: RawFd,
}

#[derive(Default)]
struct Inner {
    now: Duration,
    next_id: u64,
    timers: Vec<Timer>,
    idles: Vec<Box<dyn FnOnce()>>,
    watches: Vec<Watch>,
}

/// A manually-stepped [`Scheduler`].
///
/// Time only moves when [`advance`](ManualScheduler::advance) is called,
/// which makes retransmission and polling behavior fully deterministic.
/// File-descriptor watches are recorded but never fire; pair this scheduler
/// with the loopback transport, which delivers through idles instead.
#[derive(Default)]
pub struct ManualScheduler {
    inner: RefCell<Inner>,
    cancelled: RefCell<HashSet<u64>>,
}

impl ManualScheduler {
    /// Creates a new scheduler with the clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Moves the virtual clock forward by `dt`, firing every timer that
    /// comes due, in deadline order. Re-armed timers may fire repeatedly
    /// within a single call.
    pub fn advance(&self, dt: Duration) {
        let target = self.inner.borrow().now + dt;

        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                let idx = inner
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.deadline <= target)
                    .min_by_key(|(_, t)| t.deadline)
                    .map(|(i, _)| i);
                match idx {
                    Some(i) => {
                        let timer = inner.timers.swap_remove(i);
                        inner.now = timer.deadline;
                        Some(timer)
                    }
                    None => None,
                }
            };

            let mut timer = match due {
                Some(t) => t,
                None => break,
            };

            // The timer is detached while its callback runs, so the callback
            // may freely add or cancel other timers.
            let rearm = (timer.cb)();
            let was_cancelled = self.cancelled.borrow_mut().remove(&timer.id);

            if rearm && !was_cancelled {
                let mut inner = self.inner.borrow_mut();
                timer.deadline = inner.now + timer.period;
                inner.timers.push(timer);
            }
        }

        self.inner.borrow_mut().now = target;
    }

    /// Runs queued idle callbacks until none remain. Returns how many ran.
    pub fn run_idles(&self) -> usize {
        let mut count = 0;
        loop {
            let idle = self.inner.borrow_mut().idles.pop();
            match idle {
                Some(cb) => {
                    cb();
                    count += 1;
                }
                None => return count,
            }
        }
    }

    /// Convenience for tests: drains idles, advances by `dt`, then drains
    /// the idles queued by the timers that fired.
    pub fn settle(&self, dt: Duration) {
        self.run_idles();
        self.advance(dt);
        self.run_idles();
    }
}

impl Scheduler for ManualScheduler {
    fn timeout_add(&self, delay: Duration, cb: Box<dyn FnMut() -> bool>) -> TimeoutHandle {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        let deadline = inner.now + delay;
        inner.timers.push(Timer {
            id,
            deadline,
            period: delay,
            cb,
        });
        TimeoutHandle(id)
    }

    fn timeout_del(&self, handle: TimeoutHandle) {
        let mut inner = self.inner.borrow_mut();
        if let Some(idx) = inner.timers.iter().position(|t| t.id == handle.0) {
            inner.timers.swap_remove(idx);
        } else {
            // Either already fired, or firing right now; make sure a
            // concurrent re-arm is suppressed.
            self.cancelled.borrow_mut().insert(handle.0);
        }
    }

    fn idle_add(&self, cb: Box<dyn FnOnce()>) {
        self.inner.borrow_mut().idles.insert(0, cb);
    }

    fn fd_watch_add(&self, fd: RawFd, _cb: Box<dyn FnMut() -> bool>) -> WatchHandle {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.watches.push(Watch { id, fd });
        WatchHandle(id)
    }

    fn fd_watch_del(&self, handle: WatchHandle) {
        let mut inner = self.inner.borrow_mut();
        if let Some(idx) = inner.watches.iter().position(|w| w.id == handle.0) {
            inner.watches.swap_remove(idx);
        }
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &inner.now)
            .field("timers", &inner.timers.len())
            .field("idles", &inner.idles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn timer_fires_in_deadline_order() {
        let sched = ManualScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for (tag, ms) in [(1u8, 30u64), (2, 10), (3, 20)] {
            let order = order.clone();
            sched.timeout_add(
                Duration::from_millis(ms),
                Box::new(move || {
                    order.borrow_mut().push(tag);
                    false
                }),
            );
        }

        sched.advance(Duration::from_millis(100));
        assert_eq!(*order.borrow(), vec![2, 3, 1]);
    }

    #[test]
    fn rearmed_timer_fires_repeatedly() {
        let sched = ManualScheduler::new();
        let count = Rc::new(Cell::new(0));
        let count_in = count.clone();

        sched.timeout_add(
            Duration::from_millis(10),
            Box::new(move || {
                count_in.set(count_in.get() + 1);
                count_in.get() < 3
            }),
        );

        sched.advance(Duration::from_millis(100));
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn cancel_from_callback_prevents_rearm() {
        let sched = Rc::new(ManualScheduler::new());
        let count = Rc::new(Cell::new(0));

        let handle = Rc::new(Cell::new(None));
        let handle_in = handle.clone();
        let sched_in = sched.clone();
        let count_in = count.clone();
        let h = sched.timeout_add(
            Duration::from_millis(10),
            Box::new(move || {
                count_in.set(count_in.get() + 1);
                sched_in.timeout_del(handle_in.get().unwrap());
                true
            }),
        );
        handle.set(Some(h));

        sched.advance(Duration::from_millis(100));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn idles_run_once() {
        let sched = ManualScheduler::new();
        let count = Rc::new(Cell::new(0));
        let count_in = count.clone();
        sched.idle_add(Box::new(move || count_in.set(count_in.get() + 1)));
        assert_eq!(sched.run_idles(), 1);
        assert_eq!(sched.run_idles(), 0);
        assert_eq!(count.get(), 1);
    }
}
