//! Ways to end an otherwise unbounded scan.
//!
//! The scanners never give up on their own: they poll until the device says
//! what they are waiting for. A [`StopCondition`] is consulted once before
//! every read and lets the caller cut the run short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait StopCondition {
    fn should_stop(&mut self) -> bool;
}

impl<T: StopCondition + ?Sized> StopCondition for &mut T {
    fn should_stop(&mut self) -> bool {
        (**self).should_stop()
    }
}

/// Stops when either side does.
impl<A: StopCondition, B: StopCondition> StopCondition for (A, B) {
    fn should_stop(&mut self) -> bool {
        self.0.should_stop() || self.1.should_stop()
    }
}

/// `None` never stops.
impl<T: StopCondition> StopCondition for Option<T> {
    fn should_stop(&mut self) -> bool {
        self.as_mut().is_some_and(|inner| inner.should_stop())
    }
}

/// Never stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl StopCondition for Unbounded {
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Shared flag, typically raised from a signal handler.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl StopCondition for CancelToken {
    fn should_stop(&mut self) -> bool {
        self.is_cancelled()
    }
}

/// Allows exactly `n` loop iterations.
#[derive(Debug, Clone, Copy)]
pub struct PollLimit {
    remaining: u64,
}

impl PollLimit {
    pub fn new(n: u64) -> Self {
        Self { remaining: n }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl StopCondition for PollLimit {
    fn should_stop(&mut self) -> bool {
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        false
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Stops once the clock passes a fixed point in time.
#[derive(Debug, Clone)]
pub struct Deadline<C = SystemClock> {
    clock: C,
    at: Instant,
}

impl Deadline<SystemClock> {
    pub fn after(budget: Duration) -> Self {
        Self::with_clock(SystemClock, budget)
    }
}

impl<C: Clock> Deadline<C> {
    pub fn with_clock(clock: C, budget: Duration) -> Self {
        let at = clock.now() + budget;
        Self { clock, at }
    }
}

impl<C: Clock> StopCondition for Deadline<C> {
    fn should_stop(&mut self) -> bool {
        self.clock.now() >= self.at
    }
}
