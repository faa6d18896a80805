// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Monotonic time for the cooperative control loop.
//!
//! Every "wait" in the firmware is a repeated poll against a [`Clock`]. Timestamps are `u32`
//! microseconds that wrap after ~71 minutes; all differences use wrapping arithmetic so a
//! wrap in the middle of an interval is harmless as long as the interval itself is shorter
//! than the wrap period.

/// Microseconds since an arbitrary epoch, wrapping.
pub type Micros = u32;

/// Source of monotonic time.
pub trait Clock {
    /// Current time in microseconds.
    fn now_us(&self) -> Micros;

    /// Current time in milliseconds, derived from [`now_us`](Self::now_us).
    #[inline]
    fn now_ms(&self) -> u32 {
        self.now_us() / 1_000
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now_us(&self) -> Micros {
        (**self).now_us()
    }
}

/// Elapsed time since a start instant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Stopwatch {
    start: Micros,
}

impl Stopwatch {
    /// Start measuring from the current instant.
    pub fn start<C: Clock>(clock: &C) -> Self {
        Self {
            start: clock.now_us(),
        }
    }

    /// Start measuring from an explicit instant.
    pub const fn started_at(start: Micros) -> Self {
        Self { start }
    }

    /// Restart from the current instant.
    pub fn reset<C: Clock>(&mut self, clock: &C) {
        self.start = clock.now_us();
    }

    #[inline]
    pub fn started(&self) -> Micros {
        self.start
    }

    /// Microseconds elapsed since the start.
    #[inline]
    pub fn elapsed_us<C: Clock>(&self, clock: &C) -> Micros {
        clock.now_us().wrapping_sub(self.start)
    }

    /// Microseconds between the start and `now`.
    #[inline]
    pub fn elapsed_at(&self, now: Micros) -> Micros {
        now.wrapping_sub(self.start)
    }
}

/// Periodic gate: fires at most once per `period`.
///
/// A fresh interval fires on its first poll so that a controller acts on the very first tick.
#[derive(Copy, Clone, Debug)]
pub struct Interval {
    period: Micros,
    last: Option<Micros>,
}

impl Interval {
    pub const fn new(period: Micros) -> Self {
        Self { period, last: None }
    }

    #[inline]
    pub fn period(&self) -> Micros {
        self.period
    }

    /// Change the period. The phase of the gate is kept.
    pub fn set_period(&mut self, period: Micros) {
        self.period = period;
    }

    /// Returns true (and re-arms) when at least one period has passed since the last firing.
    pub fn ready_at(&mut self, now: Micros) -> bool {
        match self.last {
            Some(last) if now.wrapping_sub(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// [`ready_at`](Self::ready_at) using the clock's current time.
    pub fn ready<C: Clock>(&mut self, clock: &C) -> bool {
        self.ready_at(clock.now_us())
    }

    /// Forget the last firing; the next poll fires immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
