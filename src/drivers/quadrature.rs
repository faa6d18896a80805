// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Interrupt-driven quadrature decoding.
//!
//! [`QuadratureCounter`] is a single-producer/single-consumer tick counter: the pin-change
//! interrupt is the only writer (through [`QuadratureCounter::on_edge`]) and the control loop
//! only ever takes an atomic snapshot. It is meant to live in a `static`.

use core::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};

/// Anything that yields a signed quadrature tick count as a single snapshot.
pub trait TickSource {
    fn ticks(&self) -> i32;
}

impl<T: TickSource + ?Sized> TickSource for &T {
    #[inline]
    fn ticks(&self) -> i32 {
        (**self).ticks()
    }
}

// Indexed by (previous AB << 2) | current AB. Gray order 00 -> 01 -> 11 -> 10 counts up.
const STEP: [i8; 16] = [0, 1, -1, 0, -1, 0, 0, 1, 1, 0, 0, -1, 0, -1, 1, 0];

#[inline]
fn encode(a: bool, b: bool) -> u8 {
    ((a as u8) << 1) | b as u8
}

/// Lock-free quadrature tick counter.
pub struct QuadratureCounter {
    count: AtomicI32,
    state: AtomicU8,
    missed: AtomicU32,
}

impl QuadratureCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicI32::new(0),
            state: AtomicU8::new(0),
            missed: AtomicU32::new(0),
        }
    }

    /// Latch the current channel levels before enabling the interrupt.
    pub fn attach(&self, a: bool, b: bool) {
        self.state.store(encode(a, b), Ordering::Relaxed);
    }

    /// Decode one pin change. Call only from the interrupt handler.
    pub fn on_edge(&self, a: bool, b: bool) {
        let current = encode(a, b);
        let previous = self.state.swap(current, Ordering::Relaxed);
        if previous ^ current == 0b11 {
            // Both channels changed between two interrupts: one edge was lost.
            self.missed.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let step = STEP[((previous << 2) | current) as usize];
        if step != 0 {
            self.count.fetch_add(step as i32, Ordering::Release);
        }
    }

    /// Atomic snapshot of the tick count.
    #[inline]
    pub fn snapshot(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }

    /// Edges skipped because both channels changed at once.
    pub fn missed_edges(&self) -> u32 {
        self.missed.load(Ordering::Relaxed)
    }
}

impl Default for QuadratureCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for QuadratureCounter {
    #[inline]
    fn ticks(&self) -> i32 {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORWARD: [(bool, bool); 4] = [(false, true), (true, true), (true, false), (false, false)];

    #[test]
    fn full_cycle_counts_four_ticks_each_way() {
        let counter = QuadratureCounter::new();
        counter.attach(false, false);
        for (a, b) in FORWARD {
            counter.on_edge(a, b);
        }
        assert_eq!(counter.snapshot(), 4);

        for (a, b) in FORWARD.iter().rev().skip(1).chain([(false, false)].iter()) {
            counter.on_edge(*a, *b);
        }
        assert_eq!(counter.snapshot(), 0);
    }

    #[test]
    fn double_change_is_counted_as_missed() {
        let counter = QuadratureCounter::new();
        counter.attach(false, false);
        counter.on_edge(true, true);
        assert_eq!(counter.snapshot(), 0);
        assert_eq!(counter.missed_edges(), 1);
        counter.on_edge(true, false);
        assert_eq!(counter.snapshot(), 1);
    }
}
