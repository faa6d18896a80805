// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Debounced operator switches.
//!
//! Three rocker switches wired active-low with pull-ups: run/stop, direction and mode. A
//! switch has no defined state until its input has been stable for one debounce interval;
//! before that it reads as off.

use embedded_hal::digital::InputPin;

use crate::time::Micros;

/// Carriage motion mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Mode {
    Translation,
    Rotation,
}

/// Carriage motion direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Backward,
}

/// Settled level change reported by a [`Debouncer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Edge {
    Rising,
    Falling,
}

/// Stable-interval debouncer for one logical input.
#[derive(Copy, Clone, Debug)]
pub struct Debouncer {
    interval: Micros,
    stable: bool,
    candidate: bool,
    since: Option<Micros>,
    settled: bool,
    edge: Option<Edge>,
}

impl Debouncer {
    pub const fn new(interval: Micros) -> Self {
        Self {
            interval,
            stable: false,
            candidate: false,
            since: None,
            settled: false,
            edge: None,
        }
    }

    /// Feed one raw sample. Returns the edge accepted on this call, if any.
    ///
    /// The first settle establishes the initial level and is not reported as an edge.
    pub fn update(&mut self, level: bool, now: Micros) -> Option<Edge> {
        self.edge = None;
        let since = match self.since {
            Some(since) if level == self.candidate => since,
            _ => {
                self.candidate = level;
                self.since = Some(now);
                return None;
            }
        };
        if now.wrapping_sub(since) < self.interval {
            return None;
        }
        if !self.settled {
            self.settled = true;
            self.stable = level;
        } else if level != self.stable {
            self.stable = level;
            self.edge = Some(if level { Edge::Rising } else { Edge::Falling });
        }
        self.edge
    }

    /// Debounced level; `false` until settled.
    #[inline]
    pub fn is_on(&self) -> bool {
        self.settled && self.stable
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Edge accepted by the most recent [`update`](Self::update).
    #[inline]
    pub fn edge(&self) -> Option<Edge> {
        self.edge
    }

    #[inline]
    pub fn rose(&self) -> bool {
        self.edge == Some(Edge::Rising)
    }

    #[inline]
    pub fn fell(&self) -> bool {
        self.edge == Some(Edge::Falling)
    }
}

/// Snapshot of the debounced switch bank.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct SwitchBank {
    pub run: bool,
    pub mode: Mode,
    pub direction: Direction,
}

impl SwitchBank {
    pub const STOPPED: SwitchBank = SwitchBank {
        run: false,
        mode: Mode::Translation,
        direction: Direction::Forward,
    };
}

/// Operator input device as seen by the rig.
pub trait OperatorInputs {
    /// Sample every switch once.
    fn update(&mut self, now: Micros);

    /// Current debounced state.
    fn switches(&self) -> SwitchBank;

    /// Run-switch edge accepted by the last [`update`](Self::update).
    fn run_edge(&self) -> Option<Edge>;
}

impl<T: OperatorInputs + ?Sized> OperatorInputs for &mut T {
    fn update(&mut self, now: Micros) {
        (**self).update(now)
    }

    fn switches(&self) -> SwitchBank {
        (**self).switches()
    }

    fn run_edge(&self) -> Option<Edge> {
        (**self).run_edge()
    }
}

/// Run, direction and mode rockers on active-low inputs.
///
/// Mode on selects [`Mode::Rotation`]; direction on selects [`Direction::Backward`]. A pin
/// read error is treated as an unchanged sample.
pub struct UserInputs<R, D, M> {
    run_pin: R,
    direction_pin: D,
    mode_pin: M,
    run: Debouncer,
    direction: Debouncer,
    mode: Debouncer,
}

impl<R, D, M> UserInputs<R, D, M>
where
    R: InputPin,
    D: InputPin,
    M: InputPin,
{
    pub fn new(run_pin: R, direction_pin: D, mode_pin: M, debounce_us: Micros) -> Self {
        Self {
            run_pin,
            direction_pin,
            mode_pin,
            run: Debouncer::new(debounce_us),
            direction: Debouncer::new(debounce_us),
            mode: Debouncer::new(debounce_us),
        }
    }

    fn sample<P: InputPin>(pin: &mut P, debouncer: &mut Debouncer, now: Micros) {
        if let Ok(low) = pin.is_low() {
            debouncer.update(low, now);
        }
    }
}

impl<R, D, M> OperatorInputs for UserInputs<R, D, M>
where
    R: InputPin,
    D: InputPin,
    M: InputPin,
{
    fn update(&mut self, now: Micros) {
        Self::sample(&mut self.run_pin, &mut self.run, now);
        Self::sample(&mut self.direction_pin, &mut self.direction, now);
        Self::sample(&mut self.mode_pin, &mut self.mode, now);
    }

    fn switches(&self) -> SwitchBank {
        SwitchBank {
            run: self.run.is_on(),
            mode: if self.mode.is_on() {
                Mode::Rotation
            } else {
                Mode::Translation
            },
            direction: if self.direction.is_on() {
                Direction::Backward
            } else {
                Direction::Forward
            },
        }
    }

    fn run_edge(&self) -> Option<Edge> {
        self.run.edge()
    }
}
