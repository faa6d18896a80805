// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Single digital output used as a status lamp or a scope probe.

use embedded_hal::digital::OutputPin;

/// Electrical level that lights the indicator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActiveLevel {
    High,
    Low,
}

/// Output pin that remembers its active level and logical state. Pin errors are ignored: an
/// indicator must never stop the control loop.
pub struct Indicator<P> {
    pin: P,
    active: ActiveLevel,
    lit: bool,
    toggles: u32,
}

impl<P: OutputPin> Indicator<P> {
    /// Wrap `pin` and drive it to the unlit level.
    pub fn new(pin: P, active: ActiveLevel) -> Self {
        let mut indicator = Self {
            pin,
            active,
            lit: true,
            toggles: 0,
        };
        indicator.set(false);
        indicator.toggles = 0;
        indicator
    }

    pub fn active_high(pin: P) -> Self {
        Self::new(pin, ActiveLevel::High)
    }

    pub fn active_low(pin: P) -> Self {
        Self::new(pin, ActiveLevel::Low)
    }

    pub fn set(&mut self, lit: bool) {
        if lit == self.lit {
            return;
        }
        match (self.active, lit) {
            (ActiveLevel::High, true) | (ActiveLevel::Low, false) => self.pin.set_high().ok(),
            (ActiveLevel::High, false) | (ActiveLevel::Low, true) => self.pin.set_low().ok(),
        };
        self.lit = lit;
        self.toggles = self.toggles.wrapping_add(1);
    }

    /// Flip the output. Called once per driven control tick on the loop probe.
    #[inline]
    pub fn toggle(&mut self) {
        self.set(!self.lit);
    }

    #[inline]
    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Number of level changes since construction.
    #[inline]
    pub fn toggles(&self) -> u32 {
        self.toggles
    }

    pub fn free(self) -> P {
        self.pin
    }
}

/// Status outputs that can be dropped in where no pin is wired.
pub trait StatusLamp {
    fn set(&mut self, lit: bool);
    fn toggle(&mut self);
}

impl<P: OutputPin> StatusLamp for Indicator<P> {
    fn set(&mut self, lit: bool) {
        Indicator::set(self, lit)
    }

    fn toggle(&mut self) {
        Indicator::toggle(self)
    }
}

impl StatusLamp for () {
    fn set(&mut self, _lit: bool) {}
    fn toggle(&mut self) {}
}
