// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Simulated rig hardware.
//!
//! Plain `Cell`-based stand-ins for the clock, PWM channels, pins, a motor/encoder plant with
//! end stops and a load cell pressed by the force motor. Everything is shared by reference so
//! a test can drive the control code and inspect the hardware at the same time.

use core::cell::Cell;
use core::convert::Infallible;

use embedded_hal::{digital, pwm};

use crate::drivers::h_bridge::MotorDriver;
use crate::drivers::hx711::ForceAmplifier;
use crate::drivers::quadrature::TickSource;
use crate::error::SensorError;
use crate::time::{Clock, Micros};

/// Manually or automatically advancing clock.
pub struct SimClock {
    now: Cell<Micros>,
    step: Cell<Micros>,
}

impl SimClock {
    /// Clock that only moves when told to.
    pub const fn new() -> Self {
        Self {
            now: Cell::new(0),
            step: Cell::new(0),
        }
    }

    /// Clock that advances by `step` after every read, so that polling loops make progress.
    pub const fn stepping(step: Micros) -> Self {
        Self {
            now: Cell::new(0),
            step: Cell::new(step),
        }
    }

    pub fn advance(&self, us: Micros) {
        self.now.set(self.now.get().wrapping_add(us));
    }

    pub fn set(&self, us: Micros) {
        self.now.set(us);
    }

    pub fn set_step(&self, step: Micros) {
        self.step.set(step);
    }

    /// Current time without advancing.
    pub fn peek(&self) -> Micros {
        self.now.get()
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> Micros {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step.get()));
        now
    }
}

/// One PWM channel.
pub struct SimPwm {
    duty: Cell<u16>,
    max: u16,
    writes: Cell<u32>,
}

impl SimPwm {
    pub const fn new(max: u16) -> Self {
        Self {
            duty: Cell::new(0),
            max,
            writes: Cell::new(0),
        }
    }

    pub fn duty(&self) -> u16 {
        self.duty.get()
    }

    /// Number of duty writes so far.
    pub fn writes(&self) -> u32 {
        self.writes.get()
    }
}

impl pwm::ErrorType for &SimPwm {
    type Error = Infallible;
}

impl pwm::SetDutyCycle for &SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
        self.duty.set(duty.min(self.max));
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// Output pin; used for nSLEEP and indicator outputs.
pub struct SimSleep {
    high: Cell<bool>,
}

impl SimSleep {
    pub const fn new() -> Self {
        Self {
            high: Cell::new(false),
        }
    }

    pub fn is_awake(&self) -> bool {
        self.high.get()
    }
}

impl Default for SimSleep {
    fn default() -> Self {
        Self::new()
    }
}

impl digital::ErrorType for &SimSleep {
    type Error = Infallible;
}

impl digital::OutputPin for &SimSleep {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high.set(true);
        Ok(())
    }
}

/// Active-low rocker switch: `on` pulls the input low.
pub struct SimSwitch {
    on: Cell<bool>,
}

impl SimSwitch {
    pub const fn new(on: bool) -> Self {
        Self { on: Cell::new(on) }
    }

    pub fn set(&self, on: bool) {
        self.on.set(on);
    }

    pub fn is_on(&self) -> bool {
        self.on.get()
    }
}

impl digital::ErrorType for &SimSwitch {
    type Error = Infallible;
}

impl digital::InputPin for &SimSwitch {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(!self.on.get())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(self.on.get())
    }
}

/// H-bridge inputs and sleep pin of one simulated motor.
pub struct SimMotor {
    pub in1: SimPwm,
    pub in2: SimPwm,
    pub nsleep: SimSleep,
}

/// Driver type produced by [`SimMotor::driver`].
pub type SimDriver<'a> = MotorDriver<&'a SimPwm, &'a SimPwm, &'a SimSleep>;

impl SimMotor {
    pub const fn new(max: u16) -> Self {
        Self {
            in1: SimPwm::new(max),
            in2: SimPwm::new(max),
            nsleep: SimSleep::new(),
        }
    }

    pub fn driver(&self) -> SimDriver<'_> {
        MotorDriver::new(&self.in1, &self.in2, &self.nsleep, self.in1.max)
    }

    /// Effective signed duty seen by the motor: zero while asleep.
    pub fn signed_duty(&self) -> i32 {
        if !self.nsleep.is_awake() {
            return 0;
        }
        self.in1.duty() as i32 - self.in2.duty() as i32
    }

    /// Signed duty as a fraction of full scale.
    pub fn effort(&self) -> f32 {
        self.signed_duty() as f32 / self.in1.max as f32
    }
}

/// First-order motor plus encoder: tick velocity proportional to effort, hard end stops.
///
/// The plant integrates lazily whenever its tick count is read.
pub struct SimAxisPlant<'a> {
    clock: &'a SimClock,
    pub motor: SimMotor,
    /// Ticks per second at full forward duty.
    ticks_per_s: f32,
    min_ticks: f32,
    max_ticks: f32,
    position: Cell<f32>,
    last: Cell<Option<Micros>>,
    frozen: Cell<bool>,
}

impl<'a> SimAxisPlant<'a> {
    /// Start at `start` ticks inside `[min_ticks, max_ticks]`.
    pub fn new(
        clock: &'a SimClock,
        ticks_per_s: f32,
        min_ticks: f32,
        max_ticks: f32,
        start: f32,
    ) -> Self {
        Self {
            clock,
            motor: SimMotor::new(crate::config::PWM_MAX_DUTY),
            ticks_per_s,
            min_ticks,
            max_ticks,
            position: Cell::new(start.clamp(min_ticks, max_ticks)),
            last: Cell::new(None),
            frozen: Cell::new(false),
        }
    }

    /// Freeze the encoder output (broken encoder or jammed axis).
    pub fn freeze(&self, frozen: bool) {
        self.integrate();
        self.frozen.set(frozen);
    }

    /// Bring the plant up to the current time.
    pub fn integrate(&self) {
        let now = self.clock.peek();
        let dt = match self.last.replace(Some(now)) {
            Some(last) => now.wrapping_sub(last) as f32 * 1e-6,
            None => 0.0,
        };
        if self.frozen.get() {
            return;
        }
        let next = self.position.get() + self.motor.effort() * self.ticks_per_s * dt;
        self.position.set(next.clamp(self.min_ticks, self.max_ticks));
    }

    pub fn position_ticks(&self) -> f32 {
        self.integrate();
        self.position.get()
    }

    pub fn at_min_stop(&self) -> bool {
        self.position_ticks() <= self.min_ticks
    }
}

impl TickSource for SimAxisPlant<'_> {
    fn ticks(&self) -> i32 {
        self.integrate();
        self.position.get() as i32
    }
}

/// Amplifier that converts a settable raw value at a fixed rate.
pub struct SimLoadCell<'a> {
    clock: &'a SimClock,
    period_us: Micros,
    raw: Cell<i32>,
    last: Cell<Option<Micros>>,
    reads: Cell<u32>,
}

impl<'a> SimLoadCell<'a> {
    pub fn new(clock: &'a SimClock, period_us: Micros, raw: i32) -> Self {
        Self {
            clock,
            period_us,
            raw: Cell::new(raw),
            last: Cell::new(None),
            reads: Cell::new(0),
        }
    }

    pub fn set_raw(&self, raw: i32) {
        self.raw.set(raw);
    }

    pub fn reads(&self) -> u32 {
        self.reads.get()
    }

    fn ready(&self) -> bool {
        match self.last.get() {
            Some(last) => self.clock.peek().wrapping_sub(last) >= self.period_us,
            None => true,
        }
    }

    fn take(&self) -> i32 {
        self.last.set(Some(self.clock.peek()));
        self.reads.set(self.reads.get() + 1);
        self.raw.get()
    }
}

impl ForceAmplifier for &SimLoadCell<'_> {
    fn is_ready(&mut self) -> Result<bool, SensorError> {
        Ok(self.ready())
    }

    fn read_raw(&mut self) -> Result<i32, SensorError> {
        Ok(self.take())
    }
}

/// Force motor pressing a finger into a spring contact, read through a load cell.
///
/// Reverse duty advances the finger; contact starts at `contact_mm`. Compressive force is
/// reported negative, `stiffness` N/mm past contact.
pub struct SimForcePlant<'a> {
    pub motor: SimMotor,
    pub cell: SimLoadCell<'a>,
    clock: &'a SimClock,
    mm_per_s: f32,
    contact_mm: f32,
    stiffness: f32,
    newtons_per_count: f32,
    tare_counts: i32,
    finger_mm: Cell<f32>,
    last: Cell<Option<Micros>>,
}

impl<'a> SimForcePlant<'a> {
    pub fn new(
        clock: &'a SimClock,
        mm_per_s: f32,
        contact_mm: f32,
        stiffness: f32,
        newtons_per_count: f32,
        tare_counts: i32,
    ) -> Self {
        Self {
            motor: SimMotor::new(crate::config::PWM_MAX_DUTY),
            cell: SimLoadCell::new(clock, 12_500, tare_counts),
            clock,
            mm_per_s,
            contact_mm,
            stiffness,
            newtons_per_count,
            tare_counts,
            finger_mm: Cell::new(0.0),
            last: Cell::new(None),
        }
    }

    fn integrate(&self) {
        let now = self.clock.peek();
        let dt = match self.last.replace(Some(now)) {
            Some(last) => now.wrapping_sub(last) as f32 * 1e-6,
            None => 0.0,
        };
        let advance = -self.motor.effort() * self.mm_per_s * dt;
        let finger = (self.finger_mm.get() + advance).max(0.0);
        self.finger_mm.set(finger);
        let force = self.force();
        self.cell
            .set_raw(self.tare_counts + (force / self.newtons_per_count) as i32);
    }

    /// True contact force, N.
    pub fn force(&self) -> f32 {
        let depth = self.finger_mm.get() - self.contact_mm;
        if depth > 0.0 {
            -self.stiffness * depth
        } else {
            0.0
        }
    }

    pub fn finger_mm(&self) -> f32 {
        self.integrate();
        self.finger_mm.get()
    }

    pub fn set_finger_mm(&self, mm: f32) {
        self.integrate();
        self.finger_mm.set(mm);
    }
}

impl ForceAmplifier for &SimForcePlant<'_> {
    fn is_ready(&mut self) -> Result<bool, SensorError> {
        self.integrate();
        Ok(self.cell.ready())
    }

    fn read_raw(&mut self) -> Result<i32, SensorError> {
        Ok(self.cell.take())
    }
}
