// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Rate-gated PID with integral anti-windup.
//!
//! [`Pid`] owns the gains and history ([`PidState`]) and a period gate. The arithmetic of one
//! step is delegated to a [`ControlLaw`], so the position and force servos share the same
//! gating, clamping and duty mapping while keeping their own units. Works in `no_std` and
//! does not allocate memory.

use micromath::F32Ext;

use crate::config::PidConfig;
use crate::drivers::h_bridge::DriveCommand;
use crate::time::{Interval, Micros};

/// Gains and history of one PID loop.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PidState {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Always within `±integral_clamp`.
    pub integral_sum: f32,
    pub prev_error: Option<f32>,
    pub integral_clamp: f32,
}

impl PidState {
    pub fn new(config: &PidConfig) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            integral_sum: 0.0,
            prev_error: None,
            integral_clamp: config.integral_clamp.abs(),
        }
    }

    /// Add to the integral and clamp it.
    #[inline]
    pub fn accumulate(&mut self, amount: f32) {
        let clamp = self.integral_clamp;
        self.integral_sum = (self.integral_sum + amount).clamp(-clamp, clamp);
    }

    pub fn reset(&mut self) {
        self.integral_sum = 0.0;
        self.prev_error = None;
    }
}

/// One step of a control law. Returns the signed output in duty units.
pub trait ControlLaw {
    fn step(&self, state: &mut PidState, error: f32, dt_s: f32) -> f32;
}

/// Position servo law: PI(D) with the integral taken over time in seconds, so gains do not
/// depend on the loop rate.
#[derive(Copy, Clone, Debug, Default)]
pub struct PositionLaw;

impl ControlLaw for PositionLaw {
    fn step(&self, state: &mut PidState, error: f32, dt_s: f32) -> f32 {
        state.accumulate(error * dt_s);
        let d = match state.prev_error {
            Some(prev) if dt_s > 0.0 => state.kd * (error - prev) / dt_s,
            _ => 0.0,
        };
        state.prev_error = Some(error);
        state.kp * error + state.ki * state.integral_sum + d
    }
}

/// Force servo law: the integral is a plain sum of errors per execution and the derivative
/// a plain difference, matching the slow, fixed force period.
#[derive(Copy, Clone, Debug, Default)]
pub struct ForceLaw;

impl ControlLaw for ForceLaw {
    fn step(&self, state: &mut PidState, error: f32, _dt_s: f32) -> f32 {
        state.accumulate(error);
        let d = match state.prev_error {
            Some(prev) => state.kd * (error - prev),
            None => 0.0,
        };
        state.prev_error = Some(error);
        state.kp * error + state.ki * state.integral_sum + d
    }
}

/// PID loop executing at most once per control period.
pub struct Pid<L> {
    state: PidState,
    law: L,
    gate: Interval,
    last_run: Option<Micros>,
    max_duty: u16,
    output: DriveCommand,
}

impl<L: ControlLaw> Pid<L> {
    pub fn new(config: &PidConfig, law: L) -> Self {
        Self {
            state: PidState::new(config),
            law,
            gate: Interval::new(config.period_us),
            last_run: None,
            max_duty: config.max_duty,
            output: DriveCommand::IDLE,
        }
    }

    /// Replace the tuning. The integral is kept; the new gains apply from the next execution.
    pub fn set_gains(&mut self, kp: f32, ki: f32, period_us: Micros) {
        self.state.kp = kp;
        self.state.ki = ki;
        self.gate.set_period(period_us);
    }

    pub fn set_derivative_gain(&mut self, kd: f32) {
        self.state.kd = kd;
    }

    /// Run the law on `target - current` if a period has elapsed since the last execution;
    /// otherwise return the held output.
    pub fn compute(&mut self, target: f32, current: f32, now: Micros) -> DriveCommand {
        if !self.gate.ready_at(now) {
            return self.output;
        }
        let dt_us = match self.last_run.replace(now) {
            Some(last) => now.wrapping_sub(last),
            None => self.gate.period(),
        };
        let dt_s = dt_us as f32 * 1e-6;
        let output = self.law.step(&mut self.state, target - current, dt_s);
        self.output = DriveCommand::from_signed(output, self.max_duty);
        self.output
    }

    /// Clear the integrator, the derivative history and the held output.
    pub fn reset(&mut self) {
        self.state.reset();
        self.gate.reset();
        self.last_run = None;
        self.output = DriveCommand::IDLE;
    }

    #[inline]
    pub fn state(&self) -> &PidState {
        &self.state
    }

    #[inline]
    pub fn output(&self) -> DriveCommand {
        self.output
    }

    #[inline]
    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    #[inline]
    pub fn period(&self) -> Micros {
        self.gate.period()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CARRIAGE_PID, FORCE_PID};
    use crate::drivers::h_bridge::DriveDirection;

    /// Deterministic pseudo-random sequence.
    struct Lcg(u32);

    impl Lcg {
        fn next_f32(&mut self, span: f32) -> f32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            ((self.0 >> 8) as f32 / (1u32 << 24) as f32 - 0.5) * 2.0 * span
        }
    }

    #[test]
    fn force_integral_never_exceeds_windup() {
        let mut pid = Pid::new(&FORCE_PID, ForceLaw);
        let mut rng = Lcg(7);
        let mut now = 0;
        for _ in 0..10_000 {
            let error = rng.next_f32(50.0);
            pid.compute(error, 0.0, now);
            assert!(pid.state().integral_sum.abs() <= FORCE_PID.integral_clamp);
            now += FORCE_PID.period_us;
        }
    }

    #[test]
    fn sustained_error_saturates_at_the_clamp() {
        let mut pid = Pid::new(&FORCE_PID, ForceLaw);
        for i in 0..500u32 {
            pid.compute(-3.0, 0.0, i * FORCE_PID.period_us);
        }
        assert_eq!(pid.state().integral_sum, -FORCE_PID.integral_clamp);
        assert_eq!(
            pid.output(),
            DriveCommand::new(DriveDirection::Reverse, FORCE_PID.max_duty)
        );
    }

    #[test]
    fn holds_output_between_periods() {
        let mut pid = Pid::new(&FORCE_PID, ForceLaw);
        let first = pid.compute(1.0, 0.0, 0);
        assert_eq!(first.direction, DriveDirection::Forward);
        assert_eq!(pid.compute(-1.0, 0.0, 50_000), first);
        assert_eq!(pid.state().integral_sum, 1.0);
        let second = pid.compute(-1.0, 0.0, 100_000);
        assert_eq!(second.direction, DriveDirection::Reverse);
    }

    #[test]
    fn position_integral_scales_with_time() {
        let mut pid = Pid::new(&CARRIAGE_PID, PositionLaw);
        pid.compute(0.001, 0.0, 0);
        let expected = 0.001 * CARRIAGE_PID.period_us as f32 * 1e-6;
        assert!((pid.state().integral_sum - expected).abs() < 1e-9);
    }

    #[test]
    fn set_gains_changes_rate_and_gain() {
        let mut pid = Pid::new(&CARRIAGE_PID, PositionLaw);
        pid.set_gains(100.0, 0.0, 1_000);
        assert_eq!(pid.compute(2.0, 0.0, 0).duty, 200);
        assert_eq!(pid.compute(5.0, 0.0, 999).duty, 200);
        assert_eq!(pid.compute(5.0, 0.0, 1_000).duty, 500);
    }
}
