// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Contact-force servo and the open-loop moves that home the force axis.
//!
//! Compressive force is negative. Forward drive retracts the finger, reverse drive presses.
//! Homing is two timed segments polled from the main loop: a release at high duty that
//! relieves stored spring energy, then an optional gentle re-seat so the mechanism does not
//! sit in an undefined preload.

use crate::config::{ForceAxisConfig, OpenLoopMove};
use crate::control::pid::{ForceLaw, Pid};
use crate::drivers::h_bridge::{DriveCommand, DriveDirection, Motor};
use crate::error::DriverError;
use crate::time::{Micros, Stopwatch};

/// Progress of an open-loop move.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum MoveStatus {
    /// No move in progress.
    Idle,
    Moving,
    /// The last segment just finished and the motor was stopped.
    Done,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Segment {
    Release,
    Engage,
}

#[derive(Copy, Clone, Debug)]
struct ActiveMove {
    segment: Segment,
    started: Stopwatch,
    plan: OpenLoopMove,
    /// Whether an engage segment follows the release.
    then_engage: bool,
}

pub struct ForceController<M> {
    motor: M,
    pid: Pid<ForceLaw>,
    retract: OpenLoopMove,
    engage: Option<OpenLoopMove>,
    active: Option<ActiveMove>,
}

impl<M: Motor> ForceController<M> {
    pub fn new(motor: M, config: &ForceAxisConfig) -> Self {
        Self {
            motor,
            pid: Pid::new(&config.axis.pid, ForceLaw),
            retract: config.retract,
            engage: config.engage,
            active: None,
        }
    }

    pub fn initialize(&mut self) -> Result<(), DriverError> {
        self.pid.reset();
        self.active = None;
        self.motor.initialize()
    }

    /// One force-servo tick: compute (rate-gated) and drive. Cancels any open-loop move.
    pub fn force_control(
        &mut self,
        target_force: f32,
        current_force: f32,
        now: Micros,
    ) -> Result<DriveCommand, DriverError> {
        self.active = None;
        let command = self.pid.compute(target_force, current_force, now);
        self.motor.drive(command)?;
        Ok(command)
    }

    /// Start the plain release move for `duration_us` at the configured retract duty.
    pub fn retract(&mut self, duration_us: Micros, now: Micros) -> Result<(), DriverError> {
        let plan = OpenLoopMove {
            duration_us,
            ..self.retract
        };
        self.start(Segment::Release, plan, false, now)
    }

    /// Start the full homing move: release, then re-seat if configured.
    pub fn home(&mut self, now: Micros) -> Result<(), DriverError> {
        let then_engage = self.engage.is_some();
        self.start(Segment::Release, self.retract, then_engage, now)
    }

    fn start(
        &mut self,
        segment: Segment,
        plan: OpenLoopMove,
        then_engage: bool,
        now: Micros,
    ) -> Result<(), DriverError> {
        self.pid.reset();
        self.active = Some(ActiveMove {
            segment,
            started: Stopwatch::started_at(now),
            plan,
            then_engage,
        });
        self.motor.drive(DriveCommand::new(plan.direction, plan.duty))
    }

    /// Advance the open-loop move. Call every loop iteration while it runs.
    pub fn poll(&mut self, now: Micros) -> Result<MoveStatus, DriverError> {
        let Some(active) = self.active else {
            return Ok(MoveStatus::Idle);
        };
        if active.started.elapsed_at(now) < active.plan.duration_us {
            return Ok(MoveStatus::Moving);
        }
        match (active.segment, active.then_engage, self.engage) {
            (Segment::Release, true, Some(engage)) => {
                info!("force axis: release done, engaging");
                self.start(Segment::Engage, engage, false, now)?;
                Ok(MoveStatus::Moving)
            }
            _ => {
                self.active = None;
                self.motor.stop()?;
                Ok(MoveStatus::Done)
            }
        }
    }

    /// An open-loop move is in progress.
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.active.is_some()
    }

    /// Total duration of the configured homing move.
    pub fn homing_duration(&self) -> Micros {
        self.retract.duration_us + self.engage.map_or(0, |e| e.duration_us)
    }

    /// Drive at a fixed command, bypassing the servo.
    pub fn drive_open_loop(&mut self, command: DriveCommand) -> Result<(), DriverError> {
        self.active = None;
        self.motor.drive(command)
    }

    /// Stop the motor and abandon any move; the servo restarts from a clean integral.
    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.active = None;
        self.pid.reset();
        self.motor.stop()
    }

    /// Direction of the release move; open-loop drags use it too.
    #[inline]
    pub fn retract_direction(&self) -> DriveDirection {
        self.retract.direction
    }

    pub fn set_gains(&mut self, kp: f32, ki: f32, control_period: Micros) {
        self.pid.set_gains(kp, ki, control_period);
    }

    #[inline]
    pub fn command(&self) -> DriveCommand {
        self.motor.command()
    }

    pub fn pid(&self) -> &Pid<ForceLaw> {
        &self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FrequencyPreset, Protocol, RigConfig};
    use crate::sim::SimMotor;

    fn config() -> ForceAxisConfig {
        let mut c = RigConfig::new(FrequencyPreset::lookup(10.0).unwrap(), Protocol::default())
            .force_axis;
        c.retract.duration_us = 1_000;
        if let Some(engage) = c.engage.as_mut() {
            engage.duration_us = 500;
        }
        c
    }

    #[test]
    fn release_then_engage_then_stop() {
        let motor = SimMotor::new(4095);
        let mut force = ForceController::new(motor.driver(), &config());
        force.initialize().unwrap();

        force.home(0).unwrap();
        assert_eq!(motor.signed_duty(), 4000);
        assert_eq!(force.poll(999).unwrap(), MoveStatus::Moving);
        assert_eq!(force.poll(1_000).unwrap(), MoveStatus::Moving);
        assert_eq!(motor.signed_duty(), -800);
        assert_eq!(force.poll(1_499).unwrap(), MoveStatus::Moving);
        assert_eq!(force.poll(1_500).unwrap(), MoveStatus::Done);
        assert_eq!(motor.signed_duty(), 0);
        assert_eq!(force.poll(2_000).unwrap(), MoveStatus::Idle);
        assert_eq!(force.homing_duration(), 1_500);
    }

    #[test]
    fn plain_retract_skips_engage() {
        let motor = SimMotor::new(4095);
        let mut force = ForceController::new(motor.driver(), &config());
        force.initialize().unwrap();
        force.retract(200, 10).unwrap();
        assert_eq!(force.command(), DriveCommand::new(DriveDirection::Forward, 4000));
        assert_eq!(force.poll(210).unwrap(), MoveStatus::Done);
        assert!(!motor.nsleep.is_awake());
    }

    #[test]
    fn servo_presses_toward_compressive_target() {
        let motor = SimMotor::new(4095);
        let mut force = ForceController::new(motor.driver(), &config());
        force.initialize().unwrap();
        let cmd = force.force_control(-2.0, 0.0, 0).unwrap();
        assert_eq!(cmd.direction, DriveDirection::Reverse);
        assert_eq!(cmd.duty, 1204);
        assert!(motor.signed_duty() < 0);

        // Past the target the servo backs off.
        let cmd = force.force_control(-2.0, -3.0, 100_000).unwrap();
        assert_eq!(cmd.direction, DriveDirection::Forward);
    }
}
