// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Position servo for one carriage motor, plus end-stop homing.
//!
//! [`PositionController`] composes a [`Motor`] with a [`Pid`] running the position law.
//! [`PositionAxis`] pairs it with the axis encoder; that pair is what the dual-axis actuator
//! drives.

use crate::config::{AxisConfig, HomingConfig};
use crate::control::pid::{Pid, PositionLaw};
use crate::drivers::h_bridge::{DriveCommand, Motor};
use crate::drivers::quadrature::TickSource;
use crate::error::{AxisId, DriverError, HomingError};
use crate::sensors::encoder::{EndStopHoming, QuadratureEncoder};
use crate::time::{Clock, Micros, Stopwatch};

pub struct PositionController<M> {
    id: AxisId,
    motor: M,
    pid: Pid<PositionLaw>,
    homing: HomingConfig,
}

impl<M: Motor> PositionController<M> {
    pub fn new(motor: M, config: &AxisConfig) -> Self {
        Self {
            id: config.id,
            motor,
            pid: Pid::new(&config.pid, PositionLaw),
            homing: config.homing,
        }
    }

    /// Zero the PWM outputs and wake the driver stage.
    pub fn initialize(&mut self) -> Result<(), DriverError> {
        self.pid.reset();
        self.motor.initialize()
    }

    /// Replace the PID tuning; takes effect on the next executed tick.
    pub fn set_gains(&mut self, kp: f32, ki: f32, control_period: Micros) {
        self.pid.set_gains(kp, ki, control_period);
    }

    /// Signed command for `target - current`, recomputed at most once per control period.
    pub fn compute_control_signal(
        &mut self,
        target: f32,
        current: f32,
        now: Micros,
    ) -> DriveCommand {
        self.pid.compute(target, current, now)
    }

    pub fn drive_motor(&mut self, command: DriveCommand) -> Result<(), DriverError> {
        self.motor.drive(command)
    }

    /// Zero both channels and let the motor coast.
    pub fn stop_motor(&mut self) -> Result<(), DriverError> {
        self.motor.stop()
    }

    #[inline]
    pub fn command(&self) -> DriveCommand {
        self.motor.command()
    }

    #[inline]
    pub fn id(&self) -> AxisId {
        self.id
    }

    pub fn pid(&self) -> &Pid<PositionLaw> {
        &self.pid
    }

    /// Drive into the configured end stop at the homing duty until the encoder stalls.
    ///
    /// The axis first backs away for `backoff_us` so that motion is observable even when it
    /// starts against the stop; a stall only counts after `min_travel_ticks` of approach.
    /// The motor is stopped on every exit.
    pub fn go_to_end_stop<S, C>(&mut self, ticks: &S, clock: &C) -> Result<(), HomingError>
    where
        S: TickSource + ?Sized,
        C: Clock,
    {
        info!("{}: homing", self.id);
        self.pid.reset();
        let result = self.seek_end_stop(ticks, clock);
        let stopped = self.motor.stop();
        match result {
            Ok(()) => {
                stopped?;
                info!("{}: end stop found", self.id);
                Ok(())
            }
            Err(e) => {
                error!("{}: homing failed: {}", self.id, e);
                if let Err(stop) = stopped {
                    error!("{}: stop after failed homing: {}", self.id, stop);
                }
                Err(e)
            }
        }
    }

    fn seek_end_stop<S, C>(&mut self, ticks: &S, clock: &C) -> Result<(), HomingError>
    where
        S: TickSource + ?Sized,
        C: Clock,
    {
        let cfg = self.homing;
        let fail = |moved: bool| {
            if moved {
                HomingError::Timeout {
                    timeout_us: cfg.timeout_us,
                }
            } else {
                HomingError::NoMotion {
                    timeout_us: cfg.timeout_us,
                }
            }
        };
        let watch = Stopwatch::start(clock);
        let origin = ticks.ticks();
        let mut moved = false;

        self.motor
            .drive(DriveCommand::new(cfg.direction.opposite(), cfg.duty))?;
        loop {
            let elapsed = watch.elapsed_us(clock);
            moved |= ticks.ticks() != origin;
            if elapsed >= cfg.timeout_us {
                return Err(fail(moved));
            }
            if elapsed >= cfg.backoff_us {
                break;
            }
        }

        self.motor.drive(DriveCommand::new(cfg.direction, cfg.duty))?;
        let mut last = ticks.ticks();
        let mut last_change = clock.now_us();
        let mut travelled: u32 = 0;
        loop {
            let now = clock.now_us();
            let t = ticks.ticks();
            if t != last {
                travelled = travelled.saturating_add(t.wrapping_sub(last).unsigned_abs());
                last = t;
                last_change = now;
                moved = true;
            } else if travelled >= cfg.min_travel_ticks
                && now.wrapping_sub(last_change) >= cfg.stall_window_us
            {
                return Ok(());
            }
            if watch.elapsed_at(now) >= cfg.timeout_us {
                return Err(fail(moved));
            }
        }
    }
}

impl<M: Motor> EndStopHoming for PositionController<M> {
    fn go_to_end_stop<S, C>(&mut self, ticks: &S, clock: &C) -> Result<(), HomingError>
    where
        S: TickSource + ?Sized,
        C: Clock,
    {
        PositionController::go_to_end_stop(self, ticks, clock)
    }
}

/// A closed-loop axis as seen by the orchestration layer.
pub trait ServoAxis {
    fn id(&self) -> AxisId;

    /// Home and zero the axis.
    fn home<C: Clock>(&mut self, clock: &C) -> Result<(), HomingError>;

    fn is_homed(&self) -> bool;

    /// Measured position, mm.
    fn position(&self) -> f32;

    fn control_signal(&mut self, target: f32, current: f32, now: Micros) -> DriveCommand;

    fn drive(&mut self, command: DriveCommand) -> Result<(), DriverError>;

    fn stop(&mut self) -> Result<(), DriverError>;

    fn command(&self) -> DriveCommand;
}

/// Motor, position servo and encoder of one carriage axis.
pub struct PositionAxis<M, S> {
    pub controller: PositionController<M>,
    pub encoder: QuadratureEncoder<S>,
}

impl<M: Motor, S: TickSource> PositionAxis<M, S> {
    pub fn new(motor: M, ticks: S, config: &AxisConfig) -> Self {
        Self {
            controller: PositionController::new(motor, config),
            encoder: QuadratureEncoder::new(ticks, config.calibration),
        }
    }

    /// Initialize the driver and take a provisional encoder origin.
    pub fn initialize(&mut self) -> Result<(), DriverError> {
        self.encoder.initialize();
        self.controller.initialize()
    }
}

impl<M: Motor, S: TickSource> ServoAxis for PositionAxis<M, S> {
    fn id(&self) -> AxisId {
        self.controller.id()
    }

    fn home<C: Clock>(&mut self, clock: &C) -> Result<(), HomingError> {
        self.encoder.calibrate(&mut self.controller, clock)
    }

    fn is_homed(&self) -> bool {
        self.encoder.is_homed()
    }

    fn position(&self) -> f32 {
        self.encoder.read_position()
    }

    fn control_signal(&mut self, target: f32, current: f32, now: Micros) -> DriveCommand {
        self.controller.compute_control_signal(target, current, now)
    }

    fn drive(&mut self, command: DriveCommand) -> Result<(), DriverError> {
        self.controller.drive_motor(command)
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.controller.stop_motor()
    }

    fn command(&self) -> DriveCommand {
        self.controller.command()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FrequencyPreset, Protocol, RigConfig};
    use crate::drivers::h_bridge::DriveDirection;
    use crate::sim::{SimAxisPlant, SimClock};

    fn axis_config() -> AxisConfig {
        RigConfig::new(FrequencyPreset::lookup(10.0).unwrap(), Protocol::default()).carriage[0]
    }

    #[test]
    fn homes_from_the_middle_of_travel() {
        let clock = SimClock::stepping(25);
        let plant = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 5_000.0);
        let mut axis = PositionAxis::new(plant.motor.driver(), &plant, &axis_config());
        axis.initialize().unwrap();
        axis.home(&clock).unwrap();
        assert!(axis.is_homed());
        assert!(plant.at_min_stop());
        assert_eq!(axis.position(), axis_config().calibration.end_stop_offset);
        assert!(axis.command().is_idle());
    }

    #[test]
    fn homes_when_starting_against_the_stop() {
        let clock = SimClock::stepping(25);
        let plant = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 0.0);
        let mut axis = PositionAxis::new(plant.motor.driver(), &plant, &axis_config());
        axis.initialize().unwrap();
        assert!(axis.home(&clock).is_ok());
    }

    #[test]
    fn frozen_encoder_fails_within_timeout() {
        let clock = SimClock::stepping(25);
        let plant = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 5_000.0);
        plant.freeze(true);
        let mut config = axis_config();
        config.homing.timeout_us = 1_000_000;
        let mut axis = PositionAxis::new(plant.motor.driver(), &plant, &config);
        axis.initialize().unwrap();

        let result = axis.home(&clock);
        assert_eq!(
            result,
            Err(HomingError::NoMotion {
                timeout_us: config.homing.timeout_us
            })
        );
        // One loop iteration past the deadline at most.
        assert!(clock.peek() <= config.homing.timeout_us + 200);
        assert!(!axis.is_homed());
        assert!(!plant.motor.nsleep.is_awake());
    }

    /// Bridge whose sleep pin never answers.
    struct StuckSleep<M>(M);

    impl<M: Motor> Motor for StuckSleep<M> {
        fn initialize(&mut self) -> Result<(), DriverError> {
            self.0.initialize()
        }

        fn drive(&mut self, command: DriveCommand) -> Result<(), DriverError> {
            self.0.drive(command)
        }

        fn stop(&mut self) -> Result<(), DriverError> {
            Err(DriverError::Pin(embedded_hal::digital::ErrorKind::Other))
        }

        fn command(&self) -> DriveCommand {
            self.0.command()
        }
    }

    #[test]
    fn failed_stop_never_hides_the_homing_outcome() {
        let mut config = axis_config();
        config.homing.timeout_us = 1_000_000;
        let stuck = DriverError::Pin(embedded_hal::digital::ErrorKind::Other);

        let clock = SimClock::stepping(25);
        let frozen = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 5_000.0);
        frozen.freeze(true);
        let mut controller = PositionController::new(StuckSleep(frozen.motor.driver()), &config);
        controller.initialize().unwrap();
        assert_eq!(
            controller.go_to_end_stop(&frozen, &clock),
            Err(HomingError::NoMotion {
                timeout_us: config.homing.timeout_us
            })
        );

        let clock = SimClock::stepping(25);
        let free = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 5_000.0);
        let mut controller =
            PositionController::new(StuckSleep(free.motor.driver()), &axis_config());
        controller.initialize().unwrap();
        assert_eq!(
            controller.go_to_end_stop(&free, &clock),
            Err(HomingError::Driver(stuck))
        );
    }

    #[test]
    fn endless_travel_times_out() {
        let clock = SimClock::stepping(25);
        // Stop far beyond what the homing duty can reach within the timeout.
        let plant = SimAxisPlant::new(&clock, 40_000.0, -1.0e9, 1.0e9, 0.0);
        let config = axis_config();
        let mut axis = PositionAxis::new(plant.motor.driver(), &plant, &config);
        axis.initialize().unwrap();
        assert_eq!(
            axis.home(&clock),
            Err(HomingError::Timeout {
                timeout_us: config.homing.timeout_us
            })
        );
    }

    #[test]
    fn servo_tracks_a_step() {
        let clock = SimClock::new();
        let plant = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 0.0);
        let mut axis = PositionAxis::new(plant.motor.driver(), &plant, &axis_config());
        axis.initialize().unwrap();
        axis.encoder.calibrate_in_place();

        for _ in 0..40_000 {
            let now = clock.peek();
            let current = axis.position();
            let cmd = axis.control_signal(2.0, current, now);
            axis.drive(cmd).unwrap();
            clock.advance(25);
        }
        assert!((axis.position() - 2.0).abs() < 0.05, "{}", axis.position());
    }

    #[test]
    fn command_direction_follows_error_sign() {
        let clock = SimClock::new();
        let plant = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 0.0);
        let mut controller = PositionController::new(plant.motor.driver(), &axis_config());
        controller.initialize().unwrap();
        let cmd = controller.compute_control_signal(-1.0, 0.0, 0);
        assert_eq!(cmd.direction, DriveDirection::Reverse);
        assert_eq!(cmd.duty, axis_config().pid.max_duty);
    }
}
