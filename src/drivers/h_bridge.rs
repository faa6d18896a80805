// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Dual-PWM H-bridge driver for a brushed DC motor.
//!
//! Direction is selected by which input carries the PWM: IN1 for [`DriveDirection::Forward`],
//! IN2 for [`DriveDirection::Reverse`]. The unused input is held at 0 duty. Stopping zeroes
//! both inputs and pulls nSLEEP low so the motor coasts; the next drive wakes the bridge.

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};

use crate::error::DriverError;

/// Logical drive direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum DriveDirection {
    /// PWM on IN1. Positive control output.
    Forward,
    /// PWM on IN2. Negative control output.
    Reverse,
}

impl DriveDirection {
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            DriveDirection::Forward => 1,
            DriveDirection::Reverse => -1,
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            DriveDirection::Forward => DriveDirection::Reverse,
            DriveDirection::Reverse => DriveDirection::Forward,
        }
    }
}

/// A direction plus an unsigned duty in `0..=full_scale`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct DriveCommand {
    pub direction: DriveDirection,
    pub duty: u16,
}

impl DriveCommand {
    /// Zero duty.
    pub const IDLE: DriveCommand = DriveCommand {
        direction: DriveDirection::Forward,
        duty: 0,
    };

    pub const fn new(direction: DriveDirection, duty: u16) -> Self {
        Self { direction, duty }
    }

    /// Convert a signed controller output to a command: `direction = sign(output)`,
    /// `duty = min(|output|, max_duty)`.
    pub fn from_signed(output: f32, max_duty: u16) -> Self {
        let direction = if output < 0.0 {
            DriveDirection::Reverse
        } else {
            DriveDirection::Forward
        };
        let magnitude = if output < 0.0 { -output } else { output };
        let duty = if magnitude >= max_duty as f32 {
            max_duty
        } else {
            magnitude as u16
        };
        Self { direction, duty }
    }

    /// Signed duty.
    #[inline]
    pub fn signed(&self) -> i32 {
        self.direction.sign() * self.duty as i32
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.duty == 0
    }
}

/// Motor drive capability shared by the position and force controllers.
pub trait Motor {
    /// Configure outputs and wake the driver stage.
    fn initialize(&mut self) -> Result<(), DriverError>;

    /// Apply `command` to the bridge.
    fn drive(&mut self, command: DriveCommand) -> Result<(), DriverError>;

    /// Zero both inputs and put the driver stage to sleep (coast).
    fn stop(&mut self) -> Result<(), DriverError>;

    /// Last command applied.
    fn command(&self) -> DriveCommand;
}

/// H-bridge with two PWM inputs and an active-high nSLEEP pin.
pub struct MotorDriver<A, B, S> {
    in1: A,
    in2: B,
    nsleep: S,
    full_scale: u16,
    command: DriveCommand,
    awake: bool,
}

impl<A, B, S> MotorDriver<A, B, S>
where
    A: SetDutyCycle,
    B: SetDutyCycle,
    S: OutputPin,
{
    /// `full_scale` is the duty that maps to 100% on both channels.
    pub fn new(in1: A, in2: B, nsleep: S, full_scale: u16) -> Self {
        Self {
            in1,
            in2,
            nsleep,
            full_scale,
            command: DriveCommand::IDLE,
            awake: false,
        }
    }

    #[inline]
    pub fn full_scale(&self) -> u16 {
        self.full_scale
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    fn set_inputs(&mut self, in1: u16, in2: u16) -> Result<(), DriverError> {
        self.in1
            .set_duty_cycle_fraction(in1, self.full_scale)
            .map_err(DriverError::pwm)?;
        self.in2
            .set_duty_cycle_fraction(in2, self.full_scale)
            .map_err(DriverError::pwm)?;
        Ok(())
    }

    fn wake(&mut self) -> Result<(), DriverError> {
        self.nsleep.set_high().map_err(DriverError::pin)?;
        self.awake = true;
        Ok(())
    }

    /// Release the underlying pins.
    pub fn free(self) -> (A, B, S) {
        (self.in1, self.in2, self.nsleep)
    }
}

impl<A, B, S> Motor for MotorDriver<A, B, S>
where
    A: SetDutyCycle,
    B: SetDutyCycle,
    S: OutputPin,
{
    fn initialize(&mut self) -> Result<(), DriverError> {
        self.set_inputs(0, 0)?;
        self.command = DriveCommand::IDLE;
        self.wake()
    }

    fn drive(&mut self, command: DriveCommand) -> Result<(), DriverError> {
        let duty = command.duty.min(self.full_scale);
        if !self.awake {
            self.wake()?;
        }
        match command.direction {
            DriveDirection::Forward => self.set_inputs(duty, 0)?,
            DriveDirection::Reverse => self.set_inputs(0, duty)?,
        }
        self.command = DriveCommand::new(command.direction, duty);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.set_inputs(0, 0)?;
        self.command = DriveCommand::IDLE;
        self.nsleep.set_low().map_err(DriverError::pin)?;
        self.awake = false;
        Ok(())
    }

    #[inline]
    fn command(&self) -> DriveCommand {
        self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimPwm, SimSleep};

    fn driver<'a>(
        a: &'a SimPwm,
        b: &'a SimPwm,
        s: &'a SimSleep,
    ) -> MotorDriver<&'a SimPwm, &'a SimPwm, &'a SimSleep> {
        MotorDriver::new(a, b, s, 4095)
    }

    #[test]
    fn from_signed_clamps_and_takes_sign() {
        assert_eq!(
            DriveCommand::from_signed(-5000.0, 2000),
            DriveCommand::new(DriveDirection::Reverse, 2000)
        );
        assert_eq!(
            DriveCommand::from_signed(12.7, 2000),
            DriveCommand::new(DriveDirection::Forward, 12)
        );
        assert_eq!(DriveCommand::from_signed(0.0, 2000).duty, 0);
    }

    #[test]
    fn direction_selects_the_pwm_input() {
        let (a, b, s) = (SimPwm::new(4095), SimPwm::new(4095), SimSleep::new());
        let mut m = driver(&a, &b, &s);
        m.initialize().unwrap();
        assert!(s.is_awake());

        m.drive(DriveCommand::new(DriveDirection::Forward, 1000)).unwrap();
        assert_eq!((a.duty(), b.duty()), (1000, 0));

        m.drive(DriveCommand::new(DriveDirection::Reverse, 300)).unwrap();
        assert_eq!((a.duty(), b.duty()), (0, 300));
        assert_eq!(m.command().signed(), -300);
    }

    #[test]
    fn stop_coasts_and_drive_wakes() {
        let (a, b, s) = (SimPwm::new(4095), SimPwm::new(4095), SimSleep::new());
        let mut m = driver(&a, &b, &s);
        m.initialize().unwrap();
        m.drive(DriveCommand::new(DriveDirection::Forward, 4095)).unwrap();
        m.stop().unwrap();
        assert_eq!((a.duty(), b.duty()), (0, 0));
        assert!(!s.is_awake());
        assert!(m.command().is_idle());

        m.drive(DriveCommand::new(DriveDirection::Forward, 9000)).unwrap();
        assert!(s.is_awake());
        assert_eq!(a.duty(), 4095);
    }
}
