// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! `embedded-hal` 1.0 views of the MCU HAL's typed pins and timer PWM channels.
//!
//! The STM32F7 HAL implements the 0.2 traits (`digital::v2`, `PwmPin`), while every driver in
//! this crate is written against 1.0. These wrappers forward one to the other and nothing else.

use core::convert::Infallible;

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use embedded_hal_02::digital::v2 as digital_02;
use embedded_hal_02::PwmPin;

/// Push-pull output pin.
pub struct CompatOutput<P>(P);

impl<P> CompatOutput<P>
where
    P: digital_02::OutputPin<Error = Infallible>,
{
    #[inline]
    pub fn new(pin: P) -> Self {
        Self(pin)
    }

    pub fn free(self) -> P {
        self.0
    }
}

impl<P> digital::ErrorType for CompatOutput<P> {
    type Error = Infallible;
}

impl<P> OutputPin for CompatOutput<P>
where
    P: digital_02::OutputPin<Error = Infallible>,
{
    #[inline]
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set_low()
    }

    #[inline]
    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set_high()
    }
}

/// Digital input pin.
pub struct CompatInput<P>(P);

impl<P> CompatInput<P>
where
    P: digital_02::InputPin<Error = Infallible>,
{
    #[inline]
    pub fn new(pin: P) -> Self {
        Self(pin)
    }

    pub fn free(self) -> P {
        self.0
    }
}

impl<P> digital::ErrorType for CompatInput<P> {
    type Error = Infallible;
}

impl<P> InputPin for CompatInput<P>
where
    P: digital_02::InputPin<Error = Infallible>,
{
    #[inline]
    fn is_high(&mut self) -> Result<bool, Infallible> {
        self.0.is_high()
    }

    #[inline]
    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.0.is_low()
    }
}

/// One timer PWM channel. Full scale is whatever the timer period gives the channel.
pub struct CompatPwm<P>(P);

impl<P> CompatPwm<P>
where
    P: PwmPin<Duty = u16>,
{
    /// Take the channel, zero its duty and enable the output.
    pub fn new(mut channel: P) -> Self {
        channel.set_duty(0);
        channel.enable();
        Self(channel)
    }

    pub fn free(self) -> P {
        self.0
    }
}

impl<P> pwm::ErrorType for CompatPwm<P> {
    type Error = Infallible;
}

impl<P> SetDutyCycle for CompatPwm<P>
where
    P: PwmPin<Duty = u16>,
{
    #[inline]
    fn max_duty_cycle(&self) -> u16 {
        self.0.get_max_duty()
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
        let max = self.0.get_max_duty();
        self.0.set_duty(duty.min(max));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PWM_MAX_DUTY;
    use crate::drivers::{DriveCommand, DriveDirection, Motor, MotorDriver};
    use core::cell::Cell;

    /// Timer channel with a 20 kHz period at a 108 MHz timer clock.
    struct TimerChannel<'a> {
        duty: &'a Cell<u16>,
        enabled: &'a Cell<bool>,
    }

    impl PwmPin for TimerChannel<'_> {
        type Duty = u16;

        fn disable(&mut self) {
            self.enabled.set(false);
        }

        fn enable(&mut self) {
            self.enabled.set(true);
        }

        fn get_duty(&self) -> u16 {
            self.duty.get()
        }

        fn get_max_duty(&self) -> u16 {
            5400
        }

        fn set_duty(&mut self, duty: u16) {
            self.duty.set(duty);
        }
    }

    struct Level<'a>(&'a Cell<bool>);

    impl digital_02::OutputPin for Level<'_> {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    impl digital_02::InputPin for Level<'_> {
        type Error = Infallible;

        fn is_high(&self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }

        fn is_low(&self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
    }

    #[test]
    fn channel_is_enabled_at_zero_duty() {
        let (duty, enabled) = (Cell::new(1234), Cell::new(false));
        let mut pwm = CompatPwm::new(TimerChannel {
            duty: &duty,
            enabled: &enabled,
        });
        assert!(enabled.get());
        assert_eq!(duty.get(), 0);
        assert_eq!(pwm.max_duty_cycle(), 5400);

        pwm.set_duty_cycle(9000).unwrap();
        assert_eq!(duty.get(), 5400);
    }

    #[test]
    fn motor_full_scale_maps_onto_the_timer_period() {
        let (d1, d2, e1, e2) = (Cell::new(0), Cell::new(0), Cell::new(false), Cell::new(false));
        let nsleep = Cell::new(false);
        let mut motor = MotorDriver::new(
            CompatPwm::new(TimerChannel {
                duty: &d1,
                enabled: &e1,
            }),
            CompatPwm::new(TimerChannel {
                duty: &d2,
                enabled: &e2,
            }),
            CompatOutput::new(Level(&nsleep)),
            PWM_MAX_DUTY,
        );
        motor.initialize().unwrap();
        assert!(nsleep.get());

        motor
            .drive(DriveCommand::new(DriveDirection::Reverse, PWM_MAX_DUTY))
            .unwrap();
        assert_eq!((d1.get(), d2.get()), (0, 5400));

        motor
            .drive(DriveCommand::new(DriveDirection::Forward, PWM_MAX_DUTY / 2))
            .unwrap();
        assert_eq!(d2.get(), 0);
        assert!((2695..=2700).contains(&d1.get()), "duty {}", d1.get());

        motor.stop().unwrap();
        assert_eq!((d1.get(), d2.get()), (0, 0));
        assert!(!nsleep.get());
    }

    #[test]
    fn input_reads_through() {
        let level = Cell::new(false);
        let mut pin = CompatInput::new(Level(&level));
        assert!(pin.is_low().unwrap());
        level.set(true);
        assert!(pin.is_high().unwrap());
    }
}
