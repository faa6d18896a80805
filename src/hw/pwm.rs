// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Motor PWM on TIM4 (carriages) and TIM1 (finger) through the HAL timer API.
//!
//! Channels are handed out as [`Channel`]s, i.e. HAL channels behind `SetDutyCycle`. Their full
//! scale is the timer period, so drivers scale with `set_duty_cycle_fraction`.

use stm32f7xx_hal::{
    gpio::{gpiod, gpioe, Alternate},
    pac,
    prelude::*,
    rcc::Clocks,
    timer::{PwmChannel, C1, C2, C3, C4},
};

use crate::drivers::CompatPwm;

/// One running PWM channel of `TIM`.
pub type Channel<TIM, C> = CompatPwm<PwmChannel<TIM, C>>;

/// TIM4 CH1..CH4 outputs: carriage 1 IN1/IN2, then carriage 2 IN1/IN2.
pub type CarriagePwmPins = (
    gpiod::PD12<Alternate<2>>,
    gpiod::PD13<Alternate<2>>,
    gpiod::PD14<Alternate<2>>,
    gpiod::PD15<Alternate<2>>,
);

/// TIM1 CH1/CH2 outputs: finger IN1/IN2.
pub type ForcePwmPins = (gpioe::PE9<Alternate<1>>, gpioe::PE11<Alternate<1>>);

/// Carriage motor channels, in IN1/IN2 order per axis.
pub struct CarriagePwm {
    pub carriage_1: (Channel<pac::TIM4, C1>, Channel<pac::TIM4, C2>),
    pub carriage_2: (Channel<pac::TIM4, C3>, Channel<pac::TIM4, C4>),
}

/// Start edge-aligned PWM on all four TIM4 channels, every channel enabled at zero duty.
pub fn tim4(
    tim4: pac::TIM4,
    pins: CarriagePwmPins,
    frequency_hz: u32,
    clocks: &Clocks,
) -> CarriagePwm {
    let (c1_a, c1_b, c2_a, c2_b) = tim4.pwm_hz(pins, frequency_hz.Hz(), clocks).split();
    CarriagePwm {
        carriage_1: (CompatPwm::new(c1_a), CompatPwm::new(c1_b)),
        carriage_2: (CompatPwm::new(c2_a), CompatPwm::new(c2_b)),
    }
}

/// Start PWM on TIM1 CH1/CH2 for the finger motor.
pub fn tim1(
    tim1: pac::TIM1,
    pins: ForcePwmPins,
    frequency_hz: u32,
    clocks: &Clocks,
) -> (Channel<pac::TIM1, C1>, Channel<pac::TIM1, C2>) {
    let (a, b) = tim1.pwm_hz(pins, frequency_hz.Hz(), clocks).split();
    (CompatPwm::new(a), CompatPwm::new(b))
}
