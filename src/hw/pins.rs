// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Pin definitions for the haptic finger board (STM32F777).
//!
//! The wiring matches [`crate::config::board`].

use stm32f7xx_hal::{
    gpio::{
        gpioa, gpiob, gpioc, gpiod, gpioe, Alternate, Floating, Input, Output, PullUp, PushPull,
    },
    pac,
    prelude::*,
};

/// All board pins. Construct this once at startup using:
///
/// ```rust,ignore
/// let pins = BoardPins::new(dp.GPIOA, dp.GPIOB, dp.GPIOC, dp.GPIOD, dp.GPIOE);
/// ```
pub struct BoardPins {
    pub usart1: Usart1Pins,
    pub carriage_1: Carriage1Pins,
    pub carriage_2: Carriage2Pins,
    pub force: ForcePins,
    pub encoder: EncoderPins,
    pub object: ObjectEncoderPins,
    pub switches: SwitchPins,
    pub hx711: Hx711Pins,
    /// Red LED, active low.
    pub status_led: gpiod::PD8<Output<PushPull>>,
    pub loop_probe: gpioe::PE2<Output<PushPull>>,
}

pub struct Usart1Pins {
    pub tx: gpioa::PA9<Alternate<7>>,
    pub rx: gpioa::PA10<Alternate<7>>,
}

/// Carriage 1 bridge
pub struct Carriage1Pins {
    pub in1: gpiod::PD12<Alternate<2>>, // TIM4_CH1 (PWM)
    pub in2: gpiod::PD13<Alternate<2>>, // TIM4_CH2 (PWM)
    pub nsleep: gpioa::PA4<Output<PushPull>>,
}

/// Carriage 2 bridge
pub struct Carriage2Pins {
    pub in1: gpiod::PD14<Alternate<2>>, // TIM4_CH3 (PWM)
    pub in2: gpiod::PD15<Alternate<2>>, // TIM4_CH4 (PWM)
    pub nsleep: gpiod::PD2<Output<PushPull>>,
}

/// Finger (force axis) bridge
pub struct ForcePins {
    pub in1: gpioe::PE9<Alternate<1>>,  // TIM1_CH1 (PWM)
    pub in2: gpioe::PE11<Alternate<1>>, // TIM1_CH2 (PWM)
    pub nsleep: gpioe::PE7<Output<PushPull>>,
}

/// TIM2/TIM3 Quadrature Encoder Inputs
pub struct EncoderPins {
    pub tim2_ch1: gpioa::PA0<Alternate<1>>,
    pub tim2_ch2: gpioa::PA1<Alternate<1>>,

    pub tim3_ch1: gpioa::PA6<Alternate<2>>,
    pub tim3_ch2: gpioa::PA7<Alternate<2>>,
}

/// Passive object encoder, decoded from EXTI lines 0 and 1.
pub struct ObjectEncoderPins {
    pub a: gpiob::PB0<Input<PullUp>>,
    pub b: gpiob::PB1<Input<PullUp>>,
}

/// Rocker switches, closed to ground.
pub struct SwitchPins {
    pub run: gpioc::PC6<Input<PullUp>>,
    pub direction: gpioc::PC7<Input<PullUp>>,
    pub mode: gpioc::PC8<Input<PullUp>>,
}

pub struct Hx711Pins {
    pub dout: gpiob::PB4<Input<Floating>>,
    pub sck: gpiob::PB5<Output<PushPull>>,
}

impl BoardPins {
    /// Create all named pins from raw GPIO peripherals.
    pub fn new(
        gpioa: pac::GPIOA,
        gpiob: pac::GPIOB,
        gpioc: pac::GPIOC,
        gpiod: pac::GPIOD,
        gpioe: pac::GPIOE,
    ) -> Self {
        let gpioa = gpioa.split();
        let gpiob = gpiob.split();
        let gpioc = gpioc.split();
        let gpiod = gpiod.split();
        let gpioe = gpioe.split();

        // Bridges come up asleep and the HX711 clock idles low.
        let mut carriage_1_sleep = gpioa.pa4.into_push_pull_output();
        let mut carriage_2_sleep = gpiod.pd2.into_push_pull_output();
        let mut force_sleep = gpioe.pe7.into_push_pull_output();
        let mut hx711_sck = gpiob.pb5.into_push_pull_output();
        carriage_1_sleep.set_low();
        carriage_2_sleep.set_low();
        force_sleep.set_low();
        hx711_sck.set_low();

        Self {
            usart1: Usart1Pins {
                tx: gpioa.pa9.into_alternate::<7>(),
                rx: gpioa.pa10.into_alternate::<7>(),
            },

            carriage_1: Carriage1Pins {
                in1: gpiod.pd12.into_alternate::<2>(),
                in2: gpiod.pd13.into_alternate::<2>(),
                nsleep: carriage_1_sleep,
            },

            carriage_2: Carriage2Pins {
                in1: gpiod.pd14.into_alternate::<2>(),
                in2: gpiod.pd15.into_alternate::<2>(),
                nsleep: carriage_2_sleep,
            },

            force: ForcePins {
                in1: gpioe.pe9.into_alternate::<1>(),
                in2: gpioe.pe11.into_alternate::<1>(),
                nsleep: force_sleep,
            },

            encoder: EncoderPins {
                tim2_ch1: gpioa.pa0.into_alternate::<1>(),
                tim2_ch2: gpioa.pa1.into_alternate::<1>(),
                tim3_ch1: gpioa.pa6.into_alternate::<2>(),
                tim3_ch2: gpioa.pa7.into_alternate::<2>(),
            },

            object: ObjectEncoderPins {
                a: gpiob.pb0.into_pull_up_input(),
                b: gpiob.pb1.into_pull_up_input(),
            },

            switches: SwitchPins {
                run: gpioc.pc6.into_pull_up_input(),
                direction: gpioc.pc7.into_pull_up_input(),
                mode: gpioc.pc8.into_pull_up_input(),
            },

            hx711: Hx711Pins {
                dout: gpiob.pb4.into_floating_input(),
                sck: hx711_sck,
            },

            status_led: gpiod.pd8.into_push_pull_output(),
            loop_probe: gpioe.pe2.into_push_pull_output(),
        }
    }
}
