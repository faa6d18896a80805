// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! MCU-level wrappers for the STM32F777. Only built for the target.

pub mod clock;
pub mod delay;
pub mod encoder;
pub mod exti;
pub mod pins;
pub mod pwm;
pub mod usart;

pub use clock::MonoTimer;
pub use delay::CycleDelay;
pub use encoder::Encoder;
pub use pins::BoardPins;
pub use pwm::{CarriagePwm, Channel};
pub use usart::Usart;
