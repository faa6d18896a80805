// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Device Drivers
//!
//! Hardware-independent drivers written against `embedded-hal` traits. They sit above the
//! MCU-specific `hw/` layer and below the control code.
//!
//! - [`h_bridge`] – dual-PWM H-bridge with nSLEEP (DRV8873-style IN/IN wiring)
//! - [`quadrature`] – interrupt-driven quadrature tick counter
//! - [`hx711`] – HX711 24-bit load-cell amplifier
//! - [`switch`] – debounced operator rocker switches
//! - [`indicator`] – status LED / loop probe output
//! - [`compat`] – `embedded-hal` 1.0 wrappers for the MCU HAL's pins and PWM channels

pub mod compat;
pub mod h_bridge;
pub mod hx711;
pub mod indicator;
pub mod quadrature;
pub mod switch;

pub use compat::{CompatInput, CompatOutput, CompatPwm};
pub use h_bridge::{DriveCommand, DriveDirection, Motor, MotorDriver};
pub use hx711::{ForceAmplifier, Gain, Hx711};
pub use indicator::{ActiveLevel, Indicator, StatusLamp};
pub use quadrature::{QuadratureCounter, TickSource};
pub use switch::{Debouncer, Direction, Edge, Mode, OperatorInputs, SwitchBank, UserInputs};
