// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Haptic Finger Firmware
//!
//! Firmware for the haptic finger test rig: two position-servoed DC motors move a carriage
//! along an oscillating trajectory while a third motor presses a finger into the object with
//! a servoed contact force measured by a load cell. Targets an STM32F777 MCU; everything
//! outside [`hw`] also builds on the host, where the [`sim`] bench stands in for the hardware.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`hw`] | MCU-level wrappers around timers, PWM, GPIO and USART (MCU builds only) |
//! | [`drivers`] | Device-level drivers (H-bridge, HX711, quadrature counter, switches) |
//! | [`sensors`] | Calibrated encoder position and load-cell force |
//! | [`control`] | PID laws, trajectory, position and force controllers |
//! | [`rig`] | Dual-axis actuator, experiment sequencer, bench diagnostics |
//! | [`protocol`] | Binary telemetry records |
//! | [`config`] | Rig configuration and build-time presets |
//! | [`sim`] | Simulated clock, motors and plants for tests and the host bench |
//!
//! ## Getting Started
//!
//! Run the tests and the simulated bench on the host:
//!
//! ```bash
//! cargo test
//! cargo run
//! ```
//!
//! Flash the board:
//!
//! ```bash
//! cargo run --release --target thumbv7em-none-eabihf
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod protocol;
pub mod rig;
pub mod sensors;
pub mod sim;
pub mod time;

#[cfg(target_os = "none")]
pub mod hw;

pub use config::RigConfig;
pub use error::{AxisId, DriverError, HomingError, RigError, SensorError};
