// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Calibrated sensors built on the raw drivers.

pub mod encoder;
pub mod force;

pub use encoder::{EndStopHoming, PositionProbe, QuadratureEncoder};
pub use force::{ForceReading, ForceSample, ForceSensor};
