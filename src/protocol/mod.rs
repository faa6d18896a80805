// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Binary telemetry over the serial link.

pub mod parser;
pub mod telemetry;

pub use parser::RecordReader;
pub use telemetry::{AxisRecord, ContactRecord, Record, TelemetrySink};
