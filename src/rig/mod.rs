// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Rig
//!
//! Top-level orchestration.
//!
//! - [`actuator`] – dual-axis carriage loop driven by the operator switches
//! - [`sequencer`] – experiment phases, timeouts and fail-safe stops
//! - [`diagnostics`] – switch and encoder bench checks

pub mod actuator;
pub mod diagnostics;
pub mod sequencer;

pub use actuator::{DualAxisActuator, InputsOnly, MotionStage, StageTick};
pub use diagnostics::{EncoderMonitor, SwitchMonitor};
pub use sequencer::{transition, ExperimentSequencer, Phase, PhaseInputs, StopCause};
