// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Control
//!
//! Closed-loop control for the rig.
//!
//! - [`pid`] – rate-gated PID core with position and force laws
//! - [`trajectory`] – carriage motion profile
//! - [`position`] – carriage servo and end-stop homing
//! - [`force`] – contact-force servo and force-axis homing moves

pub mod force;
pub mod pid;
pub mod position;
pub mod trajectory;

pub use force::{ForceController, MoveStatus};
pub use pid::{ControlLaw, ForceLaw, Pid, PidState, PositionLaw};
pub use position::{PositionAxis, PositionController, ServoAxis};
pub use trajectory::TrajectoryGenerator;
