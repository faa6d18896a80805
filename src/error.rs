// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Error taxonomy for the rig.
//!
//! Stale sensor data is not an error: non-blocking reads return `nb::Error::WouldBlock` and
//! the caller keeps its previous value. Switch bounce never surfaces at all.

use embedded_hal::{digital, pwm};
use thiserror::Error;

use crate::time::Micros;

/// Identifies one of the rig's motorized axes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum AxisId {
    /// First carriage motor.
    Carriage1,
    /// Second carriage motor.
    Carriage2,
    /// Contact-force motor.
    Force,
}

impl AxisId {
    pub fn name(self) -> &'static str {
        match self {
            AxisId::Carriage1 => "carriage-1",
            AxisId::Carriage2 => "carriage-2",
            AxisId::Force => "force",
        }
    }
}

/// H-bridge output fault.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum DriverError {
    #[error("pwm channel fault: {0:?}")]
    Pwm(pwm::ErrorKind),
    #[error("sleep pin fault: {0:?}")]
    Pin(digital::ErrorKind),
}

impl DriverError {
    pub(crate) fn pwm<E: pwm::Error>(e: E) -> Self {
        DriverError::Pwm(e.kind())
    }

    pub(crate) fn pin<E: digital::Error>(e: E) -> Self {
        DriverError::Pin(e.kind())
    }
}

/// End-stop homing did not establish a position reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum HomingError {
    /// The encoder moved but never stalled against the end stop.
    #[error("end stop not detected within {timeout_us} us")]
    Timeout { timeout_us: Micros },
    /// The encoder never changed: motor, driver or encoder wiring fault.
    #[error("no encoder motion within {timeout_us} us")]
    NoMotion { timeout_us: Micros },
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Load-cell amplifier fault.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum SensorError {
    /// The amplifier produced no conversion within the allotted time.
    #[error("amplifier not ready within {0} us")]
    Timeout(Micros),
    /// A GPIO used to clock the amplifier failed.
    #[error("amplifier bus fault: {0:?}")]
    Bus(digital::ErrorKind),
}

impl SensorError {
    pub(crate) fn bus<E: digital::Error>(e: E) -> Self {
        SensorError::Bus(e.kind())
    }
}

/// Top-level rig fault, as reported by the orchestration layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum RigError {
    #[error("homing failed on {axis:?}: {source}")]
    Homing { axis: AxisId, source: HomingError },
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Sensor(#[from] SensorError),
}
