// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Calibrated linear position from a quadrature tick source.
//!
//! The tick counter itself is owned by the interrupt handler and never written from here.
//! Zeroing records a reference tick and all positions are measured relative to it.

use crate::config::{EncoderCalibration, DEFAULT_SLOPE_MM_PER_TICK};
use crate::drivers::quadrature::TickSource;
use crate::error::HomingError;
use crate::time::Clock;

/// Something that can drive an axis into its end stop while watching a tick source.
pub trait EndStopHoming {
    fn go_to_end_stop<S, C>(&mut self, ticks: &S, clock: &C) -> Result<(), HomingError>
    where
        S: TickSource + ?Sized,
        C: Clock;
}

/// Read-only view of a linear position sensor.
pub trait PositionProbe {
    /// Position in mm.
    fn read_position(&self) -> f32;

    fn is_homed(&self) -> bool;
}

pub struct QuadratureEncoder<S> {
    source: S,
    reference: i32,
    calibration: EncoderCalibration,
    homed: bool,
}

impl<S: TickSource> QuadratureEncoder<S> {
    pub fn new(source: S, calibration: EncoderCalibration) -> Self {
        Self {
            source,
            reference: 0,
            calibration,
            homed: false,
        }
    }

    /// Take the current count as the provisional origin. The interrupt decoding behind the
    /// source must already be attached.
    pub fn initialize(&mut self) {
        self.reference = self.source.ticks();
        self.homed = false;
    }

    /// Home against the end stop, then zero there.
    pub fn calibrate<H, C>(&mut self, homing: &mut H, clock: &C) -> Result<(), HomingError>
    where
        H: EndStopHoming + ?Sized,
        C: Clock,
    {
        self.homed = false;
        homing.go_to_end_stop(&self.source, clock)?;
        self.zero();
        self.homed = true;
        Ok(())
    }

    /// Declare the current position as the reference without moving. For passive encoders
    /// that have no motor to home with.
    pub fn calibrate_in_place(&mut self) {
        self.zero();
        self.homed = true;
    }

    /// Move the origin to the current count.
    #[inline]
    pub fn zero(&mut self) {
        self.reference = self.source.ticks();
    }

    /// Ticks since the origin.
    #[inline]
    pub fn tick_count(&self) -> i32 {
        self.source.ticks().wrapping_sub(self.reference)
    }

    /// Calibrated position once homed; before that, ticks at the default slope.
    pub fn read_position(&self) -> f32 {
        let ticks = self.tick_count() as f32;
        if self.homed {
            ticks * self.calibration.slope + self.calibration.end_stop_offset
        } else {
            ticks * DEFAULT_SLOPE_MM_PER_TICK
        }
    }

    pub fn set_slope(&mut self, slope: f32) {
        self.calibration.slope = slope;
    }

    pub fn set_end_stop_offset(&mut self, offset: f32) {
        self.calibration.end_stop_offset = offset;
    }

    #[inline]
    pub fn calibration(&self) -> EncoderCalibration {
        self.calibration
    }

    #[inline]
    pub fn is_homed(&self) -> bool {
        self.homed
    }

    /// Invalidate the reference, e.g. after a homing fault.
    pub fn unhome(&mut self) {
        self.homed = false;
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: TickSource> PositionProbe for QuadratureEncoder<S> {
    fn read_position(&self) -> f32 {
        QuadratureEncoder::read_position(self)
    }

    fn is_homed(&self) -> bool {
        self.homed
    }
}

impl<T: PositionProbe + ?Sized> PositionProbe for &T {
    fn read_position(&self) -> f32 {
        (**self).read_position()
    }

    fn is_homed(&self) -> bool {
        (**self).is_homed()
    }
}

/// No object sensor fitted: always reads zero.
impl PositionProbe for () {
    fn read_position(&self) -> f32 {
        0.0
    }

    fn is_homed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::sim::SimClock;

    struct Ticks(Cell<i32>);

    impl TickSource for Ticks {
        fn ticks(&self) -> i32 {
            self.0.get()
        }
    }

    struct JumpHome;

    impl EndStopHoming for JumpHome {
        fn go_to_end_stop<S, C>(&mut self, _ticks: &S, _clock: &C) -> Result<(), HomingError>
        where
            S: TickSource + ?Sized,
            C: Clock,
        {
            Ok(())
        }
    }

    struct NeverHome;

    impl EndStopHoming for NeverHome {
        fn go_to_end_stop<S, C>(&mut self, _ticks: &S, _clock: &C) -> Result<(), HomingError>
        where
            S: TickSource + ?Sized,
            C: Clock,
        {
            Err(HomingError::NoMotion { timeout_us: 10 })
        }
    }

    fn calibration() -> EncoderCalibration {
        EncoderCalibration {
            slope: -0.01,
            end_stop_offset: 2.0,
        }
    }

    #[test]
    fn unhomed_reads_default_slope() {
        let ticks = Ticks(Cell::new(500));
        let mut enc = QuadratureEncoder::new(&ticks, calibration());
        enc.initialize();
        ticks.0.set(700);
        assert_eq!(enc.tick_count(), 200);
        assert!((enc.read_position() - 200.0 * DEFAULT_SLOPE_MM_PER_TICK).abs() < 1e-6);
    }

    #[test]
    fn calibrate_zeroes_at_the_end_stop() {
        let clock = SimClock::new();
        let ticks = Ticks(Cell::new(-1234));
        let mut enc = QuadratureEncoder::new(&ticks, calibration());
        enc.initialize();
        enc.calibrate(&mut JumpHome, &clock).unwrap();
        assert!(enc.is_homed());
        assert_eq!(enc.read_position(), 2.0);

        ticks.0.set(-1134);
        assert!((enc.read_position() - 1.0).abs() < 1e-6);
        assert_eq!(ticks.ticks(), -1134);
    }

    #[test]
    fn failed_homing_leaves_axis_unhomed() {
        let clock = SimClock::new();
        let ticks = Ticks(Cell::new(0));
        let mut enc = QuadratureEncoder::new(&ticks, calibration());
        enc.initialize();
        assert!(enc.calibrate(&mut NeverHome, &clock).is_err());
        assert!(!enc.is_homed());
    }
}
