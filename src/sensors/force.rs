// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Calibrated, zeroed and filtered contact force from a load-cell amplifier.
//!
//! Readings pass through calibration (`raw * slope + intercept`), offset removal, friction
//! compensation and an exponential filter, in that order. The amplifier converts on its own
//! schedule; between conversions the non-blocking reads return `WouldBlock` and the caller
//! keeps its previous value.

use micromath::F32Ext;

use crate::config::{FrictionModel, ForceSensorConfig};
use crate::drivers::hx711::ForceAmplifier;
use crate::error::SensorError;
use crate::time::{Clock, Micros, Stopwatch};

/// Everything derived from the most recent conversion.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ForceReading {
    pub raw_counts: i32,
    /// Calibrated and zeroed, N.
    pub calibrated_force: f32,
    /// Exponentially filtered compensated force, N.
    pub filtered_force: f32,
    /// Zero offset removed from every reading, N.
    pub offset: f32,
    /// Correction added by friction compensation, N.
    pub friction_estimate: f32,
    pub timestamp: Micros,
}

impl ForceReading {
    /// Compensated, unfiltered force.
    #[inline]
    pub fn compensated_force(&self) -> f32 {
        self.calibrated_force + self.friction_estimate
    }
}

/// One sample as handed to the control code.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ForceSample {
    pub force: f32,
    pub timestamp: Micros,
}

/// Apply a [`FrictionModel`] to a force reading. Tensile (non-negative) readings pass through.
pub fn compensate(model: &FrictionModel, force: f32) -> f32 {
    if force >= 0.0 {
        force
    } else if force >= model.breakpoint {
        model.near.apply(force)
    } else {
        model.far.apply(force)
    }
}

#[derive(Copy, Clone, Debug)]
struct ZeroAccumulator {
    sum: f32,
    count: u16,
}

pub struct ForceSensor<A> {
    amp: A,
    config: ForceSensorConfig,
    reading: ForceReading,
    seeded: bool,
    zeroing: Option<ZeroAccumulator>,
}

impl<A: ForceAmplifier> ForceSensor<A> {
    pub fn new(amp: A, config: ForceSensorConfig) -> Self {
        Self {
            amp,
            config,
            reading: ForceReading::default(),
            seeded: false,
            zeroing: None,
        }
    }

    /// Tare the amplifier. Blocks for at most the configured zero timeout.
    pub fn initialize<C: Clock>(&mut self, clock: &C) -> Result<(), SensorError> {
        self.reading = ForceReading::default();
        self.seeded = false;
        self.zero(clock)?;
        info!("load cell tared, offset {=f32} N", self.reading.offset);
        Ok(())
    }

    #[inline]
    fn calibrate(&self, raw: i32) -> f32 {
        raw as f32 * self.config.slope + self.config.intercept
    }

    /// Piecewise-linear correction for compressive readings; identity without a model.
    pub fn friction_compensation(&self, force: f32) -> f32 {
        match &self.config.friction {
            Some(model) => compensate(model, force),
            None => force,
        }
    }

    fn ingest(&mut self, raw: i32, now: Micros) {
        let calibrated = self.calibrate(raw) - self.reading.offset;
        let compensated = self.friction_compensation(calibrated);
        self.reading.raw_counts = raw;
        self.reading.calibrated_force = calibrated;
        self.reading.friction_estimate = compensated - calibrated;
        self.reading.timestamp = now;
    }

    /// Newest conversion, calibrated and compensated but unfiltered.
    pub fn read_non_blocking(&mut self, now: Micros) -> nb::Result<ForceSample, SensorError> {
        let raw = self.amp.try_read()?;
        self.ingest(raw, now);
        Ok(ForceSample {
            force: self.reading.compensated_force(),
            timestamp: now,
        })
    }

    /// Like [`read_non_blocking`](Self::read_non_blocking) but returns the filtered force.
    /// The filter is seeded with the first sample.
    pub fn read_non_blocking_filtered(
        &mut self,
        now: Micros,
    ) -> nb::Result<ForceSample, SensorError> {
        let sample = self.read_non_blocking(now)?;
        let filtered = if self.seeded {
            let alpha = self.config.alpha;
            alpha * sample.force + (1.0 - alpha) * self.reading.filtered_force
        } else {
            self.seeded = true;
            sample.force
        };
        self.reading.filtered_force = filtered;
        Ok(ForceSample {
            force: filtered,
            timestamp: now,
        })
    }

    /// Start collecting samples for a new zero offset.
    pub fn begin_zero(&mut self) {
        self.zeroing = Some(ZeroAccumulator { sum: 0.0, count: 0 });
    }

    /// Feed the zeroing average with one conversion if available. Completes with the new
    /// offset once enough samples have been averaged.
    pub fn poll_zero(&mut self) -> nb::Result<f32, SensorError> {
        let wanted = self.config.zero_samples.max(1);
        let raw = self.amp.try_read()?;
        let calibrated = self.calibrate(raw);
        let acc = self.zeroing.get_or_insert(ZeroAccumulator { sum: 0.0, count: 0 });
        acc.sum += calibrated;
        acc.count += 1;
        if acc.count < wanted {
            return Err(nb::Error::WouldBlock);
        }
        let offset = acc.sum / acc.count as f32;
        self.zeroing = None;
        self.reading.offset = offset;
        self.seeded = false;
        Ok(offset)
    }

    /// Blocking zero bounded by the configured timeout.
    pub fn zero<C: Clock>(&mut self, clock: &C) -> Result<f32, SensorError> {
        let timeout = self.config.zero_timeout_us;
        let watch = Stopwatch::start(clock);
        self.begin_zero();
        loop {
            match self.poll_zero() {
                Ok(offset) => return Ok(offset),
                Err(nb::Error::Other(e)) => {
                    self.zeroing = None;
                    return Err(e);
                }
                Err(nb::Error::WouldBlock) => {}
            }
            if watch.elapsed_us(clock) >= timeout {
                self.zeroing = None;
                warn!("load cell zero timed out after {=u32} us", timeout);
                return Err(SensorError::Timeout(timeout));
            }
        }
    }

    #[inline]
    pub fn latest(&self) -> ForceReading {
        self.reading
    }

    #[inline]
    pub fn offset(&self) -> f32 {
        self.reading.offset
    }

    /// Absolute difference between filtered and unfiltered force, for diagnostics.
    pub fn filter_lag(&self) -> f32 {
        (self.reading.filtered_force - self.reading.compensated_force()).abs()
    }

    pub fn amplifier(&mut self) -> &mut A {
        &mut self.amp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinearSegment;
    use crate::sim::{SimClock, SimLoadCell};

    fn config(alpha: f32) -> ForceSensorConfig {
        ForceSensorConfig {
            slope: 0.001,
            intercept: 0.5,
            alpha,
            zero_samples: 4,
            zero_timeout_us: 1_000_000,
            friction: None,
        }
    }

    #[test]
    fn stale_between_conversions() {
        let clock = SimClock::new();
        let cell = SimLoadCell::new(&clock, 1_000, 2_000);
        let mut sensor = ForceSensor::new(&cell, config(1.0));

        let first = sensor.read_non_blocking(clock.peek()).unwrap();
        assert!((first.force - 2.5).abs() < 1e-6);
        cell.set_raw(3_000);
        assert_eq!(sensor.read_non_blocking(500), Err(nb::Error::WouldBlock));
        assert_eq!(sensor.latest().raw_counts, 2_000);
        clock.advance(1_000);
        assert!((sensor.read_non_blocking(1_000).unwrap().force - 3.5).abs() < 1e-6);
    }

    #[test]
    fn filter_converges_for_any_alpha() {
        for alpha in [0.05f32, 0.2, 0.5, 0.9, 1.0] {
            let clock = SimClock::new();
            let cell = SimLoadCell::new(&clock, 10, 0);
            let mut sensor = ForceSensor::new(&cell, config(alpha));
            sensor.read_non_blocking_filtered(0).unwrap();

            cell.set_raw(4_000);
            let mut last = 0.0;
            let n = if alpha < 0.2 { 400 } else { 40 };
            for i in 1..=n {
                clock.advance(10);
                last = sensor.read_non_blocking_filtered(i * 10).unwrap().force;
            }
            assert!((last - 4.5).abs() < 1e-3, "alpha {} -> {}", alpha, last);
        }
    }

    #[test]
    fn constant_input_seeds_without_warmup() {
        for alpha in [0.01f32, 0.3, 1.0] {
            let clock = SimClock::new();
            let cell = SimLoadCell::new(&clock, 10, 1_000);
            let mut sensor = ForceSensor::new(&cell, config(alpha));
            for i in 0..20u32 {
                clock.advance(10);
                let f = sensor.read_non_blocking_filtered(i).unwrap().force;
                assert!((f - 1.5).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn zero_then_read_is_zero() {
        let clock = SimClock::stepping(100);
        let cell = SimLoadCell::new(&clock, 250, -7_321);
        let mut sensor = ForceSensor::new(&cell, config(0.2));
        let offset = sensor.zero(&clock).unwrap();
        assert!((offset - (-7.321 + 0.5)).abs() < 1e-4);

        clock.advance(1_000);
        let sample = sensor.read_non_blocking(clock.peek()).unwrap();
        assert!(sample.force.abs() < 1e-4);
        assert!(sensor.latest().calibrated_force.abs() < 1e-4);
    }

    #[test]
    fn zero_times_out_without_conversions() {
        let clock = SimClock::stepping(1_000);
        let cell = SimLoadCell::new(&clock, u32::MAX, 0);
        let mut sensor = ForceSensor::new(&cell, config(0.2));
        assert_eq!(sensor.zero(&clock), Err(SensorError::Timeout(1_000_000)));
    }

    #[test]
    fn friction_compensation_only_touches_compression() {
        let model = FrictionModel {
            breakpoint: -1.0,
            near: LinearSegment {
                slope: 1.12,
                intercept: 0.0,
            },
            far: LinearSegment {
                slope: 1.05,
                intercept: -0.07,
            },
        };
        assert_eq!(compensate(&model, 0.8), 0.8);
        assert!((compensate(&model, -0.5) - (-0.56)).abs() < 1e-6);
        assert!((compensate(&model, -2.0) - (-2.17)).abs() < 1e-6);
        // Both segments meet at the breakpoint.
        assert!((model.near.apply(-1.0) - model.far.apply(-1.0)).abs() < 1e-6);
    }
}
