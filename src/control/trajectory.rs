// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Commanded carriage motion.
//!
//! One position sample (mm) per control tick from a phase accumulator. Both waveforms are
//! periodic at the configured frequency and are sized from acceleration targets given in g.
//! A soft-start window ramps the acceleration target after every restart.

use core::f32::consts::PI;

use micromath::F32Ext;

use crate::config::{TrajectoryConfig, Waveform, STANDARD_GRAVITY};

/// g to mm/s².
const G_MM: f32 = STANDARD_GRAVITY * 1_000.0;

/// Peak displacement of the stick-slip profile, mm, for accelerations in mm/s².
///
/// The first half-period accelerates at `a_min` for `t1` then brakes at `a_max` to rest at
/// `T/2`; `t1 = a_max / (a_min + a_max) · T/2` makes the velocity vanish exactly there.
pub fn stick_slip_amplitude(frequency_hz: f32, a_min: f32, a_max: f32) -> f32 {
    if frequency_hz <= 0.0 || a_min + a_max <= 0.0 {
        return 0.0;
    }
    let half = 0.5 / frequency_hz;
    let t1 = a_max / (a_min + a_max) * half;
    a_min * t1 * (half - 0.5 * t1) + a_max * (t1 * half - 0.5 * half * half - 0.5 * t1 * t1)
}

/// Sinusoid amplitude, mm, whose peak acceleration at `frequency_hz` is `accel_g`.
pub fn sinusoid_amplitude(frequency_hz: f32, accel_g: f32) -> f32 {
    if frequency_hz <= 0.0 {
        return 0.0;
    }
    let omega = 2.0 * PI * frequency_hz;
    accel_g * G_MM / (omega * omega)
}

pub struct TrajectoryGenerator {
    config: TrajectoryConfig,
    /// Fraction of the current period, `[0, 1)`.
    phase: f32,
    phase_step: f32,
    samples_since_start: u32,
    ramp_samples: u32,
    /// Unramped stick-slip peak, already limited to the amplitude bound.
    stick_slip_peak: f32,
    /// Scale applied to the stick-slip profile to honor the amplitude bound.
    stick_slip_scale: f32,
}

impl TrajectoryGenerator {
    pub fn new(config: TrajectoryConfig) -> Self {
        let mut generator = Self {
            config,
            phase: 0.0,
            phase_step: 0.0,
            samples_since_start: 0,
            ramp_samples: 0,
            stick_slip_peak: 0.0,
            stick_slip_scale: 1.0,
        };
        generator.derive();
        generator
    }

    fn derive(&mut self) {
        let c = &self.config;
        self.phase_step = if c.sample_rate_hz > 0.0 {
            c.frequency_hz / c.sample_rate_hz
        } else {
            0.0
        };
        self.ramp_samples = (c.soft_start_s.max(0.0) * c.sample_rate_hz) as u32;

        let peak =
            stick_slip_amplitude(c.frequency_hz, c.min_accel_g * G_MM, c.max_accel_g * G_MM);
        if peak > c.max_amplitude_mm && peak > 0.0 {
            self.stick_slip_scale = c.max_amplitude_mm / peak;
            self.stick_slip_peak = c.max_amplitude_mm;
        } else {
            self.stick_slip_scale = 1.0;
            self.stick_slip_peak = peak;
        }
    }

    /// Apply new settings. The phase and the soft-start progress are kept so the commanded
    /// position does not jump.
    pub fn reconfigure(&mut self, config: TrajectoryConfig) {
        self.config = config;
        self.derive();
        info!(
            "trajectory reconfigured: {=f32} Hz, amplitude {=f32} mm",
            config.frequency_hz,
            self.amplitude()
        );
    }

    /// Return to phase zero and replay the soft start.
    pub fn restart(&mut self) {
        self.phase = 0.0;
        self.samples_since_start = 0;
    }

    /// Soft-start progress in `[0, 1]`.
    pub fn ramp(&self) -> f32 {
        if self.ramp_samples == 0 || self.samples_since_start >= self.ramp_samples {
            1.0
        } else {
            self.samples_since_start as f32 / self.ramp_samples as f32
        }
    }

    /// Current sinusoid acceleration target, g.
    pub fn accel_target_g(&self) -> f32 {
        let c = &self.config;
        c.min_accel_g + (c.max_accel_g - c.min_accel_g) * self.ramp()
    }

    /// Steady-state peak displacement, mm.
    pub fn amplitude(&self) -> f32 {
        match self.config.waveform {
            Waveform::Sinusoid => {
                sinusoid_amplitude(self.config.frequency_hz, self.config.max_accel_g)
                    .min(self.config.max_amplitude_mm)
            }
            Waveform::StickSlip => self.stick_slip_peak,
        }
    }

    /// Next position sample, mm.
    pub fn sample(&mut self) -> f32 {
        let value = match self.config.waveform {
            Waveform::Sinusoid => {
                let a = sinusoid_amplitude(self.config.frequency_hz, self.accel_target_g())
                    .min(self.config.max_amplitude_mm);
                a * (2.0 * PI * self.phase).sin()
            }
            Waveform::StickSlip => {
                self.ramp() * self.stick_slip_scale * self.stick_slip_at(self.phase)
            }
        };

        self.phase = (self.phase + self.phase_step).fract();
        if self.samples_since_start < self.ramp_samples {
            self.samples_since_start += 1;
        }
        value
    }

    /// Unscaled stick-slip position at `phase`; the second half retraces the first in reverse
    /// time.
    fn stick_slip_at(&self, phase: f32) -> f32 {
        let c = &self.config;
        if c.frequency_hz <= 0.0 {
            return 0.0;
        }
        let period = 1.0 / c.frequency_hz;
        let half = 0.5 * period;
        let t = phase * period;
        let t = if t > half { period - t } else { t };

        let a_min = c.min_accel_g * G_MM;
        let a_max = c.max_accel_g * G_MM;
        if a_min + a_max <= 0.0 {
            return 0.0;
        }
        let t1 = a_max / (a_min + a_max) * half;
        if t <= t1 {
            0.5 * a_min * t * t
        } else {
            let dt = t - t1;
            0.5 * a_min * t1 * t1 + a_min * t1 * dt - 0.5 * a_max * dt * dt
        }
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn config(&self) -> &TrajectoryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrequencyPreset;

    fn sinusoid(frequency_hz: f32, accel_g: f32, soft_start_s: f32) -> TrajectoryConfig {
        TrajectoryConfig {
            waveform: Waveform::Sinusoid,
            frequency_hz,
            min_accel_g: accel_g * 0.1,
            max_accel_g: accel_g,
            sample_rate_hz: 1_000.0,
            soft_start_s,
            max_amplitude_mm: 50.0,
        }
    }

    fn peak_over(gen: &mut TrajectoryGenerator, samples: usize) -> f32 {
        (0..samples).map(|_| gen.sample().abs()).fold(0.0, f32::max)
    }

    #[test]
    fn sinusoid_peak_matches_acceleration() {
        let mut gen = TrajectoryGenerator::new(sinusoid(5.0, 1.0, 0.0));
        let expected = 9_810.0 / (2.0 * PI * 5.0) / (2.0 * PI * 5.0);
        assert!((gen.amplitude() - expected).abs() < 1e-3);
        let peak = peak_over(&mut gen, 200);
        assert!((peak - expected).abs() / expected < 0.01, "peak {}", peak);
    }

    #[test]
    fn phase_wraps_when_frequency_exceeds_sample_rate() {
        let mut gen = TrajectoryGenerator::new(sinusoid(2_750.0, 1.0, 0.0));
        for _ in 0..1_000 {
            gen.sample();
            assert!((0.0..1.0).contains(&gen.phase()), "phase {}", gen.phase());
        }
        // 2.75 cycles per sample returns to zero phase every fourth sample.
        assert!(gen.phase().abs() < 1e-3, "phase {}", gen.phase());
    }

    #[test]
    fn soft_start_grows_amplitude() {
        let mut gen = TrajectoryGenerator::new(sinusoid(5.0, 1.0, 1.0));
        let early = peak_over(&mut gen, 200);
        for _ in 0..1_000 {
            gen.sample();
        }
        let late = peak_over(&mut gen, 200);
        assert!(early < late * 0.6);
        assert_eq!(gen.ramp(), 1.0);
    }

    #[test]
    fn reconfigure_keeps_phase_restart_clears_it() {
        let mut gen = TrajectoryGenerator::new(sinusoid(5.0, 1.0, 0.0));
        for _ in 0..37 {
            gen.sample();
        }
        let phase = gen.phase();
        gen.reconfigure(sinusoid(10.0, 1.0, 0.0));
        assert_eq!(gen.phase(), phase);
        gen.restart();
        assert_eq!(gen.phase(), 0.0);
        assert!(gen.sample().abs() < 1e-3);
    }

    #[test]
    fn ten_hertz_stick_slip_is_three_millimetres() {
        let preset = FrequencyPreset::lookup(10.0).unwrap();
        let a = stick_slip_amplitude(10.0, preset.min_accel_g * G_MM, preset.max_accel_g * G_MM);
        assert!((a - 3.06).abs() < 0.05, "amplitude {}", a);
    }

    #[test]
    fn stick_slip_is_periodic_and_bounded() {
        let mut config = TrajectoryConfig::from_preset(FrequencyPreset::lookup(20.0).unwrap());
        config.waveform = Waveform::StickSlip;
        config.soft_start_s = 0.0;
        config.sample_rate_hz = 2_000.0;
        let mut gen = TrajectoryGenerator::new(config);
        let first: [f32; 100] = core::array::from_fn(|_| gen.sample());
        let second: [f32; 100] = core::array::from_fn(|_| gen.sample());
        let peak = gen.amplitude();
        for (a, b) in first.iter().zip(second.iter()) {
            assert!((a - b).abs() < 1e-3);
            assert!(*a >= -1e-6 && *a <= peak + 1e-4);
        }
        assert!(first[0].abs() < 1e-6);
        assert!((first[50] - peak).abs() < 1e-3);
    }

    #[test]
    fn amplitude_bound_is_enforced() {
        let mut config = sinusoid(2.0, 10.0, 0.0);
        config.max_amplitude_mm = 4.0;
        let mut gen = TrajectoryGenerator::new(config);
        assert!(peak_over(&mut gen, 1_000) <= 4.0 + 1e-4);
    }
}
