// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Rig configuration.
//!
//! Everything tunable lives in one [`RigConfig`] value that the firmware builds once at
//! startup from compile-time constants and hands, by value, to each component. Control code
//! never reads configuration from global state.

use micromath::F32Ext;

use crate::drivers::h_bridge::DriveDirection;
use crate::error::AxisId;
use crate::time::Micros;

/// Standard gravity, m/s².
pub const STANDARD_GRAVITY: f32 = 9.81;

/// Axis control loop rate.
pub const CONTROL_LOOP_HZ: u32 = 40_000;

/// Axis control period derived from [`CONTROL_LOOP_HZ`] (25 µs).
pub const CONTROL_PERIOD_US: Micros = 1_000_000 / CONTROL_LOOP_HZ;

/// Logical full-scale motor duty. Timer channels rescale it to their own period.
pub const PWM_MAX_DUTY: u16 = 4095;

/// Encoder slope used before an axis has been homed, mm per tick.
pub const DEFAULT_SLOPE_MM_PER_TICK: f32 = 0.005;

/// MCU pin identifier, `port` letter plus pin number (e.g. `PD12`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinId {
    pub port: char,
    pub number: u8,
}

impl PinId {
    pub const fn new(port: char, number: u8) -> Self {
        Self { port, number }
    }
}

/// Where an axis gets its quadrature ticks from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncoderChannel {
    /// TIM2 in encoder mode (32-bit).
    Tim2,
    /// TIM3 in encoder mode (16-bit, extended in software).
    Tim3,
    /// Software decoding from pin-change interrupts on two pins.
    Interrupt { a: PinId, b: PinId },
    /// The axis has no encoder.
    None,
}

/// PID tuning for one axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Anti-windup bound on the integral accumulator.
    pub integral_clamp: f32,
    /// Largest duty the controller may command.
    pub max_duty: u16,
    /// Minimum time between two executions of the control law.
    pub period_us: Micros,
}

/// End-stop homing parameters for a position axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HomingConfig {
    /// Drive direction toward the end stop.
    pub direction: DriveDirection,
    /// Fixed, low homing duty.
    pub duty: u16,
    /// Time spent backing away from the end stop before approaching it.
    pub backoff_us: Micros,
    /// A stall is declared after this long without tick progress.
    pub stall_window_us: Micros,
    /// Ticks that must be observed during the approach before a stall counts.
    pub min_travel_ticks: u32,
    /// Hard bound on the whole homing move.
    pub timeout_us: Micros,
}

/// Tick-to-millimetre conversion for an encoder.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EncoderCalibration {
    /// mm per tick; the sign corrects for mounting direction.
    pub slope: f32,
    /// Position reported at the end stop, mm.
    pub end_stop_offset: f32,
}

impl Default for EncoderCalibration {
    fn default() -> Self {
        Self {
            slope: DEFAULT_SLOPE_MM_PER_TICK,
            end_stop_offset: 0.0,
        }
    }
}

/// Static description of one physical axis. Immutable after construction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AxisConfig {
    pub id: AxisId,
    pub pwm_a: PinId,
    pub pwm_b: PinId,
    pub sleep: PinId,
    pub encoder: EncoderChannel,
    pub pid: PidConfig,
    pub homing: HomingConfig,
    pub calibration: EncoderCalibration,
}

/// A fixed-duty, fixed-duration motor move.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OpenLoopMove {
    pub direction: DriveDirection,
    pub duty: u16,
    pub duration_us: Micros,
}

/// Force-axis behavior beyond its PID tuning.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ForceAxisConfig {
    pub axis: AxisConfig,
    /// Release stored mechanical energy before zeroing.
    pub retract: OpenLoopMove,
    /// Gentle re-seat after the release; `None` performs the plain retract only.
    pub engage: Option<OpenLoopMove>,
}

/// Shape of the commanded carriage motion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Waveform {
    /// `A·sin(2πft)` with the amplitude derived from the target peak acceleration.
    Sinusoid,
    /// Asymmetric constant-acceleration profile for stick-slip transport.
    StickSlip,
}

/// Trajectory generator settings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrajectoryConfig {
    pub waveform: Waveform,
    pub frequency_hz: f32,
    pub min_accel_g: f32,
    pub max_accel_g: f32,
    /// Rate at which `sample()` is called.
    pub sample_rate_hz: f32,
    /// Soft-start window over which the acceleration target ramps up.
    pub soft_start_s: f32,
    /// Hard bound on the derived amplitude, mm.
    pub max_amplitude_mm: f32,
}

impl TrajectoryConfig {
    /// Trajectory settings for a tabulated frequency.
    pub fn from_preset(preset: FrequencyPreset) -> Self {
        Self {
            waveform: Waveform::StickSlip,
            frequency_hz: preset.frequency_hz,
            min_accel_g: preset.min_accel_g,
            max_accel_g: preset.max_accel_g,
            sample_rate_hz: CONTROL_LOOP_HZ as f32,
            soft_start_s: 2.0,
            max_amplitude_mm: 6.0,
        }
    }
}

/// Empirically tuned acceleration bounds for one excitation frequency.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrequencyPreset {
    pub frequency_hz: f32,
    pub min_accel_g: f32,
    pub max_accel_g: f32,
}

impl FrequencyPreset {
    /// Deployment table. No 100 Hz entry: the current mechanism cannot run it.
    pub const TABLE: [FrequencyPreset; 8] = [
        FrequencyPreset::new(2.0, 0.0085, 0.18),
        FrequencyPreset::new(5.0, 0.05, 0.5),
        FrequencyPreset::new(10.0, 0.25, 150.0),
        FrequencyPreset::new(20.0, 0.6, 150.0),
        FrequencyPreset::new(30.0, 2.25, 150.0),
        FrequencyPreset::new(40.0, 3.0, 50.0),
        FrequencyPreset::new(60.0, 5.0, 100.0),
        FrequencyPreset::new(80.0, 5.0, 250.0),
    ];

    pub const fn new(frequency_hz: f32, min_accel_g: f32, max_accel_g: f32) -> Self {
        Self {
            frequency_hz,
            min_accel_g,
            max_accel_g,
        }
    }

    /// Look up the preset for `frequency_hz`.
    pub fn lookup(frequency_hz: f32) -> Option<FrequencyPreset> {
        Self::TABLE
            .iter()
            .copied()
            .find(|p| (p.frequency_hz - frequency_hz).abs() < 1e-3)
    }
}

/// One linear piece of the friction correction: `slope * force + intercept`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinearSegment {
    pub slope: f32,
    pub intercept: f32,
}

impl LinearSegment {
    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        self.slope * x + self.intercept
    }
}

/// Piecewise-linear correction for compressive (negative) force readings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrictionModel {
    /// Split point, N (negative).
    pub breakpoint: f32,
    /// Segment for readings between the breakpoint and zero.
    pub near: LinearSegment,
    /// Segment for readings beyond the breakpoint.
    pub far: LinearSegment,
}

/// Load-cell calibration and filtering.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ForceSensorConfig {
    /// N per amplifier count.
    pub slope: f32,
    /// N.
    pub intercept: f32,
    /// Exponential filter weight of the newest sample, in (0, 1].
    pub alpha: f32,
    /// Samples averaged by `zero()`.
    pub zero_samples: u16,
    /// Bound on a blocking `zero()`.
    pub zero_timeout_us: Micros,
    pub friction: Option<FrictionModel>,
}

/// Carriage control loop and plotting cadence.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ActuatorConfig {
    pub control_period_us: Micros,
    /// Axis telemetry period; `None` disables plotting.
    pub plot_period_us: Option<Micros>,
}

/// Experiment protocol selected for this build.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Protocol {
    /// Release, operator back-off, zero, press to a target force, vibrate the carriage.
    GripAndVibrate {
        /// Target contact force, N (compressive is negative).
        target_force: f32,
        /// Half-width of the acceptance band around the target, N.
        threshold: f32,
        /// Time the force must stay inside the band before the run starts.
        hold_us: Micros,
        /// Run length; `None` runs until the operator stops it.
        run_us: Option<Micros>,
        /// Carriage excursion that aborts the run, mm.
        position_limit_mm: f32,
        /// Force-application attempts after the first before giving up.
        max_retries: u8,
    },
    /// Drag a mass at constant motor duty and log force against object position.
    Friction {
        drive_duty: u16,
        run_timeout_us: Micros,
        /// Retract move used to bring the carriage back.
        return_duty: u16,
        return_timeout_us: Micros,
    },
}

impl Protocol {
    /// Static friction run: slow pull until the mass breaks away.
    pub const fn static_friction() -> Self {
        Protocol::Friction {
            drive_duty: 700,
            run_timeout_us: 10_000_000,
            return_duty: 4000,
            return_timeout_us: 10_000_000,
        }
    }

    /// Kinetic friction run. `multiplier` stretches the run and slows the pull by the same
    /// factor so the travelled distance stays constant.
    pub fn kinetic_friction(multiplier: f32) -> Self {
        let multiplier = if multiplier > 0.0 { multiplier } else { 1.0 };
        Protocol::Friction {
            drive_duty: (2000.0 / multiplier) as u16,
            run_timeout_us: (10_000_000.0 * multiplier) as Micros,
            return_duty: 4000,
            return_timeout_us: 10_000_000,
        }
    }
}

/// Per-phase time bounds for the sequencer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhaseTimeouts {
    pub retract_us: Micros,
    pub zero_us: Micros,
    pub apply_force_us: Micros,
    /// Bound on waiting for the operator; `None` waits indefinitely.
    pub operator_us: Option<Micros>,
}

/// Sequencer configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProtocolConfig {
    pub protocol: Protocol,
    pub timeouts: PhaseTimeouts,
    /// Contact telemetry period during the run phase.
    pub log_period_us: Micros,
    /// Whether a stopped test restarts on the next run-switch rising edge.
    pub restartable: bool,
}

/// What the firmware does after boot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Run the selected protocol.
    Experiment,
    /// Report switch changes until each switch has flipped `flips` times.
    InputCheck { flips: u8 },
    /// Report encoder position changes.
    EncoderCheck,
}

/// Complete rig configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RigConfig {
    pub carriage: [AxisConfig; 2],
    pub force_axis: ForceAxisConfig,
    pub object_calibration: EncoderCalibration,
    pub trajectory: TrajectoryConfig,
    pub actuator: ActuatorConfig,
    pub force_sensor: ForceSensorConfig,
    pub sequencer: ProtocolConfig,
    /// Switch debounce interval.
    pub debounce_us: Micros,
    pub run_mode: RunMode,
}

/// Position-law tuning shared by both carriage motors.
pub const CARRIAGE_PID: PidConfig = PidConfig {
    kp: 4500.0,
    // Integral gain per second of accumulated error (6 counts per 25 µs tick).
    ki: 240_000.0,
    kd: 0.0,
    integral_clamp: 0.017,
    max_duty: PWM_MAX_DUTY,
    period_us: CONTROL_PERIOD_US,
};

pub const CARRIAGE_HOMING: HomingConfig = HomingConfig {
    direction: DriveDirection::Reverse,
    duty: 600,
    backoff_us: 150_000,
    stall_window_us: 100_000,
    min_travel_ticks: 20,
    timeout_us: 5_000_000,
};

/// Carriage encoders read mm from the centre of travel; the homing stop sits 4 mm below it.
pub const CARRIAGE_CALIBRATION: EncoderCalibration = EncoderCalibration {
    slope: DEFAULT_SLOPE_MM_PER_TICK,
    end_stop_offset: -4.0,
};

/// Force-law tuning.
pub const FORCE_PID: PidConfig = PidConfig {
    kp: 600.0,
    ki: 2.0,
    kd: 0.0,
    integral_clamp: 100.0,
    max_duty: 2000,
    period_us: 100_000,
};

/// Board wiring for the three motor axes.
pub mod board {
    use super::{EncoderChannel, PinId};

    pub const CARRIAGE_1_PWM_A: PinId = PinId::new('D', 12);
    pub const CARRIAGE_1_PWM_B: PinId = PinId::new('D', 13);
    pub const CARRIAGE_1_SLEEP: PinId = PinId::new('A', 4);

    pub const CARRIAGE_2_PWM_A: PinId = PinId::new('D', 14);
    pub const CARRIAGE_2_PWM_B: PinId = PinId::new('D', 15);
    pub const CARRIAGE_2_SLEEP: PinId = PinId::new('D', 2);

    pub const FORCE_PWM_A: PinId = PinId::new('E', 9);
    pub const FORCE_PWM_B: PinId = PinId::new('E', 11);
    pub const FORCE_SLEEP: PinId = PinId::new('E', 7);

    pub const OBJECT_ENCODER: EncoderChannel = EncoderChannel::Interrupt {
        a: PinId::new('B', 0),
        b: PinId::new('B', 1),
    };

    /// Rocker switches, active low with internal pull-ups.
    pub const RUN_SWITCH: PinId = PinId::new('C', 6);
    pub const DIRECTION_SWITCH: PinId = PinId::new('C', 7);
    pub const MODE_SWITCH: PinId = PinId::new('C', 8);

    pub const HX711_DOUT: PinId = PinId::new('B', 4);
    pub const HX711_SCK: PinId = PinId::new('B', 5);

    /// Red LED, active low.
    pub const STATUS_LED: PinId = PinId::new('D', 8);
    /// Toggled once per driven control tick.
    pub const LOOP_PROBE: PinId = PinId::new('E', 2);
}

impl RigConfig {
    /// Deployment defaults for the given excitation preset and protocol.
    pub fn new(preset: FrequencyPreset, protocol: Protocol) -> Self {
        let carriage_1 = AxisConfig {
            id: AxisId::Carriage1,
            pwm_a: board::CARRIAGE_1_PWM_A,
            pwm_b: board::CARRIAGE_1_PWM_B,
            sleep: board::CARRIAGE_1_SLEEP,
            encoder: EncoderChannel::Tim2,
            pid: CARRIAGE_PID,
            homing: CARRIAGE_HOMING,
            calibration: CARRIAGE_CALIBRATION,
        };
        let carriage_2 = AxisConfig {
            id: AxisId::Carriage2,
            pwm_a: board::CARRIAGE_2_PWM_A,
            pwm_b: board::CARRIAGE_2_PWM_B,
            sleep: board::CARRIAGE_2_SLEEP,
            encoder: EncoderChannel::Tim3,
            ..carriage_1
        };
        let force_axis = ForceAxisConfig {
            axis: AxisConfig {
                id: AxisId::Force,
                pwm_a: board::FORCE_PWM_A,
                pwm_b: board::FORCE_PWM_B,
                sleep: board::FORCE_SLEEP,
                encoder: EncoderChannel::None,
                pid: FORCE_PID,
                homing: CARRIAGE_HOMING,
                calibration: EncoderCalibration::default(),
            },
            retract: OpenLoopMove {
                direction: DriveDirection::Forward,
                duty: 4000,
                duration_us: 10_000_000,
            },
            engage: Some(OpenLoopMove {
                direction: DriveDirection::Reverse,
                duty: 800,
                duration_us: 500_000,
            }),
        };

        Self {
            carriage: [carriage_1, carriage_2],
            force_axis,
            object_calibration: EncoderCalibration {
                slope: -0.005,
                end_stop_offset: 0.0,
            },
            trajectory: TrajectoryConfig::from_preset(preset),
            actuator: ActuatorConfig {
                control_period_us: CONTROL_PERIOD_US,
                plot_period_us: None,
            },
            force_sensor: ForceSensorConfig {
                slope: 2.36e-5,
                intercept: 0.0,
                alpha: 0.2,
                zero_samples: 10,
                zero_timeout_us: 2_000_000,
                friction: Some(FrictionModel {
                    breakpoint: -1.0,
                    near: LinearSegment {
                        slope: 1.12,
                        intercept: 0.0,
                    },
                    far: LinearSegment {
                        slope: 1.05,
                        intercept: -0.07,
                    },
                }),
            },
            sequencer: ProtocolConfig {
                protocol,
                timeouts: PhaseTimeouts {
                    retract_us: 12_000_000,
                    zero_us: 3_000_000,
                    apply_force_us: 10_000_000,
                    operator_us: None,
                },
                log_period_us: 1_000,
                restartable: true,
            },
            debounce_us: 20_000,
            run_mode: RunMode::Experiment,
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::GripAndVibrate {
            target_force: -2.0,
            threshold: 0.15,
            hold_us: 500_000,
            run_us: None,
            position_limit_mm: 8.0,
            max_retries: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_lookup_finds_tabulated_frequencies() {
        let p = FrequencyPreset::lookup(10.0).expect("10 Hz is tabulated");
        assert_eq!(p.min_accel_g, 0.25);
        assert_eq!(p.max_accel_g, 150.0);
        assert!(FrequencyPreset::lookup(100.0).is_none());
    }

    #[test]
    fn kinetic_multiplier_trades_speed_for_time() {
        match Protocol::kinetic_friction(2.0) {
            Protocol::Friction {
                drive_duty,
                run_timeout_us,
                ..
            } => {
                assert_eq!(drive_duty, 1000);
                assert_eq!(run_timeout_us, 20_000_000);
            }
            other => panic!("unexpected protocol {:?}", other),
        }
    }

    #[test]
    fn control_period_matches_loop_rate() {
        assert_eq!(CONTROL_PERIOD_US, 25);
    }
}
