// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Experiment phase sequencing.
//!
//! The phase logic is the pure function [`transition`]; [`ExperimentSequencer`] gathers the
//! inputs it needs once per loop iteration, applies it, and performs the entry actions of the
//! new phase. Every path into [`Phase::StopTest`] stops all motors.
//!
//! Grip and vibrate:
//!
//! ```text
//! RetractMotor -> BackOffFinger -> ZeroLoadCell -> ApplyForce -> RunTest -> StopTest
//!      ^                                |  (retry)                             |
//!      +--------------------------------+-------------------------- (restart) -+
//! ```
//!
//! Friction:
//!
//! ```text
//! RemoveMass -> ZeroLoadCell -> AddMass -> RunTest -> ReturnCarriage -> StopTest
//! ```

use core::mem::discriminant;

use micromath::F32Ext;

use crate::config::{Protocol, ProtocolConfig};
use crate::control::force::{ForceController, MoveStatus};
use crate::drivers::h_bridge::{DriveCommand, Motor};
use crate::drivers::hx711::ForceAmplifier;
use crate::drivers::indicator::StatusLamp;
use crate::drivers::switch::Edge;
use crate::error::{DriverError, RigError, SensorError};
use crate::protocol::telemetry::{ContactRecord, TelemetrySink};
use crate::rig::actuator::MotionStage;
use crate::sensors::encoder::PositionProbe;
use crate::sensors::force::{ForceSample, ForceSensor};
use crate::time::{Clock, Interval, Micros};

/// Why a test ended up in [`Phase::StopTest`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum StopCause {
    /// Run switch turned off during a closed-loop phase.
    Operator,
    /// The run finished normally.
    Completed,
    /// A phase exceeded its time bound.
    Timeout,
    /// The carriage left its allowed excursion.
    PositionLimit,
    /// Carriage homing failed at startup. Not restartable.
    HomingFailed,
    SensorFault,
    DriverFault,
}

impl StopCause {
    /// Whether the stop indicates something went wrong.
    pub fn is_fault(self) -> bool {
        !matches!(self, StopCause::Operator | StopCause::Completed)
    }

    pub fn name(self) -> &'static str {
        match self {
            StopCause::Operator => "operator",
            StopCause::Completed => "completed",
            StopCause::Timeout => "timeout",
            StopCause::PositionLimit => "position limit",
            StopCause::HomingFailed => "homing failed",
            StopCause::SensorFault => "sensor fault",
            StopCause::DriverFault => "driver fault",
        }
    }
}

/// Sequencer phase with its phase-local data. `since` is the entry time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Phase {
    /// Force-axis homing move in progress. `attempt` counts force-application retries.
    RetractMotor { since: Micros, attempt: u8 },
    /// Waiting for the operator to position the finger (run switch rising edge).
    BackOffFinger { since: Micros },
    /// Waiting for the operator to unload the load cell (rising edge).
    RemoveMass { since: Micros },
    /// Averaging load-cell samples into a new zero offset.
    ZeroLoadCell { since: Micros, attempt: u8 },
    /// Waiting for the operator to load the mass (falling edge).
    AddMass { since: Micros },
    /// Force servo active. `valid_since` is when the force last entered the acceptance band.
    ApplyForce {
        since: Micros,
        valid_since: Option<Micros>,
        attempt: u8,
    },
    RunTest { since: Micros },
    /// Friction protocol: drive the carriage back to its start.
    ReturnCarriage { since: Micros },
    StopTest { cause: StopCause },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::RetractMotor { .. } => "retract motor",
            Phase::BackOffFinger { .. } => "back off finger",
            Phase::RemoveMass { .. } => "remove mass",
            Phase::ZeroLoadCell { .. } => "zero load cell",
            Phase::AddMass { .. } => "add mass",
            Phase::ApplyForce { .. } => "apply force",
            Phase::RunTest { .. } => "run test",
            Phase::ReturnCarriage { .. } => "return carriage",
            Phase::StopTest { .. } => "stop test",
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Phase::StopTest { .. })
    }
}

/// Everything [`transition`] looks at, sampled once per loop iteration.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PhaseInputs {
    pub now: Micros,
    pub run_edge: Option<Edge>,
    /// The force-axis homing move finished this iteration.
    pub retract_done: bool,
    /// The zero offset was established this iteration.
    pub zero_done: bool,
    /// Fresh filtered force, N, if a conversion arrived this iteration.
    pub force: Option<f32>,
    /// Largest absolute carriage position, mm.
    pub excursion: f32,
    pub fault: Option<StopCause>,
}

impl PhaseInputs {
    pub fn at(now: Micros) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    fn rose(&self) -> bool {
        self.run_edge == Some(Edge::Rising)
    }

    fn fell(&self) -> bool {
        self.run_edge == Some(Edge::Falling)
    }
}

/// First phase of a protocol.
pub fn initial_phase(config: &ProtocolConfig, now: Micros) -> Phase {
    match config.protocol {
        Protocol::GripAndVibrate { .. } => Phase::RetractMotor {
            since: now,
            attempt: 0,
        },
        Protocol::Friction { .. } => Phase::RemoveMass { since: now },
    }
}

/// Phase a stopped test restarts from.
fn restart_phase(config: &ProtocolConfig, now: Micros) -> Phase {
    match config.protocol {
        Protocol::GripAndVibrate { .. } => initial_phase(config, now),
        Protocol::Friction { .. } => Phase::ZeroLoadCell {
            since: now,
            attempt: 0,
        },
    }
}

#[inline]
fn expired(now: Micros, since: Micros, limit: Micros) -> bool {
    now.wrapping_sub(since) >= limit
}

#[inline]
fn operator_expired(config: &ProtocolConfig, now: Micros, since: Micros) -> bool {
    config
        .timeouts
        .operator_us
        .is_some_and(|limit| expired(now, since, limit))
}

/// Next phase given the current one and this iteration's inputs.
///
/// Pure: no I/O, no clock reads. Entry actions belong to the caller.
pub fn transition(config: &ProtocolConfig, phase: Phase, inputs: &PhaseInputs) -> Phase {
    if let Phase::StopTest { cause } = phase {
        let restart = inputs.rose() && config.restartable && cause != StopCause::HomingFailed;
        return if restart {
            restart_phase(config, inputs.now)
        } else {
            phase
        };
    }
    if let Some(cause) = inputs.fault {
        return Phase::StopTest { cause };
    }
    match config.protocol {
        Protocol::GripAndVibrate {
            target_force,
            threshold,
            hold_us,
            run_us,
            position_limit_mm,
            max_retries,
        } => {
            let now = inputs.now;
            let timeouts = &config.timeouts;
            match phase {
                Phase::RetractMotor { since, attempt } => {
                    if inputs.retract_done {
                        if attempt == 0 {
                            Phase::BackOffFinger { since: now }
                        } else {
                            Phase::ZeroLoadCell { since: now, attempt }
                        }
                    } else if expired(now, since, timeouts.retract_us) {
                        Phase::StopTest {
                            cause: StopCause::Timeout,
                        }
                    } else {
                        phase
                    }
                }
                Phase::BackOffFinger { since } => {
                    if inputs.rose() {
                        Phase::ZeroLoadCell {
                            since: now,
                            attempt: 0,
                        }
                    } else if operator_expired(config, now, since) {
                        Phase::StopTest {
                            cause: StopCause::Timeout,
                        }
                    } else {
                        phase
                    }
                }
                Phase::ZeroLoadCell { since, attempt } => {
                    if inputs.zero_done {
                        Phase::ApplyForce {
                            since: now,
                            valid_since: None,
                            attempt,
                        }
                    } else if expired(now, since, timeouts.zero_us) {
                        Phase::StopTest {
                            cause: StopCause::Timeout,
                        }
                    } else {
                        phase
                    }
                }
                Phase::ApplyForce {
                    since,
                    valid_since,
                    attempt,
                } => {
                    if inputs.fell() {
                        return Phase::StopTest {
                            cause: StopCause::Operator,
                        };
                    }
                    // Any sample outside the band restarts the hold timer.
                    let valid_since = match inputs.force {
                        Some(force) if (force - target_force).abs() <= threshold => {
                            valid_since.or(Some(now))
                        }
                        Some(_) => None,
                        None => valid_since,
                    };
                    if valid_since.is_some_and(|valid| expired(now, valid, hold_us)) {
                        Phase::RunTest { since: now }
                    } else if expired(now, since, timeouts.apply_force_us) {
                        if attempt < max_retries {
                            Phase::RetractMotor {
                                since: now,
                                attempt: attempt + 1,
                            }
                        } else {
                            Phase::StopTest {
                                cause: StopCause::Timeout,
                            }
                        }
                    } else {
                        Phase::ApplyForce {
                            since,
                            valid_since,
                            attempt,
                        }
                    }
                }
                Phase::RunTest { since } => {
                    if inputs.fell() {
                        Phase::StopTest {
                            cause: StopCause::Operator,
                        }
                    } else if inputs.excursion > position_limit_mm {
                        Phase::StopTest {
                            cause: StopCause::PositionLimit,
                        }
                    } else if run_us.is_some_and(|limit| expired(now, since, limit)) {
                        Phase::StopTest {
                            cause: StopCause::Completed,
                        }
                    } else {
                        phase
                    }
                }
                _ => phase,
            }
        }
        Protocol::Friction {
            run_timeout_us,
            return_timeout_us,
            ..
        } => {
            let now = inputs.now;
            match phase {
                Phase::RemoveMass { since } => {
                    if inputs.rose() {
                        Phase::ZeroLoadCell {
                            since: now,
                            attempt: 0,
                        }
                    } else if operator_expired(config, now, since) {
                        Phase::StopTest {
                            cause: StopCause::Timeout,
                        }
                    } else {
                        phase
                    }
                }
                Phase::ZeroLoadCell { since, .. } => {
                    if inputs.zero_done {
                        Phase::AddMass { since: now }
                    } else if expired(now, since, config.timeouts.zero_us) {
                        Phase::StopTest {
                            cause: StopCause::Timeout,
                        }
                    } else {
                        phase
                    }
                }
                Phase::AddMass { since } => {
                    if inputs.fell() {
                        Phase::RunTest { since: now }
                    } else if operator_expired(config, now, since) {
                        Phase::StopTest {
                            cause: StopCause::Timeout,
                        }
                    } else {
                        phase
                    }
                }
                Phase::RunTest { since } => {
                    if inputs.rose() {
                        Phase::ReturnCarriage { since: now }
                    } else if expired(now, since, run_timeout_us) {
                        Phase::StopTest {
                            cause: StopCause::Timeout,
                        }
                    } else {
                        phase
                    }
                }
                Phase::ReturnCarriage { since } => {
                    if inputs.fell() {
                        Phase::StopTest {
                            cause: StopCause::Completed,
                        }
                    } else if expired(now, since, return_timeout_us) {
                        Phase::StopTest {
                            cause: StopCause::Timeout,
                        }
                    } else {
                        phase
                    }
                }
                _ => phase,
            }
        }
    }
}

/// Runs one protocol on the rig.
///
/// `S` moves the carriage (or only reads the switches), `O` senses the object for contact
/// telemetry, and `L` is lit while the test is in a fault stop.
pub struct ExperimentSequencer<S, M, A, O = (), L = ()> {
    stage: S,
    force: ForceController<M>,
    sensor: ForceSensor<A>,
    object: O,
    lamp: L,
    config: ProtocolConfig,
    phase: Phase,
    log: Interval,
    last_force: Option<ForceSample>,
    transitions: u32,
}

impl<S, M, A> ExperimentSequencer<S, M, A, (), ()>
where
    S: MotionStage,
    M: Motor,
    A: ForceAmplifier,
{
    pub fn new(
        stage: S,
        force: ForceController<M>,
        sensor: ForceSensor<A>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            stage,
            force,
            sensor,
            object: (),
            lamp: (),
            phase: initial_phase(&config, 0),
            log: Interval::new(config.log_period_us),
            config,
            last_force: None,
            transitions: 0,
        }
    }
}

impl<S, M, A, O, L> ExperimentSequencer<S, M, A, O, L>
where
    S: MotionStage,
    M: Motor,
    A: ForceAmplifier,
    O: PositionProbe,
    L: StatusLamp,
{
    /// Log the object position from `object` in contact records.
    pub fn with_object<P: PositionProbe>(self, object: P) -> ExperimentSequencer<S, M, A, P, L> {
        ExperimentSequencer {
            stage: self.stage,
            force: self.force,
            sensor: self.sensor,
            object,
            lamp: self.lamp,
            config: self.config,
            phase: self.phase,
            log: self.log,
            last_force: self.last_force,
            transitions: self.transitions,
        }
    }

    pub fn with_status_lamp<P: StatusLamp>(self, lamp: P) -> ExperimentSequencer<S, M, A, O, P> {
        ExperimentSequencer {
            stage: self.stage,
            force: self.force,
            sensor: self.sensor,
            object: self.object,
            lamp,
            config: self.config,
            phase: self.phase,
            log: self.log,
            last_force: self.last_force,
            transitions: self.transitions,
        }
    }

    /// Bring up the force motor, home the carriage and tare the load cell, then enter the
    /// first phase. On failure the sequencer is left in a stop with the matching cause.
    pub fn initialize<C: Clock>(&mut self, clock: &C) -> Result<(), RigError> {
        if let Err(e) = self.force.initialize() {
            self.halt(StopCause::DriverFault, clock.now_us());
            return Err(e.into());
        }
        if let Err(e) = self.stage.initialize(clock) {
            let cause = match e {
                RigError::Homing { .. } => StopCause::HomingFailed,
                RigError::Driver(_) => StopCause::DriverFault,
                RigError::Sensor(_) => StopCause::SensorFault,
            };
            error!("carriage bring-up failed: {=str}", cause.name());
            self.halt(cause, clock.now_us());
            return Err(e);
        }
        if let Err(e) = self.sensor.initialize(clock) {
            self.halt(StopCause::SensorFault, clock.now_us());
            return Err(e.into());
        }
        let now = clock.now_us();
        self.change(initial_phase(&self.config, now), now);
        Ok(())
    }

    /// One loop iteration: sample inputs, act for the current phase, then transition.
    pub fn tick<C: Clock, T: TelemetrySink>(&mut self, clock: &C, sink: &mut T) -> Phase {
        let now = clock.now_us();
        self.stage.poll_inputs(now);

        let mut inputs = PhaseInputs {
            now,
            run_edge: self.stage.run_edge(),
            ..PhaseInputs::default()
        };
        if let Err(cause) = self.act(now, sink, &mut inputs) {
            inputs.fault = Some(cause);
        }
        inputs.excursion = self.stage.excursion();

        let next = transition(&self.config, self.phase, &inputs);
        if discriminant(&next) != discriminant(&self.phase) {
            self.change(next, now);
        } else {
            self.phase = next;
        }
        self.phase
    }

    /// Per-phase work for this iteration. Fills in what the transition needs.
    fn act<T: TelemetrySink>(
        &mut self,
        now: Micros,
        sink: &mut T,
        inputs: &mut PhaseInputs,
    ) -> Result<(), StopCause> {
        match self.phase {
            Phase::RetractMotor { .. } => {
                let status = self.force.poll(now).map_err(driver_fault)?;
                inputs.retract_done = status != MoveStatus::Moving;
            }
            Phase::ZeroLoadCell { .. } => match self.sensor.poll_zero() {
                Ok(offset) => {
                    info!("load cell zeroed, offset {=f32} N", offset);
                    inputs.zero_done = true;
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => return Err(sensor_fault(e)),
            },
            Phase::ApplyForce { .. } => {
                inputs.force = self.read_force(now)?;
                if let (Some(target), Some(sample)) = (self.target_force(), self.last_force) {
                    self.force
                        .force_control(target, sample.force, now)
                        .map_err(driver_fault)?;
                }
            }
            Phase::RunTest { .. } => {
                inputs.force = self.read_force(now)?;
                if let (Some(target), Some(sample)) = (self.target_force(), self.last_force) {
                    self.force
                        .force_control(target, sample.force, now)
                        .map_err(driver_fault)?;
                    self.stage.step(now, sink).map_err(driver_fault)?;
                }
                self.log_contact(now, sink);
            }
            Phase::ReturnCarriage { .. } => {
                inputs.force = self.read_force(now)?;
            }
            Phase::BackOffFinger { .. }
            | Phase::RemoveMass { .. }
            | Phase::AddMass { .. }
            | Phase::StopTest { .. } => {}
        }
        Ok(())
    }

    fn read_force(&mut self, now: Micros) -> Result<Option<f32>, StopCause> {
        match self.sensor.read_non_blocking_filtered(now) {
            Ok(sample) => {
                self.last_force = Some(sample);
                Ok(Some(sample.force))
            }
            Err(nb::Error::WouldBlock) => Ok(None),
            Err(nb::Error::Other(e)) => Err(sensor_fault(e)),
        }
    }

    fn target_force(&self) -> Option<f32> {
        match self.config.protocol {
            Protocol::GripAndVibrate { target_force, .. } => Some(target_force),
            Protocol::Friction { .. } => None,
        }
    }

    fn log_contact<T: TelemetrySink>(&mut self, now: Micros, sink: &mut T) {
        let Some(sample) = self.last_force else {
            return;
        };
        if self.log.ready_at(now) {
            sink.emit(&ContactRecord {
                timestamp_ms: now / 1_000,
                object_position: self.object.read_position(),
                force_timestamp_ms: sample.timestamp / 1_000,
                force: sample.force,
            });
        }
    }

    /// Switch to `next` and run its entry actions. A driver fault while entering a working
    /// phase diverts to a stop instead.
    fn change(&mut self, next: Phase, now: Micros) {
        info!("phase: {=str} -> {=str}", self.phase.name(), next.name());
        self.transitions = self.transitions.wrapping_add(1);
        self.phase = next;
        if let Phase::StopTest { cause } = next {
            self.enter_stop(cause);
            return;
        }
        self.lamp.set(false);
        if let Err(e) = self.enter(next, now) {
            error!("driver fault entering {=str}: {}", next.name(), e);
            self.phase = Phase::StopTest {
                cause: StopCause::DriverFault,
            };
            self.enter_stop(StopCause::DriverFault);
        }
    }

    fn enter(&mut self, phase: Phase, now: Micros) -> Result<(), DriverError> {
        match phase {
            Phase::RetractMotor { attempt, .. } => {
                self.stage.stop()?;
                if attempt > 0 {
                    warn!("force not held, retry {=u8}", attempt);
                }
                self.force.home(now)
            }
            Phase::ZeroLoadCell { .. } => {
                self.stage.stop()?;
                self.force.stop()?;
                self.last_force = None;
                self.sensor.begin_zero();
                Ok(())
            }
            Phase::ApplyForce { .. } => {
                // Clean integral for the new attempt.
                self.force.stop()
            }
            Phase::RunTest { .. } => {
                self.log.reset();
                if let Protocol::Friction { drive_duty, .. } = self.config.protocol {
                    let drag = DriveCommand::new(self.force.retract_direction(), drive_duty);
                    self.force.drive_open_loop(drag)?;
                }
                Ok(())
            }
            Phase::ReturnCarriage { .. } => {
                if let Protocol::Friction { return_duty, .. } = self.config.protocol {
                    let back =
                        DriveCommand::new(self.force.retract_direction().opposite(), return_duty);
                    self.force.drive_open_loop(back)?;
                }
                Ok(())
            }
            Phase::BackOffFinger { .. } | Phase::RemoveMass { .. } | Phase::AddMass { .. } => {
                self.stage.stop()?;
                self.force.stop()
            }
            Phase::StopTest { .. } => Ok(()),
        }
    }

    /// Stop everything, whatever fails along the way.
    fn enter_stop(&mut self, cause: StopCause) {
        let stage = self.stage.stop();
        let force = self.force.stop();
        if stage.and(force).is_err() {
            error!("motor stop reported a fault");
        }
        self.lamp.set(cause.is_fault());
        if cause.is_fault() {
            warn!("test stopped: {=str}", cause.name());
        } else {
            info!("test stopped: {=str}", cause.name());
        }
    }

    fn halt(&mut self, cause: StopCause, now: Micros) {
        self.change(Phase::StopTest { cause }, now);
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of phase changes so far.
    #[inline]
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    #[inline]
    pub fn last_force(&self) -> Option<ForceSample> {
        self.last_force
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    pub fn force(&self) -> &ForceController<M> {
        &self.force
    }

    pub fn sensor(&self) -> &ForceSensor<A> {
        &self.sensor
    }

    pub fn lamp(&self) -> &L {
        &self.lamp
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}

fn driver_fault(e: DriverError) -> StopCause {
    error!("driver fault: {}", e);
    StopCause::DriverFault
}

fn sensor_fault(e: SensorError) -> StopCause {
    error!("load cell fault: {}", e);
    StopCause::SensorFault
}
