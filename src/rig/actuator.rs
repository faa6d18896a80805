// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Dual-axis carriage actuator.
//!
//! Two position servos follow one trajectory. Mode and direction switches choose the sign of
//! each axis' target. Both control signals are computed before either motor is driven, so
//! both axes always receive their command in the same tick.

use micromath::F32Ext;

use crate::config::ActuatorConfig;
use crate::control::position::ServoAxis;
use crate::control::trajectory::TrajectoryGenerator;
use crate::drivers::h_bridge::DriveCommand;
use crate::drivers::indicator::StatusLamp;
use crate::drivers::switch::{Direction, Edge, Mode, OperatorInputs, SwitchBank};
use crate::error::{DriverError, RigError};
use crate::protocol::telemetry::{AxisRecord, TelemetrySink};
use crate::time::{Clock, Interval, Micros};

/// Signed target multipliers for each axis.
///
/// Translation moves both carriages together; rotation moves them against each other.
pub const fn multipliers(mode: Mode, direction: Direction) -> (f32, f32) {
    match (mode, direction) {
        (Mode::Translation, Direction::Forward) => (1.0, 1.0),
        (Mode::Translation, Direction::Backward) => (-1.0, -1.0),
        (Mode::Rotation, Direction::Forward) => (1.0, -1.0),
        (Mode::Rotation, Direction::Backward) => (-1.0, 1.0),
    }
}

/// What one call to `step` did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum StageTick {
    /// Run switch off (or axes not homed): motors stopped.
    Stopped,
    /// Running, but the control period has not elapsed.
    Waiting,
    /// Both axes were driven this tick.
    Driven,
}

/// The part of the rig that moves the object, as seen by the sequencer.
pub trait MotionStage {
    /// Home everything that needs homing, one axis at a time.
    fn initialize<C: Clock>(&mut self, clock: &C) -> Result<(), RigError>;

    /// Sample the operator switches. Call exactly once per loop iteration.
    fn poll_inputs(&mut self, now: Micros);

    fn switches(&self) -> SwitchBank;

    fn run_edge(&self) -> Option<Edge>;

    /// One control tick using the switch state from the last [`poll_inputs`](Self::poll_inputs).
    fn step<T: TelemetrySink>(&mut self, now: Micros, sink: &mut T)
        -> Result<StageTick, DriverError>;

    /// Stop every motor of the stage.
    fn stop(&mut self) -> Result<(), DriverError>;

    /// Largest absolute carriage position, mm.
    fn excursion(&self) -> f32;

    /// Poll the inputs and step, i.e. one full scheduler tick.
    fn run<C: Clock, T: TelemetrySink>(
        &mut self,
        clock: &C,
        sink: &mut T,
    ) -> Result<StageTick, DriverError> {
        let now = clock.now_us();
        self.poll_inputs(now);
        self.step(now, sink)
    }
}

/// Tracking state shared with telemetry and diagnostics.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TrackingState {
    pub targets: [f32; 2],
    pub positions: [f32; 2],
    pub commands: [i32; 2],
}

pub struct DualAxisActuator<X1, X2, U, P = ()> {
    axis_1: X1,
    axis_2: X2,
    trajectory: TrajectoryGenerator,
    inputs: U,
    probe: P,
    gate: Interval,
    plot: Option<Interval>,
    running: bool,
    ticks: u32,
    drive_ticks: [Option<u32>; 2],
    tracking: TrackingState,
}

impl<X1, X2, U> DualAxisActuator<X1, X2, U, ()>
where
    X1: ServoAxis,
    X2: ServoAxis,
    U: OperatorInputs,
{
    pub fn new(
        axis_1: X1,
        axis_2: X2,
        trajectory: TrajectoryGenerator,
        inputs: U,
        config: &ActuatorConfig,
    ) -> Self {
        Self {
            axis_1,
            axis_2,
            trajectory,
            inputs,
            probe: (),
            gate: Interval::new(config.control_period_us),
            plot: config.plot_period_us.map(Interval::new),
            running: false,
            ticks: 0,
            drive_ticks: [None; 2],
            tracking: TrackingState::default(),
        }
    }

    /// Toggle `probe` on every driven tick.
    pub fn with_probe<P: StatusLamp>(self, probe: P) -> DualAxisActuator<X1, X2, U, P> {
        DualAxisActuator {
            axis_1: self.axis_1,
            axis_2: self.axis_2,
            trajectory: self.trajectory,
            inputs: self.inputs,
            probe,
            gate: self.gate,
            plot: self.plot,
            running: self.running,
            ticks: self.ticks,
            drive_ticks: self.drive_ticks,
            tracking: self.tracking,
        }
    }
}

impl<X1, X2, U, P> DualAxisActuator<X1, X2, U, P>
where
    X1: ServoAxis,
    X2: ServoAxis,
    U: OperatorInputs,
    P: StatusLamp,
{
    /// Number of driven control ticks so far.
    #[inline]
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Tick index at which each axis was last driven.
    #[inline]
    pub fn drive_ticks(&self) -> [Option<u32>; 2] {
        self.drive_ticks
    }

    #[inline]
    pub fn tracking(&self) -> TrackingState {
        self.tracking
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn axes(&self) -> (&X1, &X2) {
        (&self.axis_1, &self.axis_2)
    }

    pub fn trajectory_mut(&mut self) -> &mut TrajectoryGenerator {
        &mut self.trajectory
    }

    pub fn inputs_mut(&mut self) -> &mut U {
        &mut self.inputs
    }

    fn stop_axes(&mut self) -> Result<(), DriverError> {
        let first = self.axis_1.stop();
        let second = self.axis_2.stop();
        self.tracking.commands = [0, 0];
        first.and(second)
    }

    /// Compute both axis commands from one trajectory sample. Nothing is driven here.
    fn compute_commands(&mut self, now: Micros) -> [DriveCommand; 2] {
        let sample = self.trajectory.sample();
        let bank = self.inputs.switches();
        let (m1, m2) = multipliers(bank.mode, bank.direction);
        let targets = [m1 * sample, m2 * sample];
        let positions = [self.axis_1.position(), self.axis_2.position()];

        let c1 = self.axis_1.control_signal(targets[0], positions[0], now);
        let c2 = self.axis_2.control_signal(targets[1], positions[1], now);
        self.tracking = TrackingState {
            targets,
            positions,
            commands: [c1.signed(), c2.signed()],
        };
        [c1, c2]
    }

    fn emit_plot<T: TelemetrySink>(&mut self, now: Micros, sink: &mut T) {
        let Some(plot) = self.plot.as_mut() else {
            return;
        };
        if plot.ready_at(now) {
            let t = self.tracking;
            sink.emit(&AxisRecord {
                timestamp_ms: now / 1_000,
                target_1: t.targets[0],
                position_1: t.positions[0],
                target_2: t.targets[1],
                position_2: t.positions[1],
            });
        }
    }
}

impl<X1, X2, U, P> MotionStage for DualAxisActuator<X1, X2, U, P>
where
    X1: ServoAxis,
    X2: ServoAxis,
    U: OperatorInputs,
    P: StatusLamp,
{
    fn initialize<C: Clock>(&mut self, clock: &C) -> Result<(), RigError> {
        self.stop_axes()?;
        self.axis_1.home(clock).map_err(|source| RigError::Homing {
            axis: self.axis_1.id(),
            source,
        })?;
        self.axis_2.home(clock).map_err(|source| RigError::Homing {
            axis: self.axis_2.id(),
            source,
        })?;
        self.gate.reset();
        Ok(())
    }

    fn poll_inputs(&mut self, now: Micros) {
        self.inputs.update(now);
    }

    fn switches(&self) -> SwitchBank {
        self.inputs.switches()
    }

    fn run_edge(&self) -> Option<Edge> {
        self.inputs.run_edge()
    }

    fn step<T: TelemetrySink>(
        &mut self,
        now: Micros,
        sink: &mut T,
    ) -> Result<StageTick, DriverError> {
        let run = self.inputs.switches().run;
        if !run || !self.axis_1.is_homed() || !self.axis_2.is_homed() {
            if self.running {
                info!("carriage stopped");
                self.running = false;
            }
            self.stop_axes()?;
            return Ok(StageTick::Stopped);
        }
        if !self.running {
            info!("carriage running");
            self.running = true;
            self.trajectory.restart();
            self.gate.reset();
        }
        if !self.gate.ready_at(now) {
            return Ok(StageTick::Waiting);
        }

        let [c1, c2] = self.compute_commands(now);
        let first = self.axis_1.drive(c1);
        let second = self.axis_2.drive(c2);
        self.drive_ticks = [Some(self.ticks), Some(self.ticks)];
        self.ticks = self.ticks.wrapping_add(1);
        self.probe.toggle();
        if let Err(e) = first.and(second) {
            error!("carriage drive fault: {}", e);
            if let Err(stop) = self.stop_axes() {
                error!("carriage stop after drive fault: {}", stop);
            }
            return Err(e);
        }

        self.emit_plot(now, sink);
        Ok(StageTick::Driven)
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.running = false;
        self.stop_axes()
    }

    fn excursion(&self) -> f32 {
        let [p1, p2] = self.tracking.positions;
        p1.abs().max(p2.abs())
    }
}

/// Stage with no carriage motors: only the operator switches. Used by protocols that do not
/// move the carriage.
pub struct InputsOnly<U> {
    inputs: U,
}

impl<U: OperatorInputs> InputsOnly<U> {
    pub fn new(inputs: U) -> Self {
        Self { inputs }
    }
}

impl<U: OperatorInputs> MotionStage for InputsOnly<U> {
    fn initialize<C: Clock>(&mut self, _clock: &C) -> Result<(), RigError> {
        Ok(())
    }

    fn poll_inputs(&mut self, now: Micros) {
        self.inputs.update(now);
    }

    fn switches(&self) -> SwitchBank {
        self.inputs.switches()
    }

    fn run_edge(&self) -> Option<Edge> {
        self.inputs.run_edge()
    }

    fn step<T: TelemetrySink>(
        &mut self,
        _now: Micros,
        _sink: &mut T,
    ) -> Result<StageTick, DriverError> {
        Ok(StageTick::Stopped)
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn excursion(&self) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FrequencyPreset, Protocol, RigConfig, Waveform};
    use crate::control::position::PositionAxis;
    use crate::drivers::h_bridge::Motor;
    use crate::drivers::switch::UserInputs;
    use crate::sim::{SimAxisPlant, SimClock, SimDriver, SimSwitch};

    type Axis<'a> = PositionAxis<SimDriver<'a>, &'a SimAxisPlant<'a>>;

    struct Bench<'a> {
        clock: &'a SimClock,
        run: &'a SimSwitch,
        direction: &'a SimSwitch,
        mode: &'a SimSwitch,
        plants: [&'a SimAxisPlant<'a>; 2],
    }

    type Inputs<'a> = UserInputs<&'a SimSwitch, &'a SimSwitch, &'a SimSwitch>;

    /// Bridge that rejects every drive and stop request.
    struct JammedBridge;

    impl Motor for JammedBridge {
        fn initialize(&mut self) -> Result<(), DriverError> {
            Ok(())
        }

        fn drive(&mut self, _command: DriveCommand) -> Result<(), DriverError> {
            Err(DriverError::Pwm(embedded_hal::pwm::ErrorKind::Other))
        }

        fn stop(&mut self) -> Result<(), DriverError> {
            Err(DriverError::Pin(embedded_hal::digital::ErrorKind::Other))
        }

        fn command(&self) -> DriveCommand {
            DriveCommand::IDLE
        }
    }

    impl<'a> Bench<'a> {
        fn actuator(&self) -> DualAxisActuator<Axis<'a>, Axis<'a>, Inputs<'a>> {
            self.actuator_with(self.plants[0].motor.driver())
        }

        /// Carriage 1 runs on `motor` instead of its simulated bridge.
        fn actuator_with<M: Motor>(
            &self,
            motor: M,
        ) -> DualAxisActuator<PositionAxis<M, &'a SimAxisPlant<'a>>, Axis<'a>, Inputs<'a>> {
            let mut config =
                RigConfig::new(FrequencyPreset::lookup(10.0).unwrap(), Protocol::default());
            config.trajectory.waveform = Waveform::Sinusoid;
            config.trajectory.max_amplitude_mm = 2.0;
            config.trajectory.soft_start_s = 0.0;
            config.actuator.plot_period_us = Some(1_000);
            let [c1, c2] = config.carriage;
            let mut a1 = PositionAxis::new(motor, self.plants[0], &c1);
            let mut a2 = PositionAxis::new(self.plants[1].motor.driver(), self.plants[1], &c2);
            a1.initialize().unwrap();
            a2.initialize().unwrap();
            a1.encoder.calibrate_in_place();
            a2.encoder.calibrate_in_place();
            let inputs = UserInputs::new(self.run, self.direction, self.mode, 1_000);
            DualAxisActuator::new(
                a1,
                a2,
                TrajectoryGenerator::new(config.trajectory),
                inputs,
                &config.actuator,
            )
        }

        fn settle_switches<A: MotionStage>(&self, actuator: &mut A) {
            for _ in 0..2 {
                actuator.poll_inputs(self.clock.peek());
                self.clock.advance(1_000);
            }
        }
    }

    struct Bytes(usize);

    impl TelemetrySink for Bytes {
        fn write_all(&mut self, bytes: &[u8]) {
            self.0 += bytes.len();
        }
    }

    macro_rules! bench {
        ($bench:ident) => {
            let clock = SimClock::new();
            let p1 = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 800.0);
            let p2 = SimAxisPlant::new(&clock, 40_000.0, 0.0, 10_000.0, 800.0);
            let run = SimSwitch::new(true);
            let direction = SimSwitch::new(false);
            let mode = SimSwitch::new(false);
            let $bench = Bench {
                clock: &clock,
                run: &run,
                direction: &direction,
                mode: &mode,
                plants: [&p1, &p2],
            };
        };
    }

    #[test]
    fn multiplier_table_is_exhaustive() {
        let expected = [
            (Mode::Translation, Direction::Forward, (1.0, 1.0)),
            (Mode::Translation, Direction::Backward, (-1.0, -1.0)),
            (Mode::Rotation, Direction::Forward, (1.0, -1.0)),
            (Mode::Rotation, Direction::Backward, (-1.0, 1.0)),
        ];
        for (mode, direction, pair) in expected {
            assert_eq!(multipliers(mode, direction), pair);
        }
    }

    #[test]
    fn both_axes_driven_in_the_same_tick() {
        bench!(bench);
        let mut actuator = bench.actuator();
        bench.settle_switches(&mut actuator);

        let mut driven = 0;
        while driven < 1_000 {
            if actuator.run(bench.clock, &mut ()).unwrap() == StageTick::Driven {
                let [t1, t2] = actuator.drive_ticks();
                assert_eq!(t1, t2);
                assert_eq!(t1, Some(driven));
                driven += 1;
            }
            bench.clock.advance(5);
        }
        assert_eq!(actuator.ticks(), 1_000);
    }

    #[test]
    fn stop_switch_zeroes_both_duties_on_the_next_tick() {
        bench!(bench);
        let mut actuator = bench.actuator();
        bench.settle_switches(&mut actuator);
        for _ in 0..400 {
            actuator.run(bench.clock, &mut ()).unwrap();
            bench.clock.advance(25);
        }
        assert!(actuator.is_running());

        bench.run.set(false);
        // Debounce interval, then exactly one tick.
        actuator.run(bench.clock, &mut ()).unwrap();
        bench.clock.advance(1_000);
        assert_eq!(actuator.run(bench.clock, &mut ()).unwrap(), StageTick::Stopped);
        for plant in bench.plants {
            assert_eq!(plant.motor.in1.duty(), 0);
            assert_eq!(plant.motor.in2.duty(), 0);
            assert!(!plant.motor.nsleep.is_awake());
        }
    }

    #[test]
    fn rotation_drives_axes_in_opposition() {
        bench!(bench);
        bench.mode.set(true);
        let mut actuator = bench.actuator();
        bench.settle_switches(&mut actuator);
        for _ in 0..1_000 {
            actuator.run(bench.clock, &mut ()).unwrap();
            bench.clock.advance(25);
        }
        let t = actuator.tracking();
        assert_eq!(t.targets[0], -t.targets[1]);
    }

    #[test]
    fn plots_at_their_own_cadence() {
        bench!(bench);
        let mut actuator = bench.actuator();
        bench.settle_switches(&mut actuator);
        let mut sink = Bytes(0);
        // 40 ms of control at 25 us.
        for _ in 0..1_600 {
            actuator.run(bench.clock, &mut sink).unwrap();
            bench.clock.advance(25);
        }
        assert_eq!(actuator.ticks(), 1_600);
        assert_eq!(sink.0, 40 * 20);
    }

    #[test]
    fn drive_fault_reports_the_drive_error_and_stops_the_other_axis() {
        bench!(bench);
        let mut actuator = bench.actuator_with(JammedBridge);
        bench.settle_switches(&mut actuator);

        let fault = loop {
            match actuator.run(bench.clock, &mut ()) {
                Ok(_) => bench.clock.advance(25),
                Err(e) => break e,
            }
        };
        assert_eq!(fault, DriverError::Pwm(embedded_hal::pwm::ErrorKind::Other));
        let healthy = &bench.plants[1].motor;
        assert_eq!((healthy.in1.duty(), healthy.in2.duty()), (0, 0));
        assert!(!healthy.nsleep.is_awake());
    }

    #[test]
    fn unhomed_axes_are_never_driven() {
        bench!(bench);
        let mut actuator = bench.actuator();
        actuator.axis_1.encoder.unhome();
        bench.settle_switches(&mut actuator);
        for _ in 0..100 {
            assert_eq!(actuator.run(bench.clock, &mut ()).unwrap(), StageTick::Stopped);
            bench.clock.advance(25);
        }
        assert_eq!(actuator.ticks(), 0);
    }
}
