// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Haptic finger firmware entry point.
//!
//! On the MCU this brings up the board and runs the configured [`RunMode`] forever. On the
//! host it runs one grip-and-vibrate session against the simulated rig and prints what the
//! rig would have sent over the serial link.
//!
//! [`RunMode`]: haptic_finger::config::RunMode

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::fmt::Write;

    use cortex_m_rt::entry;
    use defmt_rtt as _;
    use panic_halt as _;

    use hal::{
        pac,
        prelude::*,
        serial::{Config, Instance, Serial},
    };
    use stm32f7xx_hal as hal;

    use haptic_finger::config::{
        FrequencyPreset, Protocol, ProtocolConfig, RigConfig, RunMode, PWM_MAX_DUTY,
    };
    use haptic_finger::control::{ForceController, PositionAxis, TrajectoryGenerator};
    use haptic_finger::drivers::{
        CompatInput, CompatOutput, Gain, Hx711, Indicator, Motor, MotorDriver, OperatorInputs,
        StatusLamp, UserInputs,
    };
    use haptic_finger::hw::{exti, pwm, BoardPins, CycleDelay, Encoder, MonoTimer, Usart};
    use haptic_finger::rig::diagnostics::{EncoderMonitor, SwitchMonitor};
    use haptic_finger::rig::{DualAxisActuator, ExperimentSequencer, InputsOnly, MotionStage};
    use haptic_finger::sensors::{ForceSensor, PositionProbe, QuadratureEncoder};
    use haptic_finger::time::Clock;

    // Build-time experiment selection.
    const FREQUENCY_HZ: f32 = 10.0;
    const RUN_MODE: RunMode = RunMode::Experiment;
    const PWM_FREQUENCY_HZ: u32 = 20_000;
    const BAUD_RATE: u32 = 921_600;

    fn protocol() -> Protocol {
        Protocol::default()
    }

    #[entry]
    fn main() -> ! {
        let Some(preset) = FrequencyPreset::lookup(FREQUENCY_HZ) else {
            defmt::panic!("no preset for {=f32} Hz", FREQUENCY_HZ);
        };
        let mut config = RigConfig::new(preset, protocol());
        config.run_mode = RUN_MODE;

        // Peripherals
        let dp = pac::Peripherals::take().unwrap();

        // Clocks
        let rcc = dp.RCC.constrain();
        let clocks = rcc.cfgr.sysclk(216.MHz()).freeze();
        let mut apb2 = rcc.apb2;
        let apb1_timer_hz = clocks.timclk1().raw();

        let clock = MonoTimer::new(dp.TIM5, apb1_timer_hz);
        let pins = BoardPins::new(dp.GPIOA, dp.GPIOB, dp.GPIOC, dp.GPIOD, dp.GPIOE);

        // USART1 (telemetry / console)
        let usart_cfg = Config {
            baud_rate: BAUD_RATE.bps(),
            ..Default::default()
        };
        let serial = Serial::new(
            dp.USART1,
            (pins.usart1.tx, pins.usart1.rx),
            &clocks,
            usart_cfg,
        );
        let mut usart = Usart::new(serial);

        let inputs = UserInputs::new(
            CompatInput::new(pins.switches.run),
            CompatInput::new(pins.switches.direction),
            CompatInput::new(pins.switches.mode),
            config.debounce_us,
        );
        let encoder_pins = pins.encoder;

        defmt::info!("haptic finger up, {=f32} Hz preset", preset.frequency_hz);

        match config.run_mode {
            RunMode::InputCheck { flips } => input_check(inputs, flips, &clock, &mut usart),
            RunMode::EncoderCheck => {
                let tim2_pins = (encoder_pins.tim2_ch1, encoder_pins.tim2_ch2);
                let mut encoder = QuadratureEncoder::new(
                    Encoder::tim2(dp.TIM2, tim2_pins),
                    config.carriage[0].calibration,
                );
                encoder.calibrate_in_place();
                encoder_check(&encoder, &mut usart)
            }
            RunMode::Experiment => {}
        }

        // Force axis
        let force_pins = (pins.force.in1, pins.force.in2);
        let (force_a, force_b) = pwm::tim1(dp.TIM1, force_pins, PWM_FREQUENCY_HZ, &clocks);
        let force_sleep = CompatOutput::new(pins.force.nsleep);
        let force_motor = MotorDriver::new(force_a, force_b, force_sleep, PWM_MAX_DUTY);
        let force = ForceController::new(force_motor, &config.force_axis);

        // Load cell
        let delay = CycleDelay::new(clocks.sysclk().raw());
        let hx711 = Hx711::new(
            CompatInput::new(pins.hx711.dout),
            CompatOutput::new(pins.hx711.sck),
            delay,
            Gain::A128,
        );
        let sensor = ForceSensor::new(hx711, config.force_sensor);

        // Passive object encoder
        let (mut exti_regs, mut syscfg) = (dp.EXTI, dp.SYSCFG);
        let mut object = QuadratureEncoder::new(
            exti::object_encoder(pins.object, &mut exti_regs, &mut syscfg, &mut apb2),
            config.object_calibration,
        );
        object.calibrate_in_place();

        let lamp = Indicator::active_low(CompatOutput::new(pins.status_led));

        match config.sequencer.protocol {
            Protocol::GripAndVibrate { .. } => {
                let (p1, p2) = (pins.carriage_1, pins.carriage_2);
                let pwm_pins = (p1.in1, p1.in2, p2.in1, p2.in2);
                let carriage = pwm::tim4(dp.TIM4, pwm_pins, PWM_FREQUENCY_HZ, &clocks);
                let (c1_a, c1_b) = carriage.carriage_1;
                let (c2_a, c2_b) = carriage.carriage_2;
                let [c1, c2] = config.carriage;
                let mut axis_1 = PositionAxis::new(
                    MotorDriver::new(c1_a, c1_b, CompatOutput::new(p1.nsleep), PWM_MAX_DUTY),
                    Encoder::tim2(dp.TIM2, (encoder_pins.tim2_ch1, encoder_pins.tim2_ch2)),
                    &c1,
                );
                let mut axis_2 = PositionAxis::new(
                    MotorDriver::new(c2_a, c2_b, CompatOutput::new(p2.nsleep), PWM_MAX_DUTY),
                    Encoder::tim3(dp.TIM3, (encoder_pins.tim3_ch1, encoder_pins.tim3_ch2)),
                    &c2,
                );
                if axis_1.initialize().and(axis_2.initialize()).is_err() {
                    defmt::error!("carriage driver fault at startup");
                }
                let actuator = DualAxisActuator::new(
                    axis_1,
                    axis_2,
                    TrajectoryGenerator::new(config.trajectory),
                    inputs,
                    &config.actuator,
                )
                .with_probe(Indicator::active_high(CompatOutput::new(pins.loop_probe)));
                run_experiment(
                    actuator,
                    force,
                    sensor,
                    object,
                    lamp,
                    config.sequencer,
                    &clock,
                    &mut usart,
                )
            }
            Protocol::Friction { .. } => run_experiment(
                InputsOnly::new(inputs),
                force,
                sensor,
                object,
                lamp,
                config.sequencer,
                &clock,
                &mut usart,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_experiment<S, M, A, O, L, U>(
        stage: S,
        force: ForceController<M>,
        sensor: ForceSensor<A>,
        object: O,
        lamp: L,
        protocol: ProtocolConfig,
        clock: &MonoTimer,
        usart: &mut Usart<U>,
    ) -> !
    where
        S: MotionStage,
        M: Motor,
        A: haptic_finger::drivers::ForceAmplifier,
        O: PositionProbe,
        L: StatusLamp,
        U: Instance,
    {
        let mut sequencer = ExperimentSequencer::new(stage, force, sensor, protocol)
            .with_object(object)
            .with_status_lamp(lamp);
        if let Err(e) = sequencer.initialize(clock) {
            defmt::error!("bring-up failed: {}", e);
        }
        loop {
            sequencer.tick(clock, usart);
        }
    }

    fn input_check<I: OperatorInputs, U: Instance>(
        mut inputs: I,
        flips: u8,
        clock: &MonoTimer,
        usart: &mut Usart<U>,
    ) -> ! {
        usart.println("Input check: flip each switch when prompted");
        let mut monitor = SwitchMonitor::new(flips);
        while !monitor.is_done() {
            inputs.update(clock.now_us());
            if let Some(report) = monitor.poll(inputs.switches()) {
                write!(usart, "{}\r\n", report).ok();
            }
        }
        usart.println("Input check done");
        loop {
            cortex_m::asm::wfi();
        }
    }

    fn encoder_check<P: PositionProbe, U: Instance>(encoder: &P, usart: &mut Usart<U>) -> ! {
        let mut monitor = EncoderMonitor::new(1);
        loop {
            if let Some(report) = monitor.poll(encoder.read_position()) {
                write!(usart, "{}\r\n", report).ok();
            }
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    bench::run();
}

/// Simulated grip-and-vibrate session.
#[cfg(not(target_os = "none"))]
mod bench {
    use haptic_finger::config::{FrequencyPreset, Protocol, RigConfig};
    use haptic_finger::control::{ForceController, PositionAxis, TrajectoryGenerator};
    use haptic_finger::drivers::UserInputs;
    use haptic_finger::protocol::{ContactRecord, RecordReader, TelemetrySink};
    use haptic_finger::rig::{DualAxisActuator, ExperimentSequencer, Phase};
    use haptic_finger::sensors::ForceSensor;
    use haptic_finger::sim::{SimAxisPlant, SimClock, SimForcePlant, SimSwitch};

    const STEP_US: u32 = 25;
    const RUN_US: u32 = 2_000_000;

    struct Capture(Vec<u8>);

    impl TelemetrySink for Capture {
        fn write_all(&mut self, bytes: &[u8]) {
            self.0.extend_from_slice(bytes);
        }
    }

    pub fn run() {
        let Some(preset) = FrequencyPreset::lookup(10.0) else {
            eprintln!("no 10 Hz preset");
            return;
        };
        let mut config = RigConfig::new(preset, Protocol::default());
        config.force_axis.retract.duration_us = 1_000_000;

        let clock = SimClock::new();
        let plant_1 = SimAxisPlant::new(&clock, 40_000.0, 0.0, 2_000.0, 1_000.0);
        let plant_2 = SimAxisPlant::new(&clock, 40_000.0, 0.0, 2_000.0, 700.0);
        let finger = SimForcePlant::new(&clock, 10.0, 1.0, 2.0, config.force_sensor.slope, 120_000);
        let run = SimSwitch::new(false);
        let direction = SimSwitch::new(false);
        let mode = SimSwitch::new(false);

        let [c1, c2] = config.carriage;
        let axis_1 = PositionAxis::new(plant_1.motor.driver(), &plant_1, &c1);
        let axis_2 = PositionAxis::new(plant_2.motor.driver(), &plant_2, &c2);
        let inputs = UserInputs::new(&run, &direction, &mode, config.debounce_us);
        let actuator = DualAxisActuator::new(
            axis_1,
            axis_2,
            TrajectoryGenerator::new(config.trajectory),
            inputs,
            &config.actuator,
        );
        let force = ForceController::new(finger.motor.driver(), &config.force_axis);
        let sensor = ForceSensor::new(&finger, config.force_sensor);
        let mut sequencer = ExperimentSequencer::new(actuator, force, sensor, config.sequencer);

        clock.set_step(STEP_US);
        if let Err(e) = sequencer.initialize(&clock) {
            eprintln!("bring-up failed: {e}");
            return;
        }
        clock.set_step(0);
        println!("[{:>9} us] {}", clock.peek(), sequencer.phase().name());

        let mut sink = Capture(Vec::new());
        let mut last = sequencer.phase();
        loop {
            let phase = sequencer.tick(&clock, &mut sink);
            if core::mem::discriminant(&phase) != core::mem::discriminant(&last) {
                println!("[{:>9} us] {}", clock.peek(), phase.name());
                last = phase;
            }
            match phase {
                Phase::BackOffFinger { .. } => run.set(true),
                Phase::RunTest { since } => {
                    if clock.peek().wrapping_sub(since) >= RUN_US {
                        run.set(false);
                    }
                }
                Phase::StopTest { cause } => {
                    println!("stopped: {}", cause.name());
                    break;
                }
                _ => {}
            }
            clock.advance(STEP_US);
        }

        let mut reader = RecordReader::<ContactRecord>::new();
        let records: Vec<ContactRecord> =
            sink.0.iter().filter_map(|&b| reader.push(b)).collect();
        println!("{} contact records", records.len());
        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            println!(
                "force {:.3} N -> {:.3} N over {} ms",
                first.force,
                last.force,
                last.timestamp_ms - first.timestamp_ms
            );
        }
        println!(
            "carriage at {:.0} / {:.0} ticks, finger at {:.3} mm",
            plant_1.position_ticks(),
            plant_2.position_ticks(),
            finger.finger_mm()
        );
    }
}
