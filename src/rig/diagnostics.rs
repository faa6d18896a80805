// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Bench checks run instead of an experiment.
//!
//! Both monitors are fed from the main loop and return a report whenever something worth
//! printing happened. Printing is left to the firmware.

use core::fmt;

use crate::drivers::switch::{Direction, Mode, SwitchBank};

/// One of the three operator switches.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SwitchKind {
    Run,
    Direction,
    Mode,
}

impl SwitchKind {
    /// Order in which the switches are checked.
    pub const SEQUENCE: [SwitchKind; 3] = [SwitchKind::Run, SwitchKind::Direction, SwitchKind::Mode];

    pub fn label(self) -> &'static str {
        match self {
            SwitchKind::Run => "Run device",
            SwitchKind::Direction => "Direction",
            SwitchKind::Mode => "Mode",
        }
    }

    /// Position of this switch in `bank`, as printed.
    pub fn state_name(self, bank: SwitchBank) -> &'static str {
        match self {
            SwitchKind::Run if bank.run => "On",
            SwitchKind::Run => "Off",
            SwitchKind::Direction => match bank.direction {
                Direction::Forward => "Forward",
                Direction::Backward => "Backward",
            },
            SwitchKind::Mode => match bank.mode {
                Mode::Translation => "Translation",
                Mode::Rotation => "Rotation",
            },
        }
    }
}

/// A switch state worth printing. `flips` is 0 for the initial announcement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SwitchReport {
    pub switch: SwitchKind,
    pub state: &'static str,
    pub flips: u8,
}

impl fmt::Display for SwitchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.switch.label(), self.state)
    }
}

/// Walks the operator through each switch in turn until it has changed `flips` times.
pub struct SwitchMonitor {
    flips: u8,
    index: usize,
    count: u8,
    last: Option<&'static str>,
}

impl SwitchMonitor {
    pub fn new(flips: u8) -> Self {
        Self {
            flips,
            index: 0,
            count: 0,
            last: None,
        }
    }

    /// Switch currently under test, `None` once all have been checked.
    pub fn current(&self) -> Option<SwitchKind> {
        SwitchKind::SEQUENCE.get(self.index).copied()
    }

    pub fn is_done(&self) -> bool {
        self.current().is_none()
    }

    /// Feed the debounced switch states.
    pub fn poll(&mut self, bank: SwitchBank) -> Option<SwitchReport> {
        let switch = self.current()?;
        let state = switch.state_name(bank);
        match self.last {
            None => {
                self.last = Some(state);
                let report = SwitchReport {
                    switch,
                    state,
                    flips: 0,
                };
                if self.flips == 0 {
                    self.advance();
                }
                Some(report)
            }
            Some(last) if last != state => {
                self.last = Some(state);
                self.count += 1;
                let report = SwitchReport {
                    switch,
                    state,
                    flips: self.count,
                };
                if self.count >= self.flips {
                    self.advance();
                }
                Some(report)
            }
            Some(_) => None,
        }
    }

    fn advance(&mut self) {
        self.index += 1;
        self.count = 0;
        self.last = None;
    }
}

/// Encoder position worth printing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PositionReport {
    pub axis: u8,
    pub position: f32,
}

impl fmt::Display for PositionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encoder {}: {:.3} mm", self.axis, self.position)
    }
}

/// Reports every change of an encoder position.
pub struct EncoderMonitor {
    axis: u8,
    last: Option<f32>,
}

impl EncoderMonitor {
    pub fn new(axis: u8) -> Self {
        Self { axis, last: None }
    }

    pub fn poll(&mut self, position: f32) -> Option<PositionReport> {
        if self.last == Some(position) {
            return None;
        }
        self.last = Some(position);
        Some(PositionReport {
            axis: self.axis,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(run: bool, direction: Direction, mode: Mode) -> SwitchBank {
        SwitchBank {
            run,
            direction,
            mode,
        }
    }

    #[test]
    fn checks_each_switch_in_turn() {
        let mut monitor = SwitchMonitor::new(2);
        let idle = bank(false, Direction::Forward, Mode::Translation);

        let first = monitor.poll(idle).unwrap();
        assert_eq!(first.to_string(), "Run device: Off");
        assert_eq!(monitor.poll(idle), None);
        // Other switches are ignored until the run switch is done.
        assert_eq!(monitor.poll(bank(false, Direction::Backward, Mode::Translation)), None);
        assert_eq!(monitor.poll(bank(true, Direction::Forward, Mode::Translation)).unwrap().flips, 1);
        assert_eq!(monitor.poll(idle).unwrap().flips, 2);
        assert_eq!(monitor.current(), Some(SwitchKind::Direction));

        assert_eq!(monitor.poll(idle).unwrap().to_string(), "Direction: Forward");
        let back = bank(false, Direction::Backward, Mode::Translation);
        assert_eq!(monitor.poll(back).unwrap().state, "Backward");
        monitor.poll(idle);
        assert_eq!(monitor.current(), Some(SwitchKind::Mode));

        monitor.poll(idle);
        monitor.poll(bank(false, Direction::Forward, Mode::Rotation));
        assert!(!monitor.is_done());
        assert_eq!(monitor.poll(idle).unwrap().to_string(), "Mode: Translation");
        assert!(monitor.is_done());
        assert_eq!(monitor.poll(idle), None);
    }

    #[test]
    fn encoder_reports_only_changes() {
        let mut monitor = EncoderMonitor::new(1);
        assert_eq!(monitor.poll(0.0).unwrap().to_string(), "Encoder 1: 0.000 mm");
        assert_eq!(monitor.poll(0.0), None);
        assert_eq!(monitor.poll(0.005).unwrap().position, 0.005);
    }
}
