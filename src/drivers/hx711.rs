// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Bit-banged driver for the HX711 24-bit load-cell amplifier.
//!
//! DOUT going low signals a finished conversion. A read clocks out 24 bits MSB first on SCK,
//! then 1 to 3 extra pulses select the channel and gain for the *next* conversion. Holding
//! SCK high for more than 60 µs powers the chip down.

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};

use crate::error::SensorError;

/// Channel and gain applied to the next conversion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Gain {
    A128,
    B32,
    A64,
}

impl Gain {
    /// Extra SCK pulses after the 24 data bits.
    #[inline]
    fn pulses(self) -> u8 {
        match self {
            Gain::A128 => 1,
            Gain::B32 => 2,
            Gain::A64 => 3,
        }
    }
}

/// A load-cell amplifier that converts on its own schedule.
pub trait ForceAmplifier {
    /// A conversion is waiting to be read.
    fn is_ready(&mut self) -> Result<bool, SensorError>;

    /// Read the waiting conversion. Only valid after [`is_ready`](Self::is_ready) returned true.
    fn read_raw(&mut self) -> Result<i32, SensorError>;

    /// Non-blocking read: `WouldBlock` while no conversion is waiting.
    fn try_read(&mut self) -> nb::Result<i32, SensorError> {
        if self.is_ready()? {
            Ok(self.read_raw()?)
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl<T: ForceAmplifier + ?Sized> ForceAmplifier for &mut T {
    fn is_ready(&mut self) -> Result<bool, SensorError> {
        (**self).is_ready()
    }

    fn read_raw(&mut self) -> Result<i32, SensorError> {
        (**self).read_raw()
    }
}

/// Sign-extend a 24-bit two's-complement sample.
#[inline]
pub fn sign_extend_24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

pub struct Hx711<DOUT, SCK, D> {
    dout: DOUT,
    sck: SCK,
    delay: D,
    gain: Gain,
}

impl<DOUT, SCK, D> Hx711<DOUT, SCK, D>
where
    DOUT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
{
    pub fn new(dout: DOUT, sck: SCK, delay: D, gain: Gain) -> Self {
        Self {
            dout,
            sck,
            delay,
            gain,
        }
    }

    #[inline]
    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// Takes effect after the next read.
    pub fn set_gain(&mut self, gain: Gain) {
        self.gain = gain;
    }

    fn pulse(&mut self) -> Result<(), SensorError> {
        self.sck.set_high().map_err(SensorError::bus)?;
        self.delay.delay_us(1);
        self.sck.set_low().map_err(SensorError::bus)?;
        self.delay.delay_us(1);
        Ok(())
    }

    pub fn power_down(&mut self) -> Result<(), SensorError> {
        self.sck.set_low().map_err(SensorError::bus)?;
        self.sck.set_high().map_err(SensorError::bus)?;
        self.delay.delay_us(70);
        Ok(())
    }

    pub fn power_up(&mut self) -> Result<(), SensorError> {
        self.sck.set_low().map_err(SensorError::bus)
    }

    pub fn free(self) -> (DOUT, SCK, D) {
        (self.dout, self.sck, self.delay)
    }
}

impl<DOUT, SCK, D> ForceAmplifier for Hx711<DOUT, SCK, D>
where
    DOUT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
{
    fn is_ready(&mut self) -> Result<bool, SensorError> {
        self.dout.is_low().map_err(SensorError::bus)
    }

    fn read_raw(&mut self) -> Result<i32, SensorError> {
        let mut raw = 0u32;
        for _ in 0..24 {
            self.sck.set_high().map_err(SensorError::bus)?;
            self.delay.delay_us(1);
            let bit = self.dout.is_high().map_err(SensorError::bus)?;
            self.sck.set_low().map_err(SensorError::bus)?;
            self.delay.delay_us(1);
            raw = (raw << 1) | bit as u32;
        }
        for _ in 0..self.gain.pulses() {
            self.pulse()?;
        }
        Ok(sign_extend_24(raw))
    }
}

#[cfg(test)]
mod tests {
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;

    use embedded_hal::digital::ErrorType;

    use super::*;

    /// DOUT that shifts out a scripted 24-bit word, advancing on each falling SCK edge.
    struct Line {
        word: u32,
        bit: Cell<u8>,
        idle_high: bool,
        pulses: Cell<u32>,
    }

    struct Dout<'a>(&'a Line);
    struct Sck<'a>(&'a Line, RefCell<bool>);
    struct NoDelay;

    impl ErrorType for Dout<'_> {
        type Error = Infallible;
    }
    impl ErrorType for Sck<'_> {
        type Error = Infallible;
    }

    impl InputPin for Dout<'_> {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            let bit = self.0.bit.get();
            if bit >= 24 {
                return Ok(self.0.idle_high);
            }
            Ok(self.0.word & (1 << (23 - bit)) != 0)
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|h| !h)
        }
    }

    impl OutputPin for Sck<'_> {
        fn set_high(&mut self) -> Result<(), Infallible> {
            *self.1.borrow_mut() = true;
            Ok(())
        }
        fn set_low(&mut self) -> Result<(), Infallible> {
            if *self.1.borrow() {
                self.0.pulses.set(self.0.pulses.get() + 1);
                self.0.bit.set(self.0.bit.get() + 1);
            }
            *self.1.borrow_mut() = false;
            Ok(())
        }
    }

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn line(word: u32) -> Line {
        Line {
            word,
            bit: Cell::new(0),
            idle_high: true,
            pulses: Cell::new(0),
        }
    }

    #[test]
    fn reads_negative_sample_and_selects_gain() {
        let l = line(0xFF_FF_9C); // -100
        let mut hx = Hx711::new(Dout(&l), Sck(&l, RefCell::new(false)), NoDelay, Gain::A64);
        assert_eq!(hx.read_raw(), Ok(-100));
        assert_eq!(l.pulses.get(), 24 + 3);
    }

    #[test]
    fn try_read_blocks_while_dout_high() {
        let l = line(0);
        l.bit.set(24);
        let mut hx = Hx711::new(Dout(&l), Sck(&l, RefCell::new(false)), NoDelay, Gain::A128);
        assert_eq!(hx.try_read(), Err(nb::Error::WouldBlock));
    }

    #[test]
    fn sign_extension_covers_both_halves() {
        assert_eq!(sign_extend_24(0x7F_FF_FF), 8_388_607);
        assert_eq!(sign_extend_24(0x80_00_00), -8_388_608);
        assert_eq!(sign_extend_24(0x00_00_01), 1);
    }
}
