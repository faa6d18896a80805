// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Quadrature encoder support via STM32F7 timers in encoder mode.
//!
//! TIM2 (32-bit, PA0/PA1) and TIM3 (16-bit, PA6/PA7) count both edges of both channels in
//! hardware. TIM3 is widened to 32 bits in software on every read, which only requires a read
//! at least once per 32768 ticks.

use core::cell::Cell;

use stm32f7xx_hal::{
    gpio::{gpioa, Alternate},
    pac,
};

use crate::drivers::quadrature::TickSource;

pub struct Encoder<TIM> {
    tim: TIM,
    /// Last raw TIM3 count and the widened total; unused on TIM2.
    last_raw: Cell<u16>,
    total: Cell<i32>,
}

impl<TIM> Encoder<TIM> {
    /// Consume the wrapper and return the underlying timer peripheral.
    #[inline]
    pub fn free(self) -> TIM {
        self.tim
    }
}

/// Encoder mode 3 on CH1/CH2 with both inputs enabled and not inverted.
macro_rules! encoder_mode {
    ($tim:expr) => {{
        let tim = $tim;
        // Slave mode: encoder mode 3 (count on both TI1 and TI2)
        tim.smcr.modify(|_, w| w.sms().bits(0b011));
        tim.ccmr1_input().modify(|_, w| w.cc1s().ti1().cc2s().ti2());
        tim.ccer.modify(|_, w| {
            w.cc1p()
                .clear_bit()
                .cc2p()
                .clear_bit()
                .cc1e()
                .set_bit()
                .cc2e()
                .set_bit()
        });
    }};
}

impl Encoder<pac::TIM2> {
    /// Configure TIM2 as a quadrature encoder with full 32-bit range. Takes the CH1/CH2 pins
    /// already routed to the timer.
    pub fn tim2(
        tim2: pac::TIM2,
        _pins: (gpioa::PA0<Alternate<1>>, gpioa::PA1<Alternate<1>>),
    ) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.apb1enr.modify(|_, w| w.tim2en().set_bit());

        let tim = tim2;
        tim.cr1.modify(|_, w| w.cen().clear_bit());
        tim.arr.write(|w| w.bits(0xFFFF_FFFF));
        encoder_mode!(&tim);
        tim.cnt.write(|w| w.bits(0));
        tim.cr1.modify(|_, w| w.cen().set_bit());

        Self {
            tim,
            last_raw: Cell::new(0),
            total: Cell::new(0),
        }
    }
}

impl TickSource for Encoder<pac::TIM2> {
    #[inline]
    fn ticks(&self) -> i32 {
        self.tim.cnt.read().cnt().bits() as i32
    }
}

impl Encoder<pac::TIM3> {
    /// Configure TIM3 as a quadrature encoder, 16-bit in hardware.
    pub fn tim3(
        tim3: pac::TIM3,
        _pins: (gpioa::PA6<Alternate<2>>, gpioa::PA7<Alternate<2>>),
    ) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.apb1enr.modify(|_, w| w.tim3en().set_bit());

        let tim = tim3;
        tim.cr1.modify(|_, w| w.cen().clear_bit());
        tim.arr.write(|w| unsafe { w.bits(0xFFFF) });
        encoder_mode!(&tim);
        tim.cnt.write(|w| unsafe { w.bits(0) });
        tim.cr1.modify(|_, w| w.cen().set_bit());

        Self {
            tim,
            last_raw: Cell::new(0),
            total: Cell::new(0),
        }
    }
}

impl TickSource for Encoder<pac::TIM3> {
    fn ticks(&self) -> i32 {
        let raw = self.tim.cnt.read().cnt().bits();
        let delta = raw.wrapping_sub(self.last_raw.replace(raw)) as i16;
        let total = self.total.get().wrapping_add(delta as i32);
        self.total.set(total);
        total
    }
}
