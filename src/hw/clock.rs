// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Free-running 1 MHz time base on TIM5 (32-bit), the rig's [`Clock`].

use stm32f7xx_hal::pac;

use crate::time::{Clock, Micros};

pub struct MonoTimer {
    tim: pac::TIM5,
}

impl MonoTimer {
    /// Start TIM5 counting microseconds. `timer_clock_hz` is the APB1 timer clock.
    pub fn new(tim5: pac::TIM5, timer_clock_hz: u32) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.apb1enr.modify(|_, w| w.tim5en().set_bit());

        let tim = tim5;
        tim.cr1.modify(|_, w| w.cen().clear_bit());
        tim.psc
            .write(|w| unsafe { w.bits(timer_clock_hz / 1_000_000 - 1) });
        tim.arr.write(|w| unsafe { w.bits(0xFFFF_FFFF) });
        // Load the prescaler now instead of at the first overflow.
        tim.egr.write(|w| w.ug().set_bit());
        tim.cnt.write(|w| unsafe { w.bits(0) });
        tim.cr1.modify(|_, w| w.cen().set_bit());

        Self { tim }
    }

    #[inline]
    pub fn free(self) -> pac::TIM5 {
        self.tim
    }
}

impl Clock for MonoTimer {
    #[inline]
    fn now_us(&self) -> Micros {
        self.tim.cnt.read().bits()
    }
}
