// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Object encoder decoded in software from EXTI edge interrupts.
//!
//! Both channels interrupt on both edges; the handlers are the only writers of
//! [`OBJECT_COUNTER`]. The pins move into [`OBJECT_PINS`] once configured.

use core::cell::RefCell;

use cortex_m::interrupt::{self, Mutex};
use stm32f7xx_hal::{
    gpio::{Edge, ExtiPin},
    pac::{self, interrupt},
    rcc::APB2,
};

use crate::drivers::quadrature::QuadratureCounter;
use crate::hw::pins::ObjectEncoderPins;

pub static OBJECT_COUNTER: QuadratureCounter = QuadratureCounter::new();

static OBJECT_PINS: Mutex<RefCell<Option<ObjectEncoderPins>>> = Mutex::new(RefCell::new(None));

/// Route PB0/PB1 to EXTI lines 0/1 on both edges and hand them to the handlers. Returns the
/// shared counter.
pub fn object_encoder(
    mut pins: ObjectEncoderPins,
    exti: &mut pac::EXTI,
    syscfg: &mut pac::SYSCFG,
    apb2: &mut APB2,
) -> &'static QuadratureCounter {
    pins.a.make_interrupt_source(syscfg, apb2);
    pins.a.trigger_on_edge(exti, Edge::RisingFalling);
    pins.a.enable_interrupt(exti);

    pins.b.make_interrupt_source(syscfg, apb2);
    pins.b.trigger_on_edge(exti, Edge::RisingFalling);
    pins.b.enable_interrupt(exti);

    OBJECT_COUNTER.attach(pins.a.is_high(), pins.b.is_high());
    interrupt::free(|cs| *OBJECT_PINS.borrow(cs).borrow_mut() = Some(pins));

    unsafe {
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::EXTI0);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::EXTI1);
    }
    &OBJECT_COUNTER
}

fn on_object_edge() {
    interrupt::free(|cs| {
        if let Some(pins) = OBJECT_PINS.borrow(cs).borrow_mut().as_mut() {
            pins.a.clear_interrupt_pending_bit();
            pins.b.clear_interrupt_pending_bit();
            OBJECT_COUNTER.on_edge(pins.a.is_high(), pins.b.is_high());
        }
    });
}

#[interrupt]
fn EXTI0() {
    on_object_edge();
}

#[interrupt]
fn EXTI1() {
    on_object_edge();
}
