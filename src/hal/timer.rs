use avr_device::atmega2560::TC0;
use embedded_hal::blocking::delay::{DelayMs, DelayUs};

use crate::config::CPU_FREQ_HZ;

#[derive(Clone, Copy)]
pub enum Prescaler {
    Stop = 0,
    Direct = 1,
    Div8 = 2,
    Div64 = 3,
    Div256 = 4,
    Div1024 = 5,
}

const PRESCALER_MASK: u8 = 0x07;

/// Timer0 ticks per millisecond at clk/64 (250 at 16 MHz)
const TICKS_PER_MS: u8 = (CPU_FREQ_HZ / 64 / 1000) as u8;

/// Microseconds per Timer0 tick at clk/64
const US_PER_TICK: u16 = (64_000_000 / CPU_FREQ_HZ) as u16;

/// Busy-wait delays counted on Timer/Counter0, interrupts not needed.
pub struct Delay {
    tc0: TC0,
}

impl Delay {
    pub fn new(tc0: TC0) -> Self {
        // Normal mode, stopped
        tc0.tccr0a.write(|w| unsafe { w.bits(0) });
        tc0.tccr0b.write(|w| unsafe { w.bits(0) });
        Self { tc0 }
    }

    fn start(&mut self, prescaler: Prescaler) {
        self.tc0
            .tccr0b
            .modify(|r, w| unsafe { w.bits((r.bits() & !PRESCALER_MASK) | (prescaler as u8 & PRESCALER_MASK)) });
    }

    fn stop(&mut self) {
        self.tc0
            .tccr0b
            .modify(|r, w| unsafe { w.bits(r.bits() & !PRESCALER_MASK) });
    }

    fn set_counter(&mut self, value: u8) {
        self.tc0.tcnt0.write(|w| unsafe { w.bits(value) });
    }

    fn counter(&self) -> u8 {
        self.tc0.tcnt0.read().bits()
    }

    /// Waits `ticks` Timer0 periods at clk/64.
    fn wait_ticks(&mut self, ticks: u8) {
        self.set_counter(0);
        self.start(Prescaler::Div64);
        while self.counter() < ticks {}
        self.stop();
    }

    pub fn release(self) -> TC0 {
        self.tc0
    }
}

impl DelayMs<u16> for Delay {
    fn delay_ms(&mut self, ms: u16) {
        for _ in 0..ms {
            self.wait_ticks(TICKS_PER_MS);
        }
    }
}

impl DelayUs<u16> for Delay {
    fn delay_us(&mut self, us: u16) {
        let mut ticks = (us / US_PER_TICK).max(1);
        while ticks > 0 {
            let chunk = ticks.min(u16::from(TICKS_PER_MS)) as u8;
            self.wait_ticks(chunk);
            ticks -= u16::from(chunk);
        }
    }
}
