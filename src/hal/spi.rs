//! SPI master on PB1..PB3, mode 0, MSB first

use avr_device::atmega2560::SPI;
use core::convert::Infallible;
use embedded_hal::blocking::spi::Transfer;

use super::gpio::board::{Miso, Mosi, Sck};
use crate::drivers::mmc::SpiClock;

// SPCR
const SPE: u8 = 1 << 6;
const MSTR: u8 = 1 << 4;
const SPR_MASK: u8 = 0x03;
// SPSR
const SPIF: u8 = 1 << 7;
const SPI2X: u8 = 1 << 0;

/// SPI clock prescaler options
#[derive(Clone, Copy)]
#[repr(u8)]
pub enum SpiPrescaler {
    Div4 = 0,
    Div16 = 1,
    Div64 = 2,
    Div128 = 3,
}

/// SPI peripheral driver; owns the bus pins so nothing else drives them.
pub struct Spi {
    spi: SPI,
    _pins: (Sck, Mosi, Miso),
}

impl Spi {
    /// Enables the master at the slowest clock.
    pub fn new(spi: SPI, sck: Sck, mosi: Mosi, miso: Miso) -> Self {
        spi.spcr.write(|w| unsafe { w.bits(SPE | MSTR | SpiPrescaler::Div128 as u8) });
        spi.spsr.write(|w| unsafe { w.bits(0) });
        Self {
            spi,
            _pins: (sck, mosi, miso),
        }
    }

    /// Set clock prescaler; `double` halves the divisor.
    pub fn set_clock(&mut self, prescaler: SpiPrescaler, double: bool) {
        self.spi
            .spcr
            .modify(|r, w| unsafe { w.bits((r.bits() & !SPR_MASK) | prescaler as u8) });
        self.spi
            .spsr
            .write(|w| unsafe { w.bits(if double { SPI2X } else { 0 }) });
    }

    /// Transfer a single byte
    pub fn transfer_byte(&mut self, byte: u8) -> u8 {
        self.spi.spdr.write(|w| unsafe { w.bits(byte) });
        while self.spi.spsr.read().bits() & SPIF == 0 {}
        self.spi.spdr.read().bits()
    }
}

impl Transfer<u8> for Spi {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Infallible> {
        for word in words.iter_mut() {
            *word = self.transfer_byte(*word);
        }
        Ok(words)
    }
}

impl SpiClock for Spi {
    fn slow(&mut self) {
        // 125 kHz for card identification
        self.set_clock(SpiPrescaler::Div128, false);
    }

    fn fast(&mut self) {
        // 8 MHz
        self.set_clock(SpiPrescaler::Div4, true);
    }
}
