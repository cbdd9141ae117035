use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::digital::v2::OutputPin;

/// Time each pattern bit is shown
pub const STEP_MS: u16 = 100;

/// Wait for pulled-up inputs to rise after reset
pub const SETTLE_US: u16 = 100;

/// Blink patterns shown by the bootloader.
///
/// Bits are played from bit 1 upwards; the highest set bit bounds the
/// pattern and bit 0 is never shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Blink {
    /// Install armed, waiting for the button to be released
    ReleaseButton = 0x010C,
    /// New firmware was written
    Installed = 0x402A,
    /// Card image matched flash, nothing written
    Unchanged = 0x4002,
    /// No application to start
    NoApplication = 0x87FF,
}

/// Single status LED with its own time base.
pub struct StatusLed<P, D> {
    pin: P,
    delay: D,
    lit: bool,
}

impl<P, D> StatusLed<P, D>
where
    P: OutputPin,
    D: DelayMs<u16> + DelayUs<u16>,
{
    pub fn new(pin: P, delay: D) -> Self {
        Self {
            pin,
            delay,
            lit: false,
        }
    }

    pub fn set(&mut self, on: bool) {
        let _ = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        self.lit = on;
    }

    pub fn toggle(&mut self) {
        self.set(!self.lit);
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Plays `pattern` once.
    pub fn blink(&mut self, mut pattern: u16) {
        while pattern != 0 {
            pattern >>= 1;
            self.set(pattern & 1 != 0);
            self.delay.delay_ms(STEP_MS);
        }
    }

    pub fn show(&mut self, pattern: Blink) {
        self.blink(pattern as u16);
    }

    pub fn settle(&mut self) {
        self.delay.delay_us(SETTLE_US);
    }

    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }
}
