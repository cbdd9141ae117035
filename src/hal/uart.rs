//! Polled USART0 transmitter
//!
//! Interrupts stay disabled for the whole bootloader run, so every byte is
//! pushed out by spinning on `UDRE0`.

use avr_device::atmega2560::USART0;

use crate::config::{CPU_FREQ_HZ, UART_BAUD};

// UCSR0A
const U2X0: u8 = 1 << 1;
const TXC0: u8 = 1 << 6;
const UDRE0: u8 = 1 << 5;
// UCSR0B
const TXEN0: u8 = 1 << 3;
// UCSR0C: asynchronous, 8N1
const UCSZ_8BIT: u8 = 0b11 << 1;

/// Double-speed divisor, 16 for 115200 at 16 MHz
const UBRR: u16 = ((CPU_FREQ_HZ + 4 * UART_BAUD) / (8 * UART_BAUD) - 1) as u16;

pub struct Uart {
    usart: USART0,
    /// A byte was queued since the last flush
    pending: bool,
}

impl Uart {
    pub fn new(usart: USART0) -> Self {
        usart.ubrr0.write(|w| unsafe { w.bits(UBRR) });
        usart.ucsr0a.write(|w| unsafe { w.bits(U2X0) });
        usart.ucsr0c.write(|w| unsafe { w.bits(UCSZ_8BIT) });
        usart.ucsr0b.write(|w| unsafe { w.bits(TXEN0) });
        Self { usart, pending: false }
    }

    pub fn write_byte(&mut self, byte: u8) {
        while self.usart.ucsr0a.read().bits() & UDRE0 == 0 {}
        // Clear a stale TXC0 so flush() sees this byte
        self.usart
            .ucsr0a
            .modify(|r, w| unsafe { w.bits((r.bits() & U2X0) | TXC0) });
        self.usart.udr0.write(|w| unsafe { w.bits(byte) });
        self.pending = true;
    }

    pub fn write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }

    /// Waits until the last byte has left the shift register.
    pub fn flush(&mut self) {
        if !self.pending {
            return;
        }
        while self.usart.ucsr0a.read().bits() & TXC0 == 0 {}
        self.pending = false;
    }

    /// Flushes and returns the peripheral to its reset state.
    pub fn disable(&mut self) {
        self.flush();
        self.usart.ucsr0b.write(|w| unsafe { w.bits(0) });
        self.usart.ucsr0a.write(|w| unsafe { w.bits(0) });
        self.usart.ubrr0.write(|w| unsafe { w.bits(0) });
    }
}
