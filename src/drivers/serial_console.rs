use core::convert::Infallible;

use crate::hal::Uart;
use crate::logger::Channel;

/// Diagnostic console on USART0.
pub struct SerialConsole {
    uart: Uart,
}

impl SerialConsole {
    pub fn new(uart: Uart) -> Self {
        Self { uart }
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.uart.write_byte(byte);
    }
}

impl ufmt::uWrite for SerialConsole {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        self.uart.write_str(s);
        Ok(())
    }
}

impl Channel for SerialConsole {
    /// Drains the transmitter and hands USART0 back in its reset state.
    fn release(&mut self) {
        self.uart.disable();
    }
}
