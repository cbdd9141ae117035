pub mod flash;
pub mod mmc;
pub mod status_led;
pub mod switches;

#[cfg(target_arch = "avr")]
pub mod serial_console;

pub use flash::CodeFlash;
pub use mmc::{Mmc, MmcError, SpiClock};
pub use status_led::{Blink, StatusLed};
pub use switches::Switches;

#[cfg(target_arch = "avr")]
pub use flash::SpmFlash;
#[cfg(target_arch = "avr")]
pub use serial_console::SerialConsole;
