pub mod gpio;
pub mod spi;
pub mod timer;
pub mod uart;
pub mod watchdog;

// Re-export commonly used types
pub use gpio::board;
pub use gpio::{Output, Pin, PullUp};
pub use spi::Spi;
pub use timer::Delay;
pub use uart::Uart;
