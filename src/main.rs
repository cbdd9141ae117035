#![cfg_attr(target_arch = "avr", no_std)]
#![cfg_attr(target_arch = "avr", no_main)]

#[cfg(target_arch = "avr")]
use panic_halt as _;

#[cfg(target_arch = "avr")]
use um2_sdboot::{
    bootloader::{dispatch, Bootloader, Outcome},
    config::{SPM_PAGESIZE, TARGET},
    drivers::{Blink, Mmc, SpmFlash, StatusLed, Switches},
    fs::FatFs,
    hal::{board::Pins, watchdog, Delay, Spi},
};

#[cfg(target_arch = "avr")]
#[avr_device::entry]
fn main() -> ! {
    avr_device::interrupt::disable();

    // Sole owner: runs once, straight from reset
    let dp = unsafe { avr_device::atmega2560::Peripherals::steal() };
    watchdog::disable(&dp.CPU, &dp.WDT);

    let pins = Pins::new(dp.PORTB, dp.PORTD, dp.PORTG, dp.PORTH);
    let spi = Spi::new(dp.SPI, pins.sck, pins.mosi, pins.miso);
    let card = FatFs::new(Mmc::new(spi, pins.card_select));
    let switches = Switches::new(pins.card_detect, pins.button);
    let status = StatusLed::new(pins.led, Delay::new(dp.TC0));

    #[cfg(feature = "debug")]
    let log = um2_sdboot::drivers::SerialConsole::new(um2_sdboot::hal::Uart::new(dp.USART0));
    #[cfg(not(feature = "debug"))]
    let log = um2_sdboot::logger::Discard;

    let mut boot = Bootloader::<_, _, _, _, _, _, _, SPM_PAGESIZE>::new(
        TARGET,
        SpmFlash::new(),
        card,
        switches,
        status,
        log,
    );

    match boot.run() {
        Outcome::Launch { entry } => unsafe { dispatch::jump(entry) },
        outcome => {
            // Power cycle to leave
            let pattern = outcome.blink().unwrap_or(Blink::NoApplication);
            loop {
                boot.status().show(pattern);
            }
        }
    }
}

#[cfg(not(target_arch = "avr"))]
fn main() {}
