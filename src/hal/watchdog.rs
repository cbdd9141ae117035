use avr_device::atmega2560::{CPU, WDT};

// MCUSR
const WDRF: u8 = 1 << 3;
// WDTCSR
const WDCE: u8 = 1 << 4;
const WDE: u8 = 1 << 3;

/// Stops the watchdog.
///
/// An application may reset through the watchdog, which leaves it running
/// at the shortest timeout; it has to be off before a page erase.
pub fn disable(cpu: &CPU, wdt: &WDT) {
    // WDE is forced on while WDRF is set
    cpu.mcusr.modify(|r, w| unsafe { w.bits(r.bits() & !WDRF) });
    // Timed sequence: WDCE|WDE, then clear within four cycles
    wdt.wdtcsr.write(|w| unsafe { w.bits(WDCE | WDE) });
    wdt.wdtcsr.write(|w| unsafe { w.bits(0) });
}
