//! Control transfer into the application

/// Splits a code byte address into the `EIND` value and the `Z` word
/// address used by `eijmp`.
pub const fn indirect_target(entry: u32) -> (u8, u16) {
    let word = entry >> 1;
    ((word >> 16) as u8, word as u16)
}

/// Jumps to code byte address `entry`.
///
/// # Safety
///
/// `entry` must hold a valid instruction. Nothing of the bootloader's state
/// survives; peripherals are left as they are.
#[cfg(target_arch = "avr")]
pub unsafe fn jump(entry: u32) -> ! {
    let (eind, z) = indirect_target(entry);
    core::arch::asm!(
        "out 0x3c, {eind}",
        "eijmp",
        eind = in(reg) eind,
        in("Z") z,
        options(noreturn),
    )
}
