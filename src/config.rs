//! Build configuration for the Ultimaker 2 main board (ATmega2560)

use crate::bootloader::{Placement, Target, VectorStrategy};

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// Diagnostic UART baud rate
pub const UART_BAUD: u32 = 115_200;

/// Flash page size in bytes
pub const SPM_PAGESIZE: usize = 256;

/// Byte address the bootloader is linked at; the application owns
/// everything below it. Must match `BOOT_ADR` in build.rs.
pub const BOOT_ADR: u32 = 0x3E000;

/// Last byte of code flash
pub const FLASHEND: u32 = 0x3FFFF;

/// Image file looked up in the card's root directory
pub const APP_FILE: &str = "app.bin";

#[cfg(feature = "secondary")]
pub const PLACEMENT: Placement = Placement::Secondary;
#[cfg(not(feature = "secondary"))]
pub const PLACEMENT: Placement = Placement::Primary;

/// Parts above 8 KiB of flash use 4-byte `JMP` vectors
pub const VECTORS: VectorStrategy = if FLASHEND > 0x1FFF {
    VectorStrategy::WideJump
} else {
    VectorStrategy::NarrowRelative
};

pub const TARGET: Target = Target::new(BOOT_ADR, PLACEMENT, VECTORS);
