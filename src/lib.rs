//! SD card bootloader for the Ultimaker 2 main board
//!
//! Installs `app.bin` from the memory card into the application region of
//! the ATmega2560's code flash, then starts the application.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

pub mod bootloader;
pub mod config;
pub mod drivers;
pub mod fs;
#[cfg(target_arch = "avr")]
pub mod hal;
pub mod logger;

#[cfg(test)]
pub(crate) mod testing;
