use std::env;

// Must match config::BOOT_ADR
const BOOT_ADR: u32 = 0x3E000;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds only compile the library for tests
    let target = env::var("TARGET").unwrap_or_default();
    if !target.contains("avr") {
        return;
    }

    println!("cargo:rustc-link-arg=-mmcu=atmega2560");

    // The whole image lives in the bootloader region
    println!("cargo:rustc-link-arg=-Wl,--section-start=.text={:#x}", BOOT_ADR);

    if env::var("CARGO_FEATURE_DEBUG").is_ok() {
        println!("cargo:warning=Diagnostics enabled on USART0");
    }
}
