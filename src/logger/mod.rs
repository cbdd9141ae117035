//! Diagnostic output
//!
//! Messages are formatted with `ufmt` into any [`Channel`]. Builds without
//! the `debug` feature log into [`Discard`], so formatting compiles away.

use core::convert::Infallible;
use ufmt::{uDisplay, uWrite, Formatter};

/// Diagnostic sink that can be handed back before leaving the bootloader.
pub trait Channel: uWrite {
    /// False when output goes nowhere, so callers can skip gathering it.
    fn enabled(&self) -> bool {
        true
    }

    /// Finishes pending output and frees the peripheral for the application.
    fn release(&mut self) {}
}

/// Sink used when diagnostics are compiled out.
#[derive(Default)]
pub struct Discard;

impl uWrite for Discard {
    type Error = Infallible;

    #[inline(always)]
    fn write_str(&mut self, _s: &str) -> Result<(), Infallible> {
        Ok(())
    }
}

impl Channel for Discard {
    fn enabled(&self) -> bool {
        false
    }
}

/// Writes one diagnostic line terminated by CR LF.
macro_rules! diag {
    ($log:expr, $($arg:tt)*) => {{
        let log = &mut *$log;
        let _ = ufmt::uwrite!(&mut *log, $($arg)*);
        let _ = ufmt::uWrite::write_str(&mut *log, "\r\n");
    }};
}

pub(crate) use diag;

const HEX_CHARS: [u8; 16] = *b"0123456789ABCDEF";

/// Fixed-width upper-case hex rendering, `0x` prefixed.
#[derive(Clone, Copy)]
pub struct Hex<T>(pub T);

fn write_hex<W>(f: &mut Formatter<'_, W>, value: u32, digits: usize) -> Result<(), W::Error>
where
    W: uWrite + ?Sized,
{
    let mut buf = [0u8; 10];
    buf[0] = b'0';
    buf[1] = b'x';
    for i in 0..digits {
        let nibble = (value >> ((digits - 1 - i) * 4)) & 0xF;
        buf[2 + i] = HEX_CHARS[nibble as usize];
    }
    f.write_str(core::str::from_utf8(&buf[..2 + digits]).unwrap_or("0x?"))
}

macro_rules! impl_hex {
    ($($ty:ty => $digits:expr),*) => {
        $(
            impl uDisplay for Hex<$ty> {
                fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
                where
                    W: uWrite + ?Sized,
                {
                    write_hex(f, u32::from(self.0), $digits)
                }
            }
        )*
    };
}

impl_hex!(u8 => 2, u16 => 4, u32 => 8);
