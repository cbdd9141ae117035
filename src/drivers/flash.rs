//! Internal code flash driver (self-programming through SPM)

/// Fuse and lock bytes readable through the SPM unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fuse {
    Low,
    Lock,
    Extended,
    High,
}

impl Fuse {
    /// Z pointer value selecting this byte for a BLBSET read.
    pub const fn address(self) -> u16 {
        match self {
            Fuse::Low => 0x0000,
            Fuse::Lock => 0x0001,
            Fuse::Extended => 0x0002,
            Fuse::High => 0x0003,
        }
    }
}

/// Page-granular access to the part's own code flash.
pub trait CodeFlash {
    /// Reads one byte, including addresses above 64 KiB.
    fn read_byte(&self, addr: u32) -> u8;

    /// Erases the page at `page_base` and programs it with `data`.
    ///
    /// `page_base` must be page aligned and `data` exactly one page long.
    fn erase_and_program(&mut self, page_base: u32, data: &[u8]);

    fn read_fuse(&self, which: Fuse) -> u8;

    fn read_u16(&self, addr: u32) -> u16 {
        u16::from_le_bytes([self.read_byte(addr), self.read_byte(addr + 1)])
    }

    fn read_u32(&self, addr: u32) -> u32 {
        u32::from_le_bytes([
            self.read_byte(addr),
            self.read_byte(addr + 1),
            self.read_byte(addr + 2),
            self.read_byte(addr + 3),
        ])
    }
}

#[cfg(target_arch = "avr")]
pub use self::spm::SpmFlash;

#[cfg(target_arch = "avr")]
mod spm {
    use super::{CodeFlash, Fuse};
    use core::arch::asm;
    use core::convert::Infallible;

    // SPMCSR bits
    const SPMEN: u8 = 0x01;
    const PGERS: u8 = 0x02;
    const PGWRT: u8 = 0x04;
    const BLBSET: u8 = 0x08;
    const RWWSRE: u8 = 0x10;

    // Data space address of SPMCSR
    const SPMCSR: *const u8 = 0x57 as *const u8;

    /// Self-programming driver for ATmega2560 class parts.
    pub struct SpmFlash {
        _private: (),
    }

    impl SpmFlash {
        pub fn new() -> Self {
            Self { _private: () }
        }

        fn poll_ready() -> nb::Result<(), Infallible> {
            let busy = unsafe { core::ptr::read_volatile(SPMCSR) } & SPMEN != 0;
            if busy {
                Err(nb::Error::WouldBlock)
            } else {
                Ok(())
            }
        }

        fn wait_ready(&self) {
            let _ = nb::block!(Self::poll_ready());
        }

        /// Issues an SPM command for the page containing `addr`.
        ///
        /// SPM must follow the SPMCSR store within four cycles, so both
        /// live in the same asm block.
        unsafe fn command(addr: u32, command: u8) {
            asm!(
                "out 0x3b, {rampz}",
                "sts 0x57, {cmd}",
                "spm",
                "out 0x3b, r1",
                rampz = in(reg) (addr >> 16) as u8,
                cmd = in(reg) command,
                in("Z") addr as u16,
            );
        }

        /// Loads one word into the temporary page buffer.
        unsafe fn fill(addr: u32, word: u16) {
            asm!(
                "movw r0, {data}",
                "out 0x3b, {rampz}",
                "sts 0x57, {cmd}",
                "spm",
                "clr r1",
                "out 0x3b, r1",
                data = in(reg_pair) word,
                rampz = in(reg) (addr >> 16) as u8,
                cmd = in(reg) SPMEN,
                in("Z") addr as u16,
            );
        }
    }

    impl CodeFlash for SpmFlash {
        fn read_byte(&self, addr: u32) -> u8 {
            let byte: u8;
            unsafe {
                asm!(
                    "out 0x3b, {rampz}",
                    "elpm {byte}, Z",
                    "out 0x3b, r1",
                    rampz = in(reg) (addr >> 16) as u8,
                    byte = out(reg) byte,
                    in("Z") addr as u16,
                    options(nostack, preserves_flags),
                );
            }
            byte
        }

        fn read_fuse(&self, which: Fuse) -> u8 {
            self.wait_ready();
            let byte: u8;
            // LPM must follow the SPMCSR store within three cycles
            unsafe {
                asm!(
                    "sts 0x57, {cmd}",
                    "lpm {byte}, Z",
                    cmd = in(reg) BLBSET | SPMEN,
                    byte = out(reg) byte,
                    in("Z") which.address(),
                    options(nostack, preserves_flags),
                );
            }
            byte
        }

        fn erase_and_program(&mut self, page_base: u32, data: &[u8]) {
            self.wait_ready();
            unsafe { Self::command(page_base, PGERS | SPMEN) };
            self.wait_ready();

            let mut addr = page_base;
            for pair in data.chunks_exact(2) {
                unsafe { Self::fill(addr, u16::from_le_bytes([pair[0], pair[1]])) };
                addr += 2;
            }

            unsafe { Self::command(page_base, PGWRT | SPMEN) };
            self.wait_ready();

            // Application section stays unreadable until RWW is re-enabled
            unsafe { Self::command(0, RWWSRE | SPMEN) };
            self.wait_ready();
        }
    }

    impl Default for SpmFlash {
        fn default() -> Self {
            Self::new()
        }
    }
}
