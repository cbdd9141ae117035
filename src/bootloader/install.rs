//! Page-by-page image installer
//!
//! Walks the application region `[0, boot_adr)` one flash page at a time,
//! filling each page from the card image. In secondary placement the first
//! page has its reset vector redirected into the bootloader and the last page
//! receives the trampoline to the application's real entry point. A page is
//! only programmed when its contents differ from flash.

use super::layout::Target;
use super::vector::Trampoline;
use crate::drivers::flash::CodeFlash;
use crate::fs::CardFs;
use crate::logger::{diag, Channel, Hex};

/// What an install run committed to flash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Image bytes carried by the pages that were programmed
    pub bytes_written: u32,
    pub pages_written: u32,
}

impl InstallReport {
    pub fn wrote_anything(&self) -> bool {
        self.bytes_written > 0
    }
}

/// Install context for one run, `P` being the flash page size.
pub struct Installer<const P: usize> {
    target: Target,
    page: [u8; P],
    /// Base of the page being installed
    fa: u32,
    bw: u32,
    pages_written: u32,
    end_of_file: bool,
    /// First vector of the image, captured from page 0
    app_reset_vector: Option<u32>,
}

impl<const P: usize> Installer<P> {
    const PAGE: u32 = P as u32;

    pub fn new(target: Target) -> Self {
        debug_assert!(P.is_power_of_two());
        debug_assert_eq!(target.boot_adr % Self::PAGE, 0);
        Self {
            target,
            page: [0xFF; P],
            fa: 0,
            bw: 0,
            pages_written: 0,
            end_of_file: false,
            app_reset_vector: None,
        }
    }

    /// Installs the image read from `source`. `on_commit` runs right before
    /// each page is programmed.
    pub fn run<F, S, W>(mut self, flash: &mut F, source: &mut S, log: &mut W, mut on_commit: impl FnMut()) -> InstallReport
    where
        F: CodeFlash,
        S: CardFs,
        W: Channel,
    {
        while self.fa < self.target.boot_adr {
            self.install_page(flash, source, log, &mut on_commit);
            self.fa += Self::PAGE;
        }
        InstallReport {
            bytes_written: self.bw,
            pages_written: self.pages_written,
        }
    }

    fn is_first_page(&self) -> bool {
        self.target.is_secondary() && self.fa == 0
    }

    fn is_trampoline_page(&self) -> bool {
        self.target.is_secondary() && self.fa == self.target.boot_adr - Self::PAGE
    }

    fn install_page<F, S, W>(&mut self, flash: &mut F, source: &mut S, log: &mut W, on_commit: &mut impl FnMut())
    where
        F: CodeFlash,
        S: CardFs,
        W: Channel,
    {
        let mut br = self.load(source, log);
        let first = self.is_first_page();
        let trampoline = self.is_trampoline_page();

        if first {
            br = self.redirect_reset_vector(br, log);
        }
        if trampoline {
            br = self.place_trampoline(br, log);
        }
        if !first && !trampoline && br == 0 {
            self.end_of_file = true;
            return;
        }

        if self.differs(flash) {
            on_commit();
            flash.erase_and_program(self.fa, &self.page);
            self.bw += br as u32;
            self.pages_written += 1;
            diag!(log, "bytes written: {}", self.bw);
        }
    }

    /// Refills the page buffer from the image, returning the bytes delivered.
    fn load<S: CardFs, W: Channel>(&mut self, source: &mut S, log: &mut W) -> usize {
        self.page.fill(0xFF);
        if self.end_of_file {
            return 0;
        }
        let mut filled = 0;
        while filled < P {
            match source.read(&mut self.page[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    diag!(log, "read failed at {}: {}", Hex(self.fa + filled as u32), e);
                    // drop whatever the failed read left behind
                    self.page[filled..].fill(0xFF);
                    self.end_of_file = true;
                    break;
                }
            }
        }
        filled
    }

    fn redirect_reset_vector<W: Channel>(&mut self, br: usize, log: &mut W) -> usize {
        let vectors = self.target.vectors;
        let old = vectors.load(&self.page);
        let new = self.target.reset_jump();
        self.app_reset_vector = Some(old);
        vectors.store(&mut self.page, new);
        diag!(log, "reset vector, old = {}, new = {}", Hex(old), Hex(new));
        if br == 0 {
            vectors.width() as usize
        } else {
            br
        }
    }

    fn place_trampoline<W: Channel>(&mut self, br: usize, log: &mut W) -> usize {
        let vectors = self.target.vectors;
        let slot = self.target.trampoline_slot();
        let app_vector = self.app_reset_vector.unwrap_or(u32::MAX);
        let insn = vectors.trampoline(app_vector, slot, self.target.boot_adr);

        let offset = P - vectors.width() as usize;
        vectors.store(&mut self.page[offset..], insn.word());

        match insn {
            Trampoline::Entry(word) => diag!(log, "trampoline, addr {}, entry {}", Hex(slot), Hex(word)),
            Trampoline::LoopBack(word) => diag!(log, "trampoline, no app, addr {}, boot jump {}", Hex(slot), Hex(word)),
            Trampoline::Verbatim(word) => diag!(log, "trampoline, unknown, addr {}, copied {}", Hex(slot), Hex(word)),
        }

        match insn {
            // an entry counts as data even when the image ends earlier
            Trampoline::Entry(_) | Trampoline::Verbatim(_) if br == 0 => vectors.width() as usize,
            _ => br,
        }
    }

    fn differs<F: CodeFlash>(&self, flash: &F) -> bool {
        self.page
            .iter()
            .zip(self.fa..)
            .any(|(&b, addr)| flash.read_byte(addr) != b)
    }
}
