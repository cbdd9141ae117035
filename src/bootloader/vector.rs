//! Reset vector instruction codec
//!
//! Mega parts store a 4-byte `JMP k` in every vector slot, small parts a
//! 2-byte `RJMP k`. Stored values are little-endian reads of the flash bytes,
//! so for `JMP` the opcode word sits in the low half.

use crate::drivers::flash::CodeFlash;

pub const JMP_OPCODE: u32 = 0x940C_0000;
pub const JMP_MASK: u32 = 0xFE0E_0000;
const JMP_VALID_BITS: u32 = 0x95FD_FFFF;

pub const RJMP_OPCODE: u16 = 0xC000;
pub const RJMP_MASK: u16 = 0xF000;

/// Bytes reachable by a 12-bit word displacement before the PC wraps
pub const RJMP_SPAN: u32 = 0x2000;

#[inline]
const fn swap_halves(x: u32) -> u32 {
    (x << 16) | (x >> 16)
}

/// Encodes `JMP target` in stored word order.
pub const fn encode_jmp(target: u32) -> u32 {
    let k = target >> 1;
    let mut y = k & 0x0001_FFFF;
    y |= (k & 0xFFFE_0000) << 3;
    y |= JMP_OPCODE;
    y &= JMP_VALID_BITS;
    swap_halves(y)
}

pub const fn is_jmp(stored: u32) -> bool {
    swap_halves(stored) & JMP_MASK == JMP_OPCODE
}

/// Byte address a stored `JMP` transfers control to.
pub fn decode_jmp(stored: u32) -> Option<u32> {
    if !is_jmp(stored) {
        return None;
    }
    let y = swap_halves(stored);
    let k = ((y >> 3) & 0x003E_0000) | (y & 0x0001_FFFF);
    Some(k << 1)
}

/// Encodes `RJMP` placed at `src` landing on `dst`.
pub const fn encode_rjmp(src: u32, dst: u32) -> u16 {
    let delta = (dst as i32).wrapping_sub(src as i32) >> 1;
    RJMP_OPCODE | (delta as u16 & 0x0FFF)
}

pub const fn is_rjmp(word: u16) -> bool {
    word & RJMP_MASK == RJMP_OPCODE
}

/// Target of an `RJMP` at `src`, modulo [`RJMP_SPAN`].
pub fn decode_rjmp(src: u32, word: u16) -> Option<u32> {
    if !is_rjmp(word) {
        return None;
    }
    let offset = u32::from(word & 0x0FFF) << 1;
    Some(src.wrapping_add(offset) & (RJMP_SPAN - 1))
}

/// Erased or zeroed vector slot.
pub const fn is_blank(stored: u32) -> bool {
    let first = stored as u16;
    first == 0xFFFF || first == 0x0000
}

/// What ends up in the trampoline slot for a given application vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trampoline {
    /// Jump to the application's entry point
    Entry(u32),
    /// No application; jump back into the bootloader
    LoopBack(u32),
    /// Unrecognized instruction copied as-is
    Verbatim(u32),
}

impl Trampoline {
    pub fn word(self) -> u32 {
        match self {
            Trampoline::Entry(w) | Trampoline::LoopBack(w) | Trampoline::Verbatim(w) => w,
        }
    }
}

/// How the part encodes its vector table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStrategy {
    /// 4-byte absolute `JMP` vectors
    WideJump,
    /// 2-byte relative `RJMP` vectors
    NarrowRelative,
}

impl VectorStrategy {
    /// Size of one vector slot in bytes.
    pub const fn width(self) -> u32 {
        match self {
            VectorStrategy::WideJump => 4,
            VectorStrategy::NarrowRelative => 2,
        }
    }

    /// Jump instruction placed at `src` that lands on `dst`.
    pub const fn jump(self, src: u32, dst: u32) -> u32 {
        match self {
            VectorStrategy::WideJump => encode_jmp(dst),
            VectorStrategy::NarrowRelative => encode_rjmp(src, dst) as u32,
        }
    }

    /// Where the vector at `src` transfers control to, if it is a jump.
    pub fn target(self, src: u32, stored: u32) -> Option<u32> {
        match self {
            VectorStrategy::WideJump => {
                decode_jmp(stored).or_else(|| decode_rjmp(src, stored as u16))
            }
            VectorStrategy::NarrowRelative => decode_rjmp(src, stored as u16),
        }
    }

    pub fn load(self, bytes: &[u8]) -> u32 {
        match self {
            VectorStrategy::WideJump => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            VectorStrategy::NarrowRelative => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        }
    }

    pub fn store(self, bytes: &mut [u8], word: u32) {
        let width = self.width() as usize;
        bytes[..width].copy_from_slice(&word.to_le_bytes()[..width]);
    }

    /// Reads the vector slot at `addr` from code flash.
    pub fn read<F: CodeFlash>(self, flash: &F, addr: u32) -> u32 {
        match self {
            VectorStrategy::WideJump => flash.read_u32(addr),
            VectorStrategy::NarrowRelative => u32::from(flash.read_u16(addr)),
        }
    }

    /// Converts the application's reset vector into the instruction stored
    /// at `slot`, the last vector-sized slot below `boot_adr`.
    pub fn trampoline(self, app_vector: u32, slot: u32, boot_adr: u32) -> Trampoline {
        match self {
            VectorStrategy::WideJump => {
                if is_jmp(app_vector) {
                    Trampoline::Entry(app_vector)
                } else if let Some(entry) = decode_rjmp(0, app_vector as u16) {
                    // relative reach is lost once the jump moves up to the slot
                    Trampoline::Entry(encode_jmp(entry))
                } else if is_blank(app_vector) {
                    Trampoline::LoopBack(encode_jmp(boot_adr))
                } else {
                    Trampoline::Verbatim(app_vector)
                }
            }
            VectorStrategy::NarrowRelative => {
                let word = app_vector as u16;
                if let Some(entry) = decode_rjmp(0, word) {
                    Trampoline::Entry(u32::from(encode_rjmp(slot, entry)))
                } else if is_blank(app_vector) {
                    Trampoline::LoopBack(u32::from(encode_rjmp(slot, boot_adr)))
                } else {
                    Trampoline::Verbatim(u32::from(word))
                }
            }
        }
    }
}
