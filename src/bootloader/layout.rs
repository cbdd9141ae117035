//! Where the bootloader sits and how the part encodes jumps

use super::vector::VectorStrategy;

/// Bootloader placement relative to the hardware boot section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Entered by the hardware reset; the application owns address 0
    Primary,
    /// Entered through the reset vector, which is rewritten to point here
    Secondary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    /// First byte of the bootloader; the application region is `[0, boot_adr)`
    pub boot_adr: u32,
    pub placement: Placement,
    pub vectors: VectorStrategy,
}

impl Target {
    pub const fn new(boot_adr: u32, placement: Placement, vectors: VectorStrategy) -> Self {
        Self {
            boot_adr,
            placement,
            vectors,
        }
    }

    #[inline]
    pub const fn is_secondary(&self) -> bool {
        matches!(self.placement, Placement::Secondary)
    }

    /// Last vector-sized slot of the application region.
    pub const fn trampoline_slot(&self) -> u32 {
        self.boot_adr - self.vectors.width()
    }

    /// Reset vector that enters the bootloader.
    pub const fn reset_jump(&self) -> u32 {
        self.vectors.jump(0, self.boot_adr)
    }

    /// Code address the dispatcher jumps to.
    pub const fn entry_point(&self) -> u32 {
        match self.placement {
            Placement::Primary => 0,
            Placement::Secondary => self.trampoline_slot(),
        }
    }
}
