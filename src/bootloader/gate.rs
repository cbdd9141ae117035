//! Entry conditions evaluated at reset

use embedded_hal::digital::v2::InputPin;

use super::layout::{Placement, Target};
use super::vector::is_blank;
use crate::drivers::flash::CodeFlash;
use crate::drivers::switches::Switches;
use crate::logger::{diag, Channel, Hex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Path {
    /// Start the installed application
    Launch,
    /// Program the image from the card
    Install,
}

/// Maps the three entry predicates onto a boot path.
pub fn decide(app_valid: bool, card_present: bool, button_held: bool) -> Path {
    if !app_valid || (card_present && button_held) {
        Path::Install
    } else {
        Path::Launch
    }
}

/// Whether there is an application to jump to.
///
/// Secondary builds look at the trampoline slot, which must hold something
/// other than a blank word or a jump back into the bootloader. Primary builds
/// only need a non-blank reset vector.
pub fn app_valid<F: CodeFlash>(target: &Target, flash: &F) -> bool {
    match target.placement {
        Placement::Primary => !is_blank(target.vectors.read(flash, 0)),
        Placement::Secondary => {
            let slot = target.trampoline_slot();
            let word = target.vectors.read(flash, slot);
            !is_blank(word) && word != target.vectors.jump(slot, target.boot_adr)
        }
    }
}

/// Points the reset vector back at the bootloader if something replaced it.
///
/// The repair rewrites the whole first page: the jump followed by erased
/// fill. Returns true when flash was written. Primary builds never touch
/// address 0.
pub fn heal_reset_vector<F, W, const P: usize>(target: &Target, flash: &mut F, log: &mut W) -> bool
where
    F: CodeFlash,
    W: Channel,
{
    if !target.is_secondary() {
        return false;
    }
    let expected = target.reset_jump();
    let found = target.vectors.read(flash, 0);
    if found == expected {
        return false;
    }
    diag!(log, "reset vector requires overwrite, read {}, should be {}", Hex(found), Hex(expected));
    let mut page = [0xFFu8; P];
    target.vectors.store(&mut page, expected);
    flash.erase_and_program(0, &page);
    true
}

/// Samples the switches the way the board expects: the card is only looked
/// at with a valid application, the button only with a card inserted.
pub fn evaluate<CD, BT, W>(app_valid: bool, switches: &Switches<CD, BT>, log: &mut W) -> Path
where
    CD: InputPin,
    BT: InputPin,
    W: Channel,
{
    if !app_valid {
        diag!(log, "forced to boot from card");
        return Path::Install;
    }
    if !switches.card_present() {
        diag!(log, "card not detected");
        return decide(true, false, false);
    }
    if !switches.button_held() {
        diag!(log, "button not pressed");
        return decide(true, true, false);
    }
    diag!(log, "can jump, almost primed");
    Path::Install
}
