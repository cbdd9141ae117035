//! Card bootloader: reset gate, image install and hand-off to the application

pub mod dispatch;
pub mod gate;
pub mod install;
pub mod layout;
pub mod vector;

pub use self::gate::Path;
pub use self::install::{InstallReport, Installer};
pub use self::layout::{Placement, Target};
pub use self::vector::VectorStrategy;

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::config::APP_FILE;
use crate::drivers::flash::{CodeFlash, Fuse};
use crate::drivers::status_led::{Blink, StatusLed};
use crate::drivers::switches::Switches;
use crate::fs::CardFs;
use crate::logger::{diag, Channel, Hex};

/// How a bootloader run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Jump to this code address; the diagnostic channel is already released
    Launch { entry: u32 },
    /// New firmware was written
    Installed(InstallReport),
    /// The image matched flash
    Unchanged(InstallReport),
    /// Nothing to start and nothing installed
    NoApplication,
}

impl Outcome {
    /// Pattern repeated until power is cycled, if the run does not launch.
    pub fn blink(&self) -> Option<Blink> {
        match self {
            Outcome::Launch { .. } => None,
            Outcome::Installed(_) => Some(Blink::Installed),
            Outcome::Unchanged(_) => Some(Blink::Unchanged),
            Outcome::NoApplication => Some(Blink::NoApplication),
        }
    }
}

/// Everything the bootloader drives, `P` being the flash page size.
pub struct Bootloader<F, C, CD, BT, LED, DL, W, const P: usize> {
    target: Target,
    flash: F,
    card: C,
    switches: Switches<CD, BT>,
    status: StatusLed<LED, DL>,
    log: W,
}

impl<F, C, CD, BT, LED, DL, W, const P: usize> Bootloader<F, C, CD, BT, LED, DL, W, P>
where
    F: CodeFlash,
    C: CardFs,
    CD: InputPin,
    BT: InputPin,
    LED: OutputPin,
    DL: DelayMs<u16> + DelayUs<u16>,
    W: Channel,
{
    pub fn new(
        target: Target,
        flash: F,
        card: C,
        switches: Switches<CD, BT>,
        status: StatusLed<LED, DL>,
        log: W,
    ) -> Self {
        Self {
            target,
            flash,
            card,
            switches,
            status,
            log,
        }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn log(&self) -> &W {
        &self.log
    }

    pub fn status(&mut self) -> &mut StatusLed<LED, DL> {
        &mut self.status
    }

    /// Runs from reset to the point where the board either starts the
    /// application or shows a final pattern.
    pub fn run(&mut self) -> Outcome {
        diag!(&mut self.log, "UM2 SD Card Bootloader");
        if self.log.enabled() {
            self.log_fuses();
        }

        gate::heal_reset_vector::<F, W, P>(&self.target, &mut self.flash, &mut self.log);
        let can_launch = gate::app_valid(&self.target, &self.flash);

        self.status.set(false);
        if can_launch {
            self.status.settle();
        }

        if gate::evaluate(can_launch, &self.switches, &mut self.log) == Path::Launch {
            return self.launch();
        }

        // a failed mount shows up as a failed open
        if let Err(e) = self.card.mount() {
            diag!(&mut self.log, "mount failed: {}", e);
        }
        if let Err(e) = self.card.open(APP_FILE) {
            diag!(&mut self.log, "file failed to open: {}", e);
            return self.launch();
        }

        self.status.set(true);

        if can_launch {
            diag!(&mut self.log, "waiting for button release...");
            while self.switches.button_held() {
                self.status.show(Blink::ReleaseButton);
            }
            diag!(&mut self.log, "released");
        }

        let status = &mut self.status;
        let report = Installer::<P>::new(self.target).run(&mut self.flash, &mut self.card, &mut self.log, || {
            status.toggle()
        });

        if report.wrote_anything() {
            diag!(&mut self.log, "all done");
            Outcome::Installed(report)
        } else {
            diag!(&mut self.log, "all done, nothing written");
            Outcome::Unchanged(report)
        }
    }

    fn log_fuses(&mut self) {
        let flash = &self.flash;
        diag!(
            &mut self.log,
            "LFUSE {}, HFUSE {}",
            Hex(flash.read_fuse(Fuse::Low)),
            Hex(flash.read_fuse(Fuse::High))
        );
        diag!(
            &mut self.log,
            "EFUSE {}, LOCKBITS {}",
            Hex(flash.read_fuse(Fuse::Extended)),
            Hex(flash.read_fuse(Fuse::Lock))
        );
    }

    /// Re-checks the application and hands over to it when there is one.
    fn launch(&mut self) -> Outcome {
        gate::heal_reset_vector::<F, W, P>(&self.target, &mut self.flash, &mut self.log);
        if !gate::app_valid(&self.target, &self.flash) {
            diag!(&mut self.log, "no app to start");
            return Outcome::NoApplication;
        }
        diag!(&mut self.log, "starting app");
        self.log.release();
        Outcome::Launch {
            entry: self.target.entry_point(),
        }
    }
}
