//! MMC / SD card over SPI
//!
//! Supports MMCv3, SDv1 and SDv2 cards in byte or block addressing. Only
//! single-block reads are issued; the sector is streamed past and just the
//! requested window is kept.

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use ufmt::{uDisplay, uWrite, Formatter};

use crate::fs::{BlockDevice, SECTOR_SIZE};
use crate::logger::Hex;

// Command indices; bit 7 marks an application command sent after CMD55
const CMD0: u8 = 0;
const CMD1: u8 = 1;
const ACMD41: u8 = 0x80 | 41;
const CMD8: u8 = 8;
const CMD16: u8 = 16;
const CMD17: u8 = 17;
const CMD55: u8 = 55;
const CMD58: u8 = 58;

const R1_IDLE: u8 = 0x01;
const DATA_TOKEN: u8 = 0xFE;

/// Bytes polled for a command response
const NCR_LIMIT: u8 = 10;
/// Initialization polls before giving up, roughly one second at 125 kHz
const INIT_RETRIES: u16 = 1000;
/// Bytes polled for the data token of a read
const TOKEN_LIMIT: u16 = 40_000;

/// Host clock switch; slow during identification, fast afterwards.
pub trait SpiClock {
    fn slow(&mut self);
    fn fast(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardType {
    Mmc,
    Sd1,
    /// `block` cards take sector numbers instead of byte offsets
    Sd2 { block: bool },
}

impl CardType {
    fn is_block(self) -> bool {
        matches!(self, CardType::Sd2 { block: true })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MmcError {
    /// SPI transfer or chip-select failed
    Bus,
    /// No card answered the reset command
    NoResponse,
    /// Voltage range or command set not supported
    Unsupported,
    /// Card stayed busy through initialization
    Timeout,
    /// Read before a successful initialization
    NotInitialized,
    /// Card rejected a command with this R1 status
    Command(u8),
    /// Data token missing or an error token instead
    Token(u8),
}

impl uDisplay for MmcError {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        match self {
            MmcError::Bus => f.write_str("bus error"),
            MmcError::NoResponse => f.write_str("no card"),
            MmcError::Unsupported => f.write_str("unsupported card"),
            MmcError::Timeout => f.write_str("card timeout"),
            MmcError::NotInitialized => f.write_str("card not initialized"),
            MmcError::Command(r1) => {
                f.write_str("command rejected, r1 ")?;
                Hex(*r1).fmt(f)
            }
            MmcError::Token(t) => {
                f.write_str("bad data token ")?;
                Hex(*t).fmt(f)
            }
        }
    }
}

pub struct Mmc<SPI, CS> {
    spi: SPI,
    cs: CS,
    card: Option<CardType>,
}

impl<SPI, CS> Mmc<SPI, CS>
where
    SPI: Transfer<u8> + SpiClock,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs, card: None }
    }

    fn exchange(&mut self, buf: &mut [u8]) -> Result<(), MmcError> {
        self.spi.transfer(buf).map_err(|_| MmcError::Bus)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<u8, MmcError> {
        let mut byte = [0xFF];
        self.exchange(&mut byte)?;
        Ok(byte[0])
    }

    fn select(&mut self) -> Result<(), MmcError> {
        self.cs.set_low().map_err(|_| MmcError::Bus)?;
        self.receive()?;
        Ok(())
    }

    /// Releases the card; one more clock lets it free MISO.
    fn deselect(&mut self) -> Result<(), MmcError> {
        self.cs.set_high().map_err(|_| MmcError::Bus)?;
        self.receive()?;
        Ok(())
    }

    /// Sends a command frame and returns the R1 response.
    fn command(&mut self, cmd: u8, arg: u32) -> Result<u8, MmcError> {
        let mut cmd = cmd;
        if cmd & 0x80 != 0 {
            cmd &= 0x7F;
            let r1 = self.command(CMD55, 0)?;
            if r1 > R1_IDLE {
                return Ok(r1);
            }
        }

        self.deselect()?;
        self.select()?;

        let crc = match cmd {
            CMD0 => 0x95,
            CMD8 => 0x87,
            _ => 0x01,
        };
        let a = arg.to_be_bytes();
        let mut frame = [0x40 | cmd, a[0], a[1], a[2], a[3], crc];
        self.exchange(&mut frame)?;

        let mut r1 = 0xFF;
        for _ in 0..NCR_LIMIT {
            r1 = self.receive()?;
            if r1 & 0x80 == 0 {
                break;
            }
        }
        Ok(r1)
    }

    /// Repeats `cmd` until the card leaves the idle state.
    fn wait_ready(&mut self, cmd: u8, arg: u32) -> Result<(), MmcError> {
        for _ in 0..INIT_RETRIES {
            if self.command(cmd, arg)? == 0 {
                return Ok(());
            }
        }
        Err(MmcError::Timeout)
    }

    fn identify(&mut self) -> Result<CardType, MmcError> {
        if self.command(CMD0, 0)? != R1_IDLE {
            return Err(MmcError::NoResponse);
        }

        if self.command(CMD8, 0x1AA)? == R1_IDLE {
            // SDv2: check the echoed voltage range and pattern
            let mut r7 = [0xFF; 4];
            self.exchange(&mut r7)?;
            if r7[2] != 0x01 || r7[3] != 0xAA {
                return Err(MmcError::Unsupported);
            }
            self.wait_ready(ACMD41, 1 << 30)?;
            let r1 = self.command(CMD58, 0)?;
            if r1 != 0 {
                return Err(MmcError::Command(r1));
            }
            let mut ocr = [0xFF; 4];
            self.exchange(&mut ocr)?;
            return Ok(CardType::Sd2 {
                block: ocr[0] & 0x40 != 0,
            });
        }

        let (card, cmd) = if self.command(ACMD41, 0)? <= R1_IDLE {
            (CardType::Sd1, ACMD41)
        } else {
            (CardType::Mmc, CMD1)
        };
        self.wait_ready(cmd, 0)?;
        let r1 = self.command(CMD16, SECTOR_SIZE as u32)?;
        if r1 != 0 {
            return Err(MmcError::Command(r1));
        }
        Ok(card)
    }

    fn init(&mut self) -> Result<(), MmcError> {
        self.card = None;
        self.spi.slow();
        self.cs.set_high().map_err(|_| MmcError::Bus)?;
        // at least 74 clocks with CS high
        let mut dummy = [0xFF; 10];
        self.exchange(&mut dummy)?;

        let identified = self.identify();
        self.deselect()?;
        let card = identified?;
        self.card = Some(card);
        self.spi.fast();
        Ok(())
    }

    fn read_window(&mut self, lba: u32, offset: usize, buf: &mut [u8]) -> Result<(), MmcError> {
        let card = self.card.ok_or(MmcError::NotInitialized)?;
        let addr = if card.is_block() { lba } else { lba * SECTOR_SIZE as u32 };

        let r1 = self.command(CMD17, addr)?;
        if r1 != 0 {
            return Err(MmcError::Command(r1));
        }

        let mut token = 0xFF;
        for _ in 0..TOKEN_LIMIT {
            token = self.receive()?;
            if token != 0xFF {
                break;
            }
        }
        if token != DATA_TOKEN {
            return Err(MmcError::Token(token));
        }

        for _ in 0..offset {
            self.receive()?;
        }
        buf.fill(0xFF);
        self.exchange(buf)?;
        // rest of the sector plus the CRC
        for _ in 0..SECTOR_SIZE + 2 - offset - buf.len() {
            self.receive()?;
        }
        Ok(())
    }
}

impl<SPI, CS> BlockDevice for Mmc<SPI, CS>
where
    SPI: Transfer<u8> + SpiClock,
    CS: OutputPin,
{
    type Error = MmcError;

    fn initialize(&mut self) -> Result<(), MmcError> {
        self.init()
    }

    fn read(&mut self, lba: u32, offset: usize, buf: &mut [u8]) -> Result<(), MmcError> {
        let result = self.read_window(lba, offset, buf);
        self.deselect()?;
        result
    }
}
