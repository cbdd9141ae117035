//! Read-only access to the image file on the memory card
//!
//! Only what the bootloader needs: mount the first FAT volume, find a file
//! in the root directory and read it front to back.

mod bpb;
mod fat;

pub use self::bpb::{FatKind, Volume, SECTOR_SIZE};
pub use self::fat::FatFs;

use ufmt::{uDisplay, uWrite, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsError {
    /// The card failed a read
    Disk,
    /// The card did not initialize
    NotReady,
    /// No such file in the root directory
    NoFile,
    /// Read without an open file
    NotOpened,
    /// Open or read before a successful mount
    NotEnabled,
    /// No FAT16/FAT32 volume found
    NoFileSystem,
}

impl FsError {
    pub fn as_str(self) -> &'static str {
        match self {
            FsError::Disk => "disk error",
            FsError::NotReady => "not ready",
            FsError::NoFile => "no file",
            FsError::NotOpened => "not opened",
            FsError::NotEnabled => "not mounted",
            FsError::NoFileSystem => "no file system",
        }
    }
}

impl uDisplay for FsError {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        f.write_str(self.as_str())
    }
}

/// Sector-addressed storage with partial sector reads.
pub trait BlockDevice {
    type Error;

    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Reads `buf.len()` bytes starting `offset` bytes into sector `lba`.
    ///
    /// `offset + buf.len()` never exceeds [`SECTOR_SIZE`].
    fn read(&mut self, lba: u32, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;
}

/// The file source the installer pulls the image from.
pub trait CardFs {
    fn mount(&mut self) -> Result<(), FsError>;

    /// Opens `name` in the root directory for sequential reading.
    fn open(&mut self, name: &str) -> Result<(), FsError>;

    /// Reads up to `buf.len()` bytes; `Ok(0)` marks the end of the file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError>;
}

/// Converts `name.ext` into the space padded 8.3 directory form.
pub fn short_name(name: &str) -> Option<[u8; 11]> {
    let mut out = [b' '; 11];
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => (name, ""),
    };
    if stem.is_empty() || stem.len() > 8 || ext.len() > 3 {
        return None;
    }
    for (slot, b) in out[..8].iter_mut().zip(stem.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    for (slot, b) in out[8..].iter_mut().zip(ext.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    if out.iter().any(|&b| b < 0x20 || b == b'.' || b == b'/' || b == b'\\') {
        return None;
    }
    Some(out)
}
