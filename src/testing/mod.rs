//! Host-side stand-ins for the board: code flash, card, pins and log sink

use core::convert::Infallible;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::drivers::flash::{CodeFlash, Fuse};
use crate::fs::{BlockDevice, CardFs, FatKind, FsError, SECTOR_SIZE};
use crate::logger::Channel;

/// Code flash backed by a byte vector; records every page it programs.
pub struct SimFlash {
    mem: Vec<u8>,
    page_size: usize,
    writes: Vec<u32>,
}

impl SimFlash {
    pub fn erased(size: usize, page_size: usize) -> Self {
        Self {
            mem: vec![0xFF; size],
            page_size,
            writes: Vec::new(),
        }
    }

    /// Pokes bytes in without going through the page programmer.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        let at = addr as usize;
        self.mem[at..at + bytes.len()].copy_from_slice(bytes);
    }

    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        &self.mem[addr as usize..addr as usize + len]
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.mem.clone()
    }

    pub fn writes(&self) -> &[u32] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl CodeFlash for SimFlash {
    fn read_byte(&self, addr: u32) -> u8 {
        self.mem[addr as usize]
    }

    fn erase_and_program(&mut self, page_base: u32, data: &[u8]) {
        assert_eq!(page_base as usize % self.page_size, 0, "unaligned page {:#x}", page_base);
        assert_eq!(data.len(), self.page_size);
        self.load(page_base, data);
        self.writes.push(page_base);
    }

    /// Factory fuses of an Ultimaker 2 main board.
    fn read_fuse(&self, which: Fuse) -> u8 {
        match which {
            Fuse::Low => 0xFF,
            Fuse::High => 0xD8,
            Fuse::Extended => 0xFD,
            Fuse::Lock => 0xCF,
        }
    }
}

/// Card holding at most one file, served from memory.
pub struct MemFs {
    file: Option<(String, Vec<u8>)>,
    inserted: bool,
    mounted: bool,
    open: bool,
    position: usize,
    /// Fail reads after this many bytes
    fail_after: Option<usize>,
}

impl MemFs {
    pub fn with_file(name: &str, data: &[u8]) -> Self {
        Self {
            file: Some((name.to_string(), data.to_vec())),
            inserted: true,
            mounted: false,
            open: false,
            position: 0,
            fail_after: None,
        }
    }

    pub fn without_file() -> Self {
        Self {
            file: None,
            ..Self::with_file("", &[])
        }
    }

    pub fn no_card() -> Self {
        Self {
            inserted: false,
            ..Self::without_file()
        }
    }

    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }
}

impl CardFs for MemFs {
    fn mount(&mut self) -> Result<(), FsError> {
        if !self.inserted {
            return Err(FsError::NotReady);
        }
        self.mounted = true;
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<(), FsError> {
        if !self.mounted {
            return Err(FsError::NotEnabled);
        }
        match &self.file {
            Some((file, _)) if file.eq_ignore_ascii_case(name) => {
                self.open = true;
                self.position = 0;
                Ok(())
            }
            _ => Err(FsError::NoFile),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        if !self.open {
            return Err(FsError::NotOpened);
        }
        if let Some(limit) = self.fail_after {
            if self.position >= limit {
                return Err(FsError::Disk);
            }
        }
        let data = match &self.file {
            Some((_, data)) => data,
            None => return Err(FsError::NotOpened),
        };
        let n = buf.len().min(data.len() - self.position);
        buf[..n].copy_from_slice(&data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Active-low input that reads low for a fixed number of samples.
pub struct FakeInput {
    low_reads: Cell<u32>,
}

impl FakeInput {
    pub fn low() -> Self {
        Self::low_for(u32::MAX)
    }

    pub fn high() -> Self {
        Self::low_for(0)
    }

    pub fn low_for(reads: u32) -> Self {
        Self {
            low_reads: Cell::new(reads),
        }
    }
}

impl InputPin for FakeInput {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        let left = self.low_reads.get();
        if left == 0 {
            return Ok(false);
        }
        if left != u32::MAX {
            self.low_reads.set(left - 1);
        }
        Ok(true)
    }
}

/// Output pin remembering every level it was driven to.
#[derive(Clone, Default)]
pub struct FakeLed {
    history: Rc<RefCell<Vec<bool>>>,
}

impl FakeLed {
    pub fn history(&self) -> Vec<bool> {
        self.history.borrow().clone()
    }
}

impl OutputPin for FakeLed {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.history.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.history.borrow_mut().push(true);
        Ok(())
    }
}

/// Log sink collecting text.
#[derive(Default)]
pub struct Transcript {
    text: String,
    released: bool,
}

impl Transcript {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    pub fn released(&self) -> bool {
        self.released
    }
}

impl ufmt::uWrite for Transcript {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        self.text.push_str(s);
        Ok(())
    }
}

impl Channel for Transcript {
    fn release(&mut self) {
        self.released = true;
    }
}

/// Card image holding only the sectors that were written; the rest read as
/// zeros.
pub struct SparseDisk {
    sectors: BTreeMap<u32, [u8; SECTOR_SIZE]>,
    present: bool,
}

impl Default for SparseDisk {
    fn default() -> Self {
        Self {
            sectors: BTreeMap::new(),
            present: true,
        }
    }
}

impl SparseDisk {
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::default()
        }
    }

    pub fn write(&mut self, lba: u32, offset: usize, bytes: &[u8]) {
        let sector = self.sectors.entry(lba).or_insert([0; SECTOR_SIZE]);
        sector[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockDevice for SparseDisk {
    type Error = ();

    fn initialize(&mut self) -> Result<(), ()> {
        if self.present {
            Ok(())
        } else {
            Err(())
        }
    }

    fn read(&mut self, lba: u32, offset: usize, buf: &mut [u8]) -> Result<(), ()> {
        assert!(offset + buf.len() <= SECTOR_SIZE);
        match self.sectors.get(&lba) {
            Some(sector) => buf.copy_from_slice(&sector[offset..offset + buf.len()]),
            None => buf.fill(0),
        }
        Ok(())
    }
}

const FAT32_CLUSTERS: u32 = 70_000;
const FAT32_FAT_SECTORS: u32 = 550;
const FAT16_TOTAL: u32 = 8192;
const FAT16_FAT_SECTORS: u32 = 32;
const FAT16_ROOT_ENTRIES: u16 = 512;

/// Builds small FAT16 or FAT32 card images.
pub struct FatImage {
    kind: FatKind,
    spc: u8,
    base: u32,
    root_clusters: Vec<u32>,
    entries: Vec<[u8; 32]>,
    chains: Vec<(Vec<u32>, Vec<u8>)>,
}

impl FatImage {
    pub fn fat16() -> Self {
        Self {
            kind: FatKind::Fat16,
            spc: 1,
            base: 0,
            root_clusters: Vec::new(),
            entries: Vec::new(),
            chains: Vec::new(),
        }
    }

    pub fn fat32() -> Self {
        Self {
            kind: FatKind::Fat32,
            spc: 8,
            root_clusters: vec![2],
            ..Self::fat16()
        }
    }

    pub fn partition_at(mut self, lba: u32) -> Self {
        self.base = lba;
        self
    }

    pub fn sectors_per_cluster(mut self, spc: u8) -> Self {
        self.spc = spc;
        self
    }

    pub fn root_clusters(mut self, clusters: &[u32]) -> Self {
        self.root_clusters = clusters.to_vec();
        self
    }

    fn entry(name: &str, attr: u8, first_cluster: u32, size: u32) -> [u8; 32] {
        let mut e = [0u8; 32];
        e[..11].copy_from_slice(&crate::fs::short_name(name).expect("8.3 name"));
        e[11] = attr;
        e[20..22].copy_from_slice(&((first_cluster >> 16) as u16).to_le_bytes());
        e[26..28].copy_from_slice(&(first_cluster as u16).to_le_bytes());
        e[28..32].copy_from_slice(&size.to_le_bytes());
        e
    }

    pub fn file(mut self, name: &str, data: &[u8], clusters: &[u32]) -> Self {
        let first = clusters.first().copied().unwrap_or(0);
        self.entries.push(Self::entry(name, 0x20, first, data.len() as u32));
        self.chains.push((clusters.to_vec(), data.to_vec()));
        self
    }

    pub fn deleted(mut self, name: &str) -> Self {
        let mut e = Self::entry(name, 0x20, 0, 0);
        e[0] = 0xE5;
        self.entries.push(e);
        self
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push(Self::entry(name, 0x10, 0, 0));
        self
    }

    /// Overrides the recorded size of the last entry.
    pub fn size_override(mut self, size: u32) -> Self {
        if let Some(e) = self.entries.last_mut() {
            e[28..32].copy_from_slice(&size.to_le_bytes());
        }
        self
    }

    pub fn build(self) -> SparseDisk {
        let mut disk = SparseDisk::default();
        let base = self.base;
        let spc = u32::from(self.spc);
        let cluster_bytes = spc as usize * SECTOR_SIZE;

        let (reserved, fat_sectors, root_entries, total) = match self.kind {
            FatKind::Fat16 => (1u16, FAT16_FAT_SECTORS, FAT16_ROOT_ENTRIES, FAT16_TOTAL),
            FatKind::Fat32 => (32u16, FAT32_FAT_SECTORS, 0, 32 + 2 * FAT32_FAT_SECTORS + FAT32_CLUSTERS * spc),
        };
        let fat_base = base + u32::from(reserved);
        let root_sectors = u32::from(root_entries) * 32 / SECTOR_SIZE as u32;
        let dir_sector = fat_base + 2 * fat_sectors;
        let data_base = dir_sector + root_sectors;
        let cluster_sector = |c: u32| data_base + (c - 2) * spc;

        // boot sector
        let mut boot = [0u8; SECTOR_SIZE];
        boot[..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        boot[3..11].copy_from_slice(b"MSWIN4.1");
        boot[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        boot[13] = self.spc;
        boot[14..16].copy_from_slice(&reserved.to_le_bytes());
        boot[16] = 2;
        boot[17..19].copy_from_slice(&root_entries.to_le_bytes());
        boot[21] = 0xF8;
        match self.kind {
            FatKind::Fat16 => {
                boot[19..21].copy_from_slice(&(total as u16).to_le_bytes());
                boot[22..24].copy_from_slice(&(fat_sectors as u16).to_le_bytes());
                boot[54..62].copy_from_slice(b"FAT16   ");
            }
            FatKind::Fat32 => {
                boot[32..36].copy_from_slice(&total.to_le_bytes());
                boot[36..40].copy_from_slice(&fat_sectors.to_le_bytes());
                boot[44..48].copy_from_slice(&self.root_clusters[0].to_le_bytes());
                boot[82..90].copy_from_slice(b"FAT32   ");
            }
        }
        boot[510] = 0x55;
        boot[511] = 0xAA;
        disk.write(base, 0, &boot);

        if base != 0 {
            let mut part = [0u8; 16];
            part[4] = 0x0C;
            part[8..12].copy_from_slice(&base.to_le_bytes());
            part[12..16].copy_from_slice(&total.to_le_bytes());
            disk.write(0, 446, &part);
            disk.write(0, 510, &[0x55, 0xAA]);
        }

        let kind = self.kind;
        let set_fat = |disk: &mut SparseDisk, cluster: u32, value: u32| match kind {
            FatKind::Fat16 => {
                let at = cluster as usize * 2;
                disk.write(fat_base + (at / SECTOR_SIZE) as u32, at % SECTOR_SIZE, &(value as u16).to_le_bytes());
            }
            FatKind::Fat32 => {
                let at = cluster as usize * 4;
                disk.write(fat_base + (at / SECTOR_SIZE) as u32, at % SECTOR_SIZE, &value.to_le_bytes());
            }
        };
        let end_of_chain = match kind {
            FatKind::Fat16 => 0xFFFF,
            FatKind::Fat32 => 0x0FFF_FFFF,
        };
        let link = |disk: &mut SparseDisk, chain: &[u32]| {
            for pair in chain.windows(2) {
                set_fat(disk, pair[0], pair[1]);
            }
            if let Some(&last) = chain.last() {
                set_fat(disk, last, end_of_chain);
            }
        };

        // directory entries
        match self.kind {
            FatKind::Fat16 => {
                for (i, e) in self.entries.iter().enumerate() {
                    let at = i * 32;
                    disk.write(dir_sector + (at / SECTOR_SIZE) as u32, at % SECTOR_SIZE, e);
                }
            }
            FatKind::Fat32 => {
                link(&mut disk, &self.root_clusters);
                let per_cluster = cluster_bytes / 32;
                for (i, e) in self.entries.iter().enumerate() {
                    let cluster = self.root_clusters[i / per_cluster];
                    let at = (i % per_cluster) * 32;
                    disk.write(cluster_sector(cluster) + (at / SECTOR_SIZE) as u32, at % SECTOR_SIZE, e);
                }
            }
        }

        // file data
        for (chain, data) in &self.chains {
            link(&mut disk, chain);
            for (cluster, chunk) in chain.iter().zip(data.chunks(cluster_bytes)) {
                for (s, piece) in chunk.chunks(SECTOR_SIZE).enumerate() {
                    disk.write(cluster_sector(*cluster) + s as u32, 0, piece);
                }
            }
        }

        disk
    }
}
