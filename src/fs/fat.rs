use super::bpb::{le16, le32, FatKind, Volume, BPB_LEN, SECTOR_SIZE};
use super::{short_name, BlockDevice, CardFs, FsError};

const DIR_ENTRY_LEN: usize = 32;
const ENTRIES_PER_SECTOR: u32 = (SECTOR_SIZE / DIR_ENTRY_LEN) as u32;

const ENTRY_END: u8 = 0x00;
const ENTRY_DELETED: u8 = 0xE5;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_DIRECTORY: u8 = 0x10;

const BOOT_SIGNATURE: u16 = 0xAA55;
const PARTITION_TABLE: usize = 446;

/// Result of probing one sector for a FAT boot record.
enum Probe {
    Fat,
    /// Boot signature present but no FAT type tag, possibly an MBR
    BootRecord,
    Nothing,
}

#[derive(Clone, Copy, Debug)]
struct OpenFile {
    first_cluster: u32,
    cluster: u32,
    position: u32,
    size: u32,
}

/// Read-only FAT16/FAT32 client with one open file.
pub struct FatFs<B> {
    disk: B,
    volume: Option<Volume>,
    file: Option<OpenFile>,
}

impl<B: BlockDevice> FatFs<B> {
    pub fn new(disk: B) -> Self {
        Self {
            disk,
            volume: None,
            file: None,
        }
    }

    fn disk_read(&mut self, lba: u32, offset: usize, buf: &mut [u8]) -> Result<(), FsError> {
        self.disk.read(lba, offset, buf).map_err(|_| FsError::Disk)
    }

    fn probe(&mut self, lba: u32) -> Result<Probe, FsError> {
        let mut word = [0u8; 2];
        self.disk_read(lba, 510, &mut word)?;
        if u16::from_le_bytes(word) != BOOT_SIGNATURE {
            return Ok(Probe::Nothing);
        }
        // "FAT" tag of FAT12/16 and FAT32 boot sectors
        for at in [54, 82] {
            let mut tag = [0u8; 3];
            self.disk_read(lba, at, &mut tag)?;
            if &tag == b"FAT" {
                return Ok(Probe::Fat);
            }
        }
        Ok(Probe::BootRecord)
    }

    /// Follows the FAT from `cluster` to the next cluster of its chain.
    fn next_cluster(&mut self, vol: &Volume, cluster: u32) -> Result<u32, FsError> {
        if !vol.is_valid_cluster(cluster) {
            return Err(FsError::Disk);
        }
        let next = match vol.kind {
            FatKind::Fat16 => {
                let at = cluster * 2;
                let mut raw = [0u8; 2];
                self.disk_read(vol.fat_base + at / SECTOR_SIZE as u32, (at % SECTOR_SIZE as u32) as usize, &mut raw)?;
                u32::from(u16::from_le_bytes(raw))
            }
            FatKind::Fat32 => {
                let at = cluster * 4;
                let mut raw = [0u8; 4];
                self.disk_read(vol.fat_base + at / SECTOR_SIZE as u32, (at % SECTOR_SIZE as u32) as usize, &mut raw)?;
                u32::from_le_bytes(raw) & 0x0FFF_FFFF
            }
        };
        Ok(next)
    }

    /// Scans the root directory for an 8.3 entry, returning its first
    /// cluster and size.
    fn find(&mut self, vol: &Volume, name: &[u8; 11]) -> Result<(u32, u32), FsError> {
        let (mut cluster, mut sector) = match vol.kind {
            FatKind::Fat16 => (0, vol.dir_base),
            FatKind::Fat32 => (vol.dir_base, vol.cluster_sector(vol.dir_base)),
        };
        let mut index: u32 = 0;

        loop {
            if index != 0 && index % ENTRIES_PER_SECTOR == 0 {
                sector += 1;
                match vol.kind {
                    FatKind::Fat16 => {
                        if index >= u32::from(vol.root_entries) {
                            return Err(FsError::NoFile);
                        }
                    }
                    FatKind::Fat32 => {
                        let spc = u32::from(vol.sectors_per_cluster);
                        if (index / ENTRIES_PER_SECTOR) % spc == 0 {
                            cluster = self.next_cluster(vol, cluster)?;
                            if !vol.is_valid_cluster(cluster) {
                                return Err(FsError::NoFile);
                            }
                            sector = vol.cluster_sector(cluster);
                        }
                    }
                }
            }

            let mut entry = [0u8; DIR_ENTRY_LEN];
            let offset = (index % ENTRIES_PER_SECTOR) as usize * DIR_ENTRY_LEN;
            self.disk_read(sector, offset, &mut entry)?;

            match entry[0] {
                ENTRY_END => return Err(FsError::NoFile),
                ENTRY_DELETED => {}
                _ => {
                    let attr = entry[11];
                    if attr & ATTR_VOLUME_ID == 0 && entry[..11] == name[..] {
                        if attr & ATTR_DIRECTORY != 0 {
                            return Err(FsError::NoFile);
                        }
                        let first = (u32::from(le16(&entry, 20)) << 16) | u32::from(le16(&entry, 26));
                        return Ok((first, le32(&entry, 28)));
                    }
                }
            }
            index += 1;
        }
    }

    fn read_open(&mut self, vol: &Volume, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, FsError> {
        let remaining = (file.size - file.position) as usize;
        let wanted = buf.len().min(remaining);
        let spc = u32::from(vol.sectors_per_cluster);
        let mut done = 0;

        while done < wanted {
            let sector_index = file.position / SECTOR_SIZE as u32;
            let in_cluster = sector_index & (spc - 1);
            if file.position % SECTOR_SIZE as u32 == 0 && in_cluster == 0 {
                let cluster = if file.position == 0 {
                    file.first_cluster
                } else {
                    self.next_cluster(vol, file.cluster)?
                };
                if !vol.is_valid_cluster(cluster) {
                    return Err(FsError::Disk);
                }
                file.cluster = cluster;
            }

            let offset = (file.position % SECTOR_SIZE as u32) as usize;
            let chunk = (SECTOR_SIZE - offset).min(wanted - done);
            let lba = vol.cluster_sector(file.cluster) + in_cluster;
            self.disk_read(lba, offset, &mut buf[done..done + chunk])?;

            file.position += chunk as u32;
            done += chunk;
        }
        Ok(done)
    }
}

impl<B: BlockDevice> CardFs for FatFs<B> {
    fn mount(&mut self) -> Result<(), FsError> {
        self.volume = None;
        self.file = None;
        self.disk.initialize().map_err(|_| FsError::NotReady)?;

        let mut base = 0;
        let mut probe = self.probe(base)?;
        if let Probe::BootRecord = probe {
            // First MBR partition
            let mut part = [0u8; 16];
            self.disk_read(0, PARTITION_TABLE, &mut part)?;
            if part[4] != 0 {
                base = le32(&part, 8);
                probe = self.probe(base)?;
            }
        }
        if !matches!(probe, Probe::Fat) {
            return Err(FsError::NoFileSystem);
        }

        let mut bpb = [0u8; BPB_LEN];
        self.disk_read(base, 0, &mut bpb)?;
        self.volume = Some(Volume::parse(base, &bpb)?);
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<(), FsError> {
        let vol = self.volume.ok_or(FsError::NotEnabled)?;
        self.file = None;
        let name = short_name(name).ok_or(FsError::NoFile)?;
        let (first_cluster, size) = self.find(&vol, &name)?;
        self.file = Some(OpenFile {
            first_cluster,
            cluster: first_cluster,
            position: 0,
            size,
        });
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let vol = self.volume.ok_or(FsError::NotEnabled)?;
        let mut file = self.file.ok_or(FsError::NotOpened)?;
        match self.read_open(&vol, &mut file, buf) {
            Ok(n) => {
                self.file = Some(file);
                Ok(n)
            }
            Err(e) => {
                self.file = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FatImage, SparseDisk};

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn read_all<B: BlockDevice>(fs: &mut FatFs<B>, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = fs.read(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn fat16_reads_file_in_pages() {
        let data = pattern(1300, 7);
        let disk = FatImage::fat16().file("APP.BIN", &data, &[5, 6, 7]).build();
        let mut fs = FatFs::new(disk);
        fs.mount().unwrap();
        assert_eq!(fs.volume.map(|v| v.kind), Some(FatKind::Fat16));
        fs.open("app.bin").unwrap();
        assert_eq!(fs.file.map(|f| f.size), Some(1300));
        assert_eq!(read_all(&mut fs, 256), data);
    }

    #[test]
    fn fat32_behind_mbr_follows_fragmented_chain() {
        let data = pattern(9000, 3);
        // 8 sectors per cluster, out of order
        let disk = FatImage::fat32()
            .partition_at(2048)
            .file("NOTES.TXT", b"hello", &[3])
            .file("APP.BIN", &data, &[9, 4, 12])
            .build();
        let mut fs = FatFs::new(disk);
        fs.mount().unwrap();
        assert_eq!(fs.volume.map(|v| v.kind), Some(FatKind::Fat32));
        fs.open("app.bin").unwrap();
        assert_eq!(read_all(&mut fs, 256), data);
    }

    #[test]
    fn fat32_root_directory_spans_clusters() {
        let data = pattern(600, 11);
        let mut image = FatImage::fat32().sectors_per_cluster(1).root_clusters(&[2, 40]);
        for i in 0..20 {
            let name = format!("F{}.DAT", i);
            image = image.file(&name, b"x", &[50 + i]);
        }
        let disk = image.file("APP.BIN", &data, &[80, 81]).build();
        let mut fs = FatFs::new(disk);
        fs.mount().unwrap();
        fs.open("APP.BIN").unwrap();
        assert_eq!(read_all(&mut fs, 100), data);
    }

    #[test]
    fn missing_file_and_deleted_entries() {
        let disk = FatImage::fat16()
            .deleted("APP.BIN")
            .directory("APP.BIN")
            .build();
        let mut fs = FatFs::new(disk);
        fs.mount().unwrap();
        assert_eq!(fs.open("app.bin"), Err(FsError::NoFile));
        assert_eq!(fs.open("other.bin"), Err(FsError::NoFile));
        let mut buf = [0u8; 4];
        assert_eq!(fs.read(&mut buf), Err(FsError::NotOpened));
    }

    #[test]
    fn unformatted_card_has_no_file_system() {
        let mut fs = FatFs::new(SparseDisk::default());
        assert_eq!(fs.mount(), Err(FsError::NoFileSystem));
        assert_eq!(fs.open("app.bin"), Err(FsError::NotEnabled));
    }

    #[test]
    fn corrupt_boot_sector_is_not_mounted() {
        let mut disk = FatImage::fat32().file("APP.BIN", b"app", &[5]).build();
        disk.write(0, 36, &0xFFFF_FFF0u32.to_le_bytes());
        let mut fs = FatFs::new(disk);
        assert_eq!(fs.mount(), Err(FsError::NoFileSystem));

        let mut disk = FatImage::fat32().file("APP.BIN", b"app", &[5]).build();
        disk.write(0, 44, &0u32.to_le_bytes());
        let mut fs = FatFs::new(disk);
        assert_eq!(fs.mount(), Err(FsError::NoFileSystem));
        assert_eq!(fs.open("app.bin"), Err(FsError::NotEnabled));
    }

    #[test]
    fn absent_card_is_not_ready() {
        let mut fs = FatFs::new(SparseDisk::absent());
        assert_eq!(fs.mount(), Err(FsError::NotReady));
    }

    #[test]
    fn empty_file_reads_nothing() {
        let disk = FatImage::fat16().file("APP.BIN", &[], &[]).build();
        let mut fs = FatFs::new(disk);
        fs.mount().unwrap();
        fs.open("app.bin").unwrap();
        let mut buf = [0u8; 256];
        assert_eq!(fs.read(&mut buf), Ok(0));
    }

    #[test]
    fn broken_chain_is_a_disk_error() {
        let data = pattern(1024, 1);
        // chain ends after the first cluster although the size says two
        let disk = FatImage::fat16().file("APP.BIN", &data, &[5]).size_override(1024).build();
        let mut fs = FatFs::new(disk);
        fs.mount().unwrap();
        fs.open("app.bin").unwrap();
        let mut buf = [0u8; 512];
        assert_eq!(fs.read(&mut buf), Ok(512));
        assert_eq!(fs.read(&mut buf), Err(FsError::Disk));
        assert_eq!(fs.read(&mut buf), Err(FsError::NotOpened));
    }
}
