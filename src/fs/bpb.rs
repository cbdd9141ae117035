use super::FsError;

pub const SECTOR_SIZE: usize = 512;

/// Bytes of the boot sector holding every field the mount needs
pub(crate) const BPB_LEN: usize = 48;

const MIN_FAT16_CLUSTERS: u32 = 4085;
const MIN_FAT32_CLUSTERS: u32 = 65525;
const MAX_FAT32_CLUSTERS: u32 = 0x0FFF_FFF5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatKind {
    Fat16,
    Fat32,
}

/// Geometry of a mounted volume; sector numbers are absolute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Volume {
    pub kind: FatKind,
    pub sectors_per_cluster: u8,
    /// Number of FAT entries, clusters plus the two reserved ones
    pub n_fatent: u32,
    pub fat_base: u32,
    /// Root directory: first sector on FAT16, first cluster on FAT32
    pub dir_base: u32,
    pub root_entries: u16,
    pub data_base: u32,
}

#[inline]
pub(crate) fn le16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

#[inline]
pub(crate) fn le32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

impl Volume {
    /// Parses the BIOS parameter block of a volume starting at sector `base`.
    pub fn parse(base: u32, bpb: &[u8; BPB_LEN]) -> Result<Self, FsError> {
        if usize::from(le16(bpb, 11)) != SECTOR_SIZE {
            return Err(FsError::NoFileSystem);
        }
        let sectors_per_cluster = bpb[13];
        if sectors_per_cluster == 0 || !sectors_per_cluster.is_power_of_two() {
            return Err(FsError::NoFileSystem);
        }
        let reserved = u32::from(le16(bpb, 14));
        let fats = u32::from(bpb[16]);
        let root_entries = le16(bpb, 17);

        let fat_size = match le16(bpb, 22) {
            0 => le32(bpb, 36),
            n => u32::from(n),
        };
        let total = match le16(bpb, 19) {
            0 => le32(bpb, 32),
            n => u32::from(n),
        };
        if fats == 0 || fat_size == 0 {
            return Err(FsError::NoFileSystem);
        }

        let root_sectors = (u32::from(root_entries) * 32).div_ceil(SECTOR_SIZE as u32);
        let fat_sectors = fats.checked_mul(fat_size).ok_or(FsError::NoFileSystem)?;
        let system = reserved
            .checked_add(fat_sectors)
            .and_then(|n| n.checked_add(root_sectors))
            .ok_or(FsError::NoFileSystem)?;
        if total < system || base.checked_add(total).is_none() {
            return Err(FsError::NoFileSystem);
        }
        let clusters = (total - system) / u32::from(sectors_per_cluster);

        let kind = if clusters > MAX_FAT32_CLUSTERS {
            return Err(FsError::NoFileSystem);
        } else if clusters >= MIN_FAT32_CLUSTERS {
            FatKind::Fat32
        } else if clusters >= MIN_FAT16_CLUSTERS {
            FatKind::Fat16
        } else {
            // FAT12 is not supported
            return Err(FsError::NoFileSystem);
        };
        let n_fatent = clusters + 2;

        // one FAT copy must hold an entry per cluster
        let entry_bytes: u64 = match kind {
            FatKind::Fat16 => 2,
            FatKind::Fat32 => 4,
        };
        if u64::from(n_fatent) * entry_bytes > u64::from(fat_size) * SECTOR_SIZE as u64 {
            return Err(FsError::NoFileSystem);
        }

        let fat_base = base + reserved;
        let dir_base = match kind {
            FatKind::Fat16 => {
                if root_entries == 0 {
                    return Err(FsError::NoFileSystem);
                }
                fat_base + fat_sectors
            }
            FatKind::Fat32 => {
                let root = le32(bpb, 44);
                if root_entries != 0 || !(2..n_fatent).contains(&root) {
                    return Err(FsError::NoFileSystem);
                }
                root
            }
        };

        Ok(Self {
            kind,
            sectors_per_cluster,
            n_fatent,
            fat_base,
            dir_base,
            root_entries,
            data_base: base + system,
        })
    }

    /// First sector of cluster `cluster`, which must be valid.
    pub fn cluster_sector(&self, cluster: u32) -> u32 {
        self.data_base + (cluster - 2) * u32::from(self.sectors_per_cluster)
    }

    pub fn is_valid_cluster(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster < self.n_fatent
    }
}
