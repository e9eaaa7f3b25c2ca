//! The 512-byte Master Boot Record: codec and cross-entry validation.
//!
//! Only the partition table `[0x1BE, 0x1FE)` and the magic word are
//! interpreted. CHS addressing is obsolete at the sizes this tool works
//! with: the fields are dropped on decode and zeroed on encode.

use crate::F7Error;
use crate::disk::Disk;

/// Byte length of the boot sector.
pub const MBR_LEN: usize = 512;
/// End of the boot-code area; the disk signature and timestamp live
/// between here and the partition table.
pub const BOOT_CODE_LEN: usize = 0x1B8;
/// First byte of the partition table.
pub const TABLE_OFFSET: usize = 0x1BE;
/// Offset of the boot magic.
pub const MAGIC_OFFSET: usize = 0x1FE;
/// The boot magic, as stored (0xAA55 little-endian).
pub const MAGIC: [u8; 2] = [0x55, 0xAA];
/// Partition type of an F7h container.
pub const F7_TYPE: u8 = 0xF7;
/// Partition type of a GPT protective entry.
pub const GPT_PROTECTIVE: u8 = 0xEE;

const ENTRY_LEN: usize = 16;

/// One partition entry as stored on disk.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
struct RawPartEntry {
    boot: u8,
    chs_first: [u8; 3],
    kind: u8,
    chs_last: [u8; 3],
    start: [u8; 4],
    size: [u8; 4],
}

/// One decoded partition entry.
///
/// `start` and `size` are sector counts widened to 64 bits; all further
/// arithmetic happens at that width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartEntry {
    /// Stored verbatim; 0x80 marks the active partition.
    pub boot: u8,
    pub kind: u8,
    pub start: u64,
    pub size: u64,
}

impl PartEntry {
    /// Disabled and GPT protective entries never take part in validation
    /// and are rejected as targets of every F7h command.
    pub fn is_eligible(&self) -> bool {
        !matches!(self.kind, 0x00 | GPT_PROTECTIVE)
    }

    pub fn is_disabled(&self) -> bool {
        self.kind == 0x00
    }

    /// LBA one past the final sector.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// The four primary entries of an MBR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionTable {
    pub entries: [PartEntry; 4],
}

impl PartitionTable {
    /// Decodes the table out of a full boot sector.
    ///
    /// Checks the magic only; [`Self::validate`] performs the cross-entry
    /// checks once the disk size is known.
    pub fn from_bytes(mbr: &[u8; MBR_LEN]) -> Result<Self, F7Error> {
        if mbr[MAGIC_OFFSET..] != MAGIC {
            return Err(F7Error::BadMbrMagic);
        }

        let mut entries = [PartEntry {
            boot: 0,
            kind: 0,
            start: 0,
            size: 0,
        }; 4];
        for (i, entry) in entries.iter_mut().enumerate() {
            let off = TABLE_OFFSET + i * ENTRY_LEN;
            let raw: RawPartEntry = bytemuck::pod_read_unaligned(&mbr[off..off + ENTRY_LEN]);
            *entry = PartEntry {
                boot: raw.boot,
                kind: raw.kind,
                start: u32::from_le_bytes(raw.start) as u64,
                size: u32::from_le_bytes(raw.size) as u64,
            };
        }
        Ok(Self { entries })
    }

    /// Encodes the table region `[0x1BE, 0x200)` into a boot sector
    /// buffer, leaving the boot code in front of it alone.
    pub fn encode_into(&self, out: &mut [u8; MBR_LEN]) {
        for (i, entry) in self.entries.iter().enumerate() {
            let raw = RawPartEntry {
                boot: entry.boot,
                chs_first: [0; 3],
                kind: entry.kind,
                chs_last: [0; 3],
                start: (entry.start as u32).to_le_bytes(),
                size: (entry.size as u32).to_le_bytes(),
            };
            let off = TABLE_OFFSET + i * ENTRY_LEN;
            out[off..off + ENTRY_LEN].copy_from_slice(bytemuck::bytes_of(&raw));
        }
        out[MAGIC_OFFSET..].copy_from_slice(&MAGIC);
    }

    /// Cross-entry checks over the eligible entries: pairwise half-open
    /// overlap and disk bounds. Entries are not assumed ordered.
    pub fn validate(&self, disk_sectors: u64) -> Result<(), F7Error> {
        for a in 0..self.entries.len() - 1 {
            if !self.entries[a].is_eligible() {
                continue;
            }
            for b in a + 1..self.entries.len() {
                let (ea, eb) = (&self.entries[a], &self.entries[b]);
                if eb.is_eligible() && ea.start < eb.end() && eb.start < ea.end() {
                    return Err(F7Error::PartitionsOverlap(a, b));
                }
            }
        }

        // GPT protective entries are allowed to exceed the disk size.
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.is_eligible() && entry.end() > disk_sectors {
                return Err(F7Error::PartitionBeyondDisk(i));
            }
        }
        Ok(())
    }
}

/// Reads and validates the MBR of an open disk.
pub fn read_table(disk: &mut Disk) -> Result<PartitionTable, F7Error> {
    let mut buf = [0u8; MBR_LEN];
    let n = disk.read_at(0, &mut buf)?;
    if n != MBR_LEN {
        return Err(F7Error::MbrTruncated(n));
    }
    let table = PartitionTable::from_bytes(&buf)?;
    table.validate(disk.sectors()?)?;
    Ok(table)
}

/// Rewrites the single partition-type byte of one entry, leaving the rest
/// of the table untouched on disk.
pub fn write_partition_type(disk: &mut Disk, entry: usize, kind: u8) -> Result<(), F7Error> {
    let offset = (TABLE_OFFSET + entry * ENTRY_LEN + 4) as u64;
    log::debug!("setting partition {entry} type to {kind:#04X} at byte {offset}");
    disk.write_at(offset, &[kind])
}

/// Short names for well-known partition types, for the table brief.
pub fn type_description(kind: u8) -> &'static str {
    match kind {
        0x00 => "(disabled)",
        0x01 => "FAT-12",
        0x04 => "DOS 3.0 FAT-16 (< 32 MiB)",
        0x05 => "Extended",
        0x06 => "DOS 3.31 FAT-16",
        0x07 => "exFAT/HPFS/NTFS",
        0x0B => "W95 FAT-32",
        0x0C => "W95 FAT-32 (LBA)",
        0x0E => "W95 FAT-16 (LBA)",
        0x0F => "W95 Extended (LBA)",
        0x82 => "Linux swap",
        0x83 => "Linux",
        GPT_PROTECTIVE => "GPT protective MBR",
        F7_TYPE => "F7h image slots",
        _ => "",
    }
}
