//! Slot occupancy transitions: load, clear, reset.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::disk::Disk;
use crate::header;
use crate::mbr::PartitionTable;
use crate::{F7Error, SECTOR_SIZE};

/// Copies `image` into a free slot and marks it occupied.
///
/// The bitmap flip happens only after the payload copy completed. An
/// interrupted load leaves the slot's bit clear with dirty data behind
/// it; a later load simply overwrites.
pub fn load(
    disk: &mut Disk,
    table: &PartitionTable,
    entry: usize,
    slot: u8,
    image: &Path,
) -> Result<(), F7Error> {
    let meta = header::read_meta(disk, table, entry)?;
    if slot >= meta.count {
        return Err(F7Error::SlotOutOfRange {
            slot,
            count: meta.count,
        });
    }
    let bit = 1u16 << slot;
    if meta.bitmap & bit != 0 {
        return Err(F7Error::SlotAlreadyActive(slot));
    }

    let mut payload =
        File::open(image).map_err(|e| F7Error::io("open the payload file", e))?;
    let bytes = payload
        .seek(SeekFrom::End(0))
        .map_err(|e| F7Error::io("retrieve the payload file size", e))?;
    payload
        .seek(SeekFrom::Start(0))
        .map_err(|e| F7Error::io("seek the payload file offset", e))?;

    let reqsectors = bytes.div_ceil(SECTOR_SIZE);
    if reqsectors > meta.size {
        return Err(F7Error::PayloadTooLarge {
            required: reqsectors,
            capacity: meta.size,
        });
    }

    let part = &table.entries[entry];
    let lba = u64::from(slot)
        .checked_mul(meta.every)
        .and_then(|off| off.checked_add(meta.first))
        .and_then(|off| off.checked_add(part.start))
        .ok_or(F7Error::ImpossibleBounds)?;
    let offset = lba
        .checked_mul(SECTOR_SIZE)
        .ok_or(F7Error::ImpossibleBounds)?;

    log::debug!("loading {bytes} payload bytes into slot {slot} at byte {offset}");
    let mut copied = 0u64;
    disk.copy_chunks(&mut payload, offset, bytes, &mut copied, bytes, "copy the payload")?;

    header::write_bitmap(disk, table, entry, meta.bitmap | bit)
}

/// Marks an occupied slot unused. The slot data stays on disk.
pub fn clear(
    disk: &mut Disk,
    table: &PartitionTable,
    entry: usize,
    slot: u8,
) -> Result<(), F7Error> {
    let meta = header::read_meta(disk, table, entry)?;
    if slot >= meta.count {
        return Err(F7Error::SlotOutOfRange {
            slot,
            count: meta.count,
        });
    }
    let bit = 1u16 << slot;
    if meta.bitmap & bit == 0 {
        return Err(F7Error::SlotAlreadyCleared(slot));
    }
    header::write_bitmap(disk, table, entry, meta.bitmap & !bit)
}

/// Frees every slot at once (soft reset).
pub fn reset(disk: &mut Disk, table: &PartitionTable, entry: usize) -> Result<(), F7Error> {
    // Parsed only to confirm the header is intact before zeroing its
    // bitmap.
    header::read_meta(disk, table, entry)?;
    header::write_bitmap(disk, table, entry, 0x0000)
}
