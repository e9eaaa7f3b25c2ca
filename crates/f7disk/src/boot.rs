//! Installing MBR boot code from a bootloader image.
//!
//! The first sector of the source is written in two pieces, skipping
//! `[0x1B8, 0x1FE)` so the target keeps its disk signature and partition
//! table; everything past the first sector is streamed verbatim.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::disk::Disk;
use crate::mbr::{self, BOOT_CODE_LEN, MAGIC, MAGIC_OFFSET, MBR_LEN};
use crate::{F7Error, SECTOR_SIZE};

/// Width of the preserved window: disk signature, timestamp area and the
/// partition table itself.
const PRESERVED_LEN: u64 = (MAGIC_OFFSET - BOOT_CODE_LEN) as u64;

/// Copies boot code from `bootloader` into the disk.
///
/// The source must itself carry an MBR magic, fit the target, and end
/// before the earliest non-disabled, non-protective partition starts.
pub fn install(disk: &mut Disk, bootloader: &Path) -> Result<(), F7Error> {
    let table = mbr::read_table(disk)?;

    let mut src =
        File::open(bootloader).map_err(|e| F7Error::io("open the bootloader file", e))?;
    let src_bytes = src
        .seek(SeekFrom::End(0))
        .map_err(|e| F7Error::io("retrieve the bootloader file size", e))?;
    src.seek(SeekFrom::Start(0))
        .map_err(|e| F7Error::io("seek the bootloader file offset", e))?;
    if src_bytes < MBR_LEN as u64 {
        return Err(F7Error::BootloaderTooSmall);
    }

    let required = src_bytes.div_ceil(SECTOR_SIZE);
    let available = disk.sectors()?;
    if available < required {
        return Err(F7Error::DriveTooSmall {
            available,
            required,
        });
    }

    // Entries are not assumed ordered; the earliest eligible one bounds
    // the writable area.
    let earliest = table
        .entries
        .iter()
        .filter(|e| e.is_eligible())
        .map(|e| e.start)
        .min();
    if let Some(free) = earliest {
        if free < required {
            return Err(F7Error::NotEnoughFreeSectors { free, required });
        }
    }

    let mut head = [0u8; MBR_LEN];
    src.read_exact(&mut head)
        .map_err(|e| F7Error::io("read the bootloader MBR", e))?;
    if head[MAGIC_OFFSET..] != MAGIC {
        return Err(F7Error::BootloaderBadMagic);
    }

    // The preserved window never travels, so it does not count towards
    // the copy totals.
    let total = src_bytes - PRESERVED_LEN;
    let mut copied = 0u64;

    log::debug!("installing {src_bytes} bootloader bytes ({total} after the skipped window)");
    disk.write_at(0, &head[..BOOT_CODE_LEN])?;
    copied += BOOT_CODE_LEN as u64;
    disk.write_at(MAGIC_OFFSET as u64, &head[MAGIC_OFFSET..])?;
    copied += (MBR_LEN - MAGIC_OFFSET) as u64;

    let rem = src_bytes - MBR_LEN as u64;
    if rem > 0 {
        disk.copy_chunks(
            &mut src,
            MBR_LEN as u64,
            rem,
            &mut copied,
            total,
            "copy the whole bootloader",
        )?;
    }
    Ok(())
}
