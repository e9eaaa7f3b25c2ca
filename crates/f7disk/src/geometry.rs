//! Deriving a full slot geometry from partial user input.
//!
//! `override` lets the operator fix any subset of `{size, every}`; the
//! planner fills in the rest from the partition size and validates the
//! result against the partition bounds and the on-disk field widths.

use crate::disk::Disk;
use crate::header::{self, Meta};
use crate::mbr::{self, F7_TYPE, GPT_PROTECTIVE, PartEntry, PartitionTable};
use crate::{DIST_MAX, F7Error, LBA_MAX};

/// User-specified parts of an `override` request.
#[derive(Debug, Clone, Copy)]
pub struct SlotSpec {
    /// Number of slots, 1 to 16.
    pub slots: u8,
    /// Sectors from the partition start to slot 0.
    pub first: u64,
    pub size: Option<u64>,
    pub every: Option<u64>,
}

/// A fully derived slot layout, relative to the partition start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub slots: u8,
    pub first: u64,
    pub size: u64,
    pub every: u64,
}

impl Geometry {
    /// Sectors between end-of-slot and the next slot start.
    pub fn padding(&self) -> u64 {
        self.every - self.size
    }
}

/// Derives and validates the slot geometry for one partition entry.
///
/// Defaulting: with neither `size` nor `every` given, the partition is
/// split evenly across the slots; given only one of the two, the other
/// mirrors it.
pub fn plan(part: &PartEntry, spec: &SlotSpec) -> Result<Geometry, F7Error> {
    if part.is_disabled() {
        return Err(F7Error::Disabled);
    }
    if part.kind == GPT_PROTECTIVE {
        return Err(F7Error::GptProtective);
    }
    // The codec widens 32-bit fields, so anything past LBA_MAX here means
    // the table was built by broken code.
    if part.start > LBA_MAX || part.size > LBA_MAX {
        return Err(F7Error::ImpossibleBounds);
    }
    if part.start == 0 {
        return Err(F7Error::OverlapsMbr);
    }
    if part.end() > LBA_MAX + 1 {
        return Err(F7Error::BeyondAddressable);
    }
    if part.size < 1 {
        return Err(F7Error::NoRoomForHeader);
    }
    if part.size < spec.first {
        return Err(F7Error::FirstBeyondPartition);
    }
    let partsize = part.size - spec.first;

    let (size, every) = match (spec.size, spec.every) {
        (None, None) => {
            let size = partsize / u64::from(spec.slots);
            (size, size)
        }
        (Some(size), None) => (size, size),
        (None, Some(every)) => (every, every),
        (Some(size), Some(every)) => (size, every),
    };

    if size == 0 {
        return Err(F7Error::PartitionTooSmall(spec.slots));
    }
    if every < size {
        return Err(F7Error::EveryLessThanSize);
    }
    if size < LBA_MAX - DIST_MAX && every - size > DIST_MAX {
        return Err(F7Error::PaddingTooLarge);
    }
    if u64::from(spec.slots - 1) * every + size > partsize {
        return Err(F7Error::PartitionTooSmall(spec.slots));
    }

    Ok(Geometry {
        slots: spec.slots,
        first: spec.first,
        size,
        every,
    })
}

/// Commits a planned geometry to disk.
///
/// The full header (bitmap zeroed) goes in first, the MBR type byte
/// last. An interrupted run leaves the entry untyped; re-running
/// `override` completes it.
pub fn format_slots(
    disk: &mut Disk,
    table: &PartitionTable,
    entry: usize,
    geo: &Geometry,
) -> Result<(), F7Error> {
    let meta = Meta {
        count: geo.slots,
        bitmap: 0,
        first: geo.first,
        size: geo.size,
        every: geo.every,
    };
    header::write_meta(disk, table.entries[entry].start, &meta)?;
    mbr::write_partition_type(disk, entry, F7_TYPE)
}
