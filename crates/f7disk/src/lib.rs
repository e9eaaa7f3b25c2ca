//! F7disk
//!
//! Management of F7h image-slot containers living inside classic
//! MBR-partitioned devices or image files. An F7h partition is a fixed
//! region carved into equally spaced slots, each holding one raw system
//! image; a 16-bit bitmap in the partition header tracks which slots are
//! occupied.
//!
//! The crate is split along the on-disk structures: [`mbr`] decodes and
//! validates the boot sector, [`header`] handles the 24-byte F7h header,
//! [`geometry`] derives a full slot layout from partial user input, and
//! [`slots`]/[`boot`] perform the mutating operations on an open [`Disk`].

pub mod boot;
pub mod disk;
pub mod geometry;
pub mod header;
pub mod mbr;
pub mod slots;
pub mod units;

pub use disk::Disk;
pub use geometry::{Geometry, SlotSpec};
pub use header::Meta;
pub use mbr::{PartEntry, PartitionTable};

/// Bytes per sector. Every address in this crate is a 512-byte LBA.
pub const SECTOR_SIZE: u64 = 512;

/// Highest addressable sector, 2^32 - 1 (2 TiB of 512-byte sectors).
pub const LBA_MAX: u64 = u32::MAX as u64;

/// Largest slot padding storable in the header's 16-bit field.
pub const DIST_MAX: u64 = u16::MAX as u64;

/// Errors that can occur when working with an F7h container.
///
/// Every distinguishable failure gets its own variant so the CLI can print
/// the exact diagnostic; none of them are recovered from, a command is an
/// all-or-nothing attempt.
#[derive(Debug, thiserror::Error)]
pub enum F7Error {
    /// The device ended before a whole boot sector could be read.
    #[error("cannot read a whole MBR ({0} byte/s read)")]
    MbrTruncated(usize),
    #[error("magic number (AA55h) not found")]
    BadMbrMagic,
    /// Two non-disabled, non-protective entries claim the same sectors.
    #[error("overlapping partitions detected (entries {0} and {1})")]
    PartitionsOverlap(usize, usize),
    #[error("partition {0} is larger than the file")]
    PartitionBeyondDisk(usize),

    #[error("not a F7h partition")]
    NotF7,
    #[error("disabled partition")]
    Disabled,
    #[error("error reading the F7h header ({0} bytes read)")]
    HeaderTruncated(usize),
    #[error("header signature not found")]
    BadHeaderMagic,
    #[error("unknown subtype")]
    BadSubtype,
    #[error("unknown version {0:#04X}")]
    BadVersion(u8),

    #[error("GPT protective MBR partitions cannot be overridden")]
    GptProtective,
    /// On-disk bounds no 32-bit entry should be able to express.
    #[error("BUG: the partition bounds are impossible")]
    ImpossibleBounds,
    #[error("the partition starts at LBA 0, overlapping the MBR")]
    OverlapsMbr,
    #[error("the partition bounds are beyond the addressable limit (2 TiB)")]
    BeyondAddressable,
    #[error("at least one sector is required for the F7h header")]
    NoRoomForHeader,
    #[error("the first slot would start beyond the partition bounds")]
    FirstBeyondPartition,
    #[error("'every' cannot be less than 'size'")]
    EveryLessThanSize,
    #[error("'every' cannot be greater than 'size' by 32 MiB or more")]
    PaddingTooLarge,
    #[error("the partition is too small for {0} slot/s")]
    PartitionTooSmall(u8),

    #[error("there is only {count} slot/s")]
    SlotOutOfRange { slot: u8, count: u8 },
    #[error("the slot #{0} was already active")]
    SlotAlreadyActive(u8),
    #[error("the slot #{0} was already cleared")]
    SlotAlreadyCleared(u8),
    #[error("the number of sectors to load exceeds the slot capacity ({required} > {capacity})")]
    PayloadTooLarge { required: u64, capacity: u64 },

    #[error("the bootloader has less than 512 bytes (cannot contain a MBR)")]
    BootloaderTooSmall,
    #[error("MBR magic number not found in the bootloader")]
    BootloaderBadMagic,
    #[error("the drive has not enough sectors ({available} < {required})")]
    DriveTooSmall { available: u64, required: u64 },
    #[error("not enough free sectors before the first partition ({free} < {required})")]
    NotEnoughFreeSectors { free: u64, required: u64 },

    /// A syscall failed; `op` names what was being attempted.
    #[error("could not {op}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    /// A transfer stopped early without an underlying error to blame.
    #[error("{copied}/{requested} bytes were actually copied")]
    ShortCopy { requested: u64, copied: u64 },
}

impl F7Error {
    pub(crate) fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::Io { op, source }
    }
}
