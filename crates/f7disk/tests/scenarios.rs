//! End-to-end flows against a temporary 100 MiB image carrying one Linux
//! partition at sector 2048, mirroring a freshly partitioned USB stick:
//!
//! ```text
//! dd if=/dev/zero of=test.img bs=1M count=100
//! echo 'start=2048, size=200000, type=83' | sfdisk test.img
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use f7disk::disk::Disk;
use f7disk::geometry::{self, SlotSpec};
use f7disk::{F7Error, boot, header, mbr, slots};
use tempfile::NamedTempFile;

const PART_START: u64 = 2048;
const PART_SECTORS: u32 = 200000;
const TYPE_BYTE_OFFSET: u64 = 446 + 4;
const HEADER_OFFSET: u64 = PART_START * 512;

fn write_at(file: &File, offset: u64, bytes: &[u8]) {
    let mut f = file;
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.write_all(bytes).unwrap();
}

fn read_at(file: &File, offset: u64, len: usize) -> Vec<u8> {
    let mut f = file;
    f.seek(SeekFrom::Start(offset)).unwrap();
    let mut buf = vec![0u8; len];
    f.read_exact(&mut buf).unwrap();
    buf
}

fn raw_entry(kind: u8, start: u32, size: u32) -> [u8; 16] {
    let mut b = [0u8; 16];
    b[4] = kind;
    b[8..12].copy_from_slice(&start.to_le_bytes());
    b[12..16].copy_from_slice(&size.to_le_bytes());
    b
}

/// A zeroed 100 MiB image with one 0x83 partition and a valid magic.
fn new_image() -> NamedTempFile {
    let img = NamedTempFile::new().unwrap();
    img.as_file().set_len(100 * 1024 * 1024).unwrap();
    write_at(
        img.as_file(),
        446,
        &raw_entry(0x83, PART_START as u32, PART_SECTORS),
    );
    write_at(img.as_file(), 510, &[0x55, 0xAA]);
    img
}

/// `new_image` after `override --slots 4 --first 1 --size 1000`.
fn formatted_image() -> NamedTempFile {
    let img = new_image();
    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    let spec = SlotSpec {
        slots: 4,
        first: 1,
        size: Some(1000),
        every: None,
    };
    let geo = geometry::plan(&table.entries[0], &spec).unwrap();
    geometry::format_slots(&mut disk, &table, 0, &geo).unwrap();
    img
}

fn payload_of(bytes: &[u8]) -> NamedTempFile {
    let payload = NamedTempFile::new().unwrap();
    write_at(payload.as_file(), 0, bytes);
    payload
}

#[test]
fn dry_run_plans_without_touching_the_disk() {
    let img = new_image();
    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();

    let spec = SlotSpec {
        slots: 4,
        first: 1,
        size: Some(1000),
        every: None,
    };
    let geo = geometry::plan(&table.entries[0], &spec).unwrap();
    assert_eq!(geo.slots, 4);
    assert_eq!(geo.first, 1);
    assert_eq!(geo.size, 1000);
    assert_eq!(geo.every, 1000);

    // Planning alone must leave the entry type and header area alone.
    assert_eq!(read_at(img.as_file(), TYPE_BYTE_OFFSET, 1), [0x83]);
    assert_eq!(read_at(img.as_file(), HEADER_OFFSET, 24), vec![0u8; 24]);
}

#[test]
fn override_writes_type_byte_and_header() {
    let img = formatted_image();
    assert_eq!(read_at(img.as_file(), TYPE_BYTE_OFFSET, 1), [0xF7]);
    assert_eq!(
        read_at(img.as_file(), HEADER_OFFSET, 24),
        [
            0xF7, 0x00, 0x53, 0x59, 0x53, 0x49, 0x4D, 0x47, 0x01, 0x00, 0x00, 0x00, 0xE8, 0x03,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00,
        ]
    );
}

#[test]
fn formatted_header_reads_back() {
    let img = formatted_image();
    let mut disk = Disk::open(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    let meta = header::read_meta(&mut disk, &table, 0).unwrap();
    assert_eq!(
        meta,
        header::Meta {
            count: 4,
            bitmap: 0,
            first: 1,
            size: 1000,
            every: 1000,
        }
    );
}

#[test]
fn load_copies_payload_and_flips_bitmap() {
    let img = formatted_image();
    let payload = payload_of(&[0xAB; 1024]);

    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    slots::load(&mut disk, &table, 0, 0, payload.path()).unwrap();

    // Slot 0 payload lands at (2048 + 1) * 512.
    assert_eq!(read_at(img.as_file(), 1049088, 1024), vec![0xAB; 1024]);
    assert_eq!(read_at(img.as_file(), HEADER_OFFSET + 22, 2), [0x01, 0x00]);
}

#[test]
fn load_rejects_active_slot() {
    let img = formatted_image();
    let payload = payload_of(&[0xAB; 1024]);

    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    slots::load(&mut disk, &table, 0, 0, payload.path()).unwrap();

    let again = payload_of(&[0xCD; 1024]);
    let err = slots::load(&mut disk, &table, 0, 0, again.path()).unwrap_err();
    assert!(matches!(err, F7Error::SlotAlreadyActive(0)));

    // Neither the data nor the bitmap moved.
    assert_eq!(read_at(img.as_file(), 1049088, 1024), vec![0xAB; 1024]);
    assert_eq!(read_at(img.as_file(), HEADER_OFFSET + 22, 2), [0x01, 0x00]);
}

#[test]
fn load_rejects_out_of_range_slot() {
    let img = formatted_image();
    let payload = payload_of(&[0xAB; 512]);
    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    let err = slots::load(&mut disk, &table, 0, 4, payload.path()).unwrap_err();
    assert!(matches!(
        err,
        F7Error::SlotOutOfRange { slot: 4, count: 4 }
    ));
}

#[test]
fn load_rejects_oversized_payload() {
    let img = formatted_image();
    // 1000 sectors fit; 1000 sectors and one byte round up to 1001.
    let payload = NamedTempFile::new().unwrap();
    payload.as_file().set_len(1000 * 512 + 1).unwrap();

    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    let err = slots::load(&mut disk, &table, 0, 0, payload.path()).unwrap_err();
    assert!(matches!(
        err,
        F7Error::PayloadTooLarge {
            required: 1001,
            capacity: 1000
        }
    ));
}

#[test]
fn clear_frees_slot_but_keeps_data() {
    let img = formatted_image();
    let payload = payload_of(&[0xAB; 1024]);

    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    slots::load(&mut disk, &table, 0, 0, payload.path()).unwrap();
    slots::clear(&mut disk, &table, 0, 0).unwrap();

    assert_eq!(read_at(img.as_file(), HEADER_OFFSET + 22, 2), [0x00, 0x00]);
    assert_eq!(read_at(img.as_file(), 1049088, 1024), vec![0xAB; 1024]);
}

#[test]
fn clear_rejects_unused_slot() {
    let img = formatted_image();
    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    let err = slots::clear(&mut disk, &table, 0, 2).unwrap_err();
    assert!(matches!(err, F7Error::SlotAlreadyCleared(2)));
}

#[test]
fn bitmap_tracks_loads_and_clears_exactly() {
    let img = formatted_image();
    let payload = payload_of(&[0x42; 512]);

    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    for slot in [0u8, 2, 3] {
        slots::load(&mut disk, &table, 0, slot, payload.path()).unwrap();
    }
    assert_eq!(
        header::read_meta(&mut disk, &table, 0).unwrap().bitmap,
        0b1101
    );

    slots::clear(&mut disk, &table, 0, 2).unwrap();
    assert_eq!(
        header::read_meta(&mut disk, &table, 0).unwrap().bitmap,
        0b1001
    );

    slots::reset(&mut disk, &table, 0).unwrap();
    assert_eq!(header::read_meta(&mut disk, &table, 0).unwrap().bitmap, 0);
}

#[test]
fn reset_clears_every_slot_at_once() {
    let img = formatted_image();
    let payload = payload_of(&[0x42; 512]);
    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();
    slots::load(&mut disk, &table, 0, 1, payload.path()).unwrap();
    slots::reset(&mut disk, &table, 0).unwrap();
    assert_eq!(read_at(img.as_file(), HEADER_OFFSET + 22, 2), [0x00, 0x00]);
}

#[test]
fn f7_commands_reject_other_partition_kinds() {
    let img = new_image();
    let mut disk = Disk::open_rw(img.path()).unwrap();
    let table = mbr::read_table(&mut disk).unwrap();

    // Entry 0 is a Linux partition, entry 1 is disabled.
    assert!(matches!(
        header::read_meta(&mut disk, &table, 0),
        Err(F7Error::NotF7)
    ));
    assert!(matches!(
        header::read_meta(&mut disk, &table, 1),
        Err(F7Error::Disabled)
    ));
    assert!(matches!(
        slots::reset(&mut disk, &table, 1),
        Err(F7Error::Disabled)
    ));
}

#[test]
fn cpboot_preserves_partition_table() {
    let img = formatted_image();
    let table_before = read_at(img.as_file(), 0x1B8, 0x1FE - 0x1B8);

    // 1024-byte bootloader: recognizable boot code, a poisoned table
    // region that must not travel, its own magic, and a second sector.
    let mut src = vec![0u8; 1024];
    src[..0x1B8].iter_mut().for_each(|b| *b = 0x11);
    src[0x1B8..0x1FE].iter_mut().for_each(|b| *b = 0xCC);
    src[0x1FE] = 0x55;
    src[0x1FF] = 0xAA;
    src[0x200..].iter_mut().for_each(|b| *b = 0x22);
    let boot_bin = payload_of(&src);

    let mut disk = Disk::open_rw(img.path()).unwrap();
    boot::install(&mut disk, boot_bin.path()).unwrap();

    assert_eq!(read_at(img.as_file(), 0, 0x1B8), vec![0x11; 0x1B8]);
    assert_eq!(read_at(img.as_file(), 0x1B8, 0x1FE - 0x1B8), table_before);
    assert_eq!(read_at(img.as_file(), 0x1FE, 2), [0x55, 0xAA]);
    assert_eq!(read_at(img.as_file(), 0x200, 0x200), vec![0x22; 0x200]);
}

#[test]
fn cpboot_rejects_bootloader_without_magic() {
    let img = new_image();
    let boot_bin = payload_of(&[0x11; 1024]);
    let mut disk = Disk::open_rw(img.path()).unwrap();
    let err = boot::install(&mut disk, boot_bin.path()).unwrap_err();
    assert!(matches!(err, F7Error::BootloaderBadMagic));
}

#[test]
fn cpboot_rejects_short_bootloader() {
    let img = new_image();
    let boot_bin = payload_of(&[0x11; 511]);
    let mut disk = Disk::open_rw(img.path()).unwrap();
    let err = boot::install(&mut disk, boot_bin.path()).unwrap_err();
    assert!(matches!(err, F7Error::BootloaderTooSmall));
}

#[test]
fn cpboot_rejects_bootloader_reaching_into_partitions() {
    let img = new_image();
    // 2049 sectors: one more than the gap before the partition at 2048.
    let boot_bin = NamedTempFile::new().unwrap();
    boot_bin.as_file().set_len(2049 * 512).unwrap();
    write_at(boot_bin.as_file(), 510, &[0x55, 0xAA]);

    let mut disk = Disk::open_rw(img.path()).unwrap();
    let err = boot::install(&mut disk, boot_bin.path()).unwrap_err();
    assert!(matches!(
        err,
        F7Error::NotEnoughFreeSectors {
            free: 2048,
            required: 2049
        }
    ));
}

#[test]
fn overlapping_partitions_fail_every_command() {
    let img = NamedTempFile::new().unwrap();
    img.as_file().set_len(1024 * 1024).unwrap();
    write_at(img.as_file(), 446, &raw_entry(0x83, 100, 50));
    write_at(img.as_file(), 462, &raw_entry(0x83, 120, 10));
    write_at(img.as_file(), 510, &[0x55, 0xAA]);

    let mut disk = Disk::open_rw(img.path()).unwrap();
    assert!(matches!(
        mbr::read_table(&mut disk),
        Err(F7Error::PartitionsOverlap(0, 1))
    ));
}

#[test]
fn truncated_device_fails_mbr_read() {
    let img = NamedTempFile::new().unwrap();
    img.as_file().set_len(100).unwrap();
    let mut disk = Disk::open(img.path()).unwrap();
    assert!(matches!(
        mbr::read_table(&mut disk),
        Err(F7Error::MbrTruncated(100))
    ));
}
