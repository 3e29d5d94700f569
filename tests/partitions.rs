//! Partition tables of CMD FD images, 1581 partitions, and CMD native
//! partitions.

mod common;

use cbmimg::disk::{BamState, DiskImage, EntryKind, FileKind, ImageType, PartitionKind};

/// A D1M whose first partition is a D64 filesystem at the very beginning
/// of the image.
fn d1m_with_d64_partition() -> Vec<u8> {
    let mut buf = vec![0u8; common::D1M_SIZE];
    // Partition table: one block at the start of the system area.
    let table = common::d1m_offset(81, 8);
    buf[table] = 0;
    buf[table + 1] = 0xFF;
    // 684 blocks = 342 physical blocks, starting at block 0.
    common::put_partition_row(&mut buf, table, 0, 0x02, 0, 342, b"SIXTYFOUR");
    // The partition content: a fresh D64.
    let d64 = common::fresh_d64();
    buf[..d64.len()].copy_from_slice(&d64);
    buf
}

#[test]
fn d1m_partition_table() {
    let image = DiskImage::open(&d1m_with_d64_partition(), None).unwrap();
    assert_eq!(image.image_type(), ImageType::D1M);
    assert!(image.is_partition_table());
    assert_eq!(image.max_track(), 81);
    assert_eq!(image.max_sector(), 40);
    assert_eq!(image.max_lba(), 3240);
    // No header on a partition table.
    assert!(image.dir_header().unwrap().is_none());

    let entries = image.dir_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Partition(PartitionKind::D64));
    assert_eq!(entries[0].start.lba, 1);
    assert_eq!(entries[0].block_count, 684);
}

#[test]
fn d1m_chdir_into_d64_and_back() {
    let mut image = DiskImage::open(&d1m_with_d64_partition(), None).unwrap();
    let entries = image.dir_entries().unwrap();

    image.chdir(&entries[0]).unwrap();
    assert_eq!(image.image_type(), ImageType::D64);
    assert_eq!(image.max_track(), 35);
    assert_eq!(image.max_sector(), 21);
    assert_eq!(image.max_lba(), 683);
    assert_eq!(image.sectors_in_track(18), 19);
    assert_eq!(image.blocks_free(), 664);
    assert!(image.dir_header().unwrap().is_some());
    assert!(image.dir_entries().unwrap().is_empty());
    assert_eq!(image.depth(), 2);

    // Blocks inside the partition resolve into the partition's bytes.
    let bam_block = image.addr(18, 0).unwrap();
    let data = image.block(bam_block).unwrap();
    assert_eq!(data[0], 18);
    assert_eq!(data[1], 1);
    assert_eq!(data[2], 0x41);

    image.chdir_close().unwrap();
    assert!(image.is_partition_table());
    assert_eq!(image.max_track(), 81);
    assert_eq!(image.depth(), 1);
    // Popping the root is refused.
    assert!(image.chdir_close().is_err());
}

#[test]
fn d1m_validate_marks_partition_spans() {
    let mut image = DiskImage::open(&d1m_with_d64_partition(), None).unwrap();
    // The partition table has no BAM to cross-check; validation only
    // claims the partition spans and must not report anything.
    let errors = image.validate();
    assert!(errors.is_empty(), "unexpected: {:?}", errors);
}

#[test]
fn chdir_refuses_regular_files() {
    let mut buf = common::fresh_d64();
    let a = common::d64_offset(17, 0);
    buf[a] = 0;
    buf[a + 1] = 0xFF;
    common::put_entry(
        &mut buf,
        common::d64_offset(18, 1),
        0,
        0x82,
        (17, 0),
        b"FILE",
        1,
    );
    let mut image = DiskImage::open(&buf, None).unwrap();
    let entries = image.dir_entries().unwrap();
    assert!(image.chdir(&entries[0]).is_err());
    assert_eq!(image.depth(), 1);
}

/// A D81 with a 1581 partition on tracks 5..=10, formatted as a
/// subdirectory.
fn d81_with_partition() -> Vec<u8> {
    let mut buf = common::fresh_d81();
    let dir = common::d81_offset(40, 3);
    // 6 tracks of 40 sectors.
    common::put_entry(&mut buf, dir, 0, 0x85, (5, 0), b"SUB", 240);
    for sector in 0..40u8 {
        for track in 5..=10u8 {
            common::d81_alloc(&mut buf, track, sector);
        }
    }
    // Subdirectory structure: header, two BAM blocks, directory.
    let header = common::d81_offset(5, 0);
    buf[header] = 5;
    buf[header + 1] = 3;
    buf[header + 4..header + 9].copy_from_slice(b"INNER");
    for i in 4 + 5..4 + 16 {
        buf[header + i] = 0xA0;
    }
    let bam1 = common::d81_offset(5, 1);
    buf[bam1] = 5;
    buf[bam1 + 1] = 2;
    let bam2 = common::d81_offset(5, 2);
    buf[bam2] = 0;
    buf[bam2 + 1] = 0xFF;
    let subdir = common::d81_offset(5, 3);
    buf[subdir] = 0;
    buf[subdir + 1] = 0xFF;

    // The partition's own BAM: everything outside the partition is marked
    // used, the partition itself is free except for its system blocks.
    for track in 1..=80u8 {
        let base = if track <= 40 { bam1 } else { bam2 };
        let start_track = if track <= 40 { 1 } else { 41 };
        let offset = base + 0x10 + (track as usize - start_track) * 6;
        let (free, bits) = if track == 5 {
            (36u8, [0xF0u8, 0xFF, 0xFF, 0xFF, 0xFF])
        } else if (6..=10).contains(&track) {
            (40u8, [0xFFu8, 0xFF, 0xFF, 0xFF, 0xFF])
        } else {
            (0u8, [0u8; 5])
        };
        buf[offset] = free;
        buf[offset + 1..offset + 6].copy_from_slice(&bits);
    }
    buf
}

#[test]
fn d81_partition_validates() {
    let mut image = DiskImage::open(&d81_with_partition(), None).unwrap();
    let entries = image.dir_entries().unwrap();
    image.chdir(&entries[0]).unwrap();
    assert_eq!(image.blocks_free(), 36 + 5 * 40);
    let errors = image.validate();
    assert!(errors.is_empty(), "unexpected: {:?}", errors);
}

#[test]
fn d81_chdir_into_partition() {
    let mut image = DiskImage::open(&d81_with_partition(), None).unwrap();
    let entries = image.dir_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::File(FileKind::Partition1581));

    image.chdir(&entries[0]).unwrap();
    // Geometry stays the enclosing D81's; the names inside the partition
    // are the enclosing names.
    assert_eq!(image.max_track(), 80);
    let header = image.dir_header().unwrap().unwrap();
    assert_eq!(header.name.name(), b"INNER");
    assert!(image.dir_entries().unwrap().is_empty());

    image.chdir_close().unwrap();
    assert_eq!(image.dir_entries().unwrap().len(), 1);
}

#[test]
fn d81_rejects_misaligned_partition() {
    let mut buf = common::fresh_d81();
    let dir = common::d81_offset(40, 3);
    // Starts at sector 1: not track-aligned.
    common::put_entry(&mut buf, dir, 0, 0x85, (5, 1), b"BAD", 240);
    let mut image = DiskImage::open(&buf, None).unwrap();
    let entries = image.dir_entries().unwrap();
    assert!(image.chdir(&entries[0]).is_err());
}

#[test]
fn d81_rejects_partition_crossing_directory_track() {
    let mut buf = common::fresh_d81();
    let dir = common::d81_offset(40, 3);
    // Tracks 39..=40 include the directory track.
    common::put_entry(&mut buf, dir, 0, 0x85, (39, 0), b"BAD", 80);
    let mut image = DiskImage::open(&buf, None).unwrap();
    let entries = image.dir_entries().unwrap();
    assert!(image.chdir(&entries[0]).is_err());
}

/// A D1M with a CMD native partition covering two tracks.
fn d1m_with_native_partition() -> Vec<u8> {
    let mut buf = vec![0u8; common::D1M_SIZE];
    let table = common::d1m_offset(81, 8);
    buf[table] = 0;
    buf[table + 1] = 0xFF;
    // 512 blocks = 2 native tracks of 256 sectors.
    common::put_partition_row(&mut buf, table, 0, 0x01, 0, 256, b"NATIVE");

    // Native partition content (at the start of the image).
    // Header at (1,1) with the partition name at offset 4, linking to the
    // root directory at (1,34).
    let info = common::BLOCK; // (1,1)
    buf[info] = 1;
    buf[info + 1] = 34;
    buf[info + 4..info + 7].copy_from_slice(b"DNP");
    for i in 4 + 3..4 + 16 {
        buf[info + i] = 0xA0;
    }
    // First BAM block at (1,2): last track byte and the track-1 bitmap.
    // The system area, sectors 0..=34, is allocated; the bits are stored
    // in reverse order, so "sectors 32..34 used" becomes 0x1F.
    let bam = 2 * common::BLOCK;
    buf[bam + 8] = 2; // two tracks
    buf[bam + 0x20 + 4] = 0x1F;
    for i in 5..32 {
        buf[bam + 0x20 + i] = 0xFF;
    }
    // Track 2 bitmap lives in the same block at the next stride, fully
    // free. (Selector 1 covers tracks 8 and up, so track 2 is still in
    // the first selector's range.)
    for i in 0..32 {
        buf[bam + 0x40 + i] = 0xFF;
    }
    // Directory at (1,34), empty.
    let dir = 34 * common::BLOCK;
    buf[dir] = 0;
    buf[dir + 1] = 0xFF;
    buf
}

#[test]
fn d1m_chdir_into_native_partition() {
    let mut image = DiskImage::open(&d1m_with_native_partition(), None).unwrap();
    let entries = image.dir_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].kind,
        EntryKind::Partition(PartitionKind::CmdNative)
    );

    image.chdir(&entries[0]).unwrap();
    assert_eq!(image.image_type(), ImageType::CmdNative);
    assert_eq!(image.max_track(), 2);
    assert_eq!(image.max_sector(), 256);
    assert_eq!(image.max_lba(), 512);

    let header = image.dir_header().unwrap().unwrap();
    assert_eq!(header.name.name(), b"DNP");
    assert!(image.dir_entries().unwrap().is_empty());

    // The native BAM stores bit 0 as the numerically highest sector.
    let boot = image.addr(1, 0).unwrap();
    assert_eq!(image.bam_state(boot), BamState::Used);
    let last_system = image.addr(1, 34).unwrap();
    assert_eq!(image.bam_state(last_system), BamState::Used);
    let free = image.addr(1, 36).unwrap();
    assert_eq!(image.bam_state(free), BamState::ReallyFree);
    assert_eq!(image.bam_free_on_track(1), 256 - 35);
    assert_eq!(image.bam_free_on_track(2), 256);

    image.chdir_close().unwrap();
    assert!(image.is_partition_table());
}

#[test]
fn native_partition_validates() {
    let mut image = DiskImage::open(&d1m_with_native_partition(), None).unwrap();
    let entries = image.dir_entries().unwrap();
    image.chdir(&entries[0]).unwrap();
    let errors = image.validate();
    assert!(errors.is_empty(), "unexpected: {:?}", errors);
}
