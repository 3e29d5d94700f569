//! BAM decoding, directory enumeration, and whole-image validation on
//! synthetic D64 and D81 images.

mod common;

use std::io::Read;

use cbmimg::disk::{BamState, DiskImage, EntryKind, FileKind, ValidationError};

#[test]
fn lba_write_back() {
    let mut image = DiskImage::open(&vec![0u8; common::D64_SIZE], None).unwrap();
    let mut block = image.addr(1, 0).unwrap();
    loop {
        let mut data = [0u8; 256];
        data[0] = block.track;
        data[1] = block.sector;
        data[2] = 0xFF;
        data[3] = 0xFF;
        data[4] = (block.lba & 0xFF) as u8;
        data[5] = (block.lba >> 8) as u8;
        image.write_block(block, &data).unwrap();
        if image.advance(&mut block).is_err() {
            break;
        }
    }

    let raw = image.raw();
    for track in 1..=35u8 {
        for sector in 0..common::d64_sectors(track) {
            let offset = common::d64_offset(track, sector);
            let lba = offset / 256 + 1;
            assert_eq!(raw[offset], track);
            assert_eq!(raw[offset + 1], sector);
            assert_eq!(raw[offset + 2], 0xFF);
            assert_eq!(raw[offset + 3], 0xFF);
            assert_eq!(raw[offset + 4], (lba & 0xFF) as u8);
            assert_eq!(raw[offset + 5], (lba >> 8) as u8);
            assert!(raw[offset + 6..offset + 256].iter().all(|b| *b == 0));
        }
    }
}

#[test]
fn bam_states_on_fresh_d64() {
    let image = DiskImage::open(&common::fresh_d64(), None).unwrap();

    // Data blocks of an empty disk still carry the formatting pattern.
    for (track, sector) in [(1, 0), (17, 20), (35, 16), (18, 5)] {
        let block = image.addr(track, sector).unwrap();
        assert_eq!(image.bam_state(block), BamState::ReallyFree);
    }
    // The BAM block and the first directory block are taken.
    for sector in [0, 1] {
        let block = image.addr(18, sector).unwrap();
        assert_eq!(image.bam_state(block), BamState::Used);
    }
    // A free block that holds data is merely free.
    let mut buf = common::fresh_d64();
    buf[common::d64_offset(9, 3) + 100] = 42;
    let image = DiskImage::open(&buf, None).unwrap();
    let block = image.addr(9, 3).unwrap();
    assert_eq!(image.bam_state(block), BamState::Free);

    assert_eq!(image.blocks_free(), 664);
    assert_eq!(image.bam_free_on_track(18), 17);
}

#[test]
fn validate_fresh_d64_is_clean() {
    let mut image = DiskImage::open(&common::fresh_d64(), None).unwrap();
    assert!(image.bam_check().is_empty());
    let errors = image.validate();
    assert!(errors.is_empty(), "unexpected: {:?}", errors);
    assert!(image.dir_entries().unwrap().is_empty());
}

#[test]
fn validate_reports_chain_loop() {
    let mut buf = common::fresh_d64();
    // (17,0) -> (17,1) -> (17,0)
    let a = common::d64_offset(17, 0);
    buf[a] = 17;
    buf[a + 1] = 1;
    let b = common::d64_offset(17, 1);
    buf[b] = 17;
    buf[b + 1] = 0;
    common::put_entry(
        &mut buf,
        common::d64_offset(18, 1),
        0,
        0x82,
        (17, 0),
        b"LOOP",
        2,
    );
    common::d64_alloc(&mut buf, 17, 0);
    common::d64_alloc(&mut buf, 17, 1);

    let mut image = DiskImage::open(&buf, None).unwrap();
    let errors = image.validate();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ValidationError::ChainLoop { .. })),
        "no loop reported: {:?}",
        errors
    );
}

#[test]
fn validate_is_idempotent() {
    // The derived allocation is rebuilt from scratch on every run, so a
    // second validation reports exactly the same findings.
    let mut buf = common::fresh_d64();
    let a = common::d64_offset(17, 0);
    buf[a] = 17;
    buf[a + 1] = 1;
    let b = common::d64_offset(17, 1);
    buf[b] = 17;
    buf[b + 1] = 0;
    common::put_entry(
        &mut buf,
        common::d64_offset(18, 1),
        0,
        0x82,
        (17, 0),
        b"LOOP",
        2,
    );
    common::d64_alloc(&mut buf, 17, 0);
    common::d64_alloc(&mut buf, 17, 1);

    let mut image = DiskImage::open(&buf, None).unwrap();
    let first = image.validate();
    let second = image.validate();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn validate_reports_shared_blocks() {
    let mut buf = common::fresh_d64();
    // Two files pointing at the same single block.
    let a = common::d64_offset(17, 0);
    buf[a] = 0;
    buf[a + 1] = 0xFF;
    let dir = common::d64_offset(18, 1);
    common::put_entry(&mut buf, dir, 0, 0x82, (17, 0), b"ONE", 1);
    common::put_entry(&mut buf, dir, 1, 0x82, (17, 0), b"TWO", 1);
    common::d64_alloc(&mut buf, 17, 0);

    let mut image = DiskImage::open(&buf, None).unwrap();
    let errors = image.validate();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ValidationError::BlockShared { .. })),
        "no sharing reported: {:?}",
        errors
    );
}

#[test]
fn validate_reports_block_count_mismatch() {
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
        b"SHORT",
        5,
    );
    common::d64_alloc(&mut buf, 17, 0);

    let mut image = DiskImage::open(&buf, None).unwrap();
    let errors = image.validate();
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::BlockCountMismatch {
            declared: 5,
            counted: 1,
            ..
        }
    )));
}

#[test]
fn validate_detects_bam_mismatches() {
    // An allocated block that no chain uses, and a used block the BAM
    // claims to be free.
    let mut buf = common::fresh_d64();
    common::d64_alloc(&mut buf, 20, 7); // allocated, unused
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
    // (17,0) deliberately left free in the BAM.

    let mut image = DiskImage::open(&buf, None).unwrap();
    let errors = image.validate();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::FreeButUsedInBam { .. })));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::UsedButFreeInBam { .. })));
}

#[test]
fn bam_check_reports_counter_mismatch() {
    let mut buf = common::fresh_d64();
    let counter = common::d64_offset(18, 0) + 4 + (9 - 1) * 4;
    buf[counter] = 12; // bitmap still says 21 free
    let image = DiskImage::open(&buf, None).unwrap();
    let errors = image.bam_check();
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::BamCounterMismatch {
            track: 9,
            counter: 12,
            popcount: 21,
        }
    )));
}

#[test]
fn bam_check_reports_impossible_bits() {
    let mut buf = common::fresh_d64();
    // Track 31 has 17 sectors; claim sector 20 free.
    let offset = common::d64_offset(18, 0) + 4 + (31 - 1) * 4;
    buf[offset + 3] |= 1 << 4;
    let image = DiskImage::open(&buf, None).unwrap();
    let errors = image.bam_check();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::BamTrackBits { track: 31, .. })));
}

#[test]
fn rel_sidesector_record_length_mismatch() {
    let mut buf = common::fresh_d64();
    // Data chain: one tail block at (17,0).
    let data = common::d64_offset(17, 0);
    buf[data] = 0;
    buf[data + 1] = 5;
    // Side sector at (16,0) with a wrong record length byte.
    let ss = common::d64_offset(16, 0);
    buf[ss] = 0;
    buf[ss + 1] = 0x11;
    buf[ss + 2] = 0; // side-sector number
    buf[ss + 3] = 100; // record length, directory says 50
    buf[ss + 4] = 16; // own address in the group list
    buf[ss + 5] = 0;
    buf[ss + 0x10] = 17; // first data block
    buf[ss + 0x11] = 0;

    let dir = common::d64_offset(18, 1);
    common::put_entry(&mut buf, dir, 0, 0x84, (17, 0), b"RELFILE", 2);
    buf[dir + 0x15] = 16; // side-sector block
    buf[dir + 0x16] = 0;
    buf[dir + 0x17] = 50; // record length
    common::d64_alloc(&mut buf, 17, 0);
    common::d64_alloc(&mut buf, 16, 0);

    let mut image = DiskImage::open(&buf, None).unwrap();
    let entries = image.dir_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::File(FileKind::Rel));
    assert_eq!(entries[0].rel_record_length, 50);
    assert_eq!(
        (
            entries[0].rel_side_sector.track,
            entries[0].rel_side_sector.sector
        ),
        (16, 0)
    );

    let errors = image.validate();
    assert_eq!(
        errors,
        vec![ValidationError::SideSectorRecordLength {
            index: 0,
            expected: 50,
            found: 100,
        }]
    );
}

#[test]
fn read_file_contents() {
    let mut buf = common::fresh_d64();
    // "HELLO WORLD" split over two blocks.
    let first = common::d64_offset(17, 0);
    buf[first] = 17;
    buf[first + 1] = 1;
    buf[first + 2..first + 256].fill(b'.');
    buf[first + 2..first + 8].copy_from_slice(b"HELLO ");
    let second = common::d64_offset(17, 1);
    buf[second] = 0;
    buf[second + 1] = 6; // five data bytes
    buf[second + 2..second + 7].copy_from_slice(b"WORLD");
    common::put_entry(
        &mut buf,
        common::d64_offset(18, 1),
        0,
        0x82,
        (17, 0),
        b"GREETING",
        2,
    );
    common::d64_alloc(&mut buf, 17, 0);
    common::d64_alloc(&mut buf, 17, 1);

    let image = DiskImage::open(&buf, None).unwrap();
    let entries = image.dir_entries().unwrap();
    let mut contents = Vec::new();
    image
        .open_file_entry(&entries[0])
        .unwrap()
        .read_to_end(&mut contents)
        .unwrap();
    assert_eq!(contents.len(), 254 + 5);
    assert_eq!(&contents[..6], b"HELLO ");
    assert_eq!(&contents[254..], b"WORLD");
}

#[test]
fn directory_spans_multiple_blocks() {
    let mut buf = common::fresh_d64();
    let first = common::d64_offset(18, 1);
    buf[first] = 18;
    buf[first + 1] = 4;
    let second = common::d64_offset(18, 4);
    buf[second] = 0;
    buf[second + 1] = 0xFF;
    common::d64_alloc(&mut buf, 18, 4);

    // Eight entries in the first block, one in the very last slot of the
    // last block.
    for slot in 0..8 {
        let data = common::d64_offset(20, slot as u8);
        buf[data] = 0;
        buf[data + 1] = 0xFF;
        common::put_entry(&mut buf, first, slot, 0x82, (20, slot as u8), b"FILE", 1);
        common::d64_alloc(&mut buf, 20, slot as u8);
    }
    let data = common::d64_offset(21, 0);
    buf[data] = 0;
    buf[data + 1] = 0xFF;
    common::put_entry(&mut buf, second, 7, 0x82, (21, 0), b"LAST", 1);
    common::d64_alloc(&mut buf, 21, 0);

    let mut image = DiskImage::open(&buf, None).unwrap();
    let entries = image.dir_entries().unwrap();
    assert_eq!(entries.len(), 9);
    assert_eq!(entries[8].index, 8);
    assert_eq!(entries[8].start.track, 21);
    assert!(image.validate().is_empty());
}

#[test]
fn geos_vlir_file_is_detected_and_validated() {
    let mut buf = common::fresh_d64();
    let bam = common::d64_offset(18, 0);
    buf[bam + 0xAD..bam + 0xAD + 16].copy_from_slice(b"GEOS format V1.0");
    buf[bam + 0xAB] = 19; // border block
    buf[bam + 0xAC] = 0;

    // VLIR record map at (17,0): record 0 at (20,0), record 1 absent.
    let map = common::d64_offset(17, 0);
    buf[map] = 0;
    buf[map + 1] = 0xFF;
    buf[map + 2] = 20;
    buf[map + 3] = 0;
    buf[map + 4] = 0;
    buf[map + 5] = 0xFF;
    let record = common::d64_offset(20, 0);
    buf[record] = 0;
    buf[record + 1] = 0xFF;

    let dir = common::d64_offset(18, 1);
    common::put_entry(&mut buf, dir, 0, 0x83, (17, 0), b"VLIRAPP", 3);
    buf[dir + 0x15] = 21; // info block
    buf[dir + 0x16] = 0;
    buf[dir + 0x17] = 0x06; // GEOS application
    buf[dir + 0x18] = 0x01; // VLIR
    buf[dir + 0x19] = 86; // 1986-09-03 12:00
    buf[dir + 0x1A] = 9;
    buf[dir + 0x1B] = 3;
    buf[dir + 0x1C] = 12;

    common::d64_alloc(&mut buf, 17, 0);
    common::d64_alloc(&mut buf, 19, 0); // border
    common::d64_alloc(&mut buf, 20, 0);
    common::d64_alloc(&mut buf, 21, 0); // info block

    let mut image = DiskImage::open(&buf, None).unwrap();
    assert!(image.is_geos());
    assert_eq!(
        image.geos_border().map(|b| (b.track, b.sector)),
        Some((19, 0))
    );

    let entries = image.dir_entries().unwrap();
    assert_eq!(entries.len(), 1);
    let geos = entries[0].geos.expect("GEOS metadata missing");
    assert!(geos.is_vlir);
    assert_eq!((geos.info_block.track, geos.info_block.sector), (21, 0));
    let datetime = entries[0].datetime.expect("timestamp missing");
    assert_eq!(datetime.year, 1986);
    assert_eq!(datetime.month, 9);

    let errors = image.validate();
    assert!(errors.is_empty(), "unexpected: {:?}", errors);
}

#[test]
fn vlir_map_with_trailing_garbage() {
    let mut buf = common::fresh_d64();
    let map = common::d64_offset(17, 0);
    buf[map] = 0;
    buf[map + 1] = 0xFF;
    buf[map + 2] = 0; // terminator right away
    buf[map + 3] = 0;
    buf[map + 10] = 20; // garbage after the terminator

    let dir = common::d64_offset(18, 1);
    common::put_entry(&mut buf, dir, 0, 0x82, (17, 0), b"BADMAP", 1);
    buf[dir + 0x17] = 0x06;
    buf[dir + 0x18] = 0x01;
    common::d64_alloc(&mut buf, 17, 0);

    let mut image = DiskImage::open(&buf, None).unwrap();
    let errors = image.validate();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::VlirTrailingData { .. })));
}

#[test]
fn d81_rel_with_super_sidesector() {
    let mut buf = common::fresh_d81();
    // Data chain: single tail block at (10,0).
    let data = common::d81_offset(10, 0);
    buf[data] = 0;
    buf[data + 1] = 3;
    // Super side-sector at (11,0): links to the single side-sector group.
    let sss = common::d81_offset(11, 0);
    buf[sss] = 12;
    buf[sss + 1] = 0;
    buf[sss + 2] = 0xFE;
    buf[sss + 3] = 12;
    buf[sss + 4] = 0;
    // Side sector at (12,0).
    let ss = common::d81_offset(12, 0);
    buf[ss] = 0;
    buf[ss + 1] = 0x11;
    buf[ss + 2] = 0;
    buf[ss + 3] = 50;
    buf[ss + 4] = 12;
    buf[ss + 5] = 0;
    buf[ss + 0x10] = 10;
    buf[ss + 0x11] = 0;

    let dir = common::d81_offset(40, 3);
    common::put_entry(&mut buf, dir, 0, 0x84, (10, 0), b"RELATIVE", 3);
    buf[dir + 0x15] = 11;
    buf[dir + 0x16] = 0;
    buf[dir + 0x17] = 50;
    common::d81_alloc(&mut buf, 10, 0);
    common::d81_alloc(&mut buf, 11, 0);
    common::d81_alloc(&mut buf, 12, 0);

    let mut image = DiskImage::open(&buf, None).unwrap();
    assert_eq!(image.blocks_free(), 3160 - 3);
    let errors = image.validate();
    assert!(errors.is_empty(), "unexpected: {:?}", errors);
}

#[test]
fn d81_super_sidesector_bad_marker() {
    let mut buf = common::fresh_d81();
    let data = common::d81_offset(10, 0);
    buf[data] = 0;
    buf[data + 1] = 3;
    let sss = common::d81_offset(11, 0);
    buf[sss] = 12;
    buf[sss + 1] = 0;
    buf[sss + 2] = 0x42; // should be 0xFE
    buf[sss + 3] = 12;
    buf[sss + 4] = 0;
    let ss = common::d81_offset(12, 0);
    buf[ss] = 0;
    buf[ss + 1] = 0x11;
    buf[ss + 3] = 50;
    buf[ss + 4] = 12;
    buf[ss + 5] = 0;
    buf[ss + 0x10] = 10;
    buf[ss + 0x11] = 0;

    let dir = common::d81_offset(40, 3);
    common::put_entry(&mut buf, dir, 0, 0x84, (10, 0), b"RELATIVE", 3);
    buf[dir + 0x15] = 11;
    buf[dir + 0x16] = 0;
    buf[dir + 0x17] = 50;
    common::d81_alloc(&mut buf, 10, 0);
    common::d81_alloc(&mut buf, 11, 0);
    common::d81_alloc(&mut buf, 12, 0);

    let mut image = DiskImage::open(&buf, None).unwrap();
    let errors = image.validate();
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::SuperSideSectorBadMarker { value: 0x42, .. }
    )));
}
