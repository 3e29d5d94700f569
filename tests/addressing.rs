//! Geometry and block addressing across the supported formats.

mod common;

use cbmimg::disk::{DiskImage, ImageType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn d64_open_geometry() {
    let image = DiskImage::open(&vec![0u8; common::D64_SIZE], Some(ImageType::D64)).unwrap();
    assert_eq!(image.image_type(), ImageType::D64);
    assert_eq!(image.max_track(), 35);
    assert_eq!(image.max_sector(), 21);
    assert_eq!(image.sectors_in_track(18), 19);
    assert_eq!(image.max_lba(), 683);
    assert_eq!(image.addr(17, 20).unwrap().lba, 357);
}

#[test]
fn d40_open_geometry() {
    let image = DiskImage::open(&vec![0u8; 176640], Some(ImageType::D40)).unwrap();
    assert_eq!(image.max_track(), 35);
    assert_eq!(image.sectors_in_track(18), 20);
    assert_eq!(image.max_lba(), 690);
}

#[test]
fn d71_mirrors_first_side() {
    let image = DiskImage::open(&vec![0u8; 349696], None).unwrap();
    assert_eq!(image.image_type(), ImageType::D71);
    assert_eq!(image.max_track(), 70);
    for track in 1..=35u8 {
        assert_eq!(
            image.sectors_in_track(track),
            image.sectors_in_track(track + 35),
            "track {} differs from its mirror",
            track
        );
    }
}

#[test]
fn open_without_hint_guesses_from_size() {
    assert_eq!(
        DiskImage::open(&vec![0u8; common::D64_SIZE], None)
            .unwrap()
            .image_type(),
        ImageType::D64
    );
    assert_eq!(
        DiskImage::open(&vec![0u8; common::D81_SIZE], None)
            .unwrap()
            .image_type(),
        ImageType::D81
    );
    assert!(DiskImage::open(&vec![0u8; 123456], None).is_err());
    // A hint must still match the size.
    assert!(DiskImage::open(&vec![0u8; common::D64_SIZE], Some(ImageType::D81)).is_err());
}

#[test]
fn error_map_variant() {
    let image = DiskImage::open(&vec![0u8; common::D64_SIZE + 683], None).unwrap();
    assert_eq!(image.image_type(), ImageType::D64);
    assert_eq!(image.raw_size(), common::D64_SIZE);
    assert_eq!(image.error_map().map(|map| map.len()), Some(683));
}

#[test]
fn advance_is_monotone_and_total() {
    for (size, hint) in [
        (common::D64_SIZE, None),
        (common::D81_SIZE, None),
        (533248, None), // D80
    ] {
        let image = DiskImage::open(&vec![0u8; size], hint).unwrap();
        let mut block = image.addr(1, 0).unwrap();
        assert_eq!(block.lba, 1);
        let mut expected = 1u16;
        loop {
            assert_eq!(block.lba, expected);
            // Both address forms must stay in agreement.
            assert_eq!(image.addr(block.track, block.sector).unwrap(), block);
            if image.advance(&mut block).is_err() {
                break;
            }
            expected += 1;
        }
        assert_eq!(expected, image.max_lba());
    }
}

#[test]
fn per_track_counts_sum_to_max_lba() {
    for size in [common::D64_SIZE, 349696, common::D81_SIZE, 533248, 1066496] {
        let image = DiskImage::open(&vec![0u8; size], None).unwrap();
        let total: u32 = (1..=image.max_track())
            .map(|t| image.sectors_in_track(t) as u32)
            .sum();
        assert_eq!(total, image.max_lba() as u32);
    }
}

#[test]
fn random_round_trips() {
    let mut rng = StdRng::seed_from_u64(0x1541);
    let image = DiskImage::open(&vec![0u8; common::D64_SIZE], None).unwrap();
    for _ in 0..500 {
        let lba = rng.gen_range(1..=image.max_lba());
        let block = image.addr_from_lba(lba).unwrap();
        assert_eq!(image.addr(block.track, block.sector).unwrap().lba, lba);
    }
}

#[test]
fn boundary_blocks() {
    let image = DiskImage::open(&vec![0u8; common::D64_SIZE], None).unwrap();

    // First block of the image.
    assert_eq!(image.addr(1, 0).unwrap().lba, 1);
    // Last block of the first track; advancing within the track fails.
    let mut block = image.addr(1, 20).unwrap();
    assert_eq!(block.lba, 21);
    assert!(image.advance_in_track(&mut block).is_err());
    // Advancing normally wraps into the next track.
    assert!(image.advance(&mut block).is_ok());
    assert_eq!((block.track, block.sector), (2, 0));
    // First block of the last track.
    assert_eq!(image.addr(35, 0).unwrap().lba, 667);
    // Last block of the image; advancing fails.
    let mut block = image.addr(35, 16).unwrap();
    assert_eq!(block.lba, 683);
    assert!(image.advance(&mut block).is_err());

    // Out-of-range addresses are rejected.
    assert!(image.addr(0, 0).is_err());
    assert!(image.addr(36, 0).is_err());
    assert!(image.addr(18, 19).is_err());
    assert!(image.addr_from_lba(0).is_err());
    assert!(image.addr_from_lba(684).is_err());
}

#[test]
fn addr_add_is_lba_math() {
    let image = DiskImage::open(&vec![0u8; common::D64_SIZE], None).unwrap();
    let mut result = image.addr(1, 0).unwrap();
    let adder = image.addr(2, 0).unwrap(); // lba 22
    image.addr_add(&mut result, adder).unwrap();
    assert_eq!(result.lba, 22);

    // An unused operand leaves the other side untouched.
    let mut result = image.addr(3, 5).unwrap();
    let before = result;
    image
        .addr_add(&mut result, cbmimg::disk::BlockAddr::UNUSED)
        .unwrap();
    assert_eq!(result, before);
}

#[test]
fn tail_link_with_full_block() {
    // A block whose next-link is (0,0xFF) is a tail using all 256 bytes.
    let mut buf = common::fresh_d64();
    let offset = common::d64_offset(1, 0);
    buf[offset] = 0;
    buf[offset + 1] = 0xFF;
    let image = DiskImage::open(&buf, None).unwrap();
    let start = image.addr(1, 0).unwrap();
    let chain = image.chain(start).unwrap();
    assert_eq!(chain.last_result().unwrap(), 255);
    assert_eq!(chain.block_used().unwrap(), 256);
}
