//! Per-format geometry tables: sectors per track, total block counts, and
//! the image-size table used to guess a format from a file size.

pub const BLOCK_SIZE: usize = 256;

/// Disk image types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    /// 2040/3040 5¼-inch single-sided (20 sectors on tracks 18..24).
    D40,
    /// 2031/1540/1541/1570 5¼-inch single-sided, 35 tracks.
    D64,
    /// 1541 with 40 tracks.
    D64Track40,
    /// 1541 with 40 tracks, SpeedDOS variant.
    D64Track40Speeddos,
    /// 1541 with 40 tracks, Dolphin DOS variant.
    D64Track40Dolphin,
    /// 1541 with 40 tracks, Prologic DOS variant.
    D64Track40Prologic,
    /// 1541 with 42 tracks.
    D64Track42,
    /// 1571 5¼-inch double-sided.
    D71,
    /// 1581 3½-inch.
    D81,
    /// 8050 5¼-inch single-sided.
    D80,
    /// 8250 5¼-inch double-sided.
    D82,
    /// CMD FD-2000/FD-4000 800 KB.
    D1M,
    /// CMD FD-2000/FD-4000 1.6 MB.
    D2M,
    /// CMD FD-4000 3.2 MB.
    D4M,
    /// CMD native partition. Only reachable by changing into a partition of
    /// a D1M/D2M/D4M image, never guessed from a file size.
    CmdNative,
}

impl ImageType {
    pub fn name(self) -> &'static str {
        match self {
            ImageType::D40 => "D40",
            ImageType::D64 => "D64",
            ImageType::D64Track40 => "D64_40TRACK",
            ImageType::D64Track40Speeddos => "D64_40TRACK_SPEEDDOS",
            ImageType::D64Track40Dolphin => "D64_40TRACK_DOLPHIN",
            ImageType::D64Track40Prologic => "D64_40TRACK_PROLOGIC",
            ImageType::D64Track42 => "D64_42TRACK",
            ImageType::D71 => "D71",
            ImageType::D81 => "D81",
            ImageType::D80 => "D80",
            ImageType::D82 => "D82",
            ImageType::D1M => "D1M",
            ImageType::D2M => "D2M",
            ImageType::D4M => "D4M",
            ImageType::CmdNative => "DNP",
        }
    }

    /// The total number of blocks in an image of this type. This also
    /// determines the size of the trailing error map, one byte per block.
    pub fn blocks(self) -> usize {
        match self {
            ImageType::D40 => 683 + 7,
            ImageType::D64 => 683,
            ImageType::D64Track40
            | ImageType::D64Track40Speeddos
            | ImageType::D64Track40Dolphin
            | ImageType::D64Track40Prologic => 683 + 5 * 17,
            ImageType::D64Track42 => 683 + 7 * 17,
            ImageType::D71 => 683 * 2,
            ImageType::D81 => 3200,
            ImageType::D80 => 2083,
            ImageType::D82 => 2083 * 2,
            ImageType::D1M => 3240,
            ImageType::D2M => 6480,
            ImageType::D4M => 12960,
            ImageType::CmdNative => 0,
        }
    }

    /// The size in bytes of an image of this type without an error map.
    pub fn base_size(self) -> usize {
        self.blocks() * BLOCK_SIZE
    }
}

/// The image types that can be recognized from a file size alone. Variants
/// that share a size (the 40-track SpeedDOS/Dolphin/Prologic flavors) need
/// an explicit hint and are not listed.
static GUESSABLE: [ImageType; 11] = [
    ImageType::D64,
    ImageType::D64Track40,
    ImageType::D64Track42,
    ImageType::D40,
    ImageType::D71,
    ImageType::D81,
    ImageType::D80,
    ImageType::D82,
    ImageType::D1M,
    ImageType::D2M,
    ImageType::D4M,
];

/// Guess the image type from a buffer size. Returns the type and whether
/// the buffer carries a trailing error map (one byte per block).
pub fn guess_type(size: usize) -> Option<(ImageType, bool)> {
    for image_type in GUESSABLE.iter() {
        if size == image_type.base_size() {
            return Some((*image_type, false));
        }
        if size == image_type.base_size() + image_type.blocks() {
            return Some((*image_type, true));
        }
    }
    None
}

/// The number of sectors on each track of a D40 image. Tracks are 1-based,
/// so element 0 is unused. Speed zone 1 (tracks 18..24) holds one sector
/// more than on a D64.
#[rustfmt::skip]
pub static SECTORS_D40: [u8; 35 + 1] = [
    0,                  // track 0
    21, 21, 21, 21, 21, //  1 -  5
    21, 21, 21, 21, 21, //  6 - 10
    21, 21, 21, 21, 21, // 11 - 15
    21, 21, 20, 20, 20, // 16 - 20
    20, 20, 20, 20, 18, // 21 - 25
    18, 18, 18, 18, 18, // 26 - 30
    17, 17, 17, 17, 17, // 31 - 35
];

/// The number of sectors on each track of a D64 image. The same table
/// serves the 35, 40, and 42 track variants; only the last track differs.
#[rustfmt::skip]
pub static SECTORS_D64: [u8; 42 + 1] = [
    0,                  // track 0
    21, 21, 21, 21, 21, //  1 -  5
    21, 21, 21, 21, 21, //  6 - 10
    21, 21, 21, 21, 21, // 11 - 15
    21, 21, 19, 19, 19, // 16 - 20
    19, 19, 19, 19, 18, // 21 - 25
    18, 18, 18, 18, 18, // 26 - 30
    17, 17, 17, 17, 17, // 31 - 35
    17, 17, 17, 17, 17, // 36 - 40
    17, 17,             // 41 - 42
];

/// The number of sectors on each track of a D71 image. The second side
/// mirrors the D64 zone layout, which the D64 table cannot express for
/// tracks 36..42, hence the separate table.
#[rustfmt::skip]
pub static SECTORS_D71: [u8; 70 + 1] = [
    0,                  // track 0
    21, 21, 21, 21, 21, //  1 -  5
    21, 21, 21, 21, 21, //  6 - 10
    21, 21, 21, 21, 21, // 11 - 15
    21, 21, 19, 19, 19, // 16 - 20
    19, 19, 19, 19, 18, // 21 - 25
    18, 18, 18, 18, 18, // 26 - 30
    17, 17, 17, 17, 17, // 31 - 35
    21, 21, 21, 21, 21, // 36 - 40
    21, 21, 21, 21, 21, // 41 - 45
    21, 21, 21, 21, 21, // 46 - 50
    21, 21, 19, 19, 19, // 51 - 55
    19, 19, 19, 19, 18, // 56 - 60
    18, 18, 18, 18, 18, // 61 - 65
    17, 17, 17, 17, 17, // 66 - 70
];

/// The number of sectors on each track of a D80 or D82 image. D80 images
/// use only the first half (tracks 1..77).
#[rustfmt::skip]
pub static SECTORS_D82: [u8; 154 + 1] = [
    0,                  // track 0
    29, 29, 29, 29, 29, //   1 -   5
    29, 29, 29, 29, 29, //   6 -  10
    29, 29, 29, 29, 29, //  11 -  15
    29, 29, 29, 29, 29, //  16 -  20
    29, 29, 29, 29, 29, //  21 -  25
    29, 29, 29, 29, 29, //  26 -  30
    29, 29, 29, 29, 29, //  31 -  35
    29, 29, 29, 29, 27, //  36 -  40
    27, 27, 27, 27, 27, //  41 -  45
    27, 27, 27, 27, 27, //  46 -  50
    27, 27, 27, 25, 25, //  51 -  55
    25, 25, 25, 25, 25, //  56 -  60
    25, 25, 25, 25, 23, //  61 -  65
    23, 23, 23, 23, 23, //  66 -  70
    23, 23, 23, 23, 23, //  71 -  75
    23, 23,             //  76 -  77
    29, 29, 29, 29, 29, //  78 -  82
    29, 29, 29, 29, 29, //  83 -  87
    29, 29, 29, 29, 29, //  88 -  92
    29, 29, 29, 29, 29, //  93 -  97
    29, 29, 29, 29, 29, //  98 - 102
    29, 29, 29, 29, 29, // 103 - 107
    29, 29, 29, 29, 29, // 108 - 112
    29, 29, 29, 29, 27, // 113 - 117
    27, 27, 27, 27, 27, // 118 - 122
    27, 27, 27, 27, 27, // 123 - 127
    27, 27, 27, 25, 25, // 128 - 132
    25, 25, 25, 25, 25, // 133 - 137
    25, 25, 25, 25, 23, // 138 - 142
    23, 23, 23, 23, 23, // 143 - 147
    23, 23, 23, 23, 23, // 148 - 152
    23, 23,             // 153 - 154
];

#[cfg(test)]
mod tests {
    use super::*;

    fn zone_sum(table: &[u8], tracks: usize) -> usize {
        table.iter().take(tracks + 1).map(|s| *s as usize).sum()
    }

    #[test]
    fn test_zone_table_totals() {
        assert_eq!(zone_sum(&SECTORS_D64, 35), 683);
        assert_eq!(zone_sum(&SECTORS_D64, 40), 683 + 5 * 17);
        assert_eq!(zone_sum(&SECTORS_D64, 42), 683 + 7 * 17);
        assert_eq!(zone_sum(&SECTORS_D40, 35), 683 + 7);
        assert_eq!(zone_sum(&SECTORS_D71, 70), 683 * 2);
        assert_eq!(zone_sum(&SECTORS_D82, 77), 2083);
        assert_eq!(zone_sum(&SECTORS_D82, 154), 2083 * 2);
    }

    #[test]
    fn test_guess_type() {
        assert_eq!(guess_type(174848), Some((ImageType::D64, false)));
        assert_eq!(guess_type(175531), Some((ImageType::D64, true)));
        assert_eq!(guess_type(175000 + 683), None);
        assert_eq!(guess_type(196608), Some((ImageType::D64Track40, false)));
        assert_eq!(guess_type(205312), Some((ImageType::D64Track42, false)));
        assert_eq!(guess_type(176640), Some((ImageType::D40, false)));
        assert_eq!(guess_type(349696), Some((ImageType::D71, false)));
        assert_eq!(guess_type(819200), Some((ImageType::D81, false)));
        assert_eq!(guess_type(533248), Some((ImageType::D80, false)));
        assert_eq!(guess_type(1066496), Some((ImageType::D82, false)));
        assert_eq!(guess_type(3240 * 256), Some((ImageType::D1M, false)));
        assert_eq!(guess_type(6480 * 256), Some((ImageType::D2M, false)));
        assert_eq!(guess_type(12960 * 256), Some((ImageType::D4M, false)));
        assert_eq!(guess_type(12345), None);
    }
}
