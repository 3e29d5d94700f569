//! The 8050/8250 family: D80 and D82 images.

use crate::disk::address;
use crate::disk::bam::{self, BamSelector};
use crate::disk::error::{DiskError, Result};
use crate::disk::geometry::{ImageType, SECTORS_D82};
use crate::disk::image::Image;
use crate::disk::settings::{FormatOps, Settings};

pub(crate) struct D80Ops;
pub(crate) static D80_OPS: D80Ops = D80Ops;

impl FormatOps for D80Ops {}

const HEADER_TRACK: u8 = 39;
const BAM_TRACK: u8 = 38;

/// The BAM spans up to four blocks on track 38, each covering 50 tracks.
static BAM_BLOCKS: [(u8, u8); 4] = [(1, 0), (51, 3), (101, 6), (151, 9)];

pub(crate) fn init_partition(
    frame: &mut Settings,
    raw: &Image,
    image_type: ImageType,
) -> Result<()> {
    frame.ops = &D80_OPS;
    frame.image_type = image_type;
    frame.max_track = match image_type {
        ImageType::D80 => 77,
        ImageType::D82 => 154,
        _ => return Err(DiskError::UnknownFormat),
    };
    frame.max_sector = 29;
    frame.zone_table = Some(&SECTORS_D82);
    frame.diskname_offset = 0x06;
    frame.dir_tracks = [HEADER_TRACK, BAM_TRACK];
    frame.has_super_sidesector = false;
    frame.is_partition_table = false;

    let selectors = if image_type == ImageType::D80 { 2 } else { 4 };
    frame.bam = BAM_BLOCKS[..selectors]
        .iter()
        .map(|(start, sector)| BamSelector::new(*start, BAM_TRACK, *sector, 0x07, 5, 4))
        .collect();
    frame.bam_counter = BAM_BLOCKS[..selectors]
        .iter()
        .map(|(start, sector)| BamSelector::new(*start, BAM_TRACK, *sector, 0x06, 5, 0))
        .collect();

    frame.build_track_lba_start();
    frame.create_last_block()?;
    frame.dir = address::from_ts(frame, HEADER_TRACK, 1)?;
    frame.info = address::from_ts(frame, HEADER_TRACK, 0)?;
    bam::bind_selectors(frame)?;
    frame.probe_geos(raw);
    Ok(())
}
