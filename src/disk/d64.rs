//! The 5¼-inch single/double density family: D40, D64 (35/40/42 tracks and
//! the SpeedDOS/Dolphin/Prologic variants), and D71.

use crate::disk::address::{self, BlockAddr};
use crate::disk::bam::{self, BamSelector};
use crate::disk::error::{DiskError, Result};
use crate::disk::fat::Fat;
use crate::disk::geometry::{ImageType, SECTORS_D40, SECTORS_D64, SECTORS_D71};
use crate::disk::image::Image;
use crate::disk::settings::{FormatOps, Settings};
use crate::disk::validation::{self, ValidationError};
use crate::disk::DiskImage;

pub(crate) struct D64Ops;
pub(crate) struct D71Ops;

pub(crate) static D64_OPS: D64Ops = D64Ops;
pub(crate) static D71_OPS: D71Ops = D71Ops;

impl FormatOps for D64Ops {}

impl FormatOps for D71Ops {
    /// The 1571 keeps a second BAM block on track 53 and reserves the whole
    /// track even though nothing links into it.
    fn bam_fixup(&self, image: &DiskImage, fat: &mut Fat, errors: &mut Vec<ValidationError>) {
        let start = match image.addr(SECOND_DIR_TRACK, 0) {
            Ok(addr) => addr,
            Err(_) => return,
        };
        let mut current = start;
        let mut next = current;
        let mut last_run = image.advance(&mut next).is_err();
        loop {
            validation::mark_block(fat, start, current, next, errors);
            if last_run {
                break;
            }
            current = next;
            if image.advance_in_track(&mut next).is_err() {
                next = BlockAddr::UNUSED;
                last_run = true;
            }
        }
    }
}

const DIR_TRACK: u8 = 18;
const SECOND_DIR_TRACK: u8 = 18 + 35;

/// Initialize a frame as a D40/D64/D71 volume, either as the root of an
/// image or inside a CMD FD partition.
pub(crate) fn init_partition(
    frame: &mut Settings,
    raw: &Image,
    image_type: ImageType,
) -> Result<()> {
    frame.image_type = image_type;
    frame.max_sector = 21;
    frame.diskname_offset = 0x90;
    frame.has_super_sidesector = false;
    frame.is_partition_table = false;

    match image_type {
        ImageType::D40 => {
            frame.ops = &D64_OPS;
            frame.max_track = 35;
            frame.zone_table = Some(&SECTORS_D40);
            frame.dir_tracks = [DIR_TRACK, 0];
            frame.bam = vec![BamSelector::new(1, DIR_TRACK, 0, 0x05, 4, 3)];
            frame.bam_counter = vec![BamSelector::new(1, DIR_TRACK, 0, 0x04, 4, 0)];
        }
        ImageType::D64
        | ImageType::D64Track40
        | ImageType::D64Track40Speeddos
        | ImageType::D64Track40Dolphin
        | ImageType::D64Track40Prologic
        | ImageType::D64Track42 => {
            frame.ops = &D64_OPS;
            frame.max_track = match image_type {
                ImageType::D64 => 35,
                ImageType::D64Track42 => 42,
                _ => 40,
            };
            frame.zone_table = Some(&SECTORS_D64);
            frame.dir_tracks = [DIR_TRACK, 0];
            frame.bam = vec![BamSelector::new(1, DIR_TRACK, 0, 0x05, 4, 3)];
            frame.bam_counter = vec![BamSelector::new(1, DIR_TRACK, 0, 0x04, 4, 0)];
        }
        ImageType::D71 => {
            frame.ops = &D71_OPS;
            frame.max_track = 70;
            frame.zone_table = Some(&SECTORS_D71);
            frame.dir_tracks = [DIR_TRACK, SECOND_DIR_TRACK];
            frame.bam = vec![
                BamSelector::new(1, DIR_TRACK, 0, 0x05, 4, 3),
                BamSelector::new(36, SECOND_DIR_TRACK, 0, 0x00, 3, 3),
            ];
            frame.bam_counter = vec![
                BamSelector::new(1, DIR_TRACK, 0, 0x04, 4, 0),
                BamSelector::new(36, DIR_TRACK, 0, 0xDD, 1, 0),
            ];
        }
        _ => return Err(DiskError::UnknownFormat),
    }

    frame.build_track_lba_start();
    frame.create_last_block()?;
    frame.dir = address::from_ts(frame, DIR_TRACK, 1)?;
    frame.info = address::from_ts(frame, DIR_TRACK, 0)?;
    bam::bind_selectors(frame)?;
    frame.probe_geos(raw);
    Ok(())
}
