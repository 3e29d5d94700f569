//! CMD native partitions (DNP). A native partition is a tree-structured
//! filesystem living inside a D1M/D2M/D4M partition: up to 255 tracks of
//! 256 sectors, a BAM of 32 reverse-bit-order selectors on blocks (1,2)
//! through (1,33), the C128 boot block at (1,0), and the root directory
//! header at (1,1).

use crate::disk::address::{self, BlockAddr};
use crate::disk::bam::{self, BamSelector};
use crate::disk::block::{self, ChainLink};
use crate::disk::directory::{DirEntry, EntryKind, FileKind};
use crate::disk::error::{DiskError, Result};
use crate::disk::fat::Fat;
use crate::disk::geometry::ImageType;
use crate::disk::image::Image;
use crate::disk::settings::{FormatOps, Settings};
use crate::disk::validation::{self, ValidationError};
use crate::disk::DiskImage;

pub(crate) struct DnpOps;
pub(crate) static DNP_OPS: DnpOps = DnpOps;

const BAM_SELECTOR_COUNT: usize = 32;
const BAM_FIRST_SECTOR: u8 = 2;
const BAM_LAST_SECTOR: u8 = 33;
/// Offset of the last-track byte within the first BAM block.
const BAM_LAST_TRACK_OFFSET: usize = 8;

impl FormatOps for DnpOps {
    /// Subdirectories are directory files: their header block links to the
    /// first block of the nested directory chain.
    fn chdir(&self, frame: &mut Settings, entry: &DirEntry, raw: &Image) -> Result<()> {
        if entry.kind != EntryKind::File(FileKind::CmdNative) {
            return Err(DiskError::NotAPartition);
        }
        let header = block::block_slice(frame, raw, entry.start)?;
        match ChainLink::parse(frame, header)? {
            ChainLink::Next(dir) => {
                frame.info = entry.start;
                frame.dir = dir;
                Ok(())
            }
            ChainLink::Tail(_) => Err(DiskError::InvalidPartition),
        }
    }

    /// The boot block and the BAM blocks are reserved without being part of
    /// any chain.
    fn bam_fixup(&self, image: &DiskImage, fat: &mut Fat, errors: &mut Vec<ValidationError>) {
        let boot = match image.addr(1, 0) {
            Ok(addr) => addr,
            Err(_) => return,
        };
        validation::mark_block(fat, boot, boot, BlockAddr::UNUSED, errors);

        // The first BAM block is reached through the regular BAM marking;
        // the remaining ones at (1,3)..(1,33) are covered here.
        let mut current = match image.addr(1, BAM_FIRST_SECTOR + 1) {
            Ok(addr) => addr,
            Err(_) => return,
        };
        let mut next = current;
        if image.advance(&mut next).is_err() {
            next = BlockAddr::UNUSED;
        }
        for _ in BAM_FIRST_SECTOR + 1..=BAM_LAST_SECTOR {
            validation::mark_block(fat, current, current, next, errors);
            if next.lba == 0 {
                break;
            }
            current = next;
            if image.advance(&mut next).is_err() || next.sector > BAM_LAST_SECTOR {
                next = BlockAddr::UNUSED;
            }
        }
    }
}

pub(crate) fn init_partition(frame: &mut Settings, raw: &Image) -> Result<()> {
    frame.ops = &DNP_OPS;
    frame.image_type = ImageType::CmdNative;
    // Provisional geometry; the real track count comes out of the BAM
    // header below.
    frame.max_track = 255;
    frame.max_sector = 256;
    frame.zone_table = None;
    frame.track_lba_start = Vec::new();
    frame.diskname_offset = 0x04;
    frame.dir_tracks = [1, 0];
    frame.has_super_sidesector = true;
    frame.is_partition_table = false;

    frame.bam = (0..BAM_SELECTOR_COUNT)
        .map(|i| {
            if i == 0 {
                BamSelector::new(1, 1, BAM_FIRST_SECTOR, 0x20, 0x20, 0x20).reversed()
            } else {
                BamSelector::new(
                    (8 * i) as u8,
                    1,
                    BAM_FIRST_SECTOR + i as u8,
                    0x00,
                    0x20,
                    0x20,
                )
                .reversed()
            }
        })
        .collect();
    // No stored free counts; they are derived from the bitmaps.
    frame.bam_counter = Vec::new();

    frame.create_last_block()?;
    frame.info = address::from_ts(frame, 1, 1)?;
    bam::bind_selectors(frame)?;
    frame.probe_geos(raw);

    let bam_block = block::block_slice(frame, raw, frame.bam[0].block)?;
    let max_track = bam_block[BAM_LAST_TRACK_OFFSET];
    if max_track == 0 {
        return Err(DiskError::InvalidPartition);
    }
    frame.max_track = max_track;
    frame.create_last_block()?;

    frame.dir = address::from_ts(frame, 1, 34)?;
    Ok(())
}
