//! The 1581: D81 images and 1581-style partitions. A 1581 partition is a
//! track-aligned slice of the disk that keeps the enclosing block names;
//! when one is formatted as a subdirectory, its first blocks hold a fresh
//! header, two BAM blocks, and a directory chain.

use log::warn;

use crate::disk::address::{self, BlockAddr};
use crate::disk::bam::{self, BamSelector};
use crate::disk::directory::{self, DirEntry, EntryKind, FileKind};
use crate::disk::error::{DiskError, Result};
use crate::disk::fat::Fat;
use crate::disk::geometry::ImageType;
use crate::disk::image::Image;
use crate::disk::settings::{Addressing, FormatOps, Settings};
use crate::disk::validation::{self, ValidationError};
use crate::disk::DiskImage;

pub(crate) struct D81Ops;
pub(crate) static D81_OPS: D81Ops = D81Ops;

const DIR_TRACK: u8 = 40;

impl FormatOps for D81Ops {
    fn chdir(&self, frame: &mut Settings, entry: &DirEntry, _raw: &Image) -> Result<()> {
        if entry.kind != EntryKind::File(FileKind::Partition1581) {
            return Err(DiskError::NotAPartition);
        }

        let (first, last, _count) = directory::partition_span(frame, entry)?;

        if first.sector != 0 {
            warn!(
                "Partition does not start on track boundary but at {}.",
                first
            );
            return Err(DiskError::InvalidPartition);
        }
        if last.sector as u16 != frame.max_sector - 1 {
            warn!("Partition does not end on track boundary but at {}.", last);
            return Err(DiskError::InvalidPartition);
        }
        let dir_track = frame.dir_tracks[0];
        if first.track <= dir_track && last.track >= dir_track {
            warn!(
                "Partition from {} to {} crosses directory track!",
                first, last
            );
            return Err(DiskError::InvalidPartition);
        }

        // Rebase into the enclosing frame; for a root D81 this is the
        // identity, inside a CMD partition it composes with its base.
        let mut first_adjusted = frame.subdir_first;
        address::add(frame, &mut first_adjusted, first)?;
        let mut last_adjusted = frame.subdir_first;
        address::add(frame, &mut last_adjusted, last)?;

        frame.subdir_first = first_adjusted;
        frame.subdir_last = last_adjusted;
        frame.addressing = Addressing::Relative;
        frame.is_partition_table = false;

        // Subdirectory layout: header block, two BAM blocks, then the
        // first directory block.
        frame.info = first_adjusted;
        let mut block = first_adjusted;
        address::advance(frame, &mut block)?;
        frame.bam[0].block = block;
        frame.bam_counter[0].block = block;
        address::advance(frame, &mut block)?;
        frame.bam[1].block = block;
        frame.bam_counter[1].block = block;
        address::advance(frame, &mut block)?;
        frame.dir = block;

        // The subdirectory has no fixed directory track of its own.
        frame.dir_tracks = [0, 0];
        Ok(())
    }

    /// After a chdir, the 1581 marks every block outside the partition as
    /// used; mirror that in the derived allocation.
    fn bam_fixup(&self, image: &DiskImage, fat: &mut Fat, errors: &mut Vec<ValidationError>) {
        let s = image.settings();
        if s.addressing != Addressing::Relative || s.subdir_first.lba == 0 {
            return;
        }
        let first = s.subdir_first;
        let last = s.subdir_last;

        let mut current = match image.addr(1, 0) {
            Ok(addr) => addr,
            Err(_) => return,
        };
        let mut next = current;
        let mut last_run = image.advance(&mut next).is_err();
        loop {
            validation::mark_block(fat, first, current, next, errors);
            if last_run {
                break;
            }
            current = next;
            if image.advance(&mut next).is_err() {
                next = BlockAddr::UNUSED;
                last_run = true;
                continue;
            }
            // Skip over the partition itself.
            if next.lba == first.lba {
                next = last;
                if image.advance(&mut next).is_err() {
                    next = BlockAddr::UNUSED;
                    last_run = true;
                }
            }
        }
    }
}

pub(crate) fn init_partition(frame: &mut Settings, raw: &Image) -> Result<()> {
    frame.ops = &D81_OPS;
    frame.image_type = ImageType::D81;
    frame.max_track = 80;
    frame.max_sector = 40;
    frame.zone_table = None;
    frame.track_lba_start = Vec::new();
    frame.diskname_offset = 0x04;
    frame.dir_tracks = [DIR_TRACK, 0];
    frame.has_super_sidesector = true;
    frame.is_partition_table = false;

    frame.bam = vec![
        BamSelector::new(1, DIR_TRACK, 1, 0x11, 6, 5),
        BamSelector::new(41, DIR_TRACK, 2, 0x11, 6, 5),
    ];
    frame.bam_counter = vec![
        BamSelector::new(1, DIR_TRACK, 1, 0x10, 6, 0),
        BamSelector::new(41, DIR_TRACK, 2, 0x10, 6, 0),
    ];

    frame.create_last_block()?;
    frame.dir = address::from_ts(frame, DIR_TRACK, 3)?;
    frame.info = address::from_ts(frame, DIR_TRACK, 0)?;
    bam::bind_selectors(frame)?;
    frame.probe_geos(raw);
    Ok(())
}
