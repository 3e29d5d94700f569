//! CMD FD-2000/FD-4000 media: D1M, D2M, and D4M images. The outer level of
//! these images is not a filesystem but a partition table living on the
//! system track; each row names a D64, D71, D81, or native partition that
//! is entered with its own addressing base.

use crate::disk::address::{self, BlockAddr};
use crate::disk::directory::{self, DirEntry, EntryKind, PartitionKind};
use crate::disk::error::{DiskError, Result};
use crate::disk::fat::Fat;
use crate::disk::geometry::ImageType;
use crate::disk::image::Image;
use crate::disk::settings::{Addressing, FormatOps, Settings};
use crate::disk::validation::{self, ValidationError};
use crate::disk::{d64, d81, dnp, DiskImage};

pub(crate) struct CmdFdOps;
pub(crate) static CMDFD_OPS: CmdFdOps = CmdFdOps;

/// The partition table occupies sectors 8..=39 of the system track.
const SYSTEM_TRACK: u8 = 81;
const TABLE_FIRST_SECTOR: u8 = 8;
const TABLE_LAST_SECTOR: u8 = 39;

impl FormatOps for CmdFdOps {
    fn chdir(&self, frame: &mut Settings, entry: &DirEntry, raw: &Image) -> Result<()> {
        if !frame.is_partition_table {
            return Err(DiskError::NotAPartition);
        }
        let kind = match entry.kind {
            EntryKind::Partition(kind) => kind,
            EntryKind::File(_) => return Err(DiskError::NotAPartition),
        };

        // The row's start address is an absolute block number of the whole
        // image; the span must fit before the frame is rebuilt.
        let (first, _last, _count) = directory::partition_span(frame, entry)?;

        frame.is_partition_table = false;
        frame.addressing = Addressing::Global;
        frame.data_offset = (first.lba as usize - 1) * frame.bytes_per_block;
        frame.subdir_first = BlockAddr {
            track: 1,
            sector: 0,
            lba: 1,
        };

        match kind {
            PartitionKind::D64 => d64::init_partition(frame, raw, ImageType::D64)?,
            PartitionKind::D71 => d64::init_partition(frame, raw, ImageType::D71)?,
            PartitionKind::D81 => d81::init_partition(frame, raw)?,
            PartitionKind::CmdNative => dnp::init_partition(frame, raw)?,
            _ => return Err(DiskError::NotAPartition),
        }

        frame.subdir_last = frame.last_block;
        Ok(())
    }

    /// Nothing links the partitions together; mark every row's span as a
    /// run of consecutive blocks.
    fn bam_fixup(&self, image: &DiskImage, fat: &mut Fat, errors: &mut Vec<ValidationError>) {
        let entries: Vec<DirEntry> = image
            .dir_iter()
            .filter_map(|entry| entry.ok())
            .collect();
        for entry in entries {
            // Partition rows carry absolute block numbers, so the span is
            // marked without the frame's addressing base.
            validation::mark_partition_span(
                image.settings(),
                fat,
                entry.start,
                entry.block_count as usize,
                errors,
            );
        }
    }
}

pub(crate) fn init_partition(
    frame: &mut Settings,
    raw: &Image,
    image_type: ImageType,
) -> Result<()> {
    frame.ops = &CMDFD_OPS;
    frame.image_type = image_type;
    frame.max_track = SYSTEM_TRACK;
    frame.max_sector = match image_type {
        ImageType::D1M => 40,
        ImageType::D2M => 80,
        ImageType::D4M => 160,
        _ => return Err(DiskError::UnknownFormat),
    };
    frame.zone_table = None;
    frame.track_lba_start = Vec::new();
    frame.diskname_offset = 0xF0;
    frame.dir_tracks = [0, 0];
    frame.bam = Vec::new();
    frame.bam_counter = Vec::new();
    frame.is_partition_table = true;

    frame.create_last_block()?;

    // The partition table area is addressed as if it began at (1,0).
    frame.addressing = Addressing::Global;
    frame.data_offset = 0;
    frame.subdir_first = address::from_ts(frame, SYSTEM_TRACK, TABLE_FIRST_SECTOR)?;
    frame.subdir_last = address::from_ts(frame, SYSTEM_TRACK, TABLE_LAST_SECTOR)?;
    frame.dir = address::from_ts(frame, 1, 0)?;
    frame.info = address::from_ts(frame, 1, 0)?;

    frame.probe_geos(raw);
    Ok(())
}
