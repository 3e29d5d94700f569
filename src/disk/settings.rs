//! The per-volume frame. Opening an image creates the root frame; changing
//! into a partition or subdirectory pushes another frame describing the
//! nested volume, and leaving it pops the frame again.

use crate::disk::address::{self, BlockAddr};
use crate::disk::bam::BamSelector;
use crate::disk::block;
use crate::disk::directory::DirEntry;
use crate::disk::error::{DiskError, Result};
use crate::disk::fat::Fat;
use crate::disk::geometry::{ImageType, BLOCK_SIZE};
use crate::disk::image::Image;
use crate::disk::validation::ValidationError;
use crate::disk::DiskImage;

/// How block addresses of the active volume map into the raw buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Addressing {
    /// Root frames: addresses resolve straight into the buffer.
    Direct,
    /// 1581-style partitions: a block keeps the name it has in the
    /// enclosing image, and the volume is a bounded sub-range of it.
    Relative,
    /// CMD FD-style partitions: the partition is renamed to begin at block
    /// (1,0) / LBA 1; resolution applies an LBA base and a byte offset into
    /// the raw buffer.
    Global,
}

/// The capability set a format family plugs into the generic machinery.
/// The provided methods are the fixed-sector fallbacks; zoned formats get
/// their behavior from the zone table and LBA start table carried in the
/// frame, so most adapters only override `chdir` and `bam_fixup`.
pub(crate) trait FormatOps: Sync {
    fn sectors_in_track(&self, s: &Settings, track: u8) -> u16 {
        if track == 0 || track as u16 > s.max_track as u16 {
            return 0;
        }
        match s.zone_table {
            Some(table) => table[track as usize] as u16,
            None => s.max_sector,
        }
    }

    fn ts_to_lba(&self, s: &Settings, track: u8, sector: u8) -> Option<u16> {
        if track == 0 || track as u16 > s.max_track as u16 {
            return None;
        }
        if (sector as u16) >= self.sectors_in_track(s, track) {
            return None;
        }
        if s.track_lba_start.is_empty() {
            Some((track as u16 - 1) * s.max_sector + sector as u16 + 1)
        } else {
            Some(s.track_lba_start[track as usize] + sector as u16)
        }
    }

    fn lba_to_ts(&self, s: &Settings, lba: u16) -> Option<(u8, u8)> {
        if lba == 0 {
            return None;
        }
        if s.track_lba_start.is_empty() {
            let track = (lba - 1) / s.max_sector + 1;
            let sector = (lba - 1) % s.max_sector;
            if track > s.max_track as u16 {
                return None;
            }
            Some((track as u8, sector as u8))
        } else {
            let mut track = 1usize;
            while track <= s.max_track as usize && s.track_lba_start[track] <= lba {
                track += 1;
            }
            let track = track - 1;
            if track == 0 {
                return None;
            }
            let sector = lba - s.track_lba_start[track];
            if sector >= self.sectors_in_track(s, track as u8) {
                return None;
            }
            Some((track as u8, sector as u8))
        }
    }

    /// Reinitialize a freshly pushed frame for the partition named by the
    /// directory entry. Formats without partitions keep the default.
    fn chdir(&self, _frame: &mut Settings, _entry: &DirEntry, _raw: &Image) -> Result<()> {
        Err(DiskError::NotAPartition)
    }

    /// Mark the blocks this format reserves outside of any link chain
    /// (second directory tracks, boot blocks, partition spans).
    fn bam_fixup(&self, _image: &DiskImage, _fat: &mut Fat, _errors: &mut Vec<ValidationError>) {}
}

pub(crate) struct Settings {
    pub image_type: ImageType,
    pub ops: &'static dyn FormatOps,
    /// Size of the raw buffer without the error map.
    pub raw_size: usize,
    pub max_track: u8,
    pub max_sector: u16,
    pub bytes_per_block: usize,
    /// Sectors per track for zoned formats; `None` means every track holds
    /// `max_sector` sectors.
    pub zone_table: Option<&'static [u8]>,
    /// First LBA of each track, element 0 unused. Empty for fixed-sector
    /// formats, which convert arithmetically.
    pub track_lba_start: Vec<u16>,
    /// The track(s) holding the directory, numerically sorted, unused
    /// entries 0. Free-block totals skip these.
    pub dir_tracks: [u8; 2],
    /// Address of the first directory block.
    pub dir: BlockAddr,
    /// Address of the info block. On D64/D71/D40 this coincides with the
    /// BAM block.
    pub info: BlockAddr,
    /// Offset of the disk name inside the info block.
    pub diskname_offset: usize,
    pub last_block: BlockAddr,
    /// 1581 and CMD formats interpose a super side-sector between the
    /// directory entry and the side-sector groups of a REL file.
    pub has_super_sidesector: bool,
    pub bam: Vec<BamSelector>,
    /// Free-count selectors; empty means the counts are derived by
    /// popcounting the bitmap (CMD native partitions).
    pub bam_counter: Vec<BamSelector>,
    pub addressing: Addressing,
    /// First block of the active sub-area. For `Global` frames the LBA part
    /// is the base added during resolution (1 after a chdir, the partition
    /// table base on the outer CMD frame).
    pub subdir_first: BlockAddr,
    pub subdir_last: BlockAddr,
    /// Byte offset into the raw buffer for `Global` frames.
    pub data_offset: usize,
    /// CMD FD images present their outer level as a partition table rather
    /// than a directory.
    pub is_partition_table: bool,
    pub is_geos: bool,
    pub geos_border: BlockAddr,
    /// The derived allocation built by the most recent validation run.
    pub fat: Option<Fat>,
}

/// A placeholder adapter for frames that have not been initialized yet; it
/// carries nothing beyond the generic fallbacks.
struct NullOps;
impl FormatOps for NullOps {}
static NULL_OPS: NullOps = NullOps;

impl Settings {
    pub fn blank(image_type: ImageType, raw_size: usize) -> Settings {
        Settings {
            image_type,
            ops: &NULL_OPS,
            raw_size,
            max_track: 0,
            max_sector: 0,
            bytes_per_block: BLOCK_SIZE,
            zone_table: None,
            track_lba_start: Vec::new(),
            dir_tracks: [0, 0],
            dir: BlockAddr::UNUSED,
            info: BlockAddr::UNUSED,
            diskname_offset: 0,
            last_block: BlockAddr::UNUSED,
            has_super_sidesector: false,
            bam: Vec::new(),
            bam_counter: Vec::new(),
            addressing: Addressing::Direct,
            subdir_first: BlockAddr::UNUSED,
            subdir_last: BlockAddr::UNUSED,
            data_offset: 0,
            is_partition_table: false,
            is_geos: false,
            geos_border: BlockAddr::UNUSED,
            fat: None,
        }
    }

    /// Clone this frame as the starting point for a nested volume. The
    /// cached FAT stays with the parent.
    pub fn child(&self) -> Settings {
        Settings {
            image_type: self.image_type,
            ops: self.ops,
            raw_size: self.raw_size,
            max_track: self.max_track,
            max_sector: self.max_sector,
            bytes_per_block: self.bytes_per_block,
            zone_table: self.zone_table,
            track_lba_start: self.track_lba_start.clone(),
            dir_tracks: self.dir_tracks,
            dir: self.dir,
            info: self.info,
            diskname_offset: self.diskname_offset,
            last_block: self.last_block,
            has_super_sidesector: self.has_super_sidesector,
            bam: self.bam.clone(),
            bam_counter: self.bam_counter.clone(),
            addressing: self.addressing,
            subdir_first: self.subdir_first,
            subdir_last: self.subdir_last,
            data_offset: self.data_offset,
            is_partition_table: self.is_partition_table,
            is_geos: self.is_geos,
            geos_border: self.geos_border,
            fat: None,
        }
    }

    #[inline]
    pub fn max_lba(&self) -> u16 {
        self.last_block.lba
    }

    #[inline]
    pub fn sectors_in_track(&self, track: u8) -> u16 {
        self.ops.sectors_in_track(self, track)
    }

    /// Precompute the first LBA of every track from the zone table.
    pub fn build_track_lba_start(&mut self) {
        let mut table = vec![0u16; self.max_track as usize + 1];
        let mut lba = 1u16;
        for track in 1..=self.max_track as usize {
            table[track] = lba;
            lba += self.sectors_in_track_for_table(track as u8);
        }
        self.track_lba_start = table;
    }

    // Zone lookup that works before track_lba_start exists.
    fn sectors_in_track_for_table(&self, track: u8) -> u16 {
        match self.zone_table {
            Some(table) => table[track as usize] as u16,
            None => self.max_sector,
        }
    }

    /// Record the last block of the active area; its LBA doubles as the
    /// total block count.
    pub fn create_last_block(&mut self) -> Result<()> {
        let track = self.max_track;
        let sectors = self.sectors_in_track_for_table(track);
        if sectors == 0 {
            return Err(DiskError::InvalidLocation);
        }
        // Resolve by hand: from_ts() bound-checks against max_lba, which is
        // exactly what this function is about to establish.
        let sector = (sectors - 1) as u8;
        let lba = match self
            .ops
            .ts_to_lba(self, track, sector)
        {
            Some(lba) => lba,
            None => return Err(DiskError::InvalidLocation),
        };
        self.last_block = BlockAddr { track, sector, lba };
        Ok(())
    }

    /// Probe the info block for the GEOS signature and remember the border
    /// block if the image is GEOS-formatted.
    pub fn probe_geos(&mut self, raw: &Image) {
        static GEOS_SIGNATURE: &[u8] = b"GEOS format V1.";
        const GEOS_SIGNATURE_OFFSET: usize = 0xAD;
        const GEOS_BORDER_OFFSET: usize = 0xAB;

        self.is_geos = false;
        self.geos_border = BlockAddr::UNUSED;

        let block = match block::block_slice(self, raw, self.info) {
            Ok(block) => block,
            Err(_) => return,
        };
        if &block[GEOS_SIGNATURE_OFFSET..GEOS_SIGNATURE_OFFSET + GEOS_SIGNATURE.len()]
            == GEOS_SIGNATURE
        {
            self.is_geos = true;
            let track = block[GEOS_BORDER_OFFSET];
            let sector = block[GEOS_BORDER_OFFSET + 1];
            self.geos_border = address::from_ts(self, track, sector).unwrap_or(BlockAddr::UNUSED);
        }
    }
}
