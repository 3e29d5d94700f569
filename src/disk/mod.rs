//! Traits, structs, and functions relating to CBM disk images.
//!
//! This module supports the following disk image types:
//!
//! 1. **D40**. Images of 2040/3040 drives; almost a D64, but with 20
//!    sectors on tracks 18..24.
//! 2. **D64**. Images of a 5¼-inch single-sided disk as used in Commodore
//!    1541 drives, in 35-, 40-, and 42-track variants. The 40-track
//!    SpeedDOS, Dolphin DOS, and Prologic DOS flavors share the plain
//!    40-track size and are selected by an explicit hint only.
//! 3. **D71**. Images of the double-sided 1571 disk.
//! 4. **D81**. Images of the 3½-inch 1581 disk, including 1581-style
//!    partitions.
//! 5. **D80/D82**. Images of the 8050/8250 drives.
//! 6. **D1M/D2M/D4M**. Images of CMD FD-2000/FD-4000 media. The outer
//!    level is a partition table; D64/D71/D81 partitions and CMD native
//!    partitions can be entered from it.
//!
//! Each "+ error map" size variant carries a trailing map of one byte per
//! block; the map is kept available but not interpreted.
//!
//! The focus is on reading and checking: enumerating directories, reading
//! files, decoding the BAM, and validating that the BAM agrees with what
//! the directory and the link chains actually use.

pub mod address;
pub mod bam;
pub mod block;
pub mod chain;
pub mod directory;
pub mod error;
pub mod fat;
pub mod file;
pub mod geometry;
pub mod geos;
pub mod looptrack;
pub mod validation;

mod cmdfd;
mod d64;
mod d80;
mod d81;
mod dnp;
mod image;
mod settings;

use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::disk::image::Image;
use crate::disk::settings::Settings;

pub use self::address::BlockAddr;
pub use self::bam::BamState;
pub use self::block::{BlockCursor, ChainLink, BLOCK_SIZE};
pub use self::chain::Chain;
pub use self::directory::{
    DateTime, DirEntry, DirHeader, DirIterator, EntryKind, EntryName, FileKind, GeosFileType,
    GeosMeta, PartitionKind,
};
pub use self::error::{DiskError, Result};
pub use self::fat::{Fat, FatEntry};
pub use self::file::{FileReader, RelativeFile, VlirFile};
pub use self::geometry::{guess_type, ImageType};
pub use self::geos::{GeosInfo, GeosString};
pub use self::looptrack::LoopDetector;
pub use self::validation::ValidationError;

/// A disk image opened for inspection. Owns the raw bytes and the stack of
/// volume frames; the top frame is the active volume (the image itself, or
/// the innermost partition after `chdir`).
pub struct DiskImage {
    storage: Image,
    filename: Option<PathBuf>,
    data_size: usize,
    errormap_offset: Option<usize>,
    frames: Vec<Settings>,
}

impl DiskImage {
    /// Open an in-memory disk image. Without a hint the format is guessed
    /// from the buffer size.
    pub fn open(buffer: &[u8], hint: Option<ImageType>) -> Result<DiskImage> {
        Self::from_storage(Image::from_bytes(buffer), None, hint)
    }

    /// Open a disk image file (read-only). Without a hint the format is
    /// guessed from the file size.
    pub fn open_path<P: AsRef<Path>>(path: P, hint: Option<ImageType>) -> Result<DiskImage> {
        let storage = Image::open_read_only(&path)?;
        Self::from_storage(storage, Some(path.as_ref().to_owned()), hint)
    }

    fn from_storage(
        storage: Image,
        filename: Option<PathBuf>,
        hint: Option<ImageType>,
    ) -> Result<DiskImage> {
        let size = storage.len();
        let (image_type, has_errormap) = match hint {
            Some(image_type) => {
                if size == image_type.base_size() {
                    (image_type, false)
                } else if size == image_type.base_size() + image_type.blocks() {
                    (image_type, true)
                } else {
                    return Err(DiskError::InvalidLayout);
                }
            }
            None => geometry::guess_type(size).ok_or(DiskError::UnknownFormat)?,
        };
        debug!(
            "opening {} image, {} bytes{}",
            image_type.name(),
            size,
            if has_errormap { " (with error map)" } else { "" }
        );

        let data_size = image_type.base_size();
        let mut root = Settings::blank(image_type, data_size);
        match image_type {
            ImageType::D40
            | ImageType::D64
            | ImageType::D64Track40
            | ImageType::D64Track40Speeddos
            | ImageType::D64Track40Dolphin
            | ImageType::D64Track40Prologic
            | ImageType::D64Track42
            | ImageType::D71 => d64::init_partition(&mut root, &storage, image_type)?,
            ImageType::D80 | ImageType::D82 => d80::init_partition(&mut root, &storage, image_type)?,
            ImageType::D81 => d81::init_partition(&mut root, &storage)?,
            ImageType::D1M | ImageType::D2M | ImageType::D4M => {
                cmdfd::init_partition(&mut root, &storage, image_type)?
            }
            ImageType::CmdNative => return Err(DiskError::UnknownFormat),
        }

        Ok(DiskImage {
            storage,
            filename,
            data_size,
            errormap_offset: if has_errormap { Some(data_size) } else { None },
            frames: vec![root],
        })
    }

    #[inline]
    pub(crate) fn settings(&self) -> &Settings {
        self.frames.last().expect("frame stack is never empty")
    }

    #[inline]
    pub(crate) fn settings_mut(&mut self) -> &mut Settings {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    /// The type of the active volume. Inside a partition this reflects the
    /// partition's format, not the enclosing image.
    pub fn image_type(&self) -> ImageType {
        self.settings().image_type
    }

    pub fn image_type_name(&self) -> &'static str {
        self.settings().image_type.name()
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// The raw image bytes, without any trailing error map.
    pub fn raw(&self) -> &[u8] {
        &self.storage.bytes()[..self.data_size]
    }

    pub fn raw_size(&self) -> usize {
        self.data_size
    }

    /// The trailing error map, one byte per block, if the image has one.
    pub fn error_map(&self) -> Option<&[u8]> {
        self.errormap_offset
            .map(|offset| &self.storage.bytes()[offset..])
    }

    /// Write the raw image bytes (and error map, if any) to a file.
    pub fn write_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.storage.write_to(path)
    }

    pub fn max_track(&self) -> u8 {
        self.settings().max_track
    }

    /// The largest sector count of any track. Individual tracks may hold
    /// fewer sectors.
    pub fn max_sector(&self) -> u16 {
        self.settings().max_sector
    }

    pub fn max_lba(&self) -> u16 {
        self.settings().max_lba()
    }

    pub fn bytes_per_block(&self) -> usize {
        self.settings().bytes_per_block
    }

    pub fn sectors_in_track(&self, track: u8) -> u16 {
        self.settings().sectors_in_track(track)
    }

    pub fn is_geos(&self) -> bool {
        self.settings().is_geos
    }

    pub fn geos_border(&self) -> Option<BlockAddr> {
        let border = self.settings().geos_border;
        if border.is_unused() {
            None
        } else {
            Some(border)
        }
    }

    /// Whether the active volume is the partition table of a CMD FD image.
    pub fn is_partition_table(&self) -> bool {
        self.settings().is_partition_table
    }

    /// How many volumes are stacked up: 1 at the root, one more per
    /// entered partition.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    // --- block addressing ---

    /// Build a block address from (track, sector).
    pub fn addr(&self, track: u8, sector: u8) -> Result<BlockAddr> {
        address::from_ts(self.settings(), track, sector)
    }

    /// Build a block address from a linear block number.
    pub fn addr_from_lba(&self, lba: u16) -> Result<BlockAddr> {
        address::from_lba(self.settings(), lba)
    }

    pub fn ts_exists(&self, track: u8, sector: u8) -> bool {
        address::ts_exists(self.settings(), track, sector)
    }

    pub fn lba_exists(&self, lba: u16) -> bool {
        address::lba_exists(self.settings(), lba)
    }

    /// Advance to the next block of the image, wrapping into the next
    /// track; fails on the last block.
    pub fn advance(&self, block: &mut BlockAddr) -> Result<()> {
        address::advance(self.settings(), block)
    }

    /// Advance within the track; fails on its last sector.
    pub fn advance_in_track(&self, block: &mut BlockAddr) -> Result<()> {
        address::advance_in_track(self.settings(), block)
    }

    /// LBA addition for rebasing: `result <- result + adder - 1`, identity
    /// if either side is unused.
    pub fn addr_add(&self, result: &mut BlockAddr, adder: BlockAddr) -> Result<()> {
        address::add(self.settings(), result, adder)
    }

    // --- block access ---

    /// Borrow the bytes of one block.
    pub fn block(&self, block: BlockAddr) -> Result<&[u8]> {
        block::block_slice(self.settings(), &self.storage, block)
    }

    /// Borrow the bytes of one block mutably. Fails on read-only storage.
    pub fn block_mut(&mut self, block: BlockAddr) -> Result<&mut [u8]> {
        let frame_index = self.frames.len() - 1;
        block::block_slice_mut(&self.frames[frame_index], &mut self.storage, block)
    }

    /// Copy one block into the caller's buffer.
    pub fn read_block(&self, block: BlockAddr, buffer: &mut [u8]) -> Result<()> {
        let bytes = self.bytes_per_block();
        if buffer.len() < bytes {
            return Err(DiskError::BufferTooSmall(bytes));
        }
        buffer[..bytes].copy_from_slice(self.block(block)?);
        Ok(())
    }

    /// Follow the chain link at the head of the caller's buffer: update
    /// `block` to the successor and copy its contents over the buffer.
    /// Returns the tail marker instead once the chain ends.
    pub fn read_next_block(&self, block: &mut BlockAddr, buffer: &mut [u8]) -> Result<ChainLink> {
        let link = ChainLink::parse(self.settings(), buffer)?;
        if let ChainLink::Next(next) = link {
            self.read_block(next, buffer)?;
            *block = next;
        }
        Ok(link)
    }

    /// Overwrite one block from the caller's buffer.
    pub fn write_block(&mut self, block: BlockAddr, buffer: &[u8]) -> Result<()> {
        let bytes = self.bytes_per_block();
        if buffer.len() < bytes {
            return Err(DiskError::BufferTooSmall(bytes));
        }
        self.block_mut(block)?.copy_from_slice(&buffer[..bytes]);
        Ok(())
    }

    /// Open a cursor positioned at the given block.
    pub fn cursor(&self, block: BlockAddr) -> Result<BlockCursor> {
        BlockCursor::new(self, block)
    }

    /// Start walking the chain beginning at the given block.
    pub fn chain(&self, start: BlockAddr) -> Result<Chain> {
        Chain::start(self, start)
    }

    // --- directory ---

    /// The directory header of the active volume, or `None` on a partition
    /// table.
    pub fn dir_header(&self) -> Result<Option<DirHeader>> {
        directory::header(self)
    }

    /// Iterate the directory entries of the active volume.
    pub fn dir_iter(&self) -> DirIterator {
        DirIterator::new(self)
    }

    /// Collect all directory entries of the active volume.
    pub fn dir_entries(&self) -> Result<Vec<DirEntry>> {
        self.dir_iter().collect()
    }

    /// Enter the partition or subdirectory a directory entry describes.
    pub fn chdir(&mut self, entry: &DirEntry) -> Result<()> {
        let ops = self.settings().ops;
        let mut frame = self.settings().child();
        ops.chdir(&mut frame, entry, &self.storage)?;
        self.frames.push(frame);
        Ok(())
    }

    /// Leave the innermost partition again. Fails at the root.
    pub fn chdir_close(&mut self) -> Result<()> {
        if self.frames.len() <= 1 {
            return Err(DiskError::AtRootDirectory);
        }
        self.frames.pop();
        Ok(())
    }

    /// Open a file for reading by its directory entry.
    pub fn open_file_entry<'a>(&'a self, entry: &DirEntry) -> Result<FileReader<'a>> {
        FileReader::new(self, entry)
    }

    /// Open a REL file for record access by its directory entry.
    pub fn open_rel_entry<'a>(&'a self, entry: &DirEntry) -> Result<RelativeFile<'a>> {
        RelativeFile::open(self, entry)
    }

    /// Open a GEOS VLIR file for record access by its directory entry.
    pub fn open_vlir_entry<'a>(&'a self, entry: &DirEntry) -> Result<VlirFile<'a>> {
        VlirFile::open(self, entry)
    }

    /// Read the GEOS info block of a directory entry. `None` when the
    /// entry is GEOS but carries no info block; an error when the entry is
    /// not a GEOS file at all.
    pub fn geos_info(&self, entry: &DirEntry) -> Result<Option<GeosInfo>> {
        geos::read_info(self, entry)
    }

    // --- BAM ---

    /// The BAM free-state of one block.
    pub fn bam_state(&self, block: BlockAddr) -> BamState {
        bam::state(self, block)
    }

    /// Check the BAM for internal consistency.
    pub fn bam_check(&self) -> Vec<ValidationError> {
        bam::check_consistency(self)
    }

    /// The "blocks free" total: free counters summed over all
    /// non-directory tracks.
    pub fn blocks_free(&self) -> usize {
        bam::blocks_free(self)
    }

    pub fn bam_free_on_track(&self, track: u8) -> u16 {
        bam::free_on_track(self, track)
    }

    // --- validation ---

    /// Validate the active volume. Returns every inconsistency found; an
    /// empty list means the image is consistent. The derived allocation is
    /// rebuilt from scratch and cached on the active frame.
    pub fn validate(&mut self) -> Vec<ValidationError> {
        validation::validate(self)
    }

    /// Dump the derived allocation table, validating first if none is
    /// cached yet. `disklayout` switches from a linear dump to a per-track
    /// layout with the given number of columns.
    pub fn fat_dump(&mut self, disklayout: Option<usize>, writer: &mut dyn Write) -> Result<()> {
        if self.settings().fat.is_none() {
            let _ = self.validate();
        }
        let fat = match &self.settings().fat {
            Some(fat) => fat.clone(),
            None => return Ok(()),
        };
        fat.dump(self, disklayout, writer)?;
        Ok(())
    }
}
