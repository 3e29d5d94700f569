//! Reading file contents.
//!
//! Plain CBM files (PRG, SEQ, USR) are a single link chain of blocks and
//! read as a byte stream. REL files add side-sector index blocks that
//! allow random access to fixed-length records; GEOS VLIR files scatter up
//! to 127 record streams behind a record map. The specialized access
//! types below cover those layouts read-only.

use std::io::{self, Read};

use crate::disk::address::BlockAddr;
use crate::disk::block::ChainLink;
use crate::disk::chain::Chain;
use crate::disk::directory::{DirEntry, EntryKind, FileKind};
use crate::disk::error::{DiskError, Result};
use crate::disk::DiskImage;

const SIDE_SECTOR_CHAIN_OFFSET: usize = 0x10;
const SUPER_SIDE_SECTOR_GROUP0: usize = 0x03;
const VLIR_MAP_OFFSET: usize = 2;

/// A byte-stream reader over one link chain. The payload of every block is
/// everything after the two link bytes.
pub struct FileReader<'a> {
    chain: Chain<'a>,
    /// Bytes of the current block already handed out, link included.
    consumed: usize,
    finished: bool,
}

impl<'a> FileReader<'a> {
    pub(crate) fn new(image: &'a DiskImage, entry: &DirEntry) -> Result<FileReader<'a>> {
        Self::from_start(image, entry.start)
    }

    pub(crate) fn from_start(image: &'a DiskImage, start: BlockAddr) -> Result<FileReader<'a>> {
        let chain = Chain::start(image, start)?;
        Ok(FileReader {
            chain,
            consumed: 2,
            finished: false,
        })
    }

    fn chain_error() -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, "damaged block chain")
    }
}

impl<'a> Read for FileReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.finished || buf.is_empty() {
                return Ok(0);
            }

            let used = self.chain.block_used().map_err(|_| Self::chain_error())?;
            if self.consumed < used {
                let data = self.chain.data().map_err(|_| Self::chain_error())?;
                let n = (used - self.consumed).min(buf.len());
                buf[..n].copy_from_slice(&data[self.consumed..self.consumed + n]);
                self.consumed += n;
                return Ok(n);
            }

            // The current block is drained; step along the chain.
            self.chain.advance();
            if self.chain.is_loop() {
                self.finished = true;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "loop in block chain",
                ));
            }
            if self.chain.is_done() {
                self.finished = true;
                return Ok(0);
            }
            self.consumed = 2;
        }
    }
}

/// Random access to the fixed-length records of a REL file.
///
/// The side-sector blocks are walked once on open to build the list of
/// data blocks; records are then located arithmetically, possibly
/// straddling two blocks.
pub struct RelativeFile<'a> {
    image: &'a DiskImage,
    record_length: usize,
    data_blocks: Vec<BlockAddr>,
    records: usize,
}

impl<'a> RelativeFile<'a> {
    pub(crate) fn open(image: &'a DiskImage, entry: &DirEntry) -> Result<RelativeFile<'a>> {
        if entry.kind != EntryKind::File(FileKind::Rel) || entry.rel_record_length == 0 {
            return Err(DiskError::NotFound);
        }
        let record_length = entry.rel_record_length as usize;

        // On 1581 and CMD formats the directory points at a super
        // side-sector whose first group pointer leads to the side-sector
        // chain proper.
        let mut side_sector = entry.rel_side_sector;
        if image.settings().has_super_sidesector {
            let block = image.block(side_sector)?;
            side_sector = image.addr(
                block[SUPER_SIDE_SECTOR_GROUP0],
                block[SUPER_SIDE_SECTOR_GROUP0 + 1],
            )?;
        }

        // Collect the data block addresses recorded in the side-sectors.
        let payload = image.bytes_per_block() - 2;
        let mut data_blocks = Vec::new();
        let mut chain = Chain::start(image, side_sector)?;
        loop {
            if chain.is_done() {
                break;
            }
            let data = chain.data()?;
            let used = chain.block_used()?;
            let mut offset = SIDE_SECTOR_CHAIN_OFFSET;
            while offset + 1 < used {
                let (track, sector) = (data[offset], data[offset + 1]);
                if track == 0 {
                    break;
                }
                data_blocks.push(image.addr(track, sector)?);
                offset += 2;
            }
            chain.advance();
        }
        if chain.is_loop() {
            return Err(DiskError::ChainLoop);
        }

        // The record count follows from the total payload size.
        let tail_bytes = match data_blocks.last() {
            Some(last) => match ChainLink::parse(image.settings(), image.block(*last)?)? {
                ChainLink::Tail(used) => used - 2,
                ChainLink::Next(_) => return Err(DiskError::InvalidChainLink),
            },
            None => 0,
        };
        let full_bytes = data_blocks.len().saturating_sub(1) * payload;
        let records = (full_bytes + tail_bytes) / record_length;

        Ok(RelativeFile {
            image,
            record_length,
            data_blocks,
            records,
        })
    }

    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// Read one record. Records may straddle a block boundary.
    pub fn record(&self, index: usize) -> Result<Vec<u8>> {
        if index >= self.records {
            return Err(DiskError::NotFound);
        }
        let payload = self.image.bytes_per_block() - 2;
        let mut offset = self.record_length * index;
        let mut remaining = self.record_length;
        let mut record = Vec::with_capacity(remaining);
        while remaining > 0 {
            let block_index = offset / payload;
            let within = offset % payload + 2;
            let block = self
                .data_blocks
                .get(block_index)
                .ok_or(DiskError::InvalidOffset)?;
            let data = self.image.block(*block)?;
            let take = remaining.min(data.len() - within);
            record.extend_from_slice(&data[within..within + take]);
            offset += take;
            remaining -= take;
        }
        Ok(record)
    }
}

/// Access to the record streams of a GEOS VLIR file. The start block is a
/// map of up to 127 records; each present record is its own link chain.
pub struct VlirFile<'a> {
    image: &'a DiskImage,
    records: Vec<Option<BlockAddr>>,
}

impl<'a> VlirFile<'a> {
    pub(crate) fn open(image: &'a DiskImage, entry: &DirEntry) -> Result<VlirFile<'a>> {
        match &entry.geos {
            Some(geos) if geos.is_vlir => {}
            _ => return Err(DiskError::NotFound),
        }
        let map = image.block(entry.start)?;
        let mut records = Vec::new();
        let mut offset = VLIR_MAP_OFFSET;
        while offset + 1 < map.len() {
            let (track, sector) = (map[offset], map[offset + 1]);
            if track == 0 && sector == 0 {
                break;
            }
            if track == 0 && sector == 0xFF {
                // Present but unavailable.
                records.push(None);
            } else {
                records.push(Some(image.addr(track, sector)?));
            }
            offset += 2;
        }
        Ok(VlirFile { image, records })
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Read one record stream in full. Absent records read as empty.
    pub fn record(&self, index: usize) -> Result<Vec<u8>> {
        let start = match self.records.get(index) {
            Some(start) => *start,
            None => return Err(DiskError::NotFound),
        };
        match start {
            Some(start) => {
                let mut reader = FileReader::from_start(self.image, start)?;
                let mut record = Vec::new();
                reader
                    .read_to_end(&mut record)
                    .map_err(|_| DiskError::InvalidChainLink)?;
                Ok(record)
            }
            None => Ok(Vec::new()),
        }
    }
}
