//! Directory enumeration: the header, the 32-byte entries with their CBM,
//! REL, and GEOS flavors, and the partition-table rows of CMD FD images.

use std::fmt;

use crate::disk::address::{self, BlockAddr};
use crate::disk::chain::Chain;
use crate::disk::error::{DiskError, Result};
use crate::disk::settings::Settings;
use crate::disk::DiskImage;
use crate::util;

pub(crate) const ENTRY_SIZE: usize = 32;

const ENTRY_TYPE: usize = 0x02;
const ENTRY_START_TRACK: usize = 0x03;
const ENTRY_START_SECTOR: usize = 0x04;
const ENTRY_NAME: usize = 0x05;
const ENTRY_NAME_LENGTH: usize = 16;
const ENTRY_SIDE_SECTOR_TRACK: usize = 0x15;
const ENTRY_SIDE_SECTOR_SECTOR: usize = 0x16;
const ENTRY_REL_RECORD_LENGTH: usize = 0x17;
const ENTRY_GEOS_INFO_TRACK: usize = 0x15;
const ENTRY_GEOS_INFO_SECTOR: usize = 0x16;
const ENTRY_GEOS_FILETYPE: usize = 0x17;
const ENTRY_GEOS_VLIR: usize = 0x18;
const ENTRY_YEAR: usize = 0x19;
const ENTRY_MONTH: usize = 0x1A;
const ENTRY_DAY: usize = 0x1B;
const ENTRY_HOUR: usize = 0x1C;
const ENTRY_MINUTE: usize = 0x1D;
const ENTRY_BLOCKS_LOW: usize = 0x1E;
const ENTRY_BLOCKS_HIGH: usize = 0x1F;
// Partition-table rows reuse the start and block-count slots, but as
// little-endian 16-bit values counted in 512-byte physical blocks.
const ENTRY_PARTITION_START_LOW: usize = 0x03;
const ENTRY_PARTITION_START_HIGH: usize = 0x04;
const ENTRY_PARTITION_BLOCKS_LOW: usize = 0x1E;
const ENTRY_PARTITION_BLOCKS_HIGH: usize = 0x1F;

const TYPE_KIND_MASK: u8 = 0x0F;
const TYPE_LOCKED: u8 = 0x40;
const TYPE_CLOSED: u8 = 0x80;

/// The shifted space that pads names and separates a name from trailing
/// suffix text such as `",8,1"`.
pub const SHIFTED_SPACE: u8 = 0xA0;

const HEADER_NAME_LENGTH: usize = 24;

/// File types of regular directory entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Del,
    Seq,
    Prg,
    Usr,
    Rel,
    /// A 1581-style partition (D81, D1M/D2M/D4M only).
    Partition1581,
    /// A CMD native partition or subdirectory (D1M/D2M/D4M only).
    CmdNative,
    Unknown(u8),
}

impl FileKind {
    fn from_byte(byte: u8) -> FileKind {
        match byte & TYPE_KIND_MASK {
            0 => FileKind::Del,
            1 => FileKind::Seq,
            2 => FileKind::Prg,
            3 => FileKind::Usr,
            4 => FileKind::Rel,
            5 => FileKind::Partition1581,
            6 => FileKind::CmdNative,
            other => FileKind::Unknown(other),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            FileKind::Del => "DEL",
            FileKind::Seq => "SEQ",
            FileKind::Prg => "PRG",
            FileKind::Usr => "USR",
            FileKind::Rel => "REL",
            FileKind::Partition1581 => "CBM",
            FileKind::CmdNative => "NAT",
            FileKind::Unknown(_) => "???",
        })
    }
}

/// Partition kinds found in the partition table of a CMD FD image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionKind {
    NoPartition,
    CmdNative,
    D64,
    D71,
    D81,
    System,
    Unknown(u8),
}

impl PartitionKind {
    fn from_byte(byte: u8) -> PartitionKind {
        match byte {
            0x00 => PartitionKind::NoPartition,
            0x01 => PartitionKind::CmdNative,
            0x02 => PartitionKind::D64,
            0x03 => PartitionKind::D71,
            0x04 => PartitionKind::D81,
            0xFF => PartitionKind::System,
            other => PartitionKind::Unknown(other),
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            PartitionKind::NoPartition => "NOP",
            PartitionKind::CmdNative => "CNP",
            PartitionKind::D64 => "D64",
            PartitionKind::D71 => "D71",
            PartitionKind::D81 => "D81",
            PartitionKind::System => "SYS",
            PartitionKind::Unknown(_) => "???",
        })
    }
}

/// What a directory entry is: a file of the active volume, or a row of a
/// partition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File(FileKind),
    Partition(PartitionKind),
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EntryKind::File(kind) => kind.fmt(f),
            EntryKind::Partition(kind) => kind.fmt(f),
        }
    }
}

/// GEOS file types as stored in directory entries and info blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeosFileType {
    NonGeos,
    Basic,
    Assembler,
    DataFile,
    SystemFile,
    DeskAccessory,
    Application,
    ApplicationData,
    FontFile,
    PrinterDriver,
    InputDriver,
    DiskDriver,
    SystemBootFile,
    Temporary,
    AutoExecuteFile,
    Undefined(u8),
}

impl GeosFileType {
    pub fn from_byte(byte: u8) -> GeosFileType {
        match byte {
            0x00 => GeosFileType::NonGeos,
            0x01 => GeosFileType::Basic,
            0x02 => GeosFileType::Assembler,
            0x03 => GeosFileType::DataFile,
            0x04 => GeosFileType::SystemFile,
            0x05 => GeosFileType::DeskAccessory,
            0x06 => GeosFileType::Application,
            0x07 => GeosFileType::ApplicationData,
            0x08 => GeosFileType::FontFile,
            0x09 => GeosFileType::PrinterDriver,
            0x0A => GeosFileType::InputDriver,
            0x0B => GeosFileType::DiskDriver,
            0x0C => GeosFileType::SystemBootFile,
            0x0D => GeosFileType::Temporary,
            0x0E => GeosFileType::AutoExecuteFile,
            other => GeosFileType::Undefined(other),
        }
    }
}

impl fmt::Display for GeosFileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s;
        f.write_str(match self {
            GeosFileType::NonGeos => "Non-GEOS",
            GeosFileType::Basic => "BASIC",
            GeosFileType::Assembler => "Assembler",
            GeosFileType::DataFile => "Data file",
            GeosFileType::SystemFile => "System File",
            GeosFileType::DeskAccessory => "Desk Accessory",
            GeosFileType::Application => "Application",
            GeosFileType::ApplicationData => "Application Data",
            GeosFileType::FontFile => "Font File",
            GeosFileType::PrinterDriver => "Printer Driver",
            GeosFileType::InputDriver => "Input Driver",
            GeosFileType::DiskDriver => "Disk Driver",
            GeosFileType::SystemBootFile => "System Boot File",
            GeosFileType::Temporary => "Temporary",
            GeosFileType::AutoExecuteFile => "Auto-Execute File",
            GeosFileType::Undefined(b) => {
                s = format!("Unknown(0x{:02x})", b);
                &s
            }
        })
    }
}

/// GEOS metadata of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeosMeta {
    /// Where the info block lives; may be unused when the file carries
    /// none.
    pub info_block: BlockAddr,
    pub file_type: GeosFileType,
    /// Set when the start block is a VLIR record map rather than data.
    pub is_vlir: bool,
}

/// A file timestamp. Stored years pivot at 83: values up to 83 mean
/// 20YY, later ones 19YY.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// The raw name bytes of a directory entry or header. The first shifted
/// space ends the proper name; anything after it up to the field length is
/// suffix text that CBM DOS renders after the closing quote.
#[derive(Clone, Copy)]
pub struct EntryName {
    bytes: [u8; HEADER_NAME_LENGTH],
    length: usize,
    end: usize,
}

impl EntryName {
    pub(crate) fn from_bytes(raw: &[u8]) -> EntryName {
        let length = raw.len().min(HEADER_NAME_LENGTH);
        let mut bytes = [0u8; HEADER_NAME_LENGTH];
        bytes[..length].copy_from_slice(&raw[..length]);
        let end = raw[..length]
            .iter()
            .position(|b| *b == SHIFTED_SPACE)
            .unwrap_or(length);
        EntryName { bytes, length, end }
    }

    /// The proper name, up to the first shifted space.
    pub fn name(&self) -> &[u8] {
        &self.bytes[..self.end]
    }

    /// Trailing bytes after the name delimiter.
    pub fn suffix(&self) -> &[u8] {
        if self.end < self.length {
            &self.bytes[self.end + 1..self.length]
        } else {
            &[]
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.length]
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&util::printable(self.name()))
    }
}

impl fmt::Debug for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", util::printable(self.as_bytes()))
    }
}

/// The directory header: disk name and the free-block total. A partition
/// table has no header.
pub struct DirHeader {
    pub name: EntryName,
    pub blocks_free: usize,
    pub is_geos: bool,
}

/// One directory entry.
#[derive(Clone)]
pub struct DirEntry {
    pub name: EntryName,
    pub kind: EntryKind,
    pub locked: bool,
    pub closed: bool,
    /// First block of the file. For GEOS VLIR files this is the record
    /// map, which in turn points at the record streams.
    pub start: BlockAddr,
    /// For REL files, the first side-sector block; on formats with a super
    /// side-sector (1581, CMD) it points there instead.
    pub rel_side_sector: BlockAddr,
    pub rel_record_length: u16,
    /// Block count as declared by the directory.
    pub block_count: u16,
    pub datetime: Option<DateTime>,
    pub geos: Option<GeosMeta>,
    /// Ordinal of this entry within the enumeration.
    pub index: usize,
}

impl DirEntry {
    pub fn is_geos(&self) -> bool {
        self.geos.is_some()
    }
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let quoted = format!("\"{}\"{}", self.name, util::printable(self.name.suffix()));
        write!(
            f,
            "{:<5} {:<18}{}{}{}",
            self.block_count,
            quoted,
            if self.closed { ' ' } else { '*' },
            self.kind,
            if self.locked { '<' } else { ' ' },
        )?;
        if f.alternate() {
            if let Some(datetime) = &self.datetime {
                write!(f, " {}", datetime)?;
            }
            if let Some(geos) = &self.geos {
                write!(
                    f,
                    " GEOS({}{})",
                    geos.file_type,
                    if geos.is_vlir { ", VLIR" } else { "" }
                )?;
            }
        }
        Ok(())
    }
}

/// True when the 32-byte slot holds no entry at all: type byte zero, no
/// name, no start track.
fn slot_is_empty(raw: &[u8]) -> bool {
    raw[ENTRY_TYPE] == 0 && raw[ENTRY_NAME] == 0 && raw[ENTRY_START_TRACK] == 0
}

fn parse_datetime(raw: &[u8]) -> Option<DateTime> {
    if raw[ENTRY_YEAR] == 0
        && raw[ENTRY_MONTH] == 0
        && raw[ENTRY_DAY] == 0
        && raw[ENTRY_HOUR] == 0
        && raw[ENTRY_MINUTE] == 0
    {
        return None;
    }
    let year = raw[ENTRY_YEAR] as u16;
    let year = if year > 83 { year + 1900 } else { year + 2000 };
    Some(DateTime {
        year,
        month: raw[ENTRY_MONTH],
        day: raw[ENTRY_DAY],
        hour: raw[ENTRY_HOUR],
        minute: raw[ENTRY_MINUTE],
    })
}

/// Decode one directory slot. Returns `None` for empty slots.
pub(crate) fn parse_entry(s: &Settings, raw: &[u8], index: usize) -> Option<DirEntry> {
    assert_eq!(raw.len(), ENTRY_SIZE);

    if slot_is_empty(raw) {
        return None;
    }

    let name = EntryName::from_bytes(&raw[ENTRY_NAME..ENTRY_NAME + ENTRY_NAME_LENGTH]);

    if s.is_partition_table {
        // Partition rows address 512-byte physical blocks; scale to the
        // 256-byte blocks used everywhere else.
        let raw_start = raw[ENTRY_PARTITION_START_LOW] as u32
            | (raw[ENTRY_PARTITION_START_HIGH] as u32) << 8;
        let raw_count = raw[ENTRY_PARTITION_BLOCKS_LOW] as u32
            | (raw[ENTRY_PARTITION_BLOCKS_HIGH] as u32) << 8;
        let start_lba = (raw_start * 2 + 1).min(u16::MAX as u32) as u16;
        let start = address::from_lba(s, start_lba).unwrap_or(BlockAddr {
            track: 0,
            sector: 0,
            lba: start_lba,
        });
        return Some(DirEntry {
            name,
            kind: EntryKind::Partition(PartitionKind::from_byte(raw[ENTRY_TYPE])),
            locked: false,
            closed: true,
            start,
            rel_side_sector: BlockAddr::UNUSED,
            rel_record_length: 0,
            block_count: (raw_count * 2).min(u16::MAX as u32) as u16,
            datetime: None,
            geos: None,
            index,
        });
    }

    let type_byte = raw[ENTRY_TYPE];
    let kind = FileKind::from_byte(type_byte);
    let start_track = raw[ENTRY_START_TRACK];
    let start_sector = raw[ENTRY_START_SECTOR];
    let start = address::from_ts(s, start_track, start_sector).unwrap_or(BlockAddr {
        track: start_track,
        sector: start_sector,
        lba: 0,
    });

    // GEOS files hide in the DEL..USR range; REL files use the same bytes
    // for their side-sector pointer.
    let mut geos = None;
    let mut rel_side_sector = BlockAddr::UNUSED;
    let mut rel_record_length = 0;
    let geos_candidate = matches!(
        kind,
        FileKind::Del | FileKind::Seq | FileKind::Prg | FileKind::Usr
    );
    if geos_candidate && (raw[ENTRY_GEOS_FILETYPE] != 0 || raw[ENTRY_GEOS_VLIR] == 1) {
        let info_block = address::from_ts(s, raw[ENTRY_GEOS_INFO_TRACK], raw[ENTRY_GEOS_INFO_SECTOR])
            .unwrap_or(BlockAddr::UNUSED);
        geos = Some(GeosMeta {
            info_block,
            file_type: GeosFileType::from_byte(raw[ENTRY_GEOS_FILETYPE]),
            is_vlir: raw[ENTRY_GEOS_VLIR] == 1,
        });
    } else {
        rel_side_sector = address::from_ts(
            s,
            raw[ENTRY_SIDE_SECTOR_TRACK],
            raw[ENTRY_SIDE_SECTOR_SECTOR],
        )
        .unwrap_or(BlockAddr::UNUSED);
        rel_record_length = raw[ENTRY_REL_RECORD_LENGTH] as u16;
    }

    Some(DirEntry {
        name,
        kind: EntryKind::File(kind),
        locked: type_byte & TYPE_LOCKED != 0,
        closed: type_byte & TYPE_CLOSED != 0,
        start,
        rel_side_sector,
        rel_record_length,
        block_count: raw[ENTRY_BLOCKS_LOW] as u16 | (raw[ENTRY_BLOCKS_HIGH] as u16) << 8,
        datetime: parse_datetime(raw),
        geos,
        index,
    })
}

/// Read the directory header of the active volume.
pub(crate) fn header(image: &DiskImage) -> Result<Option<DirHeader>> {
    let s = image.settings();
    if s.is_partition_table {
        return Ok(None);
    }
    let block = image.block(s.info)?;
    let offset = s.diskname_offset.min(block.len());
    let take = HEADER_NAME_LENGTH.min(block.len() - offset);
    Ok(Some(DirHeader {
        name: EntryName::from_bytes(&block[offset..offset + take]),
        blocks_free: image.blocks_free(),
        is_geos: s.is_geos,
    }))
}

/// Iterates the directory of the active volume, skipping empty slots.
/// Enumeration ends at the chain terminator or when the chain's loop
/// detector fires.
pub struct DirIterator<'a> {
    image: &'a DiskImage,
    chain: Option<Chain<'a>>,
    offset: usize,
    index: usize,
    failed: bool,
}

impl<'a> DirIterator<'a> {
    pub(crate) fn new(image: &'a DiskImage) -> DirIterator<'a> {
        DirIterator {
            image,
            chain: None,
            offset: 0,
            index: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for DirIterator<'a> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Result<DirEntry>> {
        if self.failed {
            return None;
        }

        if self.chain.is_none() {
            let start = self.image.settings().dir;
            match Chain::start(self.image, start) {
                Ok(chain) => self.chain = Some(chain),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        loop {
            let chain = self.chain.as_mut().unwrap();
            let block_len = self.image.bytes_per_block();

            if self.offset + ENTRY_SIZE > block_len {
                chain.advance();
                if chain.is_done() {
                    return None;
                }
                self.offset = 0;
            }

            let data = match chain.data() {
                Ok(data) => data,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            let raw = &data[self.offset..self.offset + ENTRY_SIZE];
            self.offset += ENTRY_SIZE;

            if let Some(entry) = parse_entry(self.image.settings(), raw, self.index) {
                self.index += 1;
                return Some(Ok(entry));
            }
        }
    }
}

/// First and last block plus block count of the partition a directory
/// entry describes.
pub(crate) fn partition_span(
    s: &Settings,
    entry: &DirEntry,
) -> Result<(BlockAddr, BlockAddr, usize)> {
    if entry.start.lba == 0 || entry.block_count == 0 {
        return Err(DiskError::InvalidPartition);
    }
    let last_lba = entry.start.lba as u32 + entry.block_count as u32 - 1;
    if last_lba >= s.max_lba() as u32 {
        return Err(DiskError::InvalidPartition);
    }
    let last = address::from_lba(s, last_lba as u16)?;
    Ok((entry.start, last, entry.block_count as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name() {
        let name = EntryName::from_bytes(b"HELLO\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0");
        assert_eq!(name.name(), b"HELLO");
        assert_eq!(name.suffix(), b"\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0");

        // Appended text after the delimiter is preserved.
        let name = EntryName::from_bytes(b"A\xA0,8,1\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0\xA0");
        assert_eq!(name.name(), b"A");
        assert_eq!(&name.suffix()[..4], b",8,1");

        let name = EntryName::from_bytes(b"0123456789ABCDEF");
        assert_eq!(name.name(), b"0123456789ABCDEF");
        assert_eq!(name.suffix(), b"");
    }

    #[test]
    fn test_datetime_pivot() {
        let mut raw = [0u8; ENTRY_SIZE];
        assert_eq!(parse_datetime(&raw), None);

        raw[ENTRY_YEAR] = 83;
        raw[ENTRY_MONTH] = 6;
        raw[ENTRY_DAY] = 15;
        let dt = parse_datetime(&raw).unwrap();
        assert_eq!(dt.year, 2083);

        raw[ENTRY_YEAR] = 84;
        let dt = parse_datetime(&raw).unwrap();
        assert_eq!(dt.year, 1984);

        raw[ENTRY_YEAR] = 0;
        let dt = parse_datetime(&raw).unwrap();
        assert_eq!(dt.year, 2000);
    }

    #[test]
    fn test_file_kind() {
        assert_eq!(FileKind::from_byte(0x82), FileKind::Prg);
        assert_eq!(FileKind::from_byte(0xC1), FileKind::Seq);
        assert_eq!(FileKind::from_byte(0x84), FileKind::Rel);
        assert_eq!(FileKind::from_byte(0x85), FileKind::Partition1581);
        assert_eq!(FileKind::from_byte(0x86), FileKind::CmdNative);
        assert_eq!(FileKind::from_byte(0x8F), FileKind::Unknown(0x0F));
    }
}
