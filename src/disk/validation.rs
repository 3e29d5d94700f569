//! Whole-image validation: rebuild the allocation implied by the directory
//! and every link chain, verify REL side-sectors and GEOS record maps, and
//! cross-check the result against the on-disk BAM. Nothing here aborts;
//! every inconsistency is logged and accumulated, and an empty result means
//! a consistent image.

use std::fmt;

use log::warn;

use crate::disk::address::{self, BlockAddr};
use crate::disk::bam::{self, BamState};
use crate::disk::chain::Chain;
use crate::disk::directory::{DirEntry, EntryKind, FileKind, PartitionKind};
use crate::disk::error::DiskError;
use crate::disk::fat::Fat;
use crate::disk::settings::Settings;
use crate::disk::DiskImage;
use crate::util;

/// One inconsistency found while validating a disk image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// A link chain closed back on itself.
    ChainLoop { start: BlockAddr, at: BlockAddr },
    /// A block is claimed by more than one chain.
    BlockShared { start: BlockAddr, at: BlockAddr },
    /// The BAM of a track could not be read.
    BamUnreadable { track: u8 },
    /// Free bits set for sectors beyond the end of the track.
    BamTrackBits { track: u8, sectors: u16 },
    /// The stored free count does not match the bitmap.
    BamCounterMismatch {
        track: u8,
        counter: u16,
        popcount: u16,
    },
    /// The stored free count exceeds the sectors on the track.
    BamCounterRange {
        track: u8,
        counter: u16,
        sectors: u16,
    },
    /// A chain uses the block but the BAM says it is free.
    UsedButFreeInBam { at: BlockAddr },
    /// The BAM says the block is used but no chain claims it.
    FreeButUsedInBam { at: BlockAddr },
    /// The directory declares a different block count than the chains
    /// actually cover.
    BlockCountMismatch {
        name: String,
        declared: u16,
        counted: usize,
    },
    /// A partition extends past the end of the image.
    PartitionOverrun { at: BlockAddr, excess: usize },
    /// The super side-sector's link does not match its first group
    /// pointer.
    SuperSideSectorLinkMismatch { at: BlockAddr },
    /// The super side-sector marker byte is not 0xFE.
    SuperSideSectorBadMarker { at: BlockAddr, value: u8 },
    /// Non-zero bytes after the last populated group slot.
    SuperSideSectorTrailingData { at: BlockAddr, offset: usize },
    /// More side-sector groups than the super side-sector can hold.
    SuperSideSectorOverflow { at: BlockAddr },
    /// The super side-sector names a different block for this group.
    SuperSideSectorGroupMismatch {
        expected: BlockAddr,
        found: (u8, u8),
    },
    /// A side-sector's group list differs from the first of its group.
    SideSectorCommonMismatch { index: usize, slot: usize },
    /// A side-sector does not appear at its own slot of the group list.
    SideSectorMisplaced { index: usize, at: BlockAddr },
    /// The record length stored in a side-sector differs from the
    /// directory.
    SideSectorRecordLength {
        index: usize,
        expected: u16,
        found: u8,
    },
    /// More side-sectors than a file without a super side-sector may have.
    SideSectorCountExceeded { index: usize, at: BlockAddr },
    /// The side-sector links past the end of the data chain.
    SideSectorExtraLink { link: (u8, u8) },
    /// The side-sector ends but the data chain continues.
    SideSectorFileContinues { at: BlockAddr },
    /// A side-sector link disagrees with the data chain.
    SideSectorChainMismatch {
        file_at: BlockAddr,
        link: (u8, u8),
    },
    /// Non-zero link pairs after the side-sector terminator.
    SideSectorTrailingData { at: BlockAddr },
    /// Non-zero data after the record map terminator of a VLIR file.
    VlirTrailingData { at: BlockAddr, offset: usize },
    /// A file whose structure could not be walked at all.
    FileScanError { name: String, error: DiskError },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::ValidationError::*;
        match self {
            ChainLoop { start, at } => {
                write!(f, "Found loop following from {} at {}.", start, at)
            }
            BlockShared { start, at } => write!(
                f,
                "Marking already marked block following from {} at {}.",
                start, at
            ),
            BamUnreadable { track } => write!(f, "Track {}: BAM is unreadable.", track),
            BamTrackBits { track, sectors } => write!(
                f,
                "Track {}: Bits marked which are not allowed, no. of sectors is {}.",
                track, sectors
            ),
            BamCounterMismatch {
                track,
                counter,
                popcount,
            } => write!(
                f,
                "Track {}: Reported {} free blocks, but there are {}.",
                track, counter, popcount
            ),
            BamCounterRange {
                track,
                counter,
                sectors,
            } => write!(
                f,
                "Track {}: Number of free blocks is reported as {}, but no. of sectors is {}.",
                track, counter, sectors
            ),
            UsedButFreeInBam { at } => write!(
                f,
                "Block {} is marked as used, but the BAM tells us it is empty.",
                at
            ),
            FreeButUsedInBam { at } => write!(
                f,
                "Block {} is not marked as used, but the BAM tells us it is used.",
                at
            ),
            BlockCountMismatch {
                name,
                declared,
                counted,
            } => write!(
                f,
                "File \"{}\" reports {} blocks, but occupies {} blocks.",
                name, declared, counted
            ),
            PartitionOverrun { at, excess } => write!(
                f,
                "Partition at {} exceeds the end of the disk by {} blocks.",
                at, excess
            ),
            SuperSideSectorLinkMismatch { at } => write!(
                f,
                "Super side-sector at {} links elsewhere than its first group.",
                at
            ),
            SuperSideSectorBadMarker { at, value } => write!(
                f,
                "Super side-sector at {} is not marked as such, it has number 0x{:02X} instead of 0xFE.",
                at, value
            ),
            SuperSideSectorTrailingData { at, offset } => write!(
                f,
                "Super side-sector at {} contains data after end at offset 0x{:02X}.",
                at, offset
            ),
            SuperSideSectorOverflow { at } => {
                write!(f, "Super side-sector at {} is overflowed!", at)
            }
            SuperSideSectorGroupMismatch { expected, found } => write!(
                f,
                "Super side-sector says group starts at {}/{}, but it is at {}!",
                found.0, found.1, expected
            ),
            SideSectorCommonMismatch { index, slot } => write!(
                f,
                "Side-sector {} differs from the 1st of its group in slot {}.",
                index, slot
            ),
            SideSectorMisplaced { index, at } => write!(
                f,
                "Side-sector {} at {} is not correctly mentioned in the side-sector common area!",
                index, at
            ),
            SideSectorRecordLength {
                index,
                expected,
                found,
            } => write!(
                f,
                "Record-length in side-sector {} is wrong! Should be {}, but is {}.",
                index, expected, found
            ),
            SideSectorCountExceeded { index, at } => {
                write!(f, "We have side-sector no. {} at {}!", index, at)
            }
            SideSectorExtraLink { link } => write!(
                f,
                "End of file, but link in side-sector to {}/{}.",
                link.0, link.1
            ),
            SideSectorFileContinues { at } => write!(
                f,
                "Link in side-sector is done, but the file continues at {}.",
                at
            ),
            SideSectorChainMismatch { file_at, link } => write!(
                f,
                "File has block {}, but the side-sector links to {}/{}.",
                file_at, link.0, link.1
            ),
            SideSectorTrailingData { at } => {
                write!(f, "Extra data after end in side-sector block at {}.", at)
            }
            VlirTrailingData { at, offset } => write!(
                f,
                "VLIR record block at {} contains data after offset 0x{:02X}.",
                at, offset
            ),
            FileScanError { name, error } => {
                write!(f, "Error scanning \"{}\": {}", name, error)
            }
        }
    }
}

fn push(errors: &mut Vec<ValidationError>, error: ValidationError) {
    warn!("{}", error);
    errors.push(error);
}

/// Claim one block for a chain in the derived allocation, reporting the
/// block as shared if another chain already owns it.
pub(crate) fn mark_block(
    fat: &mut Fat,
    start: BlockAddr,
    current: BlockAddr,
    target: BlockAddr,
    errors: &mut Vec<ValidationError>,
) {
    if fat.is_used(current) {
        push(errors, ValidationError::BlockShared { start, at: current });
    }
    fat.set(current, target);
}

/// Follow a chain from `start`, claiming every block. Returns the number
/// of blocks visited.
fn mark_chain(
    image: &DiskImage,
    fat: &mut Fat,
    start: BlockAddr,
    name: &str,
    errors: &mut Vec<ValidationError>,
) -> usize {
    let mut chain = match Chain::start(image, start) {
        Ok(chain) => chain,
        Err(error) => {
            push(
                errors,
                ValidationError::FileScanError {
                    name: name.to_string(),
                    error,
                },
            );
            return 0;
        }
    };
    let mut count = 0;
    loop {
        if chain.is_done() {
            break;
        }
        mark_block(fat, start, chain.current(), chain.next(), errors);
        count += 1;
        chain.advance();
    }
    if chain.is_loop() {
        push(
            errors,
            ValidationError::ChainLoop {
                start,
                at: chain.current(),
            },
        );
    }
    count
}

/// Claim a contiguous run of blocks, as used for partitions. Partition
/// rows address the image directly, so this works in plain LBA arithmetic
/// without the frame's addressing base.
pub(crate) fn mark_partition_span(
    s: &Settings,
    fat: &mut Fat,
    start: BlockAddr,
    count: usize,
    errors: &mut Vec<ValidationError>,
) {
    let max_lba = s.max_lba();
    let mut lba = start.lba;
    for i in 0..count {
        if lba == 0 || lba > max_lba {
            push(
                errors,
                ValidationError::PartitionOverrun {
                    at: start,
                    excess: count - i,
                },
            );
            break;
        }
        let current = address::from_lba(s, lba).unwrap_or(BlockAddr {
            track: 0,
            sector: 0,
            lba,
        });
        let target = if i + 1 == count || lba == max_lba {
            BlockAddr::UNUSED
        } else {
            BlockAddr {
                track: 0,
                sector: 0,
                lba: lba + 1,
            }
        };
        mark_block(fat, start, current, target, errors);
        lba += 1;
    }
}

const SSS_OFFSET_LINK: usize = 0x00;
const SSS_OFFSET_MARKER: usize = 0x02;
const SSS_OFFSET_GROUP0: usize = 0x03;
const SSS_MARKER: u8 = 0xFE;

const SS_OFFSET_RECORD_LENGTH: usize = 0x03;
const SS_OFFSET_GROUP_LIST: usize = 0x04;
const SS_OFFSET_CHAIN: usize = 0x10;
const SS_GROUP_SIZE: usize = 6;

/// Walk one side-sector's chain links (offsets 0x10..) in lockstep with
/// the file's data chain.
fn validate_sidesector_chain<'a>(
    data: &[u8],
    chain_file: &mut Chain<'a>,
    errors: &mut Vec<ValidationError>,
) {
    let mut offset = SS_OFFSET_CHAIN;
    while offset < 0x100 {
        let link = (data[offset], data[offset + 1]);
        let current = chain_file.current();
        if link != (0, 0) {
            if chain_file.is_done() {
                push(errors, ValidationError::SideSectorExtraLink { link });
            } else {
                if (current.track, current.sector) != link {
                    push(
                        errors,
                        ValidationError::SideSectorChainMismatch {
                            file_at: current,
                            link,
                        },
                    );
                }
                chain_file.advance();
            }
        } else {
            if !chain_file.is_done() {
                push(
                    errors,
                    ValidationError::SideSectorFileContinues { at: current },
                );
            }
            // Everything after the terminator must stay zero.
            while offset < 0x100 {
                if data[offset] != 0 || data[offset + 1] != 0 {
                    push(errors, ValidationError::SideSectorTrailingData { at: current });
                    break;
                }
                offset += 2;
            }
            break;
        }
        offset += 2;
    }
}

/// Validate the index structure of a REL file: the optional super
/// side-sector, the side-sector groups, and their agreement with the data
/// chain. Returns the number of index blocks claimed.
fn validate_rel_file(
    image: &DiskImage,
    fat: &mut Fat,
    entry: &DirEntry,
    errors: &mut Vec<ValidationError>,
) -> usize {
    let name = util::printable(entry.name.name());
    let mut count = 0usize;

    let mut first_group_block = entry.rel_side_sector;
    let mut super_chain: Option<Chain> = None;
    let mut super_offset = 0usize;

    if image.settings().has_super_sidesector {
        let chain = match Chain::start(image, entry.rel_side_sector) {
            Ok(chain) => chain,
            Err(error) => {
                push(errors, ValidationError::FileScanError { name, error });
                return count;
            }
        };
        mark_block(
            fat,
            entry.rel_side_sector,
            entry.rel_side_sector,
            chain.next(),
            errors,
        );
        count += 1;

        if let Ok(data) = chain.data() {
            let at = chain.current();
            if data[SSS_OFFSET_LINK] != data[SSS_OFFSET_GROUP0]
                || data[SSS_OFFSET_LINK + 1] != data[SSS_OFFSET_GROUP0 + 1]
            {
                push(errors, ValidationError::SuperSideSectorLinkMismatch { at });
            }
            if data[SSS_OFFSET_MARKER] != SSS_MARKER {
                push(
                    errors,
                    ValidationError::SuperSideSectorBadMarker {
                        at,
                        value: data[SSS_OFFSET_MARKER],
                    },
                );
            }
        }

        first_group_block = chain.next();
        super_offset = SSS_OFFSET_GROUP0;
        super_chain = Some(chain);
    }

    let mut chain_file = match Chain::start(image, entry.start) {
        Ok(chain) => chain,
        Err(error) => {
            push(errors, ValidationError::FileScanError { name, error });
            return count;
        }
    };

    let mut chain_ss = match Chain::start(image, first_group_block) {
        Ok(chain) => chain,
        Err(error) => {
            push(errors, ValidationError::FileScanError { name, error });
            return count;
        }
    };

    let mut first_data: &[u8] = &[];
    let mut index = 0usize;
    loop {
        if chain_ss.is_done() {
            break;
        }
        count += 1;
        mark_block(
            fat,
            entry.rel_side_sector,
            chain_ss.current(),
            chain_ss.next(),
            errors,
        );

        let data = match chain_ss.data() {
            Ok(data) => data,
            Err(_) => break,
        };
        let current = chain_ss.current();

        if index % SS_GROUP_SIZE == 0 {
            // First member of a six-group; the others are compared against
            // it, and the super side-sector must point at it.
            first_data = data;
            match &super_chain {
                None => {
                    if index != 0 {
                        push(
                            errors,
                            ValidationError::SideSectorCountExceeded { index, at: current },
                        );
                    }
                }
                Some(sc) => {
                    if super_offset >= 0xFF {
                        push(
                            errors,
                            ValidationError::SuperSideSectorOverflow {
                                at: sc.current(),
                            },
                        );
                    } else if let Ok(super_data) = sc.data() {
                        if super_data[super_offset] != current.track
                            || super_data[super_offset + 1] != current.sector
                        {
                            push(
                                errors,
                                ValidationError::SuperSideSectorGroupMismatch {
                                    expected: current,
                                    found: (super_data[super_offset], super_data[super_offset + 1]),
                                },
                            );
                        }
                        super_offset += 2;
                    }
                }
            }
        }

        // Every member of a group carries the same six-slot list of the
        // group members.
        for slot in 0..SS_GROUP_SIZE {
            let offset = SS_OFFSET_GROUP_LIST + 2 * slot;
            if data[offset] != first_data[offset] || data[offset + 1] != first_data[offset + 1] {
                push(
                    errors,
                    ValidationError::SideSectorCommonMismatch { index, slot },
                );
            }
        }
        let own_slot = SS_OFFSET_GROUP_LIST + 2 * (index % SS_GROUP_SIZE);
        if data[own_slot] != current.track || data[own_slot + 1] != current.sector {
            push(
                errors,
                ValidationError::SideSectorMisplaced { index, at: current },
            );
        }
        if data[SS_OFFSET_RECORD_LENGTH] as u16 != entry.rel_record_length {
            push(
                errors,
                ValidationError::SideSectorRecordLength {
                    index,
                    expected: entry.rel_record_length,
                    found: data[SS_OFFSET_RECORD_LENGTH],
                },
            );
        }

        validate_sidesector_chain(data, &mut chain_file, errors);

        chain_ss.advance();
        index += 1;
    }

    if let Some(sc) = super_chain {
        if let Ok(data) = sc.data() {
            for offset in super_offset..0x100 {
                if data[offset] != 0 {
                    push(
                        errors,
                        ValidationError::SuperSideSectorTrailingData {
                            at: sc.current(),
                            offset,
                        },
                    );
                    break;
                }
            }
        }
    }

    count
}

/// Validate the GEOS extras of an entry: the VLIR record map's chains and
/// the info block. Returns the number of blocks claimed.
fn validate_geos_file(
    image: &DiskImage,
    fat: &mut Fat,
    entry: &DirEntry,
    errors: &mut Vec<ValidationError>,
) -> usize {
    let geos = match &entry.geos {
        Some(geos) => *geos,
        None => return 0,
    };
    let name = util::printable(entry.name.name());
    let mut count = 0usize;

    if geos.is_vlir {
        // The start block is a record map: up to 127 (track, sector) pairs
        // from offset 2 on. (0,0) terminates; (0,0xFF) marks an absent
        // record.
        match Chain::start(image, entry.start) {
            Ok(chain) => {
                if let Ok(data) = chain.data() {
                    let mut offset = 2;
                    while offset < 0x100 {
                        let (track, sector) = (data[offset], data[offset + 1]);
                        if track == 0 && sector == 0 {
                            break;
                        }
                        if track == 0 && sector == 0xFF {
                            offset += 2;
                            continue;
                        }
                        match image.addr(track, sector) {
                            Ok(record) => {
                                count += mark_chain(image, fat, record, &name, errors);
                            }
                            Err(error) => {
                                push(
                                    errors,
                                    ValidationError::FileScanError {
                                        name: name.clone(),
                                        error,
                                    },
                                );
                            }
                        }
                        offset += 2;
                    }
                    while offset < 0x100 {
                        if data[offset] != 0 || data[offset + 1] != 0 {
                            push(
                                errors,
                                ValidationError::VlirTrailingData {
                                    at: entry.start,
                                    offset,
                                },
                            );
                            break;
                        }
                        offset += 2;
                    }
                }
            }
            Err(error) => {
                push(errors, ValidationError::FileScanError { name, error });
            }
        }
    }

    if geos.info_block.lba > 0 {
        mark_block(
            fat,
            geos.info_block,
            geos.info_block,
            BlockAddr::UNUSED,
            errors,
        );
        count += 1;
    }

    count
}

/// Validate one directory entry: claim its blocks and cross-check the
/// declared block count.
fn validate_entry(
    image: &DiskImage,
    fat: &mut Fat,
    entry: &DirEntry,
    errors: &mut Vec<ValidationError>,
) {
    let name = util::printable(entry.name.name());
    let mut counted;

    match entry.kind {
        EntryKind::File(FileKind::Partition1581)
        | EntryKind::Partition(PartitionKind::D64)
        | EntryKind::Partition(PartitionKind::D71)
        | EntryKind::Partition(PartitionKind::D81) => {
            // A partition is a contiguous area without implied structure;
            // claim its span without following any links.
            mark_partition_span(
                image.settings(),
                fat,
                entry.start,
                entry.block_count as usize,
                errors,
            );
            counted = entry.block_count as usize;
        }
        EntryKind::File(FileKind::CmdNative) => {
            // Native partition subtrees are not walked; their block count
            // cannot be verified either.
            return;
        }
        _ => {
            counted = mark_chain(image, fat, entry.start, &name, errors);
        }
    }

    if entry.kind == EntryKind::File(FileKind::Rel) {
        counted += validate_rel_file(image, fat, entry, errors);
    }
    if entry.geos.is_some() {
        counted += validate_geos_file(image, fat, entry, errors);
    }

    if entry.block_count as usize != counted {
        push(
            errors,
            ValidationError::BlockCountMismatch {
                name,
                declared: entry.block_count,
                counted,
            },
        );
    }
}

/// Compare the derived allocation with the on-disk BAM, block by block.
fn check_bam_equality(image: &DiskImage, fat: &Fat, errors: &mut Vec<ValidationError>) {
    let mut block = match image.addr(1, 0) {
        Ok(block) => block,
        Err(_) => return,
    };
    loop {
        let used_in_fat = fat.is_used(block);
        let used_in_bam = bam::state(image, block) == BamState::Used;
        if used_in_fat && !used_in_bam {
            push(errors, ValidationError::UsedButFreeInBam { at: block });
        } else if !used_in_fat && used_in_bam {
            push(errors, ValidationError::FreeButUsedInBam { at: block });
        }
        if image.advance(&mut block).is_err() {
            break;
        }
    }
}

pub(crate) fn validate(image: &mut DiskImage) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut fat = Fat::new(image.max_lba());
    let is_partition_table = image.settings().is_partition_table;

    if !is_partition_table {
        errors.extend(bam::check_consistency(image));

        // The info block's chain; on many formats it reaches the first
        // directory block too.
        let info = image.settings().info;
        mark_chain(image, &mut fat, info, "(header)", &mut errors);

        // The BAM chain, unless it coincides with the info block as on
        // D64/D71/D40.
        if let Some(selector) = image.settings().bam.first() {
            let bam_block = selector.block;
            if !fat.is_used(bam_block) {
                mark_chain(image, &mut fat, bam_block, "(BAM)", &mut errors);
            }
        }

        let border = image.settings().geos_border;
        if border.lba != 0 {
            mark_chain(image, &mut fat, border, "(GEOS border)", &mut errors);
        }

        let entries: Vec<DirEntry> = image
            .dir_iter()
            .filter_map(|entry| entry.ok())
            .collect();
        for entry in &entries {
            // Scratched files keep their slot but own no blocks anymore.
            if entry.kind == EntryKind::File(FileKind::Del) && !entry.closed && !entry.locked {
                continue;
            }
            validate_entry(image, &mut fat, entry, &mut errors);
        }
    }

    let ops = image.settings().ops;
    ops.bam_fixup(image, &mut fat, &mut errors);

    if !is_partition_table {
        check_bam_equality(image, &fat, &mut errors);
    }

    image.settings_mut().fat = Some(fat);
    errors
}
