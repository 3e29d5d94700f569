//! Block addresses carry both the CBM (track, sector) form and the linear
//! block number (LBA) form, and every operation keeps the two in lockstep.
//! Tracks and LBAs are 1-based; sectors are 0-based. An LBA of 0 marks the
//! unused sentinel.

use std::fmt;

use crate::disk::error::{DiskError, Result};
use crate::disk::settings::{Addressing, Settings};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockAddr {
    pub track: u8,
    pub sector: u8,
    pub lba: u16,
}

impl BlockAddr {
    pub const UNUSED: BlockAddr = BlockAddr {
        track: 0,
        sector: 0,
        lba: 0,
    };

    #[inline]
    pub fn is_unused(&self) -> bool {
        self.lba == 0
    }
}

impl fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}({:03X})", self.track, self.sector, self.lba)
    }
}

pub(crate) fn ts_exists(s: &Settings, track: u8, sector: u8) -> bool {
    track > 0
        && track as u16 <= s.max_track as u16
        && (sector as u16) < s.max_sector
        && (sector as u16) < s.sectors_in_track(track)
}

pub(crate) fn lba_exists(s: &Settings, lba: u16) -> bool {
    lba > 0 && lba <= s.max_lba()
}

/// Build a full block address from a (track, sector) pair.
pub(crate) fn from_ts(s: &Settings, track: u8, sector: u8) -> Result<BlockAddr> {
    match s.ops.ts_to_lba(s, track, sector) {
        Some(lba) => Ok(BlockAddr { track, sector, lba }),
        None => Err(DiskError::InvalidLocation),
    }
}

/// Build a full block address from a linear block number.
pub(crate) fn from_lba(s: &Settings, lba: u16) -> Result<BlockAddr> {
    if lba == 0 {
        return Err(DiskError::InvalidLba);
    }
    match s.ops.lba_to_ts(s, lba) {
        Some((track, sector)) => Ok(BlockAddr { track, sector, lba }),
        None => Err(DiskError::InvalidLba),
    }
}

fn advance_impl(s: &Settings, block: &mut BlockAddr, in_track_only: bool) -> Result<()> {
    if block.lba == 0 || !ts_exists(s, block.track, block.sector) {
        return Err(DiskError::InvalidLocation);
    }

    // A renamed sub-area is a window into the enclosing image; walking past
    // its end must fail even though the frame geometry would allow it.
    if s.addressing == Addressing::Global
        && (block.lba as u32 + s.subdir_first.lba as u32 - 1) >= s.max_lba() as u32
    {
        return Err(DiskError::EndOfImage);
    }

    let mut track = block.track as u16;
    let mut sector = block.sector as u16 + 1;
    if sector >= s.sectors_in_track(block.track) {
        if in_track_only {
            return Err(DiskError::EndOfTrack);
        }
        sector = 0;
        track += 1;
        if track > s.max_track as u16 {
            return Err(DiskError::EndOfImage);
        }
    }

    block.track = track as u8;
    block.sector = sector as u8;
    block.lba += 1;
    Ok(())
}

/// Advance to the next block of the image, wrapping to the next track when
/// the current track ends.
pub(crate) fn advance(s: &Settings, block: &mut BlockAddr) -> Result<()> {
    advance_impl(s, block, false)
}

/// Advance to the next block of the current track.
pub(crate) fn advance_in_track(s: &Settings, block: &mut BlockAddr) -> Result<()> {
    advance_impl(s, block, true)
}

/// Add two block addresses as LBA math: `result <- result + adder - 1`,
/// treating `adder` as if it were block (1,0) of the image. If either
/// operand is unused, the other wins unchanged. This is the workhorse for
/// rebasing addresses into a partition.
pub(crate) fn add(s: &Settings, result: &mut BlockAddr, adder: BlockAddr) -> Result<()> {
    if adder.lba == 0 {
        // identity
    } else if result.lba == 0 {
        *result = adder;
    } else {
        *result = from_lba(s, result.lba + adder.lba - 1)?;
    }
    Ok(())
}
