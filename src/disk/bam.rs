//! Decoding the Block Availability Map. Every format stores the BAM as a
//! per-track run of bitmap bytes somewhere on disk, described here by one
//! or more selectors; most formats add a per-track free-block counter in
//! front of or near the bitmap.

use log::debug;

use crate::disk::address::BlockAddr;
use crate::disk::error::{DiskError, Result};
use crate::disk::settings::Settings;
use crate::disk::validation::ValidationError;
use crate::disk::DiskImage;

/// The widest supported per-track bitmap: 32 bytes = 256 sectors (CMD
/// native partitions).
pub(crate) const BAM_MASK_COUNT: usize = 0x20;

/// Free-state of one block as told by the BAM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BamState {
    /// The state could not be determined (no BAM on this frame).
    Unknown,
    /// Free, and the block payload still matches the freshly-formatted
    /// pattern.
    ReallyFree,
    /// Free, but the block contains some data.
    Free,
    Used,
    /// The queried block does not exist in the active geometry.
    DoesNotExist,
}

/// Locates the BAM bytes for a range of tracks within one block. A
/// selector with `bytes_per_track == 0` locates the per-track free-block
/// counter instead of the bitmap.
#[derive(Clone, Copy)]
pub(crate) struct BamSelector {
    /// First track covered by this selector.
    pub start_track: u8,
    /// The block holding the bytes. Resolved to a full address when the
    /// frame is initialized.
    pub block: BlockAddr,
    /// Offset of this selector's region within the block.
    pub offset: usize,
    /// Bytes between consecutive tracks.
    pub stride: usize,
    /// Bitmap bytes per track, or 0 for a counter selector.
    pub bytes_per_track: usize,
    /// CMD/DNP images store bit 0 as the numerically highest sector.
    pub reverse: bool,
}

impl BamSelector {
    pub fn new(
        start_track: u8,
        track: u8,
        sector: u8,
        offset: usize,
        stride: usize,
        bytes_per_track: usize,
    ) -> BamSelector {
        BamSelector {
            start_track,
            block: BlockAddr {
                track,
                sector,
                lba: 0,
            },
            offset,
            stride,
            bytes_per_track,
            reverse: false,
        }
    }

    pub fn reversed(mut self) -> BamSelector {
        self.reverse = true;
        self
    }
}

/// Resolve the LBA part of every selector block address. Called once the
/// frame geometry is in place.
pub(crate) fn bind_selectors(frame: &mut Settings) -> Result<()> {
    for i in 0..frame.bam.len() {
        let block = frame.bam[i].block;
        frame.bam[i].block = crate::disk::address::from_ts(frame, block.track, block.sector)?;
    }
    for i in 0..frame.bam_counter.len() {
        let block = frame.bam_counter[i].block;
        frame.bam_counter[i].block =
            crate::disk::address::from_ts(frame, block.track, block.sector)?;
    }
    Ok(())
}

fn reverse_bit_order(input: u8) -> u8 {
    let mut input = input;
    let mut output = 0;
    for _ in 0..8 {
        output <<= 1;
        output |= input & 1;
        input >>= 1;
    }
    output
}

/// The bitmap of one track in little-endian order: bit `s` of the mask
/// gives the state of sector `s`, 1 = free.
pub(crate) struct TrackMask {
    pub mask: [u8; BAM_MASK_COUNT],
}

impl TrackMask {
    pub fn popcount(&self) -> u16 {
        self.mask.iter().map(|b| b.count_ones() as u16).sum()
    }

    pub fn is_free(&self, sector: u8) -> bool {
        self.mask[sector as usize / 8] & (1 << (sector % 8)) != 0
    }
}

/// Find the selector responsible for a track: the one with the largest
/// `start_track` not beyond it. Selectors are kept sorted by start track.
fn selector_for_track(selectors: &[BamSelector], track: u8) -> Option<usize> {
    if selectors.is_empty() {
        return None;
    }
    let mut index = 0;
    while index < selectors.len() - 1 {
        if track < selectors[index + 1].start_track {
            break;
        }
        index += 1;
    }
    Some(index)
}

pub(crate) fn mask_of_track(image: &DiskImage, track: u8) -> Result<TrackMask> {
    let s = image.settings();
    let index = selector_for_track(&s.bam, track).ok_or(DiskError::InvalidLocation)?;
    let selector = &s.bam[index];

    let offset = selector.offset + (track - selector.start_track) as usize * selector.stride;
    let block = image.block(selector.block)?;
    let count = selector.bytes_per_track.min(BAM_MASK_COUNT);
    if offset + count > block.len() {
        return Err(DiskError::InvalidOffset);
    }

    let mut mask = [0u8; BAM_MASK_COUNT];
    for i in 0..count {
        let byte = block[offset + i];
        mask[i] = if selector.reverse {
            reverse_bit_order(byte)
        } else {
            byte
        };
    }
    Ok(TrackMask { mask })
}

fn counter_of_track(image: &DiskImage, track: u8) -> u16 {
    let s = image.settings();
    if s.bam_counter.is_empty() {
        // No stored counters on this format; derive the count from the
        // bitmap instead.
        return match mask_of_track(image, track) {
            Ok(mask) => mask.popcount(),
            Err(_) => 0,
        };
    }
    let index = match selector_for_track(&s.bam_counter, track) {
        Some(index) => index,
        None => return 0,
    };
    let selector = &s.bam_counter[index];
    let offset = selector.offset + (track - selector.start_track) as usize * selector.stride;
    match image.block(selector.block) {
        Ok(block) => block.get(offset).copied().unwrap_or(0) as u16,
        Err(_) => 0,
    }
}

/// Check whether the block payload matches the freshly-formatted pattern:
/// either all zero, or everything except the first byte set to 1. The 1541
/// leaves the GCR residue 0x4B in the first byte on most tracks.
pub(crate) fn really_unused(image: &DiskImage, block: BlockAddr) -> bool {
    let data = match image.block(block) {
        Ok(data) => data,
        Err(_) => return false,
    };
    match data[2] {
        1 => data[1..].iter().all(|b| *b == 1),
        0 => data.iter().all(|b| *b == 0),
        _ => false,
    }
}

/// The BAM state of one block.
pub(crate) fn state(image: &DiskImage, block: BlockAddr) -> BamState {
    let s = image.settings();
    if s.bam.is_empty() {
        return BamState::Unknown;
    }
    if block.track == 0
        || block.track as u16 > s.max_track as u16
        || (block.sector as u16) >= s.sectors_in_track(block.track)
    {
        return BamState::DoesNotExist;
    }
    let mask = match mask_of_track(image, block.track) {
        Ok(mask) => mask,
        Err(_) => return BamState::Unknown,
    };
    if !mask.is_free(block.sector) {
        BamState::Used
    } else if really_unused(image, block) {
        BamState::ReallyFree
    } else {
        BamState::Free
    }
}

/// Check the BAM for internal consistency: no free bits for sectors that
/// do not exist, and stored free counts that match the bitmaps.
pub(crate) fn check_consistency(image: &DiskImage) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let s = image.settings();
    if s.bam.is_empty() {
        debug!("no BAM on this volume, skipping consistency check");
        return errors;
    }

    for track in 1..=s.max_track {
        let mask = match mask_of_track(image, track) {
            Ok(mask) => mask,
            Err(_) => {
                errors.push(ValidationError::BamUnreadable { track });
                continue;
            }
        };
        let sectors = s.sectors_in_track(track);
        let counter = counter_of_track(image, track);

        // Any "free" bit beyond the last sector of the track is bogus.
        let mut remaining = sectors;
        for byte in mask.mask.iter() {
            if remaining >= 8 {
                remaining -= 8;
            } else {
                let disallowed = 0xFFu8 << remaining;
                if byte & disallowed != 0 {
                    errors.push(ValidationError::BamTrackBits { track, sectors });
                    break;
                }
                remaining = 0;
            }
        }

        if counter > sectors {
            errors.push(ValidationError::BamCounterRange {
                track,
                counter,
                sectors,
            });
        }
        let popcount = mask.popcount();
        if popcount != counter {
            errors.push(ValidationError::BamCounterMismatch {
                track,
                counter,
                popcount,
            });
        }
    }
    errors
}

/// Sum the free-block counters over all tracks that do not hold the
/// directory. This is the "blocks free" figure of a directory listing.
pub(crate) fn blocks_free(image: &DiskImage) -> usize {
    let s = image.settings();
    let mut count = 0usize;
    for track in 1..=s.max_track {
        if track == s.dir_tracks[0] || track == s.dir_tracks[1] {
            continue;
        }
        count += counter_of_track(image, track) as usize;
    }
    count
}

pub(crate) fn free_on_track(image: &DiskImage, track: u8) -> u16 {
    counter_of_track(image, track)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_bit_order() {
        assert_eq!(reverse_bit_order(0x01), 0x80);
        assert_eq!(reverse_bit_order(0x80), 0x01);
        assert_eq!(reverse_bit_order(0xFE), 0x7F);
        assert_eq!(reverse_bit_order(0xA5), 0xA5);
    }

    #[test]
    fn test_track_mask() {
        let mut mask = TrackMask {
            mask: [0; BAM_MASK_COUNT],
        };
        mask.mask[0] = 0xF9;
        mask.mask[1] = 0x17;
        assert_eq!(mask.popcount(), 5 + 4);
        assert!(mask.is_free(0));
        assert!(!mask.is_free(1));
        assert!(!mask.is_free(2));
        assert!(mask.is_free(3));
        assert!(mask.is_free(8));
        assert!(!mask.is_free(15));
    }

    #[test]
    fn test_selector_for_track() {
        let selectors = [
            BamSelector::new(1, 18, 0, 0x05, 4, 3),
            BamSelector::new(36, 53, 0, 0x00, 3, 3),
        ];
        assert_eq!(selector_for_track(&selectors, 1), Some(0));
        assert_eq!(selector_for_track(&selectors, 35), Some(0));
        assert_eq!(selector_for_track(&selectors, 36), Some(1));
        assert_eq!(selector_for_track(&selectors, 70), Some(1));
        assert_eq!(selector_for_track(&[], 1), None);
    }
}
