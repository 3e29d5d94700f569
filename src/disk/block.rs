//! Resolving block addresses to byte ranges of the raw buffer, and the
//! block cursor used to inspect one block at a time.

use crate::disk::address::{self, BlockAddr};
use crate::disk::error::{DiskError, Result};
use crate::disk::image::Image;
use crate::disk::settings::{Addressing, Settings};
use crate::disk::DiskImage;

pub use crate::disk::geometry::BLOCK_SIZE;

/// Compute the byte offset of a block within the raw buffer, honoring the
/// active frame's addressing mode.
pub(crate) fn resolve(s: &Settings, block: BlockAddr) -> Result<usize> {
    if block.lba == 0 {
        return Err(DiskError::InvalidLba);
    }
    let lba = match s.addressing {
        Addressing::Global => block.lba as usize + s.subdir_first.lba as usize - 1,
        Addressing::Direct | Addressing::Relative => block.lba as usize,
    };
    let offset = (lba - 1) * s.bytes_per_block + s.data_offset;
    if offset + s.bytes_per_block > s.raw_size {
        return Err(DiskError::InvalidOffset);
    }
    Ok(offset)
}

pub(crate) fn block_slice<'a>(s: &Settings, raw: &'a Image, block: BlockAddr) -> Result<&'a [u8]> {
    let offset = resolve(s, block)?;
    Ok(&raw.bytes()[offset..offset + s.bytes_per_block])
}

pub(crate) fn block_slice_mut<'a>(
    s: &Settings,
    raw: &'a mut Image,
    block: BlockAddr,
) -> Result<&'a mut [u8]> {
    let offset = resolve(s, block)?;
    let bytes = raw.bytes_mut()?;
    Ok(&mut bytes[offset..offset + s.bytes_per_block])
}

/// The first two bytes of every block link it to its successor. A zero
/// track marks the tail, with the second byte giving the index of the last
/// used byte; (0,0) would claim a tail that does not even cover its own
/// link and is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainLink {
    Next(BlockAddr),
    /// Used bytes in the tail block, counting the two link bytes: 2..=256.
    Tail(usize),
}

impl ChainLink {
    pub(crate) fn parse(s: &Settings, block: &[u8]) -> Result<ChainLink> {
        if block[0] == 0 {
            if block[1] < 1 {
                return Err(DiskError::InvalidChainLink);
            }
            Ok(ChainLink::Tail(block[1] as usize + 1))
        } else {
            address::from_ts(s, block[0], block[1])
                .map(ChainLink::Next)
                .map_err(|_| DiskError::InvalidChainLink)
        }
    }
}

/// A cursor over the blocks of an image. `advance` moves to the next
/// physical block; `follow` moves along the chain link instead.
pub struct BlockCursor<'a> {
    image: &'a DiskImage,
    addr: BlockAddr,
}

impl<'a> BlockCursor<'a> {
    pub fn new(image: &'a DiskImage, addr: BlockAddr) -> Result<BlockCursor<'a>> {
        resolve(image.settings(), addr)?;
        Ok(BlockCursor { image, addr })
    }

    pub fn from_ts(image: &'a DiskImage, track: u8, sector: u8) -> Result<BlockCursor<'a>> {
        let addr = image.addr(track, sector)?;
        Self::new(image, addr)
    }

    pub fn from_lba(image: &'a DiskImage, lba: u16) -> Result<BlockCursor<'a>> {
        let addr = image.addr_from_lba(lba)?;
        Self::new(image, addr)
    }

    #[inline]
    pub fn address(&self) -> BlockAddr {
        self.addr
    }

    pub fn data(&self) -> Result<&'a [u8]> {
        self.image.block(self.addr)
    }

    pub fn set_to(&mut self, addr: BlockAddr) -> Result<()> {
        resolve(self.image.settings(), addr)?;
        self.addr = addr;
        Ok(())
    }

    pub fn set_to_ts(&mut self, track: u8, sector: u8) -> Result<()> {
        let addr = self.image.addr(track, sector)?;
        self.set_to(addr)
    }

    pub fn set_to_lba(&mut self, lba: u16) -> Result<()> {
        let addr = self.image.addr_from_lba(lba)?;
        self.set_to(addr)
    }

    /// Move to the next physical block of the image.
    pub fn advance(&mut self) -> Result<()> {
        let mut addr = self.addr;
        self.image.advance(&mut addr)?;
        self.set_to(addr)
    }

    /// Read the link of the current block without moving.
    pub fn next_block(&self) -> Result<ChainLink> {
        ChainLink::parse(self.image.settings(), self.data()?)
    }

    /// Follow the link of the current block. On a tail block the cursor
    /// stays put and the tail is returned.
    pub fn follow(&mut self) -> Result<ChainLink> {
        let link = self.next_block()?;
        if let ChainLink::Next(next) = link {
            self.set_to(next)?;
        }
        Ok(link)
    }
}
