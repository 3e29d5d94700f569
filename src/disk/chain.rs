//! Following link chains. A chain owns its own loop detector; once the
//! terminator or a revisited block is reached, `done` (and for revisits
//! also `loop`) latch and the chain stays on its last good block.

use crate::disk::address::BlockAddr;
use crate::disk::block::{BlockCursor, ChainLink};
use crate::disk::error::Result;
use crate::disk::looptrack::LoopDetector;
use crate::disk::DiskImage;

pub struct Chain<'a> {
    start: BlockAddr,
    cursor: BlockCursor<'a>,
    detector: LoopDetector,
    done: bool,
    looped: bool,
}

impl<'a> Chain<'a> {
    pub fn start(image: &'a DiskImage, start: BlockAddr) -> Result<Chain<'a>> {
        let cursor = BlockCursor::new(image, start)?;
        let mut detector = LoopDetector::new(image);
        detector.mark(start)?;
        Ok(Chain {
            start,
            cursor,
            detector,
            done: false,
            looped: false,
        })
    }

    #[inline]
    pub fn start_block(&self) -> BlockAddr {
        self.start
    }

    #[inline]
    pub fn current(&self) -> BlockAddr {
        self.cursor.address()
    }

    pub fn data(&self) -> Result<&'a [u8]> {
        self.cursor.data()
    }

    /// The successor of the current block, or the unused sentinel when the
    /// current block terminates the chain (or its link is unreadable).
    pub fn next(&self) -> BlockAddr {
        match self.cursor.next_block() {
            Ok(ChainLink::Next(addr)) => addr,
            _ => BlockAddr::UNUSED,
        }
    }

    /// Step to the successor block. Reaching the terminator latches
    /// `done`; reaching an already visited block latches `done` and
    /// `loop`, leaving the cursor on the last block before the revisit.
    pub fn advance(&mut self) {
        if self.done {
            return;
        }
        match self.cursor.next_block() {
            Ok(ChainLink::Next(next)) => match self.detector.mark(next) {
                Ok(true) => {
                    self.looped = true;
                    self.done = true;
                }
                Ok(false) => {
                    if self.cursor.set_to(next).is_err() {
                        self.done = true;
                    }
                }
                Err(_) => {
                    self.done = true;
                }
            },
            Ok(ChainLink::Tail(_)) | Err(_) => {
                self.done = true;
            }
        }
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[inline]
    pub fn is_loop(&self) -> bool {
        self.looped
    }

    /// For the current block: 0 if it is a full block with a real
    /// successor, or the number of valid bytes (1..=255) if it is the tail.
    pub fn last_result(&self) -> Result<usize> {
        match self.cursor.next_block()? {
            ChainLink::Next(_) => Ok(0),
            ChainLink::Tail(used) => Ok(used - 1),
        }
    }

    /// Total used bytes of the current block, link bytes included.
    pub fn block_used(&self) -> Result<usize> {
        match self.cursor.next_block()? {
            ChainLink::Next(_) => Ok(self.data()?.len()),
            ChainLink::Tail(used) => Ok(used),
        }
    }
}
