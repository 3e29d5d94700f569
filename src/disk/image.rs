use std::fs::{self, File};
use std::path::Path;

use memmap::{Mmap, MmapOptions};

use crate::disk::error::{DiskError, Result};

/// Provide backing storage (file or memory) for disk images.
pub(crate) enum Image {
    ReadOnlyMap(Mmap),
    Memory(Box<[u8]>),
}

impl Image {
    pub fn from_bytes(buffer: &[u8]) -> Image {
        Image::Memory(buffer.to_vec().into_boxed_slice())
    }

    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Image> {
        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Image::ReadOnlyMap(mmap))
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Image::ReadOnlyMap(mmap) => &mmap[..],
            Image::Memory(array) => &array[..],
        }
    }

    pub fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        match self {
            Image::ReadOnlyMap(_) => Err(DiskError::ReadOnly),
            Image::Memory(array) => Ok(&mut array[..]),
        }
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.bytes())?;
        Ok(())
    }
}
