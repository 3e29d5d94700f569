use std::io;

/// Errors that can be returned from disk image operations.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum DiskError {
    #[error("bad track or sector")]
    InvalidLocation,
    #[error("bad linear block address")]
    InvalidLba,
    #[error("already at the last block of the image")]
    EndOfImage,
    #[error("already at the last sector of the track")]
    EndOfTrack,
    #[error("offset out of bounds")]
    InvalidOffset,
    #[error("write access attempted to read-only media")]
    ReadOnly,
    #[error("image size matches no known format")]
    UnknownFormat,
    #[error("image size does not fit the requested format")]
    InvalidLayout,
    #[error("chain loop detected")]
    ChainLoop,
    #[error("invalid chain link")]
    InvalidChainLink,
    #[error("directory entry is not an enterable partition")]
    NotAPartition,
    #[error("partition layout is invalid")]
    InvalidPartition,
    #[error("already at the root directory")]
    AtRootDirectory,
    #[error("file not found")]
    NotFound,
    #[error("buffer too small, {0} bytes required")]
    BufferTooSmall(usize),
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<io::Error> for DiskError {
    fn from(error: io::Error) -> DiskError {
        DiskError::Io(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiskError>;
