//! This is a Rust library for reading and validating disk images of the
//! Commodore 8-bit family, from the 2040/1541 5¼-inch drives up to the CMD
//! FD-2000/FD-4000 3½-inch drives.
//!
//! Features:
//!
//! * Open D40, D64 (35/40/42 track), D71, D80, D82, D81, and CMD D1M/D2M/D4M
//!   disk images, with or without an attached error map.
//! * Address blocks either as (track, sector) or as linear block numbers,
//!   with both representations kept in lockstep.
//! * Iterate directory entries, including GEOS files, REL files, 1581
//!   partitions, and the partition tables of CMD FD images.
//! * Change into partitions and subdirectories (1581 style and CMD style)
//!   and back out again.
//! * Decode the Block Availability Map (BAM) of every supported format,
//!   including the reverse-bit-order maps of CMD native partitions.
//! * Validate the consistency of a disk image: follow every file chain with
//!   loop detection, check REL side-sectors and GEOS VLIR record maps, and
//!   cross-check the derived allocation against the on-disk BAM.
//! * Read file contents as a byte stream.
//!
//! Current shortcomings:
//!
//! * The library does not create or delete files; the only mutation surface
//!   is writing whole blocks and writing the raw image back out.
//! * CMD native files inside a native partition's directory are enumerated
//!   but their chains are not followed.
//! * DHD, D60, D90, and D16 images are not supported.
//!
//! # Example
//!
//! The following example opens a disk image, prints the directory, and
//! validates the image:
//!
//! ```no_run
//! use cbmimg::disk::DiskImage;
//!
//! # fn main() -> cbmimg::Result<()> {
//! let mut image = DiskImage::open_path("demo.d64", None)?;
//!
//! if let Some(header) = image.dir_header()? {
//!     println!("0 \"{}\"", header.name);
//! }
//! let entries = image.dir_entries()?;
//! for entry in &entries {
//!     println!("{}", entry);
//! }
//!
//! for problem in image.validate() {
//!     eprintln!("{}", problem);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Design of disk image access
//!
//! Support for disk images is built in layers:
//!
//! 1. `Image` provides the backing storage for the raw bytes, either a
//!    mapped disk image file or an in-memory buffer.
//! 2. A stack of `Settings` frames describes the currently active logical
//!    volume: its geometry, its addressing mode, where its directory and BAM
//!    live, and the format adapter that interprets them. Opening an image
//!    creates the root frame; changing into a partition pushes another.
//! 3. `DiskImage` is the public handle tying storage and frames together.
//!    Block addresses resolve through the active frame, so the same code
//!    reads a D64 file whether the D64 is a plain image or a partition
//!    buried inside a CMD FD image.
//!
//! CBM DOS tracks start at 1 instead of 0, which causes no end of
//! implementation confusion. The API reflects this 1-based indexing; linear
//! block addresses are 1-based as well, with 0 reserved as the "unused"
//! sentinel.
//!
//! # License
//!
//! Cbmimg is distributed under the terms of both the MIT license and the
//! Apache License (Version 2.0).

pub mod disk;

mod util;

pub use crate::disk::error::{DiskError, Result};
pub use crate::disk::DiskImage;
