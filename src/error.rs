//! Error types for the heap, its configuration and the list program.

use std::io;

use thiserror::Error;

/// Errors reported by [`crate::Heap`] and the memory backing it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The aligned region cannot hold two headers plus a minimum block.
    #[error("region too small: {available} usable bytes, at least {required} required")]
    RegionTooSmall {
        /// Bytes left after aligning both ends of the region.
        available: usize,
        /// Smallest span that can host the header cycle.
        required: usize,
    },

    /// The header cycle has not been created yet.
    #[error("heap is not initialized")]
    Uninitialized,

    /// No free block can hold the request, even after coalescing.
    #[error("out of memory: no free block can hold {requested} bytes")]
    OutOfMemory {
        /// Size originally requested by the caller.
        requested: usize,
    },

    /// An offset derived from a header or pointer falls outside the buffer.
    #[error("offset {offset} is outside the managed region of {len} bytes")]
    OutOfBounds {
        /// Offending offset.
        offset: usize,
        /// Length of the underlying buffer.
        len: usize,
    },

    /// The state word of a header is neither "free" nor "allocated".
    #[error("corrupt header at offset {offset}")]
    CorruptHeader {
        /// Offset of the header.
        offset: usize,
    },

    /// Walking the header cycle did not return to its start.
    #[error("header cycle broken at offset {offset}")]
    BrokenCycle {
        /// Last header reached before giving up.
        offset: usize,
    },

    /// The pointer is not the user area of a header in the cycle.
    #[error("pointer {offset} was not returned by this heap")]
    InvalidPointer {
        /// Offset carried by the pointer.
        offset: usize,
    },

    /// The block owning the pointer is already free.
    #[error("block at {offset} is not allocated")]
    NotAllocated {
        /// Offset carried by the pointer.
        offset: usize,
    },

    /// Two consecutive headers in the cycle are both free.
    #[error("free blocks at {offset} and {next} were not coalesced")]
    AdjacentFree {
        /// First free header.
        offset: usize,
        /// Its free successor.
        next: usize,
    },

    /// A header is not on the alignment grid, or its block is smaller than
    /// the minimum block size or not a multiple of the alignment unit.
    #[error("misaligned block at offset {offset}")]
    Misaligned {
        /// Offset of the header.
        offset: usize,
    },

    /// The platform refused to hand out memory for a region.
    #[error("could not obtain a region of {length} bytes")]
    RegionUnavailable {
        /// Requested length after page rounding.
        length: usize,
    },
}

/// Errors reading [`crate::Config`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The region size variable is set but is not a positive integer.
    #[error("invalid value for {var}: {value:?}")]
    InvalidRegionSize {
        /// Name of the environment variable.
        var: &'static str,
        /// Raw value found.
        value: String,
    },
}

/// Errors surfaced by the list program.
#[derive(Error, Debug)]
pub enum ProgramError {
    /// Writing the report failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The heap failed in a way that cannot be treated as a dropped append.
    #[error(transparent)]
    Heap(#[from] HeapError),

    /// Configuration could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
