use std::mem;

use bytemuck::{Pod, Zeroable};

use crate::{error::HeapError, ALIGNMENT};

/// Minimum number of usable bytes in a block. A remainder that can't hold a
/// header plus this many bytes is never split off.
pub const MIN_BLOCK_SIZE: usize = ALIGNMENT;

/// Header size in bytes. See [`Header`].
pub const HEADER_SIZE: usize = mem::size_of::<RawHeader>();

/// Value of the state word for allocated blocks.
const ALLOCATED: u64 = 0;

/// Value of the state word for free blocks.
const FREE: u64 = 1;

/// Metadata stored at the start of every block. There's no size field, the
/// size of a block is the distance to the next header minus [`HEADER_SIZE`]:
///
/// ```text
/// +----------------------------+   <------+
/// | offset of next header      |          | Header
/// +----------------------------+          |
/// | free / allocated           |          |
/// +----------------------------+   <------+
/// |       Block content        |   <------+
/// |            ...             |          | size = next - this - HEADER_SIZE
/// |            ...             |   <------+
/// +----------------------------+
/// | Next header                |
/// +----------------------------+
/// ```
///
/// Headers are linked in address order and the last one links back to the
/// first, see [`crate::cycle::Cycle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Offset of the next header in the cycle.
    pub next: usize,
    /// Whether the block can be handed out.
    pub is_free: bool,
}

/// In-buffer representation of [`Header`]. Two full words keep the content
/// that follows it aligned to [`ALIGNMENT`].
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RawHeader {
    next: u64,
    state: u64,
}

impl Header {
    #[inline]
    pub const fn free(next: usize) -> Self {
        Self {
            next,
            is_free: true,
        }
    }

    #[inline]
    pub const fn allocated(next: usize) -> Self {
        Self {
            next,
            is_free: false,
        }
    }

    /// Decodes the header stored in `bytes`, which must be exactly
    /// [`HEADER_SIZE`] long. `offset` is only used for error reporting.
    pub(crate) fn decode(bytes: &[u8], offset: usize) -> Result<Self, HeapError> {
        let raw: RawHeader = bytemuck::pod_read_unaligned(bytes);

        let is_free = match raw.state {
            FREE => true,
            ALLOCATED => false,
            _ => return Err(HeapError::CorruptHeader { offset }),
        };

        let next = usize::try_from(raw.next).map_err(|_| HeapError::CorruptHeader { offset })?;

        Ok(Self { next, is_free })
    }

    /// Writes this header into `bytes`, which must be exactly
    /// [`HEADER_SIZE`] long.
    pub(crate) fn encode(&self, bytes: &mut [u8]) {
        let raw = RawHeader {
            next: self.next as u64,
            state: if self.is_free { FREE } else { ALLOCATED },
        };

        bytes.copy_from_slice(bytemuck::bytes_of(&raw));
    }

    /// Returns the offset after the header.
    ///
    /// ```text
    /// +-------------+
    /// |   Header    | <- `header` points here.
    /// +-------------+
    /// |   Content   | <- Returned offset points to the first cell after header.
    /// +-------------+
    /// |     ...     |
    /// +-------------+
    /// ```
    #[inline]
    pub const fn content_offset_of(header: usize) -> usize {
        header + HEADER_SIZE
    }

    /// Returns the offset of the header given an offset that points right
    /// after it, or `None` if there's no room for a header before `content`.
    ///
    /// ```text
    /// +-------------+
    /// |   Header    | <- Returned offset points here.
    /// +-------------+
    /// |   Content   | <- Given offset should point here.
    /// +-------------+
    /// |     ...     |
    /// +-------------+
    /// ```
    #[inline]
    pub const fn from_content_offset(content: usize) -> Option<usize> {
        content.checked_sub(HEADER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        assert_eq!(HEADER_SIZE, 16);
        assert_eq!(HEADER_SIZE % ALIGNMENT, 0);
        assert_eq!(MIN_BLOCK_SIZE, 8);
    }

    #[test]
    fn encode_decode() {
        let mut bytes = [0u8; HEADER_SIZE];

        Header::free(4096).encode(&mut bytes);
        assert_eq!(Header::decode(&bytes, 0), Ok(Header::free(4096)));

        Header::allocated(24).encode(&mut bytes);
        let header = Header::decode(&bytes, 0).unwrap();
        assert_eq!(header.next, 24);
        assert!(!header.is_free);
    }

    #[test]
    fn zeroed_bytes_are_an_allocated_header() {
        let bytes = [0u8; HEADER_SIZE];
        assert_eq!(Header::decode(&bytes, 0), Ok(Header::allocated(0)));
    }

    #[test]
    fn unknown_state_is_corrupt() {
        let mut bytes = [0u8; HEADER_SIZE];
        Header::free(64).encode(&mut bytes);
        bytes[8] = 7;

        assert_eq!(
            Header::decode(&bytes, 32),
            Err(HeapError::CorruptHeader { offset: 32 })
        );
    }

    #[test]
    fn content_offsets() {
        assert_eq!(Header::content_offset_of(0), HEADER_SIZE);
        assert_eq!(Header::from_content_offset(HEADER_SIZE + 40), Some(40));
        assert_eq!(Header::from_content_offset(HEADER_SIZE - 1), None);
    }
}
