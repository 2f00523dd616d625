use crate::{
    error::HeapError,
    header::{Header, HEADER_SIZE},
};

/// Byte buffer that holds both the headers and the user content. Everything
/// the allocator knows about the region is addressed by offsets into this
/// buffer, and every access goes through a bounds check, so a bad offset is
/// an error instead of a wild write.
pub(crate) struct Arena<S> {
    storage: S,
}

impl<S> Arena<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn into_inner(self) -> S {
        self.storage
    }
}

impl<S: AsRef<[u8]>> Arena<S> {
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.as_ref().len()
    }

    /// Absolute address of the first byte of the buffer.
    #[inline]
    pub fn base_address(&self) -> usize {
        self.storage.as_ref().as_ptr() as usize
    }

    /// Returns `offset..offset + length` if it fits in the buffer.
    fn span(&self, offset: usize, length: usize) -> Result<std::ops::Range<usize>, HeapError> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => Ok(offset..end),
            _ => Err(HeapError::OutOfBounds {
                offset,
                len: self.len(),
            }),
        }
    }

    /// Reads the header stored at `offset`.
    pub fn header(&self, offset: usize) -> Result<Header, HeapError> {
        let span = self.span(offset, HEADER_SIZE)?;
        Header::decode(&self.storage.as_ref()[span], offset)
    }

    /// Returns `length` bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, length: usize) -> Result<&[u8], HeapError> {
        let span = self.span(offset, length)?;
        Ok(&self.storage.as_ref()[span])
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Arena<S> {
    /// Overwrites the header stored at `offset`.
    pub fn write_header(&mut self, offset: usize, header: Header) -> Result<(), HeapError> {
        let span = self.span(offset, HEADER_SIZE)?;
        header.encode(&mut self.storage.as_mut()[span]);
        Ok(())
    }

    /// Mutable version of [`Self::bytes`].
    pub fn bytes_mut(&mut self, offset: usize, length: usize) -> Result<&mut [u8], HeapError> {
        let span = self.span(offset, length)?;
        Ok(&mut self.storage.as_mut()[span])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip_through_buffer() {
        let mut arena = Arena::new(vec![0u8; 64]);

        arena.write_header(16, Header::free(48)).unwrap();
        assert_eq!(arena.header(16), Ok(Header::free(48)));

        // Neighbouring bytes are untouched.
        assert!(arena.bytes(0, 16).unwrap().iter().all(|byte| *byte == 0));
        assert!(arena.bytes(32, 32).unwrap().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn out_of_bounds() {
        let mut arena = Arena::new(vec![0u8; 64]);
        let error = HeapError::OutOfBounds {
            offset: 56,
            len: 64,
        };

        assert_eq!(arena.header(56), Err(error));
        assert_eq!(arena.write_header(56, Header::free(0)), Err(error));
        assert_eq!(arena.bytes(56, 9).err(), Some(error));
        assert!(arena.bytes(56, 8).is_ok());
        assert!(arena.bytes_mut(usize::MAX, 2).is_err());
    }
}
