use crate::{
    arena::Arena,
    error::HeapError,
    header::{Header, HEADER_SIZE},
};

/// The header cycle. All headers are linked in address order and the last
/// one, a zero sized block that is always allocated, links back to the first:
///
/// ```text
///          +-------+    +-------+    +-------+    +------+
///   +----> | First | -> | Block | -> | Block | -> | Last | ---+
///   |      +-------+    +-------+    +-------+    +------+    |
///   |                       ^                                 |
///   |                       |                                 |
///   |                     cursor                              |
///   +---------------------------------------------------------+
/// ```
///
/// This struct only stores offsets, the headers themselves live in the
/// [`Arena`] that every method receives. Wraparound is handled here and
/// nowhere else: [`Self::walk`] stops when it gets back to where it started,
/// [`Self::split`] inserts headers and [`Self::absorb_next`] removes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cycle {
    /// Lowest header in the region.
    pub first: usize,
    /// Sentinel header at the end of the region.
    pub last: usize,
    /// Where the next search for a free block starts.
    pub cursor: usize,
}

impl Cycle {
    /// Writes the two initial headers: `first`, a free block spanning
    /// everything up to `last`, and `last`, the allocated sentinel pointing
    /// back to `first`. The cursor starts at `first`.
    pub fn create<S>(arena: &mut Arena<S>, first: usize, last: usize) -> Result<Self, HeapError>
    where
        S: AsRef<[u8]> + AsMut<[u8]>,
    {
        arena.write_header(first, Header::free(last))?;
        arena.write_header(last, Header::allocated(first))?;

        Ok(Self {
            first,
            last,
            cursor: first,
        })
    }

    /// Offset of the header that follows `at`.
    #[inline]
    pub fn next_of<S: AsRef<[u8]>>(&self, arena: &Arena<S>, at: usize) -> Result<usize, HeapError> {
        Ok(arena.header(at)?.next)
    }

    /// Usable bytes of the block at `at`. The sentinel wraps around, so its
    /// size is 0.
    pub fn size_of<S: AsRef<[u8]>>(&self, arena: &Arena<S>, at: usize) -> Result<usize, HeapError> {
        let next = self.next_of(arena, at)?;

        Ok(if next > at { next - at - HEADER_SIZE } else { 0 })
    }

    /// Returns an iterator over every header of the cycle starting at `from`.
    pub fn walk<'a, S: AsRef<[u8]>>(&self, arena: &'a Arena<S>, from: usize) -> Walk<'a, S> {
        Walk {
            arena,
            start: from,
            next: Some(from),
            remaining: arena.len() / HEADER_SIZE + 1,
        }
    }

    /// Scans the cycle from `first` looking for the header whose next is
    /// `at`. Returns `None` if `at` is not part of the cycle.
    pub fn predecessor_of<S: AsRef<[u8]>>(
        &self,
        arena: &Arena<S>,
        at: usize,
    ) -> Result<Option<usize>, HeapError> {
        for step in self.walk(arena, self.first) {
            let (offset, header) = step?;
            if header.next == at {
                return Ok(Some(offset));
            }
        }

        Ok(None)
    }

    /// Inserts a new free header `content_size` bytes after the content of
    /// `at`. The new header takes over the old successor of `at` and `at`
    /// keeps its own free flag.
    ///
    /// ```text
    /// +----------------+---------------------+
    /// |       at       |    rest of block    |
    /// +----------------+---------------------+
    ///                  ^
    ///                  |
    ///                  +-- New header goes here.
    /// ```
    pub fn split<S>(
        &mut self,
        arena: &mut Arena<S>,
        at: usize,
        content_size: usize,
    ) -> Result<usize, HeapError>
    where
        S: AsRef<[u8]> + AsMut<[u8]>,
    {
        let mut header = arena.header(at)?;
        let new_block = Header::content_offset_of(at) + content_size;

        arena.write_header(new_block, Header::free(header.next))?;
        header.next = new_block;
        arena.write_header(at, header)?;

        tracing::trace!(block = at, new_block, "split block");

        Ok(new_block)
    }

    /// Removes the header that follows `at`, so `at` now spans both blocks.
    /// If the cursor pointed at the removed header it moves to `at`.
    ///
    /// ```text
    /// +----------------+---------------+
    /// |    Block A     |   Block B     |
    /// +----------------+---------------+
    ///        ^                 |
    ///        |                 |
    ///        +-----------------+
    ///           Merge B into A
    /// ```
    pub fn absorb_next<S>(&mut self, arena: &mut Arena<S>, at: usize) -> Result<usize, HeapError>
    where
        S: AsRef<[u8]> + AsMut<[u8]>,
    {
        let mut header = arena.header(at)?;
        let absorbed = header.next;

        header.next = arena.header(absorbed)?.next;
        arena.write_header(at, header)?;

        if self.cursor == absorbed {
            self.cursor = at;
        }

        tracing::trace!(block = at, absorbed, "merged blocks");

        Ok(absorbed)
    }

    /// Merges every free block that directly follows `at` into `at`, stopping
    /// at the first allocated block or when the cycle wraps to `first`.
    /// Returns how many headers were removed.
    pub fn coalesce_forward<S>(
        &mut self,
        arena: &mut Arena<S>,
        at: usize,
    ) -> Result<usize, HeapError>
    where
        S: AsRef<[u8]> + AsMut<[u8]>,
    {
        let mut merged = 0;

        loop {
            let next = self.next_of(arena, at)?;
            if next == self.first || !arena.header(next)?.is_free {
                return Ok(merged);
            }
            self.absorb_next(arena, at)?;
            merged += 1;
        }
    }
}

/// Iterator returned by [`Cycle::walk`]. Yields every header once, in cycle
/// order, and stops right before getting back to the start. A cycle that
/// doesn't close within `len / HEADER_SIZE + 1` steps yields
/// [`HeapError::BrokenCycle`].
pub(crate) struct Walk<'a, S> {
    arena: &'a Arena<S>,
    start: usize,
    next: Option<usize>,
    remaining: usize,
}

impl<'a, S: AsRef<[u8]>> Iterator for Walk<'a, S> {
    type Item = Result<(usize, Header), HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        let at = self.next.take()?;

        if self.remaining == 0 {
            return Some(Err(HeapError::BrokenCycle { offset: at }));
        }
        self.remaining -= 1;

        match self.arena.header(at) {
            Ok(header) => {
                if header.next != self.start {
                    self.next = Some(header.next);
                }
                Some(Ok((at, header)))
            }
            Err(error) => Some(Err(error)),
        }
    }
}
