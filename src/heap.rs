use std::num::NonZeroUsize;

use crate::{
    align::{align, align_down},
    arena::Arena,
    cycle::Cycle,
    error::HeapError,
    header::{Header, HEADER_SIZE, MIN_BLOCK_SIZE},
    ALIGNMENT,
};

/// Smallest aligned span that can host the header cycle: the first block,
/// the sentinel and the minimum content of the first block.
pub const MIN_REGION_SIZE: usize = 2 * HEADER_SIZE + MIN_BLOCK_SIZE;

/// Handle to the user content of an allocated block. This is the offset of
/// the content within the region, it is never 0 because there's always a
/// header before it. See [`Heap::address_of`] for the actual address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(NonZeroUsize);

impl HeapPtr {
    /// Builds a pointer from a raw offset, `None` if the offset is 0.
    #[inline]
    pub fn from_offset(offset: usize) -> Option<Self> {
        NonZeroUsize::new(offset).map(Self)
    }

    /// Offset of the content within the region.
    #[inline]
    pub fn offset(self) -> usize {
        self.0.get()
    }
}

/// Occupancy summary produced by [`Heap::stats`]. The sentinel is not
/// counted as a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of blocks, free or allocated.
    pub blocks: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Usable bytes in free blocks.
    pub free_bytes: usize,
    /// Usable bytes in allocated blocks.
    pub allocated_bytes: usize,
    /// Usable bytes of the biggest free block.
    pub largest_free: usize,
}

/// Next-fit allocator over a single region of memory supplied by the caller.
/// The region is split into blocks, each one starting with a [`Header`], and
/// the headers form a cycle in address order (see [`Cycle`]):
///
/// ```text
/// +--------+---------+--------+---------+--------+---------+------+
/// | Header | Content | Header | Content | Header | Content | Last |
/// +--------+---------+--------+---------+--------+---------+------+
///     |                  ^ |                 ^ |               ^ |
///     +------------------+ +-----------------+ +---------------+ |
///     ^                                                          |
///     +----------------------------------------------------------+
/// ```
///
/// Allocation starts searching at the cursor, which is left right after the
/// last block handed out, and goes around the cycle at most once. Free
/// blocks found on the way are merged with their free successors before
/// checking whether they fit. Releasing a block merges it with both of its
/// neighbours if they are free, so there are never two consecutive free
/// blocks once a call returns.
///
/// `S` is the memory itself, anything that derefs to a byte buffer that
/// doesn't move while the heap exists: `Vec<u8>`, `&mut [u8]` or
/// [`crate::Region`]. The heap is meant to be used from one thread and is
/// not reentrant; wrap it in a lock if it has to be shared.
///
/// # Examples
///
/// ```rust
/// use nextfit::Heap;
///
/// let mut heap = Heap::new(vec![0u8; 1024]);
/// heap.init().unwrap();
///
/// let ptr = heap.allocate(20).unwrap();
/// assert_eq!(heap.address_of(ptr) % 8, 0);
/// assert!(heap.usable_size(ptr).unwrap() >= 20);
///
/// heap.bytes_mut(ptr).unwrap()[..5].copy_from_slice(b"hello");
/// assert_eq!(&heap.bytes(ptr).unwrap()[..5], b"hello");
///
/// heap.release(ptr);
/// assert_eq!(heap.allocate(20), Ok(ptr));
/// ```
pub struct Heap<S> {
    arena: Arena<S>,
    cycle: Option<Cycle>,
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Heap<S> {
    /// Takes ownership of the region. Nothing is written until
    /// [`Self::init`] or the first allocation.
    pub fn new(storage: S) -> Self {
        Self {
            arena: Arena::new(storage),
            cycle: None,
        }
    }

    /// Whether the header cycle exists.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.cycle.is_some()
    }

    /// Builds the initial header cycle. Both ends of the region are aligned
    /// to [`ALIGNMENT`] inwards, then one free block spanning everything is
    /// placed at the start and the sentinel at the end. Calling this again
    /// once the cycle exists does nothing.
    ///
    /// If the aligned region is smaller than [`MIN_REGION_SIZE`] the heap
    /// stays uninitialized and every allocation fails.
    pub fn init(&mut self) -> Result<(), HeapError> {
        if self.cycle.is_some() {
            return Ok(());
        }

        let memory_start = self.arena.base_address();
        let memory_end = memory_start + self.arena.len();

        let aligned_start = align(memory_start);
        let aligned_end = align_down(memory_end);

        let available = match aligned_start {
            Some(aligned_start) if aligned_start <= aligned_end => aligned_end - aligned_start,
            _ => 0,
        };

        let Some(aligned_start) = aligned_start.filter(|_| available >= MIN_REGION_SIZE) else {
            tracing::debug!(available, "region too small for the header cycle");
            return Err(HeapError::RegionTooSmall {
                available,
                required: MIN_REGION_SIZE,
            });
        };

        // From here on everything is an offset into the buffer.
        let first = aligned_start - memory_start;
        let last = aligned_end - memory_start - HEADER_SIZE;
        self.cycle = Some(Cycle::create(&mut self.arena, first, last)?);

        tracing::trace!(first, last, "heap initialized");

        Ok(())
    }

    fn cycle(&self) -> Result<&Cycle, HeapError> {
        self.cycle.as_ref().ok_or(HeapError::Uninitialized)
    }

    /// Allocates a block that can hold at least `size` bytes and returns a
    /// pointer to its content. Requests are rounded up to a multiple of
    /// [`ALIGNMENT`], and a request of 0 bytes still takes
    /// [`MIN_BLOCK_SIZE`] bytes.
    ///
    /// Fails with [`HeapError::OutOfMemory`] when going around the whole
    /// cycle doesn't find a free block big enough. The contents of allocated
    /// blocks are never moved.
    pub fn allocate(&mut self, size: usize) -> Result<HeapPtr, HeapError> {
        self.init()?;

        let aligned_size = align(size)
            .ok_or(HeapError::OutOfMemory { requested: size })?
            .max(MIN_BLOCK_SIZE);

        let Some(cycle) = self.cycle.as_mut() else {
            return Err(HeapError::Uninitialized);
        };

        let start = cycle.cursor;
        let mut current = start;

        loop {
            if self.arena.header(current)?.is_free {
                cycle.coalesce_forward(&mut self.arena, current)?;

                let next = cycle.next_of(&self.arena, current)?;
                let size_of_current = cycle.size_of(&self.arena, current)?;

                if size_of_current >= aligned_size {
                    return self.take(current, aligned_size);
                }

                // Merging a block that comes before the search start can
                // swallow the start itself. Everything has been looked at by
                // now.
                if current < start && start < next {
                    break;
                }
            }

            current = cycle.next_of(&self.arena, current)?;
            if current == start {
                break;
            }
        }

        tracing::debug!(requested = size, aligned_size, "allocation failed");

        Err(HeapError::OutOfMemory { requested: size })
    }

    /// Marks the free block at `block` as allocated, splitting it first if
    /// what remains after `aligned_size` bytes can be a block of its own.
    ///
    /// **Before**:
    ///
    /// ```text
    ///         +-->  +-----------+
    ///         |     |   Header  |
    /// Block   |     +-----------+
    ///         |     |  Content  | <- N bytes.
    ///         +-->  +-----------+
    /// ```
    /// **After**:
    ///
    /// ```text
    ///         +-->  +-----------+
    ///         |     |   Header  |
    /// Block 1 |     +-----------+
    ///         |     |  Content  | <- aligned_size bytes, allocated.
    ///         +-->  +-----------+
    ///         |     |   Header  | <- HEADER_SIZE bytes.
    /// Block 2 |     +-----------+
    ///         |     |  Content  | <- N - aligned_size - HEADER_SIZE bytes, free.
    ///         +-->  +-----------+
    /// ```
    ///
    /// The cursor moves to the block right after the allocated one.
    fn take(&mut self, block: usize, aligned_size: usize) -> Result<HeapPtr, HeapError> {
        let Some(cycle) = self.cycle.as_mut() else {
            return Err(HeapError::Uninitialized);
        };

        let size = cycle.size_of(&self.arena, block)?;
        let content = Header::content_offset_of(block);
        let new_block = content + aligned_size;

        let can_split = size - aligned_size >= HEADER_SIZE + MIN_BLOCK_SIZE
            && new_block + HEADER_SIZE <= cycle.last;

        if can_split {
            let new_block = cycle.split(&mut self.arena, block, aligned_size)?;
            self.arena
                .write_header(block, Header::allocated(new_block))?;
            cycle.cursor = new_block;
        } else {
            let next = cycle.next_of(&self.arena, block)?;
            self.arena.write_header(block, Header::allocated(next))?;
            cycle.cursor = next;
        }

        tracing::trace!(block, aligned_size, split = can_split, "allocated block");

        HeapPtr::from_offset(content).ok_or(HeapError::InvalidPointer { offset: content })
    }

    /// Releases the block that owns `ptr` so it can be allocated again. The
    /// block is merged with the free blocks right after it and with the
    /// block right before it if that one is free.
    ///
    /// Releasing a pointer that is not currently allocated, including a
    /// second release of the same pointer, does nothing. Use
    /// [`Self::try_release`] to find out about those cases.
    pub fn release(&mut self, ptr: HeapPtr) {
        if let Err(error) = self.try_release(ptr) {
            tracing::debug!(offset = ptr.offset(), %error, "ignored release");
        }
    }

    /// Same as [`Self::release`], but reports misuse instead of silently
    /// ignoring it. Nothing is modified when an error is returned.
    ///
    /// **Before**:
    ///
    /// ```text
    ///                         +-->  +-----------+
    ///                         |     |   Header  | <- H bytes.
    /// Block A, Free           |     +-----------+
    ///                         |     |  Content  | <- A bytes.
    ///                         +-->  +-----------+
    ///                         |     |   Header  | <- H bytes.
    /// Block B, Released       |     +-----------+
    ///                         |     |  Content  | <- B bytes.
    ///                         +-->  +-----------+
    ///                         |     |   Header  | <- H bytes.
    /// Block C, Free           |     +-----------+
    ///                         |     |  Content  | <- C bytes.
    ///                         +-->  +-----------+
    /// ```
    ///
    /// **After**:
    ///
    /// ```text
    ///                         +-->  +-----------+
    ///                         |     |   Header  | <- H bytes.
    /// Block A, Free           |     +-----------+
    ///                         |     |  Content  | <- A + B + C + 2H bytes.
    ///                         +-->  +-----------+
    /// ```
    pub fn try_release(&mut self, ptr: HeapPtr) -> Result<(), HeapError> {
        let offset = ptr.offset();
        let Some(cycle) = self.cycle.as_mut() else {
            return Err(HeapError::Uninitialized);
        };

        let block = Header::from_content_offset(offset)
            .filter(|block| *block != cycle.last)
            .ok_or(HeapError::InvalidPointer { offset })?;

        // Finding the previous block also proves that `block` is a live
        // header. Stale pointers into merged blocks end here.
        let previous = cycle
            .predecessor_of(&self.arena, block)?
            .ok_or(HeapError::InvalidPointer { offset })?;

        let header = self.arena.header(block)?;
        if header.is_free {
            return Err(HeapError::NotAllocated { offset });
        }

        self.arena.write_header(block, Header::free(header.next))?;
        cycle.coalesce_forward(&mut self.arena, block)?;

        if self.arena.header(previous)?.is_free {
            cycle.absorb_next(&mut self.arena, previous)?;
        }

        tracing::trace!(block, "released block");

        Ok(())
    }

    /// Returns the header offset of the allocated block that owns `ptr`.
    /// This is a cheap plausibility check, not a walk of the cycle like
    /// [`Self::try_release`] does, so it is only as good as the pointer.
    fn allocated_block(&self, ptr: HeapPtr) -> Result<usize, HeapError> {
        let offset = ptr.offset();
        let cycle = self.cycle()?;

        let block = Header::from_content_offset(offset)
            .filter(|block| *block >= cycle.first && *block < cycle.last)
            .filter(|block| (block - cycle.first) % ALIGNMENT == 0)
            .ok_or(HeapError::InvalidPointer { offset })?;

        let header = self.arena.header(block)?;
        if header.is_free {
            return Err(HeapError::NotAllocated { offset });
        }
        if header.next <= block || header.next > cycle.last {
            return Err(HeapError::InvalidPointer { offset });
        }

        Ok(block)
    }

    /// Number of bytes that can be written at `ptr`. This can be more than
    /// what was requested because of rounding and unsplittable remainders.
    pub fn usable_size(&self, ptr: HeapPtr) -> Result<usize, HeapError> {
        let block = self.allocated_block(ptr)?;
        self.cycle()?.size_of(&self.arena, block)
    }

    /// The content of the allocated block at `ptr`.
    pub fn bytes(&self, ptr: HeapPtr) -> Result<&[u8], HeapError> {
        let size = self.usable_size(ptr)?;
        self.arena.bytes(ptr.offset(), size)
    }

    /// Mutable version of [`Self::bytes`].
    pub fn bytes_mut(&mut self, ptr: HeapPtr) -> Result<&mut [u8], HeapError> {
        let size = self.usable_size(ptr)?;
        self.arena.bytes_mut(ptr.offset(), size)
    }

    /// Absolute address of the content at `ptr`, always a multiple of
    /// [`ALIGNMENT`] for pointers returned by [`Self::allocate`].
    #[inline]
    pub fn address_of(&self, ptr: HeapPtr) -> usize {
        self.arena.base_address() + ptr.offset()
    }

    /// Walks the whole cycle and summarizes block usage.
    pub fn stats(&self) -> Result<HeapStats, HeapError> {
        let mut stats = HeapStats::default();
        let Some(cycle) = self.cycle.as_ref() else {
            return Ok(stats);
        };

        for step in cycle.walk(&self.arena, cycle.first) {
            let (offset, header) = step?;
            if offset == cycle.last {
                continue;
            }

            let size = cycle.size_of(&self.arena, offset)?;
            stats.blocks += 1;

            if header.is_free {
                stats.free_blocks += 1;
                stats.free_bytes += size;
                stats.largest_free = stats.largest_free.max(size);
            } else {
                stats.allocated_bytes += size;
            }
        }

        Ok(stats)
    }

    /// Checks every structural invariant of the header cycle and returns
    /// the first violation found:
    ///
    /// - Headers go up in address order from `first` to `last` and `last`
    ///   links back to `first`, visiting `first` exactly once.
    /// - The sentinel is allocated and has no content.
    /// - Every header and every block size is a multiple of [`ALIGNMENT`].
    /// - No two consecutive blocks are free.
    /// - The cursor points at a live header.
    pub fn validate(&self) -> Result<(), HeapError> {
        let cycle = self.cycle()?;
        let mut previous: Option<(usize, Header)> = None;
        let mut cursor_found = false;

        for step in cycle.walk(&self.arena, cycle.first) {
            let (offset, header) = step?;

            if let Some((previous_offset, previous_header)) = previous {
                if offset <= previous_offset {
                    return Err(HeapError::BrokenCycle { offset });
                }
                if previous_header.is_free && header.is_free {
                    return Err(HeapError::AdjacentFree {
                        offset: previous_offset,
                        next: offset,
                    });
                }
            }

            if (offset - cycle.first) % ALIGNMENT != 0 {
                return Err(HeapError::Misaligned { offset });
            }

            if offset == cycle.last {
                if header.is_free || header.next != cycle.first {
                    return Err(HeapError::BrokenCycle { offset });
                }
            } else if header.next <= offset || header.next > cycle.last {
                return Err(HeapError::BrokenCycle { offset });
            } else if (header.next - offset) % ALIGNMENT != 0
                || header.next - offset < HEADER_SIZE + MIN_BLOCK_SIZE
            {
                return Err(HeapError::Misaligned { offset });
            }

            cursor_found |= offset == cycle.cursor;
            previous = Some((offset, header));
        }

        if previous.map(|(offset, _)| offset) != Some(cycle.last) {
            return Err(HeapError::BrokenCycle { offset: cycle.first });
        }

        if !cursor_found {
            return Err(HeapError::BrokenCycle {
                offset: cycle.cursor,
            });
        }

        Ok(())
    }

    /// Gives the region back. Pointers into it are meaningless afterwards.
    pub fn into_inner(self) -> S {
        self.arena.into_inner()
    }
}
