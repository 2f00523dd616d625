use std::{ptr::NonNull, slice, sync::OnceLock};

use crate::error::HeapError;

/// Abstraction for platform specific memory handling. The heap never talks
/// to the kernel, but somebody has to give it a region to work with, and
/// this is how the binary and the tests get one.
trait PlatformSpecificMemory {
    /// Requests a memory region from the kernel where `length` bytes can be
    /// written safely. The memory must be zeroed.
    unsafe fn request_memory(length: usize) -> Option<NonNull<u8>>;

    /// Returns `length` bytes starting from `address` to the kernel. Always
    /// called with the exact values that [`Self::request_memory`] got.
    unsafe fn return_memory(address: NonNull<u8>, length: usize);

    /// Virtual memory page size in bytes.
    fn page_size() -> usize;
}

/// Zero sized type that implements [`PlatformSpecificMemory`] for each OS.
struct Platform;

/// Virtual memory page size. We only know it at runtime, so it is computed
/// once and reused afterwards.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(Platform::page_size)
}

/// Page aligned memory obtained directly from the kernel, suitable as the
/// region of a [`crate::Heap`]. The pages are returned when this is dropped.
///
/// # Examples
///
/// ```rust
/// use nextfit::{Heap, Region};
///
/// let region = Region::request(4096).unwrap();
/// let mut heap = Heap::new(region);
///
/// let ptr = heap.allocate(100).unwrap();
/// heap.bytes_mut(ptr).unwrap().fill(1);
/// ```
#[derive(Debug)]
pub struct Region {
    address: NonNull<u8>,
    length: usize,
}

impl Region {
    /// Requests at least `length` bytes, rounded up to a multiple of the page
    /// size. The memory starts zeroed.
    pub fn request(length: usize) -> Result<Self, HeapError> {
        let page = page_size();
        let length = length
            .max(1)
            .checked_add(page - 1)
            .map(|length| length / page * page)
            .ok_or(HeapError::RegionUnavailable { length })?;

        // SAFETY: length is non zero and a multiple of the page size.
        let address = unsafe { Platform::request_memory(length) }
            .ok_or(HeapError::RegionUnavailable { length })?;

        tracing::trace!(length, "region mapped");

        Ok(Self { address, length })
    }

    /// Length in bytes, always a multiple of [`page_size`].
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Regions are never empty, this exists for symmetry with [`Self::len`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl AsRef<[u8]> for Region {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: the mapping is valid, initialized and exclusively owned by
        // `self` for `length` bytes until drop.
        unsafe { slice::from_raw_parts(self.address.as_ptr(), self.length) }
    }
}

impl AsMut<[u8]> for Region {
    fn as_mut(&mut self) -> &mut [u8] {
        // SAFETY: see `as_ref`, and `&mut self` guarantees uniqueness.
        unsafe { slice::from_raw_parts_mut(self.address.as_ptr(), self.length) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: address and length come straight from `request_memory`.
        unsafe { Platform::return_memory(self.address, self.length) }
    }
}

#[cfg(all(unix, not(miri)))]
mod unix {
    use std::ptr::{self, NonNull};

    use super::{Platform, PlatformSpecificMemory};

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Option<NonNull<u8>> {
            // Memory protection. Read-Write only.
            let protection = libc::PROT_READ | libc::PROT_WRITE;

            // Memory should be private to our process and not mapped to any file.
            let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

            // For all the configuration options that `mmap` accepts see
            // https://man7.org/linux/man-pages/man2/mmap.2.html
            match libc::mmap(ptr::null_mut(), length, protection, flags, -1, 0) {
                libc::MAP_FAILED => None,
                address => NonNull::new(address.cast()),
            }
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) {
            if libc::munmap(address.as_ptr().cast(), length) != 0 {
                tracing::warn!(length, "munmap failed, region leaked");
            }
        }

        fn page_size() -> usize {
            // SAFETY: sysconf has no preconditions.
            match unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) } {
                size if size > 0 => size as usize,
                _ => 4096,
            }
        }
    }
}

#[cfg(any(miri, not(unix)))]
mod fallback {
    //! Without `mmap` (Miri has no FFI, other targets have other APIs) the
    //! global allocator stands in for the kernel. This also lets Miri catch
    //! regions that are never returned.

    use std::{alloc, ptr::NonNull};

    use super::{Platform, PlatformSpecificMemory};

    const PAGE_SIZE: usize = 4096;

    fn to_layout(length: usize) -> Option<alloc::Layout> {
        alloc::Layout::from_size_align(length, PAGE_SIZE).ok()
    }

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Option<NonNull<u8>> {
            NonNull::new(alloc::alloc_zeroed(to_layout(length)?))
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) {
            if let Some(layout) = to_layout(length) {
                alloc::dealloc(address.as_ptr(), layout);
            }
        }

        fn page_size() -> usize {
            PAGE_SIZE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_length_is_rounded_to_pages() {
        let page = page_size();
        assert!(page.is_power_of_two());

        for (requested, expected) in [(0, page), (1, page), (page, page), (page + 1, 2 * page)] {
            let region = Region::request(requested).unwrap();
            assert_eq!(region.len(), expected);
            assert!(!region.is_empty());
        }
    }

    #[test]
    fn region_is_zeroed_writable_and_aligned() {
        let mut region = Region::request(3 * page_size()).unwrap();

        assert_eq!(region.as_ref().as_ptr() as usize % page_size(), 0);
        assert!(region.as_ref().iter().all(|byte| *byte == 0));

        region.as_mut().fill(69);
        assert!(region.as_ref().iter().all(|byte| *byte == 69));
    }

    #[test]
    fn absurd_length_fails() {
        assert!(matches!(
            Region::request(usize::MAX),
            Err(HeapError::RegionUnavailable { .. })
        ));
    }
}
