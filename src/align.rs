/// Alignment unit in bytes. Every user area handed out by the heap starts at
/// an address that is a multiple of this value, and every block size is a
/// multiple of it as well.
pub const ALIGNMENT: usize = 8;

/// Rounds `to_be_aligned` up to the next multiple of [`ALIGNMENT`], or returns
/// `None` if that would overflow.
///
/// # Examples
///
/// ```rust
/// use nextfit::align;
///
/// assert_eq!(align(0), Some(0));
/// assert_eq!(align(13), Some(16));
/// assert_eq!(align(16), Some(16));
/// assert_eq!(align(usize::MAX), None);
/// ```
#[inline]
pub fn align(to_be_aligned: usize) -> Option<usize> {
    to_be_aligned
        .checked_add(ALIGNMENT - 1)
        .map(|value| value & !(ALIGNMENT - 1))
}

/// Rounds `to_be_aligned` down to the previous multiple of [`ALIGNMENT`].
#[inline]
pub fn align_down(to_be_aligned: usize) -> usize {
    to_be_aligned & !(ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        let mut alignments = Vec::new();

        for i in 0..10 {
            // (1..=8), (9..=16), (17..=24) and so on.
            let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));
            // Matching the sizes above, this would be: 8, 16, 24 and so on.
            let expected_alignment = ALIGNMENT * (i + 1);
            alignments.push((sizes, expected_alignment));
        }

        for (sizes, expected) in alignments {
            for size in sizes {
                assert_eq!(Some(expected), align(size));
            }
        }
    }

    #[test]
    fn test_align_down() {
        for i in 0..10 {
            let base = ALIGNMENT * i;
            for size in base..base + ALIGNMENT {
                assert_eq!(base, align_down(size));
            }
        }
    }

    #[test]
    fn align_overflow() {
        assert_eq!(align(usize::MAX - 3), None);
        assert_eq!(align(usize::MAX - 7), Some(usize::MAX - 7));
    }
}
