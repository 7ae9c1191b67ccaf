//! Size and alignment of a TLS image.
//!
//! A TLS image is the initialized `.tdata` region followed by the zeroed `.tbss`
//! region. Each region carries its own alignment, so each is rounded up on its own
//! before the two are concatenated:
//!
//! ```text
//! 0                 data_size   bss_offset                      footprint
//! +-----------------+-----------+-------------------------------+
//! | .tdata          | / pad / / | .tbss (+ tail padding)        |
//! +-----------------+-----------+-------------------------------+
//! ```
use core::alloc::Layout;

use crate::{Region, TlsError};

/// Round `value` up to the next multiple of `align`.
///
/// `align` must be a non-zero power of two.
#[inline]
pub const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

pub(crate) const fn checked_round_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Sizes and alignments of the two regions of a TLS image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsLayout {
    data_size: usize,
    data_align: usize,
    bss_size: usize,
    bss_align: usize,
}

impl TlsLayout {
    /// A layout with no thread-local variables at all.
    pub const EMPTY: TlsLayout = TlsLayout::new(0, 1, 0, 1);

    /// Build a layout from trusted, link-time constants.
    ///
    /// Panics (at compile time, in a const context) if either alignment is not a
    /// power of two.
    pub const fn new(
        data_size: usize,
        data_align: usize,
        bss_size: usize,
        bss_align: usize,
    ) -> Self {
        assert!(data_align.is_power_of_two(), "tdata alignment must be a power of two");
        assert!(bss_align.is_power_of_two(), "tbss alignment must be a power of two");
        Self {
            data_size,
            data_align,
            bss_size,
            bss_align,
        }
    }

    /// Build a layout from values that came from somewhere untrusted, like an ELF file.
    pub fn try_new(
        data_size: usize,
        data_align: usize,
        bss_size: usize,
        bss_align: usize,
    ) -> Result<Self, TlsError> {
        if !data_align.is_power_of_two() {
            return Err(TlsError::BadAlignment {
                region: Region::Data,
                align: data_align,
            });
        }
        if !bss_align.is_power_of_two() {
            return Err(TlsError::BadAlignment {
                region: Region::Bss,
                align: bss_align,
            });
        }
        let data = checked_round_up(data_size, data_align).ok_or(TlsError::Overflow)?;
        let bss = checked_round_up(bss_size, bss_align).ok_or(TlsError::Overflow)?;
        let footprint = data.checked_add(bss).ok_or(TlsError::Overflow)?;
        // Layout::from_size_align refuses sizes that overflow isize once rounded.
        if footprint > isize::MAX as usize - (data_align.max(bss_align) - 1) {
            return Err(TlsError::Overflow);
        }
        Ok(Self {
            data_size,
            data_align,
            bss_size,
            bss_align,
        })
    }

    pub const fn data_size(&self) -> usize {
        self.data_size
    }

    pub const fn data_align(&self) -> usize {
        self.data_align
    }

    pub const fn bss_size(&self) -> usize {
        self.bss_size
    }

    pub const fn bss_align(&self) -> usize {
        self.bss_align
    }

    /// Offset of `.tbss` from the start of a TLS block.
    pub const fn bss_offset(&self) -> usize {
        round_up(self.data_size, self.data_align)
    }

    /// Number of bytes one thread's copy of the image occupies.
    pub const fn footprint(&self) -> usize {
        round_up(self.data_size, self.data_align) + round_up(self.bss_size, self.bss_align)
    }

    /// The alignment a TLS block must start at.
    pub const fn max_align(&self) -> usize {
        if self.data_align > self.bss_align {
            self.data_align
        } else {
            self.bss_align
        }
    }

    /// Allocation layout for one TLS block.
    pub fn alloc_layout(&self) -> Result<Layout, TlsError> {
        Ok(Layout::from_size_align(self.footprint(), self.max_align())?)
    }
}

impl Default for TlsLayout {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIGNS: [usize; 7] = [1, 2, 4, 8, 16, 32, 64];

    #[test]
    fn round_up_values() {
        assert_eq!(round_up(0, 8), 0);
        assert_eq!(round_up(1, 8), 8);
        assert_eq!(round_up(8, 8), 8);
        assert_eq!(round_up(9, 8), 16);
        assert_eq!(round_up(7, 1), 7);
    }

    #[test]
    fn footprint_matches_rounded_sum() {
        for &a1 in &ALIGNS {
            for &a2 in &ALIGNS {
                for s1 in 0..40 {
                    for s2 in 0..40 {
                        let layout = TlsLayout::new(s1, a1, s2, a2);
                        let expected = s1.div_ceil(a1) * a1 + s2.div_ceil(a2) * a2;
                        assert_eq!(layout.footprint(), expected);
                        assert!(layout.footprint() >= s1 + s2);
                        assert_eq!(layout.bss_offset() % a1, 0);
                    }
                }
            }
        }
    }

    #[test]
    fn footprint_is_pure() {
        let layout = TlsLayout::new(13, 8, 5, 4);
        assert_eq!(layout.footprint(), layout.footprint());
    }

    #[test]
    fn mixed_alignment() {
        let layout = TlsLayout::new(10, 4, 6, 8);
        assert_eq!(layout.bss_offset(), 12);
        assert_eq!(layout.footprint(), 20);
        assert_eq!(layout.max_align(), 8);
    }

    #[test]
    fn empty_layout() {
        let layout = TlsLayout::new(0, 1, 0, 1);
        assert_eq!(layout, TlsLayout::EMPTY);
        assert_eq!(layout.footprint(), 0);
        assert_eq!(layout.bss_offset(), 0);
    }

    #[test]
    fn aligned_data_has_no_padding() {
        let layout = TlsLayout::new(16, 8, 3, 1);
        assert_eq!(layout.bss_offset(), 16);
        assert_eq!(layout.footprint(), 19);
    }

    #[test]
    fn only_bss() {
        let layout = TlsLayout::new(0, 16, 24, 16);
        assert_eq!(layout.bss_offset(), 0);
        assert_eq!(layout.footprint(), 32);
    }

    #[test]
    fn rejects_bad_alignment() {
        assert!(matches!(
            TlsLayout::try_new(4, 3, 0, 1),
            Err(TlsError::BadAlignment {
                region: Region::Data,
                align: 3
            })
        ));
        assert!(matches!(
            TlsLayout::try_new(4, 4, 0, 0),
            Err(TlsError::BadAlignment {
                region: Region::Bss,
                align: 0
            })
        ));
    }

    #[test]
    fn rejects_overflow() {
        assert!(matches!(
            TlsLayout::try_new(usize::MAX, 8, 0, 1),
            Err(TlsError::Overflow)
        ));
        assert!(matches!(
            TlsLayout::try_new(usize::MAX / 2, 1, usize::MAX / 2 + 8, 1),
            Err(TlsError::Overflow)
        ));
    }

    #[test]
    fn alloc_layout() {
        let layout = TlsLayout::try_new(10, 4, 6, 8).unwrap().alloc_layout().unwrap();
        assert_eq!(layout.size(), 20);
        assert_eq!(layout.align(), 8);
    }
}
