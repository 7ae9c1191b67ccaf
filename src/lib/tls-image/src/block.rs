use core::{alloc::Layout, ptr::NonNull};

use alloc::alloc::{alloc, dealloc};
use tracing::trace;

use crate::{TlsError, TlsImage};

/// A heap-allocated, initialized copy of a TLS image, owned by one thread.
///
/// The block is aligned to the image's largest alignment and freed on drop.
#[derive(Debug)]
pub struct TlsBlock {
    base: NonNull<u8>,
    layout: Layout,
}

// The block is plain memory with a single owner.
unsafe impl Send for TlsBlock {}

impl TlsBlock {
    /// Allocate a block for `image` and fill it with a fresh copy.
    pub fn new(image: &TlsImage<'_>) -> Result<Self, TlsError> {
        let layout = image.layout().alloc_layout()?;
        let base = if layout.size() == 0 {
            // A dangling but well-aligned pointer, same as an empty Vec.
            NonNull::new(layout.align() as *mut u8).ok_or(TlsError::AllocFailed { layout })?
        } else {
            NonNull::new(unsafe { alloc(layout) }).ok_or(TlsError::AllocFailed { layout })?
        };
        // Safety: base is valid for layout.size() == footprint bytes and owned by us.
        unsafe { image.copy_to_ptr(base.as_ptr()) };
        trace!(
            "allocated TLS block at {:p} (size: {}, align: {})",
            base,
            layout.size(),
            layout.align()
        );
        Ok(Self { base, layout })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.base.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.layout.size()) }
    }
}

impl Drop for TlsBlock {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            unsafe { dealloc(self.base.as_ptr(), self.layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TlsLayout;

    #[test]
    fn block_is_aligned_and_initialized() {
        let template = *b"hello, tls";
        let image = TlsImage::new(&template, TlsLayout::new(10, 4, 6, 64)).unwrap();
        let block = TlsBlock::new(&image).unwrap();

        assert_eq!(block.as_ptr() as usize % 64, 0);
        assert_eq!(block.layout().size(), 12 + 64);
        assert_eq!(&block.as_slice()[..10], &template);
        assert!(block.as_slice()[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn blocks_are_independent() {
        let template = [1u8, 2, 3, 4];
        let image = TlsImage::new(&template, TlsLayout::new(4, 4, 4, 4)).unwrap();
        let mut a = TlsBlock::new(&image).unwrap();
        let b = TlsBlock::new(&image).unwrap();

        a.as_mut_slice()[0] = 42;
        a.as_mut_slice()[5] = 7;
        assert_eq!(b.as_slice(), &[1, 2, 3, 4, 0, 0, 0, 0]);
        assert_eq!(image.template(), &template);
    }

    #[test]
    fn empty_block() {
        let block = TlsBlock::new(&TlsImage::EMPTY).unwrap();
        assert!(block.as_slice().is_empty());
        assert_eq!(block.as_ptr() as usize, 1);
    }

    #[test]
    fn blocks_move_across_threads() {
        let template = [0xabu8; 8];
        let image = TlsImage::new(&template, TlsLayout::new(8, 8, 8, 8)).unwrap();
        let block = TlsBlock::new(&image).unwrap();
        let sum = std::thread::spawn(move || {
            block.as_slice().iter().map(|&b| b as usize).sum::<usize>()
        })
        .join()
        .unwrap();
        assert_eq!(sum, 8 * 0xab);
    }
}
