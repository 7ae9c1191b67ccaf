use core::ptr;

use tracing::trace;

use crate::{TlsError, TlsLayout};

/// A TLS template: the initialized `.tdata` bytes plus the layout of the full image.
///
/// Every new thread gets its own copy of the image, built with [`TlsImage::copy_to`]
/// (or [`TlsImage::copy_to_ptr`] on the thread-spawn path).
#[derive(Debug, Clone, Copy)]
pub struct TlsImage<'a> {
    template: &'a [u8],
    layout: TlsLayout,
}

impl TlsImage<'static> {
    /// An image with no thread-local variables.
    pub const EMPTY: TlsImage<'static> = TlsImage {
        template: &[],
        layout: TlsLayout::EMPTY,
    };
}

impl<'a> TlsImage<'a> {
    pub fn new(template: &'a [u8], layout: TlsLayout) -> Result<Self, TlsError> {
        if template.len() != layout.data_size() {
            return Err(TlsError::TemplateMismatch {
                len: template.len(),
                expected: layout.data_size(),
            });
        }
        Ok(Self { template, layout })
    }

    /// Build an image over a template that lives at a fixed address, such as the
    /// `.tdata` load address emitted by the linker.
    ///
    /// # Safety
    /// `data_start` must point to `layout.data_size()` readable bytes that stay
    /// unmodified for `'a`. It must be non-null even when the size is zero.
    pub const unsafe fn from_raw_parts(data_start: *const u8, layout: TlsLayout) -> Self {
        Self {
            template: core::slice::from_raw_parts(data_start, layout.data_size()),
            layout,
        }
    }

    pub fn layout(&self) -> &TlsLayout {
        &self.layout
    }

    pub fn template(&self) -> &'a [u8] {
        self.template
    }

    /// Number of bytes one thread's copy of this image needs.
    pub const fn footprint(&self) -> usize {
        self.layout.footprint()
    }

    /// Fill `dest` with a fresh copy of the image: the template at the start, zeros
    /// from the end of the template through the end of `.tbss`.
    ///
    /// Only the first [`footprint`](Self::footprint) bytes of `dest` are written.
    pub fn copy_to(&self, dest: &mut [u8]) -> Result<(), TlsError> {
        let required = self.footprint();
        if dest.len() < required {
            return Err(TlsError::BufferTooSmall {
                len: dest.len(),
                required,
            });
        }
        // Safety: dest is exclusively borrowed and was just checked to be large enough.
        unsafe { self.copy_to_ptr(dest.as_mut_ptr()) };
        Ok(())
    }

    /// Raw form of [`copy_to`](Self::copy_to), for a destination that is not yet a slice.
    ///
    /// # Safety
    /// `dest` must be valid for writes of [`footprint`](Self::footprint) bytes, must
    /// not overlap the template, and must not be accessed by anyone else for the
    /// duration of the call.
    pub unsafe fn copy_to_ptr(&self, dest: *mut u8) {
        let data_size = self.layout.data_size();
        let footprint = self.layout.footprint();
        if footprint == 0 {
            return;
        }
        trace!(
            "copy in TLS image {:p} => {:p} (tdata={}, tbss={}@{}, footprint={})",
            self.template.as_ptr(),
            dest,
            data_size,
            self.layout.bss_size(),
            self.layout.bss_offset(),
            footprint
        );
        ptr::copy_nonoverlapping(self.template.as_ptr(), dest, data_size);
        // Clears the alignment gap along with .tbss.
        ptr::write_bytes(dest.add(data_size), 0, footprint - data_size);
    }
}

impl Default for TlsImage<'static> {
    fn default() -> Self {
        Self::EMPTY
    }
}
