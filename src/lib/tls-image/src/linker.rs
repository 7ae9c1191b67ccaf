//! The TLS image of the running program, as laid out by the linker script.
//!
//! The linker script must provide these symbols around the `.tdata`/`.tbss`
//! output sections. All but `__tdata_start` are absolute symbols whose address
//! is the value:
//!
//! ```text
//! PROVIDE(__tdata_start = LOADADDR(.tdata));
//! PROVIDE(__tdata_size  = SIZEOF(.tdata));
//! PROVIDE(__tdata_align = ALIGNOF(.tdata));
//! PROVIDE(__tbss_size   = SIZEOF(.tbss));
//! PROVIDE(__tbss_align  = ALIGNOF(.tbss));
//! ```
use core::ptr::addr_of;

use crate::{TlsImage, TlsLayout};

extern "C" {
    static __tdata_start: u8;
    static __tdata_size: u8;
    static __tdata_align: u8;
    static __tbss_size: u8;
    static __tbss_align: u8;
}

fn symbol_value(sym: *const u8) -> usize {
    sym as usize
}

/// Layout of the program's TLS image.
pub fn layout() -> TlsLayout {
    // Safety: only the addresses of the symbols are taken.
    unsafe {
        TlsLayout::new(
            symbol_value(addr_of!(__tdata_size)),
            symbol_value(addr_of!(__tdata_align)),
            symbol_value(addr_of!(__tbss_size)),
            symbol_value(addr_of!(__tbss_align)),
        )
    }
}

/// The program's TLS image.
pub fn image() -> TlsImage<'static> {
    // Safety: the linker places data_size bytes of .tdata at __tdata_start, and the
    // template is never written.
    unsafe { TlsImage::from_raw_parts(addr_of!(__tdata_start), layout()) }
}

/// Bytes one thread needs for its copy of the program's TLS image.
pub fn tls_data_size() -> usize {
    layout().footprint()
}

/// Initialize a new thread's TLS block.
///
/// # Safety
/// `dest` must be valid for writes of [`tls_data_size`] bytes and owned by the
/// caller for the duration of the call.
pub unsafe fn tls_copy(dest: *mut u8) {
    image().copy_to_ptr(dest)
}
