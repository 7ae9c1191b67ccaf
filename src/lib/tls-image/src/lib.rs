//! Per-thread copies of an ELF thread-local storage image.
//!
//! A program's thread-local variables live in two linker sections: `.tdata`,
//! holding their initial values, and `.tbss`, which starts out zeroed. Every
//! thread needs its own copy of both. This crate answers two questions for the
//! code that spawns threads:
//!
//! * how many bytes a thread's TLS block needs ([`TlsLayout::footprint`]), and
//! * how to fill a freshly reserved block ([`TlsImage::copy_to`]).
//!
//! On top of that it can own a heap-allocated block ([`TlsBlock`]), carve one out
//! of the top of a new thread's stack ([`TlsImage::place_on_stack`]), find the
//! image in an ELF file ([`TlsImage::from_elf`]) and, with the `linker-symbols`
//! feature, bind the running program's own image ([`linker`]).
//!
//! ```
//! use tls_image::{TlsImage, TlsLayout};
//!
//! let template = *b"0123456789";
//! let image = TlsImage::new(&template, TlsLayout::new(10, 4, 6, 8)).unwrap();
//! assert_eq!(image.footprint(), 20);
//!
//! let mut block = [0xffu8; 20];
//! image.copy_to(&mut block).unwrap();
//! assert_eq!(&block[..10], b"0123456789");
//! assert!(block[12..].iter().all(|&b| b == 0));
//! ```

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

mod block;
mod error;
mod image;
pub mod layout;
mod segment;
mod stack;

#[cfg(feature = "linker-symbols")]
pub mod linker;

pub use block::TlsBlock;
pub use error::{Region, TlsError};
pub use image::TlsImage;
pub use layout::{round_up, TlsLayout};
pub use stack::{StackTls, TlsVariant};
