//! Placing a thread's TLS block at the top of its stack.
//!
//! Small kernels carve the TLS area out of the new thread's stack before the
//! thread runs, then start the stack pointer below it. Where the thread pointer
//! lands relative to the block depends on the ELF TLS variant of the target:
//!
//! ```text
//!   Variant I (arm, aarch64, riscv)        Variant II (x86, x86_64)
//!
//!   top ->  +------------------+           top ->  +------------------+
//!           | / align slack /  |                   | / align slack /  |
//!           +------------------+           tp  ->  | self pointer     |
//!           | .tdata / .tbss   |                   +------------------+
//!           +------------------+                   | .tdata / .tbss   |
//!           | TCB (tcb_size)   |                   |                  |
//!   tp  ->  +------------------+                   +------------------+
//! ```
use core::mem::size_of;

use tracing::trace;

use crate::{layout::checked_round_up, TlsError, TlsImage, TlsLayout};

const WORD: usize = size_of::<usize>();

/// Where the thread pointer sits relative to the TLS block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVariant {
    /// The thread pointer points at a control block of `tcb_size` bytes that
    /// directly precedes the TLS block.
    Variant1 { tcb_size: usize },
    /// The TLS block ends at the thread pointer, which points at a word holding
    /// its own address.
    Variant2,
}

impl TlsVariant {
    /// The variant used by the compilation target.
    pub const fn native() -> Self {
        if cfg!(any(target_arch = "x86", target_arch = "x86_64")) {
            TlsVariant::Variant2
        } else if cfg!(any(target_arch = "riscv32", target_arch = "riscv64")) {
            TlsVariant::Variant1 { tcb_size: 0 }
        } else {
            TlsVariant::Variant1 { tcb_size: 2 * WORD }
        }
    }

    /// Bytes a stack gives up for TLS with this variant, not counting any slack
    /// needed to align the top of the stack.
    pub fn stack_reservation(&self, layout: &TlsLayout) -> Result<usize, TlsError> {
        let align = stack_align(layout);
        let block = checked_round_up(layout.footprint(), align).ok_or(TlsError::Overflow)?;
        let below = match *self {
            TlsVariant::Variant1 { tcb_size } => {
                checked_round_up(tcb_size, align).ok_or(TlsError::Overflow)?
            }
            TlsVariant::Variant2 => WORD,
        };
        block.checked_add(below).ok_or(TlsError::Overflow)
    }
}

impl Default for TlsVariant {
    fn default() -> Self {
        Self::native()
    }
}

const fn stack_align(layout: &TlsLayout) -> usize {
    let align = layout.max_align();
    if align > WORD {
        align
    } else {
        WORD
    }
}

const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// Result of placing a TLS block on a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackTls {
    /// Value to load into the thread pointer register.
    pub thread_pointer: usize,
    /// Offset of the thread pointer from the start of the stack region.
    pub thread_pointer_offset: usize,
    /// Offset of the TLS block from the start of the stack region.
    pub block_offset: usize,
    /// Bytes used from the top of the stack; the initial stack pointer goes at
    /// `top - consumed` or lower.
    pub consumed: usize,
}

impl<'a> TlsImage<'a> {
    /// Copy a fresh TLS block into the top of `stack` and work out the thread pointer.
    ///
    /// `stack` grows down from its end. Nothing is written on failure.
    pub fn place_on_stack(
        &self,
        stack: &mut [u8],
        variant: TlsVariant,
    ) -> Result<StackTls, TlsError> {
        let layout = self.layout();
        let align = stack_align(layout);
        let base = stack.as_ptr() as usize;
        let top = base + stack.len();

        let (thread_pointer, block_start) = match variant {
            TlsVariant::Variant1 { tcb_size } => {
                let block_start = top
                    .checked_sub(layout.footprint())
                    .map(|addr| align_down(addr, align))
                    .ok_or(TlsError::Overflow)?;
                let tp = checked_round_up(tcb_size, align)
                    .and_then(|tcb| block_start.checked_sub(tcb))
                    .ok_or(TlsError::Overflow)?;
                (tp, block_start)
            }
            TlsVariant::Variant2 => {
                let tp = top
                    .checked_sub(WORD)
                    .map(|addr| align_down(addr, align))
                    .ok_or(TlsError::Overflow)?;
                let block_start = checked_round_up(layout.footprint(), align)
                    .and_then(|block| tp.checked_sub(block))
                    .ok_or(TlsError::Overflow)?;
                (tp, block_start)
            }
        };

        let lowest = thread_pointer.min(block_start);
        if lowest < base {
            return Err(TlsError::StackTooSmall {
                len: stack.len(),
                required: top - lowest,
            });
        }

        let block_offset = block_start - base;
        let thread_pointer_offset = thread_pointer - base;
        self.copy_to(&mut stack[block_offset..])?;
        if variant == TlsVariant::Variant2 {
            stack[thread_pointer_offset..thread_pointer_offset + WORD]
                .copy_from_slice(&thread_pointer.to_ne_bytes());
        }

        let placed = StackTls {
            thread_pointer,
            thread_pointer_offset,
            block_offset,
            consumed: top - lowest,
        };
        trace!("placed TLS on stack {:#x}..{:#x}: {:?}", base, top, placed);
        Ok(placed)
    }
}
