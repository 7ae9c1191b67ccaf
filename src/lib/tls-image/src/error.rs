//! Errors reported while building or placing a TLS image.
use core::{alloc::Layout, fmt};

use thiserror::Error;

/// One of the two regions of a TLS image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Initialized thread-local data (`.tdata`).
    Data,
    /// Zero-initialized thread-local data (`.tbss`).
    Bss,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Data => write!(f, ".tdata"),
            Region::Bss => write!(f, ".tbss"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("alignment {align} of {region} is not a power of two")]
    BadAlignment { region: Region, align: usize },
    #[error("TLS footprint does not fit in the address space")]
    Overflow,
    #[error("template holds {len} bytes but the layout expects {expected}")]
    TemplateMismatch { len: usize, expected: usize },
    #[error("destination holds {len} bytes but the TLS image needs {required}")]
    BufferTooSmall { len: usize, required: usize },
    #[error("stack region of {len} bytes cannot hold {required} bytes of TLS")]
    StackTooSmall { len: usize, required: usize },
    #[error("failed to allocate {:?} for a TLS block", layout)]
    AllocFailed { layout: Layout },
    #[error("invalid allocation layout: {err}")]
    LayoutError {
        #[from]
        err: core::alloc::LayoutError,
    },
    #[error("TLS segment has file size {filesz} larger than memory size {memsz}")]
    MalformedSegment { filesz: u64, memsz: u64 },
    #[error("parse failed: {err:?}")]
    ParseError { err: elf::ParseError },
}

impl From<elf::ParseError> for TlsError {
    fn from(err: elf::ParseError) -> Self {
        Self::ParseError { err }
    }
}
