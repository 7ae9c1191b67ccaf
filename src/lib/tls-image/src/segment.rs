//! Reading the TLS image out of an ELF file's `PT_TLS` program header.
use elf::{abi::PT_TLS, endian::AnyEndian, segment::ProgramHeader, ElfBytes};
use tracing::debug;

use crate::{TlsError, TlsImage, TlsLayout};

fn to_usize(value: u64) -> Result<usize, TlsError> {
    usize::try_from(value).map_err(|_| TlsError::Overflow)
}

impl TlsLayout {
    /// Layout described by a `PT_TLS` program header. Both regions share the
    /// segment's alignment; an alignment of zero means unaligned.
    pub fn from_program_header(phdr: &ProgramHeader) -> Result<Self, TlsError> {
        if phdr.p_filesz > phdr.p_memsz {
            return Err(TlsError::MalformedSegment {
                filesz: phdr.p_filesz,
                memsz: phdr.p_memsz,
            });
        }
        let align = to_usize(phdr.p_align.max(1))?;
        let data_size = to_usize(phdr.p_filesz)?;
        let bss_size = to_usize(phdr.p_memsz - phdr.p_filesz)?;
        TlsLayout::try_new(data_size, align, bss_size, align)
    }
}

impl<'a> TlsImage<'a> {
    /// Find the TLS image in an ELF file. Returns `Ok(None)` if the file has no
    /// `PT_TLS` segment.
    pub fn from_elf(data: &'a [u8]) -> Result<Option<Self>, TlsError> {
        let elf = ElfBytes::<AnyEndian>::minimal_parse(data)?;
        let Some(phdr) = elf
            .segments()
            .and_then(|phdrs| phdrs.iter().find(|phdr| phdr.p_type == PT_TLS))
        else {
            debug!("no TLS segment in ELF image");
            return Ok(None);
        };

        let layout = TlsLayout::from_program_header(&phdr)?;
        let template = elf.segment_data(&phdr)?;
        let image = TlsImage::new(template, layout)?;
        debug!(
            "found TLS segment at {:#x} (tdata: {}, tbss: {}, align: {}, footprint: {})",
            phdr.p_vaddr,
            layout.data_size(),
            layout.bss_size(),
            layout.data_align(),
            layout.footprint()
        );
        Ok(Some(image))
    }
}
