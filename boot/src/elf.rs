//! ELF64 segment mapper
//!
//! Places the loadable segments of an `ET_EXEC` image at the physical
//! addresses its program headers name:
//! - header and program-header table are validated before anything else
//! - every `PT_LOAD` descriptor is checked before the first allocation
//! - each `PT_LOAD` gets `ceil(p_memsz / PAGE_SIZE)` pages at exactly `p_paddr`
//! - `p_filesz` bytes are copied, the following `p_memsz - p_filesz` zeroed
//!
//! This is the only module doing physical-address arithmetic.

use alloc::vec::Vec;

use ember_types::PhysAddr;
use xmas_elf::header::Type as ElfType;
use xmas_elf::program::{ProgramHeader, Type as SegmentType};
use xmas_elf::ElfFile;

use crate::error::{BootError, BootResult, FormatError};
use crate::firmware::{Firmware, Status, PAGE_SIZE};

/// ELF magic number
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// ELF Class: 64-bit
pub const ELFCLASS64: u8 = 2;

/// ELF Data: Little Endian
pub const ELFDATA2LSB: u8 = 1;

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;

const ELF64_HEADER_SIZE: usize = 64;
const ELF64_PHDR_SIZE: u16 = 56;
const HEADER_ALIGN: usize = 8;

/// Kernel entry point, a physical address.
///
/// Opaque until the dispatcher turns it into a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryAddress(u64);

impl EntryAddress {
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// One mapped `PT_LOAD` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedSegment {
    /// Index in the program header table
    pub index: usize,
    pub address: PhysAddr,
    pub pages: usize,
    pub file_size: usize,
    pub mem_size: usize,
}

impl LoadedSegment {
    pub fn zero_fill(&self) -> usize {
        self.mem_size - self.file_size
    }
}

/// Result of a successful load.
#[derive(Debug)]
pub struct LoadedImage {
    pub entry: EntryAddress,
    pub segments: Vec<LoadedSegment>,
}

/// Validated `PT_LOAD` descriptor, ready to map.
#[derive(Debug, Clone, Copy)]
struct SegmentPlan {
    index: usize,
    address: PhysAddr,
    offset: usize,
    file_size: usize,
    mem_size: usize,
    pages: usize,
}

/// Pages needed to cover `mem_size` bytes.
pub fn pages_for(mem_size: u64) -> u64 {
    mem_size.div_ceil(PAGE_SIZE as u64)
}

/// Map every loadable segment of `image` and return its entry address.
///
/// On error, segments mapped before the failing one stay allocated; there is
/// no unwinding of firmware allocations.
pub fn load<F: Firmware + ?Sized>(fw: &mut F, image: &[u8]) -> BootResult<LoadedImage> {
    if image.as_ptr() as usize % HEADER_ALIGN == 0 {
        return load_aligned(fw, image);
    }

    // The parser reads headers in place and asserts natural alignment.
    let mut words: Vec<u64> = Vec::new();
    words
        .try_reserve_exact(image.len().div_ceil(HEADER_ALIGN))
        .map_err(|_| BootError::AllocationFailed {
            address: None,
            status: Status::OUT_OF_RESOURCES,
        })?;
    words.resize(image.len().div_ceil(HEADER_ALIGN), 0);
    // Safety: `words` owns at least `image.len()` initialized bytes and
    // outlives the slice.
    let aligned =
        unsafe { core::slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), image.len()) };
    aligned.copy_from_slice(image);
    load_aligned(fw, aligned)
}

fn load_aligned<F: Firmware + ?Sized>(fw: &mut F, image: &[u8]) -> BootResult<LoadedImage> {
    let elf = parse_header(image)?;
    let entry = EntryAddress(elf.header.pt2.entry_point());
    let plan = plan_segments(&elf, image)?;

    log::debug!(
        "ELF: entry={:#x} phnum={} loadable={}",
        entry.as_u64(),
        elf.header.pt2.ph_count(),
        plan.len()
    );

    let mut segments = Vec::with_capacity(plan.len());
    for seg in &plan {
        segments.push(map_segment(fw, image, seg)?);
    }

    Ok(LoadedImage { entry, segments })
}

/// Validate the ELF header and the bounds of the program header table.
fn parse_header(image: &[u8]) -> Result<ElfFile<'_>, FormatError> {
    if image.len() < ELF_MAGIC.len() || image[..ELF_MAGIC.len()] != ELF_MAGIC {
        return Err(FormatError::BadMagic);
    }
    if image.len() < ELF64_HEADER_SIZE {
        return Err(FormatError::Truncated);
    }
    if image[EI_CLASS] != ELFCLASS64 {
        return Err(FormatError::NotElf64);
    }
    if image[EI_DATA] != ELFDATA2LSB {
        return Err(FormatError::NotLittleEndian);
    }

    let elf = ElfFile::new(image).map_err(FormatError::Malformed)?;
    let pt2 = &elf.header.pt2;

    if !matches!(pt2.type_().as_type(), ElfType::Executable) {
        return Err(FormatError::NotExecutable);
    }

    let phnum = pt2.ph_count();
    if phnum > 0 {
        let entsize = pt2.ph_entry_size();
        if entsize != ELF64_PHDR_SIZE {
            return Err(FormatError::BadProgramHeaderSize(entsize));
        }
        let phoff = pt2.ph_offset();
        let end = u64::from(phnum)
            .checked_mul(u64::from(entsize))
            .and_then(|len| phoff.checked_add(len));
        match end {
            Some(end) if phoff >= ELF64_HEADER_SIZE as u64 && end <= image.len() as u64 => {}
            _ => return Err(FormatError::ProgramTableOutOfBounds),
        }
        if phoff % HEADER_ALIGN as u64 != 0 {
            return Err(FormatError::Malformed("program header table not 8-byte aligned"));
        }
    }

    Ok(elf)
}

fn is_loadable(ph: &ProgramHeader<'_>) -> bool {
    matches!(ph.get_type(), Ok(SegmentType::Load))
}

/// Check every `PT_LOAD` descriptor; nothing is allocated yet.
fn plan_segments(elf: &ElfFile<'_>, image: &[u8]) -> Result<Vec<SegmentPlan>, FormatError> {
    let mut plan = Vec::new();

    for (index, ph) in elf.program_iter().enumerate() {
        if !is_loadable(&ph) {
            continue;
        }

        let (offset, file_size, mem_size) = (ph.offset(), ph.file_size(), ph.mem_size());
        if file_size > mem_size {
            return Err(FormatError::FileSizeExceedsMemSize { index });
        }
        // Segments without file bytes never read the buffer.
        let offset = if file_size == 0 { 0 } else { offset };
        let in_bounds = offset
            .checked_add(file_size)
            .is_some_and(|end| end <= image.len() as u64);
        if !in_bounds {
            return Err(FormatError::SegmentOutOfBounds { index });
        }

        let oversized = FormatError::Malformed("segment larger than the address space");
        let mem_size = usize::try_from(mem_size).map_err(|_| oversized)?;
        let pages = usize::try_from(pages_for(mem_size as u64)).map_err(|_| oversized)?;

        plan.push(SegmentPlan {
            index,
            address: PhysAddr::new(ph.physical_addr()),
            // Both bounded by image.len() above.
            offset: offset as usize,
            file_size: file_size as usize,
            mem_size,
            pages,
        });
    }

    Ok(plan)
}

/// Allocate, copy and zero-fill one segment.
fn map_segment<F: Firmware + ?Sized>(
    fw: &mut F,
    image: &[u8],
    seg: &SegmentPlan,
) -> BootResult<LoadedSegment> {
    log::debug!(
        "  segment {}: paddr={:#x} filesz={:#x} memsz={:#x} pages={}",
        seg.index,
        seg.address,
        seg.file_size,
        seg.mem_size,
        seg.pages
    );

    let failed = |status| BootError::AllocationFailed {
        address: Some(seg.address),
        status,
    };
    let region = fw.alloc_at(seg.address, seg.pages).map_err(failed)?;
    if region.len() < seg.mem_size {
        return Err(failed(Status::BAD_BUFFER_SIZE));
    }

    let (data, rest) = region.split_at_mut(seg.file_size);
    data.copy_from_slice(&image[seg.offset..seg.offset + seg.file_size]);
    rest[..seg.mem_size - seg.file_size].fill(0);

    Ok(LoadedSegment {
        index: seg.index,
        address: seg.address,
        pages: seg.pages,
        file_size: seg.file_size,
        mem_size: seg.mem_size,
    })
}
