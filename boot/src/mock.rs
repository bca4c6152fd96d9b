//! Test doubles: an in-memory [`Firmware`] and an ELF64 image builder.
//!
//! `MockFirmware` simulates physical memory with one buffer per fixed
//! allocation, keeps a ledger of every call, and models the memory-map key
//! as a generation counter bumped by every allocation. It panics on any call
//! made after a successful `exit_services`.

use std::collections::HashMap;

use core::alloc::Layout;
use core::ptr::NonNull;

use ember_types::{PhysAddr, PixelOrder};

use crate::config::ModeRequest;
use crate::firmware::{
    DisplayMode, Firmware, MapError, MapKey, MemoryMapInfo, Status, PAGE_SIZE,
};

pub const MOCK_DESCRIPTOR_SIZE: usize = 48;
const BASE_MAP_ENTRIES: usize = 32;
/// Fill pattern for freshly allocated memory, so missed zero-fills show up.
pub const GARBAGE: u8 = 0xA5;
const MAX_REGION_BYTES: usize = 64 * 1024 * 1024;

/// Ledger entry for one firmware call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    QueryMode,
    ReadFile(String),
    AllocAt { address: PhysAddr, pages: usize },
    AllocAny { size: usize },
    GetMemoryMap { capacity: usize },
    ExitServices { key: MapKey },
}

#[derive(Debug)]
pub struct FixedRegion {
    pub address: PhysAddr,
    pub pages: usize,
    pub bytes: Vec<u8>,
}

impl FixedRegion {
    fn overlaps(&self, address: u64, len: usize) -> bool {
        let start = self.address.as_u64();
        let end = start + self.bytes.len() as u64;
        address < end && start < address + len as u64
    }
}

pub fn default_mode() -> DisplayMode {
    DisplayMode {
        framebuffer: PhysAddr::new(0x8000_0000),
        width: 1024,
        height: 768,
        stride: 1024,
        layout: PixelOrder::Bgr,
    }
}

pub struct MockFirmware {
    pub mode: Result<DisplayMode, Status>,
    files: HashMap<String, Vec<u8>>,
    refused: Vec<PhysAddr>,
    regions: Vec<FixedRegion>,
    pool: Vec<Box<[u64]>>,
    pool_exhausted: bool,
    generation: usize,
    extra_entries: usize,
    disturbances: u32,
    map_failure: Option<Status>,
    exited: bool,
    calls: Vec<Call>,
}

impl MockFirmware {
    pub fn new() -> Self {
        Self {
            mode: Ok(default_mode()),
            files: HashMap::new(),
            refused: Vec::new(),
            regions: Vec::new(),
            pool: Vec::new(),
            pool_exhausted: false,
            generation: 1,
            extra_entries: 0,
            disturbances: 0,
            map_failure: None,
            exited: false,
            calls: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(path.to_string(), bytes);
        self
    }

    /// Any fixed allocation covering `page` is refused.
    pub fn refuse(mut self, page: u64) -> Self {
        self.refused.push(PhysAddr::new(page));
        self
    }

    pub fn exhaust_pool(mut self) -> Self {
        self.pool_exhausted = true;
        self
    }

    /// The next `count` successful snapshots are followed by a firmware-side
    /// map change (timer event allocating memory, for instance).
    pub fn disturb_map(mut self, count: u32) -> Self {
        self.disturbances = count;
        self
    }

    pub fn fail_map(mut self, status: Status) -> Self {
        self.map_failure = Some(status);
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn exited(&self) -> bool {
        self.exited
    }

    /// `(address, pages)` of every fixed allocation, in request order.
    pub fn fixed_allocations(&self) -> Vec<(PhysAddr, usize)> {
        self.regions.iter().map(|r| (r.address, r.pages)).collect()
    }

    pub fn region(&self, address: u64) -> Option<&FixedRegion> {
        self.regions.iter().find(|r| r.address.as_u64() == address)
    }

    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Every ExitBootServices call must directly follow a snapshot.
    pub fn assert_exit_follows_snapshot(&self) {
        for (i, call) in self.calls.iter().enumerate() {
            if let Call::ExitServices { .. } = call {
                assert!(
                    i > 0 && matches!(self.calls[i - 1], Call::GetMemoryMap { .. }),
                    "ExitServices at {} not preceded by GetMemoryMap: {:?}",
                    i,
                    self.calls
                );
            }
        }
    }

    fn assert_live(&self) {
        assert!(!self.exited, "firmware call after ExitBootServices");
    }

    fn map_entries(&self) -> usize {
        BASE_MAP_ENTRIES + self.regions.len() + self.pool.len() + self.extra_entries
    }

    fn firmware_event(&mut self) {
        self.generation += 1;
        self.extra_entries += 1;
    }
}

impl Firmware for MockFirmware {
    fn query_mode(&mut self, _request: &ModeRequest) -> Result<DisplayMode, Status> {
        self.assert_live();
        self.calls.push(Call::QueryMode);
        self.mode
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, Status> {
        self.assert_live();
        self.calls.push(Call::ReadFile(path.to_string()));
        self.files.get(path).cloned().ok_or(Status::NOT_FOUND)
    }

    fn alloc_at(&mut self, address: PhysAddr, pages: usize) -> Result<&mut [u8], Status> {
        self.assert_live();
        self.calls.push(Call::AllocAt { address, pages });

        if !address.is_aligned(PAGE_SIZE as u64) {
            return Err(Status::INVALID_PARAMETER);
        }
        let len = pages
            .checked_mul(PAGE_SIZE)
            .filter(|len| *len <= MAX_REGION_BYTES)
            .ok_or(Status::OUT_OF_RESOURCES)?;
        let start = address.as_u64();
        let refused = self
            .refused
            .iter()
            .any(|page| page.as_u64() >= start && page.as_u64() < start + len as u64);
        if refused || self.regions.iter().any(|r| r.overlaps(start, len)) {
            return Err(Status::NOT_FOUND);
        }

        self.generation += 1;
        self.regions.push(FixedRegion {
            address,
            pages,
            bytes: vec![GARBAGE; len],
        });
        let region = self.regions.last_mut().expect("region just pushed");
        Ok(&mut region.bytes[..])
    }

    fn alloc_any(&mut self, layout: Layout) -> Result<NonNull<u8>, Status> {
        self.assert_live();
        self.calls.push(Call::AllocAny {
            size: layout.size(),
        });

        if self.pool_exhausted {
            return Err(Status::OUT_OF_RESOURCES);
        }
        if layout.align() > core::mem::align_of::<u64>() {
            return Err(Status::INVALID_PARAMETER);
        }
        let words = layout.size().div_ceil(8).max(1);
        let mut block = vec![u64::from_ne_bytes([GARBAGE; 8]); words].into_boxed_slice();
        let ptr = NonNull::new(block.as_mut_ptr().cast::<u8>()).ok_or(Status::OUT_OF_RESOURCES)?;
        self.pool.push(block);
        self.generation += 1;
        Ok(ptr)
    }

    fn get_memory_map(&mut self, buffer: &mut [u8]) -> Result<MemoryMapInfo, MapError> {
        self.assert_live();
        self.calls.push(Call::GetMemoryMap {
            capacity: buffer.len(),
        });

        if let Some(status) = self.map_failure {
            return Err(MapError::Firmware(status));
        }
        let required = self.map_entries() * MOCK_DESCRIPTOR_SIZE;
        if buffer.len() < required {
            return Err(MapError::BufferTooSmall {
                required,
                descriptor_size: MOCK_DESCRIPTOR_SIZE,
            });
        }
        buffer[..required].fill(0x4D);
        let info = MemoryMapInfo {
            key: MapKey(self.generation),
            map_size: required,
            descriptor_size: MOCK_DESCRIPTOR_SIZE,
            descriptor_version: 1,
        };
        if self.disturbances > 0 {
            self.disturbances -= 1;
            self.firmware_event();
        }
        Ok(info)
    }

    fn exit_services(&mut self, key: MapKey) -> Result<(), Status> {
        self.assert_live();
        self.calls.push(Call::ExitServices { key });

        if key.0 != self.generation {
            return Err(Status::INVALID_PARAMETER);
        }
        self.exited = true;
        Ok(())
    }
}

// ─── ELF64 image builder ─────────────────────────────────────────────────────

pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PT_NOTE: u32 = 4;
pub const PT_GNU_STACK: u32 = 0x6474_e551;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;

#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub p_type: u32,
    pub paddr: u64,
    pub data: Vec<u8>,
    pub mem_size: u64,
    /// Overrides the computed file offset.
    pub offset: Option<u64>,
}

impl SegmentSpec {
    pub fn load(paddr: u64, data: Vec<u8>, mem_size: u64) -> Self {
        Self {
            p_type: PT_LOAD,
            paddr,
            data,
            mem_size,
            offset: None,
        }
    }

    pub fn other(p_type: u32, data: Vec<u8>) -> Self {
        let mem_size = data.len() as u64;
        Self {
            p_type,
            paddr: 0,
            data,
            mem_size,
            offset: None,
        }
    }

    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Builds ET_EXEC x86_64 images: header, program headers at offset 64, then
/// each segment's file bytes in table order.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    pub entry: u64,
    pub magic: [u8; 4],
    pub class: u8,
    pub data_encoding: u8,
    pub e_type: u16,
    pub phoff: Option<u64>,
    pub phnum: Option<u16>,
    pub phentsize: u16,
    pub segments: Vec<SegmentSpec>,
}

impl ImageBuilder {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            magic: [0x7F, b'E', b'L', b'F'],
            class: 2,
            data_encoding: 1,
            e_type: 2,
            phoff: None,
            phnum: None,
            phentsize: PHDR_SIZE as u16,
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, spec: SegmentSpec) -> Self {
        self.segments.push(spec);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let table_len = PHDR_SIZE * self.segments.len();
        let mut image = vec![0u8; EHDR_SIZE + table_len];

        image[0..4].copy_from_slice(&self.magic);
        image[4] = self.class;
        image[5] = self.data_encoding;
        image[6] = 1; // EI_VERSION
        put16(&mut image, 16, self.e_type);
        put16(&mut image, 18, 62); // EM_X86_64
        put32(&mut image, 20, 1);
        put64(&mut image, 24, self.entry);
        put64(&mut image, 32, self.phoff.unwrap_or(EHDR_SIZE as u64));
        put16(&mut image, 52, EHDR_SIZE as u16);
        put16(&mut image, 54, self.phentsize);
        put16(
            &mut image,
            56,
            self.phnum.unwrap_or(self.segments.len() as u16),
        );

        for (i, seg) in self.segments.iter().enumerate() {
            let offset = seg.offset.unwrap_or(image.len() as u64);
            if seg.offset.is_none() {
                image.extend_from_slice(&seg.data);
            }
            let ph = EHDR_SIZE + i * PHDR_SIZE;
            put32(&mut image, ph, seg.p_type);
            put32(&mut image, ph + 4, 0x5); // R+X
            put64(&mut image, ph + 8, offset);
            put64(&mut image, ph + 16, seg.paddr);
            put64(&mut image, ph + 24, seg.paddr);
            put64(&mut image, ph + 32, seg.data.len() as u64);
            put64(&mut image, ph + 40, seg.mem_size);
            put64(&mut image, ph + 48, PAGE_SIZE as u64);
        }
        image
    }
}

fn put16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}
