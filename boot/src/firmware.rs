//! Firmware capability interface.
//!
//! The loader core never touches firmware tables directly. Everything it
//! needs from the platform goes through [`Firmware`]; the UEFI implementation
//! lives in `efi.rs`, tests use an in-memory double.

use alloc::vec::Vec;
use core::alloc::Layout;
use core::ptr::NonNull;

use ember_types::{PhysAddr, PixelOrder};
pub use uefi_raw::Status;

use crate::config::ModeRequest;

/// Firmware page size.
pub const PAGE_SIZE: usize = 4096;

/// Channel layout of the chosen mode. Modes without a linear RGB/BGR
/// framebuffer are filtered out by the negotiator.
pub type PixelLayout = PixelOrder;

/// Graphics mode selected by the display negotiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    pub framebuffer: PhysAddr,
    pub width: u32,
    pub height: u32,
    /// Pixels per scan line.
    pub stride: u32,
    pub layout: PixelLayout,
}

/// Single-use token identifying one memory-map snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapKey(pub usize);

/// Metadata returned with a memory-map snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMapInfo {
    pub key: MapKey,
    /// Bytes of the buffer actually filled.
    pub map_size: usize,
    pub descriptor_size: usize,
    pub descriptor_version: u32,
}

/// GetMemoryMap outcome other than success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Buffer too small; `required` is the current map size in bytes.
    BufferTooSmall {
        required: usize,
        descriptor_size: usize,
    },
    Firmware(Status),
}

/// Boot-time services the loader depends on.
pub trait Firmware {
    /// Pick and activate a graphics mode (display negotiator).
    fn query_mode(&mut self, request: &ModeRequest) -> Result<DisplayMode, Status>;

    /// Read a whole file from the boot volume (volume reader).
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, Status>;

    /// Allocate `pages` pages at exactly `address` and return the range.
    ///
    /// The firmware must not relocate the request.
    fn alloc_at(&mut self, address: PhysAddr, pages: usize) -> Result<&mut [u8], Status>;

    /// Allocate loader-data memory anywhere. Never freed.
    fn alloc_any(&mut self, layout: Layout) -> Result<NonNull<u8>, Status>;

    /// Copy the current memory map into `buffer`.
    fn get_memory_map(&mut self, buffer: &mut [u8]) -> Result<MemoryMapInfo, MapError>;

    /// End boot services. On success no other method may be called again.
    fn exit_services(&mut self, key: MapKey) -> Result<(), Status>;
}

/// Mode selection policy: the last mode, in firmware order, that is large
/// enough and has a linear RGB/BGR framebuffer.
///
/// `modes` yields `(width, height, layout)`; `None` marks a layout the
/// loader cannot describe (bitmask, blt-only).
pub fn pick_mode<I>(request: &ModeRequest, modes: I) -> Option<usize>
where
    I: IntoIterator<Item = (u32, u32, Option<PixelLayout>)>,
{
    modes
        .into_iter()
        .enumerate()
        .filter(|(_, (width, height, layout))| layout.is_some() && request.accepts(*width, *height))
        .map(|(index, _)| index)
        .last()
}
