//! Handoff block construction and publication.

use core::alloc::Layout;
use core::ptr::NonNull;

use ember_types::HandoffBlock;

use crate::error::{BootError, BootResult};
use crate::firmware::{DisplayMode, Firmware};

/// Address of a published [`HandoffBlock`] in loader-data pool memory.
///
/// The memory is never freed; it belongs to the kernel after the jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffAddress(NonNull<HandoffBlock>);

impl HandoffAddress {
    pub fn as_ptr(&self) -> *const HandoffBlock {
        self.0.as_ptr()
    }
}

/// Describe `mode` for the kernel.
pub fn build(mode: &DisplayMode) -> HandoffBlock {
    HandoffBlock {
        framebuffer: mode.framebuffer.as_u64() as usize as *mut u8,
        width: mode.width,
        height: mode.height,
        stride: mode.stride,
        pixel_format: mode.layout.tag(),
    }
}

/// Copy `block` into pool memory that outlives boot services.
pub fn publish<F: Firmware + ?Sized>(fw: &mut F, block: HandoffBlock) -> BootResult<HandoffAddress> {
    let ptr = fw
        .alloc_any(Layout::new::<HandoffBlock>())
        .map_err(|status| BootError::AllocationFailed {
            address: None,
            status,
        })?
        .cast::<HandoffBlock>();

    // Safety: the firmware returned a fresh allocation sized and aligned for
    // a HandoffBlock that nothing else references.
    unsafe { ptr.as_ptr().write(block) };

    Ok(HandoffAddress(ptr))
}
