//! Boot-time handoff record shared between the loader and the kernel.
//!
//! The loader writes one `HandoffBlock` into firmware pool memory and passes
//! its address as the only argument of the kernel entry point. Both sides
//! compile against this definition, so the layout below is the ABI.

use static_assertions::{assert_eq_align, assert_eq_size, const_assert_eq};

/// `pixel_format` tag: bytes in memory are R, G, B, reserved.
pub const PIXEL_FORMAT_RGB: u32 = 0;
/// `pixel_format` tag: bytes in memory are B, G, R, reserved.
pub const PIXEL_FORMAT_BGR: u32 = 1;

/// Channel order of a 32-bit framebuffer pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelOrder {
    /// Red in the lowest byte ("direct" order).
    Rgb,
    /// Blue in the lowest byte (reversed order).
    Bgr,
}

impl PixelOrder {
    pub const fn tag(self) -> u32 {
        match self {
            PixelOrder::Rgb => PIXEL_FORMAT_RGB,
            PixelOrder::Bgr => PIXEL_FORMAT_BGR,
        }
    }

    /// Any tag other than `PIXEL_FORMAT_RGB` reads as BGR.
    pub const fn from_tag(tag: u32) -> Self {
        if tag == PIXEL_FORMAT_RGB {
            PixelOrder::Rgb
        } else {
            PixelOrder::Bgr
        }
    }

    /// Packs an 8-bit-per-channel color into the 32-bit pixel word for this
    /// order (little-endian, reserved byte zero).
    pub const fn pack(self, r: u8, g: u8, b: u8) -> u32 {
        let (lo, hi) = match self {
            PixelOrder::Rgb => (r, b),
            PixelOrder::Bgr => (b, r),
        };
        (lo as u32) | (g as u32) << 8 | (hi as u32) << 16
    }
}

/// Display description handed to the kernel.
///
/// Allocated by the loader, never freed: it must stay valid for as long as
/// the kernel runs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffBlock {
    /// Linear framebuffer base (physical, identity mapped).
    pub framebuffer: *mut u8,
    /// Visible width in pixels.
    pub width: u32,
    /// Visible height in pixels.
    pub height: u32,
    /// Pixels per scan line (not bytes).
    pub stride: u32,
    /// `PIXEL_FORMAT_RGB` or `PIXEL_FORMAT_BGR`.
    pub pixel_format: u32,
}

impl HandoffBlock {
    pub fn pixel_order(&self) -> PixelOrder {
        PixelOrder::from_tag(self.pixel_format)
    }
}

assert_eq_size!(HandoffBlock, [u8; 24]);
assert_eq_align!(HandoffBlock, u64);
const_assert_eq!(core::mem::offset_of!(HandoffBlock, framebuffer), 0);
const_assert_eq!(core::mem::offset_of!(HandoffBlock, width), 8);
const_assert_eq!(core::mem::offset_of!(HandoffBlock, height), 12);
const_assert_eq!(core::mem::offset_of!(HandoffBlock, stride), 16);
const_assert_eq!(core::mem::offset_of!(HandoffBlock, pixel_format), 20);
