//! Linear framebuffer handed over by the loader.

use core::ptr::NonNull;

use ember_types::{HandoffBlock, PixelOrder};
use volatile::VolatilePtr;

/// 8-bit-per-channel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const RED: Color = Color::new(0xE0, 0x10, 0x30);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// 32-bit-per-pixel framebuffer.
pub struct Framebuffer {
    base: NonNull<u32>,
    width: usize,
    height: usize,
    /// Pixels per scan line.
    stride: usize,
    order: PixelOrder,
}

impl Framebuffer {
    /// Wrap the framebuffer described by `handoff`.
    ///
    /// Returns `None` for a null base or a stride narrower than the width.
    ///
    /// # Safety
    /// `handoff.framebuffer` must point at `stride * height` writable pixels
    /// that nothing else accesses for the lifetime of the value.
    pub unsafe fn from_handoff(handoff: &HandoffBlock) -> Option<Self> {
        let base = NonNull::new(handoff.framebuffer.cast::<u32>())?;
        if handoff.stride < handoff.width {
            return None;
        }
        Some(Self {
            base,
            width: handoff.width as usize,
            height: handoff.height as usize,
            stride: handoff.stride as usize,
            order: handoff.pixel_order(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Writes a pixel at the given coordinates.
    pub fn put_pixel(&mut self, x: usize, y: usize, color: Color) -> Result<(), &'static str> {
        if x >= self.width || y >= self.height {
            return Err("Coordinates out of bounds");
        }
        self.store(y * self.stride + x, self.order.pack(color.r, color.g, color.b));
        Ok(())
    }

    /// Fills the visible area; padding past `width` is left alone.
    pub fn clear(&mut self, color: Color) {
        let word = self.order.pack(color.r, color.g, color.b);
        for y in 0..self.height {
            for x in 0..self.width {
                self.store(y * self.stride + x, word);
            }
        }
    }

    fn store(&mut self, index: usize, word: u32) {
        // Safety: callers keep `index` below `stride * height`, which
        // `from_handoff`'s contract makes writable.
        unsafe {
            let pixel = NonNull::new_unchecked(self.base.as_ptr().add(index));
            VolatilePtr::new(pixel).write(word);
        }
    }
}
