#![cfg_attr(not(test), no_std)]

pub mod address;
pub mod handoff;

pub use address::PhysAddr;
pub use handoff::{HandoffBlock, PixelOrder, PIXEL_FORMAT_BGR, PIXEL_FORMAT_RGB};
