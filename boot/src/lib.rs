//! Ember loader
//!
//! Reads `\kernel.elf` from the boot volume, places its `PT_LOAD` segments
//! at the physical addresses they name, describes the display in a
//! [`HandoffBlock`], leaves boot services and jumps to the kernel entry point.
//!
//! All firmware access goes through the [`Firmware`] trait. On
//! `target_os = "uefi"` it is implemented by [`UefiFirmware`]; host tests
//! drive the same code through an in-memory double.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod dispatch;
pub mod elf;
pub mod error;
pub mod firmware;
pub mod handoff;
pub mod terminate;

#[cfg(target_os = "uefi")]
pub mod efi;

#[cfg(test)]
mod mock;

pub use config::BootConfig;
pub use dispatch::{halt, Dispatcher, Handoff, Stage, StageError};
pub use elf::{EntryAddress, LoadedImage};
pub use error::{BootError, BootResult, FormatError};
pub use firmware::{DisplayMode, Firmware, MapKey, PixelLayout};
pub use terminate::{BareEnvironment, ServiceTerminator};

#[cfg(target_os = "uefi")]
pub use efi::UefiFirmware;

pub use ember_types::HandoffBlock;
