//! Boot sequence
//!
//! Display → read image → load image → handoff block → exit boot services
//! → jump. The first failing stage is reported once on the firmware console
//! and the machine halts; on success control never comes back.

use core::fmt;

use ember_types::HandoffBlock;

use crate::config::BootConfig;
use crate::elf::{self, EntryAddress};
use crate::error::BootError;
use crate::firmware::Firmware;
use crate::handoff::{self, HandoffAddress};
use crate::terminate::{BareEnvironment, ServiceTerminator};

/// Kernel entry point signature.
#[cfg(target_arch = "x86_64")]
pub type KernelEntry = extern "sysv64" fn(*const HandoffBlock);
#[cfg(not(target_arch = "x86_64"))]
pub type KernelEntry = extern "C" fn(*const HandoffBlock);

/// Boot stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Stage {
    /// Graphics mode selection
    Display = 1,
    /// Reading the kernel file
    ReadImage = 2,
    /// Mapping PT_LOAD segments
    LoadImage = 3,
    /// Publishing the handoff block
    Handoff = 4,
    /// ExitBootServices
    ExitBootServices = 5,
}

impl Stage {
    pub const COUNT: u8 = 5;

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Display => "display",
            Stage::ReadImage => "read image",
            Stage::LoadImage => "load image",
            Stage::Handoff => "handoff",
            Stage::ExitBootServices => "exit boot services",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A [`BootError`] tagged with the stage that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageError {
    pub stage: Stage,
    pub error: BootError,
}

impl StageError {
    fn at(stage: Stage) -> impl Fn(BootError) -> Self {
        move |error| Self { stage, error }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boot failed at stage {}: {}", self.stage, self.error)
    }
}

/// Everything the final jump needs. Only obtainable once boot services are
/// gone.
#[derive(Debug)]
pub struct Handoff {
    entry: EntryAddress,
    block: HandoffAddress,
    environment: BareEnvironment,
}

impl Handoff {
    pub fn entry(&self) -> EntryAddress {
        self.entry
    }

    pub fn block(&self) -> HandoffAddress {
        self.block
    }

    pub fn environment(&self) -> &BareEnvironment {
        &self.environment
    }

    /// Jump into the kernel.
    ///
    /// # Safety
    /// The entry address must point at code loaded by the segment mapper.
    pub unsafe fn enter(self) -> ! {
        transfer(self.entry, self.block, self.environment)
    }
}

/// Call the kernel entry point with the handoff block as sole argument.
///
/// # Safety
/// `entry` must be the entry point of a loaded image expecting a
/// `*const HandoffBlock` under [`KernelEntry`]'s calling convention.
pub unsafe fn transfer(entry: EntryAddress, block: HandoffAddress, _env: BareEnvironment) -> ! {
    let address = entry.as_u64() as usize;
    if address == 0 {
        halt();
    }

    let kernel = core::mem::transmute::<usize, KernelEntry>(address);
    kernel(block.as_ptr());

    halt()
}

/// Stop the processor for good.
pub fn halt() -> ! {
    loop {
        #[cfg(target_arch = "x86_64")]
        x86_64::instructions::hlt();
        #[cfg(not(target_arch = "x86_64"))]
        core::hint::spin_loop();
    }
}

/// Runs the boot stages against one firmware.
pub struct Dispatcher<F: Firmware> {
    fw: F,
    config: BootConfig,
}

impl<F: Firmware> Dispatcher<F> {
    pub fn new(fw: F, config: BootConfig) -> Self {
        Self { fw, config }
    }

    /// Run every stage up to and including ExitBootServices.
    pub fn prepare(&mut self) -> Result<Handoff, StageError> {
        log::info!("[1/{}] Selecting display mode", Stage::COUNT);
        let mode = self
            .fw
            .query_mode(&self.config.display)
            .map_err(BootError::DisplayUnavailable)
            .map_err(StageError::at(Stage::Display))?;
        log::info!(
            "✓ Display {}x{} stride={} {:?} fb={:#x}",
            mode.width,
            mode.height,
            mode.stride,
            mode.layout,
            mode.framebuffer
        );

        log::info!("[2/{}] Reading {}", Stage::COUNT, self.config.kernel_path);
        let image = self
            .fw
            .read_file(self.config.kernel_path)
            .map_err(BootError::IoFailed)
            .map_err(StageError::at(Stage::ReadImage))?;
        log::info!("✓ Read {} bytes", image.len());

        log::info!("[3/{}] Loading kernel", Stage::COUNT);
        let loaded = elf::load(&mut self.fw, &image).map_err(StageError::at(Stage::LoadImage))?;
        log::info!(
            "✓ Kernel loaded: {} segment(s), entry {:#x}",
            loaded.segments.len(),
            loaded.entry.as_u64()
        );
        let entry = loaded.entry;
        // Heap buffers must be released while FreePool is still callable.
        drop(loaded);
        drop(image);

        log::info!("[4/{}] Publishing handoff block", Stage::COUNT);
        let block = handoff::publish(&mut self.fw, handoff::build(&mode))
            .map_err(StageError::at(Stage::Handoff))?;
        log::info!("✓ Handoff block at {:p}", block.as_ptr());

        log::info!("[5/{}] Exiting boot services", Stage::COUNT);
        let environment = ServiceTerminator::new(&self.config)
            .terminate(&mut self.fw)
            .map_err(StageError::at(Stage::ExitBootServices))?;

        Ok(Handoff {
            entry,
            block,
            environment,
        })
    }

    /// Boot the kernel, or report why not and halt.
    pub fn run(mut self) -> ! {
        match self.prepare() {
            // Safety: the entry point comes from the image just loaded.
            Ok(handoff) => unsafe { handoff.enter() },
            Err(err) => {
                if err.error.console_available() {
                    log::error!("{}", err);
                }
                halt()
            }
        }
    }
}
