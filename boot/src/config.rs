//! Loader configuration.

use log::LevelFilter;

/// Path of the kernel image on the boot volume.
pub const KERNEL_PATH: &str = "\\kernel.elf";

/// Smallest graphics mode the negotiator will pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    pub min_width: u32,
    pub min_height: u32,
}

impl ModeRequest {
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        width >= self.min_width && height >= self.min_height
    }
}

impl Default for ModeRequest {
    fn default() -> Self {
        Self {
            min_width: 640,
            min_height: 480,
        }
    }
}

/// Boot configuration options consumed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    pub kernel_path: &'static str,
    pub display: ModeRequest,
    /// Total ExitBootServices calls before giving up (at least one is made).
    pub exit_attempts: u32,
    /// Spare descriptors reserved in the memory-map buffer.
    pub map_slack_descriptors: usize,
    pub log_level: LevelFilter,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            kernel_path: KERNEL_PATH,
            display: ModeRequest::default(),
            exit_attempts: 3,
            map_slack_descriptors: 8,
            log_level: if cfg!(feature = "verbose") {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
        }
    }
}
