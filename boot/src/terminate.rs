//! Boot services termination
//!
//! ExitBootServices only succeeds with the key of the *current* memory map,
//! and any allocation changes that key. The terminator therefore reserves
//! its snapshot buffer up front, then runs snapshot and exit back to back,
//! retrying a bounded number of times when the firmware reports a stale key.
//!
//! Once the first exit call has been made, only GetMemoryMap and
//! ExitBootServices are legal: nothing in the retry loop logs or allocates.

use core::alloc::Layout;

use crate::config::BootConfig;
use crate::error::{BootError, BootResult};
use crate::firmware::{Firmware, MapError, MemoryMapInfo, Status};

/// Memory map captured by the successful exit attempt.
#[derive(Debug)]
pub struct MemoryMapSnapshot {
    buffer: &'static mut [u8],
    info: MemoryMapInfo,
}

impl MemoryMapSnapshot {
    pub fn descriptor_size(&self) -> usize {
        self.info.descriptor_size
    }

    /// Filled bytes of the snapshot.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.info.map_size]
    }

    /// Raw descriptors, `descriptor_size` bytes each.
    pub fn descriptors(&self) -> impl Iterator<Item = &[u8]> {
        self.as_bytes().chunks_exact(self.info.descriptor_size.max(1))
    }
}

/// Proof that boot services are gone. Only the dispatcher's final jump
/// consumes it.
#[derive(Debug)]
pub struct BareEnvironment {
    memory_map: MemoryMapSnapshot,
}

impl BareEnvironment {
    pub fn memory_map(&self) -> &MemoryMapSnapshot {
        &self.memory_map
    }
}

/// Bounded snapshot-then-exit sequence.
#[derive(Debug, Clone, Copy)]
pub struct ServiceTerminator {
    attempts: u32,
    slack_descriptors: usize,
}

impl ServiceTerminator {
    pub fn new(config: &BootConfig) -> Self {
        Self {
            attempts: config.exit_attempts.max(1),
            slack_descriptors: config.map_slack_descriptors,
        }
    }

    /// Exit boot services.
    ///
    /// Errors carry the number of exit calls actually made; with zero the
    /// firmware console is still usable.
    pub fn terminate<F: Firmware + ?Sized>(&self, fw: &mut F) -> BootResult<BareEnvironment> {
        let buffer = self.reserve(fw)?;
        log::debug!("memory map buffer: {} bytes", buffer.len());

        let mut exits = 0;
        let mut status = Status::ABORTED;

        for _ in 0..self.attempts {
            let info = match fw.get_memory_map(buffer) {
                Ok(info) => info,
                Err(MapError::BufferTooSmall { .. }) => {
                    status = Status::BUFFER_TOO_SMALL;
                    continue;
                }
                Err(MapError::Firmware(err)) => {
                    status = err;
                    continue;
                }
            };

            exits += 1;
            match fw.exit_services(info.key) {
                Ok(()) => {
                    return Ok(BareEnvironment {
                        memory_map: MemoryMapSnapshot { buffer, info },
                    })
                }
                Err(err) => status = err,
            }
        }

        Err(BootError::ServiceTerminationFailed {
            status,
            attempts: exits,
        })
    }

    /// Size the map and allocate a zeroed buffer with room to spare.
    fn reserve<F: Firmware + ?Sized>(&self, fw: &mut F) -> BootResult<&'static mut [u8]> {
        let failed = |status| BootError::ServiceTerminationFailed {
            status,
            attempts: 0,
        };

        let (required, descriptor_size) = match fw.get_memory_map(&mut []) {
            Err(MapError::BufferTooSmall {
                required,
                descriptor_size,
            }) => (required, descriptor_size),
            Err(MapError::Firmware(status)) => return Err(failed(status)),
            // An empty map is not a thing firmware produces.
            Ok(_) => return Err(failed(Status::ABORTED)),
        };

        let size = self
            .slack_descriptors
            .checked_mul(descriptor_size)
            .and_then(|slack| slack.checked_add(required))
            .ok_or(failed(Status::BUFFER_TOO_SMALL))?;
        let layout = Layout::from_size_align(size.max(1), core::mem::align_of::<u64>())
            .map_err(|_| failed(Status::BUFFER_TOO_SMALL))?;

        let ptr = fw.alloc_any(layout).map_err(failed)?;

        // Safety: fresh pool allocation of `layout.size()` bytes that is never
        // freed and has no other owner.
        let buffer = unsafe {
            ptr.as_ptr().write_bytes(0, layout.size());
            core::slice::from_raw_parts_mut(ptr.as_ptr(), layout.size())
        };
        Ok(buffer)
    }
}
