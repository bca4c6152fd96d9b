// boot/src/error.rs
use core::fmt;

use ember_types::PhysAddr;
use uefi_raw::Status;

/// Result type for every loader stage.
pub type BootResult<T> = core::result::Result<T, BootError>;

/// Why an image was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// First four bytes are not `7F 'E' 'L' 'F'`
    BadMagic,
    /// Buffer shorter than an ELF64 header
    Truncated,
    /// Not a 64-bit image
    NotElf64,
    /// Not little endian
    NotLittleEndian,
    /// Not ET_EXEC
    NotExecutable,
    /// Program header table does not fit in the buffer
    ProgramTableOutOfBounds,
    /// Program header entry size is not the ELF64 one
    BadProgramHeaderSize(u16),
    /// A loadable segment claims more file bytes than memory bytes
    FileSizeExceedsMemSize { index: usize },
    /// A loadable segment's file bytes lie outside the buffer
    SegmentOutOfBounds { index: usize },
    /// Parser rejected the header for another reason
    Malformed(&'static str),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::BadMagic => write!(f, "bad ELF magic"),
            FormatError::Truncated => write!(f, "truncated ELF header"),
            FormatError::NotElf64 => write!(f, "not an ELF64 image"),
            FormatError::NotLittleEndian => write!(f, "not little endian"),
            FormatError::NotExecutable => write!(f, "not an executable (ET_EXEC)"),
            FormatError::ProgramTableOutOfBounds => write!(f, "program header table out of bounds"),
            FormatError::BadProgramHeaderSize(size) => {
                write!(f, "program header entry size {} (expected 56)", size)
            }
            FormatError::FileSizeExceedsMemSize { index } => {
                write!(f, "segment {}: p_filesz > p_memsz", index)
            }
            FormatError::SegmentOutOfBounds { index } => {
                write!(f, "segment {}: file data out of bounds", index)
            }
            FormatError::Malformed(msg) => write!(f, "malformed ELF: {}", msg),
        }
    }
}

/// Loader error taxonomy. Every variant is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Malformed or unrecognized image
    InvalidFormat(FormatError),
    /// Firmware could not satisfy an allocation. `address` is the fixed
    /// physical address requested, `None` for pool allocations.
    AllocationFailed {
        address: Option<PhysAddr>,
        status: Status,
    },
    /// Volume open/info/read failure
    IoFailed(Status),
    /// No graphics mode with a linear RGB/BGR framebuffer
    DisplayUnavailable(Status),
    /// Firmware declined to exit boot services. `attempts` counts the
    /// ExitBootServices calls that were made.
    ServiceTerminationFailed { status: Status, attempts: u32 },
}

impl BootError {
    /// Whether the firmware console may still be used to report this error.
    ///
    /// Once ExitBootServices has been called, even unsuccessfully, only
    /// GetMemoryMap and ExitBootServices remain legal.
    pub fn console_available(&self) -> bool {
        !matches!(
            self,
            BootError::ServiceTerminationFailed { attempts, .. } if *attempts > 0
        )
    }
}

impl From<FormatError> for BootError {
    fn from(err: FormatError) -> Self {
        BootError::InvalidFormat(err)
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::InvalidFormat(err) => write!(f, "invalid image format: {}", err),
            BootError::AllocationFailed {
                address: Some(address),
                status,
            } => write!(f, "allocation at {:#x} failed: {:?}", address, status),
            BootError::AllocationFailed {
                address: None,
                status,
            } => write!(f, "pool allocation failed: {:?}", status),
            BootError::IoFailed(status) => write!(f, "I/O error: {:?}", status),
            BootError::DisplayUnavailable(status) => {
                write!(f, "no usable graphics mode: {:?}", status)
            }
            BootError::ServiceTerminationFailed { status, attempts } => write!(
                f,
                "ExitBootServices failed after {} attempt(s): {:?}",
                attempts, status
            ),
        }
    }
}
