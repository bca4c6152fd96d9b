//! [`Firmware`] backed by UEFI boot services.
//!
//! Graphics and file access go through the `uefi` crate's protocol wrappers.
//! GetMemoryMap and ExitBootServices are called through the raw boot
//! services table so the loader alone decides which map key is used.

use alloc::vec::Vec;
use core::alloc::Layout;
use core::ptr::NonNull;

use ember_types::{PhysAddr, PixelOrder};
use uefi::proto::console::gop::{GraphicsOutput, PixelFormat};
use uefi::proto::media::file::{File, FileAttribute, FileInfo, FileMode};
use uefi::table::boot::{
    AllocateType, MemoryType, OpenProtocolAttributes, OpenProtocolParams,
};
use uefi::table::{Boot, SystemTable};
use uefi::{CString16, Handle};
use uefi_raw::table::boot::{BootServices as RawBootServices, MemoryDescriptor};
use uefi_raw::table::system::SystemTable as RawSystemTable;

use crate::config::ModeRequest;
use crate::firmware::{
    pick_mode, DisplayMode, Firmware, MapError, MapKey, MemoryMapInfo, PixelLayout, Status,
    PAGE_SIZE,
};

/// Largest alignment AllocatePool guarantees.
const POOL_ALIGN: usize = 8;

fn layout_of(format: PixelFormat) -> Option<PixelLayout> {
    match format {
        PixelFormat::Rgb => Some(PixelOrder::Rgb),
        PixelFormat::Bgr => Some(PixelOrder::Bgr),
        _ => None,
    }
}

/// Boot-services firmware for the running image.
pub struct UefiFirmware {
    image: Handle,
    system_table: SystemTable<Boot>,
}

impl UefiFirmware {
    pub fn new(image: Handle, system_table: SystemTable<Boot>) -> Self {
        Self {
            image,
            system_table,
        }
    }

    fn raw_boot_services(&self) -> *mut RawBootServices {
        let st = self.system_table.as_ptr().cast::<RawSystemTable>();
        // Safety: the pointer comes from a live SystemTable<Boot>.
        unsafe { (*st).boot_services }
    }
}

impl Firmware for UefiFirmware {
    fn query_mode(&mut self, request: &ModeRequest) -> Result<DisplayMode, Status> {
        let bs = self.system_table.boot_services();
        let handle = bs
            .get_handle_for_protocol::<GraphicsOutput>()
            .map_err(|e| e.status())?;

        // Shared access keeps the console driver attached to the display.
        let mut gop = unsafe {
            bs.open_protocol::<GraphicsOutput>(
                OpenProtocolParams {
                    handle,
                    agent: self.image,
                    controller: None,
                },
                OpenProtocolAttributes::GetProtocol,
            )
        }
        .map_err(|e| e.status())?;

        let candidate = {
            let modes = gop.modes(bs).map(|mode| {
                let info = mode.info();
                let (width, height) = info.resolution();
                (width as u32, height as u32, layout_of(info.pixel_format()))
            });
            pick_mode(request, modes).and_then(|index| gop.modes(bs).nth(index))
        };

        match candidate {
            Some(mode) => gop.set_mode(&mode).map_err(|e| e.status())?,
            None => log::warn!("no mode >= {}x{}, keeping current", request.min_width, request.min_height),
        }

        let info = gop.current_mode_info();
        let layout = layout_of(info.pixel_format()).ok_or(Status::UNSUPPORTED)?;
        let (width, height) = info.resolution();
        let framebuffer = PhysAddr::new(gop.frame_buffer().as_mut_ptr() as u64);

        Ok(DisplayMode {
            framebuffer,
            width: width as u32,
            height: height as u32,
            stride: info.stride() as u32,
            layout,
        })
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, Status> {
        let bs = self.system_table.boot_services();
        let path = CString16::try_from(path).map_err(|_| Status::INVALID_PARAMETER)?;

        let mut fs = bs
            .get_image_file_system(self.image)
            .map_err(|e| e.status())?;
        let mut root = fs.open_volume().map_err(|e| e.status())?;
        let mut file = root
            .open(&path, FileMode::Read, FileAttribute::empty())
            .map_err(|e| e.status())?
            .into_regular_file()
            .ok_or(Status::INVALID_PARAMETER)?;

        let info = file.get_boxed_info::<FileInfo>().map_err(|e| e.status())?;
        let size = usize::try_from(info.file_size()).map_err(|_| Status::BAD_BUFFER_SIZE)?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| Status::OUT_OF_RESOURCES)?;
        bytes.resize(size, 0);

        let read = file.read(&mut bytes).map_err(|e| e.status())?;
        if read != size {
            log::debug!("short read: {} of {} bytes", read, size);
            return Err(Status::END_OF_FILE);
        }
        Ok(bytes)
    }

    fn alloc_at(&mut self, address: PhysAddr, pages: usize) -> Result<&mut [u8], Status> {
        let len = pages.checked_mul(PAGE_SIZE).ok_or(Status::INVALID_PARAMETER)?;
        let base = self
            .system_table
            .boot_services()
            .allocate_pages(
                AllocateType::Address(address.as_u64()),
                MemoryType::LOADER_DATA,
                pages,
            )
            .map_err(|e| e.status())?;

        // Safety: firmware handed us `pages` pages at `base`, identity
        // mapped while boot services run. They are never freed.
        Ok(unsafe { core::slice::from_raw_parts_mut(base as usize as *mut u8, len) })
    }

    fn alloc_any(&mut self, layout: Layout) -> Result<NonNull<u8>, Status> {
        if layout.align() > POOL_ALIGN {
            return Err(Status::INVALID_PARAMETER);
        }
        let ptr = self
            .system_table
            .boot_services()
            .allocate_pool(MemoryType::LOADER_DATA, layout.size())
            .map_err(|e| e.status())?;
        NonNull::new(ptr).ok_or(Status::OUT_OF_RESOURCES)
    }

    fn get_memory_map(&mut self, buffer: &mut [u8]) -> Result<MemoryMapInfo, MapError> {
        let bs = self.raw_boot_services();
        let mut map_size = buffer.len();
        let mut key = 0usize;
        let mut descriptor_size = 0usize;
        let mut descriptor_version = 0u32;

        // Safety: every out-pointer is a live local; the buffer is
        // `map_size` bytes. An empty buffer is only ever reported as too
        // small.
        let status = unsafe {
            ((*bs).get_memory_map)(
                &mut map_size,
                buffer.as_mut_ptr().cast::<MemoryDescriptor>(),
                &mut key,
                &mut descriptor_size,
                &mut descriptor_version,
            )
        };

        match status {
            Status::SUCCESS => Ok(MemoryMapInfo {
                key: MapKey(key),
                map_size,
                descriptor_size,
                descriptor_version,
            }),
            Status::BUFFER_TOO_SMALL => Err(MapError::BufferTooSmall {
                required: map_size,
                descriptor_size,
            }),
            status => Err(MapError::Firmware(status)),
        }
    }

    fn exit_services(&mut self, key: MapKey) -> Result<(), Status> {
        let bs = self.raw_boot_services();

        // Safety: the image handle is ours; a stale key is reported, not
        // undefined.
        let status = unsafe { ((*bs).exit_boot_services)(self.image.as_ptr(), key.0) };
        if status == Status::SUCCESS {
            Ok(())
        } else {
            Err(status)
        }
    }
}
