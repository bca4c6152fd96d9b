#![no_std]
#![no_main]

use core::panic::PanicInfo;

use ember_kernel::{halt, kernel_main, HandoffBlock};

/// Entry point. The loader calls this with the System V ABI and the address
/// of the handoff block in `rdi`, on its own stack, with interrupts as the
/// firmware left them.
#[no_mangle]
#[link_section = ".text._start"]
pub extern "sysv64" fn _start(handoff: *const HandoffBlock) -> ! {
    // Safety: the loader publishes the block in memory it never frees.
    match unsafe { handoff.as_ref() } {
        Some(handoff) => kernel_main(handoff),
        None => halt(),
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    halt()
}
