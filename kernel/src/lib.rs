//! Ember kernel
//!
//! Receives a [`HandoffBlock`] from the loader, paints the screen and
//! idles. Everything except the entry point and the panic handler lives in
//! this library so it can be tested on the host.

#![cfg_attr(not(test), no_std)]

pub mod framebuffer;
pub mod heart;

pub use ember_types::HandoffBlock;
pub use framebuffer::{Color, Framebuffer};

/// Kernel main, called once by `_start`.
pub fn kernel_main(handoff: &HandoffBlock) -> ! {
    // Safety: the loader passes the GOP framebuffer it selected, and this is
    // the only code touching it.
    if let Some(mut fb) = unsafe { Framebuffer::from_handoff(handoff) } {
        fb.clear(Color::BLACK);
        heart::draw(&mut fb, Color::RED);
    }
    halt()
}

pub fn halt() -> ! {
    loop {
        #[cfg(target_arch = "x86_64")]
        x86_64::instructions::hlt();
        #[cfg(not(target_arch = "x86_64"))]
        core::hint::spin_loop();
    }
}
