#![cfg_attr(target_os = "uefi", no_std)]
#![cfg_attr(target_os = "uefi", no_main)]

// Host builds (workspace `cargo test`) only need something to link.
#[cfg(not(target_os = "uefi"))]
fn main() {}

#[cfg(target_os = "uefi")]
use ember_boot::{halt, BootConfig, Dispatcher, UefiFirmware};
#[cfg(target_os = "uefi")]
use uefi::prelude::*;

#[cfg(target_os = "uefi")]
#[entry]
fn efi_main(image: Handle, mut system_table: SystemTable<Boot>) -> Status {
    if uefi_services::init(&mut system_table).is_err() {
        halt();
    }

    let config = BootConfig::default();
    log::set_max_level(config.log_level);
    log::info!("Ember loader v{}", env!("CARGO_PKG_VERSION"));

    Dispatcher::new(UefiFirmware::new(image, system_table), config).run()
}
