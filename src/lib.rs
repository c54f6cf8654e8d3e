#![cfg_attr(not(test), no_std)]
#![cfg_attr(all(target_arch = "x86", target_os = "none"), feature(abi_x86_interrupt))]

pub mod arch;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod kernel;
pub mod loader;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod serial;
pub mod sync;
pub mod syscalls;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod boot;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod interrupts;

#[cfg(test)]
mod testing;

pub use error::{KernelError, KernelResult};
pub use kernel::Kernel;

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[no_mangle]
pub extern "C" fn kernel_main(magic: u32, info: u32) -> ! {
    serial::init();
    log_info!("TriadOS kernel started.");

    let storage = boot::boot_filesystem(magic, info);
    interrupts::init();
    drivers::init();
    if let Err(e) = interrupts::install(storage) {
        panic!("kernel boot failed: {}", e);
    }
    log_info!("TriadOS is running; waiting for the first tick.");

    // Idle task.
    loop {
        arch::cpu::enable_and_hlt();
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log_error!("{}", info);
    loop {
        arch::cpu::disable();
        arch::cpu::hlt();
    }
}
