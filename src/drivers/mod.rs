pub mod keyboard;
pub mod tty;
pub mod vga;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    keyboard::init();
    crate::log_info!("Drivers subsystem initialized.");
}
