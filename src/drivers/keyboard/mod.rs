pub mod scancodes;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::drivers::tty::KeyInput;
use scancodes::KeyboardState;

#[cfg(all(target_arch = "x86", target_os = "none"))]
const DATA_PORT: u16 = 0x60;

lazy_static! {
    pub static ref KEYBOARD_STATE: Mutex<KeyboardState> = Mutex::new(KeyboardState::new());
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    // Drain whatever the 8042 latched before we were listening.
    let _ = read_scancode();
    crate::log_info!("PS/2 keyboard driver initialized.");
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn read_scancode() -> u8 {
    unsafe { x86::io::inb(DATA_PORT) }
}

/// Run `scancode` through the shared decoder state.
pub fn decode(scancode: u8) -> Option<KeyInput> {
    KEYBOARD_STATE.lock().process_scancode(scancode)
}
