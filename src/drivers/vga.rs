//! VGA text-mode screens: one `u16` cell per character, attribute in the
//! high byte.

use volatile::Volatile;

use crate::config::{SCREEN_COLUMNS, SCREEN_ROWS};
use crate::drivers::tty::DisplayContext;

const COLUMNS: usize = SCREEN_COLUMNS as usize;
pub const CELLS: usize = COLUMNS * SCREEN_ROWS as usize;

const BACKSPACE: u8 = 0x08;

#[repr(transparent)]
pub struct Screen(pub [Volatile<u16>; CELLS]);

impl Screen {
    /// # Safety
    /// `base` must be an identity-mapped text buffer of at least one screen,
    /// and nothing else may hold a reference into it.
    pub unsafe fn at(base: u32) -> &'static mut Screen {
        unsafe { &mut *(base as usize as *mut Screen) }
    }

    pub fn copy_from(&mut self, other: &Screen) {
        for (dst, src) in self.0.iter_mut().zip(other.0.iter()) {
            dst.write(src.read());
        }
    }

    fn offset(display: &DisplayContext) -> usize {
        display.y as usize * COLUMNS + display.x as usize
    }

    fn scroll(&mut self, blank: u16) {
        for cell in COLUMNS..CELLS {
            let value = self.0[cell].read();
            self.0[cell - COLUMNS].write(value);
        }
        for cell in CELLS - COLUMNS..CELLS {
            self.0[cell].write(blank);
        }
    }

    /// Draw `bytes` at the cursor in `display`, handling newline, backspace,
    /// line wrap and scrolling.
    pub fn draw(&mut self, display: &mut DisplayContext, bytes: &[u8]) {
        display.x = display.x.min(SCREEN_COLUMNS - 1);
        display.y = display.y.min(SCREEN_ROWS - 1);

        let attribute = u16::from(display.attribute()) << 8;
        let blank = attribute | u16::from(b' ');
        for &byte in bytes {
            match byte {
                b'\n' | b'\r' => {
                    display.x = 0;
                    display.y += 1;
                }
                BACKSPACE => {
                    if display.x > 0 {
                        display.x -= 1;
                    } else if display.y > 0 {
                        display.y -= 1;
                        display.x = SCREEN_COLUMNS - 1;
                    }
                    self.0[Self::offset(display)].write(blank);
                }
                _ => {
                    self.0[Self::offset(display)].write(attribute | u16::from(byte));
                    display.x += 1;
                    if display.x == SCREEN_COLUMNS {
                        display.x = 0;
                        display.y += 1;
                    }
                }
            }
            if display.y == SCREEN_ROWS {
                self.scroll(blank);
                display.y = SCREEN_ROWS - 1;
            }
        }
    }
}

/// Linear cursor position as the CRTC expects it.
pub fn cursor_position(display: &DisplayContext) -> u16 {
    display.y * SCREEN_COLUMNS + display.x
}
