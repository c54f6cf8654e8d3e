use crate::drivers::tty::KeyInput;

const EXTENDED_PREFIX: u8 = 0xE0;
const RELEASE_BIT: u8 = 0x80;

/// Scan-code set 1 decoder with modifier tracking.
pub struct KeyboardState {
    shift_pressed: bool,
    ctrl_pressed: bool,
    alt_pressed: bool,
    caps_lock: bool,
    extended_scancode: bool,
}

impl KeyboardState {
    pub const fn new() -> Self {
        Self {
            shift_pressed: false,
            ctrl_pressed: false,
            alt_pressed: false,
            caps_lock: false,
            extended_scancode: false,
        }
    }

    /// Feed one byte from the controller. Returns the key it completes, if
    /// any; modifiers, releases and unmapped keys yield nothing.
    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyInput> {
        if scancode == EXTENDED_PREFIX {
            self.extended_scancode = true;
            return None;
        }
        let is_extended = core::mem::replace(&mut self.extended_scancode, false);

        match scancode {
            0x2A | 0x36 if !is_extended => self.shift_pressed = true,
            0xAA | 0xB6 if !is_extended => self.shift_pressed = false,
            0x1D => self.ctrl_pressed = true,
            0x9D => self.ctrl_pressed = false,
            0x38 => self.alt_pressed = true,
            0xB8 => self.alt_pressed = false,
            0x3A if !is_extended => self.caps_lock = !self.caps_lock,
            _ if is_extended || scancode & RELEASE_BIT != 0 => {}
            _ => return self.press(scancode),
        }
        None
    }

    fn press(&self, scancode: u8) -> Option<KeyInput> {
        match scancode {
            0x1C => return Some(KeyInput::Enter),
            0x0E => return Some(KeyInput::Backspace),
            0x39 => return Some(KeyInput::Char(b' ')),
            // Alt+F1..F3
            0x3B..=0x3D if self.alt_pressed => {
                return Some(KeyInput::SwitchTerminal(usize::from(scancode - 0x3B)));
            }
            _ => {}
        }
        if self.ctrl_pressed {
            return None;
        }
        let (lower, upper) = Self::printable(scancode)?;
        Some(KeyInput::Char(self.char_with_shift(lower, upper)))
    }

    fn printable(scancode: u8) -> Option<(u8, u8)> {
        Some(match scancode {
            // Numbers
            0x02 => (b'1', b'!'),
            0x03 => (b'2', b'@'),
            0x04 => (b'3', b'#'),
            0x05 => (b'4', b'$'),
            0x06 => (b'5', b'%'),
            0x07 => (b'6', b'^'),
            0x08 => (b'7', b'&'),
            0x09 => (b'8', b'*'),
            0x0A => (b'9', b'('),
            0x0B => (b'0', b')'),
            0x0C => (b'-', b'_'),
            0x0D => (b'=', b'+'),

            // Letters Row 1
            0x10 => (b'q', b'Q'),
            0x11 => (b'w', b'W'),
            0x12 => (b'e', b'E'),
            0x13 => (b'r', b'R'),
            0x14 => (b't', b'T'),
            0x15 => (b'y', b'Y'),
            0x16 => (b'u', b'U'),
            0x17 => (b'i', b'I'),
            0x18 => (b'o', b'O'),
            0x19 => (b'p', b'P'),
            0x1A => (b'[', b'{'),
            0x1B => (b']', b'}'),

            // Letters Row 2
            0x1E => (b'a', b'A'),
            0x1F => (b's', b'S'),
            0x20 => (b'd', b'D'),
            0x21 => (b'f', b'F'),
            0x22 => (b'g', b'G'),
            0x23 => (b'h', b'H'),
            0x24 => (b'j', b'J'),
            0x25 => (b'k', b'K'),
            0x26 => (b'l', b'L'),
            0x27 => (b';', b':'),
            0x28 => (b'\'', b'"'),
            0x29 => (b'`', b'~'),
            0x2B => (b'\\', b'|'),

            // Letters Row 3
            0x2C => (b'z', b'Z'),
            0x2D => (b'x', b'X'),
            0x2E => (b'c', b'C'),
            0x2F => (b'v', b'V'),
            0x30 => (b'b', b'B'),
            0x31 => (b'n', b'N'),
            0x32 => (b'm', b'M'),
            0x33 => (b',', b'<'),
            0x34 => (b'.', b'>'),
            0x35 => (b'/', b'?'),

            _ => return None,
        })
    }

    fn char_with_shift(&self, lower: u8, upper: u8) -> u8 {
        let shift_active = if lower.is_ascii_lowercase() && self.caps_lock {
            !self.shift_pressed
        } else {
            self.shift_pressed
        };
        if shift_active {
            upper
        } else {
            lower
        }
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}
