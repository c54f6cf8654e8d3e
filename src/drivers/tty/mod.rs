//! Virtual terminal sessions.
//!
//! Three sessions share one physical VGA text buffer. Each owns an input
//! line, a display context and an off-screen copy of its screen; the
//! foreground session draws straight to the hardware buffer while the others
//! draw into their shadow screens.

use heapless::Vec;

use crate::arch::Platform;
use crate::config::{LINE_BUFFER_SIZE, NUM_TERMINALS, VIDEO_MEMORY};
use crate::error::{KernelError, KernelResult};
use crate::memory::shadow_screen;
use crate::sync::WaitFlag;

pub type TerminalId = usize;

pub mod color {
    pub const BLACK: u8 = 0x0;
    pub const GREEN: u8 = 0x2;
    pub const RED: u8 = 0x4;
    pub const WHITE: u8 = 0xF;
}

/// Foreground/background colours of each session, so they can be told apart
/// at a glance.
const SESSION_COLORS: [(u8, u8); NUM_TERMINALS] = [
    (color::WHITE, color::BLACK),
    (color::BLACK, color::GREEN),
    (color::RED, color::WHITE),
];

/// Cursor, colours and backing screen of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayContext {
    pub x: u16,
    pub y: u16,
    pub fg: u8,
    pub bg: u8,
    /// The session's shadow screen; fixed for the session's lifetime.
    pub screen: u32,
}

impl DisplayContext {
    pub const fn new(fg: u8, bg: u8, screen: u32) -> Self {
        DisplayContext { x: 0, y: 0, fg, bg, screen }
    }

    /// Copy cursor and colours from `live`, keeping our own screen.
    pub fn save_from(&mut self, live: &DisplayContext) {
        self.x = live.x;
        self.y = live.y;
        self.fg = live.fg;
        self.bg = live.bg;
    }

    /// VGA attribute byte for the current colours.
    pub fn attribute(&self) -> u8 {
        (self.bg << 4) | (self.fg & 0x0F)
    }
}

/// Keys the line discipline understands. Scan-code decoding happens in the
/// keyboard driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(u8),
    Backspace,
    Enter,
    /// Bring session `n` to the foreground.
    SwitchTerminal(TerminalId),
}

/// One input line and its "line completed" flag.
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8, LINE_BUFFER_SIZE>,
    complete: WaitFlag,
}

impl LineBuffer {
    pub const fn new() -> Self {
        LineBuffer { bytes: Vec::new(), complete: WaitFlag::new() }
    }

    /// Append a typed byte. The last slot is kept for the newline, and
    /// nothing is accepted once the line is complete.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.complete.is_set() || self.bytes.len() >= LINE_BUFFER_SIZE - 1 {
            return false;
        }
        self.bytes.push(byte).is_ok()
    }

    pub fn backspace(&mut self) -> bool {
        if self.complete.is_set() {
            return false;
        }
        self.bytes.pop().is_some()
    }

    /// Terminate the line with `\n` and wake the reader.
    pub fn finish(&mut self) -> bool {
        if self.complete.is_set() {
            return false;
        }
        let _ = self.bytes.push(b'\n');
        self.complete.notify();
        true
    }

    pub fn is_complete(&self) -> bool {
        self.complete.is_set()
    }

    /// Move the completed line into `buf`. The last byte copied is always a
    /// newline. Returns `None` while the line is still being typed.
    pub fn take_line(&mut self, buf: &mut [u8]) -> Option<usize> {
        if buf.is_empty() {
            return Some(0);
        }
        if !self.complete.take() {
            return None;
        }
        let n = buf.len().min(self.bytes.len());
        buf[..n].copy_from_slice(&self.bytes[..n]);
        if n > 0 {
            buf[n - 1] = b'\n';
        }
        self.bytes.clear();
        Some(n)
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.complete.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub struct Session {
    pub id: TerminalId,
    pub enabled: bool,
    /// Set once the session's base shell has been attached.
    pub bootstrapped: bool,
    pub input: LineBuffer,
    pub display: DisplayContext,
}

impl Session {
    fn new(id: TerminalId) -> Self {
        let (fg, bg) = SESSION_COLORS[id];
        Session {
            id,
            enabled: false,
            bootstrapped: false,
            input: LineBuffer::new(),
            display: DisplayContext::new(fg, bg, shadow_screen(id)),
        }
    }
}

pub struct Terminals {
    sessions: [Session; NUM_TERMINALS],
    foreground: TerminalId,
    /// Display context the renderer is currently using.
    live: DisplayContext,
    /// Session `live` belongs to.
    live_owner: TerminalId,
    /// Screen buffer the renderer is currently drawing into.
    display_base: u32,
}

impl Terminals {
    pub fn new() -> Self {
        let sessions = core::array::from_fn(Session::new);
        let live = sessions[0].display;
        Terminals {
            sessions,
            foreground: 0,
            live,
            live_owner: 0,
            display_base: VIDEO_MEMORY,
        }
    }

    pub fn session(&self, id: TerminalId) -> &Session {
        &self.sessions[id]
    }

    pub fn session_mut(&mut self, id: TerminalId) -> &mut Session {
        &mut self.sessions[id]
    }

    pub fn foreground(&self) -> TerminalId {
        self.foreground
    }

    pub fn live(&self) -> &DisplayContext {
        &self.live
    }

    pub fn live_mut(&mut self) -> &mut DisplayContext {
        &mut self.live
    }

    pub fn live_owner(&self) -> TerminalId {
        self.live_owner
    }

    pub fn display_base(&self) -> u32 {
        self.display_base
    }

    pub fn set_display_base(&mut self, base: u32) {
        self.display_base = base;
    }

    pub fn enable(&mut self, id: TerminalId) {
        self.sessions[id].enabled = true;
    }

    /// Where output for session `id` currently has to go.
    pub fn screen_for(&self, id: TerminalId) -> u32 {
        if id == self.foreground {
            VIDEO_MEMORY
        } else {
            shadow_screen(id)
        }
    }

    /// Persist the live cursor and colours into session `id`.
    pub fn save_display(&mut self, id: TerminalId) {
        let live = self.live;
        self.sessions[id].display.save_from(&live);
    }

    /// Make session `id`'s saved context the live one.
    pub fn restore_display(&mut self, id: TerminalId) {
        self.live = self.sessions[id].display;
        self.live_owner = id;
    }

    /// The context output for session `id` must advance.
    pub fn display_mut(&mut self, id: TerminalId) -> &mut DisplayContext {
        if id == self.live_owner {
            &mut self.live
        } else {
            &mut self.sessions[id].display
        }
    }

    /// Hand the completed input line of session `id` to a reader.
    pub fn read_line(&mut self, id: TerminalId, buf: &mut [u8]) -> KernelResult<usize> {
        let session = &mut self.sessions[id];
        if !session.enabled {
            return Err(KernelError::SessionDisabled);
        }
        session.input.take_line(buf).ok_or(KernelError::WouldBlock)
    }

    /// Draw `bytes` for session `id`, skipping NUL bytes. Returns how many
    /// bytes were drawn.
    pub fn write(
        &mut self,
        id: TerminalId,
        platform: &mut dyn Platform,
        bytes: &[u8],
    ) -> KernelResult<usize> {
        if !self.sessions[id].enabled {
            return Err(KernelError::SessionDisabled);
        }
        let screen = self.screen_for(id);
        let display = self.display_mut(id);
        let mut written = 0;
        for chunk in bytes.split(|&b| b == 0).filter(|c| !c.is_empty()) {
            platform.render(screen, display, chunk);
            written += chunk.len();
        }
        Ok(written)
    }

    /// Feed one key to the foreground session's line discipline and echo it.
    pub fn key_input(&mut self, key: KeyInput, platform: &mut dyn Platform) {
        let fg = self.foreground;
        let echo: Option<u8> = {
            let input = &mut self.sessions[fg].input;
            match key {
                KeyInput::Char(c) => input.push(c).then_some(c),
                KeyInput::Backspace => input.backspace().then_some(0x08),
                KeyInput::Enter => input.finish().then_some(b'\n'),
                KeyInput::SwitchTerminal(_) => None,
            }
        };
        if let Some(byte) = echo {
            let display = self.display_mut(fg);
            platform.render(VIDEO_MEMORY, display, &[byte]);
        }
    }

    /// Make `target` the visible session.
    ///
    /// The physical screen is saved into the old foreground's shadow and the
    /// target's shadow is copied onto it. Returns `false` when `target` was
    /// already in front.
    pub fn switch_foreground(
        &mut self,
        target: TerminalId,
        platform: &mut dyn Platform,
    ) -> KernelResult<bool> {
        if target >= NUM_TERMINALS {
            return Err(KernelError::InvalidArgument);
        }
        if target == self.foreground {
            return Ok(false);
        }
        platform.copy_screen(VIDEO_MEMORY, shadow_screen(self.foreground));
        platform.copy_screen(shadow_screen(target), VIDEO_MEMORY);
        self.foreground = target;
        self.display_base = self.screen_for(self.live_owner);
        Ok(true)
    }
}

impl Default for Terminals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPlatform;

    fn enabled() -> Terminals {
        let mut t = Terminals::new();
        for id in 0..NUM_TERMINALS {
            t.enable(id);
        }
        t
    }

    #[test]
    fn save_then_restore_round_trips() {
        let mut t = Terminals::new();
        t.live_mut().x = 17;
        t.live_mut().y = 4;
        t.live_mut().fg = color::GREEN;
        let before = *t.live();
        t.save_display(0);
        t.restore_display(0);
        assert_eq!(*t.live(), before);
    }

    #[test]
    fn sessions_have_distinct_screens_and_colours() {
        let t = Terminals::new();
        assert_ne!(t.session(0).display.screen, t.session(1).display.screen);
        assert_ne!(t.session(1).display.attribute(), t.session(2).display.attribute());
        assert_eq!(t.screen_for(0), VIDEO_MEMORY);
        assert_eq!(t.screen_for(2), shadow_screen(2));
    }

    #[test]
    fn line_is_delivered_once_with_newline() {
        let mut t = enabled();
        let mut p = MockPlatform::default();
        for &c in b"ls" {
            t.key_input(KeyInput::Char(c), &mut p);
        }
        let mut buf = [0u8; 16];
        assert_eq!(t.read_line(0, &mut buf), Err(KernelError::WouldBlock));
        t.key_input(KeyInput::Enter, &mut p);
        assert_eq!(t.read_line(0, &mut buf), Ok(3));
        assert_eq!(&buf[..3], b"ls\n");
        assert_eq!(t.read_line(0, &mut buf), Err(KernelError::WouldBlock));
        assert_eq!(p.output(VIDEO_MEMORY), b"ls\n");
    }

    #[test]
    fn short_reader_still_gets_newline() {
        let mut t = enabled();
        let mut p = MockPlatform::default();
        for &c in b"hello" {
            t.key_input(KeyInput::Char(c), &mut p);
        }
        t.key_input(KeyInput::Enter, &mut p);
        let mut buf = [0u8; 3];
        assert_eq!(t.read_line(0, &mut buf), Ok(3));
        assert_eq!(&buf, b"he\n");
    }

    #[test]
    fn line_keeps_room_for_newline() {
        let mut line = LineBuffer::new();
        for _ in 0..LINE_BUFFER_SIZE * 2 {
            line.push(b'a');
        }
        assert_eq!(line.len(), LINE_BUFFER_SIZE - 1);
        assert!(line.finish());
        assert_eq!(line.len(), LINE_BUFFER_SIZE);
        assert!(!line.push(b'b'));
        assert!(!line.backspace());
    }

    #[test]
    fn backspace_edits_the_line() {
        let mut t = enabled();
        let mut p = MockPlatform::default();
        t.key_input(KeyInput::Char(b'a'), &mut p);
        t.key_input(KeyInput::Char(b'b'), &mut p);
        t.key_input(KeyInput::Backspace, &mut p);
        t.key_input(KeyInput::Enter, &mut p);
        let mut buf = [0u8; 8];
        assert_eq!(t.read_line(0, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"a\n");
    }

    #[test]
    fn disabled_session_refuses_io() {
        let mut t = Terminals::new();
        let mut p = MockPlatform::default();
        let mut buf = [0u8; 4];
        assert_eq!(t.read_line(1, &mut buf), Err(KernelError::SessionDisabled));
        assert_eq!(t.write(1, &mut p, b"x"), Err(KernelError::SessionDisabled));
    }

    #[test]
    fn write_skips_nul_bytes() {
        let mut t = enabled();
        let mut p = MockPlatform::default();
        assert_eq!(t.write(0, &mut p, b"a\0b\0\0c"), Ok(3));
        assert_eq!(p.output(VIDEO_MEMORY), b"abc");
    }

    #[test]
    fn background_output_goes_to_shadow() {
        let mut t = enabled();
        let mut p = MockPlatform::default();
        t.write(1, &mut p, b"bg").unwrap();
        assert_eq!(p.output(shadow_screen(1)), b"bg");
        assert_eq!(t.session(1).display.x, 2);
        assert_eq!(t.live().x, 0);
    }

    #[test]
    fn foreground_switch_swaps_screens() {
        let mut t = enabled();
        let mut p = MockPlatform::default();
        assert_eq!(t.switch_foreground(2, &mut p), Ok(true));
        assert_eq!(t.foreground(), 2);
        assert_eq!(
            p.screen_copies,
            vec![(VIDEO_MEMORY, shadow_screen(0)), (shadow_screen(2), VIDEO_MEMORY)]
        );
        // Session 0 still owns the live context but is now off screen.
        assert_eq!(t.display_base(), shadow_screen(0));
        assert_eq!(t.switch_foreground(2, &mut p), Ok(false));
        assert_eq!(t.switch_foreground(3, &mut p), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn keys_go_to_the_foreground_session() {
        let mut t = enabled();
        let mut p = MockPlatform::default();
        t.switch_foreground(1, &mut p).unwrap();
        t.key_input(KeyInput::Char(b'z'), &mut p);
        assert_eq!(t.session(1).input.len(), 1);
        assert!(t.session(0).input.is_empty());
    }
}
