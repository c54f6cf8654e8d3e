//! The two cascaded 8259 interrupt controllers.

use x86::io::{inb, outb};

const CMD_INIT: u8 = 0x11;
const CMD_END_OF_INTERRUPT: u8 = 0x20;
const MODE_8086: u8 = 0x01;

/// Line on the primary controller the secondary is wired to.
const CASCADE_LINE: u8 = 2;

struct Pic {
    offset: u8,
    command: u16,
    data: u16,
}

impl Pic {
    fn handles_interrupt(&self, interrupt_id: u8) -> bool {
        (self.offset..self.offset + 8).contains(&interrupt_id)
    }

    unsafe fn end_of_interrupt(&mut self) {
        unsafe { outb(self.command, CMD_END_OF_INTERRUPT) }
    }

    unsafe fn read_mask(&mut self) -> u8 {
        unsafe { inb(self.data) }
    }

    unsafe fn write_mask(&mut self, mask: u8) {
        unsafe { outb(self.data, mask) }
    }
}

pub struct ChainedPics {
    pics: [Pic; 2],
}

impl ChainedPics {
    /// # Safety
    /// The offsets must not overlap the CPU exception vectors or each other.
    pub const unsafe fn new(offset1: u8, offset2: u8) -> ChainedPics {
        ChainedPics {
            pics: [
                Pic { offset: offset1, command: 0x20, data: 0x21 },
                Pic { offset: offset2, command: 0xA0, data: 0xA1 },
            ],
        }
    }

    /// Run the ICW1..ICW4 sequence, remapping both controllers to their
    /// offsets. The masks in place beforehand are restored.
    ///
    /// # Safety
    /// Reprograms the interrupt controllers.
    pub unsafe fn initialize(&mut self) {
        // Port 0x80 is unused; writing it gives the old controllers time to
        // settle between commands.
        let wait = || unsafe { outb(0x80, 0) };
        unsafe {
            let saved = [self.pics[0].read_mask(), self.pics[1].read_mask()];

            outb(self.pics[0].command, CMD_INIT);
            wait();
            outb(self.pics[1].command, CMD_INIT);
            wait();
            outb(self.pics[0].data, self.pics[0].offset);
            wait();
            outb(self.pics[1].data, self.pics[1].offset);
            wait();
            outb(self.pics[0].data, 1 << CASCADE_LINE);
            wait();
            outb(self.pics[1].data, CASCADE_LINE);
            wait();
            outb(self.pics[0].data, MODE_8086);
            wait();
            outb(self.pics[1].data, MODE_8086);
            wait();

            self.write_masks(saved[0], saved[1]);
        }
    }

    /// # Safety
    /// Masking a line the kernel waits on stalls it.
    pub unsafe fn write_masks(&mut self, mask1: u8, mask2: u8) {
        unsafe {
            self.pics[0].write_mask(mask1);
            self.pics[1].write_mask(mask2);
        }
    }

    /// Unmask exactly `irqs` (primary lines 0..8) plus the cascade line.
    ///
    /// # Safety
    /// See [`ChainedPics::write_masks`].
    pub unsafe fn enable_only(&mut self, irqs: &[u8]) {
        let open = irqs.iter().fold(1u8 << CASCADE_LINE, |mask, &irq| mask | (1 << irq));
        unsafe { self.write_masks(!open, 0xFF) }
    }

    pub fn handles_interrupt(&self, interrupt_id: u8) -> bool {
        self.pics.iter().any(|p| p.handles_interrupt(interrupt_id))
    }

    /// Acknowledge vector `interrupt_id`. Lines on the secondary need both
    /// controllers told.
    ///
    /// # Safety
    /// Must be called once per delivered interrupt, from its handler.
    pub unsafe fn notify_end_of_interrupt(&mut self, interrupt_id: u8) {
        if !self.handles_interrupt(interrupt_id) {
            return;
        }
        unsafe {
            if self.pics[1].handles_interrupt(interrupt_id) {
                self.pics[1].end_of_interrupt();
            }
            self.pics[0].end_of_interrupt();
        }
    }
}
