use core::ops::{Index, IndexMut};

use bit_field::BitField;
use bitflags::bitflags;

use crate::arch::Platform;
use crate::config::{
    KERNEL_FRAME, PAGE_SIZE, REGION_SIZE, USER_VIDEO_ADDR, VIDEO_MEMORY, VIDEO_MEMORY_END,
};
use crate::error::{KernelError, KernelResult};

pub const ENTRY_COUNT: usize = 1024;

bitflags! {
    /// Bits shared by directory and table entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        /// Directory entries only: map a whole 4MB region.
        const LARGE         = 1 << 7;
        const GLOBAL        = 1 << 8;
    }
}

/// Flags of the directory entry that exposes a process's frame at
/// `USER_REGION`.
pub const USER_REGION_FLAGS: PageFlags = PageFlags::PRESENT
    .union(PageFlags::WRITABLE)
    .union(PageFlags::USER)
    .union(PageFlags::LARGE);

/// Flags of the user-visible display page.
pub const USER_VIDEO_FLAGS: PageFlags = PageFlags::PRESENT
    .union(PageFlags::WRITABLE)
    .union(PageFlags::USER);

/// One 32-bit directory or table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const fn empty() -> Self {
        Entry(0)
    }

    /// A directory entry mapping the 4MB region containing `frame`.
    pub fn region(frame: u32, flags: PageFlags) -> Self {
        let mut raw = 0u32;
        raw.set_bits(22..32, frame.get_bits(22..32));
        raw.set_bits(0..12, (flags | PageFlags::LARGE).bits());
        Entry(raw)
    }

    /// A table entry mapping the 4KB page at `frame`, or a directory entry
    /// pointing at a page table.
    pub fn page(frame: u32, flags: PageFlags) -> Self {
        let mut raw = 0u32;
        raw.set_bits(12..32, frame.get_bits(12..32));
        raw.set_bits(0..12, (flags - PageFlags::LARGE).bits());
        Entry(raw)
    }

    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0.get_bits(0..12))
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(PageFlags::PRESENT)
    }

    pub fn is_large(&self) -> bool {
        self.flags().contains(PageFlags::LARGE)
    }

    /// Physical address this entry points at.
    pub fn frame(&self) -> u32 {
        if self.is_large() {
            self.0.get_bits(22..32) << 22
        } else {
            self.0.get_bits(12..32) << 12
        }
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    entries: [Entry; ENTRY_COUNT],
}

impl PageTable {
    pub const fn new() -> Self {
        PageTable { entries: [Entry::empty(); ENTRY_COUNT] }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for PageTable {
    type Output = Entry;

    fn index(&self, index: usize) -> &Entry {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut Entry {
        &mut self.entries[index]
    }
}

pub fn directory_slot(virt: u32) -> usize {
    virt.get_bits(22..32) as usize
}

pub fn table_slot(virt: u32) -> usize {
    virt.get_bits(12..22) as usize
}

const LOW_SLOT: usize = 0;

/// The kernel's single page directory and the two page tables behind it.
///
/// Slot 0 is backed by the low table (identity-mapped VGA memory); the slot
/// holding `USER_VIDEO_ADDR` is backed by the display-window table. Every
/// other slot can only hold 4MB region mappings.
pub struct AddressSpace {
    directory: PageTable,
    low_table: PageTable,
    video_table: PageTable,
}

impl AddressSpace {
    pub const fn new() -> Self {
        AddressSpace {
            directory: PageTable::new(),
            low_table: PageTable::new(),
            video_table: PageTable::new(),
        }
    }

    /// Identity-map video memory and the kernel region, then load the
    /// directory. Must run once the address space has reached its final
    /// location in memory.
    pub fn init_kernel<P: Platform + ?Sized>(&mut self, platform: &mut P) -> KernelResult<()> {
        let mut addr = VIDEO_MEMORY;
        while addr < VIDEO_MEMORY_END {
            self.map_table_page(platform, addr, addr, PageFlags::PRESENT | PageFlags::WRITABLE)?;
            addr += PAGE_SIZE;
        }
        self.map_directory(
            platform,
            KERNEL_FRAME,
            KERNEL_FRAME,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::GLOBAL,
        );
        platform.activate_directory(self.directory_address());
        Ok(())
    }

    /// Map the 4MB region containing `virt` onto the region containing
    /// `frame`. Both addresses are rounded down to a region boundary.
    pub fn map_directory<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        frame: u32,
        virt: u32,
        flags: PageFlags,
    ) -> Entry {
        let entry = Entry::region(frame, flags);
        self.directory[directory_slot(virt)] = entry;
        platform.flush_tlb();
        entry
    }

    /// Map the 4KB page at `virt` onto `frame`.
    ///
    /// Fails with [`KernelError::MissingPageTable`] when no page table backs
    /// the slot, including when the slot currently holds a 4MB mapping.
    pub fn map_table_page<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        frame: u32,
        virt: u32,
        flags: PageFlags,
    ) -> KernelResult<Entry> {
        let slot = directory_slot(virt);
        self.install_table(slot, flags)?;
        let entry = Entry::page(frame, flags);
        let table = self.table_mut(slot).ok_or(KernelError::MissingPageTable)?;
        table[table_slot(virt)] = entry;
        platform.flush_tlb();
        Ok(entry)
    }

    /// Remove the 4KB mapping at `virt`.
    pub fn unmap_table_page<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        virt: u32,
    ) -> KernelResult<()> {
        let slot = directory_slot(virt);
        let dir = self.directory[slot];
        if dir.is_present() && dir.is_large() {
            return Err(KernelError::MissingPageTable);
        }
        let table = self.table_mut(slot).ok_or(KernelError::MissingPageTable)?;
        table[table_slot(virt)] = Entry::empty();
        platform.flush_tlb();
        Ok(())
    }

    /// Walk the tables and return the physical address `virt` maps to.
    pub fn translate(&self, virt: u32) -> Option<u32> {
        let dir = self.directory[directory_slot(virt)];
        if !dir.is_present() {
            return None;
        }
        if dir.is_large() {
            return Some(dir.frame() + (virt & (REGION_SIZE - 1)));
        }
        let pte = self.table(directory_slot(virt))?[table_slot(virt)];
        if !pte.is_present() {
            return None;
        }
        Some(pte.frame() + (virt & (PAGE_SIZE - 1)))
    }

    pub fn directory_entry(&self, virt: u32) -> Entry {
        self.directory[directory_slot(virt)]
    }

    pub fn table_entry(&self, virt: u32) -> Option<Entry> {
        self.table(directory_slot(virt)).map(|t| t[table_slot(virt)])
    }

    pub fn directory_address(&self) -> u32 {
        &self.directory as *const PageTable as usize as u32
    }

    fn install_table(&mut self, slot: usize, flags: PageFlags) -> KernelResult<()> {
        let dir = self.directory[slot];
        if dir.is_present() && dir.is_large() {
            return Err(KernelError::MissingPageTable);
        }
        let table = self.table(slot).ok_or(KernelError::MissingPageTable)?;
        let address = table as *const PageTable as usize as u32;
        let dir_flags = PageFlags::PRESENT
            | PageFlags::WRITABLE
            | (dir.flags() & PageFlags::USER)
            | (flags & PageFlags::USER);
        self.directory[slot] = Entry::page(address, dir_flags);
        Ok(())
    }

    fn table(&self, slot: usize) -> Option<&PageTable> {
        match slot {
            LOW_SLOT => Some(&self.low_table),
            s if s == directory_slot(USER_VIDEO_ADDR) => Some(&self.video_table),
            _ => None,
        }
    }

    fn table_mut(&mut self, slot: usize) -> Option<&mut PageTable> {
        match slot {
            LOW_SLOT => Some(&mut self.low_table),
            s if s == directory_slot(USER_VIDEO_ADDR) => Some(&mut self.video_table),
            _ => None,
        }
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
