//! Test doubles shared by the unit tests.

use std::vec::Vec;

use crate::arch::Platform;
use crate::config::{NUM_TERMINALS, USER_LOAD_ADDR, USER_REGION};
use crate::drivers::tty::DisplayContext;
use crate::error::{KernelError, KernelResult};
use crate::fs::{Device, DirEntry, FileType, Storage};
use crate::kernel::Kernel;

/// Records every hardware request instead of performing it.
#[derive(Debug, Default)]
pub struct MockPlatform {
    pub flushes: usize,
    pub directory: Option<u32>,
    pub kernel_stacks: Vec<u32>,
    pub eois: Vec<u8>,
    pub screen_copies: Vec<(u32, u32)>,
    pub rendered: Vec<(u32, Vec<u8>)>,
    pub user_writes: Vec<(u32, Vec<u8>)>,
}

impl MockPlatform {
    /// Everything drawn onto `screen`, in order.
    pub fn output(&self, screen: u32) -> Vec<u8> {
        self.rendered
            .iter()
            .filter(|(s, _)| *s == screen)
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    pub fn last_kernel_stack(&self) -> Option<u32> {
        self.kernel_stacks.last().copied()
    }

    /// Bytes written into user memory starting at `virt` by a single write.
    pub fn user_write_at(&self, virt: u32) -> Option<&[u8]> {
        self.user_writes
            .iter()
            .rev()
            .find(|(addr, _)| *addr == virt)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// Total number of image bytes copied to the load address range.
    pub fn loaded_bytes(&self) -> usize {
        self.user_writes
            .iter()
            .filter(|(addr, _)| *addr >= USER_LOAD_ADDR)
            .map(|(_, bytes)| bytes.len())
            .sum()
    }
}

impl Platform for MockPlatform {
    fn flush_tlb(&mut self) {
        self.flushes += 1;
    }

    fn activate_directory(&mut self, directory: u32) {
        self.directory = Some(directory);
    }

    fn set_kernel_stack(&mut self, top: u32) {
        self.kernel_stacks.push(top);
    }

    fn end_of_interrupt(&mut self, irq: u8) {
        self.eois.push(irq);
    }

    fn copy_screen(&mut self, from: u32, to: u32) {
        self.screen_copies.push((from, to));
    }

    fn render(&mut self, screen: u32, display: &mut DisplayContext, bytes: &[u8]) {
        for &b in bytes {
            match b {
                b'\n' => {
                    display.x = 0;
                    display.y += 1;
                }
                0x08 => display.x = display.x.saturating_sub(1),
                _ => display.x += 1,
            }
        }
        self.rendered.push((screen, bytes.to_vec()));
    }

    fn write_user(&mut self, virt: u32, bytes: &[u8]) -> KernelResult<()> {
        if virt < USER_REGION {
            return Err(KernelError::BadAddress);
        }
        self.user_writes.push((virt, bytes.to_vec()));
        Ok(())
    }
}

/// Device that counts calls and remembers what was written to it.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub opens: usize,
    pub closes: usize,
    pub written: Vec<u8>,
    /// Make every close report an I/O error after counting it.
    pub fail_close: bool,
}

impl Device for RecordingDevice {
    fn open(&mut self) -> KernelResult<()> {
        self.opens += 1;
        Ok(())
    }

    fn close(&mut self) -> KernelResult<()> {
        self.closes += 1;
        if self.fail_close {
            return Err(KernelError::Io);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> KernelResult<usize> {
        buf.fill(0);
        Ok(buf.len().min(4))
    }

    fn write(&mut self, buf: &[u8]) -> KernelResult<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// In-memory filesystem. Inode numbers are the entry's position.
#[derive(Debug, Default)]
pub struct MemStorage {
    entries: Vec<(Vec<u8>, FileType, Vec<u8>)>,
    pub device: RecordingDevice,
}

/// Build a minimal executable image: the magic, the entry point at byte 24
/// and `body` after the header.
pub fn program(entry: u32, body: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; 52];
    image[..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
    image[24..28].copy_from_slice(&entry.to_le_bytes());
    image.extend_from_slice(body);
    image
}

pub const SHELL_ENTRY: u32 = 0x0804_8100;

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage holding a shell, a couple of programs, a text file, the root
    /// directory and an RTC device node.
    pub fn standard() -> Self {
        Self::new()
            .with_directory(b".")
            .with_file(b"shell", &program(SHELL_ENTRY, b"shell body"))
            .with_file(b"grep", &program(0x0804_8200, b"grep body"))
            .with_file(b"counter", &program(0x0804_8300, &[0xAB; 5000]))
            .with_file(b"frame0.txt", b"fish")
            .with_device(b"rtc")
    }

    pub fn with_file(mut self, name: &[u8], data: &[u8]) -> Self {
        self.entries.push((name.to_vec(), FileType::Regular, data.to_vec()));
        self
    }

    pub fn with_directory(mut self, name: &[u8]) -> Self {
        self.entries.push((name.to_vec(), FileType::Directory, Vec::new()));
        self
    }

    pub fn with_device(mut self, name: &[u8]) -> Self {
        self.entries.push((name.to_vec(), FileType::Device, Vec::new()));
        self
    }
}

impl Storage for MemStorage {
    fn lookup(&self, name: &[u8]) -> KernelResult<DirEntry> {
        self.entries
            .iter()
            .position(|(n, _, _)| n.as_slice() == name)
            .map(|i| DirEntry::new(&self.entries[i].0, self.entries[i].1, i as u32))
            .ok_or(KernelError::NotFound)
    }

    fn read_data(&self, inode: u32, offset: usize, buf: &mut [u8]) -> KernelResult<usize> {
        let (_, _, data) = self.entries.get(inode as usize).ok_or(KernelError::NotFound)?;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn read_dir(&self, index: usize, buf: &mut [u8]) -> KernelResult<usize> {
        match self.entries.get(index) {
            Some((name, _, _)) => {
                let n = name.len().min(buf.len());
                buf[..n].copy_from_slice(&name[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn device(&mut self, inode: u32) -> KernelResult<&mut dyn Device> {
        match self.entries.get(inode as usize) {
            Some((_, FileType::Device, _)) => Ok(&mut self.device),
            _ => Err(KernelError::NotFound),
        }
    }
}

/// A booted kernel with base shells attached to the first `sessions`
/// sessions, in order. The last attached shell owns the CPU.
pub fn booted_with_sessions(sessions: usize) -> Box<Kernel<MockPlatform, MemStorage>> {
    let mut kernel = Box::new(Kernel::new(MockPlatform::default(), MemStorage::standard()));
    kernel.boot().unwrap();
    for session in 0..sessions {
        kernel.attach_shell(session).unwrap();
    }
    kernel
}

/// Every session bootstrapped: pids 1, 2 and 3 on sessions 0, 1 and 2.
pub fn booted() -> Box<Kernel<MockPlatform, MemStorage>> {
    booted_with_sessions(NUM_TERMINALS)
}
