use core::fmt;

use crate::config::{REGION_SIZE, USER_LOAD_ADDR, USER_REGION};
use crate::error::{KernelError, KernelResult};
use crate::fs::{FileType, Storage};

// ══════════════════════════════════════════════════════════════
//  Executable header
// ══════════════════════════════════════════════════════════════

pub const IMAGE_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ENTRY_OFFSET: usize = 24;
/// Bytes that must be present to read the header fields we use.
pub const HEADER_LEN: usize = ENTRY_OFFSET + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub entry: u32,
}

impl ImageHeader {
    pub fn parse(data: &[u8]) -> KernelResult<Self> {
        if data.len() < HEADER_LEN || data[..4] != IMAGE_MAGIC {
            return Err(KernelError::BadImage);
        }
        let entry = u32::from_le_bytes([
            data[ENTRY_OFFSET],
            data[ENTRY_OFFSET + 1],
            data[ENTRY_OFFSET + 2],
            data[ENTRY_OFFSET + 3],
        ]);
        if !(USER_LOAD_ADDR..USER_REGION + REGION_SIZE).contains(&entry) {
            return Err(KernelError::BadImage);
        }
        Ok(ImageHeader { entry })
    }
}

// ══════════════════════════════════════════════════════════════
//  Program image
// ══════════════════════════════════════════════════════════════

/// A validated executable on the boot filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramImage {
    pub inode: u32,
    pub entry: u32,
}

impl ProgramImage {
    /// Resolve `name` and check its header without loading anything.
    pub fn open<S: Storage + ?Sized>(storage: &S, name: &[u8]) -> KernelResult<Self> {
        let dentry = storage.lookup(name)?;
        if dentry.file_type != FileType::Regular {
            return Err(KernelError::BadImage);
        }
        let mut header = [0u8; HEADER_LEN];
        let n = storage.read_data(dentry.inode, 0, &mut header)?;
        let header = ImageHeader::parse(&header[..n])?;
        Ok(ProgramImage { inode: dentry.inode, entry: header.entry })
    }
}

impl fmt::Display for ProgramImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "inode {} entry {:#010x}", self.inode, self.entry)
    }
}
