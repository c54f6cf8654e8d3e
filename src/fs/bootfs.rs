//! Read-only boot filesystem image loaded as a multiboot module.
//!
//! Layout, in 4KB blocks: one boot block holding the counts and up to 63
//! directory entries, then one block per inode, then the data blocks.

use super::dentry::{DirEntry, FILE_NAME_LEN};
use super::inode::FileType;
use super::mount::{Device, Storage};
use crate::error::{KernelError, KernelResult};

const BLOCK_SIZE: usize = 4096;
const DENTRY_SIZE: usize = 64;
const DENTRY_AREA: usize = 64;
const MAX_DENTRIES: usize = BLOCK_SIZE / DENTRY_SIZE - 1;

pub struct BootFs {
    image: &'static [u8],
}

impl BootFs {
    pub fn new(image: &'static [u8]) -> KernelResult<Self> {
        if image.len() < BLOCK_SIZE {
            return Err(KernelError::Io);
        }
        let fs = BootFs { image };
        // The counts come straight from the image and may be garbage.
        let needed = fs
            .inode_count()
            .checked_add(fs.data_block_count())
            .and_then(|blocks| blocks.checked_add(1))
            .and_then(|blocks| blocks.checked_mul(BLOCK_SIZE))
            .ok_or(KernelError::BadImage)?;
        if fs.dir_count() > MAX_DENTRIES || image.len() < needed {
            return Err(KernelError::BadImage);
        }
        Ok(fs)
    }

    fn u32_at(&self, offset: usize) -> KernelResult<u32> {
        let bytes = self.image.get(offset..offset + 4).ok_or(KernelError::Io)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn header(&self, index: usize) -> usize {
        self.u32_at(index * 4).map_or(0, |v| v as usize)
    }

    pub fn dir_count(&self) -> usize {
        self.header(0)
    }

    pub fn inode_count(&self) -> usize {
        self.header(1)
    }

    pub fn data_block_count(&self) -> usize {
        self.header(2)
    }

    fn raw_name(&self, index: usize) -> &[u8] {
        let start = DENTRY_AREA + index * DENTRY_SIZE;
        let raw = &self.image[start..start + FILE_NAME_LEN];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(FILE_NAME_LEN);
        &raw[..len]
    }

    fn dentry(&self, index: usize) -> KernelResult<DirEntry> {
        if index >= self.dir_count() {
            return Err(KernelError::NotFound);
        }
        let start = DENTRY_AREA + index * DENTRY_SIZE;
        let file_type =
            FileType::from_raw(self.u32_at(start + FILE_NAME_LEN)?).ok_or(KernelError::Io)?;
        let inode = self.u32_at(start + FILE_NAME_LEN + 4)?;
        Ok(DirEntry::new(self.raw_name(index), file_type, inode))
    }

    fn inode_block(&self, inode: u32) -> KernelResult<usize> {
        if inode as usize >= self.inode_count() {
            return Err(KernelError::NotFound);
        }
        Ok((1 + inode as usize) * BLOCK_SIZE)
    }
}

impl Storage for BootFs {
    fn lookup(&self, name: &[u8]) -> KernelResult<DirEntry> {
        if name.is_empty() || name.len() > FILE_NAME_LEN {
            return Err(KernelError::NotFound);
        }
        (0..self.dir_count())
            .find(|&i| self.raw_name(i) == name)
            .ok_or(KernelError::NotFound)
            .and_then(|i| self.dentry(i))
    }

    fn read_data(&self, inode: u32, offset: usize, buf: &mut [u8]) -> KernelResult<usize> {
        let block = self.inode_block(inode)?;
        let length = self.u32_at(block)? as usize;
        let data_start = (1 + self.inode_count()) * BLOCK_SIZE;
        let mut done = 0;
        let mut pos = offset;
        while done < buf.len() && pos < length {
            let index = self.u32_at(block + 4 + (pos / BLOCK_SIZE) * 4)? as usize;
            if index >= self.data_block_count() {
                return Err(KernelError::Io);
            }
            let within = pos % BLOCK_SIZE;
            let n = (BLOCK_SIZE - within).min(length - pos).min(buf.len() - done);
            let src = data_start + index * BLOCK_SIZE + within;
            let bytes = self.image.get(src..src + n).ok_or(KernelError::Io)?;
            buf[done..done + n].copy_from_slice(bytes);
            done += n;
            pos += n;
        }
        Ok(done)
    }

    fn read_dir(&self, index: usize, buf: &mut [u8]) -> KernelResult<usize> {
        if index >= self.dir_count() {
            return Ok(0);
        }
        let name = self.raw_name(index);
        let n = name.len().min(buf.len());
        buf[..n].copy_from_slice(&name[..n]);
        Ok(n)
    }

    fn device(&mut self, _inode: u32) -> KernelResult<&mut dyn Device> {
        Err(KernelError::Unsupported)
    }
}
