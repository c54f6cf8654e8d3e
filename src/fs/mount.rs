use super::dentry::DirEntry;
use crate::error::KernelResult;

/// The storage collaborator: a read-only filesystem holding program images,
/// plain files, directories and device nodes.
pub trait Storage {
    /// Resolve `name` to its directory entry.
    fn lookup(&self, name: &[u8]) -> KernelResult<DirEntry>;

    /// Read up to `buf.len()` bytes of file `inode`, starting at `offset`.
    /// Returns the number of bytes read; 0 means end of file.
    fn read_data(&self, inode: u32, offset: usize, buf: &mut [u8]) -> KernelResult<usize>;

    /// Copy the name of directory entry `index` into `buf`.
    /// Returns the name length; 0 once `index` is past the last entry.
    fn read_dir(&self, index: usize, buf: &mut [u8]) -> KernelResult<usize>;

    /// The device driver behind a device node.
    fn device(&mut self, inode: u32) -> KernelResult<&mut dyn Device>;
}

/// A character device reachable through a device node.
pub trait Device {
    fn open(&mut self) -> KernelResult<()>;
    fn close(&mut self) -> KernelResult<()>;
    fn read(&mut self, buf: &mut [u8]) -> KernelResult<usize>;
    fn write(&mut self, buf: &[u8]) -> KernelResult<usize>;
}
