use bit_field::BitField;

use super::dentry::DirEntry;
use super::inode::FileType;
use super::mount::Storage;
use crate::arch::Platform;
use crate::config::{MAX_FILE_TABLES, MAX_OPEN_FILES};
use crate::drivers::tty::{TerminalId, Terminals};
use crate::error::{KernelError, KernelResult};

pub const STDIN: usize = 0;
pub const STDOUT: usize = 1;

/// Everything a descriptor may need to service a call.
pub struct IoContext<'a> {
    pub storage: &'a mut dyn Storage,
    pub terminals: &'a mut Terminals,
    pub platform: &'a mut dyn Platform,
    /// Session of the calling process.
    pub session: TerminalId,
}

/// Operations every open descriptor supports.
pub trait FileOps {
    fn read(&mut self, io: &mut IoContext<'_>, buf: &mut [u8]) -> KernelResult<usize>;
    fn write(&mut self, io: &mut IoContext<'_>, buf: &[u8]) -> KernelResult<usize>;
    fn close(&mut self, _io: &mut IoContext<'_>) -> KernelResult<()> {
        Ok(())
    }
}

// ── terminal ──

#[derive(Debug)]
pub struct TerminalInput;

impl FileOps for TerminalInput {
    fn read(&mut self, io: &mut IoContext<'_>, buf: &mut [u8]) -> KernelResult<usize> {
        io.terminals.read_line(io.session, buf)
    }

    fn write(&mut self, _io: &mut IoContext<'_>, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::Unsupported)
    }
}

#[derive(Debug)]
pub struct TerminalOutput;

impl FileOps for TerminalOutput {
    fn read(&mut self, _io: &mut IoContext<'_>, _buf: &mut [u8]) -> KernelResult<usize> {
        Err(KernelError::Unsupported)
    }

    fn write(&mut self, io: &mut IoContext<'_>, buf: &[u8]) -> KernelResult<usize> {
        io.terminals.write(io.session, &mut *io.platform, buf)
    }
}

// ── plain files ──

#[derive(Debug)]
pub struct RegularFile {
    inode: u32,
    position: usize,
}

impl FileOps for RegularFile {
    fn read(&mut self, io: &mut IoContext<'_>, buf: &mut [u8]) -> KernelResult<usize> {
        let n = io.storage.read_data(self.inode, self.position, buf)?;
        self.position += n;
        Ok(n)
    }

    fn write(&mut self, _io: &mut IoContext<'_>, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::Unsupported)
    }
}

/// Reading a directory yields one entry name per call.
#[derive(Debug)]
pub struct DirectoryFile {
    position: usize,
}

impl FileOps for DirectoryFile {
    fn read(&mut self, io: &mut IoContext<'_>, buf: &mut [u8]) -> KernelResult<usize> {
        let n = io.storage.read_dir(self.position, buf)?;
        if n > 0 {
            self.position += 1;
        }
        Ok(n)
    }

    fn write(&mut self, _io: &mut IoContext<'_>, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::Unsupported)
    }
}

#[derive(Debug)]
pub struct DeviceFile {
    inode: u32,
}

impl FileOps for DeviceFile {
    fn read(&mut self, io: &mut IoContext<'_>, buf: &mut [u8]) -> KernelResult<usize> {
        io.storage.device(self.inode)?.read(buf)
    }

    fn write(&mut self, io: &mut IoContext<'_>, buf: &[u8]) -> KernelResult<usize> {
        io.storage.device(self.inode)?.write(buf)
    }

    fn close(&mut self, io: &mut IoContext<'_>) -> KernelResult<()> {
        io.storage.device(self.inode)?.close()
    }
}

/// An open descriptor.
#[derive(Debug)]
pub enum OpenFile {
    Stdin(TerminalInput),
    Stdout(TerminalOutput),
    Regular(RegularFile),
    Directory(DirectoryFile),
    Device(DeviceFile),
}

impl OpenFile {
    /// Bind a descriptor to `entry`, picking the variant from its type tag.
    pub fn open(entry: &DirEntry, io: &mut IoContext<'_>) -> KernelResult<OpenFile> {
        Ok(match entry.file_type {
            FileType::Regular => OpenFile::Regular(RegularFile { inode: entry.inode, position: 0 }),
            FileType::Directory => OpenFile::Directory(DirectoryFile { position: 0 }),
            FileType::Device => {
                io.storage.device(entry.inode)?.open()?;
                OpenFile::Device(DeviceFile { inode: entry.inode })
            }
        })
    }

    fn ops(&mut self) -> &mut dyn FileOps {
        match self {
            OpenFile::Stdin(f) => f,
            OpenFile::Stdout(f) => f,
            OpenFile::Regular(f) => f,
            OpenFile::Directory(f) => f,
            OpenFile::Device(f) => f,
        }
    }
}

impl FileOps for OpenFile {
    fn read(&mut self, io: &mut IoContext<'_>, buf: &mut [u8]) -> KernelResult<usize> {
        self.ops().read(io, buf)
    }

    fn write(&mut self, io: &mut IoContext<'_>, buf: &[u8]) -> KernelResult<usize> {
        self.ops().write(io, buf)
    }

    fn close(&mut self, io: &mut IoContext<'_>) -> KernelResult<()> {
        self.ops().close(io)
    }
}

/// Descriptor table of one process.
#[derive(Debug)]
pub struct FileTable {
    slots: [Option<OpenFile>; MAX_OPEN_FILES],
}

impl FileTable {
    /// A table with only stdin and stdout open.
    pub const fn new() -> Self {
        let mut slots = [const { None }; MAX_OPEN_FILES];
        slots[STDIN] = Some(OpenFile::Stdin(TerminalInput));
        slots[STDOUT] = Some(OpenFile::Stdout(TerminalOutput));
        FileTable { slots }
    }

    pub fn is_open(&self, fd: usize) -> bool {
        matches!(self.slots.get(fd), Some(Some(_)))
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn get_mut(&mut self, fd: usize) -> KernelResult<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(KernelError::BadDescriptor)
    }

    /// Store `file` in the lowest free descriptor.
    pub fn insert(&mut self, file: OpenFile) -> KernelResult<usize> {
        let fd = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::DescriptorTableFull)?;
        self.slots[fd] = Some(file);
        Ok(fd)
    }

    /// Take descriptor `fd` out of the table. Stdin and stdout stay.
    pub fn remove(&mut self, fd: usize) -> KernelResult<OpenFile> {
        if fd <= STDOUT || fd >= MAX_OPEN_FILES {
            return Err(KernelError::BadDescriptor);
        }
        self.slots[fd].take().ok_or(KernelError::BadDescriptor)
    }

    /// Close every descriptor above stdout. Every slot is freed even when
    /// its close fails; failures are logged and counted.
    pub fn close_all(&mut self, io: &mut IoContext<'_>) -> usize {
        let mut failures = 0;
        for (fd, slot) in self.slots.iter_mut().enumerate().skip(STDOUT + 1) {
            if let Some(mut file) = slot.take() {
                if let Err(e) = file.close(io) {
                    crate::log_warn!("close: fd {} failed: {}", fd, e);
                    failures += 1;
                }
            }
        }
        failures
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTableId(pub usize);

/// Fixed pool of descriptor tables, one per live process.
pub struct FileTables {
    tables: [FileTable; MAX_FILE_TABLES],
    in_use: u16,
}

impl FileTables {
    pub const fn new() -> Self {
        FileTables {
            tables: [const { FileTable::new() }; MAX_FILE_TABLES],
            in_use: 0,
        }
    }

    /// Hand out the lowest free table, freshly initialised.
    pub fn allocate(&mut self) -> KernelResult<FileTableId> {
        let index = (0..MAX_FILE_TABLES)
            .find(|&i| !self.in_use.get_bit(i))
            .ok_or(KernelError::NoFileTable)?;
        self.in_use.set_bit(index, true);
        self.tables[index] = FileTable::new();
        Ok(FileTableId(index))
    }

    pub fn free(&mut self, id: FileTableId) {
        if id.0 < MAX_FILE_TABLES {
            self.in_use.set_bit(id.0, false);
        }
    }

    pub fn is_allocated(&self, id: FileTableId) -> bool {
        id.0 < MAX_FILE_TABLES && self.in_use.get_bit(id.0)
    }

    pub fn get(&self, id: FileTableId) -> KernelResult<&FileTable> {
        if !self.is_allocated(id) {
            return Err(KernelError::BadDescriptor);
        }
        Ok(&self.tables[id.0])
    }

    pub fn get_mut(&mut self, id: FileTableId) -> KernelResult<&mut FileTable> {
        if !self.is_allocated(id) {
            return Err(KernelError::BadDescriptor);
        }
        Ok(&mut self.tables[id.0])
    }

    /// Allocation bitmap, bit `n` set when table `n` is in use.
    pub fn bitmap(&self) -> u16 {
        self.in_use
    }
}

impl Default for FileTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemStorage, MockPlatform};

    #[test]
    fn new_table_has_stdio_only() {
        let table = FileTable::new();
        assert!(table.is_open(STDIN));
        assert!(table.is_open(STDOUT));
        assert!(!table.is_open(2));
        assert!(!table.is_open(MAX_OPEN_FILES));
        assert_eq!(table.open_count(), 2);
    }

    #[test]
    fn insert_uses_lowest_free_slot() {
        let mut table = FileTable::new();
        let dir = || OpenFile::Directory(DirectoryFile { position: 0 });
        assert_eq!(table.insert(dir()), Ok(2));
        assert_eq!(table.insert(dir()), Ok(3));
        table.remove(2).unwrap();
        assert_eq!(table.insert(dir()), Ok(2));
        while !table.is_full() {
            table.insert(dir()).unwrap();
        }
        assert_eq!(table.insert(dir()).unwrap_err(), KernelError::DescriptorTableFull);
    }

    #[test]
    fn stdio_cannot_be_removed() {
        let mut table = FileTable::new();
        assert_eq!(table.remove(STDIN).unwrap_err(), KernelError::BadDescriptor);
        assert_eq!(table.remove(STDOUT).unwrap_err(), KernelError::BadDescriptor);
        assert_eq!(table.remove(5).unwrap_err(), KernelError::BadDescriptor);
        assert_eq!(table.remove(8).unwrap_err(), KernelError::BadDescriptor);
    }

    #[test]
    fn pool_hands_out_and_reclaims() {
        let mut pool = FileTables::new();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!((a, b), (FileTableId(0), FileTableId(1)));
        assert_eq!(pool.bitmap(), 0b11);
        pool.free(a);
        assert_eq!(pool.bitmap(), 0b10);
        assert!(pool.get(a).is_err());
        assert_eq!(pool.allocate().unwrap(), a);
        for _ in 2..MAX_FILE_TABLES {
            pool.allocate().unwrap();
        }
        assert_eq!(pool.allocate(), Err(KernelError::NoFileTable));
    }

    #[test]
    fn descriptors_dispatch_by_variant() {
        let mut storage = MemStorage::new()
            .with_file(b"frame0.txt", b"fish")
            .with_directory(b".")
            .with_device(b"rtc");
        let mut terminals = Terminals::new();
        let mut platform = MockPlatform::default();
        let mut io = IoContext {
            storage: &mut storage,
            terminals: &mut terminals,
            platform: &mut platform,
            session: 0,
        };

        let entry = io.storage.lookup(b"frame0.txt").unwrap();
        let mut file = OpenFile::open(&entry, &mut io).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(file.read(&mut io, &mut buf), Ok(3));
        assert_eq!(&buf, b"fis");
        assert_eq!(file.read(&mut io, &mut buf), Ok(1));
        assert_eq!(file.read(&mut io, &mut buf), Ok(0));
        assert_eq!(file.write(&mut io, b"x"), Err(KernelError::Unsupported));

        let entry = io.storage.lookup(b".").unwrap();
        let mut dir = OpenFile::open(&entry, &mut io).unwrap();
        let mut name = [0u8; 32];
        let n = dir.read(&mut io, &mut name).unwrap();
        assert_eq!(&name[..n], b"frame0.txt");

        let entry = io.storage.lookup(b"rtc").unwrap();
        let mut rtc = OpenFile::open(&entry, &mut io).unwrap();
        assert_eq!(rtc.write(&mut io, &[2, 0, 0, 0]), Ok(4));
        rtc.close(&mut io).unwrap();
        drop(io);
        assert_eq!(storage.device.opens, 1);
        assert_eq!(storage.device.closes, 1);
        assert_eq!(storage.device.written, vec![2, 0, 0, 0]);
    }

    #[test]
    fn close_all_keeps_stdio() {
        let mut storage = MemStorage::new().with_device(b"rtc");
        let mut terminals = Terminals::new();
        let mut platform = MockPlatform::default();
        let mut io = IoContext {
            storage: &mut storage,
            terminals: &mut terminals,
            platform: &mut platform,
            session: 0,
        };
        let entry = io.storage.lookup(b"rtc").unwrap();
        let mut table = FileTable::new();
        let rtc = OpenFile::open(&entry, &mut io).unwrap();
        table.insert(rtc).unwrap();
        table.close_all(&mut io);
        drop(io);
        assert_eq!(table.open_count(), 2);
        assert_eq!(storage.device.closes, 1);
    }

    #[test]
    fn close_all_frees_slots_whose_close_fails() {
        let mut storage = MemStorage::new().with_device(b"rtc");
        storage.device.fail_close = true;
        let mut terminals = Terminals::new();
        let mut platform = MockPlatform::default();
        let mut io = IoContext {
            storage: &mut storage,
            terminals: &mut terminals,
            platform: &mut platform,
            session: 0,
        };
        let entry = io.storage.lookup(b"rtc").unwrap();
        let mut table = FileTable::new();
        for _ in 0..2 {
            let rtc = OpenFile::open(&entry, &mut io).unwrap();
            table.insert(rtc).unwrap();
        }
        assert_eq!(table.close_all(&mut io), 2);
        drop(io);
        assert_eq!(table.open_count(), 2);
        assert!(!table.is_open(2) && !table.is_open(3));
        assert_eq!(storage.device.closes, 2);
    }
}
