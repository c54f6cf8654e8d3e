use heapless::Vec;

use super::inode::FileType;

/// Longest file name a directory entry can hold.
pub const FILE_NAME_LEN: usize = 32;

/// A directory entry: maps a name to a file type and an inode number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: Vec<u8, FILE_NAME_LEN>,
    pub file_type: FileType,
    pub inode: u32,
}

impl DirEntry {
    /// Build an entry, truncating `name` to [`FILE_NAME_LEN`] bytes.
    pub fn new(name: &[u8], file_type: FileType, inode: u32) -> Self {
        let mut stored = Vec::new();
        for &b in name.iter().take(FILE_NAME_LEN) {
            let _ = stored.push(b);
        }
        DirEntry { name: stored, file_type, inode }
    }
}
