pub mod bootfs;
pub mod dentry;
pub mod fd;
pub mod inode;
pub mod mount;

pub use dentry::{DirEntry, FILE_NAME_LEN};
pub use fd::{FileOps, FileTable, FileTableId, FileTables, IoContext, OpenFile};
pub use inode::FileType;
pub use mount::{Device, Storage};
