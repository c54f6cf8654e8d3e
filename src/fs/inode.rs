/// Type tag stored in a directory entry. It selects which descriptor variant
/// an `open` binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Device,
    Directory,
    Regular,
}

impl FileType {
    /// Decode the on-disk type field.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FileType::Device),
            1 => Some(FileType::Directory),
            2 => Some(FileType::Regular),
            _ => None,
        }
    }
}
