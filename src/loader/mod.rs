//! Program loading: header validation and streaming an image into the user
//! region of the running address space.

pub mod image;

pub use image::{ImageHeader, ProgramImage, HEADER_LEN, IMAGE_MAGIC};

use crate::arch::Platform;
use crate::config::{PAGE_SIZE, REGION_SIZE, USER_LOAD_ADDR, USER_REGION};
use crate::error::{KernelError, KernelResult};
use crate::fs::Storage;

const CHUNK_SIZE: usize = PAGE_SIZE as usize;

/// Copy `image` to `USER_LOAD_ADDR` one page at a time. The user region must
/// already map the target process's frame. Returns the image size.
pub fn load<S, P>(image: &ProgramImage, storage: &S, platform: &mut P) -> KernelResult<usize>
where
    S: Storage + ?Sized,
    P: Platform + ?Sized,
{
    let capacity = (USER_REGION + REGION_SIZE - USER_LOAD_ADDR) as usize;
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut offset = 0usize;
    loop {
        let n = storage.read_data(image.inode, offset, &mut chunk)?;
        if n == 0 {
            break;
        }
        if offset + n > capacity {
            return Err(KernelError::BadImage);
        }
        platform.write_user(USER_LOAD_ADDR + offset as u32, &chunk[..n])?;
        offset += n;
    }
    Ok(offset)
}
