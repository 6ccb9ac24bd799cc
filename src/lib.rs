// @author:    olinex
// @time:      2023/11/03
#![cfg_attr(not(test), no_std)]

// self mods
pub mod configs;
pub mod error;
pub mod flash;
pub mod ifs;
pub mod layout;

// use other mods
#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate log;

extern crate alloc;
extern crate spin;

// reexports
pub use error::{FsError, Result};
pub use flash::{FlashDevice, MemoryFlash};
pub use ifs::{format, CorruptPolicy, FileType, FsConfig, InfoRomFs};
pub use layout::{BlockTag, FileTag, MapEntry};

bitflags! {
    /// Options of a file which is created on the volume
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CreateFlags: u8 {
        const READ_WRITE = 1 << 0;
        const NO_CHECKSUM = 1 << 1;
    }
}
impl CreateFlags {
    pub fn is_read_write(&self) -> bool {
        self.contains(CreateFlags::READ_WRITE)
    }

    pub fn is_no_checksum(&self) -> bool {
        self.contains(CreateFlags::NO_CHECKSUM)
    }
}

pub trait AsBytes {
    fn as_bytes(&self) -> &[u8];
}

pub trait AsBytesMut {
    fn as_bytes_mut(&mut self) -> &mut [u8];
}
