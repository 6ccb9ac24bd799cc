// @author:    olinex
// @time:      2023/11/08

// self mods

// use other mods

// use self mods
use crate::configs::{BLOCK_BYTE_SIZE, FS_MAGIC, HEADER_BYTE_SIZE, SECTOR_BYTE_SIZE};
use crate::{AsBytes, AsBytesMut, FsError, Result};

const SUPER_BLOCK_BYTE_SIZE: usize = core::mem::size_of::<SuperBlock>();

/// The super block describes the geometry of the whole volume.
/// It is written once by formatting into the data region of block 0,
/// whose header is the all-zero dummy header:
/// ```text
///                | <block> |
///                -----------
///                | header  | <- dummy, never current
///  block 0  ---> |---------|
///                |  magic  | <- 4 bytes
///                | version | <- 4 bytes (le)
///                |  size   | <- 4 bytes (le), total byte size of the volume
///                | padding | <- zero
///                -----------
///                |  data   | <- blocks 1..n, grouped into sectors
///                |  ...    |
/// ```
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SuperBlock {
    magic: [u8; 4],
    version: [u8; 4],
    total_byte_size: [u8; 4],
}
impl SuperBlock {
    pub fn new(version: u32, total_byte_size: u32) -> Self {
        Self {
            magic: FS_MAGIC,
            version: version.to_le_bytes(),
            total_byte_size: total_byte_size.to_le_bytes(),
        }
    }

    /// Decode the super block from the raw bytes of block 0
    pub fn from_block(block: &[u8]) -> Self {
        let mut sb = Self::new(0, 0);
        sb.as_bytes_mut()
            .copy_from_slice(&block[HEADER_BYTE_SIZE..HEADER_BYTE_SIZE + SUPER_BLOCK_BYTE_SIZE]);
        sb
    }

    /// Encode the super block into the raw bytes of block 0
    pub fn write_to(&self, block: &mut [u8]) {
        block[HEADER_BYTE_SIZE..HEADER_BYTE_SIZE + SUPER_BLOCK_BYTE_SIZE]
            .copy_from_slice(self.as_bytes());
    }

    /// Check the validation of the magic tag
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC
    }

    #[inline(always)]
    pub fn version(&self) -> u32 {
        u32::from_le_bytes(self.version)
    }

    #[inline(always)]
    pub fn total_byte_size(&self) -> u32 {
        u32::from_le_bytes(self.total_byte_size)
    }

    #[inline(always)]
    pub fn block_count(&self) -> u32 {
        self.total_byte_size() / BLOCK_BYTE_SIZE as u32
    }

    /// Check the super block can be mounted
    ///
    /// # Arguments
    /// * supported_version: the newest format version which can be mounted
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(InvalidSuperBlock | NotSupported)
    pub fn check(&self, supported_version: u32) -> Result<()> {
        if !self.is_valid() {
            return Err(FsError::InvalidSuperBlock);
        }
        if self.version() == 0 || self.version() > supported_version {
            return Err(FsError::NotSupported);
        }
        check_total_byte_size(self.total_byte_size())
    }
}
impl AsBytes for SuperBlock {
    fn as_bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(
                self as *const _ as usize as *const u8,
                SUPER_BLOCK_BYTE_SIZE,
            )
        }
    }
}
impl AsBytesMut for SuperBlock {
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(self as *mut _ as usize as *mut u8, SUPER_BLOCK_BYTE_SIZE)
        }
    }
}

/// A volume is made of whole sectors, at least two of them,
/// and all-ones is the size an erased super block reads back as
pub fn check_total_byte_size(total_byte_size: u32) -> Result<()> {
    let size = total_byte_size as usize;
    if total_byte_size == u32::MAX || size % SECTOR_BYTE_SIZE != 0 || size < 2 * SECTOR_BYTE_SIZE {
        Err(FsError::InvalidSuperBlock)
    } else {
        Ok(())
    }
}
