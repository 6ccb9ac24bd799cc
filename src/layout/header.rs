// @author:    olinex
// @time:      2023/11/08

// self mods

// use other mods
use alloc::sync::Arc;
use core::fmt::{Debug, Display, Formatter};

// use self mods
use crate::configs::{BLOCK_BYTE_SIZE, BLOCK_DATA_BYTE_SIZE, HEADER_BYTE_SIZE};
use crate::flash::{BlockBuffer, FlashDevice};
use crate::{AsBytes, AsBytesMut, FsError, Result};

pub const FILE_TAG_BYTE_SIZE: usize = 3;
const CHECKSUM_OFFSET: usize = 8;
const RESERVED_BYTE_SIZE: usize = 7;

const _: () = assert!(core::mem::size_of::<BlockHeader>() == HEADER_BYTE_SIZE);

bitflags! {
    /// State flags stored in the first byte of each block.
    /// An erased block reads back as all 1-bits, so `CLEAN` is set until the block is written,
    /// and `CURRENT` can be cleared later with a single byte program.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        const CLEAN = 1 << 0;
        const CURRENT = 1 << 1;
        const READ_WRITE = 1 << 2;
        const NO_CHECKSUM = 1 << 3;
    }
}

/// Three uppercase ASCII letters naming a file
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTag([u8; FILE_TAG_BYTE_SIZE]);
impl FileTag {
    /// Parse a file tag from a string
    ///
    /// # Returns
    /// * Ok(FileTag)
    /// * Err(InvalidArgument)
    pub fn new(name: &str) -> Result<Self> {
        Self::from_bytes(name.as_bytes()).ok_or(FsError::InvalidArgument)
    }

    /// Build a file tag from raw bytes, None if they are not three uppercase letters
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == FILE_TAG_BYTE_SIZE && bytes.iter().all(u8::is_ascii_uppercase) {
            let mut tag = [0; FILE_TAG_BYTE_SIZE];
            tag.copy_from_slice(bytes);
            Some(Self(tag))
        } else {
            None
        }
    }

    pub fn to_bytes(&self) -> [u8; FILE_TAG_BYTE_SIZE] {
        self.0
    }

    pub fn as_str(&self) -> &str {
        // validated as ASCII on construction
        core::str::from_utf8(&self.0).unwrap_or("???")
    }
}
impl Display for FileTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl Debug for FileTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "FileTag({})", self.as_str())
    }
}

/// The header at the start of each block, 16 bytes on media:
/// ```text
/// | flags | tag x3 | offset x2 (le) | size | version | checksum | reserved x7 |
/// ```
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockHeader {
    flags: u8,
    tag: [u8; FILE_TAG_BYTE_SIZE],
    offset: [u8; 2],
    size: u8,
    version: u8,
    checksum: u8,
    reserved: [u8; RESERVED_BYTE_SIZE],
}
impl BlockHeader {
    /// The header of an erased block
    pub fn erased() -> Self {
        let mut header = Self::dummy();
        header.as_bytes_mut().fill(0xff);
        header
    }

    /// The all-zero header which is accepted by sanity checking but never current
    pub fn dummy() -> Self {
        Self {
            flags: 0,
            tag: [0; FILE_TAG_BYTE_SIZE],
            offset: [0; 2],
            size: 0,
            version: 0,
            checksum: 0,
            reserved: [0; RESERVED_BYTE_SIZE],
        }
    }

    /// Create the header of a current data block, the checksum is left empty
    ///
    /// # Arguments
    /// * tag: the file which owns the block
    /// * offset: the byte offset of the data within the file
    /// * size: the byte size of the data in the block
    /// * flags: `READ_WRITE` and `NO_CHECKSUM` are taken from it
    /// * version: the version of the block
    pub fn new(tag: FileTag, offset: u16, size: u8, flags: HeaderFlags, version: u8) -> Self {
        let flags = (flags & (HeaderFlags::READ_WRITE | HeaderFlags::NO_CHECKSUM))
            | HeaderFlags::CURRENT;
        Self {
            flags: flags.bits(),
            tag: tag.to_bytes(),
            offset: offset.to_le_bytes(),
            size,
            version,
            checksum: 0,
            reserved: [0; RESERVED_BYTE_SIZE],
        }
    }

    /// Decode the header from the first bytes of a block
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut header = Self::dummy();
        header
            .as_bytes_mut()
            .copy_from_slice(&bytes[..HEADER_BYTE_SIZE]);
        header
    }

    /// Encode the header into the first bytes of a block
    pub fn write_to(&self, bytes: &mut [u8]) {
        bytes[..HEADER_BYTE_SIZE].copy_from_slice(self.as_bytes());
    }

    #[inline(always)]
    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags)
    }

    #[inline(always)]
    pub fn is_clean(&self) -> bool {
        self.flags().contains(HeaderFlags::CLEAN)
    }

    #[inline(always)]
    pub fn is_current(&self) -> bool {
        self.flags().contains(HeaderFlags::CURRENT)
    }

    #[inline(always)]
    pub fn is_read_write(&self) -> bool {
        self.flags().contains(HeaderFlags::READ_WRITE)
    }

    #[inline(always)]
    pub fn is_no_checksum(&self) -> bool {
        self.flags().contains(HeaderFlags::NO_CHECKSUM)
    }

    pub fn is_dummy(&self) -> bool {
        self.as_bytes().iter().all(|byte| *byte == 0)
    }

    /// The file tag, None if the bytes are not a valid tag
    pub fn tag(&self) -> Option<FileTag> {
        FileTag::from_bytes(&self.tag)
    }

    #[inline(always)]
    pub fn offset(&self) -> u16 {
        u16::from_le_bytes(self.offset)
    }

    /// The index of the block within its file
    #[inline(always)]
    pub fn index(&self) -> u16 {
        self.offset() / BLOCK_DATA_BYTE_SIZE as u16
    }

    #[inline(always)]
    pub fn size(&self) -> u8 {
        self.size
    }

    #[inline(always)]
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn set_version(&mut self, version: u8) {
        self.version = version;
    }

    #[inline(always)]
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Check the invariants of the header fields
    ///
    /// # Arguments
    /// * addr: the block address, only used for reporting
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(InvalidData(addr))
    pub fn sanity_check(&self, addr: u32) -> Result<()> {
        let invalid = Err(FsError::InvalidData(addr));
        if self.is_clean() {
            return if self.as_bytes().iter().all(|byte| *byte == 0xff) {
                Ok(())
            } else {
                invalid
            };
        }
        if self.reserved.iter().any(|byte| *byte != 0)
            || self.size as usize > BLOCK_DATA_BYTE_SIZE
            || HeaderFlags::from_bits(self.flags).is_none()
        {
            return invalid;
        }
        if self.is_dummy() {
            return Ok(());
        }
        if self.offset() as usize % BLOCK_DATA_BYTE_SIZE != 0
            || self.tag().is_none()
            || self.size == 0
        {
            return invalid;
        }
        if !self.is_read_write()
            && (!self.is_current() || self.is_no_checksum() || self.version != 0)
        {
            return invalid;
        }
        Ok(())
    }
}
impl AsBytes for BlockHeader {
    /// Read Self as bytes slice from memory
    fn as_bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(self as *const _ as usize as *const u8, HEADER_BYTE_SIZE)
        }
    }
}
impl AsBytesMut for BlockHeader {
    /// Read Self as mutable bytes slice from memory
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(self as *mut _ as usize as *mut u8, HEADER_BYTE_SIZE)
        }
    }
}

/// The byte offset of a block in the flash
#[inline(always)]
pub fn block_offset(addr: u32) -> usize {
    addr as usize * BLOCK_BYTE_SIZE
}

/// The checksum which makes all bytes of the block, checksum included, sum up to zero
pub fn cal_checksum(block: &[u8]) -> u8 {
    let sum = block
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != CHECKSUM_OFFSET)
        .fold(0u8, |sum, (_, byte)| sum.wrapping_add(*byte));
    0u8.wrapping_sub(sum)
}

/// Store a checksum into the block buffer
pub fn seal_checksum(block: &mut [u8], checksum: u8) {
    block[CHECKSUM_OFFSET] = checksum;
}

/// Recompute the checksum of the block and compare it with the stored one.
/// Blocks which are exempt from checksum always pass.
///
/// # Returns
/// * Ok(computed checksum)
/// * Err(InvalidData(addr))
pub fn sanity_check_data(block: &[u8], addr: u32) -> Result<u8> {
    let header = BlockHeader::from_bytes(block);
    let checksum = cal_checksum(block);
    if header.is_no_checksum() || header.checksum() == checksum {
        Ok(checksum)
    } else {
        Err(FsError::InvalidData(addr))
    }
}

/// Read the header of a block without any validation
pub fn read_header(device: &Arc<dyn FlashDevice>, addr: u32) -> Result<BlockHeader> {
    let mut header = BlockHeader::dummy();
    device.read(block_offset(addr), header.as_bytes_mut())?;
    Ok(header)
}

/// Read the whole block into the buffer and check its header
///
/// # Returns
/// * Ok(header)
/// * Err(InvalidData(addr) | FlashRead(offset))
pub fn read_block(
    device: &Arc<dyn FlashDevice>,
    addr: u32,
    buffer: &mut BlockBuffer,
) -> Result<BlockHeader> {
    device.read(block_offset(addr), buffer)?;
    let header = BlockHeader::from_bytes(buffer);
    header.sanity_check(addr)?;
    Ok(header)
}

pub fn write_block(device: &Arc<dyn FlashDevice>, addr: u32, buffer: &BlockBuffer) -> Result<()> {
    device.write(block_offset(addr), buffer)
}

/// Clear the `CURRENT` flag of a block with a single byte program,
/// all the other flags are kept as they are
pub fn invalidate_block(device: &Arc<dyn FlashDevice>, addr: u32) -> Result<()> {
    let offset = block_offset(addr);
    let mut flags = [0u8; 1];
    device.read(offset, &mut flags)?;
    flags[0] &= !HeaderFlags::CURRENT.bits();
    device.write(offset, &flags)
}
