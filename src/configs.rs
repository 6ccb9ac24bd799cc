// @author:    olinex
// @time:      2023/11/04

// self mods

// use other mods

// use self mods

/// Byte size of one block, the unit of addressing of the whole file system
pub const BLOCK_BYTE_SIZE: usize = 128;
/// Byte size of the header at the start of each block
pub const HEADER_BYTE_SIZE: usize = 16;
/// Bytes of file data a single block can carry
pub const BLOCK_DATA_BYTE_SIZE: usize = BLOCK_BYTE_SIZE - HEADER_BYTE_SIZE;

/// Byte size of the erase granule of the flash
pub const SECTOR_BYTE_SIZE: usize = 4096;
pub const SECTOR_BLOCK_COUNT: usize = SECTOR_BYTE_SIZE / BLOCK_BYTE_SIZE;

/// Slots in the file directory
pub const MAX_FILE_COUNT: usize = 32;
/// Scratch block buffers which can be borrowed at the same time
pub const BORROW_BUFFER_COUNT: usize = 2;

/// Magic tag for check the file system type
pub const FS_MAGIC: [u8; 4] = *b"IFS\x01";

/// The oldest on-media format, corrupted files are kept as zombies
pub const FORMAT_VERSION_LEGACY: u32 = 1;
/// The current on-media format, corrupted files are quarantined
pub const FORMAT_VERSION_CURRENT: u32 = 2;

pub const DEFAULT_GC_LOW_WATER_MARK: usize = 2;
