// @author:    olinex
// @time:      2023/11/04

// self mods

// use other mods
use alloc::vec::Vec;
use core::any::Any;
use spin::Mutex;

// use self mods
use crate::configs::SECTOR_BYTE_SIZE;
use crate::{FsError, Result};

/// The raw flash driver which the file system is built on.
/// Flash bytes can only be changed from 1-bits to 0-bits by writing,
/// turning bits back to 1 requires erasing the whole sector which contains them.
pub trait FlashDevice: Send + Sync + Any {
    /// Read bytes from the flash into the buffer
    ///
    /// # Arguments
    /// * offset: the byte offset where the reading starts
    /// * buffer: the buffer which will store the flash data
    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<()>;

    /// Program bytes into the flash
    ///
    /// # Arguments
    /// * offset: the byte offset where the writing starts
    /// * buffer: the bytes which will be programmed
    fn write(&self, offset: usize, buffer: &[u8]) -> Result<()>;

    /// Erase a sector aligned range back to all 0xFF
    ///
    /// # Arguments
    /// * offset: the byte offset of the first sector to erase
    /// * length: the byte length of the range, a multiple of the sector size
    fn erase(&self, offset: usize, length: usize) -> Result<()>;
}

#[derive(Default)]
struct FaultPlan {
    /// Count of writes which still succeed before every write fails
    writes_left: Option<usize>,
    failing_erase: bool,
}

/// The memory flash which is impl [`FlashDevice`] and used for testing.
/// It keeps the NOR programming rule: a write which would turn a 0-bit into a 1-bit fails.
pub struct MemoryFlash {
    data: Mutex<Vec<u8>>,
    faults: Mutex<FaultPlan>,
}
impl MemoryFlash {
    /// Create a new erased memory flash
    ///
    /// # Arguments
    /// * byte_size: the total byte size, rounded up to whole sectors
    pub fn new(byte_size: usize) -> Self {
        let sectors = (byte_size + SECTOR_BYTE_SIZE - 1) / SECTOR_BYTE_SIZE;
        Self {
            data: Mutex::new(alloc::vec![0xff; sectors * SECTOR_BYTE_SIZE]),
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    pub fn byte_size(&self) -> usize {
        self.data.lock().len()
    }

    /// Let the next `count` writes succeed and fail every write after them,
    /// which simulates a power loss in the middle of an operation
    pub fn fail_after_writes(&self, count: usize) {
        self.faults.lock().writes_left = Some(count);
    }

    /// Make every erase fail or succeed again
    pub fn fail_erases(&self, failing: bool) {
        self.faults.lock().failing_erase = failing;
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = FaultPlan::default();
    }

    /// Copy out the whole flash content
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Overwrite bytes ignoring the programming rule, used to simulate media corruption
    pub fn corrupt(&self, offset: usize, bytes: &[u8]) {
        self.data.lock()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn check_range(len: usize, offset: usize, length: usize) -> bool {
        offset.checked_add(length).is_some_and(|end| end <= len)
    }
}
impl FlashDevice for MemoryFlash {
    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<()> {
        let data = self.data.lock();
        if !Self::check_range(data.len(), offset, buffer.len()) {
            return Err(FsError::FlashRead(offset));
        }
        buffer.copy_from_slice(&data[offset..offset + buffer.len()]);
        Ok(())
    }

    fn write(&self, offset: usize, buffer: &[u8]) -> Result<()> {
        let mut faults = self.faults.lock();
        if let Some(writes_left) = faults.writes_left.as_mut() {
            if *writes_left == 0 {
                return Err(FsError::FlashWrite(offset));
            }
            *writes_left -= 1;
        }
        drop(faults);
        let mut data = self.data.lock();
        if !Self::check_range(data.len(), offset, buffer.len()) {
            return Err(FsError::FlashWrite(offset));
        }
        let dst = &mut data[offset..offset + buffer.len()];
        if dst.iter().zip(buffer.iter()).any(|(old, new)| old & new != *new) {
            return Err(FsError::FlashWrite(offset));
        }
        dst.copy_from_slice(buffer);
        Ok(())
    }

    fn erase(&self, offset: usize, length: usize) -> Result<()> {
        if self.faults.lock().failing_erase
            || offset % SECTOR_BYTE_SIZE != 0
            || length % SECTOR_BYTE_SIZE != 0
        {
            return Err(FsError::FlashErase(offset));
        }
        let mut data = self.data.lock();
        if !Self::check_range(data.len(), offset, length) {
            return Err(FsError::FlashErase(offset));
        }
        data[offset..offset + length].fill(0xff);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_flash_read_and_write() {
        let flash = MemoryFlash::new(SECTOR_BYTE_SIZE);
        let mut buffer = [0u8; 4];
        assert!(flash.read(0, &mut buffer).is_ok());
        assert_eq!([0xff; 4], buffer);

        assert!(flash.write(0, &[0x0f, 0xf0, 0x00, 0xff]).is_ok());
        assert!(flash.read(0, &mut buffer).is_ok());
        assert_eq!([0x0f, 0xf0, 0x00, 0xff], buffer);

        assert!(flash.write(0, &[0x0e, 0xf0, 0x00, 0xff]).is_ok());
        assert_eq!(Err(FsError::FlashWrite(0)), flash.write(0, &[0x1f]));
        assert!(flash.read(SECTOR_BYTE_SIZE, &mut buffer).is_err());
    }

    #[test]
    fn test_memory_flash_erase() {
        let flash = MemoryFlash::new(SECTOR_BYTE_SIZE * 2);
        assert_eq!(SECTOR_BYTE_SIZE * 2, flash.byte_size());
        assert!(flash.write(SECTOR_BYTE_SIZE, &[0; 8]).is_ok());
        assert!(flash.erase(1, SECTOR_BYTE_SIZE).is_err());
        assert!(flash.erase(SECTOR_BYTE_SIZE, SECTOR_BYTE_SIZE).is_ok());
        assert!(flash.snapshot().iter().all(|byte| *byte == 0xff));
    }

    #[test]
    fn test_memory_flash_faults() {
        let flash = MemoryFlash::new(SECTOR_BYTE_SIZE);
        flash.fail_after_writes(1);
        assert!(flash.write(0, &[0]).is_ok());
        assert!(flash.write(1, &[0]).is_err());
        flash.clear_faults();
        assert!(flash.write(1, &[0]).is_ok());

        flash.fail_erases(true);
        assert!(flash.erase(0, SECTOR_BYTE_SIZE).is_err());
        flash.fail_erases(false);
        assert!(flash.erase(0, SECTOR_BYTE_SIZE).is_ok());
    }
}
