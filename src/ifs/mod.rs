// @author:    olinex
// @time:      2023/11/25

// self mods
mod directory;
mod gc;
mod journal;
mod mount;
mod volume;

// use other mods
use alloc::sync::Arc;
use alloc::vec::Vec;

// use self mods
pub use directory::{FileDescriptor, FileType};
pub use volume::MAX_FILE_BYTE_SIZE;

use crate::configs::{
    BLOCK_BYTE_SIZE, DEFAULT_GC_LOW_WATER_MARK, FORMAT_VERSION_CURRENT, FORMAT_VERSION_LEGACY,
    SECTOR_BYTE_SIZE,
};
use crate::flash::{BufferPool, FlashDevice};
use crate::layout::{check_total_byte_size, BlockHeader, FileTag, MapEntry, SuperBlock};
use crate::{CreateFlags, FsError, Result};
use volume::Volume;

/// What the mount does with a file whose chain has holes
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CorruptPolicy {
    /// Keep the file in the directory as an unreadable zombie
    Zombie,
    /// Drop the file and keep its blocks on the corrupt chain until they are reclaimed
    Quarantine,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FsConfig {
    /// The newest on-media format which can be mounted
    pub format_version: u32,
    /// Garbage is collected once the clean sectors drop to this count
    pub gc_low_water_mark: usize,
    pub corrupt_policy: CorruptPolicy,
}
impl FsConfig {
    /// Create a configuration, the legacy format keeps corrupted files as zombies
    pub fn new(format_version: u32, gc_low_water_mark: usize) -> Self {
        let corrupt_policy = if format_version <= FORMAT_VERSION_LEGACY {
            CorruptPolicy::Zombie
        } else {
            CorruptPolicy::Quarantine
        };
        Self {
            format_version,
            gc_low_water_mark,
            corrupt_policy,
        }
    }

    pub fn with_corrupt_policy(mut self, corrupt_policy: CorruptPolicy) -> Self {
        self.corrupt_policy = corrupt_policy;
        self
    }
}
impl Default for FsConfig {
    fn default() -> Self {
        Self::new(FORMAT_VERSION_CURRENT, DEFAULT_GC_LOW_WATER_MARK)
    }
}

/// Write an empty volume onto the flash.
/// Every sector is erased and block 0 gets the dummy header and the super block.
///
/// # Arguments
/// * device: the flash to format
/// * total_byte_size: the byte size of the volume, a multiple of the sector size
/// * version: the on-media format version
///
/// # Returns
/// * Ok(())
/// * Err(InvalidSuperBlock | NotSupported | FlashErase(offset) | FlashWrite(offset))
pub fn format(device: &Arc<dyn FlashDevice>, total_byte_size: u32, version: u32) -> Result<()> {
    check_total_byte_size(total_byte_size)?;
    if version == 0 || version > FORMAT_VERSION_CURRENT {
        return Err(FsError::NotSupported);
    }
    for offset in (0..total_byte_size as usize).step_by(SECTOR_BYTE_SIZE) {
        device.erase(offset, SECTOR_BYTE_SIZE)?;
    }
    let mut block = [0u8; BLOCK_BYTE_SIZE];
    BlockHeader::dummy().write_to(&mut block);
    SuperBlock::new(version, total_byte_size).write_to(&mut block);
    device.write(0, &block)?;
    info!("Formatted {} bytes with format {}", total_byte_size, version);
    Ok(())
}

/// The flash-backed file system.
/// It is constructed unmounted, [`InfoRomFs::load`] rebuilds all in-memory state from the flash,
/// and writes stay refused until [`InfoRomFs::enable_writes`].
/// All calls run to completion, the caller serializes access.
pub struct InfoRomFs {
    device: Arc<dyn FlashDevice>,
    pool: Arc<BufferPool>,
    config: FsConfig,
    gc_enabled: bool,
    volume: Option<Volume>,
}
impl InfoRomFs {
    pub fn new(device: Arc<dyn FlashDevice>, config: FsConfig) -> Self {
        Self {
            device,
            pool: Arc::new(BufferPool::new()),
            config,
            gc_enabled: true,
            volume: None,
        }
    }

    /// Create an unmounted file system
    ///
    /// # Arguments
    /// * device: the flash driver
    /// * version: the newest on-media format which can be mounted
    /// * gc_low_water_mark: the clean sector count which triggers garbage collection
    pub fn construct(device: Arc<dyn FlashDevice>, version: u32, gc_low_water_mark: usize) -> Self {
        Self::new(device, FsConfig::new(version, gc_low_water_mark))
    }

    /// Release the in-memory state and hand the flash back, the flash is not touched
    pub fn destruct(self) -> Arc<dyn FlashDevice> {
        self.device
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.volume.is_some()
    }

    fn volume(&self) -> Result<&Volume> {
        self.volume.as_ref().ok_or(FsError::NotMounted)
    }

    fn volume_mut(&mut self) -> Result<&mut Volume> {
        self.volume.as_mut().ok_or(FsError::NotMounted)
    }

    /// Mount the volume from flash
    ///
    /// # Arguments
    /// * read_only: refuse every modification for the whole mount
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(InvalidState | InvalidSuperBlock | NotSupported | NoFreeMemory | NoFreeFileSlot | FlashRead(offset))
    pub fn load(&mut self, read_only: bool) -> Result<()> {
        if self.volume.is_some() {
            return Err(FsError::InvalidState);
        }
        let volume = Volume::mount(
            Arc::clone(&self.device),
            Arc::clone(&self.pool),
            self.config,
            read_only,
            self.gc_enabled,
        )?;
        self.volume = Some(volume);
        Ok(())
    }

    /// Start accepting modifications, deletions requested before are finished on flash
    pub fn enable_writes(&mut self) -> Result<()> {
        self.volume_mut()?.enable_writes()
    }

    /// Read bytes of a file
    ///
    /// # Arguments
    /// * tag: the three uppercase letters naming the file
    /// * offset: the byte offset where the reading starts
    /// * length: the count of bytes to read, the range must be inside the file
    ///
    /// # Returns
    /// * Ok(bytes)
    /// * Err(NotMounted | InvalidArgument | FileNotFound(tag) | NotSupported | InvalidData(addr) | NoFreeMemory)
    pub fn read(&mut self, tag: &str, offset: u32, length: usize) -> Result<Vec<u8>> {
        let tag = FileTag::new(tag)?;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(length)
            .map_err(|_| FsError::NoFreeMemory)?;
        buffer.resize(length, 0);
        self.volume_mut()?.read(tag, offset, &mut buffer)?;
        Ok(buffer)
    }

    /// Overwrite bytes of a read-write file, the range must be inside the file
    ///
    /// # Errors
    /// A garbage collection run before the write only logs its failure,
    /// the write goes on and fails with `InsufficientResources` if no clean block is left.
    /// A failed invalidation of the replaced block is returned although the new data is kept.
    pub fn write(&mut self, tag: &str, offset: u32, data: &[u8]) -> Result<()> {
        let tag = FileTag::new(tag)?;
        self.volume_mut()?.write(tag, offset, data)
    }

    /// Create a new file holding the contents.
    /// A failed creation leaves no file behind.
    ///
    /// # Errors
    /// A garbage collection run between blocks only logs its failure,
    /// the creation goes on and fails with `InsufficientResources` if no clean block is left.
    pub fn create(&mut self, tag: &str, contents: &[u8], flags: CreateFlags) -> Result<()> {
        let tag = FileTag::new(tag)?;
        self.volume_mut()?.create(tag, contents, flags)
    }

    /// Delete a file, before writes are enabled the flash is only updated by [`InfoRomFs::enable_writes`]
    pub fn delete(&mut self, tag: &str) -> Result<()> {
        let tag = FileTag::new(tag)?;
        self.volume_mut()?.delete(tag)
    }

    fn descriptor(&self, tag: &str) -> Result<(usize, &FileDescriptor)> {
        let tag = FileTag::new(tag)?;
        self.volume()?.directory.get(tag)
    }

    pub fn size(&self, tag: &str) -> Result<u32> {
        Ok(self.descriptor(tag)?.1.byte_size())
    }

    pub fn file_type(&self, tag: &str) -> Result<FileType> {
        Ok(self.descriptor(tag)?.1.file_type())
    }

    /// Tags of all readable files, zombies are not listed
    pub fn list_files(&self) -> Result<Vec<FileTag>> {
        Ok(self.volume()?.directory.tags())
    }

    /// Count of the files in the directory, zombies included
    pub fn file_count(&self) -> Result<usize> {
        Ok(self.volume()?.directory.ids().len())
    }

    /// Addresses of the blocks of a file, in order
    pub fn file_blocks(&self, tag: &str) -> Result<Vec<u32>> {
        let id = self.descriptor(tag)?.0;
        self.volume()?.chain_blocks(id)
    }

    /// The map entry of a block
    pub fn entry(&self, addr: u32) -> Result<MapEntry> {
        self.volume()?.map.get(addr)
    }

    pub fn block_count(&self) -> Result<u32> {
        Ok(self.volume()?.map.block_count())
    }

    /// The on-media format version of the mounted volume
    pub fn format_version(&self) -> Result<u32> {
        Ok(self.volume()?.format_version)
    }

    /// Turn the collection before writes on or off
    pub fn set_gc_enabled(&mut self, enabled: bool) {
        self.gc_enabled = enabled;
        if let Some(volume) = self.volume.as_mut() {
            volume.gc_enabled = enabled;
        }
    }

    /// Check if the clean sectors dropped to the low water mark, false when not mounted
    pub fn is_gc_needed(&self) -> bool {
        self.volume.as_ref().is_some_and(Volume::is_gc_needed)
    }

    /// Reclaim one sector now
    ///
    /// # Returns
    /// * Ok(true): a sector was erased or found bad
    /// * Ok(false): no sector can be reclaimed
    /// * Err(NotMounted | NotSupported | InvalidState | InsufficientResources | FlashRead(offset) | FlashWrite(offset))
    pub fn do_gc(&mut self) -> Result<bool> {
        let volume = self.volume_mut()?;
        volume.check_writable()?;
        volume.reclaim_sector()
    }
}
