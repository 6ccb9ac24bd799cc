// @author:    olinex
// @time:      2023/11/23

// self mods

// use other mods
use alloc::sync::Arc;
use alloc::vec::Vec;

// use self mods
use super::directory::{Directory, FileIter, FileType};
use super::journal::Stamp;
use super::FsConfig;
use crate::configs::{BLOCK_DATA_BYTE_SIZE, HEADER_BYTE_SIZE};
use crate::flash::{BufferPool, FlashDevice};
use crate::layout::{
    block_offset, cal_checksum, invalidate_block, read_block, sanity_check_data, seal_checksum,
    write_block, BlockHeader, BlockMap, BlockTag, FileId, FileTag, HeaderFlags, MapEntry,
};
use crate::{CreateFlags, FsError, Result};

/// The largest file whose last block offset still fits in the 16-bit header field
pub const MAX_FILE_BYTE_SIZE: usize = (u16::MAX as usize / BLOCK_DATA_BYTE_SIZE + 1) * BLOCK_DATA_BYTE_SIZE;

/// Everything the file system knows about a mounted flash.
/// It only lives between a successful mount and the teardown,
/// so a failed mount never leaves partial state behind.
pub(crate) struct Volume {
    pub(crate) device: Arc<dyn FlashDevice>,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) config: FsConfig,
    pub(crate) format_version: u32,
    pub(crate) map: BlockMap,
    pub(crate) directory: Directory,
    /// Head of the chain of blocks whose files were dropped because of holes
    pub(crate) corrupt_head: Option<u32>,
    /// Sector which new blocks are allocated from
    pub(crate) write_sector: u32,
    /// Sector where the next reclaim starts looking
    pub(crate) gc_sector: u32,
    pub(crate) gc_enabled: bool,
    pub(crate) read_only: bool,
    pub(crate) writes_enabled: bool,
}
impl Volume {
    /// Check the volume accepts modifications
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(NotSupported): mounted read only
    /// * Err(InvalidState): writes were not enabled yet
    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(FsError::NotSupported)
        } else if !self.writes_enabled {
            Err(FsError::InvalidState)
        } else {
            Ok(())
        }
    }

    /// Allow modifications and finish the deletions which were requested before,
    /// by invalidating their blocks on flash
    pub(crate) fn enable_writes(&mut self) -> Result<()> {
        if self.read_only {
            return Err(FsError::NotSupported);
        }
        for addr in 0..self.map.block_count() {
            if self.map.get(addr)? == MapEntry::Tag(BlockTag::Delete) {
                invalidate_block(&self.device, addr)?;
                self.map.set(addr, MapEntry::DISCARD)?;
            }
        }
        self.writes_enabled = true;
        Ok(())
    }

    /// Addresses of the chain of a file, in order
    ///
    /// # Returns
    /// * Ok(addresses)
    /// * Err(InvalidState): the chain is broken or loops
    pub(crate) fn chain_blocks(&self, id: FileId) -> Result<Vec<u32>> {
        let mut blocks = Vec::new();
        let mut current = self.directory.file(id)?.first_block;
        while let Some(addr) = current {
            if blocks.len() >= self.map.block_count() as usize {
                return Err(FsError::InvalidState);
            }
            blocks.push(addr);
            current = match self.map.get(addr)? {
                MapEntry::Next(next) => Some(next),
                MapEntry::LIST_END => None,
                _ => return Err(FsError::InvalidState),
            };
        }
        Ok(blocks)
    }

    fn check_bounds(byte_size: u32, offset: u32, length: usize) -> Result<()> {
        if offset as u64 + length as u64 > byte_size as u64 {
            Err(FsError::InvalidArgument)
        } else {
            Ok(())
        }
    }

    /// Read bytes of a file into the buffer, the whole buffer is filled
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(FileNotFound(tag) | NotSupported | InvalidArgument | InvalidData(addr) | InvalidState | FlashRead(offset))
    pub(crate) fn read(&mut self, tag: FileTag, offset: u32, buffer: &mut [u8]) -> Result<()> {
        let (id, fd) = self.directory.get(tag)?;
        if !fd.is_readable() {
            return Err(FsError::NotSupported);
        }
        Self::check_bounds(fd.byte_size, offset, buffer.len())?;
        if buffer.is_empty() {
            return Ok(());
        }
        let iter = FileIter::start(&mut self.directory, id)?;
        let result = self.read_chain(&iter, offset as usize, buffer);
        iter.finish(&mut self.directory);
        result
    }

    fn read_chain(&mut self, iter: &FileIter, offset: usize, buffer: &mut [u8]) -> Result<()> {
        let pool = Arc::clone(&self.pool);
        let mut addr = iter.seek(
            &mut self.directory,
            &self.map,
            offset / BLOCK_DATA_BYTE_SIZE,
        )?;
        let mut start = offset % BLOCK_DATA_BYTE_SIZE;
        let mut done = 0;
        loop {
            let length = (BLOCK_DATA_BYTE_SIZE - start).min(buffer.len() - done);
            let mut block = pool.borrow();
            let header = read_block(&self.device, addr, &mut block)?;
            sanity_check_data(&*block, addr)?;
            if start + length > header.size() as usize {
                return Err(FsError::InvalidData(addr));
            }
            let data = HEADER_BYTE_SIZE + start;
            buffer[done..done + length].copy_from_slice(&block[data..data + length]);
            done += length;
            start = 0;
            if done == buffer.len() {
                return Ok(());
            }
            drop(block);
            addr = iter
                .next(&mut self.directory, &self.map)?
                .ok_or(FsError::InvalidState)?;
        }
    }

    /// Overwrite bytes of a file, files never grow
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(
    ///     FileNotFound(tag) |
    ///     NotSupported |
    ///     InvalidState |
    ///     InvalidArgument |
    ///     InvalidData(addr) |
    ///     InsufficientResources |
    ///     FlashRead(offset) |
    ///     FlashWrite(offset)
    /// )
    pub(crate) fn write(&mut self, tag: FileTag, offset: u32, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        let (id, fd) = self.directory.get(tag)?;
        if fd.file_type != FileType::ReadWrite {
            return Err(FsError::NotSupported);
        }
        Self::check_bounds(fd.byte_size, offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        let iter = FileIter::start(&mut self.directory, id)?;
        let result = self.write_chain(&iter, offset as usize, data);
        iter.finish(&mut self.directory);
        result
    }

    fn write_chain(&mut self, iter: &FileIter, offset: usize, data: &[u8]) -> Result<()> {
        iter.seek(
            &mut self.directory,
            &self.map,
            offset / BLOCK_DATA_BYTE_SIZE,
        )?;
        let mut start = offset % BLOCK_DATA_BYTE_SIZE;
        let mut done = 0;
        loop {
            let length = (BLOCK_DATA_BYTE_SIZE - start).min(data.len() - done);
            self.write_block_range(iter, start, &data[done..done + length])?;
            done += length;
            start = 0;
            if done == data.len() {
                return Ok(());
            }
            iter.next(&mut self.directory, &self.map)?
                .ok_or(FsError::InvalidState)?;
        }
    }

    /// Update a range of the block under the iterator.
    /// Bits which only go from 1 to 0 in a block without checksum are programmed in place,
    /// anything else is written to a new block by the journaled writer.
    fn write_block_range(&mut self, iter: &FileIter, start: usize, bytes: &[u8]) -> Result<()> {
        let pool = Arc::clone(&self.pool);
        let range = HEADER_BYTE_SIZE + start..HEADER_BYTE_SIZE + start + bytes.len();
        let mut collected = false;
        loop {
            let addr = iter.current(&self.directory)?;
            let mut draft = pool.borrow();
            let header = read_block(&self.device, addr, &mut draft)?;
            sanity_check_data(&*draft, addr)?;
            if start + bytes.len() > header.size() as usize {
                return Err(FsError::InvalidData(addr));
            }
            let current = &draft[range.clone()];
            if current == bytes {
                return Ok(());
            }
            if header.is_no_checksum()
                && current
                    .iter()
                    .zip(bytes.iter())
                    .all(|(old, new)| old & new == *new)
            {
                return self
                    .device
                    .write(block_offset(addr) + range.start, bytes);
            }
            if self.gc_enabled && !collected && self.is_gc_needed() {
                // the collector may move this very block, read it again afterwards
                drop(draft);
                collected = true;
                if let Err(err) = self.reclaim_sector() {
                    warn!("Garbage collection before writing block {} failed: {}", addr, err);
                }
                continue;
            }
            draft[range.clone()].copy_from_slice(bytes);
            self.write_journaled(addr, &mut draft, Stamp::REWRITE, None, |volume, new| {
                iter.move_to(&mut volume.directory, &mut volume.map, new)
            })?;
            return Ok(());
        }
    }

    /// Create a new file holding the contents, one block per data chunk
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(
    ///     NotSupported |
    ///     InvalidState |
    ///     InvalidArgument |
    ///     FileExists(tag) |
    ///     NoFreeFileSlot |
    ///     InsufficientResources |
    ///     FlashWrite(offset)
    /// )
    pub(crate) fn create(&mut self, tag: FileTag, contents: &[u8], flags: CreateFlags) -> Result<()> {
        self.check_writable()?;
        if contents.is_empty()
            || contents.len() > MAX_FILE_BYTE_SIZE
            || (!flags.is_read_write() && flags.is_no_checksum())
        {
            return Err(FsError::InvalidArgument);
        }
        let (file_type, mut header_flags) = if flags.is_read_write() {
            (FileType::ReadWrite, HeaderFlags::READ_WRITE)
        } else {
            (FileType::ReadOnly, HeaderFlags::empty())
        };
        if flags.is_no_checksum() {
            header_flags |= HeaderFlags::NO_CHECKSUM;
        }
        let id = self.directory.create(tag, file_type)?;
        if let Err(err) = self.write_new_file(id, tag, contents, header_flags) {
            self.abandon_file(id);
            return Err(err);
        }
        debug!("File {} created with {} bytes", tag, contents.len());
        Ok(())
    }

    /// Write the contents of a new file block by block, in index order
    fn write_new_file(
        &mut self,
        id: FileId,
        tag: FileTag,
        contents: &[u8],
        header_flags: HeaderFlags,
    ) -> Result<()> {
        let pool = Arc::clone(&self.pool);
        let mut previous = None;
        for (index, chunk) in contents.chunks(BLOCK_DATA_BYTE_SIZE).enumerate() {
            if self.gc_enabled && self.is_gc_needed() {
                if let Err(err) = self.reclaim_sector() {
                    warn!("Garbage collection while creating file {} failed: {}", tag, err);
                }
            }
            let addr = self.allocate_block(None)?;
            let mut block = pool.borrow();
            block.fill(0);
            let offset = (index * BLOCK_DATA_BYTE_SIZE) as u16;
            BlockHeader::new(tag, offset, chunk.len() as u8, header_flags, 0).write_to(&mut *block);
            block[HEADER_BYTE_SIZE..HEADER_BYTE_SIZE + chunk.len()].copy_from_slice(chunk);
            if !header_flags.contains(HeaderFlags::NO_CHECKSUM) {
                let checksum = cal_checksum(&*block);
                seal_checksum(&mut *block, checksum);
            }
            if let Err(err) = write_block(&self.device, addr, &block) {
                self.map.set(addr, MapEntry::DISCARD)?;
                return Err(err);
            }
            self.map.set(addr, MapEntry::LIST_END)?;
            match previous {
                Some(previous) => self.map.set(previous, MapEntry::Next(addr))?,
                None => self.directory.file_mut(id)?.first_block = Some(addr),
            }
            self.directory.file_mut(id)?.byte_size += chunk.len() as u32;
            previous = Some(addr);
        }
        Ok(())
    }

    /// Drop a file whose creation failed.
    /// Its blocks are invalidated as far as the flash allows and discarded either way.
    fn abandon_file(&mut self, id: FileId) {
        for addr in self.chain_blocks(id).unwrap_or_default() {
            if let Err(err) = invalidate_block(&self.device, addr) {
                warn!("Block {} of an abandoned file stays current: {}", addr, err);
            }
            if self.map.set(addr, MapEntry::DISCARD).is_err() {
                warn!("Block {} of an abandoned file is out of the map", addr);
            }
        }
        self.directory.remove(id);
    }

    /// Remove a file from the volume.
    /// Before writes are enabled its blocks are only tagged `Delete`
    /// and get invalidated on flash by [`Volume::enable_writes`].
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(NotSupported | FileNotFound(tag) | InvalidState | FlashWrite(offset))
    pub(crate) fn delete(&mut self, tag: FileTag) -> Result<()> {
        if self.read_only {
            return Err(FsError::NotSupported);
        }
        let (id, _) = self.directory.get(tag)?;
        for addr in self.chain_blocks(id)? {
            if self.writes_enabled {
                invalidate_block(&self.device, addr)?;
                self.map.set(addr, MapEntry::DISCARD)?;
            } else {
                self.map.set(addr, MapEntry::Tag(BlockTag::Delete))?;
            }
        }
        self.directory.remove(id);
        debug!("File {} deleted", tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::super::testing::{formatted, mounted, pattern, read_all};
    use super::super::{FsConfig, InfoRomFs};
    use super::*;
    use crate::layout::read_header;

    #[test]
    fn test_max_file_byte_size() {
        assert!((MAX_FILE_BYTE_SIZE / BLOCK_DATA_BYTE_SIZE - 1) * BLOCK_DATA_BYTE_SIZE <= u16::MAX as usize);
        assert!(MAX_FILE_BYTE_SIZE / BLOCK_DATA_BYTE_SIZE * BLOCK_DATA_BYTE_SIZE > u16::MAX as usize);
    }

    #[test]
    fn test_volume_read_and_write_round_trip() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        let contents = pattern(300, 1);
        fs.create("OBD", &contents, CreateFlags::READ_WRITE).unwrap();
        assert_eq!(Ok(300), fs.size("OBD"));
        assert_eq!(Ok(contents.clone()), fs.read("OBD", 0, 300));

        // straddles the boundary between the first and the second block
        let update = pattern(40, 7);
        fs.write("OBD", BLOCK_DATA_BYTE_SIZE as u32 - 20, &update).unwrap();
        assert_eq!(Ok(update.clone()), fs.read("OBD", BLOCK_DATA_BYTE_SIZE as u32 - 20, 40));

        let mut expected = contents;
        expected[BLOCK_DATA_BYTE_SIZE - 20..BLOCK_DATA_BYTE_SIZE + 20].copy_from_slice(&update);
        assert_eq!(Ok(expected), fs.read("OBD", 0, 300));
        assert_eq!(Ok(Vec::new()), fs.read("OBD", 300, 0));
    }

    #[test]
    fn test_volume_bounds_and_permissions() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("ECC", &pattern(10, 3), CreateFlags::empty()).unwrap();
        fs.create("CFG", &pattern(10, 3), CreateFlags::READ_WRITE).unwrap();
        assert_eq!(Err(FsError::InvalidArgument), fs.read("CFG", 5, 6).map(|_| ()));
        assert_eq!(Err(FsError::InvalidArgument), fs.write("CFG", 10, &[1]));
        assert_eq!(Err(FsError::NotSupported), fs.write("ECC", 0, &[1]));
        assert_eq!(Ok(FileType::ReadOnly), fs.file_type("ECC"));
        assert_eq!(
            Err(FsError::FileNotFound(FileTag::new("PWR").unwrap())),
            fs.read("PWR", 0, 1).map(|_| ())
        );
        assert_eq!(Err(FsError::InvalidArgument), fs.read("pwr", 0, 1).map(|_| ()));
        assert_eq!(
            Err(FsError::FileExists(FileTag::new("CFG").unwrap())),
            fs.create("CFG", &[1], CreateFlags::READ_WRITE)
        );
        assert_eq!(Err(FsError::InvalidArgument), fs.create("NIL", &[], CreateFlags::READ_WRITE));
        assert_eq!(
            Err(FsError::InvalidArgument),
            fs.create("ROM", &[1], CreateFlags::NO_CHECKSUM)
        );
    }

    #[test]
    fn test_volume_in_place_and_journaled_write() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        let mut contents = pattern(50, 0);
        contents[10] = 0b1111_0000;
        fs.create("CFG", &contents, CreateFlags::READ_WRITE | CreateFlags::NO_CHECKSUM)
            .unwrap();
        let device: Arc<dyn FlashDevice> = flash.clone();
        let addr = fs.file_blocks("CFG").unwrap()[0];
        let version = read_header(&device, addr).unwrap().version();

        // only clears bits, programmed in place
        fs.write("CFG", 10, &[0b1010_0000]).unwrap();
        assert_eq!(Ok(alloc::vec![addr]), fs.file_blocks("CFG"));
        assert_eq!(version, read_header(&device, addr).unwrap().version());
        assert_eq!(Ok(alloc::vec![0b1010_0000]), fs.read("CFG", 10, 1));

        // needs a 0 -> 1 transition, goes to a new block
        fs.write("CFG", 10, &[0b1010_0001]).unwrap();
        let moved = fs.file_blocks("CFG").unwrap()[0];
        assert_ne!(addr, moved);
        assert_eq!(version + 1, read_header(&device, moved).unwrap().version());
        assert_eq!(Ok(MapEntry::DISCARD), fs.entry(addr));
        assert!(!read_header(&device, addr).unwrap().is_current());
        assert_eq!(Ok(alloc::vec![0b1010_0001]), fs.read("CFG", 10, 1));
    }

    #[test]
    fn test_volume_checksummed_write_is_journaled() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("CFG", &[0xff; 8], CreateFlags::READ_WRITE).unwrap();
        let addr = fs.file_blocks("CFG").unwrap()[0];
        fs.write("CFG", 0, &[0x0f]).unwrap();
        assert_ne!(Ok(alloc::vec![addr]), fs.file_blocks("CFG"));
        // rewriting the same bytes changes nothing
        let addr = fs.file_blocks("CFG").unwrap()[0];
        fs.write("CFG", 0, &[0x0f]).unwrap();
        assert_eq!(Ok(alloc::vec![addr]), fs.file_blocks("CFG"));
    }

    #[test]
    fn test_volume_crash_after_new_block_written() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("CFG", &pattern(200, 5), CreateFlags::READ_WRITE).unwrap();
        // the new block is written, invalidating the old one fails
        flash.fail_after_writes(1);
        assert!(fs.write("CFG", 120, &[0xaa, 0x55]).is_err());
        fs.destruct();
        flash.clear_faults();

        let mut fs = mounted(&flash, FsConfig::default());
        let mut expected = pattern(200, 5);
        expected[120..122].copy_from_slice(&[0xaa, 0x55]);
        assert_eq!(Ok(expected), read_all(&mut fs, "CFG"));
        assert_eq!(2, fs.file_blocks("CFG").unwrap().len());
    }

    #[test]
    fn test_volume_crash_before_new_block_written() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("CFG", &pattern(200, 5), CreateFlags::READ_WRITE).unwrap();
        flash.fail_after_writes(0);
        assert!(fs.write("CFG", 120, &[0xaa, 0x55]).is_err());
        fs.destruct();
        flash.clear_faults();

        let mut fs = mounted(&flash, FsConfig::default());
        assert_eq!(Ok(pattern(200, 5)), read_all(&mut fs, "CFG"));
    }

    #[test]
    fn test_volume_read_only_mount() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("CFG", &pattern(20, 5), CreateFlags::READ_WRITE).unwrap();
        fs.destruct();

        let mut fs = InfoRomFs::new(flash.clone(), FsConfig::default());
        fs.load(true).unwrap();
        assert_eq!(Err(FsError::NotSupported), fs.enable_writes());
        assert_eq!(Err(FsError::NotSupported), fs.write("CFG", 0, &[0]));
        assert_eq!(Err(FsError::NotSupported), fs.delete("CFG"));
        assert_eq!(Ok(pattern(20, 5)), fs.read("CFG", 0, 20));
    }

    #[test]
    fn test_volume_writes_wait_for_enable() {
        let flash = formatted();
        let mut fs = InfoRomFs::new(flash.clone(), FsConfig::default());
        fs.load(false).unwrap();
        assert_eq!(Err(FsError::InvalidState), fs.create("CFG", &[1], CreateFlags::READ_WRITE));
        fs.enable_writes().unwrap();
        assert!(fs.create("CFG", &[1], CreateFlags::READ_WRITE).is_ok());
    }

    #[test]
    fn test_volume_delete() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("AAA", &pattern(150, 1), CreateFlags::READ_WRITE).unwrap();
        fs.create("BBB", &pattern(10, 2), CreateFlags::READ_WRITE).unwrap();
        let blocks = fs.file_blocks("BBB").unwrap();
        fs.delete("BBB").unwrap();
        assert_eq!(Ok(alloc::vec![FileTag::new("AAA").unwrap()]), fs.list_files());
        assert_eq!(Ok(MapEntry::DISCARD), fs.entry(blocks[0]));
        fs.destruct();

        let fs = mounted(&flash, FsConfig::default());
        assert_eq!(Ok(alloc::vec![FileTag::new("AAA").unwrap()]), fs.list_files());
    }

    #[test]
    fn test_volume_deferred_delete() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("AAA", &pattern(150, 1), CreateFlags::READ_WRITE).unwrap();
        let blocks = fs.file_blocks("AAA").unwrap();
        fs.destruct();

        let mut fs = InfoRomFs::new(flash.clone(), FsConfig::default());
        fs.load(false).unwrap();
        fs.delete("AAA").unwrap();
        assert_eq!(Ok(Vec::new()), fs.list_files());
        assert_eq!(Ok(MapEntry::Tag(BlockTag::Delete)), fs.entry(blocks[1]));
        let device: Arc<dyn FlashDevice> = flash.clone();
        assert!(read_header(&device, blocks[1]).unwrap().is_current());

        fs.enable_writes().unwrap();
        assert_eq!(Ok(MapEntry::DISCARD), fs.entry(blocks[1]));
        assert!(!read_header(&device, blocks[1]).unwrap().is_current());
    }

    #[test]
    fn test_volume_write_after_failed_invalidate() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("CFG", &pattern(50, 1), CreateFlags::READ_WRITE).unwrap();
        // the new block is written, invalidating the old one fails
        flash.fail_after_writes(1);
        assert!(fs.write("CFG", 0, &[0xaa]).is_err());
        flash.clear_faults();
        fs.write("CFG", 0, &[0x55]).unwrap();
        assert_eq!(Ok(alloc::vec![0x55]), fs.read("CFG", 0, 1));
        fs.destruct();

        let mut fs = mounted(&flash, FsConfig::default());
        let mut expected = pattern(50, 1);
        expected[0] = 0x55;
        assert_eq!(Ok(expected), read_all(&mut fs, "CFG"));
    }

    #[test]
    fn test_volume_failed_create_leaves_no_file() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        flash.fail_after_writes(1);
        assert!(fs
            .create("CFG", &pattern(300, 1), CreateFlags::READ_WRITE)
            .is_err_and(|err| matches!(err, FsError::FlashWrite(_))));
        assert_eq!(Ok(Vec::new()), fs.list_files());
        assert_eq!(
            Err(FsError::FileNotFound(FileTag::new("CFG").unwrap())),
            fs.size("CFG")
        );
        assert_eq!(Ok(MapEntry::DISCARD), fs.entry(1));
        assert_eq!(Ok(MapEntry::DISCARD), fs.entry(2));

        flash.clear_faults();
        fs.create("CFG", &pattern(300, 2), CreateFlags::READ_WRITE).unwrap();
        assert_eq!(Ok(pattern(300, 2)), read_all(&mut fs, "CFG"));
        assert!(fs.file_blocks("CFG").unwrap().iter().all(|addr| *addr > 2));
    }

    #[test]
    fn test_volume_failed_create_is_invalidated() {
        let flash = formatted();
        let mut fs = mounted(&flash, FsConfig::default());
        fs.create("PAD", &pattern(10, 0), CreateFlags::empty()).unwrap();
        fs.set_gc_enabled(false);
        // one block more than the clean blocks left
        let clean = (fs.block_count().unwrap() - 2) as usize;
        let mut contents = pattern(clean * BLOCK_DATA_BYTE_SIZE, 3);
        contents.extend_from_slice(&[1]);
        assert_eq!(
            Err(FsError::InsufficientResources),
            fs.create("BIG", &contents, CreateFlags::empty())
        );
        assert_eq!(Ok(alloc::vec![FileTag::new("PAD").unwrap()]), fs.list_files());
        fs.destruct();

        let fs = mounted(&flash, FsConfig::default());
        assert_eq!(Ok(alloc::vec![FileTag::new("PAD").unwrap()]), fs.list_files());
        assert_eq!(Ok(MapEntry::DISCARD), fs.entry(2));
    }
}
