// @author:    olinex
// @time:      2023/12/01

// self mods

// use other mods
use alloc::sync::Arc;
use alloc::vec::Vec;

// use self mods
use super::directory::{Directory, FileType};
use super::volume::Volume;
use super::{CorruptPolicy, FsConfig};
use crate::configs::BLOCK_DATA_BYTE_SIZE;
use crate::flash::{BufferPool, FlashDevice};
use crate::layout::{
    block_offset, sanity_check_data, BlockHeader, BlockMap, BlockTag, FileId, MapEntry,
    PendingLink, SuperBlock,
};
use crate::{FsError, Result};

impl Volume {
    /// Mount the flash: read the super block, scan every block once,
    /// then link the blocks of each file found into its chain.
    ///
    /// # Arguments
    /// * device: the flash holding the volume
    /// * pool: the scratch buffers shared with the file system
    /// * config: the configuration of the file system
    /// * read_only: never accept modifications
    /// * gc_enabled: collect garbage before writes when needed
    ///
    /// # Returns
    /// * Ok(Volume)
    /// * Err(InvalidSuperBlock | NotSupported | NoFreeMemory | NoFreeFileSlot | InvalidState | FlashRead(offset))
    pub(crate) fn mount(
        device: Arc<dyn FlashDevice>,
        pool: Arc<BufferPool>,
        config: FsConfig,
        read_only: bool,
        gc_enabled: bool,
    ) -> Result<Self> {
        let sb = {
            let mut block = pool.borrow();
            device.read(block_offset(0), &mut *block)?;
            SuperBlock::from_block(&*block)
        };
        sb.check(config.format_version)?;
        let map = BlockMap::new(sb.block_count())?;
        let mut volume = Self {
            device,
            pool,
            config,
            format_version: sb.version(),
            map,
            directory: Directory::new(),
            corrupt_head: None,
            write_sector: 0,
            gc_sector: 0,
            gc_enabled,
            read_only,
            writes_enabled: false,
        };
        for addr in 0..volume.map.block_count() {
            volume.scan_block(addr)?;
        }
        for id in volume.directory.ids() {
            volume.link_file(id)?;
        }
        if volume
            .map
            .range(0..volume.map.block_count())
            .any(|(_, entry)| matches!(entry, MapEntry::Pending(_) | MapEntry::Tag(BlockTag::Invalid)))
        {
            return Err(FsError::InvalidState);
        }
        info!(
            "Mounted {} blocks of format {}, {} files",
            volume.map.block_count(),
            volume.format_version,
            volume.directory.ids().len()
        );
        Ok(volume)
    }

    /// Classify one block and record it in the map.
    /// Blocks failing the sanity checks are discarded, they never abort the mount.
    fn scan_block(&mut self, addr: u32) -> Result<()> {
        if addr == 0 {
            return self.map.set(addr, MapEntry::Tag(BlockTag::Reserved));
        }
        let pool = Arc::clone(&self.pool);
        let mut block = pool.borrow();
        self.device.read(block_offset(addr), &mut *block)?;
        let header = BlockHeader::from_bytes(&*block);
        let entry = if let Err(err) = header.sanity_check(addr).and_then(|_| {
            if header.is_clean() {
                Ok(0)
            } else {
                sanity_check_data(&*block, addr)
            }
        }) {
            warn!("Discard block: {}", err);
            MapEntry::DISCARD
        } else if header.is_clean() {
            if block.iter().all(|byte| *byte == 0xff) {
                MapEntry::CLEAN
            } else {
                warn!("Discard block {}: programmed without header", addr);
                MapEntry::DISCARD
            }
        } else if !header.is_current() {
            MapEntry::DISCARD
        } else {
            self.register_block(addr, &header)?
        };
        self.map.set(addr, entry)
    }

    /// Find or create the file of a current block and remember where the block belongs in it
    fn register_block(&mut self, addr: u32, header: &BlockHeader) -> Result<MapEntry> {
        let tag = header.tag().ok_or(FsError::InvalidData(addr))?;
        let file_type = if header.is_read_write() {
            FileType::ReadWrite
        } else {
            FileType::ReadOnly
        };
        let id = match self.directory.find(tag) {
            Some(id) => id,
            None => self.directory.create(tag, file_type)?,
        };
        if self.directory.file(id)?.file_type != file_type {
            warn!("Discard block {}: access type differs from file {}", addr, tag);
            return Ok(MapEntry::DISCARD);
        }
        Ok(MapEntry::Pending(PendingLink {
            file: id,
            index: header.index(),
            version: header.version(),
            size: header.size(),
            read_write: header.is_read_write(),
        }))
    }

    /// Resolve the pending blocks of one file into its chain.
    /// Duplicated indexes keep the higher version.
    /// A chain with holes is handled by the corrupt policy.
    fn link_file(&mut self, id: FileId) -> Result<()> {
        let mut pending: Vec<(u32, PendingLink)> = self
            .map
            .range(0..self.map.block_count())
            .filter_map(|(addr, entry)| match entry {
                MapEntry::Pending(link) if link.file == id => Some((addr, link)),
                _ => None,
            })
            .collect();
        pending.sort_by_key(|(_, link)| link.index);

        let mut chain: Vec<(u32, PendingLink)> = Vec::with_capacity(pending.len());
        for (addr, link) in pending {
            match chain.last_mut() {
                Some((kept_addr, kept)) if kept.index == link.index => {
                    // the version is compared as a plain number, see the wrap warning of the journal
                    let loser = if link.version > kept.version {
                        let loser = *kept_addr;
                        *kept_addr = addr;
                        *kept = link;
                        loser
                    } else {
                        addr
                    };
                    debug!("Discard duplicated block {} of index {}", loser, link.index);
                    self.map.set(loser, MapEntry::DISCARD)?;
                }
                _ => chain.push((addr, link)),
            }
        }

        let tag = self.directory.file(id)?.tag;
        let Some((_, last)) = chain.last().copied() else {
            self.directory.remove(id);
            return Ok(());
        };
        let complete = chain.iter().enumerate().all(|(position, (_, link))| {
            link.index as usize == position
                && (position + 1 == chain.len() || link.size as usize == BLOCK_DATA_BYTE_SIZE)
        });
        let blocks: Vec<u32> = chain.iter().map(|(addr, _)| *addr).collect();
        if complete {
            self.splice(&blocks, MapEntry::LIST_END)?;
            let fd = self.directory.file_mut(id)?;
            fd.first_block = Some(blocks[0]);
            fd.byte_size =
                ((blocks.len() - 1) * BLOCK_DATA_BYTE_SIZE) as u32 + last.size as u32;
            return Ok(());
        }
        match self.config.corrupt_policy {
            CorruptPolicy::Zombie => {
                warn!("File {} has holes, kept as zombie", tag);
                self.splice(&blocks, MapEntry::LIST_END)?;
                let fd = self.directory.file_mut(id)?;
                fd.file_type = FileType::Zombie;
                fd.first_block = Some(blocks[0]);
                fd.byte_size = 0;
            }
            CorruptPolicy::Quarantine => {
                warn!("File {} has holes, {} blocks quarantined", tag, blocks.len());
                let tail = self
                    .corrupt_head
                    .map_or(MapEntry::LIST_END, MapEntry::Next);
                self.splice(&blocks, tail)?;
                self.corrupt_head = Some(blocks[0]);
                self.directory.remove(id);
            }
        }
        Ok(())
    }

    /// Link the blocks in order, the last one gets the tail entry
    fn splice(&mut self, blocks: &[u32], tail: MapEntry) -> Result<()> {
        for pair in blocks.windows(2) {
            self.map.set(pair[0], MapEntry::Next(pair[1]))?;
        }
        if let Some(last) = blocks.last() {
            self.map.set(*last, tail)?;
        }
        Ok(())
    }
}
