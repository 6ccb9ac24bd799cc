// @author:    olinex
// @time:      2023/12/02

// self mods

// use other mods
use alloc::collections::BTreeSet;
use alloc::sync::Arc;
use core::ops::Range;

// use self mods
use super::journal::Stamp;
use super::volume::Volume;
use crate::configs::{SECTOR_BLOCK_COUNT, SECTOR_BYTE_SIZE};
use crate::layout::{block_offset, cal_checksum, read_block, BlockTag, FileId, MapEntry};
use crate::{FsError, Result};

/// What the blocks of one sector are used for
#[derive(Clone, Copy, Default, Debug)]
struct SectorCensus {
    clean: usize,
    discardable: usize,
    used: usize,
    /// Holds blocks which must never be erased
    pinned: bool,
}

#[inline(always)]
pub(crate) fn sector_of(addr: u32) -> u32 {
    addr / SECTOR_BLOCK_COUNT as u32
}

#[inline(always)]
pub(crate) fn sector_blocks(sector: u32) -> Range<u32> {
    let start = sector * SECTOR_BLOCK_COUNT as u32;
    start..start + SECTOR_BLOCK_COUNT as u32
}

impl Volume {
    #[inline(always)]
    pub(crate) fn sector_count(&self) -> u32 {
        self.map.block_count() / SECTOR_BLOCK_COUNT as u32
    }

    fn clean_blocks(&self, sector: u32) -> usize {
        self.map.count(sector_blocks(sector), MapEntry::is_clean)
    }

    /// Find a clean block for new data.
    /// Sectors are scanned round robin from the current write sector,
    /// a partially used sector is filled up before a fully clean one is started.
    ///
    /// # Arguments
    /// * exclude: a sector which must not be used
    ///
    /// # Returns
    /// * Ok(block address)
    /// * Err(InsufficientResources)
    pub(crate) fn allocate_block(&mut self, exclude: Option<u32>) -> Result<u32> {
        let sectors = self.sector_count();
        let mut fallback = None;
        for step in 0..sectors {
            let sector = (self.write_sector + step) % sectors;
            if Some(sector) == exclude {
                continue;
            }
            let clean = self.clean_blocks(sector);
            if clean > 0 && clean < SECTOR_BLOCK_COUNT {
                return self.take_clean_block(sector);
            }
            if clean == SECTOR_BLOCK_COUNT && fallback.is_none() {
                fallback = Some(sector);
            }
        }
        match fallback {
            Some(sector) => self.take_clean_block(sector),
            None => Err(FsError::InsufficientResources),
        }
    }

    fn take_clean_block(&mut self, sector: u32) -> Result<u32> {
        let (addr, _) = self
            .map
            .range(sector_blocks(sector))
            .find(|(_, entry)| entry.is_clean())
            .ok_or(FsError::InsufficientResources)?;
        self.write_sector = sector;
        Ok(addr)
    }

    /// Check if the clean sectors drop to the low water mark.
    /// A partially clean sector counts as one more clean sector,
    /// so the sector being filled is not reclaimed too early.
    pub(crate) fn is_gc_needed(&self) -> bool {
        let mut clean_sectors = 0;
        let mut partial = false;
        for sector in 0..self.sector_count() {
            match self.clean_blocks(sector) {
                0 => {}
                SECTOR_BLOCK_COUNT => clean_sectors += 1,
                _ => partial = true,
            }
        }
        if partial {
            clean_sectors += 1;
        }
        clean_sectors <= self.config.gc_low_water_mark
    }

    /// Blocks waiting on the corrupt chain
    fn corrupt_blocks(&self) -> Result<BTreeSet<u32>> {
        let mut blocks = BTreeSet::new();
        let mut current = self.corrupt_head;
        while let Some(addr) = current {
            if !blocks.insert(addr) {
                return Err(FsError::InvalidState);
            }
            current = match self.map.get(addr)? {
                MapEntry::Next(next) => Some(next),
                MapEntry::LIST_END => None,
                _ => return Err(FsError::InvalidState),
            };
        }
        Ok(blocks)
    }

    fn census(&self, sector: u32, corrupt: &BTreeSet<u32>) -> SectorCensus {
        let mut census = SectorCensus::default();
        for (addr, entry) in self.map.range(sector_blocks(sector)) {
            match entry {
                MapEntry::Tag(BlockTag::Clean) => census.clean += 1,
                _ if entry.is_discardable() => census.discardable += 1,
                _ if entry.is_chained() && corrupt.contains(&addr) => census.discardable += 1,
                _ if entry.is_chained() => census.used += 1,
                _ => census.pinned = true,
            }
        }
        census
    }

    /// Choose the sector to reclaim, looking round robin from the reclaim cursor.
    /// The first sector holding obsolete blocks wins, otherwise the one with the fewest live blocks.
    /// Sectors with bad or reserved blocks and the current write sector are never chosen.
    fn choose_sector(&self, corrupt: &BTreeSet<u32>) -> Option<(u32, SectorCensus)> {
        let sectors = self.sector_count();
        let mut sparsest: Option<(u32, SectorCensus)> = None;
        for step in 0..sectors {
            let sector = (self.gc_sector + step) % sectors;
            if sector == self.write_sector {
                continue;
            }
            let census = self.census(sector, corrupt);
            if census.pinned {
                continue;
            }
            if census.discardable > 0 {
                return Some((sector, census));
            }
            if census.used > 0 && sparsest.map_or(true, |(_, best)| census.used < best.used) {
                sparsest = Some((sector, census));
            }
        }
        sparsest
    }

    /// Reclaim one sector: move its live blocks out, then erase it.
    /// A sector whose erase fails is tagged `Bad` and never used again.
    ///
    /// # Returns
    /// * Ok(true): a sector was reclaimed
    /// * Ok(false): nothing to reclaim
    /// * Err(InsufficientResources | InvalidState | InvalidData(addr) | FlashRead(offset) | FlashWrite(offset))
    pub(crate) fn reclaim_sector(&mut self) -> Result<bool> {
        let corrupt = self.corrupt_blocks()?;
        let Some((target, census)) = self.choose_sector(&corrupt) else {
            return Ok(false);
        };
        let clean_outside = self.map.count(0..self.map.block_count(), MapEntry::is_clean) - census.clean;
        if clean_outside < census.used {
            return Err(FsError::InsufficientResources);
        }
        debug!(
            "Reclaim sector {}: {} used, {} discardable",
            target, census.used, census.discardable
        );
        self.drop_corrupt_blocks(target)?;
        for addr in sector_blocks(target) {
            if self.map.get(addr)?.is_chained() {
                self.relocate_block(addr, target)?;
            }
        }
        let blocks = sector_blocks(target);
        let tag = match self.device.erase(block_offset(blocks.start), SECTOR_BYTE_SIZE) {
            Ok(()) => BlockTag::Clean,
            Err(err) => {
                warn!("Sector {} is bad: {}", target, err);
                BlockTag::Bad
            }
        };
        for addr in blocks {
            self.map.set(addr, MapEntry::Tag(tag))?;
        }
        self.gc_sector = (target + 1) % self.sector_count();
        Ok(true)
    }

    /// Cut the blocks of the sector out of the corrupt chain
    fn drop_corrupt_blocks(&mut self, sector: u32) -> Result<()> {
        let mut previous: Option<u32> = None;
        let mut current = self.corrupt_head;
        while let Some(addr) = current {
            let next = match self.map.get(addr)? {
                MapEntry::Next(next) => Some(next),
                MapEntry::LIST_END => None,
                _ => return Err(FsError::InvalidState),
            };
            if sector_of(addr) == sector {
                self.map.set(addr, MapEntry::DISCARD)?;
                let link = next.map_or(MapEntry::LIST_END, MapEntry::Next);
                match previous {
                    Some(previous) => self.map.set(previous, link)?,
                    None => self.corrupt_head = next,
                }
            } else {
                previous = Some(addr);
            }
            current = next;
        }
        Ok(())
    }

    /// Find the file whose chain holds the block and the block before it
    fn find_owner(&self, addr: u32) -> Result<(FileId, Option<u32>)> {
        for id in self.directory.ids() {
            let blocks = self.chain_blocks(id)?;
            if let Some(position) = blocks.iter().position(|block| *block == addr) {
                let previous = position.checked_sub(1).map(|index| blocks[index]);
                return Ok((id, previous));
            }
        }
        Err(FsError::InvalidState)
    }

    /// Move a live block out of the sector being reclaimed through the journaled writer,
    /// the chain and the live iterators follow it
    fn relocate_block(&mut self, addr: u32, sector: u32) -> Result<u32> {
        let (owner, previous) = self.find_owner(addr)?;
        let pool = Arc::clone(&self.pool);
        let mut block = pool.borrow();
        let header = read_block(&self.device, addr, &mut block)?;
        let checksum_drift = if header.is_no_checksum() {
            0
        } else {
            header.checksum().wrapping_sub(cal_checksum(&*block))
        };
        let stamp = Stamp {
            bump_version: header.is_read_write(),
            checksum_drift,
        };
        let new = self.write_journaled(addr, &mut block, stamp, Some(sector), |volume, new| {
            volume
                .directory
                .relink(&mut volume.map, owner, previous, addr, new)
        })?;
        debug!(
            "Block {} of file {} moved to {}",
            addr,
            self.directory.file(owner)?.tag(),
            new
        );
        Ok(new)
    }
}
