// @author:    olinex
// @time:      2023/11/06

// self mods

// use other mods
use alloc::vec::Vec;
use core::ops::Range;

// use self mods
use crate::{FsError, Result};

/// Index of a file descriptor in the file directory
pub type FileId = usize;

/// The state a block can be in when it is not part of a file chain
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockTag {
    /// Erased and ready to be allocated
    Clean,
    /// Owned by the file system itself, e.g. the super block
    Reserved,
    /// Obsolete data waiting for its sector to be erased
    Discard,
    /// Obsolete data which must still be invalidated on flash before it becomes `Discard`
    Delete,
    /// In a sector whose erase failed, never used again
    Bad,
    /// Not scanned yet
    Invalid,
    /// The last block of a chain
    ListEnd,
}

/// The location of a current block inside its file, recorded by the scan pass
/// and consumed by the link pass of the mount
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PendingLink {
    pub file: FileId,
    pub index: u16,
    pub version: u8,
    pub size: u8,
    pub read_write: bool,
}

/// One slot of the block map
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MapEntry {
    /// The address of the next block in the same chain
    Next(u32),
    Tag(BlockTag),
    /// Found by the scan pass but not linked yet
    Pending(PendingLink),
}
impl MapEntry {
    pub const CLEAN: Self = Self::Tag(BlockTag::Clean);
    pub const DISCARD: Self = Self::Tag(BlockTag::Discard);
    pub const LIST_END: Self = Self::Tag(BlockTag::ListEnd);

    #[inline(always)]
    pub fn is_clean(&self) -> bool {
        *self == Self::CLEAN
    }

    /// Check if the block is a member of a chain
    #[inline(always)]
    pub fn is_chained(&self) -> bool {
        matches!(self, Self::Next(_) | Self::Tag(BlockTag::ListEnd))
    }

    /// Check if the block holds no live data but still needs an erase
    #[inline(always)]
    pub fn is_discardable(&self) -> bool {
        matches!(self, Self::Tag(BlockTag::Discard | BlockTag::Delete))
    }

    /// Check if the sector of the block must never be reclaimed
    #[inline(always)]
    pub fn is_pinned(&self) -> bool {
        matches!(self, Self::Tag(BlockTag::Bad | BlockTag::Reserved))
    }
}

/// The in-memory map of the whole volume, one entry per block address.
/// Nothing of it is persisted, it is rebuilt from the block headers on every mount.
pub struct BlockMap {
    entries: Vec<MapEntry>,
}
impl BlockMap {
    /// Create a new map with every entry `Invalid`
    ///
    /// # Returns
    /// * Ok(BlockMap)
    /// * Err(NoFreeMemory)
    pub fn new(block_count: u32) -> Result<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(block_count as usize)
            .map_err(|_| FsError::NoFreeMemory)?;
        entries.resize(block_count as usize, MapEntry::Tag(BlockTag::Invalid));
        Ok(Self { entries })
    }

    #[inline(always)]
    pub fn block_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Get the entry of the block
    ///
    /// # Returns
    /// * Ok(entry)
    /// * Err(BlockOutOfBounds(addr))
    pub fn get(&self, addr: u32) -> Result<MapEntry> {
        self.entries
            .get(addr as usize)
            .copied()
            .ok_or(FsError::BlockOutOfBounds(addr))
    }

    /// Set the entry of the block
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(BlockOutOfBounds(addr))
    pub fn set(&mut self, addr: u32, entry: MapEntry) -> Result<()> {
        let slot = self
            .entries
            .get_mut(addr as usize)
            .ok_or(FsError::BlockOutOfBounds(addr))?;
        *slot = entry;
        Ok(())
    }

    /// Iterate over the addresses and entries of a range of blocks
    pub fn range(&self, addrs: Range<u32>) -> impl Iterator<Item = (u32, MapEntry)> + '_ {
        let end = addrs.end.min(self.block_count());
        (addrs.start..end).map(move |addr| (addr, self.entries[addr as usize]))
    }

    /// Count the entries of a range of blocks matching the predicate
    pub fn count(&self, addrs: Range<u32>, predicate: impl Fn(&MapEntry) -> bool) -> usize {
        self.range(addrs).filter(|(_, entry)| predicate(entry)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_map_get_and_set() {
        let mut map = BlockMap::new(4).unwrap();
        assert_eq!(4, map.block_count());
        assert_eq!(Ok(MapEntry::Tag(BlockTag::Invalid)), map.get(3));
        assert_eq!(Err(FsError::BlockOutOfBounds(4)), map.get(4));
        assert!(map.set(1, MapEntry::Next(2)).is_ok());
        assert_eq!(Ok(MapEntry::Next(2)), map.get(1));
        assert_eq!(Err(FsError::BlockOutOfBounds(9)), map.set(9, MapEntry::CLEAN));
    }

    #[test]
    fn test_block_map_count() {
        let mut map = BlockMap::new(8).unwrap();
        for addr in 0..8 {
            map.set(addr, MapEntry::CLEAN).unwrap();
        }
        map.set(2, MapEntry::DISCARD).unwrap();
        map.set(3, MapEntry::Tag(BlockTag::Delete)).unwrap();
        map.set(4, MapEntry::LIST_END).unwrap();
        map.set(5, MapEntry::Next(4)).unwrap();
        assert_eq!(4, map.count(0..8, MapEntry::is_clean));
        assert_eq!(2, map.count(0..8, MapEntry::is_discardable));
        assert_eq!(2, map.count(0..8, MapEntry::is_chained));
        assert_eq!(2, map.count(4..100, MapEntry::is_chained));
    }

    #[test]
    fn test_map_entry_kinds() {
        assert!(MapEntry::Tag(BlockTag::Bad).is_pinned());
        assert!(MapEntry::Tag(BlockTag::Reserved).is_pinned());
        assert!(!MapEntry::DISCARD.is_pinned());
        let pending = MapEntry::Pending(PendingLink {
            file: 0,
            index: 0,
            version: 0,
            size: 1,
            read_write: true,
        });
        assert!(!pending.is_chained());
        assert!(!pending.is_clean());
    }
}
