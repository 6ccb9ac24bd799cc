// @author:    olinex
// @time:      2023/11/25

// self mods

// use other mods
use alloc::vec::Vec;

// use self mods
use crate::configs::MAX_FILE_COUNT;
use crate::layout::{BlockMap, FileId, FileTag, MapEntry};
use crate::{FsError, Result};

/// The kind of a file in the directory, a free slot has no kind at all
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileType {
    ReadOnly,
    ReadWrite,
    /// A file with holes in its chain kept for the legacy format, never readable
    Zombie,
}

/// Position of the live iterator of a file
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct IterState {
    pub(crate) current: u32,
    pub(crate) previous: Option<u32>,
}

#[derive(Clone, Copy, Debug)]
pub struct FileDescriptor {
    pub(crate) tag: FileTag,
    pub(crate) byte_size: u32,
    pub(crate) first_block: Option<u32>,
    pub(crate) file_type: FileType,
    pub(crate) iter: Option<IterState>,
}
impl FileDescriptor {
    fn new(tag: FileTag, file_type: FileType) -> Self {
        Self {
            tag,
            byte_size: 0,
            first_block: None,
            file_type,
            iter: None,
        }
    }

    pub fn tag(&self) -> FileTag {
        self.tag
    }

    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }

    pub fn first_block(&self) -> Option<u32> {
        self.first_block
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Check if the file can be read through the file api
    pub fn is_readable(&self) -> bool {
        self.file_type != FileType::Zombie
    }
}

/// The fixed table of file descriptors.
/// Descriptors are addressed by their slot index, which stays stable while the volume is mounted.
pub struct Directory {
    slots: [Option<FileDescriptor>; MAX_FILE_COUNT],
}
impl Directory {
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_FILE_COUNT],
        }
    }

    /// Find the id of the file by its tag
    pub fn find(&self, tag: FileTag) -> Option<FileId> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|fd| fd.tag == tag))
    }

    /// Get the file by its tag
    ///
    /// # Returns
    /// * Ok((file id, descriptor))
    /// * Err(FileNotFound(tag))
    pub fn get(&self, tag: FileTag) -> Result<(FileId, &FileDescriptor)> {
        let id = self.find(tag).ok_or(FsError::FileNotFound(tag))?;
        Ok((id, self.file(id)?))
    }

    /// Take a free slot for a new file
    ///
    /// # Returns
    /// * Ok(file id)
    /// * Err(FileExists(tag) | NoFreeFileSlot)
    pub fn create(&mut self, tag: FileTag, file_type: FileType) -> Result<FileId> {
        if self.find(tag).is_some() {
            return Err(FsError::FileExists(tag));
        }
        let id = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::NoFreeFileSlot)?;
        self.slots[id] = Some(FileDescriptor::new(tag, file_type));
        Ok(id)
    }

    /// Give the slot of the file back
    pub fn remove(&mut self, id: FileId) {
        if let Some(slot) = self.slots.get_mut(id) {
            *slot = None;
        }
    }

    /// Get the descriptor of a file
    ///
    /// # Returns
    /// * Ok(descriptor)
    /// * Err(InvalidState)
    pub fn file(&self, id: FileId) -> Result<&FileDescriptor> {
        self.slots
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(FsError::InvalidState)
    }

    pub(crate) fn file_mut(&mut self, id: FileId) -> Result<&mut FileDescriptor> {
        self.slots
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(FsError::InvalidState)
    }

    /// Ids of all the files in use
    pub fn ids(&self) -> Vec<FileId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.map(|_| id))
            .collect()
    }

    /// Tags of all readable files, zombies are left out
    pub fn tags(&self) -> Vec<FileTag> {
        self.slots
            .iter()
            .flatten()
            .filter(|fd| fd.is_readable())
            .map(|fd| fd.tag)
            .collect()
    }

    /// Patch every live iterator after block `old` was moved to `new`
    pub fn sync_on_relocate(&mut self, old: u32, new: u32) {
        for state in self
            .slots
            .iter_mut()
            .flatten()
            .filter_map(|fd| fd.iter.as_mut())
        {
            if state.current == old {
                state.current = new;
            }
            if state.previous == Some(old) {
                state.previous = Some(new);
            }
        }
    }

    /// Splice block `new` into the chain of a file in place of block `old`.
    /// `old` is left as `Discard` in the map and all live iterators follow the move.
    ///
    /// # Arguments
    /// * id: the file which owns the chain
    /// * previous: the block before `old` in the chain, None if `old` is the head
    pub(crate) fn relink(
        &mut self,
        map: &mut BlockMap,
        id: FileId,
        previous: Option<u32>,
        old: u32,
        new: u32,
    ) -> Result<()> {
        let entry = map.get(old)?;
        if !entry.is_chained() {
            return Err(FsError::InvalidState);
        }
        map.set(new, entry)?;
        map.set(old, MapEntry::DISCARD)?;
        match previous {
            Some(previous) => map.set(previous, MapEntry::Next(new))?,
            None => self.file_mut(id)?.first_block = Some(new),
        }
        self.sync_on_relocate(old, new);
        Ok(())
    }
}
impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

/// A cursor over the block chain of a file.
/// The position itself lives in the file descriptor,
/// so the iterator sees the relocations done by the garbage collector.
/// A file has at most one live iterator.
pub(crate) struct FileIter {
    file: FileId,
}
impl FileIter {
    /// Put a new iterator on the first block of the file
    ///
    /// # Returns
    /// * Ok(FileIter)
    /// * Err(InvalidState)
    pub(crate) fn start(dir: &mut Directory, file: FileId) -> Result<Self> {
        let fd = dir.file_mut(file)?;
        let head = fd.first_block.ok_or(FsError::InvalidState)?;
        if fd.iter.is_some() {
            return Err(FsError::InvalidState);
        }
        fd.iter = Some(IterState {
            current: head,
            previous: None,
        });
        Ok(Self { file })
    }

    fn state(&self, dir: &Directory) -> Result<IterState> {
        dir.file(self.file)?.iter.ok_or(FsError::InvalidState)
    }

    fn state_mut<'a>(&self, dir: &'a mut Directory) -> Result<&'a mut IterState> {
        dir.file_mut(self.file)?
            .iter
            .as_mut()
            .ok_or(FsError::InvalidState)
    }

    pub(crate) fn current(&self, dir: &Directory) -> Result<u32> {
        Ok(self.state(dir)?.current)
    }

    /// Step to the next block of the chain
    ///
    /// # Returns
    /// * Ok(Some(next block))
    /// * Ok(None): the iterator is on the last block
    /// * Err(InvalidState): the chain is broken
    pub(crate) fn next(&self, dir: &mut Directory, map: &BlockMap) -> Result<Option<u32>> {
        let state = self.state_mut(dir)?;
        match map.get(state.current)? {
            MapEntry::Next(next) => {
                state.previous = Some(state.current);
                state.current = next;
                Ok(Some(next))
            }
            MapEntry::LIST_END => Ok(None),
            _ => Err(FsError::InvalidState),
        }
    }

    /// Step forward a number of blocks
    ///
    /// # Returns
    /// * Ok(current block)
    /// * Err(InvalidArgument): the chain ends too early
    /// * Err(InvalidState): the chain is broken
    pub(crate) fn seek(&self, dir: &mut Directory, map: &BlockMap, blocks: usize) -> Result<u32> {
        for _ in 0..blocks {
            self.next(dir, map)?.ok_or(FsError::InvalidArgument)?;
        }
        self.current(dir)
    }

    /// Move the current block of the iterator to a new address and relink the chain
    pub(crate) fn move_to(&self, dir: &mut Directory, map: &mut BlockMap, new: u32) -> Result<()> {
        let state = self.state(dir)?;
        dir.relink(map, self.file, state.previous, state.current, new)
    }

    /// Drop the iterator from its file
    pub(crate) fn finish(self, dir: &mut Directory) {
        if let Ok(fd) = dir.file_mut(self.file) {
            fd.iter = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BlockTag;

    fn tag(name: &str) -> FileTag {
        FileTag::new(name).unwrap()
    }

    /// A map of 8 blocks holding the chain 1 -> 4 -> 2 for file 0
    fn chain(dir: &mut Directory) -> (FileId, BlockMap) {
        let mut map = BlockMap::new(8).unwrap();
        for addr in 0..8 {
            map.set(addr, MapEntry::CLEAN).unwrap();
        }
        map.set(1, MapEntry::Next(4)).unwrap();
        map.set(4, MapEntry::Next(2)).unwrap();
        map.set(2, MapEntry::LIST_END).unwrap();
        let id = dir.create(tag("CFG"), FileType::ReadWrite).unwrap();
        dir.file_mut(id).unwrap().first_block = Some(1);
        (id, map)
    }

    #[test]
    fn test_directory_create_and_get() {
        let mut dir = Directory::new();
        let id = dir.create(tag("ECC"), FileType::ReadOnly).unwrap();
        assert!(dir
            .get(tag("ECC"))
            .is_ok_and(|(found, fd)| found == id && fd.file_type() == FileType::ReadOnly));
        assert_eq!(
            Err(FsError::FileExists(tag("ECC"))),
            dir.create(tag("ECC"), FileType::ReadWrite)
        );
        assert!(dir
            .get(tag("OBD"))
            .is_err_and(|err| err == FsError::FileNotFound(tag("OBD"))));
        dir.remove(id);
        assert!(dir.find(tag("ECC")).is_none());
        assert!(dir.file(id).is_err());
    }

    #[test]
    fn test_directory_full() {
        let mut dir = Directory::new();
        for i in 0..MAX_FILE_COUNT {
            let name = [b'A', b'A' + (i / 26) as u8, b'A' + (i % 26) as u8];
            let tag = FileTag::from_bytes(&name).unwrap();
            assert!(dir.create(tag, FileType::ReadWrite).is_ok());
        }
        assert_eq!(
            Err(FsError::NoFreeFileSlot),
            dir.create(tag("ZZZ"), FileType::ReadWrite)
        );
        assert_eq!(MAX_FILE_COUNT, dir.ids().len());
    }

    #[test]
    fn test_directory_tags_skip_zombies() {
        let mut dir = Directory::new();
        dir.create(tag("AAA"), FileType::ReadWrite).unwrap();
        dir.create(tag("BBB"), FileType::Zombie).unwrap();
        assert_eq!(alloc::vec![tag("AAA")], dir.tags());
        assert_eq!(2, dir.ids().len());
    }

    #[test]
    fn test_file_iter_walk_and_seek() {
        let mut dir = Directory::new();
        let (id, map) = chain(&mut dir);
        let iter = FileIter::start(&mut dir, id).unwrap();
        assert!(FileIter::start(&mut dir, id).is_err());
        assert_eq!(Ok(1), iter.current(&dir));
        assert_eq!(Ok(Some(4)), iter.next(&mut dir, &map));
        assert_eq!(Ok(Some(2)), iter.next(&mut dir, &map));
        assert_eq!(Ok(None), iter.next(&mut dir, &map));
        iter.finish(&mut dir);

        let iter = FileIter::start(&mut dir, id).unwrap();
        assert_eq!(Ok(2), iter.seek(&mut dir, &map, 2));
        iter.finish(&mut dir);

        let iter = FileIter::start(&mut dir, id).unwrap();
        assert_eq!(Err(FsError::InvalidArgument), iter.seek(&mut dir, &map, 3));
        iter.finish(&mut dir);
    }

    #[test]
    fn test_file_iter_broken_chain() {
        let mut dir = Directory::new();
        let (id, mut map) = chain(&mut dir);
        map.set(4, MapEntry::Tag(BlockTag::Bad)).unwrap();
        let iter = FileIter::start(&mut dir, id).unwrap();
        assert_eq!(Err(FsError::InvalidState), iter.seek(&mut dir, &map, 2));
    }

    #[test]
    fn test_file_iter_move_to() {
        let mut dir = Directory::new();
        let (id, mut map) = chain(&mut dir);
        let iter = FileIter::start(&mut dir, id).unwrap();
        assert!(iter.move_to(&mut dir, &mut map, 6).is_ok());
        assert_eq!(Ok(6), iter.current(&dir));
        assert_eq!(Some(6), dir.file(id).unwrap().first_block());
        assert_eq!(Ok(MapEntry::Next(4)), map.get(6));
        assert_eq!(Ok(MapEntry::DISCARD), map.get(1));

        iter.seek(&mut dir, &map, 2).unwrap();
        assert!(iter.move_to(&mut dir, &mut map, 7).is_ok());
        assert_eq!(Ok(MapEntry::Next(7)), map.get(4));
        assert_eq!(Ok(MapEntry::LIST_END), map.get(7));
        assert_eq!(Ok(7), iter.current(&dir));
    }

    #[test]
    fn test_directory_sync_on_relocate() {
        let mut dir = Directory::new();
        let (id, mut map) = chain(&mut dir);
        let iter = FileIter::start(&mut dir, id).unwrap();
        iter.next(&mut dir, &map).unwrap();
        // a relocation of the previous block done behind the iterator
        dir.relink(&mut map, id, None, 1, 5).unwrap();
        assert!(dir
            .file(id)
            .unwrap()
            .iter
            .is_some_and(|state| state.previous == Some(5) && state.current == 4));
        dir.relink(&mut map, id, Some(5), 4, 3).unwrap();
        assert_eq!(Ok(3), iter.current(&dir));
        assert_eq!(Ok(Some(2)), iter.next(&mut dir, &map));
        assert_eq!(Ok(MapEntry::Next(3)), map.get(5));
    }
}
