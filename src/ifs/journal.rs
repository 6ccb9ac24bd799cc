// @author:    olinex
// @time:      2023/12/02

// self mods

// use other mods

// use self mods
use super::volume::Volume;
use crate::flash::BlockBuffer;
use crate::layout::{
    cal_checksum, invalidate_block, seal_checksum, write_block, BlockHeader, MapEntry,
};
use crate::Result;

/// How the header of a draft is stamped before it is written to a new block
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Stamp {
    /// Increase the version, read only blocks always keep version 0
    pub(crate) bump_version: bool,
    /// Difference between the stored and the right checksum which must survive the copy
    pub(crate) checksum_drift: u8,
}
impl Stamp {
    pub(crate) const REWRITE: Self = Self {
        bump_version: true,
        checksum_drift: 0,
    };
}

/// Give the draft its new version and checksum
pub(crate) fn stamp(draft: &mut BlockBuffer, stamp: Stamp) {
    let mut header = BlockHeader::from_bytes(draft);
    if stamp.bump_version {
        let version = header.version().wrapping_add(1);
        if version == 0 {
            warn!(
                "Version of block {} of file {:?} wrapped around",
                header.index(),
                header.tag()
            );
        }
        header.set_version(version);
        header.write_to(draft);
    }
    if !header.is_no_checksum() {
        let checksum = cal_checksum(draft).wrapping_add(stamp.checksum_drift);
        seal_checksum(draft, checksum);
    }
}

impl Volume {
    /// Write the draft of block `old` to a freshly allocated block, in two flash steps:
    /// program the new block, then invalidate the old one.
    /// A power loss between them leaves two current copies and the mount keeps the newer version,
    /// so the order must never be swapped.
    ///
    /// Once the new block is programmed it is the copy the next mount picks,
    /// so `relink` splices it into the chain in place of `old` before the old one is invalidated.
    /// A failed invalidation is still reported, the chain stays on the new block.
    ///
    /// # Arguments
    /// * old: the block the draft was read from
    /// * draft: the new contents, header included
    /// * stamp: how the version and checksum are updated
    /// * exclude: a sector the new block must not come from
    /// * relink: puts the new block in place of `old` in the map and the directory
    ///
    /// # Returns
    /// * Ok(new block)
    /// * Err(InsufficientResources | InvalidState | FlashRead(offset) | FlashWrite(offset))
    pub(crate) fn write_journaled(
        &mut self,
        old: u32,
        draft: &mut BlockBuffer,
        stamp: Stamp,
        exclude: Option<u32>,
        relink: impl FnOnce(&mut Self, u32) -> Result<()>,
    ) -> Result<u32> {
        self::stamp(draft, stamp);
        let new = self.allocate_block(exclude)?;
        if let Err(err) = write_block(&self.device, new, draft) {
            // the new block may be partially programmed, it can't be allocated again
            self.map.set(new, MapEntry::DISCARD)?;
            return Err(err);
        }
        relink(self, new)?;
        if let Err(err) = invalidate_block(&self.device, old) {
            warn!("Block {} stays current next to its newer copy {}: {}", old, new, err);
            return Err(err);
        }
        Ok(new)
    }
}
