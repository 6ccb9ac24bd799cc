// @author:    olinex
// @time:      2023/11/04

// self mods

// use other mods
use spin::{Mutex, MutexGuard};

// use self mods
use crate::configs::{BLOCK_BYTE_SIZE, BORROW_BUFFER_COUNT};

pub type BlockBuffer = [u8; BLOCK_BYTE_SIZE];

/// A borrowed block buffer, it goes back to the pool when dropped
pub type BufferGuard<'a> = MutexGuard<'a, BlockBuffer>;

/// A fixed pool of block sized scratch buffers.
/// Buffers are lent out with [`BufferPool::borrow`] and returned on drop of the guard,
/// so no error path can leak one.
/// The pool never waits: asking for more buffers than [`BORROW_BUFFER_COUNT`] is a logic error.
pub struct BufferPool {
    buffers: [Mutex<BlockBuffer>; BORROW_BUFFER_COUNT],
}
impl BufferPool {
    pub fn new() -> Self {
        Self {
            buffers: core::array::from_fn(|_| Mutex::new([0; BLOCK_BYTE_SIZE])),
        }
    }

    /// Borrow a free buffer
    ///
    /// # Panics
    /// * all buffers are already borrowed
    pub fn borrow(&self) -> BufferGuard<'_> {
        self.buffers
            .iter()
            .find_map(|buffer| buffer.try_lock())
            .expect("Borrow buffer pool exhausted")
    }

    /// Count of the buffers which can still be borrowed
    pub fn available(&self) -> usize {
        self.buffers
            .iter()
            .filter(|buffer| !buffer.is_locked())
            .count()
    }
}
impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
