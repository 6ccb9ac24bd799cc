// @author:    olinex
// @time:      2023/11/30

// self mods

// use other mods
use enum_group::EnumGroup;
use thiserror_no_std::Error;

// use self mods
use crate::layout::FileTag;

#[derive(Error, EnumGroup, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[groups(memory)]
    #[error("No free memory")]
    NoFreeMemory,

    #[groups(argument)]
    #[error("Invalid argument")]
    InvalidArgument,

    #[groups(argument)]
    #[error("Block {0} out of bounds")]
    BlockOutOfBounds(u32),

    #[groups(state)]
    #[error("Invalid state")]
    InvalidState,

    #[groups(state)]
    #[error("File system was not mounted")]
    NotMounted,

    #[groups(file)]
    #[error("File `{0}` does not exist")]
    FileNotFound(FileTag),

    #[groups(file)]
    #[error("File `{0}` already exists")]
    FileExists(FileTag),

    #[groups(resource)]
    #[error("No free file slot in directory")]
    NoFreeFileSlot,

    #[groups(file)]
    #[error("Operation not supported")]
    NotSupported,

    #[groups(data)]
    #[error("Invalid data in block {0}")]
    InvalidData(u32),

    #[groups(data)]
    #[error("Invalid super block")]
    InvalidSuperBlock,

    #[groups(resource)]
    #[error("No clean block left")]
    InsufficientResources,

    #[groups(device)]
    #[error("Flash read failed at offset {0:#x}")]
    FlashRead(usize),

    #[groups(device)]
    #[error("Flash write failed at offset {0:#x}")]
    FlashWrite(usize),

    #[groups(device)]
    #[error("Flash erase failed at offset {0:#x}")]
    FlashErase(usize),
}

pub type Result<T> = core::result::Result<T, FsError>;
