// @author:    olinex
// @time:      2023/11/25

// self mods
mod content;
mod directory;
mod ext2;
mod path;

// use other mods
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;

// use self mods
use crate::block::SectorDevice;
use crate::configs::{BLOCK_BYTE_SIZE, DEFAULT_TOTAL_BLOCKS, DEFAULT_TOTAL_INODES};
use crate::Result;

// reexport
pub use ext2::*;
pub use path::split_parent;

/// How the size of a fresh file system is chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitMode {
    TotalBlocks(u32),
    TotalByteSize(u64),
}
impl InitMode {
    /// The count of 1 KiB blocks, the boot block included
    pub fn total_blocks(&self) -> u32 {
        match self {
            Self::TotalBlocks(blocks) => *blocks,
            Self::TotalByteSize(bytes) => {
                let block_size = BLOCK_BYTE_SIZE as u64;
                ((bytes + block_size - 1) / block_size) as u32
            }
        }
    }
}

/// Parameters of `format`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatOptions {
    pub mode: InitMode,
    /// must be a multiple of the inodes per block
    pub total_inodes: u32,
    /// at most 16 bytes are kept on disk
    pub volume_name: String,
}
impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            mode: InitMode::TotalBlocks(DEFAULT_TOTAL_BLOCKS),
            total_inodes: DEFAULT_TOTAL_INODES,
            volume_name: String::from("ext2"),
        }
    }
}

fn zero_clock() -> u32 {
    0
}

/// Runtime behaviour of a mounted file system
#[derive(Clone, Copy, Debug)]
pub struct MountOptions {
    /// route sector reads through the LRU cache
    pub cache_enabled: bool,
    /// give the data blocks of a deleted file back to the bitmap
    pub reclaim_blocks_on_delete: bool,
    /// record file sizes as whole blocks instead of exact byte counts
    pub round_size_to_blocks: bool,
    /// refuse a write open on a locked file instead of warning
    pub strict_write_lock: bool,
    /// source of the inode timestamps
    pub clock: fn() -> u32,
}
impl Default for MountOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            reclaim_blocks_on_delete: true,
            round_size_to_blocks: false,
            strict_write_lock: false,
            clock: zero_clock,
        }
    }
}

pub trait FileSystem {
    /// The inode number of the root directory
    fn root_inode(&self) -> u32;

    /// Write a fresh file system to the device and mount it
    fn initialize(
        format: &FormatOptions,
        options: MountOptions,
        device: &Arc<dyn SectorDevice>,
    ) -> Result<Box<Self>>;

    /// Mount the file system which already lives on the device
    fn open(options: MountOptions, device: &Arc<dyn SectorDevice>) -> Result<Box<Self>>;
}
