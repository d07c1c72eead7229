// @author:    olinex
// @time:      2023/11/04

// self mods

// use other mods

// use self mods

pub const SECTOR_BYTE_SIZE: usize = 512;
pub const BLOCK_BYTE_SIZE: usize = 1024;
pub const BLOCK_BIT_SIZE: usize = BLOCK_BYTE_SIZE * 8;
pub const SECTORS_PER_BLOCK: usize = BLOCK_BYTE_SIZE / SECTOR_BYTE_SIZE;

/// How many sector lines the LRU cache keeps
pub const CACHE_SIZE: usize = 32;

pub const INODE_BYTE_SIZE: usize = 128;
pub const INODES_PER_BLOCK: usize = BLOCK_BYTE_SIZE / INODE_BYTE_SIZE;

pub const DIRECT_BLOCK_COUNT: usize = 12;
pub const INDIRECT_BLOCK_SLOT: usize = DIRECT_BLOCK_COUNT;
pub const INODE_BLOCK_SLOTS: usize = 15;
pub const INDIRECT_ENTRY_COUNT: usize = BLOCK_BYTE_SIZE / core::mem::size_of::<u32>();
pub const MAX_FILE_BLOCK_COUNT: usize = DIRECT_BLOCK_COUNT + INDIRECT_ENTRY_COUNT;

/// Magic number for check the file system type
pub const EXT2_MAGIC: u16 = 0xEF53;
pub const ROOT_INODE: u32 = 2;
/// Inodes below this number are reserved, as EXT2 does
pub const FIRST_FREE_INODE: u32 = 11;
pub const FIRST_DATA_BLOCK: u32 = 1;

pub const SUPER_BLOCK_ID: u32 = 1;
pub const GROUP_DESCRIPTOR_BLOCK_ID: u32 = 2;
pub const BLOCK_BITMAP_BLOCK_ID: u32 = 3;
pub const INODE_BITMAP_BLOCK_ID: u32 = 4;
pub const INODE_TABLE_BLOCK_ID: u32 = 5;

pub const DEFAULT_TOTAL_BLOCKS: u32 = 2048;
pub const DEFAULT_TOTAL_INODES: u32 = 128;

pub const MAX_NAME_BYTE_SIZE: usize = 255;
pub const MAX_SYSTEM_OPEN_FILES: usize = 64;
pub const MAX_PROCESS_OPEN_FILES: usize = 16;
pub const PIPE_BUFFER_BYTE_SIZE: usize = 4096;
pub const PAGE_BYTE_SIZE: usize = 4096;
