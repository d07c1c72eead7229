// @author:    olinex
// @time:      2023/11/08

// self mods

// use other mods
use alloc::string::String;
use hmac_sha256::Hash;

// use self mods
use crate::configs::{
    BLOCK_BYTE_SIZE, EXT2_MAGIC, FIRST_DATA_BLOCK, FIRST_FREE_INODE, INODE_BYTE_SIZE,
};
use crate::{read_u16, read_u32, write_u16, write_u32, DiskRecord, FsError, Result};

const SUPER_BLOCK_BYTE_SIZE: usize = 1024;
const GROUP_DESCRIPTOR_BYTE_SIZE: usize = 32;
const UUID_BYTE_SIZE: usize = 16;
const VOLUME_NAME_BYTE_SIZE: usize = 16;
const REVISION_DYNAMIC: u32 = 1;
const STATE_CLEAN: u16 = 1;
const ERRORS_CONTINUE: u16 = 1;

/// The super block hold information about the hierarchy within the viewport of the entire block device.
/// It is stored at byte 1024 of the device, which is block 1 with 1 KiB blocks.
/// The device only owns a single block group:
/// ```text
///                | <block>      |
///                ----------------
///                | boot         | <-      0
///                | super block  | <-      1
///                | group desc   | <-      2
///                | block bitmap | <-      3
///                | inode bitmap | <-      4
///                | inode table  | <-      5 .. 5 + inodes / 8
///                | data         | <-      the rest
///                ----------------
/// ```
///
/// Only the fields this layer reads are decoded, every field keeps its EXT2 byte offset.
/// The free counters are written at format time and never updated afterwards,
/// the bitmaps are the only source of truth for allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuperBlock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub wtime: u32,
    pub magic: u16,
    pub state: u16,
    pub rev_level: u32,
    pub first_ino: u32,
    pub inode_size: u16,
    pub uuid: [u8; UUID_BYTE_SIZE],
    pub volume_name: [u8; VOLUME_NAME_BYTE_SIZE],
}
impl SuperBlock {
    /// Create the super block of a freshly formatted file system
    ///
    /// # Arguments
    /// * blocks_count: total blocks, including the boot block
    /// * inodes_count: total inodes
    /// * used_blocks: blocks taken by the metadata and the root directory
    /// * volume_name: label of the volume, the uuid is derived from it
    pub fn new(
        blocks_count: u32,
        inodes_count: u32,
        used_blocks: u32,
        volume_name: &str,
        wtime: u32,
    ) -> Self {
        let mut name = [0u8; VOLUME_NAME_BYTE_SIZE];
        let bytes = volume_name.as_bytes();
        let length = bytes.len().min(VOLUME_NAME_BYTE_SIZE);
        name[..length].copy_from_slice(&bytes[..length]);
        let mut uuid = [0u8; UUID_BYTE_SIZE];
        uuid.copy_from_slice(&Hash::hash(bytes)[..UUID_BYTE_SIZE]);
        Self {
            inodes_count,
            blocks_count,
            free_blocks_count: blocks_count - used_blocks,
            free_inodes_count: inodes_count - (FIRST_FREE_INODE - 1),
            first_data_block: FIRST_DATA_BLOCK,
            log_block_size: 0,
            blocks_per_group: blocks_count - FIRST_DATA_BLOCK,
            inodes_per_group: inodes_count,
            wtime,
            magic: EXT2_MAGIC,
            state: STATE_CLEAN,
            rev_level: REVISION_DYNAMIC,
            first_ino: FIRST_FREE_INODE,
            inode_size: INODE_BYTE_SIZE as u16,
            uuid,
            volume_name: name,
        }
    }

    /// Check the validation of the super block data
    pub fn validate(&self) -> Result<()> {
        if self.magic != EXT2_MAGIC {
            Err(FsError::NotValidFileSystem)
        } else if self.log_block_size != 0 || self.block_size() != BLOCK_BYTE_SIZE {
            Err(FsError::UnsupportedGeometry("block size"))
        } else if self.inode_size as usize != INODE_BYTE_SIZE {
            Err(FsError::UnsupportedGeometry("inode size"))
        } else if self.first_data_block != FIRST_DATA_BLOCK {
            Err(FsError::UnsupportedGeometry("first data block"))
        } else if self.blocks_count <= self.first_data_block {
            Err(FsError::UnsupportedGeometry("block count"))
        } else {
            Ok(())
        }
    }

    #[inline(always)]
    pub fn block_size(&self) -> usize {
        1024 << self.log_block_size
    }

    /// The count of the bits which are meaningful in the block bitmap
    #[inline(always)]
    pub fn block_bitmap_bits(&self) -> u32 {
        self.blocks_count - self.first_data_block
    }

    pub fn volume_name(&self) -> Result<String> {
        let length = self
            .volume_name
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(VOLUME_NAME_BYTE_SIZE);
        Ok(String::from(core::str::from_utf8(
            &self.volume_name[..length],
        )?))
    }
}
impl DiskRecord for SuperBlock {
    const BYTE_SIZE: usize = SUPER_BLOCK_BYTE_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::BYTE_SIZE {
            return Err(FsError::DataOutOfBounds);
        }
        let mut uuid = [0u8; UUID_BYTE_SIZE];
        uuid.copy_from_slice(&bytes[104..120]);
        let mut volume_name = [0u8; VOLUME_NAME_BYTE_SIZE];
        volume_name.copy_from_slice(&bytes[120..136]);
        Ok(Self {
            inodes_count: read_u32(bytes, 0),
            blocks_count: read_u32(bytes, 4),
            free_blocks_count: read_u32(bytes, 12),
            free_inodes_count: read_u32(bytes, 16),
            first_data_block: read_u32(bytes, 20),
            log_block_size: read_u32(bytes, 24),
            blocks_per_group: read_u32(bytes, 32),
            inodes_per_group: read_u32(bytes, 40),
            wtime: read_u32(bytes, 48),
            magic: read_u16(bytes, 56),
            state: read_u16(bytes, 58),
            rev_level: read_u32(bytes, 76),
            first_ino: read_u32(bytes, 84),
            inode_size: read_u16(bytes, 88),
            uuid,
            volume_name,
        })
    }

    fn encode(&self, bytes: &mut [u8]) -> Result<()> {
        if bytes.len() < Self::BYTE_SIZE {
            return Err(FsError::DataOutOfBounds);
        }
        write_u32(bytes, 0, self.inodes_count);
        write_u32(bytes, 4, self.blocks_count);
        write_u32(bytes, 12, self.free_blocks_count);
        write_u32(bytes, 16, self.free_inodes_count);
        write_u32(bytes, 20, self.first_data_block);
        write_u32(bytes, 24, self.log_block_size);
        // fragments are as large as blocks
        write_u32(bytes, 28, self.log_block_size);
        write_u32(bytes, 32, self.blocks_per_group);
        write_u32(bytes, 36, self.blocks_per_group);
        write_u32(bytes, 40, self.inodes_per_group);
        write_u32(bytes, 48, self.wtime);
        write_u16(bytes, 56, self.magic);
        write_u16(bytes, 58, self.state);
        write_u16(bytes, 60, ERRORS_CONTINUE);
        write_u32(bytes, 76, self.rev_level);
        write_u32(bytes, 84, self.first_ino);
        write_u16(bytes, 88, self.inode_size);
        bytes[104..120].copy_from_slice(&self.uuid);
        bytes[120..136].copy_from_slice(&self.volume_name);
        Ok(())
    }
}

/// The fixed locations of the bitmaps and the inode table of the only block group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupDescriptor {
    pub block_bitmap: u32,
    pub inode_bitmap: u32,
    pub inode_table: u32,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
}
impl DiskRecord for GroupDescriptor {
    const BYTE_SIZE: usize = GROUP_DESCRIPTOR_BYTE_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::BYTE_SIZE {
            return Err(FsError::DataOutOfBounds);
        }
        Ok(Self {
            block_bitmap: read_u32(bytes, 0),
            inode_bitmap: read_u32(bytes, 4),
            inode_table: read_u32(bytes, 8),
            free_blocks_count: read_u16(bytes, 12),
            free_inodes_count: read_u16(bytes, 14),
            used_dirs_count: read_u16(bytes, 16),
        })
    }

    fn encode(&self, bytes: &mut [u8]) -> Result<()> {
        if bytes.len() < Self::BYTE_SIZE {
            return Err(FsError::DataOutOfBounds);
        }
        write_u32(bytes, 0, self.block_bitmap);
        write_u32(bytes, 4, self.inode_bitmap);
        write_u32(bytes, 8, self.inode_table);
        write_u16(bytes, 12, self.free_blocks_count);
        write_u16(bytes, 14, self.free_inodes_count);
        write_u16(bytes, 16, self.used_dirs_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_block_encode_at_ext2_offsets() {
        let sb = SuperBlock::new(2048, 128, 30, "teachos", 5);
        let mut bytes = [0u8; SUPER_BLOCK_BYTE_SIZE];
        assert!(sb.encode(&mut bytes).is_ok());
        assert_eq!([0x53u8, 0xEF], bytes[56..58]);
        assert_eq!(128, read_u32(&bytes, 0));
        assert_eq!(2048, read_u32(&bytes, 4));
        assert_eq!(2018, read_u32(&bytes, 12));
        assert_eq!(118, read_u32(&bytes, 16));
        assert_eq!(1, read_u32(&bytes, 20));
        assert_eq!(128, read_u16(&bytes, 88));
        assert_eq!(b"teachos", &bytes[120..127]);
        let decoded = SuperBlock::decode(&bytes).unwrap();
        assert_eq!(sb, decoded);
        assert!(decoded.validate().is_ok());
        assert_eq!("teachos", decoded.volume_name().unwrap());
        assert_eq!(2047, decoded.block_bitmap_bits());
    }

    #[test]
    fn test_super_block_uuid_follows_volume_name() {
        let a = SuperBlock::new(2048, 128, 30, "a", 0);
        let b = SuperBlock::new(2048, 128, 30, "b", 0);
        assert_eq!(a.uuid, SuperBlock::new(2048, 128, 30, "a", 0).uuid);
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_super_block_validate() {
        let mut sb = SuperBlock::new(2048, 128, 30, "", 0);
        sb.magic = 0;
        assert!(sb.validate().is_err_and(|e| e.is_notvalidfilesystem()));
        sb.magic = EXT2_MAGIC;
        sb.log_block_size = 1;
        assert!(sb.validate().is_err_and(|e| e.is_unsupportedgeometry()));
        sb.log_block_size = 0;
        sb.blocks_count = 0;
        assert!(sb.validate().is_err_and(|e| e.is_unsupportedgeometry()));
        sb.blocks_count = FIRST_DATA_BLOCK;
        assert!(sb.validate().is_err_and(|e| e.is_unsupportedgeometry()));
        sb.blocks_count = 2048;
        assert!(sb.validate().is_ok());
        assert!(SuperBlock::decode(&[0u8; 16]).is_err_and(|e| e.is_dataoutofbounds()));
    }

    #[test]
    fn test_group_descriptor_encode_and_decode() {
        let gd = GroupDescriptor {
            block_bitmap: 3,
            inode_bitmap: 4,
            inode_table: 5,
            free_blocks_count: 100,
            free_inodes_count: 50,
            used_dirs_count: 1,
        };
        let mut bytes = [0u8; GROUP_DESCRIPTOR_BYTE_SIZE];
        assert!(gd.encode(&mut bytes).is_ok());
        assert_eq!(3, read_u32(&bytes, 0));
        assert_eq!(5, read_u32(&bytes, 8));
        assert_eq!(50, read_u16(&bytes, 14));
        assert!(GroupDescriptor::decode(&bytes).is_ok_and(|v| v == gd));
    }
}
