// @author:    olinex
// @time:      2023/11/12

// self mods

// use other mods
use alloc::vec::Vec;

// use self mods
use super::Ext2Fs;
use crate::configs::{
    BLOCK_BYTE_SIZE, DIRECT_BLOCK_COUNT, INDIRECT_BLOCK_SLOT, INDIRECT_ENTRY_COUNT,
    MAX_FILE_BLOCK_COUNT, SECTORS_PER_BLOCK,
};
use crate::layout::DiskInode;
use crate::{read_u32, write_u32, FsError, Result};

impl Ext2Fs {
    /// Collect the data block ids of the inode in file order.
    /// The first twelve come from the direct slots, the rest from the indirect block.
    ///
    /// # Returns
    /// * Ok(Vec<block id>)
    /// * Err(FileTooLarge | DataOutOfBounds | SectorOutOfBounds | DeviceFailure)
    pub fn data_blocks(&mut self, inode: &DiskInode) -> Result<Vec<u32>> {
        let count = inode.data_block_count();
        if count > MAX_FILE_BLOCK_COUNT {
            return Err(FsError::FileTooLarge(inode.size as usize));
        }
        let direct = count.min(DIRECT_BLOCK_COUNT);
        let mut block_ids = inode.direct_blocks()[..direct].to_vec();
        if count > DIRECT_BLOCK_COUNT {
            let indirect = inode.indirect_block();
            if indirect == 0 {
                return Err(FsError::DataOutOfBounds);
            }
            let table = self.io().load_block(indirect)?;
            block_ids.extend(
                (0..count - DIRECT_BLOCK_COUNT).map(|index| read_u32(&table, index * 4)),
            );
        }
        Ok(block_ids)
    }

    /// Read every data block of the inode, the content is padded to whole blocks
    ///
    /// # Returns
    /// * Ok(Vec<u8>): `data_block_count * BLOCK_BYTE_SIZE` bytes
    /// * Err(FileTooLarge | DataOutOfBounds | SectorOutOfBounds | DeviceFailure)
    pub fn load_content(&mut self, inode: &DiskInode) -> Result<Vec<u8>> {
        let block_ids = self.data_blocks(inode)?;
        let mut content = vec![0u8; block_ids.len() * BLOCK_BYTE_SIZE];
        for (block_id, chunk) in block_ids
            .iter()
            .zip(content.chunks_exact_mut(BLOCK_BYTE_SIZE))
        {
            self.io().read_block(*block_id, chunk)?;
        }
        Ok(content)
    }

    /// Read the content of the inode without the block padding
    pub fn read_file(&mut self, inode: &DiskInode) -> Result<Vec<u8>> {
        let mut content = self.load_content(inode)?;
        content.truncate(inode.size as usize);
        Ok(content)
    }

    /// Give every block of the inode back to the bitmap and forget them in the inode.
    /// The inode is not stored.
    pub fn free_all_blocks(&mut self, inode: &mut DiskInode) -> Result<()> {
        for block_id in self.data_blocks(inode)? {
            self.free_block(block_id)?;
        }
        let indirect = inode.indirect_block();
        if indirect != 0 {
            self.free_block(indirect)?;
        }
        inode.clear_blocks();
        Ok(())
    }

    /// Allocate `count` blocks, every block is given back if one allocation fails
    fn allocate_blocks(&mut self, count: usize) -> Result<Vec<u32>> {
        let mut block_ids = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate_block() {
                Ok(block_id) => block_ids.push(block_id),
                Err(err) => {
                    warn!(
                        "roll back {} blocks after allocation failed: {}",
                        block_ids.len(),
                        err
                    );
                    for block_id in block_ids {
                        self.free_block(block_id)?;
                    }
                    return Err(err);
                }
            }
        }
        Ok(block_ids)
    }

    /// Replace the content of the inode with the data.
    /// The old blocks are released first, then the new ones are allocated one by one:
    /// twelve direct blocks, the indirect block, and the blocks listed in the indirect block.
    /// The inode is not stored.
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(FileTooLarge | BitmapExhausted | SectorOutOfBounds | DeviceFailure)
    pub fn store_content(&mut self, inode: &mut DiskInode, data: &[u8]) -> Result<()> {
        let count = (data.len() + BLOCK_BYTE_SIZE - 1) / BLOCK_BYTE_SIZE;
        if count > MAX_FILE_BLOCK_COUNT {
            return Err(FsError::FileTooLarge(data.len()));
        }
        self.free_all_blocks(inode)?;
        let with_indirect = count > DIRECT_BLOCK_COUNT;
        let block_ids = self.allocate_blocks(count + with_indirect as usize)?;
        let (direct, rest) = block_ids.split_at(count.min(DIRECT_BLOCK_COUNT));
        inode.block[..direct.len()].copy_from_slice(direct);
        let mut data_ids = direct.to_vec();
        if let Some((indirect, listed)) = rest.split_first() {
            debug_assert!(listed.len() <= INDIRECT_ENTRY_COUNT);
            let mut table = [0u8; BLOCK_BYTE_SIZE];
            for (index, block_id) in listed.iter().enumerate() {
                write_u32(&mut table, index * 4, *block_id);
            }
            self.io().write_block(*indirect, &table)?;
            inode.block[INDIRECT_BLOCK_SLOT] = *indirect;
            data_ids.extend_from_slice(listed);
        }
        for (block_id, chunk) in data_ids.iter().zip(data.chunks(BLOCK_BYTE_SIZE)) {
            if chunk.len() == BLOCK_BYTE_SIZE {
                self.io().write_block(*block_id, chunk)?;
            } else {
                let mut padded = [0u8; BLOCK_BYTE_SIZE];
                padded[..chunk.len()].copy_from_slice(chunk);
                self.io().write_block(*block_id, &padded)?;
            }
        }
        inode.blocks = (block_ids.len() * SECTORS_PER_BLOCK) as u32;
        inode.size = if self.options().round_size_to_blocks {
            (count * BLOCK_BYTE_SIZE) as u32
        } else {
            data.len() as u32
        };
        inode.mtime = self.now();
        Ok(())
    }

    /// Replace the content of the inode by number and store the inode.
    /// The inode is stored even when the new content can't be written,
    /// so it never points to the released blocks.
    pub fn write_file(&mut self, number: u32, data: &[u8]) -> Result<()> {
        let mut inode = self.load_inode(number)?;
        let stored = self.store_content(&mut inode, data);
        self.store_inode(number, &inode)?;
        stored?;
        debug!("write {} bytes to inode {}", data.len(), number);
        Ok(())
    }

    /// Drop the inode: its blocks are released when the mount options allow it,
    /// the record is zeroed and the inode number is given back.
    pub fn release_inode(&mut self, number: u32) -> Result<()> {
        self.drop_inode(number, self.options().reclaim_blocks_on_delete)
    }

    /// Drop an inode which was never linked into a directory, its blocks are always released
    pub fn discard_inode(&mut self, number: u32) -> Result<()> {
        self.drop_inode(number, true)
    }

    fn drop_inode(&mut self, number: u32, reclaim: bool) -> Result<()> {
        let mut inode = self.load_inode(number)?;
        if reclaim {
            self.free_all_blocks(&mut inode)?;
        }
        self.store_inode(number, &DiskInode::default())?;
        self.free_inode(number)?;
        debug!("release inode {}", number);
        Ok(())
    }
}
