// @author:    olinex
// @time:      2023/11/23

// self mods

// use other mods
use alloc::boxed::Box;
use alloc::sync::Arc;

// use self mods
use super::{FileSystem, FormatOptions, MountOptions};
use crate::block::{BlockIo, CacheStats, SectorDevice};
use crate::configs::{
    BLOCK_BIT_SIZE, BLOCK_BITMAP_BLOCK_ID, BLOCK_BYTE_SIZE, FIRST_FREE_INODE,
    GROUP_DESCRIPTOR_BLOCK_ID, INODES_PER_BLOCK, INODE_BITMAP_BLOCK_ID, INODE_BYTE_SIZE,
    INODE_TABLE_BLOCK_ID, ROOT_INODE, SECTORS_PER_BLOCK, SUPER_BLOCK_ID,
};
use crate::layout::{
    Bitmap, DirBlock, DiskInode, FileType, GroupDescriptor, Permission, SuperBlock,
};
use crate::{DiskRecord, FsError, Result};

/// The mounted file system.
/// Every operation of the storage layer takes this context by mutable reference,
/// so the cache, the bitmaps and the logical clock are never shared behind the caller's back.
pub struct Ext2Fs {
    io: BlockIo,
    super_block: SuperBlock,
    group: GroupDescriptor,
    block_bitmap: Bitmap,
    inode_bitmap: Bitmap,
    options: MountOptions,
}
impl Ext2Fs {
    /// Build the context and check the bitmaps fit into one block each
    fn from_parts(
        io: BlockIo,
        super_block: SuperBlock,
        group: GroupDescriptor,
        options: MountOptions,
    ) -> Result<Self> {
        let block_bits = super_block.block_bitmap_bits();
        if block_bits as usize > BLOCK_BIT_SIZE || super_block.inodes_count as usize > BLOCK_BIT_SIZE
        {
            return Err(FsError::UnsupportedGeometry("bitmap larger than one block"));
        }
        if super_block.blocks_count > io.total_blocks() {
            return Err(FsError::UnsupportedGeometry("device smaller than file system"));
        }
        let block_bitmap = Bitmap::new(group.block_bitmap, block_bits);
        let inode_bitmap = Bitmap::new(group.inode_bitmap, super_block.inodes_count);
        Ok(Self {
            io,
            super_block,
            group,
            block_bitmap,
            inode_bitmap,
            options,
        })
    }

    /// Write a fresh file system to the device:
    /// super block, group descriptor, both bitmaps, a zeroed inode table
    /// and the root directory holding `.` and `..`.
    ///
    /// # Arguments
    /// * device: the device which will be overwritten
    /// * format: the geometry of the new file system
    /// * options: the options used to mount it afterwards
    ///
    /// # Returns
    /// * Ok(Ext2Fs)
    /// * Err(UnsupportedGeometry | SectorOutOfBounds | DeviceFailure)
    pub fn format(
        device: Arc<dyn SectorDevice>,
        format: &FormatOptions,
        options: MountOptions,
    ) -> Result<Self> {
        let blocks_count = format.mode.total_blocks();
        let inodes_count = format.total_inodes;
        if inodes_count < FIRST_FREE_INODE || inodes_count as usize % INODES_PER_BLOCK != 0 {
            return Err(FsError::UnsupportedGeometry("inode count"));
        }
        let inode_table_blocks = inodes_count / INODES_PER_BLOCK as u32;
        let root_block = INODE_TABLE_BLOCK_ID + inode_table_blocks;
        if root_block >= blocks_count {
            return Err(FsError::UnsupportedGeometry("block count"));
        }
        let mut io = BlockIo::new(Arc::clone(&device), options.cache_enabled);
        if blocks_count > io.total_blocks() {
            return Err(FsError::UnsupportedGeometry("device smaller than file system"));
        }
        for block_id in 0..=root_block {
            io.clear_block(block_id)?;
        }
        let now = (options.clock)();
        let used_blocks = root_block + 1;
        let super_block = SuperBlock::new(
            blocks_count,
            inodes_count,
            used_blocks,
            &format.volume_name,
            now,
        );
        let group = GroupDescriptor {
            block_bitmap: BLOCK_BITMAP_BLOCK_ID,
            inode_bitmap: INODE_BITMAP_BLOCK_ID,
            inode_table: INODE_TABLE_BLOCK_ID,
            free_blocks_count: super_block.free_blocks_count as u16,
            free_inodes_count: super_block.free_inodes_count as u16,
            used_dirs_count: 1,
        };
        let mut block = [0u8; BLOCK_BYTE_SIZE];
        super_block.encode(&mut block)?;
        io.write_block(SUPER_BLOCK_ID, &block)?;
        let mut block = [0u8; BLOCK_BYTE_SIZE];
        group.encode(&mut block)?;
        io.write_block(GROUP_DESCRIPTOR_BLOCK_ID, &block)?;

        let mut fs = Self::from_parts(io, super_block, group, options)?;
        // block numbers 1..=root_block are metadata, block 0 has no bit at all
        fs.block_bitmap.initialize(&mut fs.io, root_block)?;
        fs.inode_bitmap
            .initialize(&mut fs.io, FIRST_FREE_INODE - 1)?;

        let dir_tag = FileType::Directory.dir_entry_tag();
        fs.io.modify_block(root_block, |data| {
            DirBlock::new(ROOT_INODE, data).initialize(ROOT_INODE, ROOT_INODE, dir_tag)
        })??;
        let mut root = DiskInode::new(
            FileType::Directory,
            Permission::from_bits_truncate(0o755),
            now,
        );
        root.links_count = 2;
        root.size = BLOCK_BYTE_SIZE as u32;
        root.blocks = SECTORS_PER_BLOCK as u32;
        root.block[0] = root_block;
        fs.store_inode(ROOT_INODE, &root)?;
        info!(
            "format ext2 with {} blocks and {} inodes, root directory at block {}",
            blocks_count, inodes_count, root_block
        );
        Ok(fs)
    }

    /// Mount the file system which lives on the device
    ///
    /// # Returns
    /// * Ok(Ext2Fs)
    /// * Err(NotValidFileSystem | UnsupportedGeometry | SectorOutOfBounds | DeviceFailure)
    pub fn mount(device: Arc<dyn SectorDevice>, options: MountOptions) -> Result<Self> {
        let mut io = BlockIo::new(device, options.cache_enabled);
        let super_block = SuperBlock::decode(&io.load_block(SUPER_BLOCK_ID)?)?;
        super_block.validate()?;
        let group = GroupDescriptor::decode(&io.load_block(GROUP_DESCRIPTOR_BLOCK_ID)?)?;
        debug!(
            "mount ext2 with {} blocks and {} inodes",
            super_block.blocks_count, super_block.inodes_count
        );
        Self::from_parts(io, super_block, group, options)
    }

    #[inline(always)]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline(always)]
    pub fn group_descriptor(&self) -> &GroupDescriptor {
        &self.group
    }

    #[inline(always)]
    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: MountOptions) {
        self.io.set_cache_enabled(options.cache_enabled);
        self.options = options;
    }

    /// Current time of the configured clock
    #[inline(always)]
    pub fn now(&self) -> u32 {
        (self.options.clock)()
    }

    pub(crate) fn io(&mut self) -> &mut BlockIo {
        &mut self.io
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.io.cache_stats()
    }

    pub fn reset_cache_stats(&mut self) {
        self.io.cache_mut().reset_stats()
    }

    /// Allocate a data block, the block is zeroed on the device
    ///
    /// # Returns
    /// * Ok(block id)
    /// * Err(BitmapExhausted | SectorOutOfBounds | DeviceFailure)
    pub fn allocate_block(&mut self) -> Result<u32> {
        let block_id = self.block_bitmap.alloc(&mut self.io)?;
        if let Err(err) = self.io.clear_block(block_id) {
            self.block_bitmap.dealloc(&mut self.io, block_id)?;
            return Err(err);
        }
        debug!("allocate block {}", block_id);
        Ok(block_id)
    }

    /// Give a data block back to the bitmap
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(BlockOutOfBounds | BitmapIndexDeallocated | SectorOutOfBounds | DeviceFailure)
    pub fn free_block(&mut self, block_id: u32) -> Result<()> {
        self.block_bitmap
            .dealloc(&mut self.io, block_id)
            .map_err(|err| {
                if err.is_bitmapindexdeallocated() {
                    warn!("block {} was freed twice", block_id);
                }
                err
            })?;
        debug!("free block {}", block_id);
        Ok(())
    }

    /// Allocate an inode number, the inode record itself is left untouched
    ///
    /// # Returns
    /// * Ok(inode number)
    /// * Err(BitmapExhausted | SectorOutOfBounds | DeviceFailure)
    pub fn allocate_inode(&mut self) -> Result<u32> {
        let number = self.inode_bitmap.alloc(&mut self.io)?;
        debug!("allocate inode {}", number);
        Ok(number)
    }

    /// Give an inode number back to the bitmap
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(InodeOutOfBounds | BitmapIndexDeallocated | SectorOutOfBounds | DeviceFailure)
    pub fn free_inode(&mut self, number: u32) -> Result<()> {
        self.check_inode(number)?;
        self.inode_bitmap
            .dealloc(&mut self.io, number)
            .map_err(|err| {
                if err.is_bitmapindexdeallocated() {
                    warn!("inode {} was freed twice", number);
                }
                err
            })?;
        debug!("free inode {}", number);
        Ok(())
    }

    pub fn free_block_count(&mut self) -> Result<u32> {
        self.block_bitmap.free_count(&mut self.io)
    }

    pub fn free_inode_count(&mut self) -> Result<u32> {
        self.inode_bitmap.free_count(&mut self.io)
    }

    pub fn is_block_allocated(&mut self, block_id: u32) -> Result<bool> {
        self.block_bitmap.is_allocated(&mut self.io, block_id)
    }

    pub fn is_inode_allocated(&mut self, number: u32) -> Result<bool> {
        self.check_inode(number)?;
        self.inode_bitmap.is_allocated(&mut self.io, number)
    }

    fn check_inode(&self, number: u32) -> Result<()> {
        if number == 0 || number > self.super_block.inodes_count {
            Err(FsError::InodeOutOfBounds(number))
        } else {
            Ok(())
        }
    }

    /// Calculates the position of the inode record in the inode table
    ///
    /// # Returns
    /// * Ok((block id, byte offset in the block))
    /// * Err(InodeOutOfBounds(number))
    fn inode_position(&self, number: u32) -> Result<(u32, usize)> {
        self.check_inode(number)?;
        let index = (number - 1) as usize;
        Ok((
            self.group.inode_table + (index / INODES_PER_BLOCK) as u32,
            (index % INODES_PER_BLOCK) * INODE_BYTE_SIZE,
        ))
    }

    /// Read the inode record
    ///
    /// # Returns
    /// * Ok(DiskInode)
    /// * Err(InodeOutOfBounds | SectorOutOfBounds | DeviceFailure)
    pub fn load_inode(&mut self, number: u32) -> Result<DiskInode> {
        let (block_id, offset) = self.inode_position(number)?;
        let block = self.io.load_block(block_id)?;
        DiskInode::decode(&block[offset..offset + INODE_BYTE_SIZE])
    }

    /// Write the inode record, only the table block which contains it is touched
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(InodeOutOfBounds | SectorOutOfBounds | DeviceFailure)
    pub fn store_inode(&mut self, number: u32, inode: &DiskInode) -> Result<()> {
        let (block_id, offset) = self.inode_position(number)?;
        self.io
            .modify_block(block_id, |block| {
                inode.encode(&mut block[offset..offset + INODE_BYTE_SIZE])
            })?
    }

    /// Replace the permission bits of the inode, its type is kept
    pub fn change_file_mode(&mut self, number: u32, permission: Permission) -> Result<()> {
        let mut inode = self.load_inode(number)?;
        inode.set_permission(permission);
        inode.ctime = self.now();
        self.store_inode(number, &inode)?;
        debug!("change mode of inode {} to {:o}", number, permission.bits());
        Ok(())
    }

    /// Allocate an inode number and write a fresh record of the type to it
    ///
    /// # Returns
    /// * Ok((inode number, inode))
    /// * Err(BitmapExhausted | SectorOutOfBounds | DeviceFailure)
    pub fn create_inode(
        &mut self,
        file_type: FileType,
        permission: Permission,
    ) -> Result<(u32, DiskInode)> {
        let number = self.allocate_inode()?;
        let inode = DiskInode::new(file_type, permission, self.now());
        if let Err(err) = self.store_inode(number, &inode) {
            self.free_inode(number)?;
            return Err(err);
        }
        Ok((number, inode))
    }
}
impl FileSystem for Ext2Fs {
    fn root_inode(&self) -> u32 {
        ROOT_INODE
    }

    fn initialize(
        format: &FormatOptions,
        options: MountOptions,
        device: &Arc<dyn SectorDevice>,
    ) -> Result<Box<Self>> {
        Ok(Box::new(Self::format(Arc::clone(device), format, options)?))
    }

    fn open(options: MountOptions, device: &Arc<dyn SectorDevice>) -> Result<Box<Self>> {
        Ok(Box::new(Self::mount(Arc::clone(device), options)?))
    }
}
