// @author:    olinex
// @time:      2023/11/22

// self mods

// use other mods
use alloc::string::{String, ToString};
use alloc::vec::Vec;

// use self mods
use super::Ext2Fs;
use crate::configs::{BLOCK_BYTE_SIZE, SECTORS_PER_BLOCK};
use crate::layout::{DirBlock, DirEntry, DiskInode, FileType, Permission, PARENT_NAME};
use crate::{FsError, Result};

impl Ext2Fs {
    /// Load the directory inode and return the only block of the directory
    ///
    /// # Returns
    /// * Ok((inode, block id))
    /// * Err(InvalidDirectory | CorruptedDirectory | InodeOutOfBounds | SectorOutOfBounds | DeviceFailure)
    fn directory_block(&mut self, dir: u32) -> Result<(DiskInode, u32)> {
        let inode = self.load_inode(dir)?;
        if !inode.is_dir() {
            return Err(FsError::InvalidDirectory(dir.to_string()));
        }
        match inode.block[0] {
            0 => {
                error!("directory {} owns no block", dir);
                Err(FsError::CorruptedDirectory(dir))
            }
            block_id => Ok((inode, block_id)),
        }
    }

    /// Run a read only closure on the directory block
    fn with_directory<V>(
        &mut self,
        dir: u32,
        f: impl FnOnce(&DirBlock) -> Result<V>,
    ) -> Result<V> {
        let (_, block_id) = self.directory_block(dir)?;
        let mut data = self.io().load_block(block_id)?;
        f(&DirBlock::new(dir, &mut data))
    }

    /// Run a closure on the directory block and store the block when it succeeds
    fn modify_directory<V>(
        &mut self,
        dir: u32,
        f: impl FnOnce(&mut DirBlock) -> Result<V>,
    ) -> Result<V> {
        let (mut inode, block_id) = self.directory_block(dir)?;
        let mut data = self.io().load_block(block_id)?;
        let value = f(&mut DirBlock::new(dir, &mut data))?;
        self.io().write_block(block_id, &data)?;
        inode.mtime = self.now();
        self.store_inode(dir, &inode)?;
        Ok(value)
    }

    /// Find the entry of the name in the directory
    ///
    /// # Returns
    /// * Ok(entry)
    /// * Err(NameDoesNotExist | InvalidDirectory | CorruptedDirectory | ...)
    pub fn lookup_entry(&mut self, dir: u32, name: &str) -> Result<DirEntry> {
        self.with_directory(dir, |block| {
            block
                .find(name)?
                .map(|(_, entry)| entry)
                .ok_or_else(|| FsError::NameDoesNotExist(name.to_string(), dir))
        })
    }

    /// Find the inode number of the name in the directory
    pub fn find_entry(&mut self, dir: u32, name: &str) -> Result<u32> {
        Ok(self.lookup_entry(dir, name)?.inode)
    }

    /// Link the inode into the directory under the name
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(InvalidName | DuplicatedName | DirectoryFull | InvalidDirectory | CorruptedDirectory | ...)
    pub fn insert_entry(
        &mut self,
        dir: u32,
        name: &str,
        inode: u32,
        file_type: FileType,
    ) -> Result<()> {
        let tag = file_type.dir_entry_tag();
        self.modify_directory(dir, |block| block.insert(name, inode, tag))?;
        debug!("insert `{}` -> {} into directory {}", name, inode, dir);
        Ok(())
    }

    /// Unlink the name from the directory, the inode itself is untouched
    ///
    /// # Returns
    /// * Ok(removed entry)
    /// * Err(NameDoesNotExist | InvalidDirectory | CorruptedDirectory | ...)
    pub fn delete_entry(&mut self, dir: u32, name: &str) -> Result<DirEntry> {
        let entry = self.modify_directory(dir, |block| block.remove(name))?;
        debug!("delete `{}` -> {} from directory {}", name, entry.inode, dir);
        Ok(entry)
    }

    /// The live entries of the directory in block order, dots included
    pub fn list_entries(&mut self, dir: u32) -> Result<Vec<DirEntry>> {
        self.with_directory(dir, |block| block.entries())
    }

    /// The names of the directory children, dots excluded
    pub fn list_names(&mut self, dir: u32) -> Result<Vec<String>> {
        self.with_directory(dir, |block| block.names())
    }

    /// Check the directory holds nothing but `.` and `..`
    pub fn is_empty_directory(&mut self, dir: u32) -> Result<bool> {
        self.with_directory(dir, |block| block.is_empty_dir())
    }

    /// Point the `..` entry of the directory to another parent
    pub fn set_parent_entry(&mut self, dir: u32, parent: u32) -> Result<()> {
        self.modify_directory(dir, |block| block.retarget(PARENT_NAME, parent))
    }

    /// Create a directory inode with its own block holding `.` and `..`.
    /// The new directory is not linked into the parent.
    ///
    /// # Returns
    /// * Ok(inode number)
    /// * Err(BitmapExhausted | SectorOutOfBounds | DeviceFailure)
    pub fn create_directory_inode(&mut self, parent: u32, permission: Permission) -> Result<u32> {
        let (number, mut inode) = self.create_inode(FileType::Directory, permission)?;
        let block_id = match self.allocate_block() {
            Ok(block_id) => block_id,
            Err(err) => {
                self.free_inode(number)?;
                return Err(err);
            }
        };
        let tag = FileType::Directory.dir_entry_tag();
        let initialized = self
            .io()
            .modify_block(block_id, |data| {
                DirBlock::new(number, data).initialize(number, parent, tag)
            })
            .and_then(|result| result);
        if let Err(err) = initialized {
            self.free_block(block_id)?;
            self.free_inode(number)?;
            return Err(err);
        }
        inode.links_count = 2;
        inode.size = BLOCK_BYTE_SIZE as u32;
        inode.blocks = SECTORS_PER_BLOCK as u32;
        inode.block[0] = block_id;
        self.store_inode(number, &inode)?;
        debug!("create directory inode {} under {}", number, parent);
        Ok(number)
    }
}
