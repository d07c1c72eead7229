// @author:    olinex
// @time:      2023/11/08

// self mods

// use other mods
use bit_field::BitField;

// use self mods
use crate::configs::{
    BLOCK_BYTE_SIZE, DIRECT_BLOCK_COUNT, INDIRECT_BLOCK_SLOT, INODE_BLOCK_SLOTS, INODE_BYTE_SIZE,
    SECTORS_PER_BLOCK,
};
use crate::{read_u16, read_u32, write_u16, write_u32, DiskRecord, FsError, Result};

const BLOCK_SLOTS_OFFSET: usize = 40;

bitflags! {
    /// The 9 permission bits of an inode mode
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Permission: u16 {
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXECUTE = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXECUTE = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXECUTE = 0o001;
    }
}

/// The type tag which is stored in the upper four bits of the mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    Regular,
    Directory,
    Pipe,
    Socket,
}
impl FileType {
    const MODE_FIFO: u16 = 0x1;
    const MODE_DIRECTORY: u16 = 0x4;
    const MODE_REGULAR: u16 = 0x8;
    const MODE_SOCKET: u16 = 0xC;

    /// Read the type from the upper four bits of a mode
    pub fn from_mode(mode: u16) -> Self {
        match mode.get_bits(12..16) {
            Self::MODE_FIFO => Self::Pipe,
            Self::MODE_DIRECTORY => Self::Directory,
            Self::MODE_REGULAR => Self::Regular,
            Self::MODE_SOCKET => Self::Socket,
            _ => Self::Unknown,
        }
    }

    /// The mode bits of the type without permissions
    pub fn mode_bits(&self) -> u16 {
        let tag = match self {
            Self::Unknown => 0,
            Self::Pipe => Self::MODE_FIFO,
            Self::Directory => Self::MODE_DIRECTORY,
            Self::Regular => Self::MODE_REGULAR,
            Self::Socket => Self::MODE_SOCKET,
        };
        let mut bits = 0u16;
        bits.set_bits(12..16, tag);
        bits
    }

    /// The file type tag used by directory entries
    pub fn dir_entry_tag(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Regular => 1,
            Self::Directory => 2,
            Self::Pipe => 5,
            Self::Socket => 6,
        }
    }

    pub fn from_dir_entry_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Regular,
            2 => Self::Directory,
            5 => Self::Pipe,
            6 => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

/// The on-disk inode, which is exactly 128 bytes long:
/// ```text
/// mode(2) uid(2) size(4) atime(4) ctime(4) mtime(4) dtime(4) gid(2) links_count(2)
/// blocks(4) flags(4) osd1(4) block[15](60) generation(4) file_acl(4) dir_acl(4)
/// faddr(4) osd2[3](12)
/// ```
/// Slots 0..12 of `block` point to data blocks directly,
/// slot 12 points to one block which is full of further data block ids.
/// Slots 13 and 14 are never used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskInode {
    pub mode: u16,
    pub uid: u16,
    pub size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub gid: u16,
    pub links_count: u16,
    /// count of the 512-byte sectors held by the inode, the indirect block included
    pub blocks: u32,
    pub flags: u32,
    pub osd1: u32,
    pub block: [u32; INODE_BLOCK_SLOTS],
    pub generation: u32,
    pub file_acl: u32,
    pub dir_acl: u32,
    pub faddr: u32,
    pub osd2: [u32; 3],
}
impl DiskInode {
    /// Create a new inode of the type with the permission bits
    pub fn new(file_type: FileType, permission: Permission, time: u32) -> Self {
        Self {
            mode: file_type.mode_bits() | permission.bits(),
            atime: time,
            ctime: time,
            mtime: time,
            links_count: 1,
            ..Self::default()
        }
    }

    #[inline(always)]
    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    #[inline(always)]
    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    #[inline(always)]
    pub fn permission(&self) -> Permission {
        Permission::from_bits_truncate(self.mode)
    }

    /// Replace the permission bits, the type bits are kept
    pub fn set_permission(&mut self, permission: Permission) {
        self.mode.set_bits(0..9, permission.bits());
    }

    /// The count of data blocks needed for the byte size of the inode
    #[inline(always)]
    pub fn data_block_count(&self) -> usize {
        (self.size as usize + BLOCK_BYTE_SIZE - 1) / BLOCK_BYTE_SIZE
    }

    #[inline(always)]
    pub fn direct_blocks(&self) -> &[u32] {
        &self.block[..DIRECT_BLOCK_COUNT]
    }

    #[inline(always)]
    pub fn indirect_block(&self) -> u32 {
        self.block[INDIRECT_BLOCK_SLOT]
    }

    /// Count of the file system blocks recorded in the sector counter
    #[inline(always)]
    pub fn fs_block_count(&self) -> u32 {
        self.blocks / SECTORS_PER_BLOCK as u32
    }

    /// Forget every block of the inode, be careful the blocks are not deallocated here.
    pub fn clear_blocks(&mut self) {
        self.block.iter_mut().for_each(|id| *id = 0);
        self.blocks = 0;
        self.size = 0;
    }
}
impl DiskRecord for DiskInode {
    const BYTE_SIZE: usize = INODE_BYTE_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::BYTE_SIZE {
            return Err(FsError::DataOutOfBounds);
        }
        let mut block = [0u32; INODE_BLOCK_SLOTS];
        for (index, id) in block.iter_mut().enumerate() {
            *id = read_u32(bytes, BLOCK_SLOTS_OFFSET + index * 4);
        }
        Ok(Self {
            mode: read_u16(bytes, 0),
            uid: read_u16(bytes, 2),
            size: read_u32(bytes, 4),
            atime: read_u32(bytes, 8),
            ctime: read_u32(bytes, 12),
            mtime: read_u32(bytes, 16),
            dtime: read_u32(bytes, 20),
            gid: read_u16(bytes, 24),
            links_count: read_u16(bytes, 26),
            blocks: read_u32(bytes, 28),
            flags: read_u32(bytes, 32),
            osd1: read_u32(bytes, 36),
            block,
            generation: read_u32(bytes, 100),
            file_acl: read_u32(bytes, 104),
            dir_acl: read_u32(bytes, 108),
            faddr: read_u32(bytes, 112),
            osd2: [
                read_u32(bytes, 116),
                read_u32(bytes, 120),
                read_u32(bytes, 124),
            ],
        })
    }

    fn encode(&self, bytes: &mut [u8]) -> Result<()> {
        if bytes.len() < Self::BYTE_SIZE {
            return Err(FsError::DataOutOfBounds);
        }
        write_u16(bytes, 0, self.mode);
        write_u16(bytes, 2, self.uid);
        write_u32(bytes, 4, self.size);
        write_u32(bytes, 8, self.atime);
        write_u32(bytes, 12, self.ctime);
        write_u32(bytes, 16, self.mtime);
        write_u32(bytes, 20, self.dtime);
        write_u16(bytes, 24, self.gid);
        write_u16(bytes, 26, self.links_count);
        write_u32(bytes, 28, self.blocks);
        write_u32(bytes, 32, self.flags);
        write_u32(bytes, 36, self.osd1);
        for (index, id) in self.block.iter().enumerate() {
            write_u32(bytes, BLOCK_SLOTS_OFFSET + index * 4, *id);
        }
        write_u32(bytes, 100, self.generation);
        write_u32(bytes, 104, self.file_acl);
        write_u32(bytes, 108, self.dir_acl);
        write_u32(bytes, 112, self.faddr);
        for (index, value) in self.osd2.iter().enumerate() {
            write_u32(bytes, 116 + index * 4, *value);
        }
        Ok(())
    }
}
