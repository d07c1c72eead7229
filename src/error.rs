// @author:    olinex
// @time:      2023/11/30

// self mods

// use other mods
use alloc::string::String;
use enum_group::EnumGroup;
use thiserror_no_std::Error;

// use self mods

/// Every failure of the storage layer.
/// The groups follow the error taxonomy the syscall layer reports:
/// `missing`, `denied`, `exhausted`, `invalid` and `fatal`.
#[derive(Error, EnumGroup, Debug)]
pub enum FsError {
    #[groups(device, fatal)]
    #[error("Sector {0} out of bounds")]
    SectorOutOfBounds(u32),

    #[groups(device, fatal)]
    #[error("Raw device error code: {0}")]
    DeviceFailure(isize),

    #[groups(device, fatal)]
    #[error("Not valid ext2 block device data")]
    NotValidFileSystem,

    #[groups(device, invalid)]
    #[error("Unsupported file system geometry: {0}")]
    UnsupportedGeometry(&'static str),

    #[groups(block, fatal)]
    #[error("Data out of bounds")]
    DataOutOfBounds,

    #[groups(block, invalid)]
    #[error("Block {0} out of bounds")]
    BlockOutOfBounds(u32),

    #[groups(bitmap, exhausted)]
    #[error("Bitmap was exhausted which block id is {0}")]
    BitmapExhausted(u32),

    #[groups(bitmap, fatal)]
    #[error("Bitmap index {0} was already deallocated")]
    BitmapIndexDeallocated(u32),

    #[groups(inode, invalid)]
    #[error("Inode {0} out of bounds")]
    InodeOutOfBounds(u32),

    #[groups(inode, exhausted)]
    #[error("File of {0} bytes does not fit into one inode")]
    FileTooLarge(usize),

    #[groups(directory, exhausted)]
    #[error("Directory {0} has no room for another entry")]
    DirectoryFull(u32),

    #[groups(directory, invalid)]
    #[error("Invalid file name `{0}`")]
    InvalidName(String),

    #[groups(directory, invalid)]
    #[error("File name `{0}` was already exists in directory {1}")]
    DuplicatedName(String, u32),

    #[groups(directory, missing)]
    #[error("File name `{0}` does not exist in directory {1}")]
    NameDoesNotExist(String, u32),

    #[groups(directory, invalid)]
    #[error("Can't delete non-empty directory `{0}` from directory {1}")]
    DeleteNonEmptyDirectory(String, u32),

    #[groups(directory, fatal)]
    #[error("Directory block of inode {0} is corrupted")]
    CorruptedDirectory(u32),

    #[groups(path, missing)]
    #[error("Path `{0}` does not exist")]
    PathNotFound(String),

    #[groups(path, invalid)]
    #[error("Path component `{0}` is not a directory")]
    InvalidDirectory(String),

    #[groups(path, invalid)]
    #[error("Inode {0} is not a regular file")]
    NotAFile(u32),

    #[groups(permission, denied)]
    #[error("Permission denied for inode {0}")]
    PermissionDenied(u32),

    #[groups(permission, denied)]
    #[error("Inode {0} is write locked by process {1}")]
    WriteLocked(u32, u32),

    #[groups(object, exhausted)]
    #[error("Global object table is full")]
    ObjectTableFull,

    #[groups(object, exhausted)]
    #[error("Descriptor table of process {0} is full")]
    DescriptorTableFull(u32),

    #[groups(object, invalid)]
    #[error("Bad file descriptor {0}")]
    BadDescriptor(usize),

    #[groups(object, invalid)]
    #[error("Bad object handle {0}")]
    BadHandle(usize),

    #[groups(object, exhausted)]
    #[error("Kernel buffer of object {0} is full")]
    BufferFull(usize),

    #[groups(others, parse)]
    #[error("core error: {0}")]
    ParseUtf8Error(#[from] core::str::Utf8Error),
}

pub type Result<T> = core::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_groups_follow_taxonomy() {
        assert!(FsError::PathNotFound(String::from("/a")).is_missing());
        assert!(FsError::NameDoesNotExist(String::from("a"), 2).is_missing());
        assert!(FsError::WriteLocked(12, 3).is_denied());
        assert!(FsError::BitmapExhausted(3).is_exhausted());
        assert!(FsError::DirectoryFull(2).is_exhausted());
        assert!(FsError::ObjectTableFull.is_exhausted());
        assert!(FsError::InvalidDirectory(String::from("a")).is_invalid());
        assert!(FsError::CorruptedDirectory(2).is_fatal());
        assert!(!FsError::PathNotFound(String::from("/a")).is_fatal());
    }
}
