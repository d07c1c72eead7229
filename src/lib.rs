// @author:    olinex
// @time:      2023/11/03
#![cfg_attr(not(test), no_std)]

// self mods
pub mod block;
pub mod configs;
pub mod error;
pub mod got;
pub mod layout;
pub mod syscall;
pub mod vfs;

// use other mods
#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

#[macro_use]
extern crate alloc;

extern crate bit_field;
extern crate spin;

// reexports
pub use error::{FsError, Result};

bitflags! {
    /// The intent a process declares when it opens a file
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const EXECUTE = 1 << 2;
        const RW = Self::READABLE.bits() | Self::WRITABLE.bits();
    }
}
impl OpenFlags {
    pub fn is_readable(&self) -> bool {
        self.contains(OpenFlags::READABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.contains(OpenFlags::WRITABLE)
    }

    pub fn is_execute(&self) -> bool {
        self.contains(OpenFlags::EXECUTE)
    }
}

/// A fixed-size on-disk record which is decoded from and encoded into raw block bytes.
/// All fields are little endian.
pub trait DiskRecord: Sized {
    const BYTE_SIZE: usize;

    /// Decode the record from the start of the byte slice
    ///
    /// # Returns
    /// * Ok(record)
    /// * Err(DataOutOfBounds)
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// Encode the record into the start of the byte slice
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(DataOutOfBounds)
    fn encode(&self, bytes: &mut [u8]) -> Result<()>;
}

#[inline(always)]
pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline(always)]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline(always)]
pub(crate) fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline(always)]
pub(crate) fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
