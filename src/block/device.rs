// @author:    olinex
// @time:      2023/11/04

// self mods

// use other mods
use core::any::Any;

use alloc::vec::Vec;
use spin::Mutex;

// use self mods
use crate::configs::SECTOR_BYTE_SIZE;
use crate::{FsError, Result};

pub trait SectorDevice: Send + Sync + Any {
    /// Read a sector of bytes from device,
    /// the length of the buffer must be same with [`crate::configs::SECTOR_BYTE_SIZE`]
    ///
    /// # Arguments
    /// * sector: the unique identifier of the sector
    /// * buffer: the buffer which will store the sector byte data
    fn read_sector(&self, sector: u32, buffer: &mut [u8]) -> Result<()>;

    /// Write a sector of bytes to device,
    /// the length of the buffer must be same with [`crate::configs::SECTOR_BYTE_SIZE`]
    ///
    /// # Arguments
    /// * sector: the unique identifier of the sector
    /// * buffer: the buffer which will be read and the data will be written to device
    fn write_sector(&self, sector: u32, buffer: &[u8]) -> Result<()>;

    /// The total count of the sectors the device owns
    fn sector_count(&self) -> u32;
}

/// The memory disk which is impl [`SectorDevice`] and used for testing and image building.
/// Data will be stored into the kernel heap.
pub struct MemoryDisk {
    data: Mutex<Vec<u8>>,
    sectors: u32,
}
impl MemoryDisk {
    /// Create a new zeroed memory disk
    ///
    /// # Arguments
    /// * sectors: the count of the sectors in the disk
    pub fn new(sectors: u32) -> Self {
        Self {
            data: Mutex::new(vec![0; sectors as usize * SECTOR_BYTE_SIZE]),
            sectors,
        }
    }

    /// Create a memory disk from an existing image, the image is padded to whole sectors
    pub fn from_image(mut image: Vec<u8>) -> Self {
        let sectors = (image.len() + SECTOR_BYTE_SIZE - 1) / SECTOR_BYTE_SIZE;
        image.resize(sectors * SECTOR_BYTE_SIZE, 0);
        Self {
            data: Mutex::new(image),
            sectors: sectors as u32,
        }
    }

    /// Copy the whole disk out as an image
    pub fn to_image(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    #[inline(always)]
    fn check(&self, sector: u32, len: usize) -> Result<usize> {
        assert!(len == SECTOR_BYTE_SIZE);
        if sector >= self.sectors {
            Err(FsError::SectorOutOfBounds(sector))
        } else {
            Ok(sector as usize * SECTOR_BYTE_SIZE)
        }
    }
}
impl SectorDevice for MemoryDisk {
    fn read_sector(&self, sector: u32, buffer: &mut [u8]) -> Result<()> {
        let start_offset = self.check(sector, buffer.len())?;
        let src = self.data.lock();
        buffer.copy_from_slice(&src[start_offset..start_offset + SECTOR_BYTE_SIZE]);
        Ok(())
    }

    fn write_sector(&self, sector: u32, buffer: &[u8]) -> Result<()> {
        let start_offset = self.check(sector, buffer.len())?;
        let mut dst = self.data.lock();
        dst[start_offset..start_offset + SECTOR_BYTE_SIZE].copy_from_slice(buffer);
        Ok(())
    }

    fn sector_count(&self) -> u32 {
        self.sectors
    }
}
