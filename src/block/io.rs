// @author:    olinex
// @time:      2023/11/04

// self mods

// use other mods
use alloc::sync::Arc;

// use self mods
use super::cache::{CacheStats, SectorCache};
use super::device::SectorDevice;
use crate::configs::{BLOCK_BYTE_SIZE, SECTORS_PER_BLOCK, SECTOR_BYTE_SIZE};
use crate::Result;

pub type DataBlock = [u8; BLOCK_BYTE_SIZE];

/// Translates file system blocks into runs of sectors and moves them through the sector cache
pub struct BlockIo {
    device: Arc<dyn SectorDevice>,
    cache: SectorCache,
    cache_enabled: bool,
}
impl BlockIo {
    pub fn new(device: Arc<dyn SectorDevice>, cache_enabled: bool) -> Self {
        Self {
            device,
            cache: SectorCache::new(),
            cache_enabled,
        }
    }

    /// The first sector which belongs to the block
    #[inline(always)]
    pub fn first_sector(block_id: u32) -> u32 {
        block_id * SECTORS_PER_BLOCK as u32
    }

    /// Read a whole block into the buffer
    ///
    /// # Arguments
    /// * block_id: the block number in the file system
    /// * buffer: the buffer which length must be [`BLOCK_BYTE_SIZE`]
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(SectorOutOfBounds | DeviceFailure)
    pub fn read_block(&mut self, block_id: u32, buffer: &mut [u8]) -> Result<()> {
        assert!(buffer.len() == BLOCK_BYTE_SIZE);
        let first = Self::first_sector(block_id);
        for (index, chunk) in buffer.chunks_exact_mut(SECTOR_BYTE_SIZE).enumerate() {
            self.cache.read_sector(
                self.device.as_ref(),
                first + index as u32,
                chunk,
                self.cache_enabled,
            )?;
        }
        Ok(())
    }

    /// Write a whole block to the device, the sector cache is dropped before
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(SectorOutOfBounds | DeviceFailure)
    pub fn write_block(&mut self, block_id: u32, buffer: &[u8]) -> Result<()> {
        assert!(buffer.len() == BLOCK_BYTE_SIZE);
        let first = Self::first_sector(block_id);
        for (index, chunk) in buffer.chunks_exact(SECTOR_BYTE_SIZE).enumerate() {
            self.cache
                .write_sector(self.device.as_ref(), first + index as u32, chunk)?;
        }
        Ok(())
    }

    /// Read a block and return a copy of it
    pub fn load_block(&mut self, block_id: u32) -> Result<DataBlock> {
        let mut block = [0u8; BLOCK_BYTE_SIZE];
        self.read_block(block_id, &mut block)?;
        Ok(block)
    }

    /// Zero the whole block on the device
    pub fn clear_block(&mut self, block_id: u32) -> Result<()> {
        self.write_block(block_id, &[0u8; BLOCK_BYTE_SIZE])
    }

    /// Load the block, apply the closure on it and write it back.
    /// The block is written even if the closure returns an error value inside the `V`.
    pub fn modify_block<V>(
        &mut self,
        block_id: u32,
        f: impl FnOnce(&mut DataBlock) -> V,
    ) -> Result<V> {
        let mut block = self.load_block(block_id)?;
        let value = f(&mut block);
        self.write_block(block_id, &block)?;
        Ok(value)
    }

    pub fn device(&self) -> &Arc<dyn SectorDevice> {
        &self.device
    }

    pub fn total_blocks(&self) -> u32 {
        self.device.sector_count() / SECTORS_PER_BLOCK as u32
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &SectorCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SectorCache {
        &mut self.cache
    }

    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache_enabled = enabled;
    }
}
