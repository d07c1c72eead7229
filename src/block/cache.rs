// @author:    olinex
// @time:      2023/11/04

// self mods

// use other mods
use alloc::boxed::Box;

// use self mods
use super::device::SectorDevice;
use crate::configs::{CACHE_SIZE, SECTOR_BYTE_SIZE};
use crate::Result;

type SectorData = [u8; SECTOR_BYTE_SIZE];

/// The metadata of a single cached sector
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub(crate) struct CacheLine {
    sector: u32,
    valid: bool,
    /// value of the logical clock when the line was touched last time
    access_time: u32,
}

/// Counters which are visible for diagnostics
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// A least-recently-used cache of disk sectors.
/// Reads are served from the cached copies,
/// while any write drops every line before it goes to the device.
pub struct SectorCache {
    lines: [CacheLine; CACHE_SIZE],
    /// We should make the cached bytes to store into the kernel heap.
    /// If we does't, the task's kernel stack maybe overflow
    data: Box<[SectorData; CACHE_SIZE]>,
    clock: u32,
    stats: CacheStats,
}
impl SectorCache {
    pub fn new() -> Self {
        Self {
            lines: [CacheLine::default(); CACHE_SIZE],
            data: Box::new([[0u8; SECTOR_BYTE_SIZE]; CACHE_SIZE]),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Advance the logical clock shared by all cache operations.
    /// When the clock would wrap, the cache is dropped so that the recency order never inverts.
    fn tick(&mut self) -> u32 {
        if self.clock == u32::MAX {
            self.invalidate();
            self.clock = 0;
        }
        self.clock += 1;
        self.clock
    }

    /// Find the valid line which caches the sector
    fn lookup(&self, sector: u32) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.valid && line.sector == sector)
    }

    /// Choose the line which will receive a missed sector.
    /// An unused line is preferred, otherwise the valid line with the oldest access time,
    /// ties are broken by the lowest index.
    fn victim(&self) -> usize {
        if let Some(index) = self.lines.iter().position(|line| !line.valid) {
            index
        } else {
            self.lines
                .iter()
                .enumerate()
                .min_by_key(|(_, line)| line.access_time)
                .map(|(index, _)| index)
                .unwrap_or(0)
        }
    }

    /// Copy one sector into the destination buffer.
    ///
    /// # Arguments
    /// * device: the device which owns the sector
    /// * sector: the sector number
    /// * dest: the buffer which length must be [`SECTOR_BYTE_SIZE`]
    /// * cache_enabled: bypass the cache entirely when it is false
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(SectorOutOfBounds | DeviceFailure)
    pub fn read_sector(
        &mut self,
        device: &dyn SectorDevice,
        sector: u32,
        dest: &mut [u8],
        cache_enabled: bool,
    ) -> Result<()> {
        if !cache_enabled {
            return device.read_sector(sector, dest);
        }
        if let Some(index) = self.lookup(sector) {
            let now = self.tick();
            // the tick may have dropped every line
            if self.lines[index].valid {
                self.lines[index].access_time = now;
                self.stats.hits += 1;
                dest.copy_from_slice(&self.data[index]);
                return Ok(());
            }
        }
        self.stats.misses += 1;
        let index = self.victim();
        self.lines[index].valid = false;
        device.read_sector(sector, &mut self.data[index])?;
        let now = self.tick();
        self.lines[index] = CacheLine {
            sector,
            valid: true,
            access_time: now,
        };
        dest.copy_from_slice(&self.data[index]);
        Ok(())
    }

    /// Drop every line and then write the sector to the device.
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(SectorOutOfBounds | DeviceFailure)
    pub fn write_sector(
        &mut self,
        device: &dyn SectorDevice,
        sector: u32,
        src: &[u8],
    ) -> Result<()> {
        self.invalidate();
        device.write_sector(sector, src)
    }

    /// Zero all line metadata and cached bytes
    pub fn invalidate(&mut self) {
        self.lines
            .iter_mut()
            .for_each(|line| *line = CacheLine::default());
        self.data
            .iter_mut()
            .for_each(|data| data.iter_mut().for_each(|byte| *byte = 0));
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Count of the lines which currently hold a sector
    pub fn valid_lines(&self) -> usize {
        self.lines.iter().filter(|line| line.valid).count()
    }

    /// Check if the sector is cached
    pub fn contains(&self, sector: u32) -> bool {
        self.lookup(sector).is_some()
    }
}
impl Default for SectorCache {
    fn default() -> Self {
        Self::new()
    }
}
