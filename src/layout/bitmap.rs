// @author:    olinex
// @time:      2023/11/06

// self mods

// use other mods
use bit_field::BitField;

// use self mods
use crate::block::{BlockIo, DataBlock};
use crate::configs::BLOCK_BIT_SIZE;
use crate::{FsError, Result};

/// The bitmap data structure used to control the file system resources.
/// Each bitmap lives in exactly one block and bit `i` describes the resource numbered `i + 1`,
/// so that number zero is never handed out and can mean "nothing".
pub struct Bitmap {
    /// The block id which stores the bitmap data.
    block_id: u32,
    /// The count of the usable bits in the bitmap
    bits: u32,
}
impl Bitmap {
    /// Decompress the 1-based resource number to:
    /// * byte index
    /// * bit offset
    ///
    /// # Arguments
    /// * number: the number of the block or inode, start from one
    fn decompress(number: u32) -> (usize, usize) {
        let index = (number - 1) as usize;
        (index / 8, index % 8)
    }

    /// Create a new bitmap
    ///
    /// # Arguments
    /// * block_id: the block id which will be used for storing the bitmap data.
    /// * bits: the count of the usable bits, must not exceed the bits of a block.
    pub fn new(block_id: u32, bits: u32) -> Self {
        assert!(bits as usize <= BLOCK_BIT_SIZE);
        Self { block_id, bits }
    }

    #[inline(always)]
    pub fn block_id(&self) -> u32 {
        self.block_id
    }

    #[inline(always)]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// The count of bytes which are scanned for a free bit
    #[inline(always)]
    fn byte_range(&self) -> usize {
        (self.bits as usize + 7) / 8
    }

    /// Find the first clear bit in the bitmap block, least significant bit first
    ///
    /// # Returns
    /// * Some(1-based number)
    /// * None: all bits are set
    fn first_free(&self, block: &DataBlock) -> Option<u32> {
        block[..self.byte_range()]
            .iter()
            .enumerate()
            .find(|(_, byte)| **byte != u8::MAX)
            .map(|(byte_index, byte)| byte_index * 8 + byte.trailing_ones() as usize + 1)
            .filter(|number| *number <= self.bits as usize)
            .map(|number| number as u32)
    }

    /// Check the number is in the range of the bitmap
    fn check(&self, number: u32) -> Result<()> {
        if number == 0 || number > self.bits {
            Err(FsError::BlockOutOfBounds(number))
        } else {
            Ok(())
        }
    }

    /// Alloc a new bit and return the 1-based number of the resource.
    ///
    /// # Arguments
    /// * io: the block io of the mounted device
    ///
    /// # Returns
    /// * Ok(number)
    /// * Err(BitmapExhausted(block_id) | SectorOutOfBounds | DeviceFailure)
    pub fn alloc(&self, io: &mut BlockIo) -> Result<u32> {
        let mut block = io.load_block(self.block_id)?;
        let number = self
            .first_free(&block)
            .ok_or(FsError::BitmapExhausted(self.block_id))?;
        let (byte_index, bit_offset) = Self::decompress(number);
        block[byte_index].set_bit(bit_offset, true);
        io.write_block(self.block_id, &block)?;
        Ok(number)
    }

    /// Dealloc a old bit.
    /// If the bit is already deallocated, return Err and the bitmap stays untouched
    ///
    /// # Arguments
    /// * io: the block io of the mounted device
    /// * number: the 1-based number of the resource
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(BlockOutOfBounds(number) | BitmapIndexDeallocated(number) | SectorOutOfBounds | DeviceFailure)
    pub fn dealloc(&self, io: &mut BlockIo, number: u32) -> Result<()> {
        self.check(number)?;
        let (byte_index, bit_offset) = Self::decompress(number);
        let mut block = io.load_block(self.block_id)?;
        if !block[byte_index].get_bit(bit_offset) {
            return Err(FsError::BitmapIndexDeallocated(number));
        }
        block[byte_index].set_bit(bit_offset, false);
        io.write_block(self.block_id, &block)
    }

    /// Check if the resource is allocated
    pub fn is_allocated(&self, io: &mut BlockIo, number: u32) -> Result<bool> {
        self.check(number)?;
        let (byte_index, bit_offset) = Self::decompress(number);
        Ok(io.load_block(self.block_id)?[byte_index].get_bit(bit_offset))
    }

    /// Count the clear bits in the usable range
    pub fn free_count(&self, io: &mut BlockIo) -> Result<u32> {
        let block = io.load_block(self.block_id)?;
        Ok((1..=self.bits)
            .filter(|number| {
                let (byte_index, bit_offset) = Self::decompress(*number);
                !block[byte_index].get_bit(bit_offset)
            })
            .count() as u32)
    }

    /// Write a fresh bitmap: the first `reserved` numbers are marked as used,
    /// and so is every padding bit behind the usable range.
    pub fn initialize(&self, io: &mut BlockIo, reserved: u32) -> Result<()> {
        assert!(reserved <= self.bits);
        let mut block = [0u8; crate::configs::BLOCK_BYTE_SIZE];
        for number in 1..=reserved {
            let (byte_index, bit_offset) = Self::decompress(number);
            block[byte_index].set_bit(bit_offset, true);
        }
        for number in (self.bits + 1)..=(BLOCK_BIT_SIZE as u32) {
            let (byte_index, bit_offset) = Self::decompress(number);
            block[byte_index].set_bit(bit_offset, true);
        }
        io.write_block(self.block_id, &block)
    }
}
