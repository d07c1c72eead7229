// @author:    olinex
// @time:      2023/11/22

// self mods

// use other mods
use alloc::string::{String, ToString};
use alloc::vec::Vec;

// use self mods
use crate::configs::MAX_NAME_BYTE_SIZE;
use crate::{read_u16, read_u32, write_u16, write_u32, FsError, Result};

pub const DIR_ENTRY_HEADER_BYTE_SIZE: usize = 8;
pub const SELF_NAME: &str = ".";
pub const PARENT_NAME: &str = "..";

/// Round up to the next multiple of four
#[inline(always)]
pub fn align4(value: usize) -> usize {
    (value + 3) & !3
}

/// The smallest record which can hold a name of the length
#[inline(always)]
pub fn min_record_len(name_len: usize) -> usize {
    align4(DIR_ENTRY_HEADER_BYTE_SIZE + name_len)
}

/// Check the name can be stored in a directory entry
pub fn validate_name(name: &str) -> Result<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty()
        || bytes.len() > MAX_NAME_BYTE_SIZE
        || bytes.iter().any(|byte| *byte == b'/' || *byte == 0)
    {
        Err(FsError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// A decoded directory entry:
/// ```text
/// inode(4) rec_len(2) name_len(1) file_type(1) name(name_len) padding
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub rec_len: u16,
    pub file_type: u8,
    pub name: Vec<u8>,
}
impl DirEntry {
    /// Decode the entry which starts at the offset
    ///
    /// # Returns
    /// * Ok(entry)
    /// * Err(DataOutOfBounds)
    pub fn decode(bytes: &[u8], offset: usize) -> Result<Self> {
        if offset + DIR_ENTRY_HEADER_BYTE_SIZE > bytes.len() {
            return Err(FsError::DataOutOfBounds);
        }
        let name_len = bytes[offset + 6] as usize;
        let name_start = offset + DIR_ENTRY_HEADER_BYTE_SIZE;
        if name_start + name_len > bytes.len() {
            return Err(FsError::DataOutOfBounds);
        }
        Ok(Self {
            inode: read_u32(bytes, offset),
            rec_len: read_u16(bytes, offset + 4),
            file_type: bytes[offset + 7],
            name: bytes[name_start..name_start + name_len].to_vec(),
        })
    }

    /// Encode the entry at the offset, the padding behind the name is zeroed
    pub fn encode(&self, bytes: &mut [u8], offset: usize) -> Result<()> {
        let end = offset + min_record_len(self.name.len());
        if end > bytes.len() || self.name.len() > MAX_NAME_BYTE_SIZE {
            return Err(FsError::DataOutOfBounds);
        }
        write_u32(bytes, offset, self.inode);
        write_u16(bytes, offset + 4, self.rec_len);
        bytes[offset + 6] = self.name.len() as u8;
        bytes[offset + 7] = self.file_type;
        let name_start = offset + DIR_ENTRY_HEADER_BYTE_SIZE;
        bytes[name_start..name_start + self.name.len()].copy_from_slice(&self.name);
        bytes[name_start + self.name.len()..end].fill(0);
        Ok(())
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_slice() == name.as_bytes()
    }

    pub fn name_str(&self) -> Result<&str> {
        Ok(core::str::from_utf8(&self.name)?)
    }

    pub fn is_dot(&self) -> bool {
        self.is_named(SELF_NAME) || self.is_named(PARENT_NAME)
    }
}

/// The single block of a directory, walked as a chain of variable-length records.
/// The record lengths of the chain always add up to the block size,
/// a record whose inode is zero is free space.
pub struct DirBlock<'a> {
    /// the inode number of the directory, used for error reporting
    owner: u32,
    bytes: &'a mut [u8],
}
impl<'a> DirBlock<'a> {
    pub fn new(owner: u32, bytes: &'a mut [u8]) -> Self {
        Self { owner, bytes }
    }

    fn corrupted(&self, offset: usize) -> FsError {
        error!(
            "directory {} has a broken record at offset {}",
            self.owner, offset
        );
        FsError::CorruptedDirectory(self.owner)
    }

    /// Write the `.` and `..` records of a fresh directory block
    pub fn initialize(&mut self, self_inode: u32, parent_inode: u32, dir_tag: u8) -> Result<()> {
        self.bytes.fill(0);
        let self_len = min_record_len(SELF_NAME.len());
        DirEntry {
            inode: self_inode,
            rec_len: self_len as u16,
            file_type: dir_tag,
            name: SELF_NAME.as_bytes().to_vec(),
        }
        .encode(self.bytes, 0)?;
        DirEntry {
            inode: parent_inode,
            rec_len: (self.bytes.len() - self_len) as u16,
            file_type: dir_tag,
            name: PARENT_NAME.as_bytes().to_vec(),
        }
        .encode(self.bytes, self_len)
    }

    /// Walk every record of the chain, free records included.
    /// The walk stops at the end of the block or at a record length of zero.
    ///
    /// # Returns
    /// * Ok(Vec<(offset, entry)>)
    /// * Err(CorruptedDirectory(owner))
    pub fn records(&self) -> Result<Vec<(usize, DirEntry)>> {
        let mut records = Vec::new();
        let mut offset = 0;
        while offset + DIR_ENTRY_HEADER_BYTE_SIZE <= self.bytes.len() {
            let entry = DirEntry::decode(&*self.bytes, offset).map_err(|_| self.corrupted(offset))?;
            let rec_len = entry.rec_len as usize;
            if rec_len == 0 {
                break;
            }
            if rec_len % 4 != 0
                || rec_len < min_record_len(entry.name.len())
                || offset + rec_len > self.bytes.len()
            {
                return Err(self.corrupted(offset));
            }
            records.push((offset, entry));
            offset += rec_len;
        }
        Ok(records)
    }

    /// The live entries in block order
    pub fn entries(&self) -> Result<Vec<DirEntry>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|(_, entry)| entry.inode != 0)
            .map(|(_, entry)| entry)
            .collect())
    }

    /// Find the live entry of the name
    ///
    /// # Returns
    /// * Ok(Some((offset, entry)))
    /// * Ok(None)
    /// * Err(CorruptedDirectory(owner))
    pub fn find(&self, name: &str) -> Result<Option<(usize, DirEntry)>> {
        Ok(self
            .records()?
            .into_iter()
            .find(|(_, entry)| entry.inode != 0 && entry.is_named(name)))
    }

    /// Check the directory only holds `.` and `..`
    pub fn is_empty_dir(&self) -> Result<bool> {
        Ok(self.entries()?.iter().all(|entry| entry.is_dot()))
    }

    /// Insert a new entry by splitting the last live record:
    /// the last record shrinks to its minimal length and the new record takes the rest of its span.
    ///
    /// # Arguments
    /// * name: the name of the new entry
    /// * inode: the inode number the entry points to
    /// * file_type: the directory entry type tag
    ///
    /// # Returns
    /// * Ok(offset of the new record)
    /// * Err(InvalidName | DuplicatedName | DirectoryFull | CorruptedDirectory)
    pub fn insert(&mut self, name: &str, inode: u32, file_type: u8) -> Result<usize> {
        validate_name(name)?;
        let records = self.records()?;
        if records
            .iter()
            .any(|(_, entry)| entry.inode != 0 && entry.is_named(name))
        {
            return Err(FsError::DuplicatedName(name.to_string(), self.owner));
        }
        let new_len = min_record_len(name.len());
        let mut new_entry = DirEntry {
            inode,
            rec_len: 0,
            file_type,
            name: name.as_bytes().to_vec(),
        };
        let last = records.iter().rev().find(|(_, entry)| entry.inode != 0);
        let offset = match (last, records.first()) {
            (Some((offset, old)), _) => {
                let old_len = min_record_len(old.name.len());
                let rec_len = old.rec_len as usize;
                if rec_len < old_len + new_len {
                    return Err(FsError::DirectoryFull(self.owner));
                }
                let mut shrunk = old.clone();
                shrunk.rec_len = old_len as u16;
                shrunk.encode(self.bytes, *offset)?;
                new_entry.rec_len = (rec_len - old_len) as u16;
                offset + old_len
            }
            // every record is free, reuse the first one as a whole
            (None, Some((offset, free))) => {
                if (free.rec_len as usize) < new_len {
                    return Err(FsError::DirectoryFull(self.owner));
                }
                new_entry.rec_len = free.rec_len;
                *offset
            }
            // an empty chain, the new record spans the whole block
            (None, None) => {
                new_entry.rec_len = self.bytes.len() as u16;
                0
            }
        };
        let end = offset + new_entry.rec_len as usize;
        self.bytes[offset..end].fill(0);
        new_entry.encode(self.bytes, offset)?;
        Ok(offset)
    }

    /// Remove the live entry of the name.
    /// Its span is absorbed by the record right before it and zeroed,
    /// the first record of the block keeps its span and only loses its inode and name.
    ///
    /// # Returns
    /// * Ok(removed entry)
    /// * Err(NameDoesNotExist | CorruptedDirectory)
    pub fn remove(&mut self, name: &str) -> Result<DirEntry> {
        let records = self.records()?;
        let position = records
            .iter()
            .position(|(_, entry)| entry.inode != 0 && entry.is_named(name))
            .ok_or_else(|| FsError::NameDoesNotExist(name.to_string(), self.owner))?;
        let (offset, target) = &records[position];
        let end = offset + target.rec_len as usize;
        if position > 0 {
            let (prev_offset, prev) = &records[position - 1];
            let mut merged = prev.clone();
            merged.rec_len += target.rec_len;
            self.bytes[*offset..end].fill(0);
            write_u16(self.bytes, prev_offset + 4, merged.rec_len);
        } else {
            write_u32(self.bytes, *offset, 0);
            self.bytes[offset + 6..end].fill(0);
        }
        Ok(target.clone())
    }

    /// Point an existing live entry to another inode
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(NameDoesNotExist | CorruptedDirectory)
    pub fn retarget(&mut self, name: &str, inode: u32) -> Result<()> {
        let (offset, _) = self
            .find(name)?
            .ok_or_else(|| FsError::NameDoesNotExist(name.to_string(), self.owner))?;
        write_u32(self.bytes, offset, inode);
        Ok(())
    }

    /// The names of the live entries, dots excluded
    pub fn names(&self) -> Result<Vec<String>> {
        self.entries()?
            .iter()
            .filter(|entry| !entry.is_dot())
            .map(|entry| Ok(entry.name_str()?.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::BLOCK_BYTE_SIZE;

    const DIR_TAG: u8 = 2;
    const FILE_TAG: u8 = 1;

    fn fresh_block() -> [u8; BLOCK_BYTE_SIZE] {
        let mut bytes = [0u8; BLOCK_BYTE_SIZE];
        DirBlock::new(2, &mut bytes)
            .initialize(2, 2, DIR_TAG)
            .unwrap();
        bytes
    }

    #[test]
    fn test_align_and_min_record_len() {
        assert_eq!(0, align4(0));
        assert_eq!(4, align4(1));
        assert_eq!(8, align4(8));
        assert_eq!(12, min_record_len(1));
        assert_eq!(12, min_record_len(4));
        assert_eq!(16, min_record_len(5));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("hello").is_ok());
        assert!(validate_name("").is_err_and(|e| e.is_invalidname()));
        assert!(validate_name("a/b").is_err_and(|e| e.is_invalidname()));
        assert!(validate_name("a\0").is_err_and(|e| e.is_invalidname()));
        assert!(validate_name(&"x".repeat(256)).is_err_and(|e| e.is_invalidname()));
    }

    #[test]
    fn test_dir_block_initialize() {
        let mut bytes = fresh_block();
        let block = DirBlock::new(2, &mut bytes);
        let records = block.records().unwrap();
        assert_eq!(2, records.len());
        assert_eq!(0, records[0].0);
        assert_eq!(12, records[0].1.rec_len);
        assert!(records[0].1.is_named("."));
        assert_eq!(12, records[1].0);
        assert_eq!(BLOCK_BYTE_SIZE - 12, records[1].1.rec_len as usize);
        assert!(records[1].1.is_named(".."));
        assert!(block.is_empty_dir().is_ok_and(|v| v));
        assert!(block.names().is_ok_and(|names| names.is_empty()));
    }

    #[test]
    fn test_dir_block_insert_and_find() {
        let mut bytes = fresh_block();
        let mut block = DirBlock::new(2, &mut bytes);
        assert!(block.find("hello").is_ok_and(|v| v.is_none()));
        assert!(block.insert("hello", 12, FILE_TAG).is_ok_and(|offset| offset == 24));
        assert!(block
            .find("hello")
            .is_ok_and(|v| v.is_some_and(|(offset, entry)| offset == 24
                && entry.inode == 12
                && entry.file_type == FILE_TAG
                && entry.rec_len as usize == BLOCK_BYTE_SIZE - 24)));
        assert!(block.find("hell").is_ok_and(|v| v.is_none()));
        assert!(block.find("hello!").is_ok_and(|v| v.is_none()));
        assert!(block
            .insert("hello", 13, FILE_TAG)
            .is_err_and(|e| e.is_duplicatedname()));
        assert!(block.insert("a", 13, FILE_TAG).is_ok_and(|offset| offset == 40));
        let records = block.records().unwrap();
        assert_eq!(12, records[1].1.rec_len);
        assert_eq!(16, records[2].1.rec_len);
        assert_eq!(BLOCK_BYTE_SIZE - 40, records[3].1.rec_len as usize);
        let total: usize = records.iter().map(|(_, e)| e.rec_len as usize).sum();
        assert_eq!(BLOCK_BYTE_SIZE, total);
        assert!(block.is_empty_dir().is_ok_and(|v| !v));
        assert_eq!(vec!["hello", "a"], block.names().unwrap());
    }

    #[test]
    fn test_dir_block_insert_then_remove_restores_bytes() {
        let mut bytes = fresh_block();
        DirBlock::new(2, &mut bytes)
            .insert("first", 20, FILE_TAG)
            .unwrap();
        let before = bytes;
        let mut block = DirBlock::new(2, &mut bytes);
        block.insert("some_longer_name.txt", 21, FILE_TAG).unwrap();
        assert!(block
            .remove("some_longer_name.txt")
            .is_ok_and(|entry| entry.inode == 21));
        assert_eq!(before, bytes);
    }

    #[test]
    fn test_dir_block_remove_middle_entry() {
        let mut bytes = fresh_block();
        let mut block = DirBlock::new(2, &mut bytes);
        block.insert("a", 20, FILE_TAG).unwrap();
        block.insert("b", 21, FILE_TAG).unwrap();
        block.insert("c", 22, FILE_TAG).unwrap();
        assert!(block.remove("b").is_ok());
        assert!(block.find("b").is_ok_and(|v| v.is_none()));
        assert!(block.find("c").is_ok_and(|v| v.is_some_and(|(_, e)| e.inode == 22)));
        let records = block.records().unwrap();
        // the record of `a` swallowed the span of `b`
        assert_eq!(24, records[2].1.rec_len);
        assert!(block
            .remove("b")
            .is_err_and(|e| e.is_namedoesnotexist() && e.is_missing()));
        let total: usize = records.iter().map(|(_, e)| e.rec_len as usize).sum();
        assert_eq!(BLOCK_BYTE_SIZE, total);
        // the slack in `a` is reused by the next insert only through the last record
        assert!(block.insert("d", 23, FILE_TAG).is_ok_and(|offset| offset == 60));
    }

    #[test]
    fn test_dir_block_remove_first_record_keeps_chain() {
        let mut bytes = fresh_block();
        let mut block = DirBlock::new(2, &mut bytes);
        assert!(block.remove(".").is_ok());
        let records = block.records().unwrap();
        assert_eq!(2, records.len());
        assert_eq!(0, records[0].1.inode);
        assert_eq!(12, records[0].1.rec_len);
        assert!(block.find(".").is_ok_and(|v| v.is_none()));
        assert!(block.find("..").is_ok_and(|v| v.is_some()));
    }

    #[test]
    fn test_dir_block_full() {
        let mut bytes = fresh_block();
        let mut block = DirBlock::new(2, &mut bytes);
        let mut count = 0;
        loop {
            let name = format!("file{:03}", count);
            match block.insert(&name, 100 + count, FILE_TAG) {
                Ok(_) => count += 1,
                Err(err) => {
                    assert!(err.is_directoryfull() && err.is_exhausted());
                    break;
                }
            }
        }
        // 16 bytes per record after the two dot records
        assert_eq!(((BLOCK_BYTE_SIZE - 24) / 16) as u32, count);
        let total: usize = block
            .records()
            .unwrap()
            .iter()
            .map(|(_, e)| e.rec_len as usize)
            .sum();
        assert_eq!(BLOCK_BYTE_SIZE, total);
    }

    #[test]
    fn test_dir_block_empty_chain_and_corruption() {
        let mut bytes = [0u8; BLOCK_BYTE_SIZE];
        let mut block = DirBlock::new(3, &mut bytes);
        assert!(block.records().is_ok_and(|r| r.is_empty()));
        assert!(block.insert("x", 9, FILE_TAG).is_ok_and(|offset| offset == 0));
        assert!(block
            .find("x")
            .is_ok_and(|v| v.is_some_and(|(_, e)| e.rec_len as usize == BLOCK_BYTE_SIZE)));

        let mut broken = [0u8; BLOCK_BYTE_SIZE];
        write_u32(&mut broken, 0, 5);
        write_u16(&mut broken, 4, 2048);
        let block = DirBlock::new(3, &mut broken);
        assert!(block
            .records()
            .is_err_and(|e| e.is_corrupteddirectory() && e.is_fatal()));
    }

    #[test]
    fn test_dir_block_retarget() {
        let mut bytes = fresh_block();
        let mut block = DirBlock::new(12, &mut bytes);
        assert!(block.retarget("..", 30).is_ok());
        assert!(block
            .find("..")
            .is_ok_and(|v| v.is_some_and(|(_, e)| e.inode == 30)));
        assert!(block
            .retarget("nothing", 30)
            .is_err_and(|e| e.is_namedoesnotexist()));
    }
}
