// @author:    olinex
// @time:      2023/12/02

// self mods

// use other mods
use alloc::vec::Vec;

// use self mods
use super::table::{ObjectHandle, SharedBuffer};
use crate::configs::MAX_PROCESS_OPEN_FILES;
use crate::{FsError, Result};

/// The view a process keeps of an open object
#[derive(Clone, Debug)]
pub struct OpenBuffer {
    pub handle: ObjectHandle,
    pub buffer: SharedBuffer,
    pub byte_size: usize,
}

/// The open buffer table of one process, the index is the file descriptor
pub struct DescriptorTable {
    pid: u32,
    slots: Vec<Option<OpenBuffer>>,
}
impl DescriptorTable {
    pub fn new(pid: u32) -> Self {
        Self::with_capacity(pid, MAX_PROCESS_OPEN_FILES)
    }

    pub fn with_capacity(pid: u32, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { pid, slots }
    }

    /// Publish the object in the first free descriptor
    ///
    /// # Returns
    /// * Ok(fd)
    /// * Err(DescriptorTableFull(pid))
    pub fn install(
        &mut self,
        handle: ObjectHandle,
        buffer: SharedBuffer,
        byte_size: usize,
    ) -> Result<usize> {
        let fd = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(FsError::DescriptorTableFull(self.pid))?;
        self.slots[fd] = Some(OpenBuffer {
            handle,
            buffer,
            byte_size,
        });
        Ok(fd)
    }

    pub fn get(&self, fd: usize) -> Result<&OpenBuffer> {
        self.slots
            .get(fd)
            .and_then(|slot| slot.as_ref())
            .ok_or(FsError::BadDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenBuffer> {
        self.slots
            .get_mut(fd)
            .and_then(|slot| slot.as_mut())
            .ok_or(FsError::BadDescriptor(fd))
    }

    /// Take the descriptor out of the table
    pub fn remove(&mut self, fd: usize) -> Result<OpenBuffer> {
        self.slots
            .get_mut(fd)
            .and_then(|slot| slot.take())
            .ok_or(FsError::BadDescriptor(fd))
    }

    /// Take every descriptor out of the table, in descriptor order
    pub fn drain(&mut self) -> Vec<(usize, OpenBuffer)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(fd, slot)| slot.take().map(|buffer| (fd, buffer)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
