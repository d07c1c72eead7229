// @author:    olinex
// @time:      2023/12/02

// self mods

// use other mods
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

// use self mods
use crate::configs::{MAX_SYSTEM_OPEN_FILES, PAGE_BYTE_SIZE, PIPE_BUFFER_BYTE_SIZE};
use crate::{FsError, OpenFlags, Result};

/// The bytes of an open object, shared between the table and the descriptors
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// The kinds of the objects the table keeps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Pipe,
    Socket,
}

/// An ipv4 address with a port
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: [u8; 4],
    pub port: u16,
}

/// The index of an entry in the object table
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectHandle(pub usize);

/// One open object
#[derive(Clone, Debug)]
pub struct GotEntry {
    /// the process which opened the object
    pub pid: u32,
    /// zero for the objects which don't live on disk
    pub inode: u32,
    pub kind: ObjectKind,
    pub flags: OpenFlags,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub byte_size: usize,
    pub buffer: SharedBuffer,
    pub pages: usize,
    /// bytes in flight of a pipe or a socket
    pub kernel_buffer: Option<Arc<Mutex<VecDeque<u8>>>>,
    pub name: String,
    pub read_offset: usize,
    pub write_offset: usize,
    /// pid of the write lock holder, zero when unlocked
    pub lock: u32,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub ref_count: usize,
}
impl GotEntry {
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.lock != 0
    }
}

/// What the caller knows about an object it wants to insert
#[derive(Clone, Debug)]
pub struct NewObject {
    pub pid: u32,
    pub inode: u32,
    pub kind: ObjectKind,
    pub flags: OpenFlags,
    pub name: String,
    pub content: Vec<u8>,
    pub source: Endpoint,
    pub destination: Endpoint,
    /// take the write lock at once if nobody holds it
    pub lock: bool,
}
impl NewObject {
    /// An object backed by a file on disk
    pub fn file(pid: u32, inode: u32, name: &str, flags: OpenFlags, content: Vec<u8>) -> Self {
        Self {
            pid,
            inode,
            kind: ObjectKind::File,
            flags,
            name: String::from(name),
            content,
            source: Endpoint::default(),
            destination: Endpoint::default(),
            lock: flags.is_writable(),
        }
    }

    /// An object which only lives in the kernel, pipes and sockets
    pub fn stream(
        pid: u32,
        kind: ObjectKind,
        name: &str,
        source: Endpoint,
        destination: Endpoint,
    ) -> Self {
        Self {
            pid,
            inode: 0,
            kind,
            flags: OpenFlags::RW,
            name: String::from(name),
            content: Vec::new(),
            source,
            destination,
            lock: false,
        }
    }
}

fn pages_of(byte_size: usize) -> usize {
    (byte_size + PAGE_BYTE_SIZE - 1) / PAGE_BYTE_SIZE
}

/// The kernel wide table of the open files, pipes and sockets.
/// The whole table sits behind one lock, which is held only for the length of a call.
pub struct ObjectTable {
    slots: Mutex<Vec<Option<GotEntry>>>,
}
impl ObjectTable {
    pub fn new() -> Self {
        Self::with_capacity(MAX_SYSTEM_OPEN_FILES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: Mutex::new(slots),
        }
    }

    fn available(slots: &[Option<GotEntry>], inode: u32) -> bool {
        !slots
            .iter()
            .flatten()
            .any(|entry| entry.inode == inode && entry.is_locked())
    }

    /// The open entry of the named pipe or socket
    fn open_stream(slots: &[Option<GotEntry>], inode: u32) -> Option<&GotEntry> {
        if inode == 0 {
            return None;
        }
        slots
            .iter()
            .flatten()
            .find(|entry| entry.inode == inode && entry.kernel_buffer.is_some())
    }

    /// Put the object into the first free slot.
    /// The reference count starts at one, the lock is taken only when it is asked and free.
    ///
    /// # Returns
    /// * Ok(handle)
    /// * Err(ObjectTableFull)
    pub fn insert(&self, object: NewObject) -> Result<ObjectHandle> {
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(FsError::ObjectTableFull)?;
        let lock = if !object.lock || object.inode == 0 || object.kind != ObjectKind::File {
            0
        } else if Self::available(&slots, object.inode) {
            object.pid
        } else {
            warn!(
                "process {} opens locked inode {} without the write lock",
                object.pid, object.inode
            );
            0
        };
        let (kernel_buffer, source, destination) = match object.kind {
            ObjectKind::File => (None, object.source, object.destination),
            ObjectKind::Pipe | ObjectKind::Socket => {
                match Self::open_stream(&slots, object.inode) {
                    // a named stream opened again joins the bytes in flight
                    Some(stream) => (
                        stream.kernel_buffer.clone(),
                        stream.source,
                        stream.destination,
                    ),
                    None => (
                        Some(Arc::new(Mutex::new(VecDeque::new()))),
                        object.source,
                        object.destination,
                    ),
                }
            }
        };
        let byte_size = object.content.len();
        slots[index] = Some(GotEntry {
            pid: object.pid,
            inode: object.inode,
            kind: object.kind,
            flags: object.flags,
            source,
            destination,
            byte_size,
            pages: pages_of(byte_size),
            buffer: Arc::new(Mutex::new(object.content)),
            kernel_buffer,
            name: object.name,
            read_offset: 0,
            write_offset: 0,
            lock,
            tx_packets: 0,
            rx_packets: 0,
            ref_count: 1,
        });
        debug!("insert object {} for process {}", index, object.pid);
        Ok(ObjectHandle(index))
    }

    /// Run the closure on the entry of the handle
    fn with_entry<V>(
        &self,
        handle: ObjectHandle,
        f: impl FnOnce(&mut GotEntry) -> Result<V>,
    ) -> Result<V> {
        let mut slots = self.slots.lock();
        match slots.get_mut(handle.0) {
            Some(Some(entry)) => f(entry),
            _ => Err(FsError::BadHandle(handle.0)),
        }
    }

    /// Check no entry of the inode holds the write lock
    pub fn file_available_to_be_locked(&self, inode: u32) -> bool {
        Self::available(&self.slots.lock(), inode)
    }

    /// The pid which holds the write lock of the inode
    pub fn lock_holder(&self, inode: u32) -> Option<u32> {
        self.slots
            .lock()
            .iter()
            .flatten()
            .find(|entry| entry.inode == inode && entry.is_locked())
            .map(|entry| entry.lock)
    }

    /// Take the write lock of the inode for the process.
    /// The entry opened by the process is preferred, else the first entry of the inode.
    ///
    /// # Returns
    /// * true: the lock was free and now belongs to the process
    /// * false: the lock is held or the inode is not open
    pub fn lock_file(&self, pid: u32, inode: u32) -> bool {
        let mut slots = self.slots.lock();
        if !Self::available(&slots, inode) {
            return false;
        }
        let position = slots
            .iter()
            .position(|slot| {
                slot.as_ref()
                    .is_some_and(|entry| entry.inode == inode && entry.pid == pid)
            })
            .or_else(|| {
                slots.iter().position(|slot| {
                    slot.as_ref().is_some_and(|entry| entry.inode == inode)
                })
            });
        let Some(index) = position else {
            return false;
        };
        match slots[index].as_mut() {
            Some(entry) => {
                entry.lock = pid;
                debug!("process {} locks inode {}", pid, inode);
                true
            }
            None => false,
        }
    }

    /// Drop the write lock of the inode if the process holds it
    pub fn unlock_file(&self, pid: u32, inode: u32) -> bool {
        let mut slots = self.slots.lock();
        let mut released = false;
        for entry in slots.iter_mut().flatten() {
            if entry.inode == inode && entry.lock == pid {
                entry.lock = 0;
                released = true;
            }
        }
        released
    }

    /// Another reference to the entry, for duplicated descriptors
    pub fn retain(&self, handle: ObjectHandle) -> Result<()> {
        self.with_entry(handle, |entry| {
            entry.ref_count += 1;
            Ok(())
        })
    }

    /// Drop one reference of the entry.
    /// The write lock goes away with the slot, when the last reference is dropped.
    ///
    /// # Returns
    /// * Ok(true): the slot was freed
    /// * Ok(false): other references are left
    /// * Err(BadHandle)
    pub fn close(&self, handle: ObjectHandle, pid: u32) -> Result<bool> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(handle.0)
            .ok_or(FsError::BadHandle(handle.0))?;
        let entry = slot.as_mut().ok_or(FsError::BadHandle(handle.0))?;
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            if entry.is_locked() {
                debug!("process {} unlocks inode {}", pid, entry.inode);
            }
            *slot = None;
            debug!("free object {}", handle.0);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Cut every entry loose from the inode, after the inode was released on disk.
    /// The entries stay open but are no longer bound to any file, nor locked.
    ///
    /// # Returns
    /// * the count of the detached entries
    pub fn detach_inode(&self, inode: u32) -> usize {
        if inode == 0 {
            return 0;
        }
        let mut slots = self.slots.lock();
        let mut count = 0;
        for entry in slots.iter_mut().flatten() {
            if entry.inode == inode {
                entry.inode = 0;
                entry.lock = 0;
                count += 1;
            }
        }
        count
    }

    /// Drop every write lock held by the process
    ///
    /// # Returns
    /// * the count of released locks
    pub fn release_process(&self, pid: u32) -> usize {
        let mut slots = self.slots.lock();
        let mut count = 0;
        for entry in slots.iter_mut().flatten() {
            if entry.lock == pid {
                entry.lock = 0;
                count += 1;
            }
        }
        count
    }

    /// Read from the object into the buffer.
    /// Files are read from the read offset, pipes and sockets are drained.
    ///
    /// # Returns
    /// * Ok(count of bytes read)
    /// * Err(BadHandle)
    pub fn read(&self, handle: ObjectHandle, buf: &mut [u8]) -> Result<usize> {
        self.with_entry(handle, |entry| match &entry.kernel_buffer {
            None => {
                let data = entry.buffer.lock();
                let start = entry.read_offset.min(entry.byte_size);
                let count = buf.len().min(entry.byte_size - start);
                buf[..count].copy_from_slice(&data[start..start + count]);
                drop(data);
                entry.read_offset = start + count;
                Ok(count)
            }
            Some(queue) => {
                let mut queue = queue.lock();
                let count = buf.len().min(queue.len());
                for (byte, value) in buf.iter_mut().zip(queue.drain(..count)) {
                    *byte = value;
                }
                drop(queue);
                entry.read_offset += count;
                if entry.kind == ObjectKind::Socket && count > 0 {
                    entry.rx_packets += 1;
                }
                Ok(count)
            }
        })
    }

    /// Write the data into the object.
    /// Files grow at the write offset, pipes and sockets are bounded by [`PIPE_BUFFER_BYTE_SIZE`].
    ///
    /// # Returns
    /// * Ok(count of bytes written)
    /// * Err(BadHandle | BufferFull)
    pub fn write(&self, handle: ObjectHandle, data: &[u8]) -> Result<usize> {
        self.with_entry(handle, |entry| match &entry.kernel_buffer {
            None => {
                let mut buffer = entry.buffer.lock();
                let start = entry.write_offset;
                let end = start + data.len();
                if buffer.len() < end {
                    buffer.resize(end, 0);
                }
                buffer[start..end].copy_from_slice(data);
                drop(buffer);
                entry.write_offset = end;
                entry.byte_size = entry.byte_size.max(end);
                entry.pages = pages_of(entry.byte_size);
                Ok(data.len())
            }
            Some(queue) => {
                let mut queue = queue.lock();
                if queue.len() + data.len() > PIPE_BUFFER_BYTE_SIZE {
                    return Err(FsError::BufferFull(handle.0));
                }
                queue.extend(data.iter());
                drop(queue);
                entry.write_offset += data.len();
                if entry.kind == ObjectKind::Socket && !data.is_empty() {
                    entry.tx_packets += 1;
                }
                Ok(data.len())
            }
        })
    }

    /// A copy of the entry for diagnostics, the buffers stay shared
    pub fn entry(&self, handle: ObjectHandle) -> Result<GotEntry> {
        self.with_entry(handle, |entry| Ok(entry.clone()))
    }

    /// The count of the used slots
    pub fn len(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref GLOBAL_OBJECT_TABLE: Arc<ObjectTable> = Arc::new(ObjectTable::new());
}
