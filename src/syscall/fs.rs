// @author:    olinex
// @time:      2023/12/05

// self mods

// use other mods
use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

// use self mods
use crate::got::{
    DescriptorTable, Endpoint, NewObject, ObjectHandle, ObjectKind, ObjectTable, OpenBuffer,
    GLOBAL_OBJECT_TABLE,
};
use crate::layout::{validate_name, DiskInode, FileType, Permission, PARENT_NAME, SELF_NAME};
use crate::vfs::Ext2Fs;
use crate::{FsError, OpenFlags, Result};

const FILE_PERMISSION: u16 = 0o644;
const DIRECTORY_PERMISSION: u16 = 0o755;

/// The caller of a file system syscall
pub struct Process {
    pid: u32,
    cwd: Mutex<u32>,
    files: Mutex<DescriptorTable>,
}
impl Process {
    pub fn new(pid: u32, cwd: u32) -> Self {
        Self {
            pid,
            cwd: Mutex::new(cwd),
            files: Mutex::new(DescriptorTable::new(pid)),
        }
    }

    #[inline(always)]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The inode number of the working directory
    pub fn cwd(&self) -> u32 {
        *self.cwd.lock()
    }

    pub fn files(&self) -> MutexGuard<'_, DescriptorTable> {
        self.files.lock()
    }
}

/// Only the owner bits are checked
fn check_permission(number: u32, inode: &DiskInode, flags: OpenFlags) -> Result<()> {
    let permission = inode.permission();
    if (flags.is_readable() && !permission.contains(Permission::OWNER_READ))
        || (flags.is_writable() && !permission.contains(Permission::OWNER_WRITE))
        || (flags.is_execute() && !permission.contains(Permission::OWNER_EXECUTE))
    {
        Err(FsError::PermissionDenied(number))
    } else {
        Ok(())
    }
}

fn check_not_dot(name: &str) -> Result<()> {
    if name == SELF_NAME || name == PARENT_NAME {
        Err(FsError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// The file system half of the kernel: the mounted file system and the object table.
/// A handler holds the file system lock for its whole length,
/// the object table and the descriptor tables are locked per call.
pub struct Kernel {
    fs: Mutex<Box<Ext2Fs>>,
    objects: Arc<ObjectTable>,
}
impl Kernel {
    /// Serve the file system with the kernel wide object table
    pub fn new(fs: Box<Ext2Fs>) -> Self {
        Self::with_object_table(fs, GLOBAL_OBJECT_TABLE.clone())
    }

    pub fn with_object_table(fs: Box<Ext2Fs>, objects: Arc<ObjectTable>) -> Self {
        Self {
            fs: Mutex::new(fs),
            objects,
        }
    }

    pub fn fs(&self) -> MutexGuard<'_, Box<Ext2Fs>> {
        self.fs.lock()
    }

    pub fn objects(&self) -> &Arc<ObjectTable> {
        &self.objects
    }

    /// Publish the object in the descriptor table of the process.
    /// The object is closed again when the process has no free descriptor.
    fn publish(&self, process: &Process, handle: ObjectHandle) -> Result<usize> {
        let entry = self.objects.entry(handle)?;
        let installed = process
            .files()
            .install(handle, entry.buffer, entry.byte_size);
        if installed.is_err() {
            self.objects.close(handle, process.pid())?;
        }
        installed
    }

    /// Check the directory can take a new entry of the name
    fn check_new_entry(fs: &mut Ext2Fs, dir: u32, name: &str) -> Result<()> {
        validate_name(name)?;
        check_not_dot(name)?;
        if !fs.load_inode(dir)?.permission().contains(Permission::OWNER_WRITE) {
            return Err(FsError::PermissionDenied(dir));
        }
        if fs.find_entry(dir, name).is_ok() {
            return Err(FsError::DuplicatedName(name.to_string(), dir));
        }
        Ok(())
    }

    /// Walk the `..` entries from the directory up to the root,
    /// the directory must not lie below the ancestor.
    fn check_not_below(fs: &mut Ext2Fs, ancestor: u32, dir: u32, path: &str) -> Result<()> {
        let mut current = dir;
        for _ in 0..fs.super_block().inodes_count {
            if current == ancestor {
                return Err(FsError::InvalidDirectory(path.to_string()));
            }
            let parent = fs.find_entry(current, PARENT_NAME)?;
            if parent == current {
                return Ok(());
            }
            current = parent;
        }
        Err(FsError::CorruptedDirectory(current))
    }

    /// Open the file of the path.
    /// A write open takes the write lock when it is free,
    /// else it goes on without the lock unless the mount asks for strict locking.
    ///
    /// # Returns
    /// * Ok(fd)
    /// * Err(PathNotFound | NotAFile | PermissionDenied | WriteLocked | ObjectTableFull | DescriptorTableFull | ...)
    pub fn open(&self, process: &Process, name: &str, flags: OpenFlags) -> Result<usize> {
        let mut fs = self.fs.lock();
        let number = fs.resolve_from(process.cwd(), name)?;
        let inode = fs.load_inode(number)?;
        let kind = match inode.file_type() {
            FileType::Regular => ObjectKind::File,
            FileType::Pipe => ObjectKind::Pipe,
            FileType::Socket => ObjectKind::Socket,
            FileType::Directory | FileType::Unknown => return Err(FsError::NotAFile(number)),
        };
        check_permission(number, &inode, flags)?;
        if kind == ObjectKind::File && flags.is_writable() {
            if let Some(holder) = self.objects.lock_holder(number) {
                if fs.options().strict_write_lock {
                    return Err(FsError::WriteLocked(number, holder));
                }
                warn!(
                    "process {} opens `{}` for writing while process {} holds the lock",
                    process.pid(),
                    name,
                    holder
                );
            }
        }
        let content = match kind {
            ObjectKind::File => fs.read_file(&inode)?,
            ObjectKind::Pipe | ObjectKind::Socket => Vec::new(),
        };
        drop(fs);
        let mut object = NewObject::file(process.pid(), number, name, flags, content);
        object.kind = kind;
        let handle = self.objects.insert(object)?;
        self.publish(process, handle)
    }

    /// Publish an anonymous buffer which lives only in memory,
    /// it is the usual source of `create`.
    pub fn open_buffer(&self, process: &Process, name: &str, content: Vec<u8>) -> Result<usize> {
        let handle = self.objects.insert(NewObject::file(
            process.pid(),
            0,
            name,
            OpenFlags::RW,
            content,
        ))?;
        self.publish(process, handle)
    }

    /// Create a regular file whose content is the buffer of the source descriptor
    ///
    /// # Returns
    /// * Ok(inode number)
    /// * Err(BadDescriptor | InvalidName | DuplicatedName | PermissionDenied | DirectoryFull | BitmapExhausted | ...)
    pub fn create(&self, process: &Process, name: &str, source_fd: usize) -> Result<u32> {
        let (buffer, byte_size) = {
            let files = process.files();
            let source = files.get(source_fd)?;
            (source.buffer.clone(), source.byte_size)
        };
        let mut content = buffer.lock().clone();
        content.truncate(byte_size);
        let mut fs = self.fs.lock();
        let (dir, leaf) = fs.resolve_parent(process.cwd(), name)?;
        Self::check_new_entry(&mut fs, dir, leaf)?;
        let (number, _) =
            fs.create_inode(FileType::Regular, Permission::from_bits_truncate(FILE_PERMISSION))?;
        let linked = fs
            .write_file(number, &content)
            .and_then(|_| fs.insert_entry(dir, leaf, number, FileType::Regular));
        if let Err(err) = linked {
            fs.discard_inode(number)?;
            return Err(err);
        }
        info!("process {} creates `{}` as inode {}", process.pid(), name, number);
        Ok(number)
    }

    /// Delete the file or the empty directory of the path.
    /// The blocks are given back when the mount options allow it.
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(PathNotFound | NameDoesNotExist | DeleteNonEmptyDirectory | WriteLocked | ...)
    pub fn delete(&self, process: &Process, name: &str) -> Result<()> {
        let mut fs = self.fs.lock();
        let (dir, leaf) = fs.resolve_parent(process.cwd(), name)?;
        check_not_dot(leaf)?;
        let number = fs.find_entry(dir, leaf)?;
        if fs.load_inode(number)?.is_dir() && !fs.is_empty_directory(number)? {
            return Err(FsError::DeleteNonEmptyDirectory(leaf.to_string(), dir));
        }
        if let Some(holder) = self.objects.lock_holder(number) {
            if holder != process.pid() {
                return Err(FsError::WriteLocked(number, holder));
            }
        }
        fs.delete_entry(dir, leaf)?;
        fs.release_inode(number)?;
        // open entries must neither store into nor lock a reused number
        let detached = self.objects.detach_inode(number);
        info!(
            "process {} deletes `{}`, {} open objects detached",
            process.pid(),
            name,
            detached
        );
        Ok(())
    }

    /// Move the entry of the name from the source directory to the destination directory.
    /// A moved directory gets its `..` entry pointed to the destination,
    /// it can't be moved into itself or below itself.
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(PathNotFound | NameDoesNotExist | InvalidDirectory | DuplicatedName | DirectoryFull | ...)
    pub fn move_file(
        &self,
        process: &Process,
        name: &str,
        source_dir: &str,
        dest_dir: &str,
    ) -> Result<()> {
        check_not_dot(name)?;
        let mut fs = self.fs.lock();
        let cwd = process.cwd();
        let source = fs.resolve_from(cwd, source_dir)?;
        let dest = fs.resolve_from(cwd, dest_dir)?;
        if !fs.load_inode(dest)?.is_dir() {
            return Err(FsError::InvalidDirectory(dest_dir.to_string()));
        }
        let entry = fs.lookup_entry(source, name)?;
        if entry.inode == dest {
            return Err(FsError::InvalidDirectory(dest_dir.to_string()));
        }
        let file_type = fs.load_inode(entry.inode)?.file_type();
        if file_type == FileType::Directory {
            Self::check_not_below(&mut fs, entry.inode, dest, dest_dir)?;
        }
        fs.insert_entry(dest, name, entry.inode, file_type)?;
        if let Err(err) = fs.delete_entry(source, name) {
            fs.delete_entry(dest, name)?;
            return Err(err);
        }
        if file_type == FileType::Directory {
            fs.set_parent_entry(entry.inode, dest)?;
        }
        info!(
            "process {} moves `{}` from `{}` to `{}`",
            process.pid(),
            name,
            source_dir,
            dest_dir
        );
        Ok(())
    }

    /// Replace the permission bits of the file of the path
    pub fn change_mode(&self, process: &Process, name: &str, mode: u16) -> Result<()> {
        let mut fs = self.fs.lock();
        let number = fs.resolve_from(process.cwd(), name)?;
        fs.change_file_mode(number, Permission::from_bits_truncate(mode))
    }

    /// Create an empty directory
    ///
    /// # Returns
    /// * Ok(inode number)
    /// * Err(InvalidName | DuplicatedName | PermissionDenied | DirectoryFull | BitmapExhausted | ...)
    pub fn make_directory(&self, process: &Process, name: &str) -> Result<u32> {
        let mut fs = self.fs.lock();
        let (dir, leaf) = fs.resolve_parent(process.cwd(), name)?;
        Self::check_new_entry(&mut fs, dir, leaf)?;
        let number =
            fs.create_directory_inode(dir, Permission::from_bits_truncate(DIRECTORY_PERMISSION))?;
        if let Err(err) = fs.insert_entry(dir, leaf, number, FileType::Directory) {
            fs.discard_inode(number)?;
            return Err(err);
        }
        Ok(number)
    }

    /// Change the working directory of the process
    ///
    /// # Returns
    /// * Ok(inode number of the new working directory)
    /// * Err(PathNotFound | InvalidDirectory | PermissionDenied | ...)
    pub fn change_directory(&self, process: &Process, path: &str) -> Result<u32> {
        let mut fs = self.fs.lock();
        let number = fs.resolve_from(process.cwd(), path)?;
        let inode = fs.load_inode(number)?;
        if !inode.is_dir() {
            return Err(FsError::InvalidDirectory(path.to_string()));
        }
        check_permission(number, &inode, OpenFlags::EXECUTE)?;
        *process.cwd.lock() = number;
        Ok(number)
    }

    /// Link a new pipe or socket inode under the name and open it
    fn create_stream(
        &self,
        process: &Process,
        name: &str,
        kind: ObjectKind,
        source: Endpoint,
        destination: Endpoint,
    ) -> Result<usize> {
        let file_type = match kind {
            ObjectKind::Pipe => FileType::Pipe,
            ObjectKind::Socket => FileType::Socket,
            ObjectKind::File => FileType::Regular,
        };
        let mut fs = self.fs.lock();
        let (dir, leaf) = fs.resolve_parent(process.cwd(), name)?;
        Self::check_new_entry(&mut fs, dir, leaf)?;
        let (number, _) =
            fs.create_inode(file_type, Permission::from_bits_truncate(FILE_PERMISSION))?;
        if let Err(err) = fs.insert_entry(dir, leaf, number, file_type) {
            fs.discard_inode(number)?;
            return Err(err);
        }
        let mut object = NewObject::stream(process.pid(), kind, name, source, destination);
        object.inode = number;
        let handle = match self.objects.insert(object) {
            Ok(handle) => handle,
            Err(err) => {
                fs.delete_entry(dir, leaf)?;
                fs.discard_inode(number)?;
                return Err(err);
            }
        };
        drop(fs);
        info!(
            "process {} creates {:?} `{}` as inode {}",
            process.pid(),
            kind,
            name,
            number
        );
        self.publish(process, handle)
    }

    /// Create a named pipe and open it,
    /// a later open of the path joins the same bytes in flight
    ///
    /// # Returns
    /// * Ok(fd)
    /// * Err(InvalidName | DuplicatedName | PermissionDenied | DirectoryFull | BitmapExhausted | ObjectTableFull | ...)
    pub fn create_pipe(&self, process: &Process, name: &str) -> Result<usize> {
        self.create_stream(
            process,
            name,
            ObjectKind::Pipe,
            Endpoint::default(),
            Endpoint::default(),
        )
    }

    /// Create a named socket between two endpoints and open it
    pub fn create_socket(
        &self,
        process: &Process,
        name: &str,
        source: Endpoint,
        destination: Endpoint,
    ) -> Result<usize> {
        self.create_stream(process, name, ObjectKind::Socket, source, destination)
    }

    /// Another descriptor for the same object
    pub fn duplicate(&self, process: &Process, fd: usize) -> Result<usize> {
        let open = process.files().get(fd)?.clone();
        self.objects.retain(open.handle)?;
        let installed = process
            .files()
            .install(open.handle, open.buffer, open.byte_size);
        if installed.is_err() {
            self.objects.close(open.handle, process.pid())?;
        }
        installed
    }

    /// Read from the object of the descriptor
    ///
    /// # Returns
    /// * Ok(count of bytes read)
    /// * Err(BadDescriptor | BadHandle | PermissionDenied)
    pub fn read(&self, process: &Process, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let handle = process.files().get(fd)?.handle;
        let entry = self.objects.entry(handle)?;
        if !entry.flags.is_readable() {
            return Err(FsError::PermissionDenied(entry.inode));
        }
        self.objects.read(handle, buf)
    }

    /// Write into the object of the descriptor.
    /// File content reaches the disk when the lock holder closes its last reference.
    ///
    /// # Returns
    /// * Ok(count of bytes written)
    /// * Err(BadDescriptor | BadHandle | PermissionDenied | WriteLocked | BufferFull)
    pub fn write(&self, process: &Process, fd: usize, data: &[u8]) -> Result<usize> {
        let handle = process.files().get(fd)?.handle;
        let entry = self.objects.entry(handle)?;
        if !entry.flags.is_writable() {
            return Err(FsError::PermissionDenied(entry.inode));
        }
        if entry.kind == ObjectKind::File && entry.inode != 0 && entry.lock != process.pid() {
            if let Some(holder) = self.objects.lock_holder(entry.inode) {
                if self.fs.lock().options().strict_write_lock {
                    return Err(FsError::WriteLocked(entry.inode, holder));
                }
            }
        }
        let written = self.objects.write(handle, data)?;
        let byte_size = self.objects.entry(handle)?.byte_size;
        process.files().get_mut(fd)?.byte_size = byte_size;
        Ok(written)
    }

    /// Give the object back.
    /// A file locked by the process is stored to disk when its last reference goes.
    fn release(&self, pid: u32, open: OpenBuffer) -> Result<()> {
        let mut fs = self.fs.lock();
        let entry = self.objects.entry(open.handle)?;
        let stored = if entry.kind == ObjectKind::File
            && entry.inode != 0
            && entry.lock == pid
            && entry.ref_count == 1
        {
            let data = entry.buffer.lock()[..entry.byte_size].to_vec();
            fs.write_file(entry.inode, &data)
        } else {
            Ok(())
        };
        self.objects.close(open.handle, pid)?;
        drop(fs);
        stored
    }

    /// Close the descriptor
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(BadDescriptor | BadHandle | ...): errors of storing a locked file are reported after the close
    pub fn close(&self, process: &Process, fd: usize) -> Result<()> {
        let open = process.files().remove(fd)?;
        self.release(process.pid(), open)
    }

    /// Close every descriptor of the process and drop its locks.
    /// The first error is reported after all descriptors are closed.
    pub fn exit(&self, process: &Process) -> Result<()> {
        let opened = process.files().drain();
        let mut result = Ok(());
        for (fd, open) in opened {
            if let Err(err) = self.release(process.pid(), open) {
                error!("process {} fails to close {}: {}", process.pid(), fd, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        self.objects.release_process(process.pid());
        debug!("process {} exits", process.pid());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryDisk;
    use crate::configs::{BLOCK_BYTE_SIZE, MAX_PROCESS_OPEN_FILES, ROOT_INODE};
    use crate::vfs::{FormatOptions, InitMode, MountOptions};

    fn kernel() -> Kernel {
        let format = FormatOptions {
            mode: InitMode::TotalBlocks(256),
            total_inodes: 32,
            volume_name: "kernel".into(),
        };
        let fs = Ext2Fs::format(
            Arc::new(MemoryDisk::new(512)),
            &format,
            MountOptions::default(),
        )
        .unwrap();
        Kernel::with_object_table(Box::new(fs), Arc::new(ObjectTable::new()))
    }

    fn create_file(kernel: &Kernel, process: &Process, name: &str, content: &[u8]) -> u32 {
        let fd = kernel
            .open_buffer(process, "scratch", content.to_vec())
            .unwrap();
        let number = kernel.create(process, name, fd).unwrap();
        kernel.close(process, fd).unwrap();
        number
    }

    #[test]
    fn test_kernel_create_resolve_load_delete() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        let number = create_file(&kernel, &process, "/hello", b"hi\n");
        assert!(kernel.fs().resolve_path("/hello").is_ok_and(|n| n == number));
        let inode = kernel.fs().load_inode(number).unwrap();
        let content = kernel.fs().load_content(&inode).unwrap();
        assert_eq!(BLOCK_BYTE_SIZE, content.len());
        assert_eq!(b"hi\n", &content[..3]);
        assert!(content[3..].iter().all(|byte| *byte == 0));
        assert!(kernel.delete(&process, "/hello").is_ok());
        assert!(kernel
            .fs()
            .resolve_path("/hello")
            .is_err_and(|e| e.is_pathnotfound() && e.is_missing()));
        assert!(kernel
            .delete(&process, "/hello")
            .is_err_and(|e| e.is_missing()));
    }

    #[test]
    fn test_kernel_create_rejects_duplicates_and_bad_names() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        create_file(&kernel, &process, "/hello", b"a");
        let fd = kernel.open_buffer(&process, "scratch", b"b".to_vec()).unwrap();
        let inodes = kernel.fs().free_inode_count().unwrap();
        assert!(kernel
            .create(&process, "/hello", fd)
            .is_err_and(|e| e.is_duplicatedname()));
        assert!(kernel
            .create(&process, "/..", fd)
            .is_err_and(|e| e.is_invalidname()));
        assert!(kernel
            .create(&process, "/missing/x", fd)
            .is_err_and(|e| e.is_pathnotfound()));
        assert!(kernel.create(&process, "/x", 9).is_err_and(|e| e.is_baddescriptor()));
        assert_eq!(inodes, kernel.fs().free_inode_count().unwrap());
    }

    #[test]
    fn test_kernel_open_and_read() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        create_file(&kernel, &process, "/hello", b"hi\n");
        let fd = kernel.open(&process, "/hello", OpenFlags::READABLE).unwrap();
        let mut buf = [0u8; 8];
        assert!(kernel.read(&process, fd, &mut buf).is_ok_and(|n| n == 3));
        assert_eq!(b"hi\n", &buf[..3]);
        assert!(kernel
            .write(&process, fd, b"x")
            .is_err_and(|e| e.is_permissiondenied()));
        assert!(kernel
            .open(&process, "/", OpenFlags::READABLE)
            .is_err_and(|e| e.is_notafile()));
        assert!(kernel
            .open(&process, "/nothing", OpenFlags::READABLE)
            .is_err_and(|e| e.is_pathnotfound()));
        assert!(kernel.close(&process, fd).is_ok());
        assert!(kernel.close(&process, fd).is_err_and(|e| e.is_baddescriptor()));
        assert!(kernel.objects().is_empty());
    }

    #[test]
    fn test_kernel_open_checks_owner_bits() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        create_file(&kernel, &process, "/hello", b"hi\n");
        assert!(kernel.change_mode(&process, "/hello", 0o200).is_ok());
        assert!(kernel
            .open(&process, "/hello", OpenFlags::READABLE)
            .is_err_and(|e| e.is_permissiondenied() && e.is_denied()));
        assert!(kernel
            .open(&process, "/hello", OpenFlags::EXECUTE)
            .is_err_and(|e| e.is_permissiondenied()));
        assert!(kernel.open(&process, "/hello", OpenFlags::WRITABLE).is_ok());
        let number = kernel.fs().resolve_path("/hello").unwrap();
        assert!(kernel
            .fs()
            .load_inode(number)
            .is_ok_and(|inode| inode.mode == 0o100200));
    }

    #[test]
    fn test_kernel_write_close_stores_content() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        create_file(&kernel, &process, "/hello", b"hi\n");
        let fd = kernel.open(&process, "/hello", OpenFlags::RW).unwrap();
        assert!(kernel.write(&process, fd, b"bye!!").is_ok_and(|n| n == 5));
        assert!(process.files().get(fd).is_ok_and(|open| open.byte_size == 5));
        assert!(kernel.close(&process, fd).is_ok());
        let number = kernel.fs().resolve_path("/hello").unwrap();
        let inode = kernel.fs().load_inode(number).unwrap();
        assert_eq!(5, inode.size);
        assert!(kernel
            .fs()
            .read_file(&inode)
            .is_ok_and(|data| data == b"bye!!"));
    }

    #[test]
    fn test_kernel_write_lock_policy() {
        let kernel = kernel();
        let first = Process::new(1, ROOT_INODE);
        let second = Process::new(2, ROOT_INODE);
        let number = create_file(&kernel, &first, "/hello", b"hi\n");
        let writer = kernel.open(&first, "/hello", OpenFlags::RW).unwrap();
        assert!(!kernel.objects().file_available_to_be_locked(number));

        // permissive: the second writer is let in without the lock
        let late = kernel.open(&second, "/hello", OpenFlags::RW).unwrap();
        assert_eq!(Some(1), kernel.objects().lock_holder(number));
        kernel.write(&second, late, b"lost").unwrap();
        kernel.close(&second, late).unwrap();
        assert!(kernel
            .delete(&second, "/hello")
            .is_err_and(|e| e.is_writelocked() && e.is_denied()));

        let mut options = *kernel.fs().options();
        options.strict_write_lock = true;
        kernel.fs().set_options(options);
        assert!(kernel
            .open(&second, "/hello", OpenFlags::WRITABLE)
            .is_err_and(|e| e.is_writelocked()));
        assert!(kernel.open(&second, "/hello", OpenFlags::READABLE).is_ok());

        kernel.close(&first, writer).unwrap();
        assert!(kernel.objects().file_available_to_be_locked(number));
        assert!(kernel.open(&second, "/hello", OpenFlags::WRITABLE).is_ok());
        let inode = kernel.fs().load_inode(number).unwrap();
        assert!(kernel.fs().read_file(&inode).is_ok_and(|data| data == b"hi\n"));
    }

    #[test]
    fn test_kernel_duplicated_writer_keeps_lock() {
        let kernel = kernel();
        let first = Process::new(1, ROOT_INODE);
        let second = Process::new(2, ROOT_INODE);
        let number = create_file(&kernel, &first, "/hello", b"old");
        let fd = kernel.open(&first, "/hello", OpenFlags::RW).unwrap();
        let copy = kernel.duplicate(&first, fd).unwrap();
        kernel.close(&first, fd).unwrap();
        assert_eq!(Some(1), kernel.objects().lock_holder(number));

        let late = kernel.open(&second, "/hello", OpenFlags::RW).unwrap();
        assert_eq!(Some(1), kernel.objects().lock_holder(number));
        assert!(kernel.write(&first, copy, b"new").is_ok_and(|n| n == 3));
        kernel.close(&first, copy).unwrap();
        assert_eq!(None, kernel.objects().lock_holder(number));
        kernel.close(&second, late).unwrap();

        let inode = kernel.fs().load_inode(number).unwrap();
        assert!(kernel.fs().read_file(&inode).is_ok_and(|data| data == b"new"));
    }

    #[test]
    fn test_kernel_named_pipe_and_socket() {
        let kernel = kernel();
        let first = Process::new(1, ROOT_INODE);
        let second = Process::new(2, ROOT_INODE);
        let pipe = kernel.create_pipe(&first, "/pipe").unwrap();
        let number = kernel.fs().resolve_path("/pipe").unwrap();
        assert!(kernel
            .fs()
            .load_inode(number)
            .is_ok_and(|inode| inode.file_type() == FileType::Pipe));
        assert!(kernel
            .fs()
            .lookup_entry(ROOT_INODE, "pipe")
            .is_ok_and(|entry| entry.file_type == FileType::Pipe.dir_entry_tag()));
        assert!(kernel
            .create_pipe(&second, "/pipe")
            .is_err_and(|e| e.is_duplicatedname()));

        let joined = kernel.open(&second, "/pipe", OpenFlags::RW).unwrap();
        assert!(kernel.write(&second, joined, b"through").is_ok_and(|n| n == 7));
        let mut buf = [0u8; 8];
        assert!(kernel.read(&first, pipe, &mut buf).is_ok_and(|n| n == 7));
        assert_eq!(b"through", &buf[..7]);
        assert_eq!(None, kernel.objects().lock_holder(number));
        kernel.close(&first, pipe).unwrap();
        kernel.close(&second, joined).unwrap();
        assert!(kernel.objects().is_empty());

        let peer = Endpoint {
            ip: [10, 0, 0, 7],
            port: 22,
        };
        kernel
            .create_socket(&first, "/sock", Endpoint::default(), peer)
            .unwrap();
        let number = kernel.fs().resolve_path("/sock").unwrap();
        assert!(kernel
            .fs()
            .load_inode(number)
            .is_ok_and(|inode| inode.file_type() == FileType::Socket));
        let fd = kernel.open(&second, "/sock", OpenFlags::RW).unwrap();
        let handle = second.files().get(fd).unwrap().handle;
        assert!(kernel
            .objects()
            .entry(handle)
            .is_ok_and(|entry| entry.destination == peer && entry.inode == number));

        assert!(kernel.delete(&first, "/pipe").is_ok());
        assert!(kernel
            .open(&first, "/pipe", OpenFlags::READABLE)
            .is_err_and(|e| e.is_pathnotfound()));
    }

    #[test]
    fn test_kernel_move_directory_below_itself() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        let a = kernel.make_directory(&process, "/a").unwrap();
        let b = kernel.make_directory(&process, "/a/b").unwrap();
        kernel.make_directory(&process, "/a/b/c").unwrap();
        let inodes = kernel.fs().free_inode_count().unwrap();
        assert!(kernel
            .move_file(&process, "a", "/", "/a/b")
            .is_err_and(|e| e.is_invaliddirectory()));
        assert!(kernel
            .move_file(&process, "a", "/", "/a/b/c")
            .is_err_and(|e| e.is_invaliddirectory()));
        assert!(kernel
            .move_file(&process, "b", "/a", "/a/b/c")
            .is_err_and(|e| e.is_invaliddirectory()));
        assert!(kernel.fs().resolve_path("/a").is_ok_and(|n| n == a));
        assert!(kernel.fs().resolve_path("/a/b").is_ok_and(|n| n == b));
        assert!(kernel.fs().resolve_path("/a/b/..").is_ok_and(|n| n == a));
        assert_eq!(inodes, kernel.fs().free_inode_count().unwrap());

        // moving up the tree is still allowed
        assert!(kernel.move_file(&process, "c", "/a/b", "/").is_ok());
        assert!(kernel.fs().resolve_path("/c/..").is_ok_and(|n| n == ROOT_INODE));
    }

    #[test]
    fn test_kernel_delete_detaches_open_objects() {
        let kernel = kernel();
        let first = Process::new(1, ROOT_INODE);
        let second = Process::new(2, ROOT_INODE);
        let number = create_file(&kernel, &first, "/hello", b"hi\n");
        let writer = kernel.open(&first, "/hello", OpenFlags::RW).unwrap();
        let reader = kernel.open(&second, "/hello", OpenFlags::READABLE).unwrap();
        assert!(kernel.delete(&first, "/hello").is_ok());
        assert_eq!(None, kernel.objects().lock_holder(number));

        let reused = create_file(&kernel, &first, "/new", b"fresh");
        assert_eq!(number, reused);
        assert!(kernel.objects().file_available_to_be_locked(reused));
        kernel.write(&first, writer, b"stale").unwrap();
        kernel.close(&first, writer).unwrap();
        let mut buf = [0u8; 4];
        assert!(kernel.read(&second, reader, &mut buf).is_ok_and(|n| n == 3));
        kernel.close(&second, reader).unwrap();

        let inode = kernel.fs().load_inode(reused).unwrap();
        assert!(kernel.fs().read_file(&inode).is_ok_and(|data| data == b"fresh"));
        let fd = kernel.open(&second, "/new", OpenFlags::RW).unwrap();
        assert_eq!(Some(2), kernel.objects().lock_holder(reused));
        kernel.close(&second, fd).unwrap();
    }

    #[test]
    fn test_kernel_move_file() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        let a = kernel.make_directory(&process, "/a").unwrap();
        let b = kernel.make_directory(&process, "/b").unwrap();
        let number = create_file(&kernel, &process, "/a/f", b"data");
        assert!(kernel.move_file(&process, "f", "/a", "/b").is_ok());
        assert!(kernel.fs().resolve_path("/b/f").is_ok_and(|n| n == number));
        assert!(kernel
            .fs()
            .resolve_path("/a/f")
            .is_err_and(|e| e.is_pathnotfound()));
        assert!(kernel
            .move_file(&process, "f", "/a", "/b")
            .is_err_and(|e| e.is_namedoesnotexist()));

        assert!(kernel.move_file(&process, "b", "/", "/a").is_ok());
        assert!(kernel.fs().resolve_path("/a/b").is_ok_and(|n| n == b));
        assert!(kernel.fs().resolve_path("/a/b/..").is_ok_and(|n| n == a));
        assert!(kernel.fs().resolve_path("/a/b/f").is_ok_and(|n| n == number));
        assert!(kernel
            .move_file(&process, "a", "/", "/a")
            .is_err_and(|e| e.is_invaliddirectory()));
    }

    #[test]
    fn test_kernel_directories() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        let dir = kernel.make_directory(&process, "/docs").unwrap();
        assert!(kernel
            .make_directory(&process, "/docs")
            .is_err_and(|e| e.is_duplicatedname()));
        assert!(kernel.change_directory(&process, "docs").is_ok_and(|n| n == dir));
        assert_eq!(dir, process.cwd());
        let number = create_file(&kernel, &process, "note", b"relative");
        assert!(kernel.fs().resolve_path("/docs/note").is_ok_and(|n| n == number));
        assert!(kernel
            .change_directory(&process, "note")
            .is_err_and(|e| e.is_invaliddirectory()));
        assert!(kernel
            .delete(&process, "/docs")
            .is_err_and(|e| e.is_deletenonemptydirectory()));
        assert!(kernel.delete(&process, "note").is_ok());
        assert!(kernel.change_directory(&process, "..").is_ok_and(|n| n == ROOT_INODE));
        assert!(kernel.delete(&process, "/docs").is_ok());
        assert!(kernel.fs().list_names(ROOT_INODE).is_ok_and(|names| names.is_empty()));

        kernel.make_directory(&process, "/locked").unwrap();
        kernel.change_mode(&process, "/locked", 0o600).unwrap();
        assert!(kernel
            .change_directory(&process, "/locked")
            .is_err_and(|e| e.is_permissiondenied()));
    }

    #[test]
    fn test_kernel_pipe_socket_and_duplicate() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        let pipe = kernel.create_pipe(&process, "pipe").unwrap();
        let copy = kernel.duplicate(&process, pipe).unwrap();
        assert!(kernel.write(&process, pipe, b"abc").is_ok_and(|n| n == 3));
        let mut buf = [0u8; 4];
        assert!(kernel.read(&process, copy, &mut buf).is_ok_and(|n| n == 3));
        assert_eq!(b"abc", &buf[..3]);
        kernel.close(&process, pipe).unwrap();
        assert_eq!(1, kernel.objects().len());
        kernel.close(&process, copy).unwrap();
        assert!(kernel.objects().is_empty());

        let peer = Endpoint {
            ip: [127, 0, 0, 1],
            port: 8080,
        };
        let socket = kernel
            .create_socket(&process, "socket", Endpoint::default(), peer)
            .unwrap();
        kernel.write(&process, socket, b"ping").unwrap();
        let handle = process.files().get(socket).unwrap().handle;
        assert!(kernel
            .objects()
            .entry(handle)
            .is_ok_and(|entry| entry.tx_packets == 1 && entry.destination == peer));
    }

    #[test]
    fn test_kernel_exit_closes_everything() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        let number = create_file(&kernel, &process, "/hello", b"hi\n");
        let fd = kernel.open(&process, "/hello", OpenFlags::RW).unwrap();
        kernel.write(&process, fd, b"saved").unwrap();
        kernel.open(&process, "/hello", OpenFlags::READABLE).unwrap();
        kernel.create_pipe(&process, "pipe").unwrap();
        assert_eq!(3, process.files().len());
        assert!(kernel.exit(&process).is_ok());
        assert!(process.files().is_empty());
        assert!(kernel.objects().is_empty());
        assert!(kernel.objects().file_available_to_be_locked(number));
        let inode = kernel.fs().load_inode(number).unwrap();
        assert!(kernel.fs().read_file(&inode).is_ok_and(|data| data == b"saved"));
    }

    #[test]
    fn test_kernel_descriptor_table_full_rolls_back() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        create_file(&kernel, &process, "/hello", b"hi\n");
        for _ in 0..MAX_PROCESS_OPEN_FILES {
            kernel.open(&process, "/hello", OpenFlags::READABLE).unwrap();
        }
        assert!(kernel
            .open(&process, "/hello", OpenFlags::READABLE)
            .is_err_and(|e| e.is_descriptortablefull()));
        assert_eq!(MAX_PROCESS_OPEN_FILES, kernel.objects().len());
    }

    #[test]
    fn test_kernel_block_reclamation_cycles() {
        let kernel = kernel();
        let process = Process::new(1, ROOT_INODE);
        let blocks = kernel.fs().free_block_count().unwrap();
        let inodes = kernel.fs().free_inode_count().unwrap();
        let data = vec![5u8; 14 * BLOCK_BYTE_SIZE];
        for round in 0..4 {
            let number = create_file(&kernel, &process, "/big", &data);
            assert_eq!(blocks - 15, kernel.fs().free_block_count().unwrap());
            kernel.delete(&process, "/big").unwrap();
            assert_eq!(blocks, kernel.fs().free_block_count().unwrap());
            assert_eq!(inodes, kernel.fs().free_inode_count().unwrap());
            if round > 0 {
                // the same inode comes back once it was released
                assert_eq!(crate::configs::FIRST_FREE_INODE, number);
            }
        }
    }
}
