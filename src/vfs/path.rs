// @author:    olinex
// @time:      2023/11/25

// self mods

// use other mods
use alloc::string::ToString;

// use self mods
use super::Ext2Fs;
use crate::configs::ROOT_INODE;
use crate::{FsError, Result};

/// Split the path into the parent path and the last component.
/// An empty parent means the working directory.
///
/// # Returns
/// * Ok((parent, name))
/// * Err(InvalidName): the path has no last component
pub fn split_parent(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = match trimmed.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("", trimmed),
    };
    if name.is_empty() {
        Err(FsError::InvalidName(path.to_string()))
    } else {
        Ok((parent, name))
    }
}

impl Ext2Fs {
    /// Resolve an absolute path to its inode number
    ///
    /// # Returns
    /// * Ok(inode number)
    /// * Err(PathNotFound | InvalidDirectory | CorruptedDirectory | ...)
    pub fn resolve_path(&mut self, path: &str) -> Result<u32> {
        if !path.starts_with('/') {
            return Err(FsError::PathNotFound(path.to_string()));
        }
        self.resolve_from(ROOT_INODE, path)
    }

    /// Resolve a path to its inode number.
    /// Absolute paths start at the root, the others start at the working directory.
    /// Empty components are skipped, so `//a` is the same as `/a`.
    ///
    /// # Arguments
    /// * cwd: the inode number of the working directory
    /// * path: the path to resolve
    ///
    /// # Returns
    /// * Ok(inode number)
    /// * Err(PathNotFound | InvalidDirectory | CorruptedDirectory | ...)
    pub fn resolve_from(&mut self, cwd: u32, path: &str) -> Result<u32> {
        let mut current = if path.starts_with('/') { ROOT_INODE } else { cwd };
        let mut components = path.split('/').filter(|part| !part.is_empty()).peekable();
        while let Some(component) = components.next() {
            current = self.find_entry(current, component).map_err(|err| {
                if err.is_namedoesnotexist() {
                    FsError::PathNotFound(path.to_string())
                } else {
                    err
                }
            })?;
            if components.peek().is_some() && !self.load_inode(current)?.is_dir() {
                return Err(FsError::InvalidDirectory(component.to_string()));
            }
        }
        Ok(current)
    }

    /// Resolve the directory which holds the last component of the path
    ///
    /// # Returns
    /// * Ok((directory inode number, last component))
    /// * Err(InvalidName | PathNotFound | InvalidDirectory | ...)
    pub fn resolve_parent<'a>(&mut self, cwd: u32, path: &'a str) -> Result<(u32, &'a str)> {
        let (parent, name) = split_parent(path)?;
        let dir = self.resolve_from(cwd, parent)?;
        if !self.load_inode(dir)?.is_dir() {
            return Err(FsError::InvalidDirectory(parent.to_string()));
        }
        Ok((dir, name))
    }
}
