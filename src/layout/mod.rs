// @author:    olinex
// @time:      2023/11/08

// self mods
mod bitmap;
mod dir_entry;
mod disk_inode;
mod super_block;

// use other mods

// use self mods

// reexport
pub use bitmap::*;
pub use dir_entry::*;
pub use disk_inode::*;
pub use super_block::*;
