// @author:    olinex
// @time:      2023/11/04

// self mods
mod cache;
mod device;
mod io;

// use other mods

// use self mods

// reexport
pub use cache::*;
pub use device::*;
pub use io::*;
