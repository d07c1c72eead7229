// @author:    olinex
// @time:      2023/12/05

// self mods
mod fs;

// use other mods

// use self mods

// reexport
pub use fs::*;
