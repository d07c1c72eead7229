// @author:    olinex
// @time:      2023/12/02

// self mods
mod descriptor;
mod table;

// use other mods

// use self mods

// reexport
pub use descriptor::*;
pub use table::*;
