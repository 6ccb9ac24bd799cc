// @author:    olinex
// @time:      2023/11/08

// self mods
mod block_map;
mod header;
mod super_block;

// use other mods

// use self mods

// reexport
pub use block_map::*;
pub use header::*;
pub use super_block::*;
