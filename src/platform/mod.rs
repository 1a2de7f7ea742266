//! Platform abstraction: mount table and filesystem block counts.

pub mod pal;
