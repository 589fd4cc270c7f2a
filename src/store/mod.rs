//! Session token storage.

pub mod file;
pub mod memory;
