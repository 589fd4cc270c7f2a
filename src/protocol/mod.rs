//! Backend wire formats.

pub mod models;
