//! Tamper detection.

pub mod monitor;
