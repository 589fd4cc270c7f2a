//! HTTP access to the entitlement backend.

pub mod http;
