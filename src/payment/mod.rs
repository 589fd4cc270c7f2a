//! Gateway selection, checkout creation and payment verification.

pub mod gateway;
pub mod link;
pub mod negotiation;
