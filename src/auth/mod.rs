//! Email/OTP sign-in challenge.

pub mod flow;
pub mod validation;
