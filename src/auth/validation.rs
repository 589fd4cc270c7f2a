//! Local input validation for the sign-in challenge.

use crate::PlaygateError;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Validate an email address and return it trimmed.
pub fn validate_email(email: &str) -> Result<String, PlaygateError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(PlaygateError::Validation(
            "Please enter your email address".to_string(),
        ));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(PlaygateError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }
    Ok(email.to_string())
}

/// Validate an OTP code of the configured length and return it trimmed.
pub fn validate_otp(code: &str, expected_len: usize) -> Result<String, PlaygateError> {
    let code = code.trim();
    if code.len() != expected_len || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PlaygateError::Validation(format!(
            "Please enter a {}-digit code",
            expected_len
        )));
    }
    Ok(code.to_string())
}

/// Short SHA-256 fingerprint of an email, safe to put in logs.
pub fn email_fingerprint(email: &str) -> String {
    let hash = Sha256::digest(email.trim().to_lowercase().as_bytes());
    hex::encode(&hash[..6])
}
