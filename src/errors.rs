//! Playgate error types.

use crate::session::state::GateState;
use thiserror::Error;

/// Errors that can occur while gating playback.
#[derive(Debug, Error)]
pub enum PlaygateError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Local input validation failed; no network call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// HTTP transport error talking to the entitlement backend.
    #[error("Network error: {0}")]
    Network(String),

    /// The server rejected an OTP or a payment.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The gate overlay was removed while playback should be gated.
    #[error("Tamper detected ({attempts}/{max} overlay removals)")]
    TamperDetected {
        /// Removals observed so far.
        attempts: u32,
        /// Removals tolerated before lockdown.
        max: u32,
    },

    /// No payment strategy can serve the selected gateway.
    #[error("Payment method unavailable: {gateway}")]
    MethodUnavailable {
        /// Gateway id the user selected.
        gateway: String,
    },

    /// Failed to parse a backend response or message.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// OTP resend requested before the cooldown elapsed.
    #[error("Resend cooldown active ({remaining_seconds}s remaining)")]
    CooldownActive {
        /// Whole seconds until resend is allowed.
        remaining_seconds: u64,
    },

    /// A request of the same kind is already awaiting its response.
    #[error("A request is already in flight")]
    RequestInFlight,

    /// Verification attempts are exhausted for the current challenge.
    #[error("Too many verification attempts, request a new code")]
    AttemptsExhausted,

    /// OTP verification attempted without an outstanding challenge.
    #[error("No active OTP challenge")]
    NoActiveChallenge,

    /// Gate state machine refused a transition.
    #[error("Invalid gate transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: GateState,
        /// Requested state.
        to: GateState,
    },

    /// Operation is not meaningful in the current gate state.
    #[error("Operation not allowed in state {0}")]
    WrongState(GateState),

    /// A response arrived for a request that is no longer current.
    #[error("Stale response discarded")]
    Stale,

    /// Session is locked after tamper escalation.
    #[error("Playback locked after tamper detection")]
    Locked,

    /// Token store I/O error.
    #[error("Token store I/O error: {0}")]
    StoreIO(String),
}

impl PlaygateError {
    /// Whether the user can retry within the current session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlaygateError::Network(_)
                | PlaygateError::VerificationFailed(_)
                | PlaygateError::Validation(_)
                | PlaygateError::CooldownActive { .. }
                | PlaygateError::AttemptsExhausted
                | PlaygateError::MethodUnavailable { .. }
        )
    }

    /// Whether the session can no longer recover without re-initialisation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlaygateError::Locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_is_retryable() {
        assert!(PlaygateError::Network("timeout".into()).is_retryable());
        assert!(!PlaygateError::Network("timeout".into()).is_fatal());
    }

    #[test]
    fn test_locked_is_only_fatal() {
        assert!(PlaygateError::Locked.is_fatal());
        assert!(!PlaygateError::Locked.is_retryable());
        assert!(!PlaygateError::TamperDetected { attempts: 1, max: 3 }.is_fatal());
    }

    #[test]
    fn test_display_includes_state_names() {
        let err = PlaygateError::InvalidTransition {
            from: GateState::Granted,
            to: GateState::GateHit,
        };
        assert_eq!(
            err.to_string(),
            "Invalid gate transition from Granted to GateHit"
        );
    }
}
