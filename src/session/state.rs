//! Canonical session record and gate state machine.
//!
//! This module enforces the entitlement rules:
//! - Transitions follow a fixed graph, `Granted` and `Locked` absorb
//! - A successful payment is sticky and never re-gated
//! - The free preview ends at `limit - GATE_EPSILON_SECONDS`

use crate::host::{GrantSource, OverlayView};
use crate::session::watch::GATE_EPSILON_SECONDS;
use crate::PlaygateError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gate state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateState {
    /// Free preview is playing.
    Preview,
    /// The preview limit was reached.
    GateHit,
    /// Email/OTP challenge is open.
    Authenticating,
    /// Waiting for the user to pay.
    AwaitingPayment,
    /// Payment reported complete, server verification pending.
    PaymentVerifying,
    /// Entitled for the rest of the session.
    Granted,
    /// Locked after tamper escalation.
    Locked,
}

impl GateState {
    /// `Granted` and `Locked` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, GateState::Granted | GateState::Locked)
    }

    /// States in which playback must stay paused.
    pub fn is_gated(self) -> bool {
        matches!(
            self,
            GateState::GateHit
                | GateState::Authenticating
                | GateState::AwaitingPayment
                | GateState::PaymentVerifying
        )
    }

    /// Overlay view that must be visible in this state, if any.
    pub fn expected_overlay(self) -> Option<OverlayView> {
        match self {
            GateState::Authenticating => Some(OverlayView::Auth),
            GateState::AwaitingPayment | GateState::PaymentVerifying => Some(OverlayView::Payment),
            GateState::Locked => Some(OverlayView::Locked),
            GateState::Preview | GateState::GateHit | GateState::Granted => None,
        }
    }

    /// Whether `self -> next` is an edge of the gate graph.
    pub fn can_transition_to(self, next: GateState) -> bool {
        use GateState::*;
        if self.is_terminal() {
            return false;
        }
        if next == Locked {
            return true;
        }
        matches!(
            (self, next),
            (Preview, GateHit)
                | (GateHit, Authenticating)
                | (GateHit, AwaitingPayment)
                | (Authenticating, Granted)
                | (Authenticating, Preview)
                | (Authenticating, AwaitingPayment)
                | (Authenticating, GateHit)
                | (AwaitingPayment, PaymentVerifying)
                | (AwaitingPayment, AwaitingPayment)
                | (PaymentVerifying, Granted)
                | (PaymentVerifying, AwaitingPayment)
        )
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateState::Preview => "Preview",
            GateState::GateHit => "GateHit",
            GateState::Authenticating => "Authenticating",
            GateState::AwaitingPayment => "AwaitingPayment",
            GateState::PaymentVerifying => "PaymentVerifying",
            GateState::Granted => "Granted",
            GateState::Locked => "Locked",
        };
        f.write_str(name)
    }
}

/// The per-player entitlement record. Cloned out as a read-only snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementSession {
    /// Random id generated at construction.
    pub session_id: String,
    /// Free preview length; `0` disables gating.
    pub free_duration_seconds: f64,
    /// Watch time derived from position reports.
    pub elapsed_watch_seconds: f64,
    /// Media duration, when the host reported one.
    pub media_duration_seconds: Option<f64>,
    /// Current gate state.
    pub gate_state: GateState,
    /// Sticky once set.
    pub payment_successful: bool,
    /// When a verified payment completed.
    pub payment_success_at: Option<DateTime<Utc>>,
    /// Failed OTP verifications for the current challenge.
    pub auth_attempts: u32,
    /// Whole seconds until an OTP can be re-sent.
    pub otp_resend_cooldown_remaining: u64,
    /// User id of the stored session token.
    pub authenticated_user: Option<String>,
    /// Overlay removals detected in the current escalation.
    pub overlay_removal_attempts: u32,
    /// Removals tolerated before lockdown.
    pub max_overlay_removal_attempts: u32,
    /// Time of the last security check.
    pub last_security_check_at: Option<DateTime<Utc>>,
}

impl EntitlementSession {
    /// Fresh session in `Preview`.
    pub fn new(session_id: String, free_duration_seconds: f64, max_overlay_removal_attempts: u32) -> Self {
        Self {
            session_id,
            free_duration_seconds,
            elapsed_watch_seconds: 0.0,
            media_duration_seconds: None,
            gate_state: GateState::Preview,
            payment_successful: false,
            payment_success_at: None,
            auth_attempts: 0,
            otp_resend_cooldown_remaining: 0,
            authenticated_user: None,
            overlay_removal_attempts: 0,
            max_overlay_removal_attempts,
            last_security_check_at: None,
        }
    }

    /// Whether gating is configured at all.
    pub fn gating_enabled(&self) -> bool {
        self.free_duration_seconds > 0.0
    }

    /// Whether `now` falls inside the post-payment grace window.
    pub fn within_payment_grace(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        match self.payment_success_at {
            Some(at) => now >= at && now - at < grace,
            None => false,
        }
    }

    /// Whether the preview limit has been reached.
    pub fn limit_reached(&self) -> bool {
        self.gating_enabled()
            && self.elapsed_watch_seconds >= self.free_duration_seconds - GATE_EPSILON_SECONDS
    }

    /// Whether the gate must close now.
    pub fn should_gate(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.gate_state == GateState::Preview
            && self.limit_reached()
            && !self.payment_successful
            && !self.within_payment_grace(now, grace)
    }

    /// Apply a transition along the gate graph.
    ///
    /// Returns the previous state.
    pub fn transition(&mut self, to: GateState) -> Result<GateState, PlaygateError> {
        let from = self.gate_state;
        if !from.can_transition_to(to) {
            return Err(PlaygateError::InvalidTransition { from, to });
        }
        if self.payment_successful
            && matches!(
                to,
                GateState::GateHit | GateState::Authenticating | GateState::AwaitingPayment
            )
        {
            return Err(PlaygateError::InvalidTransition { from, to });
        }
        self.gate_state = to;
        if to == GateState::Granted {
            self.overlay_removal_attempts = 0;
        }
        Ok(from)
    }

    /// Transition to `Granted` and record the entitlement.
    pub fn grant(&mut self, source: GrantSource, now: DateTime<Utc>) -> Result<(), PlaygateError> {
        self.transition(GateState::Granted)?;
        self.payment_successful = true;
        if source == GrantSource::Payment {
            self.payment_success_at = Some(now);
        }
        self.otp_resend_cooldown_remaining = 0;
        Ok(())
    }

    /// Force the session back to `Preview` (host/ops hook).
    ///
    /// Refused once paid or locked. Tamper counters are kept.
    pub fn reset_to_preview(&mut self) -> Result<(), PlaygateError> {
        if self.gate_state == GateState::Locked {
            return Err(PlaygateError::Locked);
        }
        if self.payment_successful {
            return Err(PlaygateError::WrongState(self.gate_state));
        }
        self.gate_state = GateState::Preview;
        self.elapsed_watch_seconds = 0.0;
        Ok(())
    }

    /// Reopen the preview after the limit moved past the current position.
    ///
    /// Only valid from a gated state. Returns the previous state.
    pub fn lift_gate(&mut self) -> Result<GateState, PlaygateError> {
        let from = self.gate_state;
        if !from.is_gated() {
            return Err(PlaygateError::WrongState(from));
        }
        self.gate_state = GateState::Preview;
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_session(free: f64) -> EntitlementSession {
        EntitlementSession::new("test-session".to_string(), free, 3)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_terminal_states_absorb() {
        for to in [
            GateState::Preview,
            GateState::GateHit,
            GateState::AwaitingPayment,
            GateState::Locked,
        ] {
            assert!(!GateState::Granted.can_transition_to(to));
            assert!(!GateState::Locked.can_transition_to(to));
        }
    }

    #[test]
    fn test_every_non_terminal_can_lock() {
        for from in [
            GateState::Preview,
            GateState::GateHit,
            GateState::Authenticating,
            GateState::AwaitingPayment,
            GateState::PaymentVerifying,
        ] {
            assert!(from.can_transition_to(GateState::Locked));
        }
    }

    #[test]
    fn test_payment_retry_loop_allowed() {
        assert!(GateState::AwaitingPayment.can_transition_to(GateState::PaymentVerifying));
        assert!(GateState::PaymentVerifying.can_transition_to(GateState::AwaitingPayment));
        assert!(!GateState::PaymentVerifying.can_transition_to(GateState::Preview));
    }

    #[test]
    fn test_preview_cannot_skip_to_granted() {
        let mut session = make_session(30.0);
        let result = session.transition(GateState::Granted);
        assert!(matches!(
            result,
            Err(PlaygateError::InvalidTransition {
                from: GateState::Preview,
                to: GateState::Granted
            })
        ));
        assert_eq!(session.gate_state, GateState::Preview);
    }

    #[test]
    fn test_limit_uses_epsilon() {
        let mut session = make_session(30.0);
        session.elapsed_watch_seconds = 29.98;
        assert!(!session.limit_reached());
        session.elapsed_watch_seconds = 29.995;
        assert!(session.limit_reached());
    }

    #[test]
    fn test_zero_duration_never_gates() {
        let mut session = make_session(0.0);
        session.elapsed_watch_seconds = 1000.0;
        assert!(!session.should_gate(now(), Duration::seconds(5)));
    }

    #[test]
    fn test_grant_is_sticky() {
        let mut session = make_session(30.0);
        session.transition(GateState::GateHit).unwrap();
        session.transition(GateState::AwaitingPayment).unwrap();
        session.transition(GateState::PaymentVerifying).unwrap();
        session.grant(GrantSource::Payment, now()).unwrap();

        assert!(session.payment_successful);
        assert_eq!(session.payment_success_at, Some(now()));
        assert!(session.reset_to_preview().is_err());
        assert!(session.transition(GateState::GateHit).is_err());
        assert!(!session.should_gate(now() + Duration::hours(1), Duration::seconds(5)));
    }

    #[test]
    fn test_grace_window() {
        let mut session = make_session(30.0);
        session.payment_success_at = Some(now());
        assert!(session.within_payment_grace(now() + Duration::seconds(4), Duration::seconds(5)));
        assert!(!session.within_payment_grace(now() + Duration::seconds(5), Duration::seconds(5)));
    }

    #[test]
    fn test_granted_resets_overlay_attempts() {
        let mut session = make_session(30.0);
        session.transition(GateState::GateHit).unwrap();
        session.transition(GateState::Authenticating).unwrap();
        session.overlay_removal_attempts = 2;
        session.grant(GrantSource::Authentication, now()).unwrap();
        assert_eq!(session.overlay_removal_attempts, 0);
        assert_eq!(session.payment_success_at, None);
    }

    #[test]
    fn test_reset_refused_when_locked() {
        let mut session = make_session(30.0);
        session.transition(GateState::Locked).unwrap();
        assert!(matches!(session.reset_to_preview(), Err(PlaygateError::Locked)));
    }

    #[test]
    fn test_lift_gate_only_from_gated() {
        let mut session = make_session(30.0);
        assert!(matches!(
            session.lift_gate(),
            Err(PlaygateError::WrongState(GateState::Preview))
        ));
        session.transition(GateState::GateHit).unwrap();
        session.transition(GateState::AwaitingPayment).unwrap();
        assert_eq!(session.lift_gate().unwrap(), GateState::AwaitingPayment);
        assert_eq!(session.gate_state, GateState::Preview);
    }

    #[test]
    fn test_reset_keeps_tamper_counter() {
        let mut session = make_session(30.0);
        session.elapsed_watch_seconds = 30.0;
        session.transition(GateState::GateHit).unwrap();
        session.overlay_removal_attempts = 2;
        session.reset_to_preview().unwrap();
        assert_eq!(session.gate_state, GateState::Preview);
        assert_eq!(session.elapsed_watch_seconds, 0.0);
        assert_eq!(session.overlay_removal_attempts, 2);
    }
}
