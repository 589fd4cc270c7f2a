//! Periodic tamper detection.
//!
//! The monitor samples what the host reports (overlay visibility, playing
//! flag, position) and decides what to do about it. It never touches the
//! host itself; the controller applies the verdict. This is a deterrent
//! against casual bypass, not a security boundary.

use crate::host::OverlayView;
use crate::session::state::{EntitlementSession, GateState};
use crate::session::watch::clamp_target;
use chrono::{DateTime, Utc};
use tracing::warn;

/// One sample of host state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecuritySample {
    /// Overlay rendered and visible.
    pub overlay_visible: bool,
    /// Playback reports playing.
    pub playing: bool,
    /// Current position in seconds.
    pub position: f64,
}

/// What the controller must do after a check.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SecurityVerdict {
    /// Re-show the overlay in this view.
    pub reshow: Option<OverlayView>,
    /// Pause playback.
    pub force_pause: bool,
    /// Seek back to this position.
    pub reclamp_to: Option<f64>,
    /// Feed this position through the watch clock.
    pub feed_position: Option<f64>,
    /// Removals reached the limit; lock the session.
    pub lockdown: bool,
}

impl SecurityVerdict {
    /// Whether nothing needs doing.
    pub fn is_clean(&self) -> bool {
        *self == SecurityVerdict::default()
    }
}

/// Overlay-removal escalation and forced-pause enforcement.
#[derive(Debug, Default)]
pub struct SecurityMonitor {
    removal_in_cycle: bool,
}

impl SecurityMonitor {
    /// Create a monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether checks should run for this session.
    pub fn should_run(&self, session: &EntitlementSession) -> bool {
        session.gating_enabled() && !session.gate_state.is_terminal()
    }

    /// A new overlay-show cycle starts. The removal counter resets unless
    /// a removal was detected during the previous cycle.
    pub fn begin_overlay_cycle(&mut self, session: &mut EntitlementSession) {
        if !self.removal_in_cycle {
            session.overlay_removal_attempts = 0;
        }
        self.removal_in_cycle = false;
    }

    /// Check one sample against the session.
    pub fn inspect(
        &mut self,
        session: &mut EntitlementSession,
        sample: &SecuritySample,
        now: DateTime<Utc>,
    ) -> SecurityVerdict {
        let mut verdict = SecurityVerdict::default();
        if !self.should_run(session) {
            return verdict;
        }
        session.last_security_check_at = Some(now);
        let state = session.gate_state;

        if let Some(view) = state.expected_overlay() {
            if !sample.overlay_visible {
                session.overlay_removal_attempts += 1;
                self.removal_in_cycle = true;
                warn!(
                    state = %state,
                    attempts = session.overlay_removal_attempts,
                    max = session.max_overlay_removal_attempts,
                    "Gate overlay missing"
                );
                if session.overlay_removal_attempts >= session.max_overlay_removal_attempts {
                    verdict.lockdown = true;
                    verdict.force_pause = true;
                    return verdict;
                }
                verdict.reshow = Some(view);
            }
        }

        if sample.playing {
            if state.is_gated() {
                warn!(state = %state, position = sample.position, "Playback running while gated");
                verdict.force_pause = true;
                let target = clamp_target(session.free_duration_seconds);
                if sample.position > target {
                    verdict.reclamp_to = Some(target);
                }
            } else if state == GateState::Preview {
                verdict.feed_position = Some(sample.position);
            }
        }

        verdict
    }
}
