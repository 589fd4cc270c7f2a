//! Elapsed watch time derived from reported playback positions.
//!
//! Seeks are ordinary position reports. Seeking past the limit runs the
//! same code path as playing past it.

use crate::session::state::{EntitlementSession, GateState};
use serde::{Deserialize, Serialize};

/// Sampling tolerance when comparing elapsed time against the limit.
pub const GATE_EPSILON_SECONDS: f64 = 0.01;

/// How far before the limit playback is parked when the gate closes.
pub const CLAMP_BACKOFF_SECONDS: f64 = 0.1;

/// How elapsed time follows reported positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElapsedPolicy {
    /// Elapsed is the furthest position ever reported.
    #[default]
    HighWaterMark,
    /// Elapsed tracks the current position, rewinding on backward seeks.
    CurrentPosition,
}

/// Position to park playback at once the gate closes.
pub fn clamp_target(limit_seconds: f64) -> f64 {
    (limit_seconds - CLAMP_BACKOFF_SECONDS).max(0.0)
}

/// Folds position reports into the session's elapsed watch time.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchClock {
    policy: ElapsedPolicy,
}

impl WatchClock {
    /// Create a watch clock with the given policy.
    pub fn new(policy: ElapsedPolicy) -> Self {
        Self { policy }
    }

    /// Active policy.
    pub fn policy(&self) -> ElapsedPolicy {
        self.policy
    }

    /// Apply a position report.
    ///
    /// Only tracks while gating is enabled and the session is in
    /// `Preview`. Returns whether elapsed time changed.
    pub fn report_position(&self, session: &mut EntitlementSession, position: f64) -> bool {
        if !position.is_finite() {
            return false;
        }
        if !session.gating_enabled() || session.gate_state != GateState::Preview {
            return false;
        }

        let mut position = position.max(0.0);
        if let Some(duration) = session.media_duration_seconds {
            position = position.min(duration);
        }

        let next = match self.policy {
            ElapsedPolicy::HighWaterMark => session.elapsed_watch_seconds.max(position),
            ElapsedPolicy::CurrentPosition => position,
        };

        if next == session.elapsed_watch_seconds {
            return false;
        }
        session.elapsed_watch_seconds = next;
        true
    }
}
