//! Traits the embedding player implements.
//!
//! The gate never touches a rendering surface directly. Playback control,
//! overlay display, popup windows, durable token storage and event
//! delivery are all injected through these seams.

use crate::PlaygateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Playback control primitives.
pub trait PlaybackSurface: Send + Sync {
    /// Pause the active surface (local video or cast receiver).
    fn pause(&self);
    /// Resume playback.
    fn resume(&self);
    /// Seek to an absolute position in seconds.
    fn seek_to(&self, seconds: f64);
    /// Current position in seconds.
    fn position(&self) -> f64;
    /// Whether the surface reports itself as playing.
    fn is_playing(&self) -> bool;
}

/// Which gate view the overlay shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayView {
    /// Email/OTP sign-in.
    Auth,
    /// Gateway selection and checkout.
    Payment,
    /// Permanent lockdown notice.
    Locked,
}

/// The gate overlay rendered by the host.
pub trait GateOverlay: Send + Sync {
    /// Show (or re-assert) the overlay in the given view.
    fn show(&self, view: OverlayView);
    /// Hide the overlay.
    fn hide(&self);
    /// Whether the overlay is currently rendered and visible.
    fn is_visible(&self) -> bool;
}

/// Opaque handle to an external browsing context (payment popup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle(pub u64);

/// External browsing contexts used for hosted checkout pages.
pub trait ExternalContexts: Send + Sync {
    /// Open `url`; `None` when the host could not open it (popup blocked).
    fn open(&self, url: &str) -> Option<ContextHandle>;
    /// Whether the context was closed (by the user or the host).
    fn is_closed(&self, handle: ContextHandle) -> bool;
    /// Close the context if still open.
    fn close(&self, handle: ContextHandle);
}

/// Durable session token issued after OTP verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Bearer token.
    pub token: String,
    /// User id the token belongs to.
    pub user_id: String,
}

/// Storage that outlives the player instance.
pub trait TokenStore: Send + Sync {
    /// Persist the token, replacing any previous one.
    fn persist(&self, token: &SessionToken) -> Result<(), PlaygateError>;
    /// Read the stored token, if any.
    fn read(&self) -> Result<Option<SessionToken>, PlaygateError>;
    /// Remove the stored token.
    fn clear(&self) -> Result<(), PlaygateError>;
}

/// How an entitlement was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    /// The OTP verification response granted access.
    Authentication,
    /// A verified payment.
    Payment,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Informational.
    Info,
    /// Recoverable error.
    Error,
    /// Session-ending error.
    Fatal,
}

/// Events delivered to the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum GateEvent {
    /// The free preview window was exhausted.
    FreePreviewEnded {
        /// Elapsed watch time when the gate hit.
        elapsed_seconds: f64,
        /// Configured limit.
        limit_seconds: f64,
    },
    /// Playback is entitled for the rest of the session.
    EntitlementGranted {
        /// Path that granted it.
        source: GrantSource,
    },
    /// Tamper escalation locked the session.
    SecurityLockdown {
        /// Overlay removals observed.
        attempts: u32,
    },
    /// A message the host should surface to the user.
    Notice {
        /// Severity.
        level: NoticeLevel,
        /// Human-readable text.
        message: String,
    },
}

impl GateEvent {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            GateEvent::FreePreviewEnded { .. } => "FreePreviewEnded",
            GateEvent::EntitlementGranted { .. } => "EntitlementGranted",
            GateEvent::SecurityLockdown { .. } => "SecurityLockdown",
            GateEvent::Notice { .. } => "Notice",
        }
    }
}

/// Receiver of gate events.
pub trait EventSink: Send + Sync {
    /// Deliver an event.
    fn emit(&self, event: GateEvent);
}

/// All host collaborators, bundled for injection.
#[derive(Clone)]
pub struct HostBindings {
    /// Playback control.
    pub playback: Arc<dyn PlaybackSurface>,
    /// Gate overlay.
    pub overlay: Arc<dyn GateOverlay>,
    /// Payment popups.
    pub contexts: Arc<dyn ExternalContexts>,
    /// Durable token storage.
    pub tokens: Arc<dyn TokenStore>,
    /// Event delivery.
    pub events: Arc<dyn EventSink>,
}

impl fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBindings").finish_non_exhaustive()
    }
}
