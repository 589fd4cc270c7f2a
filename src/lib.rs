//! # Playgate
//!
//! **Free-preview gating and anti-bypass enforcement for embedded video players.**
//!
//! Playgate decides whether playback may continue. It tracks watch time
//! from reported positions, closes the gate when the free preview runs
//! out, walks the viewer through an email/OTP sign-in and a hosted
//! checkout, confirms payment server-side, and polices the player for
//! tampering (removed overlays, forced unpause, seeking past the limit).
//!
//! ## Features
//!
//! - **Free preview** - gate closes at `limit - 0.01s`, playback parked at `limit - 0.1s`
//! - **Email/OTP sign-in** - local validation, resend cooldown, bounded attempts
//! - **Payment negotiation** - custom handler, generic payment link, or built-in gateways
//! - **Server-side verification** - a client success message is never trusted alone
//! - **Tamper escalation** - overlay removals are counted and end in lockdown
//!
//! ## Quickstart
//!
//! ```no_run
//! use playgate::{GateService, GatewayDescriptor, PlaygateConfig};
//! # fn bindings() -> playgate::HostBindings { unimplemented!() }
//!
//! # async fn run() -> Result<(), playgate::PlaygateError> {
//! let config = PlaygateConfig {
//!     free_duration_seconds: 120.0,
//!     api_base: "https://api.example.com".to_string(),
//!     gateways: vec![GatewayDescriptor::from_id("stripe")],
//!     ..Default::default()
//! };
//!
//! let service = GateService::connect(config, bindings())?;
//! service.on_position_report(12.5);
//! # Ok(())
//! # }
//! ```
//!
//! ## Threat Model
//!
//! Playgate deters casual bypass: hiding the overlay, unpausing from the
//! console, seeking past the preview. It is **not** a security boundary.
//! Anything running in the viewer's process can be patched; entitlement
//! must also be enforced where the media is served.
//!
//! ## Host integration
//!
//! Rendering, playback and storage stay with the host and are injected
//! through the traits in [`host`]. See [`HostBindings`].

#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/playgate/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;
pub mod host;

// Session layer
pub mod session;

// Sign-in
pub mod auth;

// Payment
pub mod payment;

// Anti-bypass
pub mod security;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Token storage
pub mod store;

// Controller (synchronous facade) and async service
pub mod controller;
pub mod service;

#[cfg(any(test, feature = "test-seams"))]
pub mod testing;

// Re-exports for public API
pub use client::http::{EntitlementApi, HttpEntitlementClient};
pub use clock::{Clock, SystemClock};
pub use config::{GatewayDescriptor, PlaygateConfig};
pub use controller::GateController;
pub use errors::PlaygateError;
pub use host::{GateEvent, HostBindings, OverlayView};
pub use payment::gateway::PaymentHandler;
pub use service::GateService;
pub use session::state::{EntitlementSession, GateState};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
