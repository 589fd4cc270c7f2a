//! Gate controller - the synchronous facade over one gated player.
//!
//! The `GateController` owns the entitlement session and coordinates:
//! - Watch-time tracking and the free-preview gate
//! - The email/OTP challenge
//! - Payment negotiation and server-side verification
//! - Tamper checks and lockdown
//!
//! It performs no I/O of its own beyond host callbacks. Network calls are
//! split into `begin_*`/`complete_*` pairs so the caller (usually
//! [`crate::service::GateService`]) can run them without holding the
//! controller.

use crate::auth::flow::{AccessDecision, AuthChallengeFlow, AuthStep, OtpRequestTicket, OtpVerifyTicket};
use crate::auth::validation::email_fingerprint;
use crate::clock::{Clock, SystemClock};
use crate::config::{GatewayDescriptor, PlaygateConfig};
use crate::host::{
    ContextHandle, GateEvent, GrantSource, HostBindings, NoticeLevel, OverlayView, SessionToken,
};
use crate::payment::gateway::{resolve_strategy, CheckoutLink, PaymentHandler, PaymentRequest};
use crate::payment::negotiation::{CheckoutTicket, CompletionOutcome, PaymentNegotiation, PaymentPhase, VerifyTicket};
use crate::protocol::models::{
    parse_completion_message, RequestOtpBody, RequestOtpResponse, VerifyOtpBody, VerifyOtpResponse,
};
use crate::security::monitor::{SecurityMonitor, SecuritySample, SecurityVerdict};
use crate::session::state::{EntitlementSession, GateState};
use crate::session::watch::{clamp_target, WatchClock, GATE_EPSILON_SECONDS};
use crate::PlaygateError;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Main controller for one gated player.
pub struct GateController {
    config: PlaygateConfig,
    clock: Arc<dyn Clock>,
    host: HostBindings,
    payment_handler: Option<Arc<dyn PaymentHandler>>,
    session: EntitlementSession,
    watch: WatchClock,
    auth: AuthChallengeFlow,
    payment: PaymentNegotiation,
    monitor: SecurityMonitor,
    torn_down: bool,
}

impl fmt::Debug for GateController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateController")
            .field("session", &self.session)
            .field("auth_step", &self.auth.step())
            .field("payment_phase", &self.payment.phase())
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl GateController {
    /// Create a controller with the given configuration.
    ///
    /// Uses the system clock.
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration validation fails.
    pub fn new(config: PlaygateConfig, host: HostBindings) -> Result<Self, PlaygateError> {
        config.validate()?;
        Ok(Self::with_clock(config, host, Arc::new(SystemClock)))
    }

    /// Create a controller with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: PlaygateConfig,
        host: HostBindings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PlaygateError> {
        config.validate()?;
        Ok(Self::with_clock(config, host, clock))
    }

    fn with_clock(config: PlaygateConfig, host: HostBindings, clock: Arc<dyn Clock>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut session = EntitlementSession::new(
            session_id,
            config.free_duration_seconds,
            config.security.max_overlay_removal_attempts,
        );

        session.authenticated_user = match host.tokens.read() {
            Ok(token) => token.map(|t| t.user_id),
            Err(e) => {
                warn!(error = %e, "Could not read stored session token");
                None
            }
        };

        info!(
            session_id = %session.session_id,
            free_duration = session.free_duration_seconds,
            authenticated = session.authenticated_user.is_some(),
            "Gate session created"
        );

        Self {
            watch: WatchClock::new(config.elapsed_policy),
            auth: AuthChallengeFlow::new(&config.auth),
            payment: PaymentNegotiation::new(config.gateways.clone()),
            monitor: SecurityMonitor::new(),
            config,
            clock,
            host,
            payment_handler: None,
            session,
            torn_down: false,
        }
    }

    /// Route payments through a host-supplied handler.
    pub fn with_payment_handler(mut self, handler: Arc<dyn PaymentHandler>) -> Self {
        self.payment_handler = Some(handler);
        self
    }

    /// Host-supplied payment handler, if any.
    pub fn payment_handler(&self) -> Option<Arc<dyn PaymentHandler>> {
        self.payment_handler.clone()
    }

    /// Configuration in use.
    pub fn config(&self) -> &PlaygateConfig {
        &self.config
    }

    /// Current gate state.
    pub fn current_state(&self) -> GateState {
        self.session.gate_state
    }

    /// Read-only view of the session.
    pub fn session(&self) -> &EntitlementSession {
        &self.session
    }

    /// Owned snapshot of the session.
    pub fn snapshot(&self) -> EntitlementSession {
        self.session.clone()
    }

    /// Step of the sign-in challenge.
    pub fn auth_step(&self) -> AuthStep {
        self.auth.step()
    }

    /// Last sign-in error, for display.
    pub fn auth_error(&self) -> Option<&str> {
        self.auth.last_error()
    }

    /// Phase of the active payment negotiation.
    pub fn payment_phase(&self) -> Option<PaymentPhase> {
        self.payment.phase()
    }

    /// Whether `teardown` ran.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now_utc()
    }

    // ----- watch time and the gate -------------------------------------

    /// Feed a playback position (time update or seek).
    ///
    /// Returns the gate state after the report.
    pub fn on_position_report(&mut self, seconds: f64) -> GateState {
        if self.torn_down {
            return self.session.gate_state;
        }

        if self.session.gate_state == GateState::Locked {
            if seconds.is_finite() {
                self.clamp_locked(seconds);
            }
            return self.session.gate_state;
        }

        if self.session.gate_state.is_gated() && seconds.is_finite() {
            let target = clamp_target(self.session.free_duration_seconds);
            if seconds > target + GATE_EPSILON_SECONDS {
                debug!(position = seconds, target, "Clamping seek while gated");
                self.host.playback.pause();
                self.host.playback.seek_to(target);
            }
            return self.session.gate_state;
        }

        self.watch.report_position(&mut self.session, seconds);
        self.evaluate_gate();
        self.session.gate_state
    }

    // Locked never plays again, whatever the host reports.
    fn clamp_locked(&self, seconds: f64) {
        let target = clamp_target(self.session.free_duration_seconds);
        debug!(position = seconds, target, "Playback reported while locked");
        self.host.playback.pause();
        if seconds > target + GATE_EPSILON_SECONDS {
            self.host.playback.seek_to(target);
        }
    }

    /// Supply the media duration, used to clamp elapsed time.
    pub fn set_media_duration(&mut self, seconds: f64) {
        if !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        self.session.media_duration_seconds = Some(seconds);
        if self.session.elapsed_watch_seconds > seconds {
            self.session.elapsed_watch_seconds = seconds;
        }
    }

    /// Change the free preview length at runtime.
    ///
    /// Shrinking below elapsed time gates immediately. Growing past the
    /// current position while gated reopens the preview. `0` disables
    /// gating.
    pub fn configure_free_duration(&mut self, seconds: f64) -> Result<GateState, PlaygateError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(PlaygateError::Validation(format!(
                "free duration must be a non-negative number, got {}",
                seconds
            )));
        }
        if self.session.gate_state == GateState::Locked {
            return Err(PlaygateError::Locked);
        }

        info!(from = self.session.free_duration_seconds, to = seconds, "Free duration changed");
        self.session.free_duration_seconds = seconds;

        if self.session.payment_successful {
            return Ok(self.session.gate_state);
        }

        let reopen = seconds == 0.0 || seconds - GATE_EPSILON_SECONDS > self.session.elapsed_watch_seconds;
        if self.session.gate_state.is_gated() {
            if reopen {
                self.abandon_negotiations();
                self.session.lift_gate()?;
                self.host.overlay.hide();
                self.host.playback.resume();
            }
        } else {
            self.evaluate_gate();
        }
        Ok(self.session.gate_state)
    }

    /// Return the session to the start of the preview (host/ops hook).
    ///
    /// Refused once paid or locked.
    pub fn reset_entitlement(&mut self) -> Result<(), PlaygateError> {
        self.session.reset_to_preview()?;
        self.abandon_negotiations();
        self.host.overlay.hide();
        self.sync_auth_fields();
        info!(session_id = %self.session.session_id, "Entitlement reset");
        Ok(())
    }

    /// Ask to start playback. Refused while gated or locked.
    pub fn request_play(&mut self) -> Result<(), PlaygateError> {
        self.evaluate_gate();
        match self.session.gate_state {
            GateState::Locked => Err(PlaygateError::Locked),
            state if state.is_gated() => Err(PlaygateError::WrongState(state)),
            _ => {
                self.host.playback.resume();
                Ok(())
            }
        }
    }

    /// Re-open the gate overlay after the user dismissed the challenge.
    pub fn reopen_gate(&mut self) -> Result<GateState, PlaygateError> {
        match self.session.gate_state {
            GateState::GateHit => {
                self.route_from_gate_hit()?;
                Ok(self.session.gate_state)
            }
            GateState::Locked => Err(PlaygateError::Locked),
            state => Err(PlaygateError::WrongState(state)),
        }
    }

    fn evaluate_gate(&mut self) {
        let now = self.now();
        if !self.session.should_gate(now, self.config.payment_grace()) {
            return;
        }
        if let Err(e) = self.enter_gate() {
            warn!(error = %e, "Could not close gate");
        }
    }

    /// Close the gate (`Preview -> GateHit`), then route straight on to
    /// `Authenticating` or `AwaitingPayment` within the same call.
    fn enter_gate(&mut self) -> Result<(), PlaygateError> {
        self.session.transition(GateState::GateHit)?;
        let limit = self.session.free_duration_seconds;
        self.host.playback.pause();
        self.host.playback.seek_to(clamp_target(limit));

        info!(
            session_id = %self.session.session_id,
            elapsed = self.session.elapsed_watch_seconds,
            limit,
            "Free preview ended"
        );
        self.host.events.emit(GateEvent::FreePreviewEnded {
            elapsed_seconds: self.session.elapsed_watch_seconds,
            limit_seconds: limit,
        });

        self.route_from_gate_hit()
    }

    fn route_from_gate_hit(&mut self) -> Result<(), PlaygateError> {
        let auth = &self.config.auth;
        let signed_in = auth.skip_if_authenticated && self.session.authenticated_user.is_some();
        if auth.enabled && !signed_in {
            self.session.transition(GateState::Authenticating)?;
            self.show_overlay(OverlayView::Auth);
        } else {
            self.session.transition(GateState::AwaitingPayment)?;
            self.show_overlay(OverlayView::Payment);
        }
        Ok(())
    }

    fn show_overlay(&mut self, view: OverlayView) {
        self.monitor.begin_overlay_cycle(&mut self.session);
        self.host.overlay.show(view);
    }

    fn grant(&mut self, source: GrantSource) -> Result<(), PlaygateError> {
        let now = self.now();
        self.session.grant(source, now)?;
        self.host.overlay.hide();
        self.host.playback.resume();
        info!(session_id = %self.session.session_id, ?source, "Entitlement granted");
        self.host.events.emit(GateEvent::EntitlementGranted { source });
        Ok(())
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.host.events.emit(GateEvent::Notice {
            level,
            message: message.into(),
        });
    }

    fn abandon_negotiations(&mut self) {
        self.auth.cancel();
        if let Some(handle) = self.payment.cancel() {
            self.host.contexts.close(handle);
        }
    }

    fn require_state(&self, expected: GateState) -> Result<(), PlaygateError> {
        match self.session.gate_state {
            GateState::Locked => Err(PlaygateError::Locked),
            state if state == expected => Ok(()),
            state => Err(PlaygateError::WrongState(state)),
        }
    }

    // ----- sign-in ------------------------------------------------------

    /// Validate the email and reserve an OTP request.
    pub fn begin_otp_request(&mut self, email: &str) -> Result<OtpRequestTicket, PlaygateError> {
        self.require_state(GateState::Authenticating)?;
        let now = self.now();
        let ticket = self.auth.begin_request(email, now)?;
        debug!(email = %email_fingerprint(&ticket.email), "OTP requested");
        Ok(ticket)
    }

    /// Request body for an OTP ticket.
    pub fn otp_request_body(&self, ticket: &OtpRequestTicket) -> RequestOtpBody {
        RequestOtpBody {
            email: ticket.email.clone(),
            slug: self.config.slug.clone(),
            video_id: self.config.video_id.clone(),
            extra: self.config.auth.request_payload.clone(),
        }
    }

    /// Apply the OTP request response.
    pub fn complete_otp_request(
        &mut self,
        ticket: &OtpRequestTicket,
        result: Result<RequestOtpResponse, PlaygateError>,
    ) -> Result<(), PlaygateError> {
        let now = self.now();
        let outcome = self.auth.complete_request(ticket, result, now);
        self.sync_auth_fields();
        if let Err(e) = &outcome {
            if !matches!(e, PlaygateError::Stale) {
                warn!(email = %email_fingerprint(&ticket.email), error = %e, "OTP request failed");
                self.notice(NoticeLevel::Error, e.to_string());
            }
        }
        outcome
    }

    /// Validate the code and reserve a verification.
    pub fn begin_otp_verify(&mut self, code: &str) -> Result<OtpVerifyTicket, PlaygateError> {
        self.require_state(GateState::Authenticating)?;
        let result = self.auth.begin_verify(code);
        self.sync_auth_fields();
        result
    }

    /// Request body for a verification ticket.
    pub fn otp_verify_body(&self, ticket: &OtpVerifyTicket) -> VerifyOtpBody {
        VerifyOtpBody {
            session_token: ticket.challenge_token.clone(),
            email: ticket.email.clone(),
            otp: ticket.code.clone(),
        }
    }

    /// Apply the verification response and route the session.
    pub fn complete_otp_verify(
        &mut self,
        ticket: &OtpVerifyTicket,
        result: Result<VerifyOtpResponse, PlaygateError>,
    ) -> Result<GateState, PlaygateError> {
        let outcome = match self.auth.complete_verify(ticket, result) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.sync_auth_fields();
                if !matches!(e, PlaygateError::Stale) {
                    warn!(
                        email = %email_fingerprint(&ticket.email),
                        attempts = self.session.auth_attempts,
                        error = %e,
                        "OTP verification failed"
                    );
                    self.notice(NoticeLevel::Error, e.to_string());
                }
                return Err(e);
            }
        };
        self.sync_auth_fields();

        if let Err(e) = self.host.tokens.persist(&outcome.token) {
            warn!(error = %e, "Could not persist session token");
        }
        self.session.authenticated_user = Some(outcome.token.user_id.clone());
        info!(
            email = %email_fingerprint(&ticket.email),
            decision = ?outcome.decision,
            "OTP verified"
        );

        match outcome.decision {
            AccessDecision::Granted => self.grant(GrantSource::Authentication)?,
            AccessDecision::PreviewExtended { free_duration_seconds }
                if free_duration_seconds - GATE_EPSILON_SECONDS > self.session.elapsed_watch_seconds =>
            {
                self.session.free_duration_seconds = free_duration_seconds;
                self.session.transition(GateState::Preview)?;
                self.host.overlay.hide();
                self.host.playback.resume();
            }
            AccessDecision::PreviewExtended { .. } | AccessDecision::PaymentRequired => {
                self.session.transition(GateState::AwaitingPayment)?;
                self.show_overlay(OverlayView::Payment);
            }
        }
        Ok(self.session.gate_state)
    }

    /// Dismiss the sign-in challenge. Playback stays paused.
    pub fn cancel_auth(&mut self) -> Result<(), PlaygateError> {
        self.require_state(GateState::Authenticating)?;
        self.auth.cancel();
        self.session.transition(GateState::GateHit)?;
        self.host.overlay.hide();
        self.sync_auth_fields();
        Ok(())
    }

    /// Refresh the resend cooldown. Returns the remaining whole seconds.
    pub fn tick_resend_cooldown(&mut self) -> u64 {
        self.sync_auth_fields();
        self.session.otp_resend_cooldown_remaining
    }

    /// Forget the stored session token. Returns it so the caller can
    /// revoke it server-side.
    pub fn sign_out(&mut self) -> Option<SessionToken> {
        let token = self.host.tokens.read().ok().flatten();
        if let Err(e) = self.host.tokens.clear() {
            warn!(error = %e, "Could not clear session token");
        }
        self.session.authenticated_user = None;
        info!(session_id = %self.session.session_id, "Signed out");
        token
    }

    fn sync_auth_fields(&mut self) {
        let now = self.now();
        self.session.auth_attempts = self.auth.attempts();
        self.session.otp_resend_cooldown_remaining = self.auth.cooldown_remaining(now);
    }

    // ----- payment ------------------------------------------------------

    /// Gateways offered to the user.
    pub fn list_gateways(&self) -> &[GatewayDescriptor] {
        self.payment.list_gateways()
    }

    /// Start a payment with the selected gateway.
    pub fn begin_payment(&mut self, gateway_id: &str) -> Result<CheckoutTicket, PlaygateError> {
        self.require_state(GateState::AwaitingPayment)?;

        let strategy = match resolve_strategy(&self.config, gateway_id, self.payment_handler.is_some()) {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!(gateway = gateway_id, "No payment strategy for gateway");
                self.notice(NoticeLevel::Error, e.to_string());
                return Err(e);
            }
        };

        let request = PaymentRequest {
            gateway_id: gateway_id.to_string(),
            session_id: self.session.session_id.clone(),
            amount: self.config.pricing.amount,
            currency: self.config.pricing.currency.clone(),
            user_id: self
                .config
                .user_id
                .clone()
                .or_else(|| self.session.authenticated_user.clone()),
            video_id: self.config.video_id.clone(),
            slug: self.config.slug.clone(),
        };
        let ticket = self.payment.begin(strategy, request)?;
        info!(gateway = gateway_id, ?strategy, "Payment started");
        Ok(ticket)
    }

    /// Apply the checkout creation result and open the checkout page.
    ///
    /// Returns the opened context, or `None` if the host could not open it.
    pub fn checkout_ready(
        &mut self,
        ticket: &CheckoutTicket,
        result: Result<CheckoutLink, PlaygateError>,
    ) -> Result<Option<ContextHandle>, PlaygateError> {
        let link = match result {
            Ok(link) => link,
            Err(e) => {
                self.payment.checkout_failed(ticket)?;
                warn!(gateway = %ticket.gateway.id, error = %e, "Checkout creation failed");
                self.notice(NoticeLevel::Error, e.to_string());
                return Err(e);
            }
        };

        self.payment.checkout_created(ticket, &link)?;
        match self.host.contexts.open(&link.url) {
            Some(handle) => {
                self.payment.attach_context(handle);
                debug!(gateway = %ticket.gateway.id, order_id = ?link.order_id, "Checkout opened");
                Ok(Some(handle))
            }
            None => {
                self.payment.cancel();
                warn!(gateway = %ticket.gateway.id, "Checkout window blocked");
                self.notice(
                    NoticeLevel::Error,
                    "The payment window was blocked. Allow popups and try again.",
                );
                Ok(None)
            }
        }
    }

    /// Handle a raw message posted to the host page.
    ///
    /// Returns a verification ticket when a success message for the active
    /// negotiation arrived; everything else is handled in place.
    pub fn handle_completion_message(
        &mut self,
        raw: &serde_json::Value,
    ) -> Result<Option<VerifyTicket>, PlaygateError> {
        let Some(message) = parse_completion_message(raw)? else {
            return Ok(None);
        };
        if self.session.gate_state != GateState::AwaitingPayment {
            debug!(state = %self.session.gate_state, "Completion message outside payment");
            return Ok(None);
        }

        match self.payment.accept_completion(&message) {
            CompletionOutcome::Ignored => Ok(None),
            CompletionOutcome::Cancelled { context } => {
                self.close_context(context);
                self.session.transition(GateState::AwaitingPayment)?;
                self.show_overlay(OverlayView::Payment);
                self.notice(NoticeLevel::Info, "Payment cancelled");
                Ok(None)
            }
            CompletionOutcome::Failed { context } => {
                self.close_context(context);
                self.session.transition(GateState::AwaitingPayment)?;
                self.show_overlay(OverlayView::Payment);
                self.notice(NoticeLevel::Error, "Payment failed. Please try again.");
                Ok(None)
            }
            CompletionOutcome::Verify { context, ticket } => {
                self.close_context(context);
                self.session.transition(GateState::PaymentVerifying)?;
                info!(order_id = ?ticket.request.order_id, "Payment reported complete, verifying");
                Ok(Some(ticket))
            }
        }
    }

    /// Apply the server-side verification result.
    pub fn complete_payment_verification(
        &mut self,
        ticket: &VerifyTicket,
        result: Result<bool, PlaygateError>,
    ) -> Result<GateState, PlaygateError> {
        self.payment.verification_finished(ticket)?;

        let error = match result {
            Ok(true) => {
                self.grant(GrantSource::Payment)?;
                return Ok(self.session.gate_state);
            }
            Ok(false) => PlaygateError::VerificationFailed("Payment could not be verified".to_string()),
            Err(e) => e,
        };

        warn!(order_id = ?ticket.request.order_id, error = %error, "Payment verification failed");
        self.session.transition(GateState::AwaitingPayment)?;
        self.show_overlay(OverlayView::Payment);
        self.notice(NoticeLevel::Error, error.to_string());
        Err(error)
    }

    /// Abandon the active payment and return to gateway selection.
    pub fn cancel_payment(&mut self) -> Result<(), PlaygateError> {
        match self.session.gate_state {
            GateState::AwaitingPayment => {}
            GateState::PaymentVerifying => {
                self.session.transition(GateState::AwaitingPayment)?;
                self.show_overlay(OverlayView::Payment);
            }
            GateState::Locked => return Err(PlaygateError::Locked),
            state => return Err(PlaygateError::WrongState(state)),
        }
        if let Some(handle) = self.payment.cancel() {
            self.host.contexts.close(handle);
        }
        Ok(())
    }

    /// Check whether the checkout page was closed without a message.
    ///
    /// Returns whether the negotiation was abandoned.
    pub fn poll_payment_context(&mut self) -> bool {
        let contexts = self.host.contexts.clone();
        if !self.payment.poll_context(|handle| contexts.is_closed(handle)) {
            return false;
        }
        info!("Checkout window closed without completing");
        self.show_overlay(OverlayView::Payment);
        self.notice(NoticeLevel::Info, "Payment window closed");
        true
    }

    fn close_context(&self, context: Option<ContextHandle>) {
        if let Some(handle) = context {
            self.host.contexts.close(handle);
        }
    }

    // ----- security -----------------------------------------------------

    /// Whether periodic security checks should run.
    pub fn security_active(&self) -> bool {
        !self.torn_down && self.monitor.should_run(&self.session)
    }

    /// Run one security check against the host.
    pub fn security_tick(&mut self) -> SecurityVerdict {
        if !self.security_active() {
            return SecurityVerdict::default();
        }

        let sample = SecuritySample {
            overlay_visible: self.host.overlay.is_visible(),
            playing: self.host.playback.is_playing(),
            position: self.host.playback.position(),
        };
        let now = self.now();
        let verdict = self.monitor.inspect(&mut self.session, &sample, now);

        if verdict.lockdown {
            self.lockdown();
            return verdict;
        }
        if let Some(view) = verdict.reshow {
            self.host.overlay.show(view);
            let tamper = PlaygateError::TamperDetected {
                attempts: self.session.overlay_removal_attempts,
                max: self.session.max_overlay_removal_attempts,
            };
            self.notice(NoticeLevel::Error, tamper.to_string());
        }
        if verdict.force_pause {
            self.host.playback.pause();
        }
        if let Some(target) = verdict.reclamp_to {
            self.host.playback.seek_to(target);
        }
        if let Some(position) = verdict.feed_position {
            self.on_position_report(position);
        }
        verdict
    }

    fn lockdown(&mut self) {
        if self.session.transition(GateState::Locked).is_err() {
            return;
        }
        self.abandon_negotiations();
        self.sync_auth_fields();
        self.host.playback.pause();
        self.host.overlay.show(OverlayView::Locked);

        let attempts = self.session.overlay_removal_attempts;
        warn!(session_id = %self.session.session_id, attempts, "Security lockdown");
        self.host.events.emit(GateEvent::SecurityLockdown { attempts });
        self.notice(NoticeLevel::Fatal, PlaygateError::Locked.to_string());
    }

    /// Stop everything. Further reports and checks are ignored.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.abandon_negotiations();
        self.torn_down = true;
        info!(session_id = %self.session.session_id, "Gate session torn down");
    }
}
