//! Async runtime around a [`GateController`].
//!
//! `GateService` runs the network half of every `begin_*`/`complete_*`
//! pair and owns the periodic work:
//! - Security checks (every `security.check_interval_ms`)
//! - The OTP resend countdown (every second while a cooldown is active)
//! - Checkout popup polling (every `popup_poll_interval_secs`)
//!
//! The controller lock is never held across an `.await`. Timer tasks hold
//! only a weak reference to the service and are aborted on `shutdown()` or
//! when the last handle is dropped.

use crate::client::http::{EntitlementApi, HttpEntitlementClient};
use crate::config::PlaygateConfig;
use crate::controller::GateController;
use crate::host::{ContextHandle, HostBindings};
use crate::payment::gateway::PaymentStrategy;
use crate::payment::negotiation::PaymentPhase;
use crate::session::state::{EntitlementSession, GateState};
use crate::PlaygateError;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COOLDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Timers {
    security: Option<JoinHandle<()>>,
    cooldown: Option<JoinHandle<()>>,
    popup: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        for task in [self.security.take(), self.cooldown.take(), self.popup.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.abort_all();
    }
}

fn running(task: &Option<JoinHandle<()>>) -> bool {
    task.as_ref().is_some_and(|t| !t.is_finished())
}

struct ServiceInner {
    controller: Mutex<GateController>,
    api: Arc<dyn EntitlementApi>,
    timers: Mutex<Timers>,
}

impl ServiceInner {
    fn lock(&self) -> MutexGuard<'_, GateController> {
        self.controller.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sync_timers(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("No tokio runtime, timers not started");
            return;
        };

        let (security, cooldown, popup, check_interval, poll_interval) = {
            let controller = self.lock();
            (
                controller.security_active(),
                !controller.is_torn_down() && controller.session().otp_resend_cooldown_remaining > 0,
                !controller.is_torn_down()
                    && controller.payment_phase() == Some(PaymentPhase::AwaitingCompletion),
                controller.config().security.check_interval(),
                controller.config().popup_poll_interval(),
            )
        };

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if security && !running(&timers.security) {
            timers.security = Some(spawn_timer(&runtime, Arc::downgrade(self), check_interval, |c| {
                c.security_tick();
                c.security_active()
            }));
        }
        if cooldown && !running(&timers.cooldown) {
            timers.cooldown = Some(spawn_timer(&runtime, Arc::downgrade(self), COOLDOWN_TICK, |c| {
                !c.is_torn_down() && c.tick_resend_cooldown() > 0
            }));
        }
        if popup && !running(&timers.popup) {
            timers.popup = Some(spawn_timer(&runtime, Arc::downgrade(self), poll_interval, |c| {
                if c.is_torn_down() || c.payment_phase() != Some(PaymentPhase::AwaitingCompletion) {
                    return false;
                }
                !c.poll_payment_context()
            }));
        }
    }
}

/// Spawn a periodic task. `tick` runs under the controller lock and
/// returns whether the timer should keep going.
fn spawn_timer<F>(runtime: &Handle, weak: Weak<ServiceInner>, period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut(&mut GateController) -> bool + Send + 'static,
{
    runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let mut controller = inner.lock();
            if !tick(&mut controller) {
                break;
            }
        }
    })
}

/// Async, shareable handle to one gated player.
#[derive(Clone)]
pub struct GateService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for GateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateService")
            .field("controller", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl GateService {
    /// Wrap a controller. Timers start if called inside a tokio runtime.
    pub fn new(controller: GateController, api: Arc<dyn EntitlementApi>) -> Self {
        let inner = Arc::new(ServiceInner {
            controller: Mutex::new(controller),
            api,
            timers: Mutex::new(Timers::default()),
        });
        inner.sync_timers();
        Self { inner }
    }

    /// Build a controller and an HTTP client from config.
    pub fn connect(config: PlaygateConfig, host: HostBindings) -> Result<Self, PlaygateError> {
        let api = HttpEntitlementClient::new(&config)?;
        let controller = GateController::new(config, host)?;
        Ok(Self::new(controller, Arc::new(api)))
    }

    /// Run `f` against the controller under its lock.
    ///
    /// Timers are re-synchronised afterwards.
    pub fn with_controller<R>(&self, f: impl FnOnce(&mut GateController) -> R) -> R {
        let result = {
            let mut controller = self.inner.lock();
            f(&mut controller)
        };
        self.inner.sync_timers();
        result
    }

    /// Current gate state.
    pub fn current_state(&self) -> GateState {
        self.inner.lock().current_state()
    }

    /// Session snapshot.
    pub fn snapshot(&self) -> EntitlementSession {
        self.inner.lock().snapshot()
    }

    /// Feed a playback position.
    pub fn on_position_report(&self, seconds: f64) -> GateState {
        self.with_controller(|c| c.on_position_report(seconds))
    }

    /// Change the free preview length.
    pub fn configure_free_duration(&self, seconds: f64) -> Result<GateState, PlaygateError> {
        self.with_controller(|c| c.configure_free_duration(seconds))
    }

    /// Reset to the start of the preview.
    pub fn reset_entitlement(&self) -> Result<(), PlaygateError> {
        self.with_controller(|c| c.reset_entitlement())
    }

    /// Ask to start playback.
    pub fn request_play(&self) -> Result<(), PlaygateError> {
        self.with_controller(|c| c.request_play())
    }

    /// Request an OTP for `email`.
    pub async fn request_otp(&self, email: &str) -> Result<(), PlaygateError> {
        let (ticket, body) = {
            let mut controller = self.inner.lock();
            let ticket = controller.begin_otp_request(email)?;
            let body = controller.otp_request_body(&ticket);
            (ticket, body)
        };

        let result = self.inner.api.request_otp(&body).await;
        self.with_controller(|c| c.complete_otp_request(&ticket, result))
    }

    /// Verify an OTP code.
    pub async fn verify_otp(&self, code: &str) -> Result<GateState, PlaygateError> {
        let (ticket, body) = {
            let mut controller = self.inner.lock();
            let ticket = controller.begin_otp_verify(code)?;
            let body = controller.otp_verify_body(&ticket);
            (ticket, body)
        };

        let result = self.inner.api.verify_otp(&body).await;
        self.with_controller(|c| c.complete_otp_verify(&ticket, result))
    }

    /// Dismiss the sign-in challenge.
    pub fn cancel_auth(&self) -> Result<(), PlaygateError> {
        self.with_controller(|c| c.cancel_auth())
    }

    /// Re-open the challenge from `GateHit`.
    pub fn reopen_gate(&self) -> Result<GateState, PlaygateError> {
        self.with_controller(|c| c.reopen_gate())
    }

    /// Forget the stored token and revoke it server-side (best effort).
    pub async fn sign_out(&self) {
        let token = self.with_controller(|c| c.sign_out());
        if let Some(token) = token {
            if let Err(e) = self.inner.api.logout(&token).await {
                warn!(error = %e, "Logout request failed");
            }
        }
    }

    /// Start a payment and open the checkout page.
    ///
    /// Returns `None` when the host could not open the page.
    pub async fn begin_payment(&self, gateway_id: &str) -> Result<Option<ContextHandle>, PlaygateError> {
        let (ticket, handler, link_config) = {
            let mut controller = self.inner.lock();
            let ticket = controller.begin_payment(gateway_id)?;
            (
                ticket,
                controller.payment_handler(),
                controller.config().payment_link.clone(),
            )
        };

        let result = match (ticket.strategy, handler, link_config) {
            (PaymentStrategy::Custom, Some(handler), _) => {
                handler.create_checkout(&ticket.gateway, &ticket.request).await
            }
            (PaymentStrategy::PaymentLink, _, Some(link)) => {
                self.inner.api.create_payment_link(&link, &ticket.request).await
            }
            (PaymentStrategy::BuiltIn(gateway), _, _) => {
                self.inner.api.create_builtin_checkout(gateway, &ticket.request).await
            }
            _ => Err(PlaygateError::MethodUnavailable {
                gateway: ticket.gateway.id.clone(),
            }),
        };

        self.with_controller(|c| c.checkout_ready(&ticket, result))
    }

    /// Handle a message posted to the host page.
    ///
    /// Returns the new state when the message completed a verification.
    pub async fn handle_message(&self, raw: &serde_json::Value) -> Result<Option<GateState>, PlaygateError> {
        let (ticket, handler) = {
            let mut controller = self.inner.lock();
            match controller.handle_completion_message(raw)? {
                Some(ticket) => (ticket, controller.payment_handler()),
                None => return Ok(None),
            }
        };

        let result = match (ticket.request.strategy, handler) {
            (PaymentStrategy::Custom, Some(handler)) => handler.verify(&ticket.request).await,
            _ => self.inner.api.verify_payment(&ticket.request).await,
        };

        self.with_controller(|c| c.complete_payment_verification(&ticket, result))
            .map(Some)
    }

    /// Abandon the active payment.
    pub fn cancel_payment(&self) -> Result<(), PlaygateError> {
        self.with_controller(|c| c.cancel_payment())
    }

    /// Tear down the controller and stop every timer.
    pub fn shutdown(&self) {
        self.inner.lock().teardown();
        self.inner
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::{AuthConfig, GatewayDescriptor, PaymentLinkConfig};
    use crate::host::{OverlayView, SessionToken};
    use crate::payment::gateway::{
        BuiltInGateway, CheckoutLink, PaymentHandler, PaymentRequest, PaymentVerificationRequest,
    };
    use crate::protocol::models::{
        RequestOtpBody, RequestOtpData, RequestOtpResponse, VerifyOtpBody, VerifyOtpData,
        VerifyOtpResponse, COMPLETION_MESSAGE_TYPE,
    };
    use crate::testing::MockHost;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wall clock that follows tokio's (pausable) clock.
    struct TokioClock {
        start: tokio::time::Instant,
        base: DateTime<Utc>,
    }

    impl TokioClock {
        fn new() -> Self {
            Self {
                start: tokio::time::Instant::now(),
                base: DateTime::parse_from_rfc3339("2025-01-15T12:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            }
        }
    }

    impl Clock for TokioClock {
        fn now_utc(&self) -> DateTime<Utc> {
            let elapsed = tokio::time::Instant::now() - self.start;
            self.base + chrono::Duration::from_std(elapsed).unwrap()
        }
    }

    #[derive(Default)]
    struct FakeApi {
        otp_requests: AtomicUsize,
        verifications: AtomicUsize,
        checkouts: AtomicUsize,
        logouts: AtomicUsize,
    }

    #[async_trait]
    impl EntitlementApi for FakeApi {
        async fn request_otp(&self, _body: &RequestOtpBody) -> Result<RequestOtpResponse, PlaygateError> {
            self.otp_requests.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(RequestOtpResponse {
                status: true,
                message: None,
                data: Some(RequestOtpData {
                    session_token: "challenge".to_string(),
                }),
            })
        }

        async fn verify_otp(&self, body: &VerifyOtpBody) -> Result<VerifyOtpResponse, PlaygateError> {
            Ok(VerifyOtpResponse {
                status: true,
                message: None,
                data: Some(VerifyOtpData {
                    session_token: "durable".to_string(),
                    email: body.email.clone(),
                    video_id: None,
                    video_slug: None,
                    email_verified: Some(true),
                    access_granted: false,
                    requires_payment: true,
                    access_type: None,
                    price: None,
                    free_duration: None,
                }),
            })
        }

        async fn create_payment_link(
            &self,
            _config: &PaymentLinkConfig,
            _request: &PaymentRequest,
        ) -> Result<CheckoutLink, PlaygateError> {
            Err(PlaygateError::Network("not configured".to_string()))
        }

        async fn create_builtin_checkout(
            &self,
            _gateway: BuiltInGateway,
            _request: &PaymentRequest,
        ) -> Result<CheckoutLink, PlaygateError> {
            self.checkouts.fetch_add(1, Ordering::SeqCst);
            Ok(CheckoutLink {
                url: "https://pay.example/order".to_string(),
                order_id: Some("X".to_string()),
                checkout_session_id: None,
            })
        }

        async fn verify_payment(&self, request: &PaymentVerificationRequest) -> Result<bool, PlaygateError> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            Ok(request.order_id.as_deref() == Some("X"))
        }

        async fn logout(&self, _token: &SessionToken) -> Result<(), PlaygateError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeHandler {
        checkouts: AtomicUsize,
    }

    #[async_trait]
    impl PaymentHandler for FakeHandler {
        async fn create_checkout(
            &self,
            gateway: &GatewayDescriptor,
            _request: &PaymentRequest,
        ) -> Result<CheckoutLink, PlaygateError> {
            self.checkouts.fetch_add(1, Ordering::SeqCst);
            Ok(CheckoutLink {
                url: format!("https://{}.example/pay", gateway.id),
                order_id: Some("custom-1".to_string()),
                checkout_session_id: None,
            })
        }

        async fn verify(&self, _request: &PaymentVerificationRequest) -> Result<bool, PlaygateError> {
            Ok(true)
        }
    }

    fn test_config(auth: bool) -> PlaygateConfig {
        PlaygateConfig {
            free_duration_seconds: 30.0,
            api_base: "https://api.example.com".to_string(),
            gateways: vec![GatewayDescriptor::from_id("cashfree")],
            auth: AuthConfig {
                enabled: auth,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn make_service(auth: bool) -> (GateService, Arc<MockHost>, Arc<FakeApi>) {
        let host = MockHost::new();
        let api = Arc::new(FakeApi::default());
        let controller =
            GateController::new_with_clock(test_config(auth), host.bindings(), Arc::new(TokioClock::new()))
                .unwrap();
        (GateService::new(controller, api.clone()), host, api)
    }

    fn completion(status: &str, order_id: &str) -> serde_json::Value {
        json!({"type": COMPLETION_MESSAGE_TYPE, "status": status, "orderId": order_id})
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_otp_request_makes_one_call() {
        let (service, _, api) = make_service(true);
        service.on_position_report(30.0);
        assert_eq!(service.current_state(), GateState::Authenticating);

        let (first, second) = tokio::join!(
            service.request_otp("viewer@example.com"),
            service.request_otp("viewer@example.com")
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(PlaygateError::RequestInFlight)));
        assert_eq!(api.otp_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_counts_down() {
        let (service, _, _) = make_service(true);
        service.on_position_report(30.0);
        service.request_otp("viewer@example.com").await.unwrap();
        assert_eq!(service.snapshot().otp_resend_cooldown_remaining, 30);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(service.snapshot().otp_resend_cooldown_remaining, 20);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(service.snapshot().otp_resend_cooldown_remaining, 0);
        service.request_otp("viewer@example.com").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_security_timer_locks_after_removals() {
        let (service, host, _) = make_service(false);
        service.on_position_report(30.0);
        assert_eq!(host.overlay(), Some(OverlayView::Payment));

        tokio::time::sleep(Duration::from_millis(500)).await;
        for _ in 0..3 {
            host.strip_overlay();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        assert_eq!(service.current_state(), GateState::Locked);
        assert_eq!(host.count_events("SecurityLockdown"), 1);
        assert_eq!(host.overlay(), Some(OverlayView::Locked));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_monitoring() {
        let (service, host, _) = make_service(false);
        service.on_position_report(30.0);
        service.shutdown();

        for _ in 0..5 {
            host.strip_overlay();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(service.current_state(), GateState::AwaitingPayment);
        assert_eq!(host.count_events("SecurityLockdown"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_through_builtin_gateway() {
        let (service, host, api) = make_service(false);
        service.on_position_report(30.0);

        let handle = service.begin_payment("cashfree").await.unwrap();
        assert!(handle.is_some());
        assert_eq!(api.checkouts.load(Ordering::SeqCst), 1);

        let stray = service.handle_message(&completion("success", "Y")).await.unwrap();
        assert!(stray.is_none());
        assert_eq!(api.verifications.load(Ordering::SeqCst), 0);

        let state = service.handle_message(&completion("success", "X")).await.unwrap();
        assert_eq!(state, Some(GateState::Granted));
        assert_eq!(api.verifications.load(Ordering::SeqCst), 1);
        assert!(host.playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_popup_poll_returns_to_selection() {
        let (service, host, _) = make_service(false);
        service.on_position_report(30.0);
        let handle = service.begin_payment("cashfree").await.unwrap().unwrap();

        host.close_popup(handle);
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(service.with_controller(|c| c.payment_phase()).is_none());
        assert_eq!(service.current_state(), GateState::AwaitingPayment);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_handler_takes_precedence() {
        let host = MockHost::new();
        let api = Arc::new(FakeApi::default());
        let handler = Arc::new(FakeHandler::default());
        let controller =
            GateController::new_with_clock(test_config(false), host.bindings(), Arc::new(TokioClock::new()))
                .unwrap()
                .with_payment_handler(handler.clone());
        let service = GateService::new(controller, api.clone());

        service.on_position_report(30.0);
        service.begin_payment("cashfree").await.unwrap();
        assert_eq!(handler.checkouts.load(Ordering::SeqCst), 1);
        assert_eq!(api.checkouts.load(Ordering::SeqCst), 0);

        let state = service.handle_message(&completion("success", "custom-1")).await.unwrap();
        assert_eq!(state, Some(GateState::Granted));
        assert_eq!(api.verifications.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_then_sign_out() {
        let (service, host, api) = make_service(true);
        service.on_position_report(30.0);
        service.request_otp("viewer@example.com").await.unwrap();
        let state = service.verify_otp("123456").await.unwrap();
        assert_eq!(state, GateState::AwaitingPayment);
        assert!(host.stored_token().is_some());

        service.sign_out().await;
        assert!(host.stored_token().is_none());
        assert_eq!(api.logouts.load(Ordering::SeqCst), 1);
    }
}
