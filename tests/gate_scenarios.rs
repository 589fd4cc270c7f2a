//! End-to-end gate scenarios driven through the public controller API.

use playgate::config::AuthConfig;
use playgate::host::{
    ContextHandle, EventSink, ExternalContexts, GateOverlay, PlaybackSurface, SessionToken,
    TokenStore,
};
use playgate::payment::gateway::CheckoutLink;
use playgate::protocol::models::{
    RequestOtpData, RequestOtpResponse, VerifyOtpData, VerifyOtpResponse, COMPLETION_MESSAGE_TYPE,
};
use playgate::{
    GateController, GateEvent, GateState, GatewayDescriptor, HostBindings, OverlayView,
    PlaygateConfig, PlaygateError,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Player {
    playing: bool,
    position: f64,
    overlay: Option<OverlayView>,
    overlay_visible: bool,
    next_context: u64,
    closed: Vec<ContextHandle>,
    token: Option<SessionToken>,
    events: Vec<GateEvent>,
}

#[derive(Default)]
struct FakeHost {
    player: Mutex<Player>,
}

impl FakeHost {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn bindings(self: &Arc<Self>) -> HostBindings {
        HostBindings {
            playback: self.clone(),
            overlay: self.clone(),
            contexts: self.clone(),
            tokens: self.clone(),
            events: self.clone(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Player) -> R) -> R {
        f(&mut self.player.lock().unwrap())
    }

    fn count(&self, name: &str) -> usize {
        self.with(|p| p.events.iter().filter(|e| e.name() == name).count())
    }

    fn strip_overlay(&self) {
        self.with(|p| p.overlay_visible = false);
    }

    fn force_play(&self) {
        self.with(|p| p.playing = true);
    }
}

impl PlaybackSurface for FakeHost {
    fn pause(&self) {
        self.with(|p| p.playing = false);
    }
    fn resume(&self) {
        self.with(|p| p.playing = true);
    }
    fn seek_to(&self, seconds: f64) {
        self.with(|p| p.position = seconds);
    }
    fn position(&self) -> f64 {
        self.with(|p| p.position)
    }
    fn is_playing(&self) -> bool {
        self.with(|p| p.playing)
    }
}

impl GateOverlay for FakeHost {
    fn show(&self, view: OverlayView) {
        self.with(|p| {
            p.overlay = Some(view);
            p.overlay_visible = true;
        });
    }
    fn hide(&self) {
        self.with(|p| {
            p.overlay = None;
            p.overlay_visible = false;
        });
    }
    fn is_visible(&self) -> bool {
        self.with(|p| p.overlay_visible)
    }
}

impl ExternalContexts for FakeHost {
    fn open(&self, _url: &str) -> Option<ContextHandle> {
        self.with(|p| {
            p.next_context += 1;
            Some(ContextHandle(p.next_context))
        })
    }
    fn is_closed(&self, handle: ContextHandle) -> bool {
        self.with(|p| p.closed.contains(&handle))
    }
    fn close(&self, handle: ContextHandle) {
        self.with(|p| p.closed.push(handle));
    }
}

impl TokenStore for FakeHost {
    fn persist(&self, token: &SessionToken) -> Result<(), PlaygateError> {
        self.with(|p| p.token = Some(token.clone()));
        Ok(())
    }
    fn read(&self) -> Result<Option<SessionToken>, PlaygateError> {
        Ok(self.with(|p| p.token.clone()))
    }
    fn clear(&self) -> Result<(), PlaygateError> {
        self.with(|p| p.token = None);
        Ok(())
    }
}

impl EventSink for FakeHost {
    fn emit(&self, event: GateEvent) {
        self.with(|p| p.events.push(event));
    }
}

fn config(auth: bool) -> PlaygateConfig {
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

fn controller(auth: bool) -> (GateController, Arc<FakeHost>) {
    let host = FakeHost::new();
    let controller = GateController::new(config(auth), host.bindings()).unwrap();
    (controller, host)
}

fn completion(status: &str, order_id: &str) -> serde_json::Value {
    json!({"type": COMPLETION_MESSAGE_TYPE, "status": status, "orderId": order_id})
}

fn open_checkout(controller: &mut GateController, order_id: &str) {
    let ticket = controller.begin_payment("cashfree").unwrap();
    let link = CheckoutLink {
        url: "https://pay.example/order".to_string(),
        order_id: Some(order_id.to_string()),
        checkout_session_id: None,
    };
    controller.checkout_ready(&ticket, Ok(link)).unwrap().unwrap();
}

#[test]
fn preview_gates_exactly_at_limit() {
    let (mut controller, host) = controller(false);
    for position in [0.0, 10.0, 20.0, 29.0] {
        assert_eq!(controller.on_position_report(position), GateState::Preview);
    }
    assert_eq!(host.count("FreePreviewEnded"), 0);

    controller.on_position_report(30.0);
    // The gate closes and routes on to checkout in the same report.
    assert_eq!(controller.current_state(), GateState::AwaitingPayment);
    assert_eq!(host.count("FreePreviewEnded"), 1);
    assert!(matches!(
        host.with(|p| p.events[0].clone()),
        GateEvent::FreePreviewEnded { elapsed_seconds, limit_seconds }
            if elapsed_seconds == 30.0 && limit_seconds == 30.0
    ));
    assert!(!host.is_playing());

    controller.on_position_report(30.0);
    controller.on_position_report(120.0);
    assert_eq!(host.count("FreePreviewEnded"), 1);
    assert!((host.position() - 29.9).abs() < 1e-9);
}

#[test]
fn sign_in_then_verified_payment_grants() {
    let (mut controller, host) = controller(true);
    controller.on_position_report(30.0);
    assert_eq!(controller.current_state(), GateState::Authenticating);
    assert_eq!(host.with(|p| p.overlay), Some(OverlayView::Auth));

    let ticket = controller.begin_otp_request("viewer@example.com").unwrap();
    let sent = RequestOtpResponse {
        status: true,
        message: None,
        data: Some(RequestOtpData {
            session_token: "challenge".to_string(),
        }),
    };
    controller.complete_otp_request(&ticket, Ok(sent)).unwrap();

    let ticket = controller.begin_otp_verify("123456").unwrap();
    let verified = VerifyOtpResponse {
        status: true,
        message: None,
        data: Some(VerifyOtpData {
            session_token: "durable".to_string(),
            email: "viewer@example.com".to_string(),
            video_id: None,
            video_slug: None,
            email_verified: Some(true),
            access_granted: false,
            requires_payment: true,
            access_type: None,
            price: None,
            free_duration: None,
        }),
    };
    let state = controller.complete_otp_verify(&ticket, Ok(verified)).unwrap();
    assert_eq!(state, GateState::AwaitingPayment);
    assert_eq!(host.with(|p| p.token.clone()).unwrap().token, "durable");

    open_checkout(&mut controller, "X");
    let ticket = controller
        .handle_completion_message(&completion("success", "X"))
        .unwrap()
        .unwrap();
    assert_eq!(controller.current_state(), GateState::PaymentVerifying);

    let state = controller.complete_payment_verification(&ticket, Ok(true)).unwrap();
    assert_eq!(state, GateState::Granted);
    assert!(controller.session().payment_successful);
    assert_eq!(host.count("EntitlementGranted"), 1);

    controller.on_position_report(500.0);
    assert_eq!(controller.current_state(), GateState::Granted);
    assert_eq!(host.count("FreePreviewEnded"), 1);
}

#[test]
fn stray_message_leaves_negotiation_untouched() {
    let (mut controller, _host) = controller(false);
    controller.on_position_report(30.0);
    open_checkout(&mut controller, "X");

    let before = controller.snapshot();
    let result = controller
        .handle_completion_message(&completion("success", "OTHER"))
        .unwrap();
    assert!(result.is_none());
    assert_eq!(controller.snapshot(), before);
    assert!(controller.payment_phase().is_some());
}

#[test]
fn cancel_message_returns_to_gateway_selection() {
    let (mut controller, host) = controller(false);
    controller.on_position_report(30.0);
    open_checkout(&mut controller, "X");

    let result = controller
        .handle_completion_message(&json!({"type": COMPLETION_MESSAGE_TYPE, "status": "cancel"}))
        .unwrap();
    assert!(result.is_none());
    assert_eq!(controller.current_state(), GateState::AwaitingPayment);
    assert!(!controller.session().payment_successful);
    assert_eq!(host.with(|p| p.overlay), Some(OverlayView::Payment));
    assert!(controller.payment_phase().is_none());
}

#[test]
fn overlay_removals_end_in_lockdown() {
    let (mut controller, host) = controller(false);
    controller.on_position_report(30.0);

    for _ in 0..2 {
        host.strip_overlay();
        controller.security_tick();
        assert_ne!(controller.current_state(), GateState::Locked);
        assert!(host.is_visible());
    }
    host.strip_overlay();
    controller.security_tick();
    assert_eq!(controller.current_state(), GateState::Locked);
    assert_eq!(host.count("SecurityLockdown"), 1);
    assert_eq!(host.with(|p| p.overlay), Some(OverlayView::Locked));

    // Locked absorbs everything, including playback restarted by the host.
    host.force_play();
    host.seek_to(300.0);
    controller.on_position_report(300.0);
    assert!(!host.is_playing());
    assert!((host.position() - 29.9).abs() < 1e-9);

    controller.on_position_report(0.0);
    assert!(matches!(controller.request_play(), Err(PlaygateError::Locked)));
    assert!(matches!(controller.reset_entitlement(), Err(PlaygateError::Locked)));
    assert!(controller.begin_payment("cashfree").is_err());
    assert_eq!(controller.current_state(), GateState::Locked);
}

#[test]
fn forced_unpause_is_paused_again() {
    let (mut controller, host) = controller(false);
    controller.on_position_report(30.0);

    host.force_play();
    host.seek_to(80.0);
    let verdict = controller.security_tick();
    assert!(verdict.force_pause);
    assert!(!host.is_playing());
    assert!((host.position() - 29.9).abs() < 1e-9);
}

#[test]
fn zero_duration_disables_gating() {
    let host = FakeHost::new();
    let mut config = config(false);
    config.free_duration_seconds = 0.0;
    let mut controller = GateController::new(config, host.bindings()).unwrap();

    assert_eq!(controller.on_position_report(10_000.0), GateState::Preview);
    assert!(!controller.security_active());
    assert_eq!(host.count("FreePreviewEnded"), 0);
}

#[test]
fn reset_refused_after_payment() {
    let (mut controller, _host) = controller(false);
    controller.on_position_report(30.0);
    open_checkout(&mut controller, "X");
    let ticket = controller
        .handle_completion_message(&completion("success", "X"))
        .unwrap()
        .unwrap();
    controller.complete_payment_verification(&ticket, Ok(true)).unwrap();

    assert!(controller.reset_entitlement().is_err());
    assert_eq!(controller.current_state(), GateState::Granted);
}
