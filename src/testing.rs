//! Recording host for tests.
//!
//! `MockHost` implements every host trait, remembers what it was asked to
//! do, and lets a test play the part of a misbehaving user (removing the
//! overlay, forcing playback, closing the popup).

use crate::host::{
    ContextHandle, EventSink, ExternalContexts, GateEvent, GateOverlay, HostBindings,
    OverlayView, PlaybackSurface, SessionToken, TokenStore,
};
use crate::store::memory::MemoryTokenStore;
use crate::PlaygateError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// A call the controller made on the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    /// `PlaybackSurface::pause`.
    Pause,
    /// `PlaybackSurface::resume`.
    Resume,
    /// `PlaybackSurface::seek_to`.
    SeekTo(f64),
    /// `GateOverlay::show`.
    Show(OverlayView),
    /// `GateOverlay::hide`.
    Hide,
    /// `ExternalContexts::open`.
    Open(String),
    /// `ExternalContexts::close`.
    Close(ContextHandle),
}

#[derive(Debug, Default)]
struct HostState {
    playing: bool,
    position: f64,
    overlay: Option<OverlayView>,
    block_popups: bool,
    next_handle: u64,
    closed: HashSet<ContextHandle>,
}

/// In-memory host that records every call.
#[derive(Debug, Default)]
pub struct MockHost {
    calls: Mutex<Vec<HostCall>>,
    events: Mutex<Vec<GateEvent>>,
    state: Mutex<HostState>,
    tokens: MemoryTokenStore,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockHost {
    /// Fresh host, paused at 0 with no overlay.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Host with a token already stored.
    pub fn with_token(token: SessionToken) -> Arc<Self> {
        Arc::new(Self {
            tokens: MemoryTokenStore::with_token(token),
            ..Default::default()
        })
    }

    /// Bind every host trait to this mock.
    pub fn bindings(self: &Arc<Self>) -> HostBindings {
        HostBindings {
            playback: self.clone(),
            overlay: self.clone(),
            contexts: self.clone(),
            tokens: self.clone(),
            events: self.clone(),
        }
    }

    fn record(&self, call: HostCall) {
        lock(&self.calls).push(call);
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.calls).clone()
    }

    /// Drain recorded calls.
    pub fn take_calls(&self) -> Vec<HostCall> {
        std::mem::take(&mut *lock(&self.calls))
    }

    /// Events emitted so far.
    pub fn events(&self) -> Vec<GateEvent> {
        lock(&self.events).clone()
    }

    /// Names of emitted events, in order.
    pub fn event_names(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(GateEvent::name).collect()
    }

    /// Number of emitted events with this name.
    pub fn count_events(&self, name: &str) -> usize {
        lock(&self.events).iter().filter(|e| e.name() == name).count()
    }

    /// Overlay view currently shown.
    pub fn overlay(&self) -> Option<OverlayView> {
        lock(&self.state).overlay
    }

    /// Whether playback is running.
    pub fn playing(&self) -> bool {
        lock(&self.state).playing
    }

    /// Current position.
    pub fn current_position(&self) -> f64 {
        lock(&self.state).position
    }

    /// Simulate the user starting playback behind the controller's back.
    pub fn force_play(&self) {
        lock(&self.state).playing = true;
    }

    /// Simulate playback advancing.
    pub fn set_position(&self, seconds: f64) {
        lock(&self.state).position = seconds;
    }

    /// Simulate the overlay being stripped out of the page.
    pub fn strip_overlay(&self) {
        lock(&self.state).overlay = None;
    }

    /// Make `open` fail as if a popup blocker intervened.
    pub fn block_popups(&self, block: bool) {
        lock(&self.state).block_popups = block;
    }

    /// Simulate the user closing a popup.
    pub fn close_popup(&self, handle: ContextHandle) {
        lock(&self.state).closed.insert(handle);
    }

    /// Stored token, if any.
    pub fn stored_token(&self) -> Option<SessionToken> {
        self.tokens.read().ok().flatten()
    }
}

impl PlaybackSurface for MockHost {
    fn pause(&self) {
        lock(&self.state).playing = false;
        self.record(HostCall::Pause);
    }

    fn resume(&self) {
        lock(&self.state).playing = true;
        self.record(HostCall::Resume);
    }

    fn seek_to(&self, seconds: f64) {
        lock(&self.state).position = seconds;
        self.record(HostCall::SeekTo(seconds));
    }

    fn position(&self) -> f64 {
        lock(&self.state).position
    }

    fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }
}

impl GateOverlay for MockHost {
    fn show(&self, view: OverlayView) {
        lock(&self.state).overlay = Some(view);
        self.record(HostCall::Show(view));
    }

    fn hide(&self) {
        lock(&self.state).overlay = None;
        self.record(HostCall::Hide);
    }

    fn is_visible(&self) -> bool {
        lock(&self.state).overlay.is_some()
    }
}

impl ExternalContexts for MockHost {
    fn open(&self, url: &str) -> Option<ContextHandle> {
        self.record(HostCall::Open(url.to_string()));
        let mut state = lock(&self.state);
        if state.block_popups {
            return None;
        }
        state.next_handle += 1;
        Some(ContextHandle(state.next_handle))
    }

    fn is_closed(&self, handle: ContextHandle) -> bool {
        lock(&self.state).closed.contains(&handle)
    }

    fn close(&self, handle: ContextHandle) {
        lock(&self.state).closed.insert(handle);
        self.record(HostCall::Close(handle));
    }
}

impl TokenStore for MockHost {
    fn persist(&self, token: &SessionToken) -> Result<(), PlaygateError> {
        self.tokens.persist(token)
    }

    fn read(&self) -> Result<Option<SessionToken>, PlaygateError> {
        self.tokens.read()
    }

    fn clear(&self) -> Result<(), PlaygateError> {
        self.tokens.clear()
    }
}

impl EventSink for MockHost {
    fn emit(&self, event: GateEvent) {
        lock(&self.events).push(event);
    }
}
