//! The single in-flight payment negotiation.
//!
//! At most one negotiation is active. Completion messages are correlated
//! against it by order/session id, and anything that does not match (or
//! arrives after the negotiation moved on) is ignored.

use crate::config::GatewayDescriptor;
use crate::host::ContextHandle;
use crate::payment::gateway::{
    find_gateway, CheckoutLink, PaymentRequest, PaymentStrategy, PaymentVerificationRequest,
};
use crate::protocol::models::{CompletionMessage, CompletionStatus};
use crate::PlaygateError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Phase of the active negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPhase {
    /// Checkout is being created.
    CreatingCheckout,
    /// Checkout page is open, waiting for its completion message.
    AwaitingCompletion,
    /// Server-side verification in flight.
    Verifying,
}

/// Ticket for an outstanding checkout creation.
#[derive(Debug, Clone)]
pub struct CheckoutTicket {
    generation: u64,
    /// Strategy that will create the checkout.
    pub strategy: PaymentStrategy,
    /// Selected gateway.
    pub gateway: GatewayDescriptor,
    /// Request to send.
    pub request: PaymentRequest,
}

/// Ticket for an outstanding server-side verification.
#[derive(Debug, Clone)]
pub struct VerifyTicket {
    generation: u64,
    /// What to verify.
    pub request: PaymentVerificationRequest,
}

/// What a completion message did to the negotiation.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// Stray, duplicate or late message.
    Ignored,
    /// User cancelled at the provider.
    Cancelled {
        /// Popup to close.
        context: Option<ContextHandle>,
    },
    /// Provider reported an error.
    Failed {
        /// Popup to close.
        context: Option<ContextHandle>,
    },
    /// Provider reported success; verify server-side.
    Verify {
        /// Popup to close.
        context: Option<ContextHandle>,
        /// Verification to run.
        ticket: VerifyTicket,
    },
}

#[derive(Debug, Clone)]
struct ActiveNegotiation {
    generation: u64,
    strategy: PaymentStrategy,
    gateway_id: String,
    phase: PaymentPhase,
    order_id: Option<String>,
    session_id: Option<String>,
    context: Option<ContextHandle>,
    user_id: Option<String>,
    video_id: Option<String>,
}

impl ActiveNegotiation {
    fn correlates(&self, message: &CompletionMessage) -> bool {
        fn matches(expected: &Option<String>, got: &Option<String>) -> bool {
            match (expected, got) {
                (Some(expected), Some(got)) => expected == got,
                _ => true,
            }
        }
        matches(&self.order_id, &message.order_id) && matches(&self.session_id, &message.session_id)
    }
}

/// Gateway selection plus the redirect/popup handshake.
#[derive(Debug)]
pub struct PaymentNegotiation {
    gateways: Vec<GatewayDescriptor>,
    generation: u64,
    active: Option<ActiveNegotiation>,
}

impl PaymentNegotiation {
    /// Create a negotiation over the configured gateways.
    pub fn new(gateways: Vec<GatewayDescriptor>) -> Self {
        Self {
            gateways,
            generation: 0,
            active: None,
        }
    }

    /// Gateways offered to the user.
    pub fn list_gateways(&self) -> &[GatewayDescriptor] {
        &self.gateways
    }

    /// Phase of the active negotiation, if any.
    pub fn phase(&self) -> Option<PaymentPhase> {
        self.active.as_ref().map(|a| a.phase)
    }

    /// Order id of the active negotiation.
    pub fn order_id(&self) -> Option<&str> {
        self.active.as_ref().and_then(|a| a.order_id.as_deref())
    }

    /// Open checkout context, if any.
    pub fn context(&self) -> Option<ContextHandle> {
        self.active.as_ref().and_then(|a| a.context)
    }

    /// Start a negotiation.
    pub fn begin(
        &mut self,
        strategy: PaymentStrategy,
        request: PaymentRequest,
    ) -> Result<CheckoutTicket, PlaygateError> {
        if self.active.is_some() {
            return Err(PlaygateError::RequestInFlight);
        }
        let gateway = find_gateway(&self.gateways, &request.gateway_id)
            .cloned()
            .ok_or_else(|| PlaygateError::MethodUnavailable {
                gateway: request.gateway_id.clone(),
            })?;

        self.generation += 1;
        self.active = Some(ActiveNegotiation {
            generation: self.generation,
            strategy,
            gateway_id: gateway.id.clone(),
            phase: PaymentPhase::CreatingCheckout,
            order_id: None,
            session_id: None,
            context: None,
            user_id: request.user_id.clone(),
            video_id: request.video_id.clone(),
        });
        Ok(CheckoutTicket {
            generation: self.generation,
            strategy,
            gateway,
            request,
        })
    }

    /// Record the created checkout. The caller opens the page next.
    pub fn checkout_created(&mut self, ticket: &CheckoutTicket, link: &CheckoutLink) -> Result<(), PlaygateError> {
        let active = self.current_mut(ticket.generation, PaymentPhase::CreatingCheckout)?;
        active.phase = PaymentPhase::AwaitingCompletion;
        active.order_id = link.order_id.clone();
        active.session_id = link.checkout_session_id.clone();
        Ok(())
    }

    /// Checkout creation failed; back to gateway selection.
    pub fn checkout_failed(&mut self, ticket: &CheckoutTicket) -> Result<(), PlaygateError> {
        self.current_mut(ticket.generation, PaymentPhase::CreatingCheckout)?;
        self.active = None;
        Ok(())
    }

    /// Attach the opened checkout context.
    pub fn attach_context(&mut self, handle: ContextHandle) {
        if let Some(active) = self.active.as_mut() {
            active.context = Some(handle);
        }
    }

    /// Apply a checkout completion message.
    pub fn accept_completion(&mut self, message: &CompletionMessage) -> CompletionOutcome {
        let Some(active) = self.active.as_mut() else {
            debug!("Completion message with no active negotiation");
            return CompletionOutcome::Ignored;
        };
        if active.phase != PaymentPhase::AwaitingCompletion {
            debug!(phase = ?active.phase, "Duplicate completion message");
            return CompletionOutcome::Ignored;
        }
        if !active.correlates(message) {
            debug!(
                expected = ?active.order_id,
                got = ?message.order_id,
                "Completion message for another negotiation"
            );
            return CompletionOutcome::Ignored;
        }

        if active.order_id.is_none() {
            active.order_id = message.order_id.clone();
        }
        if active.session_id.is_none() {
            active.session_id = message.session_id.clone();
        }

        match message.status {
            CompletionStatus::Success => {
                active.phase = PaymentPhase::Verifying;
                let context = active.context.take();
                CompletionOutcome::Verify {
                    context,
                    ticket: VerifyTicket {
                        generation: active.generation,
                        request: PaymentVerificationRequest {
                            strategy: active.strategy,
                            gateway_id: active.gateway_id.clone(),
                            order_id: active.order_id.clone(),
                            session_id: active.session_id.clone(),
                            user_id: active.user_id.clone(),
                            video_id: active.video_id.clone(),
                        },
                    },
                }
            }
            CompletionStatus::Cancel => {
                let context = active.context;
                self.active = None;
                CompletionOutcome::Cancelled { context }
            }
            CompletionStatus::Error => {
                let context = active.context;
                self.active = None;
                CompletionOutcome::Failed { context }
            }
        }
    }

    /// Close out a verification.
    pub fn verification_finished(&mut self, ticket: &VerifyTicket) -> Result<(), PlaygateError> {
        self.current_mut(ticket.generation, PaymentPhase::Verifying)?;
        self.active = None;
        Ok(())
    }

    /// Abandon the negotiation if its checkout context was closed without
    /// a completion message. Returns whether it was abandoned.
    pub fn poll_context(&mut self, is_closed: impl FnOnce(ContextHandle) -> bool) -> bool {
        let closed = match self.active.as_ref() {
            Some(ActiveNegotiation {
                phase: PaymentPhase::AwaitingCompletion,
                context: Some(handle),
                ..
            }) => is_closed(*handle),
            _ => false,
        };
        if closed {
            self.active = None;
        }
        closed
    }

    /// Abandon any negotiation. Returns the context to close.
    pub fn cancel(&mut self) -> Option<ContextHandle> {
        self.generation += 1;
        self.active.take().and_then(|a| a.context)
    }

    fn current_mut(&mut self, generation: u64, phase: PaymentPhase) -> Result<&mut ActiveNegotiation, PlaygateError> {
        match self.active.as_mut() {
            Some(active) if active.generation == generation && active.phase == phase => Ok(active),
            _ => Err(PlaygateError::Stale),
        }
    }
}
