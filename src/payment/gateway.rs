//! Gateway descriptors and payment strategy resolution.
//!
//! Exactly one strategy serves a `begin_payment` call, in precedence order:
//! 1. A host-supplied [`PaymentHandler`]
//! 2. The generic payment-link integration
//! 3. A built-in named gateway

use crate::config::{GatewayDescriptor, PlaygateConfig};
use crate::PlaygateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Gateways with a built-in integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltInGateway {
    /// Stripe hosted checkout.
    Stripe,
    /// Cashfree payment link.
    Cashfree,
}

impl BuiltInGateway {
    /// Look up a built-in gateway by id.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "stripe" => Some(BuiltInGateway::Stripe),
            "cashfree" => Some(BuiltInGateway::Cashfree),
            _ => None,
        }
    }
}

/// Strategy selected for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStrategy {
    /// Host-supplied handler.
    Custom,
    /// Generic payment-link HTTP integration.
    PaymentLink,
    /// Built-in integration.
    BuiltIn(BuiltInGateway),
}

/// Data sent to whichever strategy creates the checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Selected gateway id.
    pub gateway_id: String,
    /// Player session id.
    pub session_id: String,
    /// Amount in major currency units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// ISO currency code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Host user id, or the signed-in user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Video id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// Video slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

/// A checkout page to open, plus the ids used to correlate completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLink {
    /// Checkout URL.
    pub url: String,
    /// Provider order id, when known up front.
    #[serde(default)]
    pub order_id: Option<String>,
    /// Provider checkout-session id, when known up front.
    #[serde(default)]
    pub checkout_session_id: Option<String>,
}

/// What the server is asked to confirm after a success message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerificationRequest {
    /// Strategy that created the checkout.
    pub strategy: PaymentStrategy,
    /// Gateway id.
    pub gateway_id: String,
    /// Order id.
    pub order_id: Option<String>,
    /// Checkout-session id.
    pub session_id: Option<String>,
    /// Host user id.
    pub user_id: Option<String>,
    /// Video id.
    pub video_id: Option<String>,
}

/// Host-supplied payment integration.
#[async_trait]
pub trait PaymentHandler: Send + Sync {
    /// Create a checkout for the selected gateway.
    async fn create_checkout(
        &self,
        gateway: &GatewayDescriptor,
        request: &PaymentRequest,
    ) -> Result<CheckoutLink, PlaygateError>;

    /// Confirm server-side that the payment went through.
    async fn verify(&self, request: &PaymentVerificationRequest) -> Result<bool, PlaygateError>;
}

/// Find a configured gateway by id.
pub fn find_gateway<'a>(gateways: &'a [GatewayDescriptor], id: &str) -> Option<&'a GatewayDescriptor> {
    gateways.iter().find(|g| g.id == id)
}

/// Pick the strategy that will serve `gateway_id`.
pub fn resolve_strategy(
    config: &PlaygateConfig,
    gateway_id: &str,
    has_custom_handler: bool,
) -> Result<PaymentStrategy, PlaygateError> {
    let unavailable = || PlaygateError::MethodUnavailable {
        gateway: gateway_id.to_string(),
    };

    find_gateway(&config.gateways, gateway_id).ok_or_else(unavailable)?;

    if has_custom_handler {
        return Ok(PaymentStrategy::Custom);
    }
    if config.payment_link.is_some() {
        return Ok(PaymentStrategy::PaymentLink);
    }
    BuiltInGateway::from_id(gateway_id)
        .map(PaymentStrategy::BuiltIn)
        .ok_or_else(unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentLinkConfig;

    fn config_with(gateways: &[&str], link: bool) -> PlaygateConfig {
        PlaygateConfig {
            api_base: "https://api.example.com".to_string(),
            gateways: gateways.iter().map(|id| GatewayDescriptor::from_id(id)).collect(),
            payment_link: link.then(|| PaymentLinkConfig {
                endpoint: "/pay".to_string(),
                method: Default::default(),
                headers: Default::default(),
                request_template: Default::default(),
                url_pointer: "/url".to_string(),
                order_id_pointer: None,
                success_pointer: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_custom_handler_wins() {
        let config = config_with(&["stripe"], true);
        assert_eq!(resolve_strategy(&config, "stripe", true).unwrap(), PaymentStrategy::Custom);
    }

    #[test]
    fn test_payment_link_beats_builtin() {
        let config = config_with(&["stripe"], true);
        assert_eq!(
            resolve_strategy(&config, "stripe", false).unwrap(),
            PaymentStrategy::PaymentLink
        );
    }

    #[test]
    fn test_builtin_fallback() {
        let config = config_with(&["cashfree"], false);
        assert_eq!(
            resolve_strategy(&config, "cashfree", false).unwrap(),
            PaymentStrategy::BuiltIn(BuiltInGateway::Cashfree)
        );
    }

    #[test]
    fn test_unknown_builtin_is_unavailable() {
        let config = config_with(&["paypal"], false);
        let result = resolve_strategy(&config, "paypal", false);
        assert!(matches!(result, Err(PlaygateError::MethodUnavailable { gateway }) if gateway == "paypal"));
    }

    #[test]
    fn test_unconfigured_gateway_is_unavailable() {
        let config = config_with(&["stripe"], false);
        assert!(matches!(
            resolve_strategy(&config, "cashfree", true),
            Err(PlaygateError::MethodUnavailable { .. })
        ));
    }
}
