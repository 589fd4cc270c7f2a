//! Reqwest-based client for the entitlement backend.
//!
//! Covers the OTP endpoints, the generic payment-link integration, the
//! built-in rental routes and server-side payment verification.

use crate::config::{LinkMethod, PaymentLinkConfig, PlaygateConfig};
use crate::host::SessionToken;
use crate::payment::gateway::{
    BuiltInGateway, CheckoutLink, PaymentRequest, PaymentStrategy, PaymentVerificationRequest,
};
use crate::payment::link::{build_link_body, map_link_response, query_pairs};
use crate::protocol::models::{
    parse_response, CashfreeOrderBody, CashfreeOrderResponse, PaymentVerificationResponse,
    RequestOtpBody, RequestOtpResponse, StripeCheckoutBody, StripeCheckoutResponse,
    StripeConfirmBody, VerifyOtpBody, VerifyOtpResponse,
};
use crate::PlaygateError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

const STRIPE_CHECKOUT_PATH: &str = "/api/rentals/stripe/checkout-session";
const STRIPE_CONFIRM_PATH: &str = "/api/rentals/stripe/confirm";
const CASHFREE_ORDER_PATH: &str = "/api/rentals/cashfree/order";
const CASHFREE_VERIFY_PATH: &str = "/api/rentals/cashfree/verify";

/// Network operations the gate needs from the backend.
#[async_trait]
pub trait EntitlementApi: Send + Sync {
    /// Ask the backend to email a code.
    async fn request_otp(&self, body: &RequestOtpBody) -> Result<RequestOtpResponse, PlaygateError>;

    /// Exchange a code for a session token.
    async fn verify_otp(&self, body: &VerifyOtpBody) -> Result<VerifyOtpResponse, PlaygateError>;

    /// Create a checkout through the generic payment-link endpoint.
    async fn create_payment_link(
        &self,
        config: &PaymentLinkConfig,
        request: &PaymentRequest,
    ) -> Result<CheckoutLink, PlaygateError>;

    /// Create a checkout through a built-in gateway route.
    async fn create_builtin_checkout(
        &self,
        gateway: BuiltInGateway,
        request: &PaymentRequest,
    ) -> Result<CheckoutLink, PlaygateError>;

    /// Confirm a payment server-side.
    async fn verify_payment(&self, request: &PaymentVerificationRequest) -> Result<bool, PlaygateError>;

    /// Invalidate a session token server-side.
    async fn logout(&self, token: &SessionToken) -> Result<(), PlaygateError>;
}

/// HTTP implementation of [`EntitlementApi`].
#[derive(Debug, Clone)]
pub struct HttpEntitlementClient {
    client: Client,
    api_base: String,
    return_url: Option<String>,
    request_otp_path: String,
    verify_otp_path: String,
    logout_path: Option<String>,
    verify_payment_path: String,
}

impl HttpEntitlementClient {
    /// Create a client from config.
    pub fn new(config: &PlaygateConfig) -> Result<Self, PlaygateError> {
        Self::with_timeout(config, Duration::from_secs(config.http_timeout_secs))
    }

    /// Create a client with an explicit request timeout.
    pub fn with_timeout(config: &PlaygateConfig, timeout: Duration) -> Result<Self, PlaygateError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(build_user_agent(config))
            .build()
            .map_err(|e| PlaygateError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            return_url: config.return_url.clone(),
            request_otp_path: config.auth.request_otp_path.clone(),
            verify_otp_path: config.auth.verify_otp_path.clone(),
            logout_path: config.auth.logout_path.clone(),
            verify_payment_path: config.verify_payment_path.clone(),
        })
    }

    /// Resolve an endpoint: absolute URLs pass through, paths are appended
    /// to `api_base`.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, PlaygateError> {
        if let Ok(url) = Url::parse(endpoint) {
            return Ok(url);
        }
        let path = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("/{}", endpoint)
        };
        Url::parse(&format!("{}{}", self.api_base, path))
            .map_err(|e| PlaygateError::ConfigError(format!("Invalid endpoint {}: {}", endpoint, e)))
    }

    fn return_url(&self) -> String {
        self.return_url.clone().unwrap_or_else(|| self.api_base.clone())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PlaygateError> {
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| PlaygateError::Network(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PlaygateError::Network(format!("Failed to read body: {}", e)))?;
        debug!(status = status.as_u16(), bytes = body.len(), "Backend response");

        if status.is_server_error() {
            return Err(PlaygateError::Network(format!("Server returned {}", status)));
        }

        match parse_response::<T>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if status.is_client_error() => Err(PlaygateError::VerificationFailed(
                error_message(&body).unwrap_or_else(|| status.to_string()),
            )),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EntitlementApi for HttpEntitlementClient {
    async fn request_otp(&self, body: &RequestOtpBody) -> Result<RequestOtpResponse, PlaygateError> {
        let url = self.endpoint_url(&self.request_otp_path)?;
        self.send_json(self.client.post(url).json(body)).await
    }

    async fn verify_otp(&self, body: &VerifyOtpBody) -> Result<VerifyOtpResponse, PlaygateError> {
        let url = self.endpoint_url(&self.verify_otp_path)?;
        self.send_json(self.client.post(url).json(body)).await
    }

    async fn create_payment_link(
        &self,
        config: &PaymentLinkConfig,
        request: &PaymentRequest,
    ) -> Result<CheckoutLink, PlaygateError> {
        let url = self.endpoint_url(&config.endpoint)?;
        let body = build_link_body(config, request)?;

        let mut builder = match config.method {
            LinkMethod::Post => self.client.post(url).json(&body),
            LinkMethod::Get => self.client.get(url).query(&query_pairs(&body)),
        };
        for (name, value) in &config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response: serde_json::Value = self.send_json(builder).await?;
        map_link_response(config, &response)
    }

    async fn create_builtin_checkout(
        &self,
        gateway: BuiltInGateway,
        request: &PaymentRequest,
    ) -> Result<CheckoutLink, PlaygateError> {
        match gateway {
            BuiltInGateway::Stripe => {
                let return_url = self.return_url();
                let body = StripeCheckoutBody {
                    user_id: request.user_id.clone(),
                    video_id: request.video_id.clone(),
                    success_url: return_url.clone(),
                    cancel_url: return_url,
                };
                let url = self.endpoint_url(STRIPE_CHECKOUT_PATH)?;
                let response: StripeCheckoutResponse =
                    self.send_json(self.client.post(url).json(&body)).await?;
                let url = response.url.filter(|u| !u.is_empty()).ok_or_else(|| {
                    PlaygateError::ProtocolError("Checkout response has no url".to_string())
                })?;
                Ok(CheckoutLink {
                    url,
                    order_id: None,
                    checkout_session_id: response.id,
                })
            }
            BuiltInGateway::Cashfree => {
                let body = CashfreeOrderBody {
                    user_id: request.user_id.clone(),
                    video_id: request.video_id.clone(),
                    return_url: self.return_url(),
                };
                let url = self.endpoint_url(CASHFREE_ORDER_PATH)?;
                let response: CashfreeOrderResponse =
                    self.send_json(self.client.post(url).json(&body)).await?;
                let url = response.payment_link.filter(|u| !u.is_empty()).ok_or_else(|| {
                    PlaygateError::ProtocolError("Order response has no paymentLink".to_string())
                })?;
                Ok(CheckoutLink {
                    url,
                    order_id: response.order_id,
                    checkout_session_id: None,
                })
            }
        }
    }

    async fn verify_payment(&self, request: &PaymentVerificationRequest) -> Result<bool, PlaygateError> {
        let response: PaymentVerificationResponse = match request.strategy {
            PaymentStrategy::BuiltIn(BuiltInGateway::Stripe) => {
                let session_id = request.session_id.clone().ok_or_else(|| {
                    PlaygateError::ProtocolError("Stripe verification needs a session id".to_string())
                })?;
                let url = self.endpoint_url(STRIPE_CONFIRM_PATH)?;
                self.send_json(self.client.post(url).json(&StripeConfirmBody { session_id }))
                    .await?
            }
            PaymentStrategy::BuiltIn(BuiltInGateway::Cashfree) => {
                let order_id = request.order_id.clone().ok_or_else(|| {
                    PlaygateError::ProtocolError("Cashfree verification needs an order id".to_string())
                })?;
                let mut query = vec![("orderId", order_id)];
                if let Some(user_id) = &request.user_id {
                    query.push(("userId", user_id.clone()));
                }
                if let Some(video_id) = &request.video_id {
                    query.push(("videoId", video_id.clone()));
                }
                let url = self.endpoint_url(CASHFREE_VERIFY_PATH)?;
                self.send_json(self.client.get(url).query(&query)).await?
            }
            PaymentStrategy::PaymentLink | PaymentStrategy::Custom => {
                let url = self.endpoint_url(&self.verify_payment_path)?;
                self.send_json(self.client.post(url).json(request)).await?
            }
        };

        if !response.verified {
            if let Some(message) = response.message {
                return Err(PlaygateError::VerificationFailed(message));
            }
        }
        Ok(response.verified)
    }

    async fn logout(&self, token: &SessionToken) -> Result<(), PlaygateError> {
        let Some(path) = &self.logout_path else {
            return Ok(());
        };
        let url = self.endpoint_url(path)?;
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", token.token))
            .send()
            .await
            .map_err(|e| PlaygateError::Network(format!("Request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(PlaygateError::Network(format!(
                "Logout returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|m| m.as_str())
        .map(String::from)
}

/// Build a User-Agent string from config.
///
/// Format: `playgate/<version> <app>`
pub fn build_user_agent(config: &PlaygateConfig) -> String {
    format!("playgate/{} {}", env!("CARGO_PKG_VERSION"), config.app_name)
}
