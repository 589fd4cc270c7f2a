//! Backend request/response structs and checkout completion messages.

use crate::PlaygateError;
use serde::{Deserialize, Deserializer, Serialize};

/// Message type carried by checkout completion messages.
pub const COMPLETION_MESSAGE_TYPE: &str = "playgate:checkout";

/// OTP request body.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOtpBody {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(rename = "videoId", skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// OTP request response.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestOtpResponse {
    pub status: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<RequestOtpData>,
}

/// Challenge issued by the OTP request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestOtpData {
    pub session_token: String,
}

/// OTP verification body.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpBody {
    pub session_token: String,
    pub email: String,
    pub otp: String,
}

/// OTP verification response.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpResponse {
    pub status: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<VerifyOtpData>,
}

/// Access information returned with a verified OTP.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpData {
    pub session_token: String,
    pub email: String,
    #[serde(default)]
    pub video_id: Option<serde_json::Value>,
    #[serde(default)]
    pub video_slug: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub access_granted: bool,
    #[serde(default)]
    pub requires_payment: bool,
    #[serde(default)]
    pub access_type: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub free_duration: Option<f64>,
}

/// Built-in Stripe checkout-session request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeCheckoutBody {
    pub user_id: Option<String>,
    pub video_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Built-in Stripe checkout-session response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Built-in Stripe confirmation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeConfirmBody {
    pub session_id: String,
}

/// Built-in Cashfree order request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashfreeOrderBody {
    pub user_id: Option<String>,
    pub video_id: Option<String>,
    pub return_url: String,
}

/// Built-in Cashfree order response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashfreeOrderResponse {
    #[serde(default)]
    pub payment_link: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Server-side payment verification result.
///
/// Backends disagree on the flag name, so `success`, `status`, `paid` and
/// `verified` are all accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentVerificationResponse {
    #[serde(alias = "success", alias = "status", alias = "paid", default)]
    pub verified: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome reported by the external checkout context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Cancel,
    Error,
}

/// One-shot message posted by the checkout page on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
    pub status: CompletionStatus,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Parse a raw message delivered to the host page.
///
/// Messages of another `type` are not ours and yield `Ok(None)`.
pub fn parse_completion_message(
    raw: &serde_json::Value,
) -> Result<Option<CompletionMessage>, PlaygateError> {
    match raw.get("type").and_then(|t| t.as_str()) {
        Some(COMPLETION_MESSAGE_TYPE) => {}
        _ => return Ok(None),
    }
    serde_json::from_value(raw.clone())
        .map(Some)
        .map_err(|e| PlaygateError::ProtocolError(format!("Malformed completion message: {}", e)))
}

/// Parse a duration given as seconds or `HH:MM:SS` / `MM:SS`.
pub fn parse_duration_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if !s.contains(':') {
        return s.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0);
    }

    let mut total = 0.0;
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for part in parts {
        let value: f64 = part.trim().parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        total = total * 60.0 + value;
    }
    Some(total)
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().filter(|v| *v >= 0.0),
        Some(serde_json::Value::String(s)) => parse_duration_str(&s),
        _ => None,
    })
}

/// Parse raw JSON body into a typed response.
pub fn parse_response<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, PlaygateError> {
    serde_json::from_slice(body)
        .map_err(|e| PlaygateError::ProtocolError(format!("Failed to parse response: {}", e)))
}
