//! Playgate configuration.

use crate::session::watch::ElapsedPolicy;
use crate::PlaygateError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Upper bound for the resend cooldown and payment grace windows (one day).
pub const MAX_WINDOW_SECS: u64 = 86_400;

/// Configuration for one gated player instance.
///
/// Everything has a default, so hosts can deserialize partial JSON and
/// only set what differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygateConfig {
    /// Free preview length in seconds. `0` disables gating entirely.
    pub free_duration_seconds: f64,

    /// Base URL of the entitlement backend (e.g. "https://api.example.com").
    pub api_base: String,

    /// Application name, used in the User-Agent.
    pub app_name: String,

    /// Host user id, forwarded to payment endpoints.
    pub user_id: Option<String>,

    /// Video id, forwarded to OTP and payment endpoints.
    pub video_id: Option<String>,

    /// Video slug, forwarded to the OTP request.
    pub slug: Option<String>,

    /// URL the payment provider redirects back to.
    pub return_url: Option<String>,

    /// Price shown to the user and sent with payment requests.
    pub pricing: Pricing,

    /// Gateways offered in the payment overlay.
    pub gateways: Vec<GatewayDescriptor>,

    /// Generic payment-link integration.
    pub payment_link: Option<PaymentLinkConfig>,

    /// Path of the generic server-side payment verification endpoint.
    pub verify_payment_path: String,

    /// Email/OTP sign-in.
    pub auth: AuthConfig,

    /// Tamper monitoring.
    pub security: SecurityConfig,

    /// How elapsed watch time follows reported positions.
    pub elapsed_policy: ElapsedPolicy,

    /// Interval for checking whether the payment popup was closed.
    pub popup_poll_interval_secs: u64,

    /// Window after a successful payment during which gate checks are suppressed.
    pub payment_grace_secs: u64,

    /// HTTP request timeout.
    pub http_timeout_secs: u64,
}

impl Default for PlaygateConfig {
    fn default() -> Self {
        Self {
            free_duration_seconds: 0.0,
            api_base: String::new(),
            app_name: "playgate".to_string(),
            user_id: None,
            video_id: None,
            slug: None,
            return_url: None,
            pricing: Pricing::default(),
            gateways: Vec::new(),
            payment_link: None,
            verify_payment_path: "/api/payments/verify".to_string(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            elapsed_policy: ElapsedPolicy::default(),
            popup_poll_interval_secs: 3,
            payment_grace_secs: 5,
            http_timeout_secs: 30,
        }
    }
}

/// Price information attached to payment requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
    /// Amount in major currency units.
    pub amount: Option<f64>,
    /// ISO currency code.
    pub currency: Option<String>,
    /// Short title.
    pub title: Option<String>,
    /// Longer description.
    pub description: Option<String>,
}

/// A payment gateway shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayDescriptor {
    /// Stable id ("stripe", "cashfree", or anything a custom handler knows).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional subtitle.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional icon hint.
    #[serde(default)]
    pub icon: Option<String>,
    /// Optional brand color hint.
    #[serde(default)]
    pub color: Option<String>,
}

impl GatewayDescriptor {
    /// Descriptor with a display name derived from a bare id.
    pub fn from_id(id: &str) -> Self {
        let name = match id {
            "stripe" => "Stripe".to_string(),
            "cashfree" => "Cashfree".to_string(),
            other => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        };
        Self {
            id: id.to_string(),
            name,
            description: None,
            icon: None,
            color: None,
        }
    }
}

/// HTTP method for the payment-link endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkMethod {
    /// JSON body.
    #[default]
    Post,
    /// Query string.
    Get,
}

/// Declarative generic payment-link integration.
///
/// The request body is `request_template` merged with the payment request
/// fields; the checkout URL and order id are pulled out of the response
/// with JSON pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLinkConfig {
    /// Absolute URL, or a path joined onto `api_base`.
    pub endpoint: String,
    /// HTTP method.
    #[serde(default)]
    pub method: LinkMethod,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Static fields merged into every request.
    #[serde(default)]
    pub request_template: serde_json::Map<String, serde_json::Value>,
    /// JSON pointer to the checkout URL in the response.
    #[serde(default = "default_url_pointer")]
    pub url_pointer: String,
    /// JSON pointer to the order id in the response.
    #[serde(default)]
    pub order_id_pointer: Option<String>,
    /// JSON pointer to a flag that must be truthy for the response to count.
    #[serde(default)]
    pub success_pointer: Option<String>,
}

fn default_url_pointer() -> String {
    "/url".to_string()
}

/// Email/OTP sign-in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require sign-in before payment.
    pub enabled: bool,
    /// Skip the challenge when a session token is already stored.
    pub skip_if_authenticated: bool,
    /// Path of the OTP request endpoint.
    pub request_otp_path: String,
    /// Path of the OTP verification endpoint.
    pub verify_otp_path: String,
    /// Path of the logout endpoint.
    pub logout_path: Option<String>,
    /// Seconds before a code can be re-sent.
    pub resend_cooldown_secs: u64,
    /// Expected OTP length.
    pub otp_length: usize,
    /// Failed verifications tolerated per challenge.
    pub max_verify_attempts: u32,
    /// Extra fields merged into the OTP request body.
    pub request_payload: serde_json::Map<String, serde_json::Value>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            skip_if_authenticated: true,
            request_otp_path: "/api/auth/request-otp".to_string(),
            verify_otp_path: "/api/auth/verify-otp".to_string(),
            logout_path: None,
            resend_cooldown_secs: 30,
            otp_length: 6,
            max_verify_attempts: 5,
            request_payload: serde_json::Map::new(),
        }
    }
}

impl AuthConfig {
    /// Resend cooldown as a chrono duration.
    pub fn resend_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.resend_cooldown_secs.min(MAX_WINDOW_SECS) as i64)
    }
}

/// Tamper monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Interval between security checks, in milliseconds.
    pub check_interval_ms: u64,
    /// Overlay removals tolerated before lockdown.
    pub max_overlay_removal_attempts: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            max_overlay_removal_attempts: 3,
        }
    }
}

impl SecurityConfig {
    /// Check interval as a std duration.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl PlaygateConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), PlaygateError> {
        if !self.free_duration_seconds.is_finite() || self.free_duration_seconds < 0.0 {
            return Err(PlaygateError::ConfigError(format!(
                "free_duration_seconds must be a non-negative number, got {}",
                self.free_duration_seconds
            )));
        }

        let needs_backend = self.auth.enabled
            || self.gateways.iter().any(|g| g.id == "stripe" || g.id == "cashfree");
        if needs_backend && self.api_base.is_empty() {
            return Err(PlaygateError::ConfigError(
                "api_base is required for sign-in and built-in gateways".to_string(),
            ));
        }
        if !self.api_base.is_empty() {
            url::Url::parse(&self.api_base).map_err(|e| {
                PlaygateError::ConfigError(format!("api_base is not a valid URL: {}", e))
            })?;
        }

        if !(4..=10).contains(&self.auth.otp_length) {
            return Err(PlaygateError::ConfigError(format!(
                "otp_length must be between 4 and 10, got {}",
                self.auth.otp_length
            )));
        }
        if self.auth.max_verify_attempts == 0 {
            return Err(PlaygateError::ConfigError(
                "max_verify_attempts must be at least 1".to_string(),
            ));
        }
        if self.security.max_overlay_removal_attempts == 0 {
            return Err(PlaygateError::ConfigError(
                "max_overlay_removal_attempts must be at least 1".to_string(),
            ));
        }
        if self.auth.resend_cooldown_secs > MAX_WINDOW_SECS {
            return Err(PlaygateError::ConfigError(format!(
                "resend_cooldown_secs must be at most {}, got {}",
                MAX_WINDOW_SECS, self.auth.resend_cooldown_secs
            )));
        }
        if self.payment_grace_secs > MAX_WINDOW_SECS {
            return Err(PlaygateError::ConfigError(format!(
                "payment_grace_secs must be at most {}, got {}",
                MAX_WINDOW_SECS, self.payment_grace_secs
            )));
        }
        if self.security.check_interval_ms == 0 || self.popup_poll_interval_secs == 0 {
            return Err(PlaygateError::ConfigError(
                "timer intervals must be non-zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for gateway in &self.gateways {
            if gateway.id.is_empty() {
                return Err(PlaygateError::ConfigError(
                    "gateway id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(gateway.id.as_str()) {
                return Err(PlaygateError::ConfigError(format!(
                    "duplicate gateway id: {}",
                    gateway.id
                )));
            }
        }

        if let Some(link) = &self.payment_link {
            if link.endpoint.is_empty() {
                return Err(PlaygateError::ConfigError(
                    "payment_link.endpoint cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Payment grace window as a chrono duration.
    pub fn payment_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.payment_grace_secs.min(MAX_WINDOW_SECS) as i64)
    }

    /// Popup poll interval as a std duration.
    pub fn popup_poll_interval(&self) -> Duration {
        Duration::from_secs(self.popup_poll_interval_secs)
    }
}
