//! Email → OTP → session-token challenge.
//!
//! The flow never performs I/O itself. Each network call is split into a
//! `begin_*` step that validates locally and hands out a ticket, and a
//! `complete_*` step that applies the response only if the ticket is still
//! current. Cancelling bumps the generation, so late responses are
//! rejected as [`PlaygateError::Stale`].

use crate::auth::validation::{validate_email, validate_otp};
use crate::config::AuthConfig;
use crate::host::SessionToken;
use crate::protocol::models::{RequestOtpResponse, VerifyOtpData, VerifyOtpResponse};
use crate::PlaygateError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// UI step of the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStep {
    /// Waiting for an email address.
    Email,
    /// A request is in flight.
    Loading,
    /// Waiting for the code.
    Otp,
    /// Verified.
    Success,
}

/// Ticket for an outstanding OTP request.
#[derive(Debug, Clone)]
pub struct OtpRequestTicket {
    generation: u64,
    /// Validated email.
    pub email: String,
}

/// Ticket for an outstanding OTP verification.
#[derive(Debug, Clone)]
pub struct OtpVerifyTicket {
    generation: u64,
    /// Email the challenge was issued for.
    pub email: String,
    /// Validated code.
    pub code: String,
    /// Short-lived challenge token from the OTP request.
    pub challenge_token: String,
}

/// What the backend decided after a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Access granted outright.
    Granted,
    /// Payment required, but a further free window is allowed.
    PreviewExtended {
        /// New absolute preview limit.
        free_duration_seconds: f64,
    },
    /// Payment required now.
    PaymentRequired,
}

impl AccessDecision {
    /// Derive the decision from verification data.
    pub fn from_verify_data(data: &VerifyOtpData) -> Self {
        if data.access_granted {
            return AccessDecision::Granted;
        }
        match data.free_duration {
            Some(free) if data.requires_payment && free > 0.0 => AccessDecision::PreviewExtended {
                free_duration_seconds: free,
            },
            _ => AccessDecision::PaymentRequired,
        }
    }
}

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    /// Durable token to persist.
    pub token: SessionToken,
    /// Access decision.
    pub decision: AccessDecision,
}

#[derive(Debug, Clone)]
struct Challenge {
    email: String,
    token: String,
}

/// State of the email/OTP challenge.
#[derive(Debug)]
pub struct AuthChallengeFlow {
    resend_cooldown: Duration,
    otp_length: usize,
    max_attempts: u32,
    step: AuthStep,
    generation: u64,
    in_flight: bool,
    challenge: Option<Challenge>,
    cooldown_until: Option<DateTime<Utc>>,
    attempts: u32,
    last_error: Option<String>,
}

impl AuthChallengeFlow {
    /// Create a flow from configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            resend_cooldown: config.resend_cooldown(),
            otp_length: config.otp_length,
            max_attempts: config.max_verify_attempts,
            step: AuthStep::Email,
            generation: 0,
            in_flight: false,
            challenge: None,
            cooldown_until: None,
            attempts: 0,
            last_error: None,
        }
    }

    /// Current UI step.
    pub fn step(&self) -> AuthStep {
        self.step
    }

    /// Failed verifications for the current challenge.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Last retryable error, for display.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Email of the outstanding challenge.
    pub fn challenge_email(&self) -> Option<&str> {
        self.challenge.as_ref().map(|c| c.email.as_str())
    }

    /// Whole seconds until a code can be re-sent.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> u64 {
        match self.cooldown_until {
            Some(until) if until > now => {
                let ms = (until - now).num_milliseconds().max(0) as u64;
                ms.div_ceil(1000)
            }
            _ => 0,
        }
    }

    /// Validate the email and reserve an OTP request.
    pub fn begin_request(&mut self, email: &str, now: DateTime<Utc>) -> Result<OtpRequestTicket, PlaygateError> {
        if self.in_flight {
            return Err(PlaygateError::RequestInFlight);
        }
        let email = validate_email(email)?;

        let remaining_seconds = self.cooldown_remaining(now);
        if remaining_seconds > 0 {
            return Err(PlaygateError::CooldownActive { remaining_seconds });
        }

        self.generation += 1;
        self.in_flight = true;
        self.step = AuthStep::Loading;
        self.last_error = None;
        Ok(OtpRequestTicket {
            generation: self.generation,
            email,
        })
    }

    /// Apply the OTP request response.
    pub fn complete_request(
        &mut self,
        ticket: &OtpRequestTicket,
        result: Result<RequestOtpResponse, PlaygateError>,
        now: DateTime<Utc>,
    ) -> Result<(), PlaygateError> {
        if ticket.generation != self.generation {
            return Err(PlaygateError::Stale);
        }
        self.in_flight = false;

        match result {
            Ok(RequestOtpResponse {
                status: true,
                data: Some(data),
                ..
            }) => {
                self.challenge = Some(Challenge {
                    email: ticket.email.clone(),
                    token: data.session_token,
                });
                self.attempts = 0;
                self.cooldown_until = Some(now + self.resend_cooldown);
                self.step = AuthStep::Otp;
                Ok(())
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| "Failed to send verification code".to_string());
                self.step = AuthStep::Email;
                self.last_error = Some(message.clone());
                Err(PlaygateError::VerificationFailed(message))
            }
            Err(err) => {
                self.step = AuthStep::Email;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Validate the code and reserve a verification request.
    pub fn begin_verify(&mut self, code: &str) -> Result<OtpVerifyTicket, PlaygateError> {
        if self.in_flight {
            return Err(PlaygateError::RequestInFlight);
        }
        let challenge = self
            .challenge
            .clone()
            .ok_or(PlaygateError::NoActiveChallenge)?;
        if self.attempts >= self.max_attempts {
            self.drop_challenge();
            return Err(PlaygateError::AttemptsExhausted);
        }
        let code = validate_otp(code, self.otp_length)?;

        self.generation += 1;
        self.in_flight = true;
        self.step = AuthStep::Loading;
        self.last_error = None;
        Ok(OtpVerifyTicket {
            generation: self.generation,
            email: challenge.email,
            code,
            challenge_token: challenge.token,
        })
    }

    /// Apply the verification response.
    pub fn complete_verify(
        &mut self,
        ticket: &OtpVerifyTicket,
        result: Result<VerifyOtpResponse, PlaygateError>,
    ) -> Result<AuthOutcome, PlaygateError> {
        if ticket.generation != self.generation {
            return Err(PlaygateError::Stale);
        }
        self.in_flight = false;

        match result {
            Ok(VerifyOtpResponse {
                status: true,
                data: Some(data),
                ..
            }) => {
                let decision = AccessDecision::from_verify_data(&data);
                self.challenge = None;
                self.cooldown_until = None;
                self.step = AuthStep::Success;
                Ok(AuthOutcome {
                    token: SessionToken {
                        token: data.session_token,
                        user_id: data.email,
                    },
                    decision,
                })
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| "Invalid verification code".to_string());
                self.attempts += 1;
                self.last_error = Some(message.clone());
                if self.attempts >= self.max_attempts {
                    self.drop_challenge();
                    return Err(PlaygateError::AttemptsExhausted);
                }
                self.step = AuthStep::Otp;
                Err(PlaygateError::VerificationFailed(message))
            }
            Err(err) => {
                self.drop_challenge();
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Abandon the challenge. In-flight responses become stale.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.in_flight = false;
        self.drop_challenge();
        self.attempts = 0;
        self.last_error = None;
    }

    fn drop_challenge(&mut self) {
        self.challenge = None;
        self.cooldown_until = None;
        self.step = AuthStep::Email;
    }
}
