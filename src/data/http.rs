use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use crate::config::{ApiConfig, RetryConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Failure below the HTTP status level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }
}

/// Terminal outcome of a request after the retry loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("non-retryable failure (status {}): {reason}", status_label(.status))]
    Fatal { status: Option<u16>, reason: String },

    #[error("gave up after {attempts} attempts (last status {}): {reason}", status_label(.last_status))]
    Exhausted {
        attempts: u32,
        last_status: Option<u16>,
        reason: String,
    },
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fatal { status, .. } => *status,
            Self::Exhausted { last_status, .. } => *last_status,
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, TransportError>;
}

/// Production transport. Timeouts apply per attempt.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn from_config(api: &ApiConfig) -> Result<Self, TransportError> {
        Self::new(
            Duration::from_secs(api.connect_timeout_secs),
            Duration::from_secs(api.request_timeout_secs),
        )
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify_reqwest_error)?;

        Ok(HttpResponse { status, body: body.to_vec() })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    let timeout = e.is_timeout();
    let transient = e.is_connect() || e.is_request() || e.is_body();
    // The URL carries the API token, strip it before the message is logged.
    let message = e.without_url().to_string();
    if timeout {
        TransportError::Timeout(message)
    } else if transient {
        TransportError::Connect(message)
    } else {
        TransportError::Other(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Transient,
    Fatal,
}

/// 429 and 5xx are worth retrying; any other non-2xx status is final.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Fatal,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            multiplier: cfg.multiplier.max(1.0),
            jitter_pct: cfg.jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Policy with no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_pct: 0.0,
        }
    }

    /// Delay after the given failed attempt (1-based), before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_pct <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(-self.jitter_pct..=self.jitter_pct);
        delay.mul_f64(1.0 + factor)
    }
}

/// States of one request's retry loop.
#[derive(Debug)]
enum RetryState {
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded(HttpResponse),
    Exhausted(HttpError),
}

/// Result of a single attempt, before the policy is applied.
#[derive(Debug)]
enum AttemptOutcome {
    Success(HttpResponse),
    Transient { status: Option<u16>, reason: String },
    Fatal { status: Option<u16>, reason: String },
}

pub struct ResilientClient<T: Transport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> ResilientClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET with bounded retry. Returns the successful response or the final
    /// error once the attempt budget is spent.
    pub async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, HttpError> {
        let mut state = RetryState::Attempting { attempt: 1 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    match self.attempt(url, query).await {
                        AttemptOutcome::Success(response) => RetryState::Succeeded(response),
                        AttemptOutcome::Fatal { status, reason } => {
                            RetryState::Exhausted(HttpError::Fatal { status, reason })
                        }
                        AttemptOutcome::Transient { status, reason } => {
                            if attempt >= self.policy.max_attempts {
                                RetryState::Exhausted(HttpError::Exhausted {
                                    attempts: attempt,
                                    last_status: status,
                                    reason,
                                })
                            } else {
                                let delay = self.policy.jittered(self.policy.delay_for(attempt));
                                warn!(
                                    "Retry {}/{} for {}: {}. Waiting {:?}",
                                    attempt, self.policy.max_attempts, url, reason, delay
                                );
                                RetryState::Backoff { attempt, delay }
                            }
                        }
                    }
                }
                RetryState::Backoff { attempt, delay } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    RetryState::Attempting { attempt: attempt + 1 }
                }
                RetryState::Succeeded(response) => return Ok(response),
                RetryState::Exhausted(err) => return Err(err),
            };
        }
    }

    async fn attempt(&self, url: &str, query: &[(String, String)]) -> AttemptOutcome {
        match self.transport.get(url, query).await {
            Ok(response) => match classify_status(response.status) {
                StatusClass::Success => {
                    debug!("GET {} -> {} ({} bytes)", url, response.status, response.body.len());
                    AttemptOutcome::Success(response)
                }
                StatusClass::Transient => AttemptOutcome::Transient {
                    status: Some(response.status),
                    reason: body_snippet(&response.body),
                },
                StatusClass::Fatal => AttemptOutcome::Fatal {
                    status: Some(response.status),
                    reason: body_snippet(&response.body),
                },
            },
            Err(e) if e.is_transient() => AttemptOutcome::Transient {
                status: None,
                reason: e.to_string(),
            },
            Err(e) => AttemptOutcome::Fatal {
                status: None,
                reason: e.to_string(),
            },
        }
    }
}

fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.chars().count() > 200 {
        format!("{}...", trimmed.chars().take(200).collect::<String>())
    } else {
        trimmed.to_string()
    }
}
