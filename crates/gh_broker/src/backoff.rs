use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::FetchConfig;
use common::AppError;
use http::{Response, StatusCode};

use crate::error::HttpStatusError;
use crate::model::{parse_reset, parse_retry_after, remaining_is_zero};

pub fn exponential_jitter_backoff(
    base: Duration,
    attempt: u32,
    max: Duration,
    jitter_frac: f32,
) -> Duration {
    let capped_attempt = attempt.min(8);
    let factor = 1u64.checked_shl(capped_attempt).unwrap_or(1 << 8);
    let raw = base.saturating_mul(factor as u32);
    let capped = if raw > max { max } else { raw };
    let nanos = capped.as_nanos() as i128;
    let jitter = ((nanos as f64) * (jitter_frac as f64)).round() as i128;
    let delta = fastrand::i128(-jitter..=jitter);
    let result = (nanos + delta).max(0) as u128;
    Duration::from_nanos(result as u64)
}

/// Why a single request attempt did not produce a usable response.
#[derive(Debug)]
pub enum Failure {
    Transport(anyhow::Error),
    Server(StatusCode),
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
        retry_after: Option<Duration>,
    },
    Unauthorized(StatusCode),
    NotFound,
    Client(HttpStatusError),
}

impl Failure {
    pub fn from_response(resp: &Response<Vec<u8>>, endpoint: &str) -> Self {
        let status = resp.status();
        let headers = resp.headers();
        match status {
            StatusCode::TOO_MANY_REQUESTS => Failure::RateLimited {
                reset_at: parse_reset(headers),
                retry_after: parse_retry_after(headers),
            },
            StatusCode::FORBIDDEN if is_rate_limit_403(resp) => Failure::RateLimited {
                reset_at: parse_reset(headers),
                retry_after: parse_retry_after(headers),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Failure::Unauthorized(status),
            StatusCode::NOT_FOUND => Failure::NotFound,
            StatusCode::REQUEST_TIMEOUT => Failure::Server(status),
            s if s.is_server_error() => Failure::Server(status),
            _ => Failure::Client(HttpStatusError::new(status, endpoint).with_body(resp.body())),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Failure::Transport(_) | Failure::Server(_))
    }

    pub fn into_app_error(self, endpoint: &str, state: &RetryState) -> AppError {
        match self {
            Failure::Transport(err) => AppError::Fetch {
                endpoint: endpoint.to_string(),
                attempts: state.transient_failures,
                source: err,
            },
            Failure::Server(status) => AppError::Fetch {
                endpoint: endpoint.to_string(),
                attempts: state.transient_failures,
                source: HttpStatusError::new(status, endpoint).into(),
            },
            Failure::RateLimited { reset_at, .. } => AppError::RateLimit {
                endpoint: endpoint.to_string(),
                reset_at,
            },
            Failure::Unauthorized(status) => AppError::Auth {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            },
            Failure::NotFound => AppError::not_found(endpoint.to_string()),
            Failure::Client(err) => AppError::http(err),
        }
    }
}

fn is_rate_limit_403(resp: &Response<Vec<u8>>) -> bool {
    if remaining_is_zero(resp.headers()) || resp.headers().contains_key(http::header::RETRY_AFTER)
    {
        return true;
    }
    let body = String::from_utf8_lossy(resp.body()).to_ascii_lowercase();
    body.contains("rate limit")
}

/// Failures seen so far for one logical request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub transient_failures: u32,
    pub rate_limit_hits: u32,
}

impl RetryState {
    pub fn record(&mut self, failure: &Failure) {
        if failure.is_transient() {
            self.transient_failures += 1;
        } else if matches!(failure, Failure::RateLimited { .. }) {
            self.rate_limit_hits += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { wait: Duration, reason: &'static str },
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed when failures are transient.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter_frac: f32,
    /// Retries granted after the rate limit resets.
    pub rate_limit_retries: u32,
    pub max_rate_limit_wait: Duration,
    pub rate_limit_padding: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(10),
            jitter_frac: 0.2,
            rate_limit_retries: 1,
            max_rate_limit_wait: Duration::from_secs(3600),
            rate_limit_padding: Duration::from_secs(1),
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(cfg: &FetchConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
            backoff_max: Duration::from_millis(cfg.backoff_max_ms),
            jitter_frac: cfg.jitter_frac.clamp(0.0, 1.0),
            max_rate_limit_wait: Duration::from_secs(cfg.max_rate_limit_wait_secs),
            ..Self::default()
        }
    }
}

impl RetryPolicy {
    /// `state` must already include `failure`.
    pub fn decide(&self, failure: &Failure, state: &RetryState, now: DateTime<Utc>) -> RetryDecision {
        match failure {
            Failure::Transport(_) | Failure::Server(_) => {
                if state.transient_failures >= self.max_attempts {
                    return RetryDecision::GiveUp;
                }
                RetryDecision::Retry {
                    wait: exponential_jitter_backoff(
                        self.backoff_base,
                        state.transient_failures.saturating_sub(1),
                        self.backoff_max,
                        self.jitter_frac,
                    ),
                    reason: "transient",
                }
            }
            Failure::RateLimited {
                reset_at,
                retry_after,
            } => {
                if state.rate_limit_hits > self.rate_limit_retries {
                    return RetryDecision::GiveUp;
                }
                let until_reset = reset_at
                    .map(|reset| (reset - now).to_std().unwrap_or_default())
                    .unwrap_or_default();
                let wait = retry_after.unwrap_or(until_reset).max(until_reset);
                RetryDecision::Retry {
                    wait: (wait + self.rate_limit_padding).min(self.max_rate_limit_wait),
                    reason: "rate_limit",
                }
            }
            Failure::Unauthorized(_) | Failure::NotFound | Failure::Client(_) => {
                RetryDecision::GiveUp
            }
        }
    }
}
