use chrono::{DateTime, Utc};
use http::{header, HeaderMap, HeaderValue, Request};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Budget {
    Core,
    Search,
}

impl Budget {
    pub fn classify(path: &str, resource_header: Option<&HeaderValue>) -> Self {
        if let Some(resource) = resource_header.and_then(|v| v.to_str().ok()) {
            return match resource {
                "search" => Budget::Search,
                _ => Budget::Core,
            };
        }

        if path.starts_with("/search/") {
            Budget::Search
        } else {
            Budget::Core
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Budget::Core => "core",
            Budget::Search => "search",
        }
    }
}

#[derive(Debug)]
pub struct GithubRequest {
    inner: Request<Vec<u8>>,
    pub budget: Budget,
    key: String,
}

impl Clone for GithubRequest {
    fn clone(&self) -> Self {
        let mut inner = Request::new(self.inner.body().clone());
        *inner.method_mut() = self.inner.method().clone();
        *inner.uri_mut() = self.inner.uri().clone();
        *inner.version_mut() = self.inner.version();
        *inner.headers_mut() = self.inner.headers().clone();

        Self {
            inner,
            budget: self.budget,
            key: self.key.clone(),
        }
    }
}

impl GithubRequest {
    pub fn new(inner: Request<Vec<u8>>) -> anyhow::Result<Self> {
        let resource_hdr = inner.headers().get("x-ratelimit-resource").cloned();
        let budget = Budget::classify(inner.uri().path(), resource_hdr.as_ref());

        let key = format!(
            "{} {}{}",
            inner.method(),
            inner.uri().path(),
            inner
                .uri()
                .query()
                .map(|q| format!("?{}", q))
                .unwrap_or_default()
        );

        if !inner.headers().contains_key(header::USER_AGENT) {
            return Err(anyhow::anyhow!("user-agent header required"));
        }

        Ok(Self { inner, budget, key })
    }

    pub fn request(&self) -> Request<Vec<u8>> {
        self.clone().inner
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Path without the leading slash, used to name the failing call in errors.
    pub fn endpoint(&self) -> String {
        self.inner.uri().path().trim_start_matches('/').to_string()
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitUpdate {
    pub limit: i64,
    pub remaining: i64,
    pub reset: DateTime<Utc>,
}

pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitUpdate> {
    let limit = headers
        .get("x-ratelimit-limit")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())?;
    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())?;
    let reset_ts = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())?;
    let reset = DateTime::from_timestamp(reset_ts, 0)?;
    Some(RateLimitUpdate {
        limit,
        remaining,
        reset,
    })
}

pub fn parse_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
}

pub fn remaining_is_zero(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim() == "0")
        .unwrap_or(false)
}

pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = httpdate::parse_http_date(value).ok()?;
    Some(
        date.duration_since(std::time::SystemTime::now())
            .unwrap_or_default(),
    )
}

/// Extracts the `rel="next"` target from a GitHub `Link` header.
pub fn parse_next_link(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::LINK)?.to_str().ok()?;
    value.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if is_next {
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        } else {
            None
        }
    })
}
