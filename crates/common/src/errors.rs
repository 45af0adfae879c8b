use std::fmt::Debug;

use chrono::{DateTime, Utc};

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(
        "authorization failed ({status}) for {endpoint}: check that the token is valid, \
         has the read:org scope, and is authorized for SAML SSO in the organization"
    )]
    Auth { endpoint: String, status: u16 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limit still exhausted after retry for {endpoint}{}", format_reset(.reset_at))]
    RateLimit {
        endpoint: String,
        reset_at: Option<DateTime<Utc>>,
    },
    #[error("request to {endpoint} failed after {attempts} attempts: {source}")]
    Fetch {
        endpoint: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),
    #[error("http error: {0}")]
    Http(#[source] anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(" (resets at {})", at.to_rfc3339()),
        None => String::new(),
    }
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn db(err: impl Into<anyhow::Error>) -> Self {
        Self::Database(err.into())
    }

    pub fn http(err: impl Into<anyhow::Error>) -> Self {
        Self::Http(err.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Short machine-friendly name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Auth { .. } => "auth",
            AppError::NotFound(_) => "not_found",
            AppError::RateLimit { .. } => "rate_limit",
            AppError::Fetch { .. } => "fetch",
            AppError::Database(_) => "database",
            AppError::Http(_) => "http",
            AppError::Other(_) => "other",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
