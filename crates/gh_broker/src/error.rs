use std::fmt;

use http::StatusCode;

/// Non-success response that no retry will fix.
#[derive(Debug)]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub endpoint: String,
    pub body_preview: String,
}

impl HttpStatusError {
    pub fn new(status: StatusCode, endpoint: impl Into<String>) -> Self {
        Self {
            status,
            endpoint: endpoint.into(),
            body_preview: String::new(),
        }
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body_preview = body_preview(body);
        self
    }
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected status {} for {}", self.status, self.endpoint)?;
        if !self.body_preview.is_empty() {
            write!(f, ": {}", self.body_preview)?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpStatusError {}

pub(crate) fn body_preview(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    let text = String::from_utf8_lossy(body);
    truncate_str(&text, 256)
}

fn truncate_str(value: &str, limit: usize) -> String {
    let mut truncated: String = value.chars().take(limit).collect();
    if truncated.len() < value.len() {
        truncated.push('…');
    }
    truncated
}
