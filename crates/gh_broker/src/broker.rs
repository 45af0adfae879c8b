use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use common::AppError;
use futures::FutureExt;
use http::{header, HeaderValue, Request, Response};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backoff::{Failure, RetryDecision, RetryPolicy, RetryState};
use crate::model::{parse_rate_limit, GithubRequest};

#[async_trait]
pub trait HttpExec: Send + Sync {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("pr-monitor")
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExec for ReqwestExecutor {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let (parts, body) = req.into_parts();
        let mut builder = self.client.request(parts.method, parts.uri.to_string());
        builder = builder.headers(parts.headers);
        let resp = builder.body(body).send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;
        let mut response = Response::new(bytes.to_vec());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Executes GitHub requests one at a time, applying the retry policy.
pub trait GithubBroker: Send + Sync {
    fn execute(
        &self,
        request: Request<Vec<u8>>,
    ) -> futures::future::BoxFuture<'static, Result<Response<Vec<u8>>, AppError>>;
}

#[derive(Clone)]
pub struct GithubBrokerBuilder {
    token: String,
    http_exec: Option<Arc<dyn HttpExec>>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl GithubBrokerBuilder {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http_exec: None,
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn http_exec(mut self, exec: Arc<dyn HttpExec>) -> Self {
        self.http_exec = Some(exec);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Arc<dyn GithubBroker>> {
        let exec = match self.http_exec {
            Some(exec) => exec,
            None => Arc::new(ReqwestExecutor::new(self.timeout)?),
        };

        Ok(Arc::new(LocalGithubBroker {
            inner: Arc::new(Inner {
                http_exec: exec,
                token: self.token,
                policy: self.policy,
            }),
        }))
    }
}

struct Inner {
    http_exec: Arc<dyn HttpExec>,
    token: String,
    policy: RetryPolicy,
}

#[derive(Clone)]
pub struct LocalGithubBroker {
    inner: Arc<Inner>,
}

impl GithubBroker for LocalGithubBroker {
    fn execute(
        &self,
        request: Request<Vec<u8>>,
    ) -> futures::future::BoxFuture<'static, Result<Response<Vec<u8>>, AppError>> {
        let inner = self.inner.clone();
        async move {
            let mut gh_req = GithubRequest::new(request).map_err(AppError::http)?;
            let auth = HeaderValue::from_str(&format!("Bearer {}", inner.token))
                .map_err(|err| AppError::config(format!("invalid github token: {err}")))?;
            gh_req.headers_mut().insert(header::AUTHORIZATION, auth);
            execute_with_policy(&inner, gh_req).await
        }
        .boxed()
    }
}

async fn execute_with_policy(
    inner: &Inner,
    request: GithubRequest,
) -> Result<Response<Vec<u8>>, AppError> {
    let endpoint = request.endpoint();
    let mut state = RetryState::default();

    loop {
        let failure = match inner.http_exec.execute(request.request()).await {
            Ok(resp) if resp.status().is_success() => {
                if let Some(rate) = parse_rate_limit(resp.headers()) {
                    debug!(
                        request = %request.key(),
                        budget = request.budget.as_str(),
                        remaining = rate.remaining,
                        limit = rate.limit,
                        "GitHub request completed"
                    );
                }
                return Ok(resp);
            }
            Ok(resp) => Failure::from_response(&resp, &endpoint),
            Err(err) => Failure::Transport(err),
        };

        state.record(&failure);
        match inner.policy.decide(&failure, &state, Utc::now()) {
            RetryDecision::Retry { wait, reason } => {
                warn!(
                    request = %request.key(),
                    budget = request.budget.as_str(),
                    reason,
                    transient_failures = state.transient_failures,
                    rate_limit_hits = state.rate_limit_hits,
                    wait_ms = wait.as_millis() as u64,
                    failure = ?failure,
                    "GitHub request failed; retrying"
                );
                sleep(wait).await;
            }
            RetryDecision::GiveUp => {
                warn!(
                    request = %request.key(),
                    failure = ?failure,
                    "GitHub request failed; giving up"
                );
                return Err(failure.into_app_error(&endpoint, &state));
            }
        }
    }
}
