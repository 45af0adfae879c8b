pub mod backoff;
pub mod broker;
pub mod error;
pub mod model;

pub use backoff::{Failure, RetryDecision, RetryPolicy, RetryState};
pub use broker::{GithubBroker, GithubBrokerBuilder, HttpExec, ReqwestExecutor};
pub use error::HttpStatusError;
pub use model::{Budget, GithubRequest};
