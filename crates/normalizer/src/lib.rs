pub mod models;
pub mod payloads;
pub mod transform;

pub use models::{NormalizedPullRequest, NormalizedUser, PrState};
pub use payloads::{MemberPayload, SearchIssuePayload, SearchPage, UserPayload};
pub use transform::{normalize_pull_request, normalize_user, repository_from_url};
