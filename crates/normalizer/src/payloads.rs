use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Entry of `GET /orgs/{org}/teams/{team}/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberPayload {
    pub id: i64,
    pub login: String,
}

/// `GET /users/{login}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub total_count: i64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<SearchIssuePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchIssuePayload {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub state: String,
    pub html_url: String,
    pub repository_url: String,
    pub user: Option<UserRef>,
    pub created_at: DateTime<Utc>,
    pub pull_request: Option<PullRequestRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRef {
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub login: String,
}
