use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::DateRange;

use crate::errors::Result;
use crate::models::{
    DailyActivityRow, FetchScope, FetchWindowRecord, FetchWindowRow, PullRequestRow, SummaryRow,
    UserRow,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert_many(&self, users: &[UserRow]) -> Result<()>;
    async fn get(&self, login: &str) -> Result<Option<UserRow>>;
    /// All users ordered by login.
    async fn list(&self) -> Result<Vec<UserRow>>;
}

#[async_trait]
pub trait PullRequestRepository: Send + Sync {
    async fn upsert_many(&self, prs: &[PullRequestRow]) -> Result<()>;
    /// Pull requests by any of `logins` created in `[from, to)`, ordered by
    /// creation time then id.
    async fn list_for_authors(
        &self,
        logins: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PullRequestRow>>;
}

#[async_trait]
pub trait FetchWindowRepository: Send + Sync {
    async fn list(&self, scope: &FetchScope) -> Result<Vec<FetchWindowRow>>;
    /// Parts of `range` not covered by complete windows recorded for `scope`.
    async fn uncovered_ranges(&self, scope: &FetchScope, range: DateRange) -> Result<Vec<DateRange>>;
    async fn record(&self, window: &FetchWindowRecord) -> Result<()>;
    /// Upserts `prs` and records `window` in one transaction.
    async fn commit_fetch(&self, window: &FetchWindowRecord, prs: &[PullRequestRow]) -> Result<()>;
}

#[async_trait]
pub trait DailyActivityRepository: Send + Sync {
    /// Deletes every row dated inside `range`, then inserts `rows`.
    async fn replace_range(&self, range: DateRange, rows: &[DailyActivityRow]) -> Result<()>;
    async fn list(&self, range: DateRange) -> Result<Vec<DailyActivityRow>>;
}

#[async_trait]
pub trait SummaryRepository: Send + Sync {
    async fn upsert_many(&self, summaries: &[SummaryRow]) -> Result<()>;
    async fn list(&self, range: DateRange) -> Result<Vec<SummaryRow>>;
}

pub trait Repositories: Send + Sync {
    fn users(&self) -> &dyn UserRepository;
    fn pull_requests(&self) -> &dyn PullRequestRepository;
    fn fetch_windows(&self) -> &dyn FetchWindowRepository;
    fn daily_activity(&self) -> &dyn DailyActivityRepository;
    fn summaries(&self) -> &dyn SummaryRepository;
}
