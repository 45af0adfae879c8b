use chrono::{DateTime, NaiveDate, Utc};
use common::DateRange;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub login: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PullRequestRow {
    pub id: i64,
    pub author_login: String,
    pub repository: String,
    pub number: i64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DailyActivityRow {
    pub user_login: String,
    pub local_date: NaiveDate,
    pub in_time_count: i64,
    pub outside_time_count: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SummaryRow {
    pub user_login: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_prs: i64,
    pub in_time_days: i64,
    pub outside_time_days: i64,
    pub mixed_days: i64,
    pub not_sent_days: i64,
    pub active_days: i64,
    pub average_prs_per_active_day: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FetchWindowRow {
    pub id: i64,
    pub organization: String,
    pub team: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

impl FetchWindowRow {
    /// Inverted rows cannot be stored, so this only fails on corrupt data.
    pub fn range(&self) -> common::Result<DateRange> {
        DateRange::new(self.start_date, self.end_date)
    }
}

/// Organization/team pair a fetch window belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchScope {
    pub organization: String,
    pub team: String,
}

impl FetchScope {
    pub fn new(organization: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            team: team.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchWindowRecord {
    pub scope: FetchScope,
    pub range: DateRange,
    pub fetched_at: DateTime<Utc>,
}
