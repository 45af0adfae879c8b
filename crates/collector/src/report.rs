use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use analysis::{Bucket, ClassifiedPr, DailyActivity, ExclusionFilter, PeriodSummary, WorkSchedule};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::config::{DayStatusPolicy, EndBoundary, ProjectConfig};
use common::{DateRange, Result};
use db::models::UserRow;
use serde::Serialize;
use tracing::info;

use crate::service::{count_by_author, Analysis};

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub generated_at: DateTime<Utc>,
    pub organization: String,
    pub team: String,
    pub timezone: String,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub end_boundary: EndBoundary,
    pub day_status: DayStatusPolicy,
    pub period: DateRange,
    pub excluded_logins: Vec<String>,
    pub email_suffix_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserMetadata {
    pub login: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub excluded: bool,
    pub total_prs: usize,
    pub active_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrDetail {
    pub user_login: String,
    pub local_date: NaiveDate,
    pub local_time: String,
    pub created_at_utc: DateTime<Utc>,
    pub repository: String,
    pub number: i64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub bucket: Bucket,
}

impl From<&ClassifiedPr> for PrDetail {
    fn from(item: &ClassifiedPr) -> Self {
        Self {
            user_login: item.pr.author_login.clone(),
            local_date: item.classification.local_date,
            local_time: item.classification.local_time.format("%H:%M:%S").to_string(),
            created_at_utc: item.pr.created_at_utc,
            repository: item.pr.repository.clone(),
            number: item.pr.number,
            title: item.pr.title.clone(),
            url: item.pr.url.clone(),
            state: item.pr.state.clone(),
            bucket: item.classification.bucket,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub users: usize,
    pub excluded_users: usize,
    pub total_prs: u32,
    pub in_time_days: u32,
    pub outside_time_days: u32,
    pub mixed_days: u32,
    pub not_sent_days: u32,
}

/// Result sets of one run, handed to a [`ReportWriter`]. Serialized whole,
/// this is the combined dataset.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub users: Vec<UserMetadata>,
    pub daily: Vec<DailyActivity>,
    pub summaries: Vec<PeriodSummary>,
    pub pull_requests: Vec<PrDetail>,
}

impl RunReport {
    pub fn build(
        project: &ProjectConfig,
        schedule: &WorkSchedule,
        filter: &ExclusionFilter,
        period: DateRange,
        generated_at: DateTime<Utc>,
        users: &[UserRow],
        analysis: Analysis,
    ) -> Self {
        let counts = count_by_author(&analysis.classified);
        let mut user_meta: Vec<UserMetadata> = users
            .iter()
            .map(|user| UserMetadata {
                login: user.login.clone(),
                display_name: user.display_name.clone(),
                email: user.email.clone(),
                excluded: user.excluded,
                total_prs: counts.get(user.login.as_str()).copied().unwrap_or(0),
                active_days: analysis
                    .summaries
                    .iter()
                    .find(|s| s.user_login == user.login)
                    .map(|s| s.active_days)
                    .unwrap_or(0),
            })
            .collect();
        user_meta.sort_by(|a, b| a.login.cmp(&b.login));

        Self {
            metadata: RunMetadata {
                generated_at,
                organization: project.organization.clone(),
                team: project.team.clone(),
                timezone: schedule.tz.name().to_string(),
                work_start_hour: schedule.start_hour,
                work_end_hour: schedule.end_hour,
                end_boundary: schedule.end_boundary,
                day_status: schedule.day_status,
                period,
                excluded_logins: filter.excluded_logins(),
                email_suffix_filter: filter.email_suffix().map(str::to_string),
            },
            users: user_meta,
            pull_requests: analysis.classified.iter().map(PrDetail::from).collect(),
            daily: analysis.daily,
            summaries: analysis.summaries,
        }
    }

    pub fn totals(&self) -> Totals {
        let mut totals = Totals {
            users: self.summaries.len(),
            excluded_users: self.users.iter().filter(|u| u.excluded).count(),
            ..Totals::default()
        };
        for s in &self.summaries {
            totals.total_prs += s.total_prs;
            totals.in_time_days += s.in_time_days;
            totals.outside_time_days += s.outside_time_days;
            totals.mixed_days += s.mixed_days;
            totals.not_sent_days += s.not_sent_days;
        }
        totals
    }
}

#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Returns the paths written.
    async fn write(&self, report: &RunReport) -> Result<Vec<PathBuf>>;
}

/// Writes `<prefix>_{users,daily,summary,full}_<timestamp>.json`.
pub struct JsonReportWriter {
    output_dir: PathBuf,
    prefix: String,
}

impl JsonReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
        }
    }

    fn path_for(&self, kind: &str, stamp: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{kind}_{stamp}.json", self.prefix))
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl ReportWriter for JsonReportWriter {
    async fn write(&self, report: &RunReport) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("creating {}", self.output_dir.display()))?;
        let stamp = report.metadata.generated_at.format("%Y%m%d_%H%M%S").to_string();

        let users = self.path_for("users", &stamp);
        write_json(&users, &report.users).await?;
        let daily = self.path_for("daily", &stamp);
        write_json(&daily, &report.daily).await?;
        let summary = self.path_for("summary", &stamp);
        write_json(&summary, &report.summaries).await?;
        let full = self.path_for("full", &stamp);
        write_json(&full, report).await?;

        let paths = vec![users, daily, summary, full];
        for path in &paths {
            info!(path = %path.display(), "report written");
        }
        Ok(paths)
    }
}

/// Plain-text per-user table with a totals line.
pub fn render_console_summary(report: &RunReport) -> String {
    let meta = &report.metadata;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}/{} {} ({}, {:02}:00-{:02}:00)",
        meta.organization, meta.team, meta.period, meta.timezone, meta.work_start_hour, meta.work_end_hour
    );
    let _ = writeln!(
        out,
        "{:<24} {:>8} {:>8} {:>6} {:>9} {:>6} {:>8}",
        "user", "in_time", "outside", "mixed", "not_sent", "prs", "avg/day"
    );
    for s in &report.summaries {
        let _ = writeln!(
            out,
            "{:<24} {:>8} {:>8} {:>6} {:>9} {:>6} {:>8.2}",
            s.user_login,
            s.in_time_days,
            s.outside_time_days,
            s.mixed_days,
            s.not_sent_days,
            s.total_prs,
            s.average_prs_per_active_day
        );
    }
    let totals = report.totals();
    let _ = writeln!(
        out,
        "{:<24} {:>8} {:>8} {:>6} {:>9} {:>6}",
        format!("total ({} users, {} excluded)", totals.users, totals.excluded_users),
        totals.in_time_days,
        totals.outside_time_days,
        totals.mixed_days,
        totals.not_sent_days,
        totals.total_prs
    );
    out
}
