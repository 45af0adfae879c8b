use std::collections::HashMap;
use std::sync::Arc;

use analysis::{
    classify_pull_request, fold_into_daily_activity, summarize_all, ClassifiedPr, DailyActivity,
    ExclusionFilter, PeriodSummary, WorkSchedule,
};
use chrono::Utc;
use common::config::ProjectConfig;
use common::{DateRange, Result};
use db::models::{FetchScope, FetchWindowRecord, PullRequestRow, UserRow};
use db::Repositories;
use normalizer::{NormalizedPullRequest, NormalizedUser};
use tracing::{error, info, instrument};

use crate::client::GithubClient;
use crate::report::RunReport;

/// What `sync_pull_requests` did for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub fetched_ranges: Vec<DateRange>,
    pub pull_requests: usize,
}

/// Derived data for one period.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub classified: Vec<ClassifiedPr>,
    pub daily: Vec<DailyActivity>,
    pub summaries: Vec<PeriodSummary>,
}

/// Sequential fetch, cache, classify and aggregate pass for one team.
pub struct Monitor<C: GithubClient + 'static> {
    project: ProjectConfig,
    schedule: WorkSchedule,
    filter: ExclusionFilter,
    client: Arc<C>,
    repos: Arc<dyn Repositories>,
    refresh: bool,
}

impl<C: GithubClient + 'static> Monitor<C> {
    pub fn new(project: ProjectConfig, client: Arc<C>, repos: Arc<dyn Repositories>) -> Result<Self> {
        project.validate()?;
        let schedule = WorkSchedule::from_config(&project)?;
        let filter = ExclusionFilter::from_config(&project);
        Ok(Self {
            project,
            schedule,
            filter,
            client,
            repos,
            refresh: false,
        })
    }

    /// Ignore recorded fetch windows and fetch the whole range again.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    fn scope(&self) -> FetchScope {
        FetchScope::new(&self.project.organization, &self.project.team)
    }

    #[instrument(skip_all, fields(%range))]
    pub async fn run(&self, range: DateRange) -> Result<RunReport> {
        let users = self.sync_users().await?;
        let sync = self.sync_pull_requests(range, &users).await?;
        let analysis = self.analyze(range, &users).await?;
        info!(
            fetched_ranges = sync.fetched_ranges.len(),
            fetched_prs = sync.pull_requests,
            classified = analysis.classified.len(),
            "run complete"
        );
        Ok(RunReport::build(
            &self.project,
            &self.schedule,
            &self.filter,
            range,
            Utc::now(),
            &users,
            analysis,
        ))
    }

    /// Fetches the team and upserts every member with its exclusion flag.
    #[instrument(skip(self))]
    pub async fn sync_users(&self) -> Result<Vec<UserRow>> {
        let members = self
            .client
            .fetch_team_members(&self.project.organization, &self.project.team)
            .await?;
        let users: Vec<UserRow> = members.iter().map(|m| to_user_row(m, &self.filter)).collect();
        self.repos.users().upsert_many(&users).await?;
        info!(
            members = users.len(),
            excluded = users.iter().filter(|u| u.excluded).count(),
            "synchronized team members"
        );
        Ok(users)
    }

    /// Fetches and commits only the parts of `range` the cache cannot serve.
    /// A failing gap aborts the run; gaps committed before it stay cached.
    #[instrument(skip_all, fields(%range))]
    pub async fn sync_pull_requests(&self, range: DateRange, users: &[UserRow]) -> Result<SyncOutcome> {
        let scope = self.scope();
        let gaps = if self.refresh {
            vec![range]
        } else {
            self.repos.fetch_windows().uncovered_ranges(&scope, range).await?
        };
        if gaps.is_empty() {
            info!("range served from cache");
            return Ok(SyncOutcome::default());
        }

        // Windows cover the whole team so they stay valid when filters change.
        let members: Vec<String> = users.iter().map(|u| u.login.clone()).collect();
        let mut outcome = SyncOutcome::default();
        for gap in gaps {
            let prs = match self
                .client
                .fetch_pull_requests(&self.project.organization, &members, gap)
                .await
            {
                Ok(prs) => prs,
                Err(err) => {
                    error!(gap = %gap, kind = err.kind(), error = %err, "fetch failed for range");
                    return Err(err);
                }
            };
            let rows: Vec<PullRequestRow> = prs.iter().map(to_pull_request_row).collect();
            let window = FetchWindowRecord {
                scope: scope.clone(),
                range: gap,
                fetched_at: Utc::now(),
            };
            self.repos.fetch_windows().commit_fetch(&window, &rows).await?;
            info!(gap = %gap, prs = rows.len(), "committed fetched range");
            outcome.fetched_ranges.push(gap);
            outcome.pull_requests += rows.len();
        }
        Ok(outcome)
    }

    /// Classifies cached pull requests, rewrites `daily_activity` for `range`
    /// and upserts the period summaries.
    #[instrument(skip_all, fields(%range))]
    pub async fn analyze(&self, range: DateRange, users: &[UserRow]) -> Result<Analysis> {
        let included: Vec<String> = users
            .iter()
            .filter(|u| !u.excluded)
            .map(|u| u.login.clone())
            .collect();
        let (from, to) = self.schedule.utc_span(range);
        let prs = self
            .repos
            .pull_requests()
            .list_for_authors(&included, from, to)
            .await?;

        let classified: Vec<ClassifiedPr> = prs
            .into_iter()
            .map(|pr| classify_pull_request(pr, &self.schedule))
            .filter(|c| range.contains(c.classification.local_date))
            .collect();
        let daily = fold_into_daily_activity(&classified, users, range, self.schedule.day_status);
        let rows: Vec<_> = daily.iter().map(DailyActivity::to_row).collect();
        self.repos.daily_activity().replace_range(range, &rows).await?;

        let summaries = summarize_all(range, &daily);
        let summary_rows: Vec<_> = summaries.iter().map(PeriodSummary::to_row).collect();
        self.repos.summaries().upsert_many(&summary_rows).await?;

        Ok(Analysis {
            classified,
            daily,
            summaries,
        })
    }
}

fn to_user_row(user: &NormalizedUser, filter: &ExclusionFilter) -> UserRow {
    UserRow {
        login: user.login.clone(),
        display_name: user.display_name.clone(),
        email: user.email.clone(),
        excluded: filter.is_excluded(&user.login, user.email.as_deref()),
    }
}

fn to_pull_request_row(pr: &NormalizedPullRequest) -> PullRequestRow {
    PullRequestRow {
        id: pr.id,
        author_login: pr.author_login.clone(),
        repository: pr.repository.clone(),
        number: pr.number,
        title: pr.title.clone(),
        url: pr.url.clone(),
        state: pr.state.as_str().to_string(),
        created_at_utc: pr.created_at_utc,
    }
}

/// Pull request count per author, for the user metadata result set.
pub(crate) fn count_by_author(classified: &[ClassifiedPr]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for item in classified {
        *counts.entry(item.pr.author_login.as_str()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use normalizer::PrState;

    #[test]
    fn user_rows_carry_exclusion_flag() {
        let filter = ExclusionFilter::new(["bot"], Some("@acme.dev"));
        let bot = NormalizedUser {
            login: "bot".into(),
            display_name: None,
            email: None,
        };
        let outsider = NormalizedUser {
            login: "eve".into(),
            display_name: Some("Eve".into()),
            email: Some("eve@example.com".into()),
        };
        let member = NormalizedUser {
            login: "amy".into(),
            display_name: None,
            email: Some("amy@acme.dev".into()),
        };
        assert!(to_user_row(&bot, &filter).excluded);
        assert!(to_user_row(&outsider, &filter).excluded);
        assert!(!to_user_row(&member, &filter).excluded);
    }

    #[test]
    fn pull_request_rows_store_state_text() {
        let pr = NormalizedPullRequest {
            id: 5,
            number: 12,
            author_login: "amy".into(),
            repository: "acme/widgets".into(),
            title: "Fix".into(),
            url: "https://github.com/acme/widgets/pull/12".into(),
            state: PrState::Merged,
            created_at_utc: Utc.with_ymd_and_hms(2025, 3, 9, 7, 59, 0).unwrap(),
        };
        assert_eq!(to_pull_request_row(&pr).state, "merged");
    }
}
