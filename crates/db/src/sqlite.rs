use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::DateRange;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, QueryBuilder, Sqlite};
use tracing::{debug, instrument};

use crate::coverage;
use crate::errors::{DbError, Result};
use crate::models::{
    DailyActivityRow, FetchScope, FetchWindowRecord, FetchWindowRow, PullRequestRow, SummaryRow,
    UserRow,
};
use crate::repositories::{
    DailyActivityRepository, FetchWindowRepository, PullRequestRepository, Repositories,
    SummaryRepository, UserRepository,
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(DbError::Migration)
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    user_repo: Arc<SqliteUserRepository>,
    pr_repo: Arc<SqlitePullRequestRepository>,
    window_repo: Arc<SqliteFetchWindowRepository>,
    daily_repo: Arc<SqliteDailyActivityRepository>,
    summary_repo: Arc<SqliteSummaryRepository>,
}

impl SqliteStore {
    /// Opens (creating if needed) and migrates the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(DbError::Query)?
            .create_if_missing(true);

        // Each connection to `sqlite::memory:` is a separate database.
        let in_memory = database_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(DbError::Query)?;
        run_migrations(&pool).await?;
        debug!(database_url, "cache store ready");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        let user_repo = Arc::new(SqliteUserRepository { pool: pool.clone() });
        let pr_repo = Arc::new(SqlitePullRequestRepository { pool: pool.clone() });
        let window_repo = Arc::new(SqliteFetchWindowRepository { pool: pool.clone() });
        let daily_repo = Arc::new(SqliteDailyActivityRepository { pool: pool.clone() });
        let summary_repo = Arc::new(SqliteSummaryRepository { pool: pool.clone() });

        Self {
            pool,
            user_repo,
            pr_repo,
            window_repo,
            daily_repo,
            summary_repo,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl Repositories for SqliteStore {
    fn users(&self) -> &dyn UserRepository {
        &*self.user_repo
    }

    fn pull_requests(&self) -> &dyn PullRequestRepository {
        &*self.pr_repo
    }

    fn fetch_windows(&self) -> &dyn FetchWindowRepository {
        &*self.window_repo
    }

    fn daily_activity(&self) -> &dyn DailyActivityRepository {
        &*self.daily_repo
    }

    fn summaries(&self) -> &dyn SummaryRepository {
        &*self.summary_repo
    }
}

#[derive(Clone)]
struct SqliteUserRepository {
    pool: SqlitePool,
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    #[instrument(skip_all, fields(count = users.len()))]
    async fn upsert_many(&self, users: &[UserRow]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        for user in users {
            sqlx::query(
                r#"
                INSERT INTO users (login, display_name, email, excluded)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (login) DO UPDATE
                    SET display_name = excluded.display_name,
                        email = excluded.email,
                        excluded = excluded.excluded
                "#,
            )
            .bind(user.login.as_str())
            .bind(user.display_name.as_deref())
            .bind(user.email.as_deref())
            .bind(user.excluded)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;
        }
        tx.commit().await.map_err(DbError::Query)
    }

    async fn get(&self, login: &str) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT login, display_name, email, excluded
            FROM users
            WHERE login = ?
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn list(&self) -> Result<Vec<UserRow>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT login, display_name, email, excluded
            FROM users
            ORDER BY login
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}

async fn upsert_pull_request<'e, E>(executor: E, pr: &PullRequestRow) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO pull_requests (id, author_login, repository, number, title, url, state, created_at_utc)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE
            SET author_login = excluded.author_login,
                repository = excluded.repository,
                number = excluded.number,
                title = excluded.title,
                url = excluded.url,
                state = excluded.state,
                created_at_utc = excluded.created_at_utc
        "#,
    )
    .bind(pr.id)
    .bind(pr.author_login.as_str())
    .bind(pr.repository.as_str())
    .bind(pr.number)
    .bind(pr.title.as_str())
    .bind(pr.url.as_str())
    .bind(pr.state.as_str())
    .bind(pr.created_at_utc)
    .execute(executor)
    .await
    .map(|_| ())
    .map_err(DbError::Query)
}

async fn insert_fetch_window<'e, E>(executor: E, window: &FetchWindowRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO fetch_windows (organization, team, start_date, end_date, fetched_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(window.scope.organization.as_str())
    .bind(window.scope.team.as_str())
    .bind(window.range.start())
    .bind(window.range.end())
    .bind(window.fetched_at)
    .execute(executor)
    .await
    .map(|_| ())
    .map_err(DbError::Query)
}

#[derive(Clone)]
struct SqlitePullRequestRepository {
    pool: SqlitePool,
}

#[async_trait]
impl PullRequestRepository for SqlitePullRequestRepository {
    #[instrument(skip_all, fields(count = prs.len()))]
    async fn upsert_many(&self, prs: &[PullRequestRow]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        for pr in prs {
            upsert_pull_request(&mut *tx, pr).await?;
        }
        tx.commit().await.map_err(DbError::Query)
    }

    async fn list_for_authors(
        &self,
        logins: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PullRequestRow>> {
        if logins.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, author_login, repository, number, title, url, state, created_at_utc \
             FROM pull_requests WHERE created_at_utc >= ",
        );
        builder.push_bind(from);
        builder.push(" AND created_at_utc < ");
        builder.push_bind(to);
        builder.push(" AND author_login IN (");
        let mut separated = builder.separated(", ");
        for login in logins {
            separated.push_bind(login.as_str());
        }
        separated.push_unseparated(") ORDER BY created_at_utc, id");

        builder
            .build_query_as::<PullRequestRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }
}

#[derive(Clone)]
struct SqliteFetchWindowRepository {
    pool: SqlitePool,
}

#[async_trait]
impl FetchWindowRepository for SqliteFetchWindowRepository {
    async fn list(&self, scope: &FetchScope) -> Result<Vec<FetchWindowRow>> {
        sqlx::query_as::<_, FetchWindowRow>(
            r#"
            SELECT id, organization, team, start_date, end_date, fetched_at
            FROM fetch_windows
            WHERE organization = ? AND team = ?
            ORDER BY start_date, end_date, id
            "#,
        )
        .bind(scope.organization.as_str())
        .bind(scope.team.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    #[instrument(skip_all, fields(org = %scope.organization, team = %scope.team, %range))]
    async fn uncovered_ranges(&self, scope: &FetchScope, range: DateRange) -> Result<Vec<DateRange>> {
        let rows = sqlx::query_as::<_, FetchWindowRow>(
            r#"
            SELECT id, organization, team, start_date, end_date, fetched_at
            FROM fetch_windows
            WHERE organization = ? AND team = ? AND start_date <= ? AND end_date >= ?
            "#,
        )
        .bind(scope.organization.as_str())
        .bind(scope.team.as_str())
        .bind(range.end())
        .bind(range.start())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        let mut covering = Vec::with_capacity(rows.len());
        for row in rows {
            let window = row.range().map_err(|err| DbError::Config(err.into()))?;
            match coverage::covered_range(window, row.fetched_at) {
                Some(covered) => {
                    if covered != window {
                        debug!(window_id = row.id, covered = %covered, "fetch window clipped to elapsed days");
                    }
                    covering.push(covered);
                }
                None => debug!(window_id = row.id, "fetch window covers no elapsed day"),
            }
        }

        let gaps = coverage::uncovered(range, covering);
        debug!(gaps = gaps.len(), "computed uncovered ranges");
        Ok(gaps)
    }

    #[instrument(skip_all, fields(org = %window.scope.organization, team = %window.scope.team, range = %window.range))]
    async fn record(&self, window: &FetchWindowRecord) -> Result<()> {
        insert_fetch_window(&self.pool, window).await
    }

    #[instrument(skip_all, fields(range = %window.range, prs = prs.len()))]
    async fn commit_fetch(&self, window: &FetchWindowRecord, prs: &[PullRequestRow]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        for pr in prs {
            upsert_pull_request(&mut *tx, pr).await?;
        }
        let existing = sqlx::query_as::<_, FetchWindowRow>(
            r#"
            SELECT id, organization, team, start_date, end_date, fetched_at
            FROM fetch_windows
            WHERE organization = ? AND team = ?
            "#,
        )
        .bind(window.scope.organization.as_str())
        .bind(window.scope.team.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        // The new window is fetched later, so it vouches for everything an
        // older window covered inside its range.
        let superseded: Vec<i64> = existing
            .iter()
            .filter(|row| match row.range() {
                Ok(range) => match coverage::covered_range(range, row.fetched_at) {
                    Some(covered) => {
                        window.range.start() <= covered.start() && covered.end() <= window.range.end()
                    }
                    None => true,
                },
                Err(_) => false,
            })
            .map(|row| row.id)
            .collect();
        if !superseded.is_empty() {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM fetch_windows WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in &superseded {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(DbError::Query)?;
            debug!(pruned = superseded.len(), "replaced superseded fetch windows");
        }

        insert_fetch_window(&mut *tx, window).await?;
        tx.commit().await.map_err(DbError::Query)
    }
}

#[derive(Clone)]
struct SqliteDailyActivityRepository {
    pool: SqlitePool,
}

#[async_trait]
impl DailyActivityRepository for SqliteDailyActivityRepository {
    #[instrument(skip_all, fields(%range, count = rows.len()))]
    async fn replace_range(&self, range: DateRange, rows: &[DailyActivityRow]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        sqlx::query("DELETE FROM daily_activity WHERE local_date >= ? AND local_date <= ?")
            .bind(range.start())
            .bind(range.end())
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO daily_activity (user_login, local_date, in_time_count, outside_time_count, status)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (user_login, local_date) DO UPDATE
                    SET in_time_count = excluded.in_time_count,
                        outside_time_count = excluded.outside_time_count,
                        status = excluded.status
                "#,
            )
            .bind(row.user_login.as_str())
            .bind(row.local_date)
            .bind(row.in_time_count)
            .bind(row.outside_time_count)
            .bind(row.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;
        }
        tx.commit().await.map_err(DbError::Query)
    }

    async fn list(&self, range: DateRange) -> Result<Vec<DailyActivityRow>> {
        sqlx::query_as::<_, DailyActivityRow>(
            r#"
            SELECT user_login, local_date, in_time_count, outside_time_count, status
            FROM daily_activity
            WHERE local_date >= ? AND local_date <= ?
            ORDER BY user_login, local_date
            "#,
        )
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}

#[derive(Clone)]
struct SqliteSummaryRepository {
    pool: SqlitePool,
}

#[async_trait]
impl SummaryRepository for SqliteSummaryRepository {
    #[instrument(skip_all, fields(count = summaries.len()))]
    async fn upsert_many(&self, summaries: &[SummaryRow]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        for summary in summaries {
            sqlx::query(
                r#"
                INSERT INTO summaries (
                    user_login, period_start, period_end, total_prs, in_time_days,
                    outside_time_days, mixed_days, not_sent_days, active_days,
                    average_prs_per_active_day
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (user_login, period_start, period_end) DO UPDATE
                    SET total_prs = excluded.total_prs,
                        in_time_days = excluded.in_time_days,
                        outside_time_days = excluded.outside_time_days,
                        mixed_days = excluded.mixed_days,
                        not_sent_days = excluded.not_sent_days,
                        active_days = excluded.active_days,
                        average_prs_per_active_day = excluded.average_prs_per_active_day
                "#,
            )
            .bind(summary.user_login.as_str())
            .bind(summary.period_start)
            .bind(summary.period_end)
            .bind(summary.total_prs)
            .bind(summary.in_time_days)
            .bind(summary.outside_time_days)
            .bind(summary.mixed_days)
            .bind(summary.not_sent_days)
            .bind(summary.active_days)
            .bind(summary.average_prs_per_active_day)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;
        }
        tx.commit().await.map_err(DbError::Query)
    }

    async fn list(&self, range: DateRange) -> Result<Vec<SummaryRow>> {
        sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT user_login, period_start, period_end, total_prs, in_time_days,
                   outside_time_days, mixed_days, not_sent_days, active_days,
                   average_prs_per_active_day
            FROM summaries
            WHERE period_start = ? AND period_end = ?
            ORDER BY user_login
            "#,
        )
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}
