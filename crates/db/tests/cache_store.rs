use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use common::DateRange;
use db::{
    DailyActivityRow, FetchScope, FetchWindowRecord, PullRequestRow, Repositories, SqliteStore,
    SummaryRow, UserRow,
};
use db_test_fixture::DbFixture;

fn dec(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, day).unwrap()
}

fn range(start: u32, end: u32) -> DateRange {
    DateRange::new(dec(start), dec(end)).unwrap()
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, day, hour, 0, 0).unwrap()
}

fn scope() -> FetchScope {
    FetchScope::new("acme", "core")
}

fn window(start: u32, end: u32) -> FetchWindowRecord {
    FetchWindowRecord {
        scope: scope(),
        range: range(start, end),
        fetched_at: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
    }
}

fn pr(id: i64, author: &str, created_at: DateTime<Utc>) -> PullRequestRow {
    PullRequestRow {
        id,
        author_login: author.into(),
        repository: "acme/widgets".into(),
        number: id,
        title: format!("change {id}"),
        url: format!("https://github.com/acme/widgets/pull/{id}"),
        state: "open".into(),
        created_at_utc: created_at,
    }
}

async fn all_prs(store: &SqliteStore) -> anyhow::Result<Vec<PullRequestRow>> {
    let (from, to) = range(1, 31).utc_bounds();
    let logins = vec!["alice".to_string(), "bob".to_string()];
    Ok(store
        .pull_requests()
        .list_for_authors(&logins, from, to)
        .await?)
}

#[tokio::test]
async fn pull_request_upsert_is_idempotent() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let store = fixture.store();
    let batch = vec![pr(1, "alice", at(2, 10)), pr(2, "bob", at(3, 11))];

    store.pull_requests().upsert_many(&batch).await?;
    let once = all_prs(store).await?;
    store.pull_requests().upsert_many(&batch).await?;
    let twice = all_prs(store).await?;

    assert_eq!(once, twice);
    assert_eq!(twice.len(), 2);
    Ok(())
}

#[tokio::test]
async fn refetched_pull_request_updates_in_place() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let store = fixture.store();
    store.pull_requests().upsert_many(&[pr(7, "alice", at(4, 9))]).await?;

    let mut merged = pr(7, "alice", at(4, 9));
    merged.state = "merged".into();
    store.pull_requests().upsert_many(&[merged.clone()]).await?;

    assert_eq!(all_prs(store).await?, vec![merged]);
    Ok(())
}

#[tokio::test]
async fn author_and_instant_filters_apply() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let store = fixture.store();
    store
        .pull_requests()
        .upsert_many(&[
            pr(1, "alice", at(1, 0)),
            pr(2, "alice", at(5, 23)),
            pr(3, "alice", at(6, 0)),
            pr(4, "carol", at(3, 12)),
        ])
        .await?;

    let (from, to) = range(1, 5).utc_bounds();
    let found = store
        .pull_requests()
        .list_for_authors(&["alice".to_string()], from, to)
        .await?;
    let ids: Vec<_> = found.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2]);

    assert!(store
        .pull_requests()
        .list_for_authors(&[], from, to)
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn users_upsert_keeps_latest_flags() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let users = fixture.store().users();
    let mut bob = UserRow {
        login: "bob".into(),
        display_name: Some("Bob".into()),
        email: None,
        excluded: false,
    };
    users
        .upsert_many(&[
            bob.clone(),
            UserRow {
                login: "alice".into(),
                display_name: None,
                email: Some("alice@acme.dev".into()),
                excluded: false,
            },
        ])
        .await?;
    bob.excluded = true;
    users.upsert_many(&[bob.clone()]).await?;

    let listed = users.list().await?;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].login, "alice");
    assert_eq!(users.get("bob").await?, Some(bob));
    assert_eq!(users.get("nobody").await?, None);
    Ok(())
}

#[tokio::test]
async fn recorded_windows_leave_only_the_gap() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let windows = fixture.store().fetch_windows();
    windows.record(&window(1, 5)).await?;
    windows.record(&window(8, 11)).await?;

    assert_eq!(windows.uncovered_ranges(&scope(), range(1, 11)).await?, vec![range(6, 7)]);
    assert!(windows.uncovered_ranges(&scope(), range(2, 4)).await?.is_empty());

    let other_team = FetchScope::new("acme", "infra");
    assert_eq!(
        windows.uncovered_ranges(&other_team, range(1, 11)).await?,
        vec![range(1, 11)]
    );
    assert_eq!(windows.list(&scope()).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn window_fetched_on_its_last_day_covers_elapsed_days() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let windows = fixture.store().fetch_windows();
    windows
        .record(&FetchWindowRecord {
            scope: scope(),
            range: range(3, 10),
            fetched_at: at(10, 15),
        })
        .await?;

    assert_eq!(windows.uncovered_ranges(&scope(), range(4, 11)).await?, vec![range(10, 11)]);
    assert!(windows.uncovered_ranges(&scope(), range(3, 9)).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn window_fetched_on_its_first_day_covers_nothing() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let windows = fixture.store().fetch_windows();
    windows
        .record(&FetchWindowRecord {
            scope: scope(),
            range: range(10, 10),
            fetched_at: at(10, 9),
        })
        .await?;

    assert_eq!(windows.uncovered_ranges(&scope(), range(10, 10)).await?, vec![range(10, 10)]);
    Ok(())
}

#[tokio::test]
async fn commit_fetch_replaces_superseded_windows() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let windows = fixture.store().fetch_windows();
    let fetched = |start: u32, end: u32, fetched_at: DateTime<Utc>| FetchWindowRecord {
        scope: scope(),
        range: range(start, end),
        fetched_at,
    };

    windows.commit_fetch(&fetched(1, 5, at(6, 0)), &[]).await?;
    windows.commit_fetch(&fetched(3, 10, at(10, 15)), &[]).await?;
    windows.commit_fetch(&fetched(10, 11, at(11, 8)), &[]).await?;
    windows.commit_fetch(&fetched(11, 11, at(11, 9)), &[]).await?;
    // Another team's windows are never touched.
    windows
        .commit_fetch(
            &FetchWindowRecord {
                scope: FetchScope::new("acme", "infra"),
                range: range(3, 10),
                fetched_at: at(10, 15),
            },
            &[],
        )
        .await?;
    assert_eq!(windows.list(&scope()).await?.len(), 4);

    windows.commit_fetch(&fetched(4, 11, at(12, 0)), &[]).await?;
    let kept: Vec<DateRange> = windows
        .list(&scope())
        .await?
        .iter()
        .map(|row| row.range())
        .collect::<Result<_, _>>()?;
    assert_eq!(kept, vec![range(1, 5), range(3, 10), range(4, 11)]);
    assert_eq!(windows.list(&FetchScope::new("acme", "infra")).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn schema_rejects_inverted_windows() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let inserted = sqlx::query(
        "INSERT INTO fetch_windows (organization, team, start_date, end_date, fetched_at) \
         VALUES ('acme', 'core', ?, ?, ?)",
    )
    .bind(dec(9))
    .bind(dec(2))
    .bind(at(20, 0))
    .execute(fixture.pool())
    .await;

    assert!(inserted.is_err());
    assert!(fixture.store().fetch_windows().list(&scope()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn commit_fetch_persists_prs_and_window_together() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let store = fixture.store();
    store
        .fetch_windows()
        .commit_fetch(&window(1, 7), &[pr(1, "alice", at(2, 10)), pr(2, "bob", at(6, 20))])
        .await?;

    assert_eq!(all_prs(store).await?.len(), 2);
    assert!(store
        .fetch_windows()
        .uncovered_ranges(&scope(), range(1, 7))
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn prs_without_window_leave_range_uncovered() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let store = fixture.store();

    // Process dies after the upsert, before the window is recorded.
    store.pull_requests().upsert_many(&[pr(1, "alice", at(2, 10))]).await?;

    assert_eq!(
        store.fetch_windows().uncovered_ranges(&scope(), range(1, 7)).await?,
        vec![range(1, 7)]
    );
    Ok(())
}

#[tokio::test]
async fn failed_commit_rolls_back_everything() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let store = fixture.store();
    let mut broken = pr(2, "bob", at(3, 10));
    broken.state = "draft".into();

    let result = store
        .fetch_windows()
        .commit_fetch(&window(1, 7), &[pr(1, "alice", at(2, 10)), broken])
        .await;

    assert!(result.is_err());
    assert!(all_prs(store).await?.is_empty());
    assert!(store.fetch_windows().list(&scope()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn daily_activity_replace_is_scoped_to_range() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let daily = fixture.store().daily_activity();
    let row = |day: u32, status: &str, in_time: i64| DailyActivityRow {
        user_login: "alice".into(),
        local_date: dec(day),
        in_time_count: in_time,
        outside_time_count: 0,
        status: status.into(),
    };

    daily
        .replace_range(range(1, 3), &[row(1, "in_time", 1), row(2, "not_sent", 0), row(3, "not_sent", 0)])
        .await?;
    daily.replace_range(range(2, 2), &[row(2, "in_time", 2)]).await?;

    let rows = daily.list(range(1, 3)).await?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], row(2, "in_time", 2));
    assert_eq!(rows[2].status, "not_sent");
    Ok(())
}

#[tokio::test]
async fn summaries_are_keyed_by_period() -> anyhow::Result<()> {
    let fixture = DbFixture::in_memory().await?;
    let summaries = fixture.store().summaries();
    let mut summary = SummaryRow {
        user_login: "alice".into(),
        period_start: dec(1),
        period_end: dec(10),
        total_prs: 3,
        in_time_days: 1,
        outside_time_days: 1,
        mixed_days: 0,
        not_sent_days: 8,
        active_days: 2,
        average_prs_per_active_day: 1.5,
    };
    summaries.upsert_many(&[summary.clone()]).await?;
    summary.total_prs = 4;
    summary.average_prs_per_active_day = 2.0;
    summaries.upsert_many(&[summary.clone()]).await?;

    assert_eq!(summaries.list(range(1, 10)).await?, vec![summary]);
    assert!(summaries.list(range(1, 11)).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn file_backed_cache_survives_reopen() -> anyhow::Result<()> {
    let fixture = DbFixture::file_backed().await?;
    fixture
        .store()
        .fetch_windows()
        .commit_fetch(&window(1, 5), &[pr(1, "alice", at(2, 10))])
        .await?;

    let url = fixture.database_url().expect("file backed");
    let reopened = SqliteStore::connect(&url).await?;
    assert!(reopened
        .fetch_windows()
        .uncovered_ranges(&scope(), range(1, 5))
        .await?
        .is_empty());
    assert_eq!(all_prs(&reopened).await?.len(), 1);
    Ok(())
}
