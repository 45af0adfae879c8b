use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use common::config::DayStatusPolicy;
use common::DateRange;
use db::{DailyActivityRow, UserRow};
use serde::Serialize;
use tracing::debug;

use crate::classify::{Bucket, ClassifiedPr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    InTime,
    OutsideTime,
    Mixed,
    NotSent,
}

impl DayStatus {
    /// `NotSent` exactly when both counts are zero.
    pub fn from_counts(in_time: u32, outside_time: u32, policy: DayStatusPolicy) -> Self {
        match (in_time > 0, outside_time > 0, policy) {
            (false, false, _) => DayStatus::NotSent,
            (true, true, DayStatusPolicy::Mixed) => DayStatus::Mixed,
            (true, _, _) => DayStatus::InTime,
            (false, true, _) => DayStatus::OutsideTime,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayStatus::InTime => "in_time",
            DayStatus::OutsideTime => "outside_time",
            DayStatus::Mixed => "mixed",
            DayStatus::NotSent => "not_sent",
        }
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_time" => Ok(DayStatus::InTime),
            "outside_time" => Ok(DayStatus::OutsideTime),
            "mixed" => Ok(DayStatus::Mixed),
            "not_sent" => Ok(DayStatus::NotSent),
            other => Err(format!("unknown day status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    pub user_login: String,
    pub local_date: NaiveDate,
    pub in_time_count: u32,
    pub outside_time_count: u32,
    pub status: DayStatus,
}

impl DailyActivity {
    pub fn total(&self) -> u32 {
        self.in_time_count + self.outside_time_count
    }

    pub fn to_row(&self) -> DailyActivityRow {
        DailyActivityRow {
            user_login: self.user_login.clone(),
            local_date: self.local_date,
            in_time_count: i64::from(self.in_time_count),
            outside_time_count: i64::from(self.outside_time_count),
            status: self.status.as_str().to_string(),
        }
    }
}

/// One row per included user and calendar day of `range`, ordered by login
/// then date. Excluded users and pull requests dated outside `range` are
/// dropped.
pub fn fold_into_daily_activity(
    classified: &[ClassifiedPr],
    users: &[UserRow],
    range: DateRange,
    policy: DayStatusPolicy,
) -> Vec<DailyActivity> {
    let included: HashSet<&str> = users
        .iter()
        .filter(|user| !user.excluded)
        .map(|user| user.login.as_str())
        .collect();

    let mut counts: BTreeMap<(&str, NaiveDate), (u32, u32)> = BTreeMap::new();
    for login in included.iter().copied() {
        for day in range.days() {
            counts.insert((login, day), (0, 0));
        }
    }

    let mut skipped = 0usize;
    for item in classified {
        let key = (item.pr.author_login.as_str(), item.classification.local_date);
        match counts.get_mut(&key) {
            Some((in_time, outside)) => match item.classification.bucket {
                Bucket::InTime => *in_time += 1,
                Bucket::OutsideTime => *outside += 1,
            },
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, %range, "pull requests outside tracked users or dates");
    }

    counts
        .into_iter()
        .map(|((login, local_date), (in_time, outside))| DailyActivity {
            user_login: login.to_string(),
            local_date,
            in_time_count: in_time,
            outside_time_count: outside,
            status: DayStatus::from_counts(in_time, outside, policy),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_pull_request;
    use crate::schedule::WorkSchedule;
    use chrono::{TimeZone, Utc};
    use db::PullRequestRow;

    fn user(login: &str, excluded: bool) -> UserRow {
        UserRow {
            login: login.into(),
            display_name: None,
            email: None,
            excluded,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn classified(id: i64, author: &str, d: u32, hour: u32) -> ClassifiedPr {
        let schedule = WorkSchedule::new(chrono_tz::UTC, 9, 18).unwrap();
        classify_pull_request(
            PullRequestRow {
                id,
                author_login: author.into(),
                repository: "acme/widgets".into(),
                number: id,
                title: "t".into(),
                url: "u".into(),
                state: "open".into(),
                created_at_utc: Utc.with_ymd_and_hms(2025, 12, d, hour, 0, 0).unwrap(),
            },
            &schedule,
        )
    }

    #[test]
    fn idle_user_gets_a_row_per_day() {
        let range = DateRange::new(day(1), day(5)).unwrap();
        let rows = fold_into_daily_activity(&[], &[user("alice", false)], range, DayStatusPolicy::Mixed);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.status == DayStatus::NotSent && r.total() == 0));
        assert_eq!(rows[0].local_date, day(1));
        assert_eq!(rows[4].local_date, day(5));
    }

    #[test]
    fn statuses_follow_bucket_counts() {
        let range = DateRange::new(day(1), day(3)).unwrap();
        let prs = vec![
            classified(1, "bob", 1, 10),
            classified(2, "bob", 2, 20),
            classified(3, "bob", 3, 10),
            classified(4, "bob", 3, 22),
        ];
        let rows = fold_into_daily_activity(&prs, &[user("bob", false)], range, DayStatusPolicy::Mixed);
        let statuses: Vec<_> = rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![DayStatus::InTime, DayStatus::OutsideTime, DayStatus::Mixed]
        );
        assert_eq!((rows[2].in_time_count, rows[2].outside_time_count), (1, 1));

        let rows = fold_into_daily_activity(&prs, &[user("bob", false)], range, DayStatusPolicy::InTimeWins);
        assert_eq!(rows[2].status, DayStatus::InTime);
    }

    #[test]
    fn excluded_users_never_appear() {
        let range = DateRange::new(day(1), day(2)).unwrap();
        let prs = vec![classified(1, "bot", 1, 10), classified(2, "alice", 2, 10)];
        let rows = fold_into_daily_activity(
            &prs,
            &[user("bot", true), user("alice", false)],
            range,
            DayStatusPolicy::Mixed,
        );
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.user_login == "alice"));
    }

    #[test]
    fn rows_are_ordered_by_login_then_date() {
        let range = DateRange::new(day(1), day(2)).unwrap();
        let rows = fold_into_daily_activity(
            &[],
            &[user("zed", false), user("amy", false)],
            range,
            DayStatusPolicy::Mixed,
        );
        let keys: Vec<_> = rows.iter().map(|r| (r.user_login.as_str(), r.local_date)).collect();
        assert_eq!(
            keys,
            vec![("amy", day(1)), ("amy", day(2)), ("zed", day(1)), ("zed", day(2))]
        );
    }

    #[test]
    fn status_round_trips_through_storage_text() {
        let row = DailyActivity {
            user_login: "amy".into(),
            local_date: day(1),
            in_time_count: 2,
            outside_time_count: 0,
            status: DayStatus::InTime,
        }
        .to_row();
        assert_eq!(row.status.parse::<DayStatus>().unwrap(), DayStatus::InTime);
    }
}
