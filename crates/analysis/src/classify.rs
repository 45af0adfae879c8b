use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use db::PullRequestRow;
use serde::Serialize;

use crate::schedule::WorkSchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    InTime,
    OutsideTime,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::InTime => "in_time",
            Bucket::OutsideTime => "outside_time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub local_date: NaiveDate,
    pub local_time: NaiveDateTime,
    pub bucket: Bucket,
}

/// Converts `created_at` into the schedule's zone and buckets it by local hour.
pub fn classify(created_at: DateTime<Utc>, schedule: &WorkSchedule) -> Classification {
    let local = schedule.to_local(created_at);
    let bucket = if schedule.contains_hour(schedule.local_hour(created_at)) {
        Bucket::InTime
    } else {
        Bucket::OutsideTime
    };
    Classification {
        local_date: local.date_naive(),
        local_time: local.naive_local(),
        bucket,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedPr {
    pub pr: PullRequestRow,
    pub classification: Classification,
}

pub fn classify_pull_request(pr: PullRequestRow, schedule: &WorkSchedule) -> ClassifiedPr {
    let classification = classify(pr.created_at_utc, schedule);
    ClassifiedPr { pr, classification }
}
