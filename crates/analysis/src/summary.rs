use std::collections::BTreeMap;

use common::DateRange;
use db::SummaryRow;
use serde::Serialize;

use crate::daily::{DailyActivity, DayStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub user_login: String,
    pub period: DateRange,
    pub total_prs: u32,
    pub in_time_days: u32,
    pub outside_time_days: u32,
    pub mixed_days: u32,
    pub not_sent_days: u32,
    pub active_days: u32,
    pub average_prs_per_active_day: f64,
}

impl PeriodSummary {
    pub fn to_row(&self) -> SummaryRow {
        SummaryRow {
            user_login: self.user_login.clone(),
            period_start: self.period.start(),
            period_end: self.period.end(),
            total_prs: i64::from(self.total_prs),
            in_time_days: i64::from(self.in_time_days),
            outside_time_days: i64::from(self.outside_time_days),
            mixed_days: i64::from(self.mixed_days),
            not_sent_days: i64::from(self.not_sent_days),
            active_days: i64::from(self.active_days),
            average_prs_per_active_day: self.average_prs_per_active_day,
        }
    }
}

/// Reduces one user's daily rows. The average is zero when no day had activity.
pub fn summarize(user_login: &str, period: DateRange, rows: &[DailyActivity]) -> PeriodSummary {
    let mut summary = PeriodSummary {
        user_login: user_login.to_string(),
        period,
        total_prs: 0,
        in_time_days: 0,
        outside_time_days: 0,
        mixed_days: 0,
        not_sent_days: 0,
        active_days: 0,
        average_prs_per_active_day: 0.0,
    };

    for row in rows.iter().filter(|row| period.contains(row.local_date)) {
        summary.total_prs += row.total();
        match row.status {
            DayStatus::InTime => summary.in_time_days += 1,
            DayStatus::OutsideTime => summary.outside_time_days += 1,
            DayStatus::Mixed => summary.mixed_days += 1,
            DayStatus::NotSent => summary.not_sent_days += 1,
        }
        if row.total() > 0 {
            summary.active_days += 1;
        }
    }

    if summary.active_days > 0 {
        summary.average_prs_per_active_day =
            f64::from(summary.total_prs) / f64::from(summary.active_days);
    }
    summary
}

/// One summary per login present in `rows`, ordered by login.
pub fn summarize_all(period: DateRange, rows: &[DailyActivity]) -> Vec<PeriodSummary> {
    let mut by_user: BTreeMap<&str, Vec<DailyActivity>> = BTreeMap::new();
    for row in rows {
        by_user
            .entry(row.user_login.as_str())
            .or_default()
            .push(row.clone());
    }
    by_user
        .into_iter()
        .map(|(login, user_rows)| summarize(login, period, &user_rows))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn row(login: &str, d: u32, in_time: u32, outside: u32, status: DayStatus) -> DailyActivity {
        DailyActivity {
            user_login: login.into(),
            local_date: day(d),
            in_time_count: in_time,
            outside_time_count: outside,
            status,
        }
    }

    #[test]
    fn no_activity_averages_to_zero() {
        let period = DateRange::new(day(1), day(10)).unwrap();
        let rows: Vec<_> = (1..=10).map(|d| row("amy", d, 0, 0, DayStatus::NotSent)).collect();
        let summary = summarize("amy", period, &rows);
        assert_eq!(summary.average_prs_per_active_day, 0.0);
        assert_eq!(summary.not_sent_days, 10);
        assert_eq!(summary.active_days, 0);
    }

    #[test]
    fn counts_days_per_status() {
        let period = DateRange::new(day(1), day(4)).unwrap();
        let rows = vec![
            row("amy", 1, 2, 0, DayStatus::InTime),
            row("amy", 2, 0, 1, DayStatus::OutsideTime),
            row("amy", 3, 1, 2, DayStatus::Mixed),
            row("amy", 4, 0, 0, DayStatus::NotSent),
        ];
        let summary = summarize("amy", period, &rows);
        assert_eq!(summary.total_prs, 6);
        assert_eq!(
            (summary.in_time_days, summary.outside_time_days, summary.mixed_days, summary.not_sent_days),
            (1, 1, 1, 1)
        );
        assert_eq!(summary.active_days, 3);
        assert_eq!(summary.average_prs_per_active_day, 2.0);
    }

    #[test]
    fn summaries_are_sorted_by_login() {
        let period = DateRange::single(day(1));
        let rows = vec![
            row("zed", 1, 1, 0, DayStatus::InTime),
            row("amy", 1, 0, 0, DayStatus::NotSent),
            row("mia", 1, 0, 1, DayStatus::OutsideTime),
        ];
        let logins: Vec<_> = summarize_all(period, &rows)
            .into_iter()
            .map(|s| s.user_login)
            .collect();
        assert_eq!(logins, vec!["amy", "mia", "zed"]);
    }
}
