//! Gap computation between a requested date range and recorded fetch windows.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use common::DateRange;

/// A window is complete once its last day had fully elapsed in UTC when it
/// was fetched. Incomplete windows may be missing late pull requests.
pub fn is_complete(end_date: NaiveDate, fetched_at: DateTime<Utc>) -> bool {
    match end_date.checked_add_days(Days::new(1)) {
        Some(next) => fetched_at >= next.and_time(NaiveTime::MIN).and_utc(),
        None => false,
    }
}

/// Days of `range` a window fetched at `fetched_at` can vouch for: the whole
/// range once complete, otherwise only the days that had ended in UTC.
pub fn covered_range(range: DateRange, fetched_at: DateTime<Utc>) -> Option<DateRange> {
    if is_complete(range.end(), fetched_at) {
        return Some(range);
    }
    let last_elapsed = fetched_at.date_naive().pred_opt()?;
    DateRange::new(range.start(), range.end().min(last_elapsed)).ok()
}

/// Sub-ranges of `requested` not covered by the union of `windows`, in date
/// order. Adjacent windows merge, so `[1-5]` and `[6-9]` cover `[1-9]`.
pub fn uncovered(requested: DateRange, windows: impl IntoIterator<Item = DateRange>) -> Vec<DateRange> {
    let mut windows: Vec<DateRange> = windows
        .into_iter()
        .filter(|w| w.end() >= requested.start() && w.start() <= requested.end())
        .collect();
    windows.sort();

    let mut gaps = Vec::new();
    let mut cursor = Some(requested.start());
    for window in windows {
        let Some(from) = cursor else { break };
        if from > requested.end() {
            break;
        }
        if window.end() < from {
            continue;
        }
        if window.start() > from {
            let until = window.start().pred_opt().unwrap_or(window.start());
            push_gap(&mut gaps, from, until.min(requested.end()));
        }
        cursor = window.end().succ_opt();
    }

    if let Some(from) = cursor {
        if from <= requested.end() {
            push_gap(&mut gaps, from, requested.end());
        }
    }
    gaps
}

fn push_gap(gaps: &mut Vec<DateRange>, from: NaiveDate, until: NaiveDate) {
    if let Ok(gap) = DateRange::new(from, until) {
        gaps.push(gap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(start: u32, end: u32) -> DateRange {
        DateRange::new(day(start), day(end)).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    #[test]
    fn reports_hole_between_windows() {
        let gaps = uncovered(dec(1, 11), [dec(1, 5), dec(8, 11)]);
        assert_eq!(gaps, vec![dec(6, 7)]);
    }

    #[test]
    fn nothing_recorded_means_whole_range() {
        assert_eq!(uncovered(dec(3, 9), []), vec![dec(3, 9)]);
    }

    #[test]
    fn fully_covered_range_has_no_gaps() {
        assert!(uncovered(dec(2, 4), [dec(1, 3), dec(4, 10)]).is_empty());
        assert!(uncovered(dec(2, 4), [dec(1, 31)]).is_empty());
    }

    #[test]
    fn overlapping_and_unsorted_windows() {
        let gaps = uncovered(dec(1, 20), [dec(10, 12), dec(3, 6), dec(5, 8), dec(18, 25)]);
        assert_eq!(gaps, vec![dec(1, 2), dec(9, 9), dec(13, 17)]);
    }

    #[test]
    fn windows_outside_request_are_ignored() {
        let gaps = uncovered(dec(10, 12), [dec(1, 5), dec(20, 25)]);
        assert_eq!(gaps, vec![dec(10, 12)]);
    }

    #[test]
    fn window_fetched_before_its_last_day_ended_is_incomplete() {
        let end = day(5);
        let during = end.and_hms_opt(23, 0, 0).unwrap().and_utc();
        let after = day(6).and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert!(!is_complete(end, during));
        assert!(is_complete(end, after));
    }

    #[test]
    fn incomplete_window_still_covers_elapsed_days() {
        let fetched_at = day(10).and_hms_opt(15, 0, 0).unwrap().and_utc();
        assert_eq!(covered_range(dec(3, 10), fetched_at), Some(dec(3, 9)));
        assert_eq!(covered_range(dec(10, 12), fetched_at), None);

        let next_morning = day(11).and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert_eq!(covered_range(dec(3, 10), next_morning), Some(dec(3, 10)));
    }
}
