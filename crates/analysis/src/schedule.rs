use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use common::config::{DayStatusPolicy, EndBoundary, ProjectConfig};
use common::{AppError, DateRange, Result};

/// Local working-hours window of the project, resolved against the tz database.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkSchedule {
    pub tz: Tz,
    pub start_hour: u32,
    pub end_hour: u32,
    pub end_boundary: EndBoundary,
    pub day_status: DayStatusPolicy,
}

impl WorkSchedule {
    pub fn new(tz: Tz, start_hour: u32, end_hour: u32) -> Result<Self> {
        for (name, hour) in [("work_start_hour", start_hour), ("work_end_hour", end_hour)] {
            if hour > 23 {
                return Err(AppError::config(format!(
                    "{name} must be between 0 and 23, got {hour}"
                )));
            }
        }
        Ok(Self {
            tz,
            start_hour,
            end_hour,
            end_boundary: EndBoundary::default(),
            day_status: DayStatusPolicy::default(),
        })
    }

    pub fn from_config(project: &ProjectConfig) -> Result<Self> {
        let tz: Tz = project.timezone.trim().parse().map_err(|_| {
            AppError::config(format!("unknown timezone {:?}", project.timezone))
        })?;
        Ok(Self {
            end_boundary: project.end_boundary,
            day_status: project.day_status,
            ..Self::new(tz, project.work_start_hour, project.work_end_hour)?
        })
    }

    pub fn with_end_boundary(mut self, boundary: EndBoundary) -> Self {
        self.end_boundary = boundary;
        self
    }

    pub fn with_day_status(mut self, policy: DayStatusPolicy) -> Self {
        self.day_status = policy;
        self
    }

    /// Equal start and end hours describe an empty window. A start after the
    /// end wraps past midnight.
    pub fn contains_hour(&self, hour: u32) -> bool {
        let inclusive = self.end_boundary == EndBoundary::Inclusive;
        let before_end = |h: u32| h < self.end_hour || (inclusive && h == self.end_hour);
        if self.start_hour == self.end_hour {
            false
        } else if self.start_hour < self.end_hour {
            hour >= self.start_hour && before_end(hour)
        } else {
            hour >= self.start_hour || before_end(hour)
        }
    }

    pub fn to_local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    pub fn local_today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.to_local(now).date_naive()
    }

    /// UTC instants `[first local midnight, midnight after the last day)` of `range`.
    pub fn utc_span(&self, range: DateRange) -> (DateTime<Utc>, DateTime<Utc>) {
        let after_end = range
            .end()
            .checked_add_days(Days::new(1))
            .unwrap_or(range.end());
        (self.local_midnight(range.start()), self.local_midnight(after_end))
    }

    fn local_midnight(&self, day: NaiveDate) -> DateTime<Utc> {
        // Zones that skip midnight on a DST change start the day at the first valid hour.
        (0..24)
            .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
            .find_map(|time| self.tz.from_local_datetime(&day.and_time(time)).earliest())
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| day.and_time(NaiveTime::MIN).and_utc())
    }

    pub fn local_hour(&self, instant: DateTime<Utc>) -> u32 {
        self.to_local(instant).hour()
    }
}
