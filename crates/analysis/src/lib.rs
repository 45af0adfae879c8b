pub mod classify;
pub mod daily;
pub mod filter;
pub mod schedule;
pub mod summary;

pub use classify::{classify, classify_pull_request, Bucket, Classification, ClassifiedPr};
pub use daily::{fold_into_daily_activity, DailyActivity, DayStatus};
pub use filter::ExclusionFilter;
pub use schedule::WorkSchedule;
pub use summary::{summarize, summarize_all, PeriodSummary};
