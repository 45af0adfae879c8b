pub mod client;
pub mod report;
pub mod service;

pub use client::{BrokerGithubClient, GithubClient};
pub use report::{render_console_summary, JsonReportWriter, ReportWriter, RunReport};
pub use service::{Analysis, Monitor, SyncOutcome};
