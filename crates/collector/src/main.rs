use std::error::Error as _;
use std::path::PathBuf;
use std::sync::Arc;

use analysis::WorkSchedule;
use chrono::{Days, NaiveDate, Utc};
use clap::Parser;
use collector::{render_console_summary, BrokerGithubClient, JsonReportWriter, Monitor, ReportWriter};
use common::{config::AppConfig, logging, AppError, DateRange, Result};
use db::{Repositories, SqliteStore};
use gh_broker::{GithubBrokerBuilder, RetryPolicy};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pr-monitor")]
#[command(about = "Pull request working-hours report for a GitHub team", long_about = None)]
struct Args {
    /// First day of the period (default: today minus 7 days, project timezone)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last day of the period (default: today, project timezone)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Report file prefix (overrides report.output_prefix)
    #[arg(long)]
    output_prefix: Option<String>,

    /// Report directory (overrides report.output_dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    /// Ignore recorded fetch windows and fetch the whole period again
    #[arg(long)]
    refresh: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init_logging(if args.verbose { "debug" } else { "info" });

    if let Err(err) = run(args).await {
        error!(kind = err.kind(), error = %err, "pr-monitor failed");
        let mut source = err.source();
        while let Some(cause) = source {
            error!(cause = %cause, "caused by");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load()?;
    config.validate()?;
    let schedule = WorkSchedule::from_config(&config.project)?;
    let range = resolve_range(&args, schedule.local_today(Utc::now()))?;

    let repositories: Arc<dyn Repositories> = Arc::new(SqliteStore::connect(&config.database.url).await?);

    let broker = GithubBrokerBuilder::new(config.github.token.clone())
        .retry_policy(RetryPolicy::from(&config.fetch))
        .build()?;
    let client = Arc::new(BrokerGithubClient::new(
        broker,
        &config.github.api_base,
        config.github.user_agent.clone(),
        config.fetch.page_size,
    )?);

    info!(
        org = %config.project.organization,
        team = %config.project.team,
        %range,
        refresh = args.refresh,
        "pr-monitor started"
    );
    let monitor = Monitor::new(config.project.clone(), client, repositories)?.with_refresh(args.refresh);
    let report = monitor.run(range).await?;

    let writer = JsonReportWriter::new(
        args.output_dir
            .unwrap_or_else(|| PathBuf::from(&config.report.output_dir)),
        args.output_prefix
            .unwrap_or_else(|| config.report.output_prefix.clone()),
    );
    writer.write(&report).await?;
    println!("{}", render_console_summary(&report));
    Ok(())
}

fn resolve_range(args: &Args, today: NaiveDate) -> Result<DateRange> {
    let end = args.end_date.unwrap_or(today);
    let start = match args.start_date {
        Some(start) => start,
        None => today
            .checked_sub_days(Days::new(7))
            .ok_or_else(|| AppError::config("cannot compute default start date"))?,
    };
    DateRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    #[test]
    fn default_period_is_last_week() {
        let args = Args::parse_from(["pr-monitor"]);
        let range = resolve_range(&args, day(15)).unwrap();
        assert_eq!(range, DateRange::new(day(8), day(15)).unwrap());
    }

    #[test]
    fn explicit_dates_are_parsed() {
        let args = Args::parse_from([
            "pr-monitor",
            "--start-date",
            "2025-12-01",
            "--end-date",
            "2025-12-05",
            "--refresh",
        ]);
        assert!(args.refresh);
        let range = resolve_range(&args, day(20)).unwrap();
        assert_eq!(range, DateRange::new(day(1), day(5)).unwrap());
    }

    #[test]
    fn inverted_period_is_a_config_error() {
        let args = Args::parse_from(["pr-monitor", "--start-date", "2025-12-09", "--end-date", "2025-12-02"]);
        assert_eq!(resolve_range(&args, day(20)).unwrap_err().kind(), "config");
    }
}
