use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    pub project: ProjectConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(".")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Config::builder()
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/default")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/local")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                Environment::default()
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("project.exclusion_list")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.token.trim().is_empty() {
            return Err(AppError::config("github.token is required"));
        }
        self.project.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "DatabaseConfig::default_url")]
    pub url: String,
}

impl DatabaseConfig {
    fn default_url() -> String {
        "sqlite://pr_monitoring.db".to_string()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct GithubConfig {
    pub token: String,
    #[serde(default = "GithubConfig::default_user_agent")]
    pub user_agent: String,
    #[serde(default = "GithubConfig::default_api_base")]
    pub api_base: String,
}

impl GithubConfig {
    fn default_user_agent() -> String {
        "pr-monitor".to_string()
    }

    fn default_api_base() -> String {
        "https://api.github.com/".to_string()
    }
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndBoundary {
    #[default]
    Exclusive,
    Inclusive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatusPolicy {
    #[default]
    Mixed,
    InTimeWins,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub organization: String,
    pub team: String,
    #[serde(default = "ProjectConfig::default_timezone")]
    pub timezone: String,
    #[serde(default = "ProjectConfig::default_work_start_hour")]
    pub work_start_hour: u32,
    #[serde(default = "ProjectConfig::default_work_end_hour")]
    pub work_end_hour: u32,
    #[serde(default)]
    pub exclusion_list: Vec<String>,
    #[serde(default)]
    pub email_suffix_filter: Option<String>,
    #[serde(default)]
    pub end_boundary: EndBoundary,
    #[serde(default)]
    pub day_status: DayStatusPolicy,
}

impl ProjectConfig {
    fn default_timezone() -> String {
        "UTC".to_string()
    }

    const fn default_work_start_hour() -> u32 {
        9
    }

    const fn default_work_end_hour() -> u32 {
        18
    }

    /// Structural checks only; the zone name is resolved by the classifier.
    pub fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            return Err(AppError::config("project.organization is required"));
        }
        if self.team.trim().is_empty() {
            return Err(AppError::config("project.team is required"));
        }
        if self.timezone.trim().is_empty() {
            return Err(AppError::config("project.timezone is required"));
        }
        for (name, hour) in [
            ("work_start_hour", self.work_start_hour),
            ("work_end_hour", self.work_end_hour),
        ] {
            if hour > 23 {
                return Err(AppError::config(format!(
                    "project.{name} must be between 0 and 23, got {hour}"
                )));
            }
        }
        Ok(())
    }

    pub fn excluded_logins(&self) -> impl Iterator<Item = &str> {
        self.exclusion_list
            .iter()
            .map(|login| login.trim())
            .filter(|login| !login.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "FetchConfig::default_page_size")]
    pub page_size: u32,
    #[serde(default = "FetchConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "FetchConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "FetchConfig::default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "FetchConfig::default_jitter_frac")]
    pub jitter_frac: f32,
    #[serde(default = "FetchConfig::default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
}

impl FetchConfig {
    const fn default_page_size() -> u32 {
        100
    }

    const fn default_max_attempts() -> u32 {
        3
    }

    const fn default_backoff_base_ms() -> u64 {
        500
    }

    const fn default_backoff_max_ms() -> u64 {
        10_000
    }

    const fn default_jitter_frac() -> f32 {
        0.2
    }

    const fn default_max_rate_limit_wait_secs() -> u64 {
        3600
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
            max_attempts: Self::default_max_attempts(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
            jitter_frac: Self::default_jitter_frac(),
            max_rate_limit_wait_secs: Self::default_max_rate_limit_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "ReportConfig::default_output_dir")]
    pub output_dir: String,
    #[serde(default = "ReportConfig::default_output_prefix")]
    pub output_prefix: String,
}

impl ReportConfig {
    fn default_output_dir() -> String {
        ".".to_string()
    }

    fn default_output_prefix() -> String {
        "pr_report".to_string()
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            output_prefix: Self::default_output_prefix(),
        }
    }
}
