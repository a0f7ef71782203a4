/*!
Configuration management for the deprovisioning monitor
*/

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::deprovision::error::{MonitorError, Result};

pub const DEFAULT_API_PATH: &str = "rest-admin";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_GROUP: &str = "/";
pub const DEFAULT_RETENTION_PERIOD: u32 = 365;
pub const DEFAULT_EMAIL_HOST: &str = "localhost";
pub const DEFAULT_EMAIL_PORT: u16 = 25;
pub const DEFAULT_EMAIL_SUBJECT: &str = "Deprovisioned B2ACCESS accounts";
pub const DEFAULT_EMAIL_INTRO_TEXT: &str = "See attachment for details of deprovisioned \
    B2ACCESS accounts.\n\nNote: This is an automated email, please don't reply.";
pub const DEFAULT_LOG_LEVEL: &str = "WARNING";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Identity API connection settings
    pub api: ApiConfig,
    /// Attribute names that are never stripped
    #[serde(default)]
    pub attr_whitelist: HashSet<String>,
    /// Days between a run and the scheduled removal of each account
    #[serde(default = "default_retention_period")]
    pub retention_period: u32,
    /// Report delivery settings
    pub notifications: NotificationsConfig,
    /// Evaluate everything but skip every external mutation
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub base_url: Url,
    #[serde(default = "default_api_path")]
    pub path: String,
    #[serde(default = "default_api_version")]
    pub version: String,
    pub user: String,
    pub password: String,
    /// Verify the server's TLS certificate
    #[serde(default = "default_true")]
    pub cert_verify: bool,
    /// Group whose members are inspected on every run
    #[serde(default = "default_group")]
    pub group: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationsConfig {
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default = "default_email_host")]
    pub host: String,
    #[serde(default = "default_email_port")]
    pub port: u16,
    /// Upgrade the SMTP session with STARTTLS
    #[serde(default)]
    pub use_tls: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
    /// One address or a list of addresses
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default = "default_email_subject")]
    pub subject: String,
    #[serde(default = "default_email_intro_text")]
    pub intro_text: String,
}

fn default_true() -> bool {
    true
}

fn default_api_path() -> String {
    DEFAULT_API_PATH.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_retention_period() -> u32 {
    DEFAULT_RETENTION_PERIOD
}

fn default_email_host() -> String {
    DEFAULT_EMAIL_HOST.to_string()
}

fn default_email_port() -> u16 {
    DEFAULT_EMAIL_PORT
}

fn default_email_subject() -> String {
    DEFAULT_EMAIL_SUBJECT.to_string()
}

fn default_email_intro_text() -> String {
    DEFAULT_EMAIL_INTRO_TEXT.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(address) => vec![address],
        OneOrMany::Many(addresses) => addresses,
    })
}

/// Map a conventional level name (`WARNING`, `debug`, ...) to a tracing filter.
pub fn parse_log_level(name: &str) -> Result<LevelFilter> {
    let level = match name.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "FATAL" | "ERROR" => LevelFilter::ERROR,
        "WARNING" | "WARN" | "NOTSET" => LevelFilter::WARN,
        "INFO" => LevelFilter::INFO,
        "DEBUG" => LevelFilter::DEBUG,
        "TRACE" => LevelFilter::TRACE,
        "OFF" => LevelFilter::OFF,
        _ => {
            return Err(MonitorError::ConfigValue {
                key: "log_level",
                reason: format!("unknown level `{name}`"),
            });
        }
    };
    Ok(level)
}

impl MonitorConfig {
    /// Read and validate a TOML configuration file
    pub async fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| MonitorError::ConfigRead { path: path.to_path_buf(), source })?;
        let config: MonitorConfig = toml::from_str(&content)
            .map_err(|source| MonitorError::ConfigParse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        parse_log_level(&self.log_level)?;
        if self.notifications.email.to.is_empty() {
            return Err(MonitorError::ConfigValue {
                key: "notifications.email.to",
                reason: "at least one recipient is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn log_filter(&self) -> Result<LevelFilter> {
        parse_log_level(&self.log_level)
    }
}
