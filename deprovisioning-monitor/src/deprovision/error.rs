/*!
Error types shared by every stage of a deprovisioning run
*/

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a run. Nothing is recovered locally.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to read configuration file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration value for `{key}`: {reason}")]
    ConfigValue { key: &'static str, reason: String },

    #[error("identity API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("failed to render report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("invalid mail address: {0}")]
    MailAddress(#[from] lettre::address::AddressError),

    #[error("invalid attachment content type: {0}")]
    MailContentType(#[from] lettre::message::header::ContentTypeErr),

    #[error("failed to build notification email: {0}")]
    MailMessage(#[from] lettre::error::Error),

    #[error("failed to send notification email: {0}")]
    MailTransport(#[from] lettre::transport::smtp::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
