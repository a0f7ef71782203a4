/*!
Scheduled account deprovisioning monitor.

Strips the attributes of disabled accounts, schedules their removal after a
retention period and emails a report of the affected accounts.
*/

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use deprovision::config::{parse_log_level, MonitorConfig};
use deprovision::error::Result;
use deprovision::identity::UnityApiClient;
use deprovision::notifier::MailNotifier;

mod deprovision;

fn cli() -> Command {
    Command::new("deprovisioning-monitor")
        .version(clap::crate_version!())
        .about("Deprovisions disabled identity accounts and reports them by email")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .env("DEPROVISIONING_CONFIG")
                .help("Path to the TOML configuration file")
                .value_name("PATH")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Evaluate and log everything without changing accounts or sending email")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Override the configured log level")
                .value_name("LEVEL"),
        )
}

/// Load the configuration file and apply command line overrides
async fn load_config(matches: &ArgMatches) -> Result<MonitorConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let mut config = MonitorConfig::load(&config_path).await?;
    if matches.get_flag("dry-run") {
        config.dry_run = true;
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        parse_log_level(level)?;
        config.log_level = level.clone();
    }
    Ok(config)
}

fn init_logging(config: &MonitorConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.log_filter()?.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn deprovision(config: &MonitorConfig) -> Result<()> {
    let api = UnityApiClient::new(&config.api)?;
    let notifier = MailNotifier::new(&config.notifications.email)?;

    info!("🚀 Starting deprovisioning run for group '{}'", config.api.group);
    deprovision::monitor::run(config, &api, &notifier).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let config = match load_config(&matches).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("Logging setup failed: {}", e);
        return ExitCode::FAILURE;
    }

    match deprovision(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Deprovisioning run aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn cli_flags_parse() {
        let matches = cli()
            .try_get_matches_from([
                "deprovisioning-monitor",
                "-c",
                "/etc/deprov.toml",
                "--dry-run",
                "--log-level",
                "debug",
            ])
            .unwrap();

        assert_eq!(matches.get_one::<String>("config").unwrap(), "/etc/deprov.toml");
        assert!(matches.get_flag("dry-run"));
        assert_eq!(matches.get_one::<String>("log-level").unwrap(), "debug");
    }
}
