// bellsync CLI
//
// Decision: clap derive for argument parsing, every flag also readable from env
// Decision: text/json/yaml output so scripts can consume results
// Decision: one-shot commands talk to the REST client; `watch` runs a full sync session

mod commands;
mod output;

use std::time::Duration;

use anyhow::{Context, Result};
use bellsync_client::NotificationsClient;
use bellsync_core::{init_tracing, SyncConfig, TelemetryConfig};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bellsync")]
#[command(about = "bellsync - Inspect and follow a notification feed")]
#[command(version)]
pub struct Cli {
    /// Base URL of the notification routes
    #[arg(
        long,
        env = "BELLSYNC_API_URL",
        default_value = "http://localhost:8000/notification"
    )]
    pub api_url: String,

    /// CSRF token sent with every request
    #[arg(long, env = "BELLSYNC_CSRF_TOKEN", hide_env_values = true)]
    pub csrf_token: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "BELLSYNC_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Notifications(commands::notifications::NotificationsCommand),

    /// Follow the feed live (initial load, polling and push)
    Watch {
        /// Push channel, e.g. private-App.Model.Users.42
        #[arg(long, env = "BELLSYNC_CHANNEL")]
        channel: Option<String>,

        /// Poll interval in seconds; 0 disables polling
        #[arg(long)]
        interval: Option<u64>,

        /// Disable polling
        #[arg(long)]
        no_poll: bool,
    },
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    fn sync_config(&self) -> Result<SyncConfig> {
        let mut config = SyncConfig::from_env()
            .context("Invalid BELLSYNC_* environment")?
            .with_api_url(&self.api_url);
        if let Some(token) = &self.csrf_token {
            config = config.with_csrf_token(token);
        }
        if let Some(token) = &self.auth_token {
            config = config.with_auth_token(token);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if cli.quiet && telemetry.log_filter.is_none() {
        telemetry = telemetry.with_log_filter("bellsync=warn");
    }
    init_tracing(telemetry);

    let output_format = output::OutputFormat::parse(&cli.output);
    let mut config = cli.sync_config()?;

    match cli.command {
        Commands::Notifications(command) => {
            config.validate().context("Invalid configuration")?;
            let client =
                NotificationsClient::from_config(&config).context("Failed to build HTTP client")?;
            commands::notifications::run(command, &client, config.per_page, output_format, cli.quiet)
                .await
        }
        Commands::Watch {
            channel,
            interval,
            no_poll,
        } => {
            if let Some(channel) = channel {
                config = config.with_channel(channel);
            }
            if let Some(secs) = interval {
                config.poll = config.poll.with_interval(Duration::from_secs(secs));
            }
            if no_poll {
                config = config.with_polling(false);
            }
            commands::watch::run(config, output_format, cli.quiet).await
        }
    }
}
