//! # Command Line Interface
//!
//! `certmap-rotator [--config FILE] [-v] [rotate|plan|serve]`. Without a subcommand a
//! single rotation runs, which is what a cron job or a Cloud Run job wants.

use crate::clients::{
    build_http_client, AccessTokenProvider, CloudSchedulerClient, CloudflareDnsProvider,
    GcpCertificateManager, MetadataServerToken, StaticToken,
};
use crate::config::Settings;
use crate::observability::{describe_metrics, init_logging, log_settings_info};
use crate::rotation::Rotator;
use crate::server::{serve, TriggerState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "certmap-rotator")]
#[command(about = "Rotate managed certificates behind a Certificate Manager map")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path (any format the config crate reads); environment
    /// variables prefixed with ROTATOR_ override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one rotation (default)
    Rotate,

    /// Show what a rotation would change, without changing anything
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the HTTP trigger
    Serve {
        /// Address to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings.observability, cli.verbose)?;
    describe_metrics();
    log_settings_info(&settings);

    let trigger = build_trigger(&settings)?;

    match cli.command.unwrap_or(Commands::Rotate) {
        Commands::Rotate => {
            let outcome = trigger.invoke().await;
            println!("{}", outcome.message);
            if outcome.aborted {
                process::exit(1);
            }
        }

        Commands::Plan { json } => {
            let plan = trigger.rotator().plan().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print!("{}", plan);
            }
        }

        Commands::Serve { host, port } => {
            let mut server = settings.server.clone();
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            serve(&server.bind_address(), trigger, shutdown_signal()).await?;
        }
    }

    Ok(())
}

/// Wire the REST clients described by `settings` into a trigger.
pub fn build_trigger(settings: &Settings) -> anyhow::Result<TriggerState> {
    let config = settings.rotation_config()?;

    let gcp_http = build_http_client(Duration::from_secs(settings.gcp.request_timeout_seconds))?;
    let tokens: Arc<dyn AccessTokenProvider> = match &settings.gcp.access_token {
        Some(token) if !token.is_empty() => Arc::new(StaticToken::new(token.clone())),
        _ => Arc::new(MetadataServerToken::new(gcp_http.clone(), &settings.gcp.metadata_url)),
    };

    let certificates = Arc::new(GcpCertificateManager::new(
        gcp_http.clone(),
        &settings.gcp.certificate_manager_url,
        config.paths.clone(),
        tokens.clone(),
    ));

    let cloudflare_http =
        build_http_client(Duration::from_secs(settings.cloudflare.request_timeout_seconds))?;
    let dns = Arc::new(CloudflareDnsProvider::new(
        cloudflare_http,
        &settings.cloudflare.api_url,
        settings.cloudflare.api_token.clone(),
    ));

    let rotator = Arc::new(Rotator::new(config, certificates, dns));
    let mut trigger = TriggerState::new(rotator);

    if settings.scheduler.pause_on_success {
        if let (Some(job_id), Some(region)) = (&settings.scheduler.job_id, &settings.gcp.region) {
            trigger = trigger.with_scheduler(Arc::new(CloudSchedulerClient::new(
                gcp_http,
                &settings.gcp.scheduler_url,
                &settings.gcp.project_id,
                region,
                job_id,
                tokens,
            )));
        }
    }

    Ok(trigger)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
