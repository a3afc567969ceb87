//! # Command Line Interface
//!
//! Flag parsing, environment fallbacks for the destination API tokens, and
//! assembly of the rotation engine for continuous or one-shot operation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::destinations::{
    CircleCiDestination, Destination, SpaceliftDestination, TfCloudDestination,
};
use crate::observability::{self, AdminState, Metrics};
use crate::rotation::{BindingRoute, Dispatcher, Scheduler};
use crate::vault::SessionConfig;

#[derive(Parser)]
#[command(name = "vaultflow")]
#[command(about = "Rotates short-lived Vault tokens into CI/CD platforms")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "vaultflow.yaml")]
    pub config: String,

    /// File containing the Vault session token. Takes precedence over VAULT_TOKEN.
    #[arg(long, env = "VAULT_TOKEN_FILE")]
    pub vault_token_file: Option<PathBuf>,

    /// CircleCI personal API token
    #[arg(long, env = "CIRCLE_CI_TOKEN", hide_env_values = true)]
    pub circle_token: Option<String>,

    /// Terraform Cloud API token
    #[arg(long, env = "TFCLOUD_TOKEN", hide_env_values = true)]
    pub tfcloud_token: Option<String>,

    /// Spacelift API key ID
    #[arg(long, env = "SPACELIFT_API_KEY_ID")]
    pub spacelift_key_id: Option<String>,

    /// Spacelift API key secret
    #[arg(long, env = "SPACELIFT_API_KEY_SECRET", hide_env_values = true)]
    pub spacelift_key_secret: Option<String>,

    /// Spacelift tenant GraphQL endpoint
    #[arg(long, env = "SPACELIFT_URL")]
    pub spacelift_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rotate continuously at the configured interval (default)
    Run,

    /// Perform exactly one rotation cycle and exit nonzero on any error
    Once,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    observability::init_logging(default_level, cli.json_logs)?;

    let config = AppConfig::from_file(&cli.config)?;
    info!(
        config_file = %cli.config,
        vault_address = %config.vault_address,
        token_variable = %config.token_variable,
        token_ttl_minutes = config.token_ttl_minutes,
        refresh_interval_minutes = config.refresh_interval_minutes,
        orphan_tokens = config.orphan_tokens,
        bindings = config.binding_count(),
        "loaded configuration"
    );

    let routes = build_routes(&config, &cli)?;
    let metrics = Arc::new(Metrics::new());
    let dispatcher = Dispatcher::new(routes, Arc::clone(&metrics), &config);
    let session = SessionConfig {
        address: config.vault_address.clone(),
        token_file: cli.vault_token_file.clone(),
        request_timeout: config.request_timeout(),
    };
    let scheduler = Scheduler::new(dispatcher, session, Arc::clone(&metrics), &config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Once => {
            scheduler.run_once().await?;
            Ok(())
        }
        Commands::Run => {
            let shutdown = CancellationToken::new();

            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                info!("received termination signal");
                signal_token.cancel();
            });

            if let Some(addr) = config.metrics_bind_address() {
                let handle = observability::install_prometheus_exporter()?;
                observability::register_metrics();
                let state = AdminState {
                    metrics: Arc::clone(&metrics),
                    prometheus: handle,
                    health_window: config.health_window,
                };
                let admin_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = observability::http::serve(addr, state, admin_shutdown).await {
                        error!(error = %e, "admin endpoints terminated");
                    }
                });
            }

            scheduler.run(shutdown).await;
            Ok(())
        }
    }
}

/// Pair every configured binding with its destination adapter.
///
/// A family with bindings but no API token still gets routed (writes will
/// fail and be counted), but the misconfiguration is called out at startup.
fn build_routes(config: &AppConfig, cli: &Cli) -> anyhow::Result<Vec<BindingRoute>> {
    let timeout = config.request_timeout();
    let mut routes = Vec::with_capacity(config.binding_count());

    if !config.circleci.is_empty() {
        if cli.circle_token.is_none() {
            warn!("CircleCI bindings are configured but no CircleCI token was provided");
        }
        let destination: Arc<dyn Destination> = Arc::new(CircleCiDestination::new(
            cli.circle_token.clone().unwrap_or_default(),
            timeout,
        )?);
        for binding in &config.circleci {
            routes.push(BindingRoute {
                binding: binding.into(),
                destination: Arc::clone(&destination),
            });
        }
    }

    if !config.tfcloud.is_empty() {
        if cli.tfcloud_token.is_none() {
            warn!("Terraform Cloud bindings are configured but no Terraform Cloud token was provided");
        }
        let destination: Arc<dyn Destination> = Arc::new(TfCloudDestination::new(
            cli.tfcloud_token.clone().unwrap_or_default(),
            timeout,
        )?);
        for binding in &config.tfcloud {
            routes.push(BindingRoute {
                binding: binding.into(),
                destination: Arc::clone(&destination),
            });
        }
    }

    if !config.spacelift.is_empty() {
        if cli.spacelift_url.is_none()
            || cli.spacelift_key_id.is_none()
            || cli.spacelift_key_secret.is_none()
        {
            warn!("Spacelift bindings are configured but the API key or endpoint is incomplete");
        }
        let destination: Arc<dyn Destination> = Arc::new(SpaceliftDestination::new(
            cli.spacelift_url.clone().unwrap_or_default(),
            cli.spacelift_key_id.clone().unwrap_or_default(),
            cli.spacelift_key_secret.clone().unwrap_or_default(),
            timeout,
        )?);
        for binding in &config.spacelift {
            routes.push(BindingRoute {
                binding: binding.into(),
                destination: Arc::clone(&destination),
            });
        }
    }

    Ok(routes)
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
