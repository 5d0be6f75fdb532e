//! Crane Operator - arbitrates between HPA and VPA for CranePodAutoscalers

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};

use crane_common::crd::CranePodAutoscaler;
use crane_common::telemetry::{init_telemetry, TelemetryConfig};

mod config;
mod controller_runner;

use config::{EnvConfig, OperatorConfig, OsEnvConfig};

/// Crane - one autoscaler per workload, switching between HPA and VPA
#[derive(Parser, Debug)]
#[command(name = "crane-operator", version, about, long_about = None)]
struct Cli {
    /// Print the CranePodAutoscaler CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&CranePodAutoscaler::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let env = OsEnvConfig;
    let config = OperatorConfig::from_env(&env)?;

    init_telemetry(TelemetryConfig::new(
        "crane-operator",
        config.otlp_endpoint.clone(),
        |key| env.var(key),
    ))?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(config).await,
    }
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    tracing::info!(
        resync_secs = config.resync_interval.as_secs(),
        error_requeue_secs = config.error_requeue.as_secs(),
        "Starting Crane controllers:"
    );
    controller_runner::build_autoscaler_controller(client, &config).await;

    tracing::info!("Shutting down");
    Ok(())
}
