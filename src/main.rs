use std::sync::Arc;

use clap::{Parser, Subcommand};
use psmdb_k8s::controller::{self, ControllerState, Defaulter, Defaults, ServerPlatform};
use psmdb_k8s::crd::Platform;
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Only watch clusters in this namespace (default: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Force the platform variant instead of detecting it (kubernetes, openshift)
    #[arg(long, env = "PLATFORM")]
    platform: Option<Platform>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("PSMDB-K8s Operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_operator(args: RunArgs) -> anyhow::Result<()> {
    init_tracing(args.log_json);

    info!(
        "Starting PSMDB-K8s Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let detected = match args.platform {
        Some(platform) => platform,
        None => controller::detect_platform(&client).await.unwrap_or_else(|e| {
            warn!("Platform detection failed, assuming kubernetes: {}", e);
            Platform::Kubernetes
        }),
    };
    info!("Running on platform: {}", detected);

    let state = Arc::new(ControllerState {
        client,
        defaulter: Defaulter::new(Defaults::default(), ServerPlatform { detected }),
    });

    controller::run_controller(state, args.namespace).await?;
    Ok(())
}
