use clap::Parser;
use simfarm_slave::{CommandRunner, EchoRunner, JobRunner, Slave, SlaveConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sf-slave")]
#[command(about = "Simulation farm slave", long_about = None)]
struct Args {
    /// Manager address
    #[arg(short, long)]
    manager: Option<String>,

    /// Slave name (auto-generated if not provided)
    #[arg(long)]
    name: Option<String>,

    /// Directory for job scratch space
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Command to run in each job directory (echo the inputs back if omitted)
    #[arg(last = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        SlaveConfig::from_file(config_path)?
    } else {
        SlaveConfig::default()
    };

    // Override with CLI args
    if let Some(manager) = args.manager {
        config.manager_address = manager;
    }
    if let Some(name) = args.name {
        config.slave_name = Some(name);
    }
    if let Some(work_dir) = args.work_dir {
        config.work_dir = Some(work_dir);
    }
    if !args.command.is_empty() {
        config.command = args.command;
    }

    let runner: Arc<dyn JobRunner> = if config.command.is_empty() {
        tracing::warn!("No command configured, jobs will be echoed back");
        Arc::new(EchoRunner)
    } else {
        Arc::new(CommandRunner::new(config.command.clone())?)
    };

    let slave = Slave::new(&config, runner);
    tracing::info!("Starting slave {}", slave.name());

    // Handle shutdown signals
    let shutdown = slave.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown.cancel();
    });

    slave.connect(&config.manager_address).await?;

    Ok(())
}
