use axum::Router;
use clap::Parser;
use simfarm_manager::{DispatchOrder, Manager, ManagerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sf-manager")]
#[command(about = "Simulation farm manager", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "manager.yaml")]
    config: String,

    /// Address to accept workers on
    #[arg(long)]
    host: Option<String>,

    /// Port to accept workers on
    #[arg(long)]
    port: Option<u16>,

    /// Which end of the dispatch queue to serve first
    #[arg(long, value_enum)]
    order: Option<DispatchOrder>,

    /// Keepalive interval in milliseconds
    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// REST API port
    #[arg(long)]
    rest_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_missing = !std::path::Path::new(&args.config).exists();
    let mut config = if config_missing {
        ManagerConfig::default()
    } else {
        ManagerConfig::from_file(&args.config)?
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if config_missing {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }

    // Override with CLI args
    if let Some(host) = args.host {
        config.manager.host = host;
    }
    if let Some(port) = args.port {
        config.manager.port = port;
    }
    if let Some(order) = args.order {
        config.dispatch.order = order;
    }
    if let Some(heartbeat_ms) = args.heartbeat_ms {
        config.dispatch.heartbeat_interval_ms = heartbeat_ms;
    }
    if let Some(rest_port) = args.rest_port {
        config.api.rest_port = rest_port;
    }

    tracing::info!("Starting manager with config: {:?}", config);

    let manager = Arc::new(Manager::new(config.clone())?);

    if config.api.enabled {
        let api_manager = manager.clone();
        let rest_port = config.api.rest_port;
        tokio::spawn(async move {
            if let Err(e) = start_rest_api(api_manager, rest_port).await {
                tracing::error!("REST API error: {}", e);
            }
        });
    }

    let metrics_manager = manager.clone();
    let metrics_port = config.monitoring.prometheus_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_manager, metrics_port).await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    let signal_manager = manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, shutting down");
                signal_manager.shutdown();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    manager.run().await?;

    Ok(())
}

async fn start_rest_api(manager: Arc<Manager>, port: u16) -> anyhow::Result<()> {
    use simfarm_manager::api::create_rest_api;

    let app = create_rest_api(manager);
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("REST API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn start_metrics_server(manager: Arc<Manager>, port: u16) -> anyhow::Result<()> {
    use axum::{extract::State, http::StatusCode, routing::get};

    async fn metrics_handler(State(manager): State<Arc<Manager>>) -> Result<String, StatusCode> {
        // Refresh gauges before the scrape reads them.
        manager.stats();
        manager.metrics().render().map_err(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(manager);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Metrics server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
