mod config;

use clap::{Parser, Subcommand};
use config::{Config, Overrides};
use corral_runtime::{
    ApiClient, BackoffRelay, ChannelTransport, ClusterCache, PendingFeeder, ScheduleWorker, Transport,
};
use corral_scheduler::{in_tree_registry, PermissiveVolumeBinder, PreemptionExecutor, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "corral", about = "Corral workload scheduler")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler against an orchestrator API
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print the effective configuration as YAML
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Run { overrides } => run(Config::resolve(&overrides)?).await,
        Commands::Config { overrides } => {
            let config = Config::resolve(&overrides)?;
            let yaml = serde_yaml::to_string(&config)
                .map_err(|e| miette::miette!("Failed to render configuration: {}", e))?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

/// Run cache refresh, feeder, worker and backoff relay until ctrl-c
async fn run(config: Config) -> miette::Result<()> {
    info!(
        "Starting corral scheduler '{}' against {}",
        config.scheduler_name, config.api_url
    );

    let token = CancellationToken::new();
    let api_client = Arc::new(ApiClient::new(&config.api_url));

    // 1. Cluster cache
    let cache = Arc::new(ClusterCache::new());
    let cache_handle = tokio::spawn(cache.clone().run(
        api_client.clone(),
        Duration::from_secs(config.refresh_interval_secs),
        token.clone(),
    ));
    cache
        .wait_for_sync(Duration::from_secs(config.sync_timeout_secs))
        .await?;
    info!("Cluster cache synced");

    // 2. Scheduler and preemption
    let scheduler = Arc::new(Scheduler::build(
        &in_tree_registry(),
        api_client.clone(),
        cache.clone(),
        Arc::new(PermissiveVolumeBinder),
        config.scheduler.clone(),
    )?);
    let preemption = Arc::new(PreemptionExecutor::new(
        api_client.clone(),
        config.scheduler.preemption.clone(),
        config.scheduler.retry.clone(),
    ));

    // 3. Queues
    let transport: Arc<dyn Transport> = Arc::new(ChannelTransport::new());

    let worker = ScheduleWorker::new(
        scheduler,
        api_client.clone(),
        transport.clone(),
        preemption,
        config.worker.clone(),
    );
    let worker_token = token.clone();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(worker_token).await {
            error!("Schedule worker error: {}", e);
        }
    });

    let relay = BackoffRelay::new(transport.clone(), config.worker.backoff_queue.clone());
    let relay_token = token.clone();
    let relay_handle = tokio::spawn(async move {
        if let Err(e) = relay.run(relay_token).await {
            error!("Backoff relay error: {}", e);
        }
    });

    // 4. Pending workload feeder
    let feeder = PendingFeeder::new(
        cache,
        transport,
        config.worker.receive_queue.clone(),
        config.scheduler_name.clone(),
    );
    let feeder_token = token.clone();
    let feed_interval = Duration::from_secs(config.feed_interval_secs);
    let feeder_handle = tokio::spawn(async move { feeder.run(feed_interval, feeder_token).await });

    info!("All components started");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    let shutdown_timeout = Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(cache_handle, worker_handle, relay_handle, feeder_handle);
    })
    .await;

    info!("Shutdown complete");

    Ok(())
}
