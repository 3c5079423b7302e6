use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use rand::Rng;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, LoggingConfig, TurnstileConfig};
use turnstile::reaper::spawn_reaper;
use turnstile::{AdmissionFacade, CheckRequest, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "turnstile")]
#[command(about = "In-process sliding-window admission control", version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the admission engine with synthetic traffic and print its health
    Simulate {
        /// Number of distinct clients
        #[arg(long, default_value_t = 10)]
        clients: usize,

        /// Total admission checks to issue
        #[arg(long, default_value_t = 10_000)]
        requests: usize,

        /// Parallel workers issuing checks
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Resource named in every check
        #[arg(long, default_value = "api")]
        resource: String,

        /// Number of clients listed in the report
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    init_tracing(&config.logging);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::ShowConfig => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Command::Simulate {
            clients,
            requests,
            workers,
            resource,
            top,
        } => simulate(&config, clients, requests, workers, resource, top).await,
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn simulate(
    config: &TurnstileConfig,
    clients: usize,
    requests: usize,
    workers: usize,
    resource: String,
    top: usize,
) -> anyhow::Result<()> {
    let clients = clients.max(1);
    let workers = workers.max(1);

    let facade = Arc::new(AdmissionFacade::from_config(config, SystemClock)?);

    let reaper = config.reaper.enabled.then(|| {
        spawn_reaper(
            facade.clone(),
            Duration::from_secs(config.reaper.interval_secs),
        )
    });

    let client_ids: Arc<Vec<String>> = Arc::new(
        (0..clients)
            .map(|_| format!("client-{}", uuid::Uuid::new_v4().simple()))
            .collect(),
    );

    info!(
        clients = clients,
        requests = requests,
        workers = workers,
        resource = %resource,
        "Starting simulation"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let started = Instant::now();
    let mut tasks = Vec::with_capacity(workers);
    for worker in 0..workers {
        let facade = facade.clone();
        let client_ids = client_ids.clone();
        let resource = resource.clone();
        let stop = stop.clone();
        let share = requests / workers + usize::from(worker < requests % workers);

        tasks.push(tokio::task::spawn_blocking(move || {
            let mut rng = rand::thread_rng();
            let mut admitted = 0usize;
            for _ in 0..share {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let client_id = &client_ids[rng.gen_range(0..client_ids.len())];
                let request = CheckRequest::new(client_id.as_str(), Some(resource.as_str()));
                match facade.check_request(&request) {
                    Ok(decision) if decision.allowed => admitted += 1,
                    Ok(_) => {}
                    Err(err) if err.is_client_error() => {
                        warn!(error = %err, "Simulated check rejected as invalid")
                    }
                    Err(err) => error!(error = %err, "Simulated check failed"),
                }
            }
            admitted
        }));
    }

    let run = async {
        let mut admitted = 0usize;
        for task in tasks {
            admitted += task.await?;
        }
        anyhow::Ok(admitted)
    };

    let admitted = tokio::select! {
        result = run => result?,
        _ = shutdown_signal() => {
            stop.store(true, Ordering::Relaxed);
            if let Some(handle) = &reaper {
                handle.abort();
            }
            return Ok(());
        }
    };

    if let Some(handle) = &reaper {
        handle.abort();
    }

    let report = serde_json::json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "admitted": admitted,
        "rejected": requests - admitted,
        "config": facade.config().as_ref(),
        "health": facade.health(),
        "top_clients": facade
            .top_clients(top)
            .iter()
            .map(|stats| {
                serde_json::json!({
                    "key": stats.key,
                    "total_requests": stats.total_requests,
                    "rejected_requests": stats.rejected_requests,
                    "rejection_rate": stats.rejection_rate(),
                })
            })
            .collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!("Simulation complete");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping simulation");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping simulation");
        }
    }
}
