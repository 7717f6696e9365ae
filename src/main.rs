use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use omt_watch::backend::HttpBackend;
use omt_watch::config::{BackendConfig, LogMergeMode, MigrationConfig, MonitorConfig};
use omt_watch::dashboard::{run_dashboard, DashboardState};
use omt_watch::error::MonitorError;
use omt_watch::monitor::{JobController, JobState, MonitorEvent, StopAck};
use omt_watch::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "omt-watch")]
#[command(version)]
#[command(about = "Submit and monitor FlinkOMT migration jobs")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the monitor dashboard API
    Serve(ServeArgs),

    /// Submit one migration job and follow it until it ends
    Run(RunArgs),
}

// =============================================================================
// Shared Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct BackendArgs {
    /// FlinkOMT console base URL
    #[arg(long, short = 'b', default_value = "http://127.0.0.1:5000")]
    backend_url: String,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value = "30000")]
    request_timeout_ms: u64,
}

#[derive(Parser, Debug)]
struct MonitorArgs {
    /// Status poll interval in milliseconds
    #[arg(long, default_value = "2000", value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,

    /// Stop polling after this many milliseconds
    #[arg(long, default_value = "600000", value_parser = clap::value_parser!(u64).range(1..))]
    max_lifetime_ms: u64,

    /// How remote log batches are deduplicated
    #[arg(long, value_enum, default_value = "cumulative")]
    log_merge: LogMergeArg,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogMergeArg {
    Cumulative,
    Keyed,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Port for the dashboard API
    #[arg(long, default_value = "8090")]
    port: u16,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(flatten)]
    monitor: MonitorArgs,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Migration config (JSON, same shape as the console form)
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(flatten)]
    monitor: MonitorArgs,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn backend_config(args: &BackendArgs) -> BackendConfig {
    BackendConfig {
        base_url: args.backend_url.clone(),
        request_timeout_ms: args.request_timeout_ms,
    }
}

fn monitor_config(args: &MonitorArgs) -> Result<MonitorConfig, MonitorError> {
    let log_merge = match args.log_merge {
        LogMergeArg::Cumulative => LogMergeMode::Cumulative,
        LogMergeArg::Keyed => LogMergeMode::Keyed,
    };
    let config = MonitorConfig::default()
        .with_poll_interval_ms(args.poll_interval_ms)
        .with_max_lifetime_ms(args.max_lifetime_ms)
        .with_log_merge(log_merge);
    config.validate()?;
    Ok(config)
}

/// Stop the followed job on shutdown. A job that reached a terminal state
/// just before the signal is reported with that state instead.
async fn stop_on_shutdown(
    controller: &JobController,
) -> Result<(JobState, Option<StopAck>), MonitorError> {
    match controller.stop().await {
        Ok(ack) => Ok((JobState::Idle, Some(ack))),
        Err(MonitorError::NoActiveJob) => Ok((controller.state().await, None)),
        Err(e) => Err(e),
    }
}

fn print_event(event: &MonitorEvent, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
        OutputFormat::Table => match event {
            MonitorEvent::StateChanged { state } => println!("== state: {}", state),
            MonitorEvent::LogAppended { entry } => {
                println!("[{}] {}", entry.timestamp, entry.message)
            }
            MonitorEvent::Error { kind, detail } => eprintln!("!! {}: {}", kind, detail),
            MonitorEvent::StopConfirmed { job_id } => println!("== job {} cancelled remotely", job_id),
            MonitorEvent::PollingExpired { job_id } => {
                println!("== stopped watching job {}; it may still be running", job_id)
            }
        },
    }
    Ok(())
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(HttpBackend::new(&backend_config(&args.backend))?);
    let controller = JobController::new(backend, monitor_config(&args.monitor)?);
    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;

    tracing::info!(
        addr = %addr,
        backend_url = %args.backend.backend_url,
        poll_interval_ms = args.monitor.poll_interval_ms,
        "Starting omt-watch dashboard"
    );

    let shutdown = install_shutdown_handler();
    run_dashboard(
        addr,
        DashboardState {
            controller: controller.clone(),
        },
        shutdown,
    )
    .await;

    if controller.state().await == JobState::Running {
        tracing::warn!("Exiting while a job is running; the remote job is left untouched");
    }
    Ok(())
}

async fn run_job(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = MigrationConfig::from_file(&args.config)?;
    config.validate()?;

    let backend = Arc::new(HttpBackend::new(&backend_config(&args.backend))?);
    let controller = JobController::new(backend, monitor_config(&args.monitor)?);
    let mut events = controller.subscribe().await;
    let shutdown = install_shutdown_handler();

    let handle = match controller.submit(&config).await {
        Ok(handle) => handle,
        Err(e) => {
            while let Ok(event) = events.try_recv() {
                print_event(&event, &args.output)?;
            }
            eprintln!("Error: job submission failed: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(job_id = %handle, "Following job");

    let final_state = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let (state, ack) = stop_on_shutdown(&controller).await?;
                while let Ok(event) = events.try_recv() {
                    print_event(&event, &args.output)?;
                }
                if let Some(ack) = ack {
                    if let Err(e) = ack.confirmed().await {
                        eprintln!("Warning: remote cancel failed: {}", e);
                    }
                }
                break state;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break controller.state().await;
                };
                print_event(&event, &args.output)?;
                match event {
                    MonitorEvent::StateChanged { state } if state.is_terminal() => break state,
                    MonitorEvent::PollingExpired { .. } => break JobState::Running,
                    _ => {}
                }
            }
        }
    };

    match final_state {
        JobState::Succeeded | JobState::Idle => Ok(()),
        JobState::Failed => std::process::exit(1),
        JobState::Running => std::process::exit(2),
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Commands::Serve(serve_args) => run_serve(serve_args).await?,
        Commands::Run(run_args) => run_job(run_args).await?,
    }

    Ok(())
}
