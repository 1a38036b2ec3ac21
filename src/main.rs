use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use lanvault::adapters;
use lanvault::config::AppConfig;
use lanvault::context::AppContext;
use lanvault::core::{
    BackupOrchestrator, Device, DeviceRegistry, HardwareId, LogStatusSink, NeighborResolver,
    RunOutcome, ScanObserver, SelectionCollaborator, SimulatedClient, SmbProcessClient,
    SubnetScanner, SystemNeighborResolver, TransferClient,
};
use lanvault::db;
use lanvault::logging::{self, LogThrottle};

#[derive(Parser)]
#[command(name = "lanvault")]
#[command(about = "LAN device discovery and folder backup", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run periodic backups in the foreground
    Daemon(RunArgs),
    /// Run one backup now, prompting for device selection when needed
    Backup(RunArgs),
    /// Scan the local subnet and print discovered devices
    Scan(ScanArgs),
    /// Add a hardware address to the trusted whitelist
    Approve(ApproveArgs),
    /// Write a starter configuration file
    Init(InitArgs),
}

#[derive(Args, Serialize)]
struct RunArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    retry_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    interval_mins: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    simulation: Option<bool>,
}

#[derive(Args, Serialize)]
struct ScanArgs {
    /// Print the snapshot as JSON
    #[serde(skip)]
    #[arg(long)]
    json: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,
}

#[derive(Args)]
struct ApproveArgs {
    /// Hardware (MAC) address to trust, e.g. aa:bb:cc:dd:ee:ff
    hardware_id: String,
}

#[derive(Args)]
struct InitArgs {
    #[arg(long, default_value = "lanvault.toml")]
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Daemon(args) | Commands::Backup(args) => AppConfig::new(Some(args))?,
        Commands::Scan(args) => AppConfig::new(Some(args))?,
        _ => AppConfig::new(None::<&RunArgs>)?,
    };

    logging::init(config.verbose, false);

    match &cli.command {
        Commands::Init(args) => run_init(&args.path),
        Commands::Approve(args) => run_approve(&config, &args.hardware_id).await,
        Commands::Scan(args) => run_scan(&config, args.json).await,
        Commands::Backup(_) => run_backup(&config).await.context("backup run failed"),
        Commands::Daemon(_) => run_daemon(&config).await.context("daemon failed"),
    }
}

fn run_init(path: &Path) -> Result<()> {
    AppConfig::write_default(path)?;
    println!("Wrote starter config to {}", path.display());
    Ok(())
}

async fn run_approve(config: &AppConfig, raw: &str) -> Result<()> {
    let conn = db::init(&config.db_path).await?;
    let registry = DeviceRegistry::new(conn);
    let hardware_id = HardwareId::new(raw);
    registry.approve(&hardware_id).await?;
    println!("Approved {hardware_id}");
    Ok(())
}

async fn run_scan(config: &AppConfig, json: bool) -> Result<()> {
    let resolver: Arc<dyn NeighborResolver> = Arc::new(SystemNeighborResolver::new());
    let scanner = SubnetScanner::new(resolver, &config.scan);

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let observer: Arc<dyn ScanObserver> = Arc::new(ThrottledScanLog::new());
    let snapshot = scanner.scan(Some(observer), &cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for device in &snapshot.devices {
            println!("{device}");
        }
        println!("{} device(s) discovered", snapshot.devices.len());
    }
    Ok(())
}

async fn run_backup(config: &AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config.clone()).await?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let outcome = orchestrator
        .run(Some(&StdinSelection), Arc::new(LogStatusSink), &cancel)
        .await;
    report_outcome(&outcome);
    Ok(())
}

async fn run_daemon(config: &AppConfig) -> Result<()> {
    let interval_mins = config.interval_mins;
    let orchestrator = build_orchestrator(config.clone()).await?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    info!(interval_mins, "daemon started");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_mins * 60));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutting down");
                break;
            }
            _ = ticker.tick() => {
                // Headless: ambiguous discovery skips the run instead of
                // prompting.
                let outcome = orchestrator.run(None, Arc::new(LogStatusSink), &cancel).await;
                report_outcome(&outcome);
            }
        }
    }
    Ok(())
}

async fn build_orchestrator(config: AppConfig) -> Result<BackupOrchestrator> {
    let conn = db::init(&config.db_path).await?;
    let simulation = config.simulation;
    let ctx = AppContext::new(config, conn);

    let resolver: Arc<dyn NeighborResolver> = Arc::new(SystemNeighborResolver::new());
    let connectivity = adapters::get_probe(simulation);
    let client: Arc<dyn TransferClient> = if simulation {
        Arc::new(SimulatedClient::new())
    } else {
        Arc::new(SmbProcessClient::new(ctx.config.share.clone()))
    };

    Ok(BackupOrchestrator::new(&ctx, resolver, connectivity, client))
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed { summary, target } => info!(
            uploaded = summary.uploaded,
            total = summary.total,
            target = %target.address,
            "backup run completed"
        ),
        RunOutcome::Skipped(reason) => info!(reason = reason.as_str(), "backup run skipped"),
        RunOutcome::Failed(e) => error!(error = %e, "backup run failed"),
    }
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling current work");
            cancel.cancel();
        }
    });
}

/// Interactive device chooser for one-shot backups.
struct StdinSelection;

#[async_trait]
impl SelectionCollaborator for StdinSelection {
    async fn choose(&self, discovered: &[Device]) -> Option<Device> {
        let devices = discovered.to_vec();
        tokio::task::spawn_blocking(move || prompt_device(&devices))
            .await
            .ok()
            .flatten()
    }
}

fn prompt_device(devices: &[Device]) -> Option<Device> {
    use std::io::{Write, stdin, stdout};

    if devices.is_empty() {
        println!("No devices discovered on the subnet.");
        return None;
    }

    println!("Discovered devices:");
    for (index, device) in devices.iter().enumerate() {
        println!("  {}. {}", index + 1, device);
    }
    print!(
        "Select a device to back up to [1-{}], empty to cancel: ",
        devices.len()
    );
    stdout().flush().ok()?;

    let mut input = String::new();
    stdin().read_line(&mut input).ok()?;
    let choice: usize = input.trim().parse().ok()?;
    devices.get(choice.checked_sub(1)?).cloned()
}

/// Logs scan progress at a bounded rate, always including the final probe.
struct ThrottledScanLog {
    throttle: LogThrottle,
}

impl ThrottledScanLog {
    fn new() -> Self {
        Self {
            throttle: LogThrottle::new(Duration::from_millis(500)),
        }
    }
}

impl ScanObserver for ThrottledScanLog {
    fn probed(&self, _address: Ipv4Addr, completed: usize, total: usize) {
        if completed == total || self.throttle.should_log() {
            info!(completed, total, "scan progress");
        }
    }
}
