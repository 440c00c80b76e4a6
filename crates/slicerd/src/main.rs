//! slicerd - Campus Traffic Slicing Controller Daemon
//!
//! Entry point for the slicerd daemon.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use slicing_common::FlowInstaller;
use slicerd::config::{InstallerBackend, DEFAULT_CONFIG_PATH};
use slicerd::{
    ApplyPlan, CommandServer, EventBridge, LogInstaller, ModeController, OvsInstaller,
    SliceRouter, SlicerConfig, SlicingController,
};

/// Campus traffic slicing controller
#[derive(Parser, Debug)]
#[command(name = "slicerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Command channel listen address, overrides the config file
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Log installer calls instead of touching the switches
    #[arg(long)]
    dry_run: bool,
}

/// Initializes tracing/logging subsystem
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

/// Waits for SIGINT or SIGTERM
#[cfg(unix)]
async fn wait_for_signal() {
    use signal::unix::{signal as unix_signal, SignalKind};

    match unix_signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = signal::ctrl_c() => info!("slicerd: Received SIGINT"),
                _ = term.recv() => info!("slicerd: Received SIGTERM"),
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            if signal::ctrl_c().await.is_ok() {
                info!("slicerd: Received SIGINT");
            }
        }
    }
}

/// Waits for Ctrl-C
#[cfg(not(unix))]
async fn wait_for_signal() {
    if signal::ctrl_c().await.is_ok() {
        info!("slicerd: Received SIGINT");
    }
}

/// Cancels `shutdown` once a termination signal arrives
fn setup_signal_handlers(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.cancel();
    });
}

async fn run(args: Args) -> Result<()> {
    let mut config = SlicerConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(listen) = args.listen {
        config.command.listen = listen;
    }
    if args.dry_run {
        config.installer.backend = InstallerBackend::Log;
    }
    config.validate().context("Invalid configuration")?;

    let installer: Arc<dyn FlowInstaller> = match config.installer.backend {
        InstallerBackend::Ovs => Arc::new(OvsInstaller::new(&config.installer)),
        InstallerBackend::Log => Arc::new(LogInstaller::new()),
    };
    info!(
        installer = installer.name(),
        provisioning = ?config.installer.provisioning,
        simulation_port = config.slicing.simulation_port,
        "Configuration loaded"
    );

    let modes = Arc::new(ModeController::new(
        installer.clone(),
        ApplyPlan::from_config(&config),
    ));
    if config.installer.reset_on_startup {
        let failures = modes.reset_switches(config.slicing.known_switches()).await;
        if failures > 0 {
            warn!(failures, "Startup reset incomplete");
        }
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let commands = CommandServer::bind(&config.command, modes.clone()).await?;
    let command_task = tokio::spawn(commands.run(shutdown.clone()));

    let event_task = if config.events.enabled {
        let controller = Arc::new(SlicingController::new(
            modes.clone(),
            SliceRouter::from_config(&config.slicing),
            installer.clone(),
        ));
        let bridge = EventBridge::bind(config.events.listen, controller).await?;
        Some(tokio::spawn(bridge.run(shutdown.clone())))
    } else {
        info!("Event bridge disabled");
        None
    };

    info!(mode = %modes.mode(), "slicerd running");

    command_task.await.context("Command channel task panicked")??;
    if let Some(task) = event_task {
        task.await.context("Event bridge task panicked")??;
    }

    info!(mode = %modes.mode(), "slicerd stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("slicerd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting slicerd ---");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("slicerd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
