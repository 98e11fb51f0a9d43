//! hwsyncd entry point.
//!
//! Runs the agent against the in-memory driver: programs a desired state,
//! replays a file of control-plane updates and simulated link-downs through
//! the daemon loop, and prints a JSON summary on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use sonic_hwsyncd::daemon::{run, AgentSummary, ControlPlaneUpdate, DesiredState, StartReport, SwitchAgent};
use sonic_hwsyncd::lag::LinkEvent;
use sonic_hwsyncd::{AgentConfig, LogFormat};
use sonic_sai::FakeSai;
use sonic_types::PortId;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// SONiC hardware sync agent
#[derive(Parser, Debug)]
#[command(name = "hwsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent configuration file (JSON)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Desired switch state to program at startup (JSON)
    #[arg(short = 'd', long)]
    desired_state: PathBuf,

    /// Control-plane updates to replay after startup (JSON array)
    #[arg(short = 'u', long)]
    updates: Option<PathBuf>,

    /// Simulate a link-down on this port (repeatable)
    #[arg(long = "link-down")]
    link_down: Vec<u32>,

    /// Program routes through the standalone RIB backend
    #[arg(long)]
    standalone_rib: bool,

    /// Adopt objects left in hardware by a previous instance
    #[arg(long)]
    warm_boot: bool,

    /// After the run, start a second agent on the same hardware with warm
    /// boot enabled
    #[arg(long)]
    simulate_restart: bool,

    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Log format (text or json)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[derive(Serialize)]
struct Output {
    start: StartReport,
    summary: AgentSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    restart: Option<StartReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    restart_summary: Option<AgentSummary>,
}

fn load_config(args: &Args) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    if args.standalone_rib {
        config.standalone_rib = true;
    }
    if args.warm_boot {
        config.warm_boot = true;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &AgentConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid log level '{}'", config.log_level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);
    let installed = match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to set logger: {e}"))
}

fn load_updates(path: Option<&PathBuf>) -> Result<Vec<ControlPlaneUpdate>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("cannot parse {}", path.display()))
}

async fn simulate(args: Args, config: AgentConfig) -> Result<Output> {
    let desired = DesiredState::load(&args.desired_state)?;
    let updates = load_updates(args.updates.as_ref())?;

    let sai = Arc::new(FakeSai::new());
    for port in &desired.ports {
        sai.add_port(&port.name);
    }

    let mut agent = SwitchAgent::new(config.clone(), sai.clone())?;
    let start = agent.start(&desired).context("startup failed")?;
    info!(
        routes = start.routes.applied,
        stale_removed = start.stale_removed,
        "startup complete"
    );

    let (update_tx, update_rx) = mpsc::channel(config.channel_capacity);
    let (link_tx, link_rx) = mpsc::channel(config.channel_capacity);
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    let signal_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("received SIGINT, shutting down");
                signal_token.cancel();
            }
            Err(err) => error!("failed to listen for ctrl-c: {err}"),
        }
    });

    let link_down = args.link_down.clone();
    let feeder = tokio::spawn(async move {
        for port in link_down {
            if link_tx.send(LinkEvent::Down(PortId(port))).await.is_err() {
                break;
            }
        }
        for update in updates {
            if update_tx.send(update).await.is_err() {
                break;
            }
        }
    });

    let agent = run(agent, update_rx, link_rx, shutdown).await?;
    signal_handle.abort();
    if let Err(e) = feeder.await {
        warn!("update feeder failed: {e}");
    }

    let summary = agent.summary();
    let (restart, restart_summary) = if args.simulate_restart {
        drop(agent);
        let warm = AgentConfig {
            warm_boot: true,
            ..config
        };
        let mut second = SwitchAgent::new(warm, sai)?;
        let report = second.start(&desired).context("warm restart failed")?;
        (Some(report), Some(second.summary()))
    } else {
        (None, None)
    };

    Ok(Output {
        start,
        summary,
        restart,
        restart_summary,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("hwsyncd: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&config) {
        eprintln!("hwsyncd: {e:#}");
        return ExitCode::FAILURE;
    }

    info!("====================================================================");
    info!("Starting hwsyncd");
    info!("====================================================================");
    info!("RIB backend: {}", if config.standalone_rib { "standalone" } else { "legacy" });
    if config.warm_boot {
        info!("Warm boot mode: ENABLED");
    }

    let output = match simulate(args, config).await {
        Ok(output) => output,
        Err(e) => {
            error!("hwsyncd failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!("cannot render summary: {e}");
            return ExitCode::FAILURE;
        }
    }

    info!("hwsyncd shutdown complete");
    ExitCode::SUCCESS
}
