//! promctld — keeps a local Prometheus server's configuration and process
//! in line with operator options and peer announcements.
//!
//! # Usage
//!
//! ```text
//! promctld init --port 9090          # write a starter promctl.toml
//! promctld run < peer-events.jsonl   # reconcile on every trigger
//! promctld render                    # print what would be applied
//! promctld status                    # print persisted unit state
//! ```

mod events;
mod sink;
mod supervisor;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};

use promctl_core::{DaemonConfig, OperatorOptions, PeerRegistry};
use promctl_engine::{Engine, Trigger, dry_run};
use promctl_probe::HttpIdentityProbe;
use promctl_state::StateStore;

use crate::sink::FsConfigSink;
use crate::supervisor::LocalSupervisor;

#[derive(Parser)]
#[command(name = "promctld", about = "Prometheus reconciliation daemon")]
struct Cli {
    /// Path to promctl.toml.
    #[arg(long, short, global = true, default_value = "/etc/promctl/promctl.toml")]
    config: PathBuf,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon, reading peer events as JSON lines from stdin.
    Run,
    /// Print the config document and command line without applying them.
    Render,
    /// Print the persisted unit state.
    Status,
    /// Write a starter configuration file.
    Init {
        /// Port the managed server listens on.
        #[arg(long, default_value = "9090")]
        port: u16,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run => run(&cli.config).await,
        Command::Render => render(&cli.config),
        Command::Status => status(&cli.config),
        Command::Init { port, force } => init(&cli.config, port, force),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,promctld=debug,promctl=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(config_path: &Path) -> anyhow::Result<(DaemonConfig, OperatorOptions)> {
    let config = DaemonConfig::from_file(config_path)?;
    let options = OperatorOptions::from_raw(&config.options)?;
    Ok((config, options))
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let (config, options) = load(config_path)?;
    info!(path = %config_path.display(), port = options.port, "promctld starting");

    if let Some(parent) = config.paths.state_db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = StateStore::open(&config.paths.state_db)?;
    info!(path = %config.paths.state_db.display(), "state store opened");

    let probe = HttpIdentityProbe::localhost(config.unit.probe_timeout());
    let supervisor = LocalSupervisor::new(config.unit.stop_grace());
    let service_name = config.unit.service_name.clone();
    let mut engine = Engine::new(
        store,
        options,
        config.paths,
        config.unit,
        supervisor,
        FsConfigSink,
        probe,
    );

    let (tx, mut rx) = mpsc::channel::<Trigger>(64);

    // The in-process supervisor is reachable as soon as it exists.
    tx.send(Trigger::SupervisorReachable).await?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::spawn(events::forward_events(stdin, tx.clone()));

    let signal_path = config_path.to_path_buf();
    tokio::spawn(async move {
        if let Err(e) = events::forward_signals(signal_path, tx).await {
            error!(error = %e, "signal handling failed");
        }
    });

    while let Some(trigger) = rx.recv().await {
        let stopping = matches!(trigger, Trigger::Stop);

        match engine.handle(trigger).await {
            Ok(report) => {
                for publication in &report.publications {
                    info!(
                        relation = %publication.relation,
                        fields = ?publication.fields,
                        "publishing"
                    );
                }
            }
            Err(e) => error!(error = %e, "reconciliation pass aborted"),
        }

        if stopping {
            break;
        }
    }

    engine.reconciler().supervisor().shutdown().await;
    info!(service = %service_name, "promctld stopped");
    Ok(())
}

fn render(config_path: &Path) -> anyhow::Result<()> {
    let (config, options) = load(config_path)?;

    let registry = if config.paths.state_db.exists() {
        StateStore::open(&config.paths.state_db)?.get_registry()?
    } else {
        PeerRegistry::new()
    };

    let (rendered, spec) = dry_run(&options, &config.paths, &registry)?;
    println!("# fingerprint: {}", rendered.fingerprint);
    if let Some(command) = &spec.command {
        println!("# command: {command}");
    }
    print!("{}", rendered.as_str());
    Ok(())
}

fn status(config_path: &Path) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(config_path)?;
    let store = StateStore::open(&config.paths.state_db)?;
    let state = store.load_unit_state()?;

    let out = serde_json::json!({
        "ready": state.ready,
        "applied": state.applied,
        "peers": state.registry.peers(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn init(config_path: &Path, port: u16, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", config_path.display());
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, DaemonConfig::scaffold(port).to_toml_string()?)?;
    println!("wrote {}", config_path.display());
    Ok(())
}
