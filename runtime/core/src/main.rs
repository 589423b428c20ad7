//! midicommander: run commands from MIDI events.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use midicommander_core::{
    list_input_ports, CameraBackendKind, CameraOptions, PortSelector, RuntimeManager,
    RuntimeOptions,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Drive the camera through the raspistill program
    Raspistill,
    /// Only log camera operations
    Log,
}

impl From<BackendArg> for CameraBackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Raspistill => CameraBackendKind::Raspistill,
            BackendArg::Log => CameraBackendKind::Log,
        }
    }
}

/// Listen on a MIDI input port and run the commands of matching rules
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rule file (YAML)
    #[arg(required_unless_present = "list_ports")]
    config: Option<PathBuf>,

    /// Input port index or name; a virtual port is opened when omitted
    #[arg(short, long)]
    port: Option<String>,

    /// Log every received event and dispatched command
    #[arg(short, long)]
    verbose: bool,

    /// Log filter (error, warn, info, debug, trace); overrides --verbose
    #[arg(long, env = "MIDICOMMANDER_LOG")]
    log_level: Option<String>,

    /// Enable the internal camera
    #[arg(short, long)]
    camera: bool,

    /// Camera backend
    #[arg(long, value_enum, default_value = "raspistill")]
    camera_backend: BackendArg,

    /// Program used by the raspistill backend
    #[arg(long, default_value = "raspistill")]
    camera_program: String,

    /// Directory for captured stills
    #[arg(long, default_value = ".")]
    capture_dir: PathBuf,

    /// MIDI client name
    #[arg(long, default_value = "midicommander")]
    client_name: String,

    /// List available MIDI input ports and exit
    #[arg(short, long)]
    list_ports: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = log_directive(
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        args.log_level.as_deref(),
        args.verbose,
    );
    if let Err(err) = init_logging(&level) {
        eprintln!("Failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if args.list_ports {
        let ports = list_input_ports(&args.client_name)?;
        if ports.is_empty() {
            println!("No MIDI input ports found");
        }
        for (index, name) in ports.iter().enumerate() {
            println!("{index}: {name}");
        }
        return Ok(());
    }

    let config_path = args.config.context("no rule file given")?;
    let camera = args.camera.then(|| CameraOptions {
        backend: args.camera_backend.into(),
        program: args.camera_program.clone(),
        capture_dir: args.capture_dir.clone(),
    });
    let options = RuntimeOptions {
        config_path,
        port: args.port.as_deref().map(PortSelector::parse),
        client_name: args.client_name,
        camera,
    };

    let manager = RuntimeManager::initialize(options)?;
    manager.run(shutdown_signal()).await;
    info!("Exit.");
    Ok(())
}

/// `RUST_LOG` wins, then `--log-level`, then `--verbose`.
fn log_directive(rust_log: Option<String>, log_level: Option<&str>, verbose: bool) -> String {
    rust_log
        .filter(|value| !value.trim().is_empty())
        .or_else(|| log_level.map(str::to_string))
        .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("invalid log filter `{level}`"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .try_init()?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            warn!("Failed to listen for Control-C: {err}");
            std::future::pending::<()>().await;
        }
    }
}
