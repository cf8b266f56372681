#![forbid(unsafe_code)]

mod assets;
mod attract;
mod color;
mod config;
mod constants;
mod control;
mod error;
mod ipc;
mod scheduler;
mod surface;
mod timer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{Level as TraceLevel, info, warn};
use tracing_subscriber::FmtSubscriber;

use attract::Attract;
use config::Settings;
use ipc::{ControlClient, ControlRequest, ControlServer};
use scheduler::Scheduler;
use surface::{LogSurface, SurfaceDispatcher};

#[derive(Parser)]
#[command(name = "dmd-marquee", version)]
#[command(about = "Dot-matrix display scheduler for arcade cabinets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Settings file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the display daemon (default)
    Run,
    /// Send one command to a running daemon and print its status
    Send {
        /// Command name, e.g. display/picture
        command: String,
        /// Parameters as key=value (a bare key is a flag)
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Control socket to connect to
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing key in '{raw}'")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Ok((raw.to_string(), String::new())),
    }
}

fn log_level_from_env() -> TraceLevel {
    match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn subscriber(level: TraceLevel) -> FmtSubscriber {
    FmtSubscriber::builder().with_max_level(level).finish()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cli.config.as_deref()),
        Command::Send {
            command,
            params,
            socket,
        } => send(cli.config.as_deref(), socket, command, params),
    }
}

// ==============================================================================
// Daemon
// ==============================================================================

fn run(config_path: Option<&Path>) -> Result<()> {
    let level = log_level_from_env();

    // Config warnings are logged before the final level is known
    let settings = tracing::subscriber::with_default(subscriber(level), || Settings::load(config_path))?;
    let level = if settings.debug { level.max(TraceLevel::DEBUG) } else { level };
    tracing::subscriber::set_global_default(subscriber(level)).context("Failed to install log subscriber")?;
    info!(version = env!("CARGO_PKG_VERSION"), artwork = %settings.artwork_path.display(), "dmd-marquee starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(run_daemon(Arc::new(settings)))
}

async fn run_daemon(settings: Arc<Settings>) -> Result<()> {
    let handle = Handle::current();

    let surface = Arc::new(LogSurface::new(settings.dmd_width, settings.dmd_height));
    let dispatcher = SurfaceDispatcher::spawn(
        surface,
        &handle,
        settings.surface_retry_attempts,
        settings.surface_retry_interval(),
    );
    let scheduler = Scheduler::new(settings.clone(), dispatcher, handle.clone());

    if let Err(e) = scheduler.set_marquee(&settings.start_picture) {
        warn!(start_picture = %settings.start_picture, error = %e, "Start picture unavailable");
    }

    let attract = Attract::new(scheduler.clone(), handle);
    if settings.attract_mode {
        attract.start();
    }

    let socket_path = match &settings.control_socket {
        Some(path) => path.clone(),
        None => ipc::default_socket_path()?,
    };
    let server = ControlServer::bind_to(socket_path.clone())?;
    let _listener = ipc::spawn_control_listener(server, scheduler.clone(), attract.clone());

    spawn_signal_listener(scheduler.clone())?;

    let mut shutdown = scheduler.shutdown_signal();
    shutdown
        .wait_for(|stop| *stop)
        .await
        .context("Scheduler dropped before shutdown")?;

    // Let the surface finish the final clear
    tokio::time::sleep(settings.exit_grace()).await;
    attract.stop();
    let _ = std::fs::remove_file(&socket_path);
    info!("dmd-marquee stopped");
    Ok(())
}

/// SIGINT/SIGTERM behave like an `exit` command
fn spawn_signal_listener(scheduler: Scheduler) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal = signal, "Received signal, exiting");
            scheduler.exit();
        }
    });
    Ok(())
}

// ==============================================================================
// Client
// ==============================================================================

fn send(
    config_path: Option<&Path>,
    socket: Option<PathBuf>,
    command: String,
    params: Vec<(String, String)>,
) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(log_level_from_env()))
        .context("Failed to install log subscriber")?;

    let socket = match socket {
        Some(path) => path,
        None => configured_socket(config_path)?,
    };
    let request = ControlRequest {
        command,
        params: params.into_iter().collect(),
    };

    let mut client = ControlClient::connect_to(&socket)?;
    let response = client.request(&request)?;
    println!("{}", response.status);
    Ok(())
}

/// Socket named in an existing settings file, else the default location
fn configured_socket(config_path: Option<&Path>) -> Result<PathBuf> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(Settings::default_path);
    if path.exists()
        && let Some(socket) = Settings::load(Some(&path))?.control_socket
    {
        return Ok(socket);
    }
    ipc::default_socket_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("path=galaga"), Ok(("path".to_string(), "galaga".to_string())));
        assert_eq!(parse_param("text=a=b"), Ok(("text".to_string(), "a=b".to_string())));
        assert_eq!(parse_param("queue"), Ok(("queue".to_string(), String::new())));
        assert!(parse_param("=oops").is_err());
    }

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["dmd-marquee"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["dmd-marquee", "send", "display/picture", "path=galaga", "queue"]).unwrap();
        let Some(Command::Send { command, params, socket }) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(command, "display/picture");
        assert_eq!(params.len(), 2);
        assert!(socket.is_none());
    }
}
