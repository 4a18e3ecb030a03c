//! editor-rpc-bridge: JSON-RPC bridge for single-threaded editor hosts
//!
//! Runs the bridge with the demonstration controllers. The process main
//! thread plays the host: it runs the work queue while the listeners are
//! served from a separate runtime thread.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use editor_rpc_bridge::config;
use editor_rpc_bridge::{BridgeError, BridgeServer};

/// JSON-RPC bridge for single-threaded editor hosts.
///
/// Serves JSON-RPC 2.0 over HTTP, a named pipe or Unix socket, and pushes
/// events over WebSocket. Every request is executed on the main thread.
#[derive(Parser, Debug)]
#[command(name = "editor-rpc-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Override the HTTP port
    #[arg(long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Override the WebSocket port
    #[arg(long, value_name = "PORT")]
    ws_port: Option<u16>,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Serves until a termination signal arrives. Dropping `server` at the end
/// closes the work queue, which lets the main loop return.
fn serve(mut server: BridgeServer) -> Result<(), BridgeError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(BridgeError::Runtime)?;

    runtime.block_on(server.run_until_signal())
}

/// Entry point for the editor-rpc-bridge server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = args.http_port {
        cfg.http.port = port;
    }
    if let Some(port) = args.ws_port {
        cfg.websocket.port = port;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting editor-rpc-bridge"
    );

    let (server, main_loop) = match BridgeServer::new(cfg) {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    server.register_demo_controllers();

    let runtime_thread = match std::thread::Builder::new()
        .name("bridge-runtime".to_string())
        .spawn(move || serve(server))
    {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "Failed to spawn runtime thread");
            return ExitCode::FAILURE;
        }
    };

    let executed = main_loop.run();
    info!(executed, "Host loop finished");

    match runtime_thread.join() {
        Ok(Ok(())) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("Runtime thread panicked");
            ExitCode::FAILURE
        }
    }
}
