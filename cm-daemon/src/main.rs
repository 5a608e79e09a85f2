//! Chassismon Daemon (chassismond)
//!
//! Watches chassis hardware through the platform service, keeps the set of
//! currently-true conditions, drives the fault indicator LEDs and answers
//! alarm queries on a Unix domain socket.
//!
//! # Threads
//! - **Reconciliation**: a dedicated OS thread runs the rebuild / serve /
//!   retry loop. It blocks on the platform event stream.
//! - **Query server**: a single-threaded tokio runtime on the main thread.
//!
//! Both share one [`Monitor`] handle; its lock is the only shared state.
//!
//! # Hardening
//! - Restrictive umask (0077)
//! - PID file with stale-instance detection
//! - Symlink refusal on the socket path
//! - Graceful shutdown with socket and PID file cleanup

mod leds;
mod platform;
mod server;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use cm_core::constants::paths;
use cm_core::{load_config, ChassisError, Monitor, MonitorConfig};
use tracing::{debug, error, info, warn};

use crate::leds::{validate_led_name, SysfsLeds};
use crate::platform::PlatformClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter environment variable
const LOG_ENV: &str = "CHASSISMON_LOG";

/// Global shutdown flag shared with the reconciliation thread
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

// ============================================================================
// Security Hardening
// ============================================================================

/// Set restrictive umask
fn set_secure_umask() {
    // SAFETY: umask only replaces the process file-creation mask.
    unsafe { libc::umask(0o077) };
    debug!("Umask set to 0077");
}

// ============================================================================
// PID File Management
// ============================================================================

/// Write PID file, refusing to start if another instance is alive
fn write_pid_file() -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let path = Path::new(paths::PID_FILE);

    if path.exists() {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(old_pid) = content.trim().parse::<i32>() {
                // SAFETY: signal 0 performs only the existence/permission check.
                if unsafe { libc::kill(old_pid, 0) } == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        format!("Another instance is running (PID {})", old_pid),
                    ));
                }
            }
        }
        let _ = std::fs::remove_file(path);
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;

    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    debug!("PID file written: {}", path.display());
    Ok(())
}

// ============================================================================
// Cleanup
// ============================================================================

fn cleanup(socket_path: &Path) {
    debug!("Starting cleanup...");

    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("Failed to remove socket: {}", e);
        }
    }

    let pid_file = Path::new(paths::PID_FILE);
    if pid_file.exists() {
        if let Err(e) = std::fs::remove_file(pid_file) {
            warn!("Failed to remove PID file: {}", e);
        }
    }

    info!("Cleanup complete");
}

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("chassismond {} - Chassis hardware condition monitor", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    chassismond [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Config file (default {})", paths::CONFIG_FILE);
    eprintln!("    -s, --socket PATH   Alarm query socket (overrides config)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}      Log filter (trace, debug, info, warn, error)", LOG_ENV);
}

fn print_version() {
    println!("chassismond {}", VERSION);
}

struct Args {
    config: Option<PathBuf>,
    socket: Option<PathBuf>,
}

/// Parse arguments; `None` means the process should exit successfully
fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config: None,
        socket: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return None;
            }
            "-v" | "--version" => {
                print_version();
                return None;
            }
            flag @ ("-c" | "--config" | "-s" | "--socket") => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: {} requires a path argument", flag);
                    std::process::exit(1);
                }
                let value = PathBuf::from(&args[i]);
                if flag == "-c" || flag == "--config" {
                    parsed.config = Some(value);
                } else {
                    parsed.socket = Some(value);
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Some(parsed)
}

// ============================================================================
// Logging and configuration
// ============================================================================

/// journald when available, stdout otherwise. Returns whether journald is used.
fn init_logging(log_level: &str) -> bool {
    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

/// An explicit `--config` must exist; a missing default file means defaults
fn resolve_config(explicit: Option<&Path>) -> cm_core::Result<MonitorConfig> {
    let config = match explicit {
        Some(path) => load_config(path)?,
        None => {
            let path = Path::new(paths::CONFIG_FILE);
            if path.exists() {
                load_config(path)?
            } else {
                warn!("No config at {}, using defaults", path.display());
                MonitorConfig::default()
            }
        }
    };
    for name in &config.indicators {
        validate_led_name(name).map_err(|e| ChassisError::invalid_config("indicators", e.to_string()))?;
    }
    Ok(config)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(args) = parse_args() else {
        return Ok(());
    };

    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let use_journald = init_logging(&log_level);

    info!("STARTUP: chassismond {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });

    let mut config = match resolve_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Could not load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    set_secure_umask();

    if let Err(e) = write_pid_file() {
        error!("Could not write PID file: {}", e);
        std::process::exit(1);
    }

    let socket_path = config.socket_path.clone();
    let socket_path_clone = socket_path.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        SHUTDOWN.store(true, Ordering::SeqCst);
        cleanup(&socket_path_clone);
        info!("SHUTDOWN: Daemon terminated gracefully");
        std::process::exit(0);
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    info!("STARTUP: Socket path: {}", socket_path.display());
    info!("STARTUP: Platform socket: {}", config.platform_socket.display());
    info!("STARTUP: Indicators: {:?}", config.indicators);
    info!("STARTUP: PID: {}", std::process::id());

    let monitor = Monitor::new(config);

    let loop_monitor = monitor.clone();
    let reconcile = std::thread::Builder::new()
        .name("reconcile".to_string())
        .spawn(move || {
            let config = loop_monitor.config();
            let mut source = PlatformClient::new(&config.platform_socket);
            let mut leds = SysfsLeds::new(&config.led_base);
            loop_monitor.run(&mut source, &mut leds, &SHUTDOWN);
        });
    if let Err(e) = reconcile {
        error!("Could not start reconciliation thread: {}", e);
        cleanup(&socket_path);
        std::process::exit(1);
    }
    info!("Reconciliation loop started");

    let result = server::run_server(&socket_path, monitor).await;

    // The loop thread may be blocked on the event stream; it is not joined
    SHUTDOWN.store(true, Ordering::SeqCst);
    cleanup(&socket_path);

    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
