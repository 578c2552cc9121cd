//! taskgate - blocks distracting applications until your task list is done
//!
//! Runs a focus session: restricted applications are terminated while the
//! session is active, and the session ends by itself once every task in the
//! task snapshot file is complete.
//!
//! # Usage
//!
//! ```bash
//! # Start a focus session (foreground)
//! taskgate start --tasks ~/tasks.json
//!
//! # Start in the background
//! taskgate start -d
//!
//! # Stop the running session
//! taskgate stop
//!
//! # Check whether a session is running
//! taskgate status
//!
//! # Show the effective restriction list
//! taskgate apps
//!
//! # Enable debug logging
//! RUST_LOG=taskgate_engine=debug taskgate start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: end the session manually and exit

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use taskgate_engine::config::resolve_config_path;
use taskgate_engine::platform::{ProcessControl, SignalError, TerminationSignal};
use taskgate_engine::{
    read_tasks, spawn_controller, ControllerHandle, EngineConfig, FocusEvent, SystemProcessControl,
};

/// taskgate - complete tasks to earn access
#[derive(Parser, Debug)]
#[command(name = "taskgate", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a focus session
    Start {
        /// Run in the background (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Config file (defaults to $TASKGATE_CONFIG or the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Task snapshot file: a JSON array of tasks
        #[arg(long)]
        tasks: Option<PathBuf>,
    },
    /// Stop the running session
    Stop,
    /// Show whether a session is running
    Status,
    /// Print the effective restriction list
    Apps {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Runtime Files
// ============================================================================

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("taskgate")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("taskgate.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("taskgate.log")
}

fn default_tasks_path() -> PathBuf {
    state_dir().join("tasks.json")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// Returns the PID of a live instance, removing a stale PID file.
fn running_instance(control: &SystemProcessControl) -> Option<u32> {
    let pid = read_pid()?;
    if control.is_running(pid) {
        return Some(pid);
    }
    remove_pid_file();
    None
}

// ============================================================================
// Commands
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        tasks: None,
    });

    match command {
        Command::Start {
            daemon,
            config,
            tasks,
        } => start(daemon, config.as_deref(), tasks),
        Command::Stop => stop(),
        Command::Status => {
            let control = SystemProcessControl::new();
            if let Some(pid) = running_instance(&control) {
                println!("Focus session is running (PID {pid})");
                Ok(())
            } else {
                println!("No focus session is running.");
                process::exit(1);
            }
        }
        Command::Apps { config, json } => apps(config.as_deref(), json),
    }
}

fn start(daemon: bool, config_path: Option<&Path>, tasks: Option<PathBuf>) -> Result<()> {
    let control = SystemProcessControl::new();
    if let Some(pid) = running_instance(&control) {
        eprintln!("A focus session is already running (PID {pid})");
        eprintln!("Use 'taskgate stop' to end it first.");
        process::exit(1);
    }

    // Load before forking so config errors reach the terminal
    let config_path = resolve_config_path(config_path);
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let tasks_path = tasks.unwrap_or_else(default_tasks_path);

    if daemon {
        // Daemonize before starting tokio runtime
        daemonize()?;
    }

    write_pid()?;
    let result = run_session(config, tasks_path);
    remove_pid_file();

    result
}

fn stop() -> Result<()> {
    let control = SystemProcessControl::new();
    let Some(pid) = running_instance(&control) else {
        println!("No focus session is running.");
        return Ok(());
    };

    println!("Stopping focus session (PID {pid})...");
    match control.send_signal(pid, TerminationSignal::Graceful) {
        Ok(()) | Err(SignalError::NotFound(_)) => {}
        Err(e) => bail!("Failed to signal process {pid}: {e}"),
    }

    // Wait for process to exit (up to 5 seconds)
    for _ in 0..50 {
        if !control.is_running(pid) {
            println!("Focus session stopped.");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    eprintln!("Focus session did not stop within 5 seconds.");
    process::exit(1);
}

fn apps(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = EngineConfig::load_resolved(config_path).context("Failed to load config")?;
    let list = config.restriction_list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(list.apps())?);
        return Ok(());
    }

    for app in list.apps() {
        let enabled = if app.is_enabled { "x" } else { " " };
        let preset = if app.is_preset { " (preset)" } else { "" };
        println!(
            "[{enabled}] {:<24} {:<24} {}{preset}",
            app.id,
            app.name,
            app.match_key()
        );
    }
    Ok(())
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

// ============================================================================
// Session Runtime
// ============================================================================

#[tokio::main]
async fn run_session(config: EngineConfig, tasks_path: PathBuf) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("taskgate=info".parse()?)
                .add_directive("taskgate_engine=info".parse()?)
                .add_directive("taskgate_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        tasks = %tasks_path.display(),
        "taskgate starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let control: Arc<dyn ProcessControl> = Arc::new(SystemProcessControl::new());
    let handle = spawn_controller(&config, control)?;
    let mut events = handle.subscribe();

    handle.start_session().await?;

    let mut ticker = interval(config.task_poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                if let Some(session) = handle.stop_session().await? {
                    info!(duration_ms = session.duration_ms, "Focus session ended manually");
                }
                break;
            }

            event = events.recv() => match event {
                Ok(FocusEvent::SessionEnded(session)) => {
                    info!(
                        id = %session.id,
                        duration_ms = session.duration_ms,
                        tasks_completed = session.tasks_completed,
                        natural = session.was_unlocked_naturally,
                        "Focus session ended"
                    );
                    break;
                }
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            },

            _ = ticker.tick() => poll_tasks(&handle, &tasks_path).await?,
        }
    }

    let stats = handle.stats().await?;
    info!(
        sessions = stats.total_sessions,
        total_focus_time_ms = stats.total_focus_time_ms,
        "taskgate stopped"
    );
    handle.shutdown().await;
    Ok(())
}

/// Re-reads the task snapshot and refreshes the session clock.
async fn poll_tasks(handle: &ControllerHandle, tasks_path: &Path) -> Result<()> {
    match read_tasks(tasks_path) {
        Ok(Some(tasks)) => {
            handle.tasks_changed(tasks).await?;
        }
        Ok(None) => debug!(path = %tasks_path.display(), "No task file yet"),
        Err(e) => warn!(error = %e, "Failed to read tasks"),
    }

    let elapsed_ms = handle.tick().await?;
    debug!(elapsed_ms, "Session tick");
    Ok(())
}

fn log_event(event: &FocusEvent) {
    match event {
        FocusEvent::SessionStarted => info!("Focus session started"),
        FocusEvent::Notification(n) => info!(
            kind = %n.kind,
            completed = n.completed_tasks,
            total = n.total_tasks,
            "{}",
            n.message
        ),
        FocusEvent::ProcessDetected(p) => info!(process = %p, "Restricted app detected"),
        FocusEvent::ProcessTerminated(r) if r.success => {
            info!(pid = r.pid, process = %r.process_name, "Restricted app closed");
        }
        FocusEvent::ProcessTerminated(r) => warn!(
            pid = r.pid,
            process = %r.process_name,
            error = r.error.as_deref().unwrap_or("unknown"),
            "Failed to close restricted app"
        ),
        FocusEvent::SessionEnded(_) => debug!(event = event.label(), "Event"),
    }
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
