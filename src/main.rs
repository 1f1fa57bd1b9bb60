//! nudged - session keep-alive daemon.
//!
//! Keeps the session from idling out by nudging the cursor or tapping a key on
//! a schedule, pausing whenever a human is at the controls.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use nudged::backend::InputBackend;
use nudged::backend::X11Backend;
use nudged::config::Config;
use nudged::movement::DryRunExecutor;
use nudged::movement::MovementExecutor;
use nudged::movement::Mover;
use nudged::scheduler::Scheduler;
use nudged::watcher::ActivityWatcher;
use nudged::watcher::DEFAULT_SAMPLE_INTERVAL;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Session keep-alive daemon.
///
/// Periodically nudges the cursor or taps a key, and pauses while you use the machine.
#[derive(Parser, Debug)]
#[command(name = "nudged")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted.
    Start {
        /// Log actions instead of injecting input.
        ///
        /// The cursor is still sampled to detect user activity, so an X11
        /// display is required either way.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage the configuration file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a commented default configuration file.
    Create {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration.
    Show,

    /// Print one value by dotted path, e.g. `behavior.idle_timeout_seconds`.
    Get {
        /// Dotted path of the value.
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Start { dry_run } => start(args.config.as_deref(), &args.log_level, dry_run).await,
        Command::Config(command) => run_config_command(command, args.config.as_deref()),
    }
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("nudged={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Validate configuration, wire the components and run until a signal arrives.
async fn start(config_path: Option<&Path>, log_level: &str, dry_run: bool) -> Result<()> {
    let config = Config::load_or_default(config_path).context("Failed to load configuration")?;

    let level = if config.debug && log_level == "info" {
        "debug"
    } else {
        log_level
    };
    init_logging(level)?;

    info!("nudged v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e).context("Invalid configuration");
    }

    info!(
        "Configuration loaded ({} activities, dry_run={})",
        config.activities.len(),
        dry_run
    );
    if config.behavior.start_on_boot {
        info!("start_on_boot is set; enable the nudged user service to launch it at login");
    }

    let backend: Arc<dyn InputBackend> = match X11Backend::connect() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            // Only configuration problems make `start` fail.
            error!("X11 display not available: {}", e);
            for diag in X11Backend::get_diagnostics() {
                error!("  {}", diag);
            }
            error!("Nothing to watch without a display, exiting");
            return Ok(());
        }
    };
    for diag in X11Backend::get_diagnostics() {
        debug!("{}", diag);
    }

    let watcher = Arc::new(ActivityWatcher::new(backend.clone(), DEFAULT_SAMPLE_INTERVAL));
    let executor: Arc<dyn MovementExecutor> = if dry_run {
        Arc::new(DryRunExecutor)
    } else {
        Arc::new(Mover::new(backend))
    };

    let scheduler = Scheduler::new(config.behavior, config.activities, watcher, executor)
        .context("Invalid configuration")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    scheduler.run(shutdown).await;

    info!("nudged stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    () = wait_for_ctrl_c() => {}
                    _ = terminate.recv() => info!("Received terminate signal"),
                }
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    shutdown.cancel();
}

/// Wait for SIGINT. If no handler can be installed, wait forever instead of
/// shutting down right away.
async fn wait_for_ctrl_c() {
    wait_for_interrupt(tokio::signal::ctrl_c()).await;
}

async fn wait_for_interrupt(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => info!("Received interrupt signal"),
        Err(e) => {
            error!("Failed to listen for interrupt signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Handle `nudged config ...`.
fn run_config_command(command: ConfigCommand, config_path: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommand::Create { force } => {
            let path = match config_path {
                Some(p) => p.to_path_buf(),
                None => Config::default_path().context("Could not determine config directory")?,
            };
            Config::write_default(&path, force)?;
            println!("Configuration file created at: {}", path.display());
        }
        ConfigCommand::Show => {
            let config =
                Config::load_or_default(config_path).context("Failed to load configuration")?;
            print!("{}", config.to_toml_string()?);
        }
        ConfigCommand::Get { key } => {
            let config =
                Config::load_or_default(config_path).context("Failed to load configuration")?;
            match config.get(&key)? {
                Some(value) => println!("{key} = {value}"),
                None => anyhow::bail!("Configuration parameter '{key}' not found"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_returns_on_signal() {
        tokio::time::timeout(Duration::from_secs(1), wait_for_interrupt(async { Ok(()) }))
            .await
            .expect("a delivered signal should end the wait");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_interrupt_handler_never_shuts_down() {
        let failed = async { Err(std::io::Error::other("no signal support")) };
        let waited = tokio::time::timeout(Duration::from_secs(3600), wait_for_interrupt(failed)).await;
        assert!(waited.is_err());
    }
}
