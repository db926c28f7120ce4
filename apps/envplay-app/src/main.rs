//! envplay command-line player.
//!
//! Provides two modes of operation:
//! - `config`: Load and validate a play configuration, then print it
//! - `play`: Connect to a TCP environment server and play one episode headless

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use envplay_core::prelude::*;
use envplay_gym::tcp;
use envplay_session::prelude::*;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Interactive player for remote turn-based environments.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the effective settings.
    Config {
        /// Path to a TOML configuration file.
        path: PathBuf,
    },

    /// Connect to an environment server and play until the episode ends.
    Play {
        /// Server address (e.g. 127.0.0.1:9876).
        #[arg(short, long, default_value = "127.0.0.1:9876")]
        addr: String,

        /// Path to a TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop after this many steps.
        #[arg(short, long)]
        steps: Option<u64>,
    },
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Headless sink: logs frames and scores, and signals when the step limit
/// is reached.
struct LogSink {
    steps: AtomicU64,
    limit: Option<u64>,
    limit_reached: Notify,
}

impl LogSink {
    fn new(limit: Option<u64>) -> Self {
        Self {
            steps: AtomicU64::new(0),
            limit,
            limit_reached: Notify::new(),
        }
    }
}

impl RenderSink for LogSink {
    fn on_observation(&self, observation: &Observation) {
        info!(bytes = observation.len(), "observation");
    }

    fn on_reward(&self, cumulative: f64) {
        let step = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
        info!(step, cumulative, "reward");
        if self.limit == Some(step) {
            self.limit_reached.notify_one();
        }
    }

    fn on_done(&self) {
        info!("episode done");
    }

    fn on_error(&self, error: &SessionError) {
        warn!(%error, "session error");
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<PlayConfig, EnvplayError> {
    let config = match path {
        Some(path) => PlayConfig::from_file(path)?,
        None => PlayConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_config(path: &Path) -> Result<ExitCode, EnvplayError> {
    let config = load_config(Some(path))?;
    println!("env_name    = {:?}", config.env_name);
    println!("interval_ms = {}", config.interval_ms);
    println!("width       = {}", config.width);
    println!("height      = {}", config.height);
    println!("filter      = {:?}", config.filter);
    Ok(ExitCode::SUCCESS)
}

async fn run_play(
    addr: &str,
    config: Option<&Path>,
    steps: Option<u64>,
) -> Result<ExitCode, EnvplayError> {
    let config = load_config(config)?;
    let sink = Arc::new(LogSink::new(steps));
    let session = Session::new(config, Arc::clone(&sink) as Arc<dyn RenderSink>);
    info!(
        env = %session.config().env_name,
        interval_ms = session.config().interval_ms,
        "starting session"
    );
    session.establish(tcp::connect(addr)).await?;

    let mut states = session.subscribe();
    session.reset()?;
    loop {
        let state = *states.borrow_and_update();
        match state {
            SessionState::Paused => session.play()?,
            SessionState::Done | SessionState::NeedsReset => break,
            SessionState::Error => {
                if let Some(err) = session.last_error() {
                    eprintln!("session failed: {err}");
                }
                return Ok(ExitCode::FAILURE);
            }
            SessionState::Initializing | SessionState::Resetting | SessionState::Playing => {}
        }
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            () = sink.limit_reached.notified() => {
                info!("step limit reached");
                if let Err(e) = session.pause() {
                    warn!(error = %e, "could not pause at step limit");
                }
                break;
            }
        }
    }

    println!(
        "steps={}, reward={:.3}",
        sink.steps.load(Ordering::Relaxed),
        session.total_reward()
    );
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("envplay=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { path } => run_config(&path),
        Commands::Play {
            addr,
            config,
            steps,
        } => run_play(&addr, config.as_deref(), steps).await,
    };

    result.unwrap_or_else(|e| {
        eprintln!("error: {e}");
        ExitCode::FAILURE
    })
}
