use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use mention_watch::config::{self, Config};
use mention_watch::notification::{TelegramChannel, notification_queue};
use mention_watch::watcher::{PlatformMonitorFactory, Supervisor, SupervisorConfig};
use mention_watch::{logging, panic_hook, setup};

/// Interval between status lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Watch Twitch and YouTube live chats for mentions and forward them to Telegram.
#[derive(Parser, Debug)]
#[command(name = "mention-watch", version, about)]
struct Args {
    /// Env file to load settings from
    #[arg(long, env = "MENTION_WATCH_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Never run the interactive setup
    #[arg(long)]
    no_setup: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Errors before logging starts would otherwise go unseen.
            if tracing::dispatcher::has_been_set() {
                error!("{:#}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    if setup::should_run(&args.env_file, args.no_setup) {
        setup::run_interactive_setup(&args.env_file).context("interactive setup failed")?;
    }
    config::load_env_file(&args.env_file)?;

    let log_dir = std::env::var_os(config::ENV_LOG_DIR).map(PathBuf::from);
    let _log_guard = logging::init_logging(args.verbose, log_dir.as_deref())?;
    panic_hook::install();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        username = %config.watched_username,
        sources = config.sources.len(),
        log_dir = ?config.log_dir,
        "Starting mention watcher"
    );
    for source in &config.sources {
        info!(source = %source, "Watching");
    }

    let channel = TelegramChannel::new(config.telegram.clone())?;
    let (sink, worker) = notification_queue(Arc::new(channel), config.send_spacing);

    let factory = PlatformMonitorFactory::from_config(&config)?;
    let supervisor = Supervisor::start(
        config.sources.clone(),
        SupervisorConfig::from(&config),
        Arc::new(factory),
        sink.clone(),
    );

    let mut status_timer = tokio::time::interval(STATUS_INTERVAL);
    status_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    status_timer.tick().await;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = status_timer.tick() => {
                match supervisor.status().await {
                    Some(status) => info!(
                        active = status.active,
                        restarting = status.restarting,
                        restarts = status.total_restarts,
                        queued = sink.queue_depth(),
                        "Status: {} monitors active",
                        status.active
                    ),
                    None => warn!("Supervisor is not responding"),
                }
            }
        }
    }

    info!("Shutting down");
    supervisor.stop().await;
    worker.shutdown(config.shutdown_timeout).await;
    info!("Goodbye");
    Ok(())
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
