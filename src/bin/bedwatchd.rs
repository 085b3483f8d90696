//! bedwatchd - bedside monitoring console daemon
//!
//! This daemon:
//! 1. Loads layered configuration (file, defaults, BEDWATCH_* env)
//! 2. Opens the configured frame feed (stub:// synthetic or a local recording)
//! 3. Runs the session runtime that owns the frame buffer and view state
//! 4. Serves the loopback control API
//! 5. Logs feed and stream health until Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use bedwatch_console::{
    api::{ApiConfig, ApiServer},
    bind_feed,
    config::ConsoleConfig,
    open_feed, SessionRuntime, SessionStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Bedside monitoring console daemon")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "BEDWATCH_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seconds between health log lines.
    #[arg(long, default_value_t = 5, value_name = "SECS")]
    health_interval: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ConsoleConfig::load_from(args.config.as_deref())?;
    let session_cfg = config.session_config();
    log::info!(
        "frame buffer capacity: {} frames ({} s at {} fps), event history: {}",
        session_cfg.buffer_capacity,
        config.buffer_secs,
        config.target_fps,
        session_cfg.event_history_capacity
    );

    let store = SessionStore::new(session_cfg)?;
    let (runtime, session) = SessionRuntime::new(store);
    let runtime_join = runtime.spawn()?;

    let mut feed = open_feed(&config.feed_url, config.target_fps)?;
    bind_feed(feed.as_mut(), session.clone());
    feed.start()?;

    let api_handle = ApiServer::new(
        ApiConfig {
            addr: config.api_addr.clone(),
        },
        session.clone(),
    )
    .spawn()?;
    log::info!(
        "bedwatchd running. feed={} api=http://{}",
        feed.source(),
        api_handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let health_interval = Duration::from_secs(args.health_interval.max(1));
    loop {
        match rx.recv_timeout(health_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let stats = feed.stats();
        match session.metrics() {
            Ok(metrics) => log::info!(
                "feed running={} frames={} source={} fps={:.2} dropped={} avg_conf={:.2} active={}",
                feed.is_running(),
                stats.frames_delivered,
                stats.source,
                metrics.fps,
                metrics.dropped_frames,
                metrics.avg_confidence,
                metrics.active_detections
            ),
            Err(err) => {
                log::error!("session runtime unavailable: {}", err);
                break;
            }
        }
    }

    log::info!("shutdown signal received, stopping feed and control api...");
    feed.stop();
    api_handle.stop()?;
    // The runtime may already be gone if it stopped on its own.
    let _ = session.shutdown();
    let store = runtime_join
        .join()
        .map_err(|_| anyhow!("session runtime thread panicked"))?;
    let diagnostics = store.diagnostics();
    log::info!(
        "session closed: {} frames ingested ({} partial), {} events kept, {} seeks rejected",
        diagnostics.ingested_frames,
        diagnostics.partial_frames,
        store.event_history_len(),
        diagnostics.rejected_seeks
    );
    Ok(())
}
