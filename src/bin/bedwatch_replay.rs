//! bedwatch_replay - offline session replay
//!
//! Feeds a JSON-lines recording through a session store as fast as it can be
//! read, then prints stream metrics, diagnostics and the event log. With
//! `--json` the final session snapshot is written instead.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use bedwatch_console::{
    feed::replay::load_recording, timeline, SessionConfig, SessionStore, BUFFER_DURATION_SECONDS,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a recorded session offline")]
struct Args {
    /// JSON-lines recording, one frame per line.
    recording: PathBuf,

    /// Recording frame rate, used to size the frame buffer.
    #[arg(long, default_value_t = 6)]
    fps: usize,

    /// Write the final session snapshot as JSON to this path ("-" for stdout).
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Pause at this buffer index after ingest (operator seek).
    #[arg(long, value_name = "INDEX", allow_hyphen_values = true)]
    seek: Option<i64>,

    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let recording = {
        let _stage = ui.stage("Load recording");
        load_recording(&args.recording)?
    };
    if recording.skipped_lines > 0 {
        log::warn!(
            "{} malformed lines skipped in {}",
            recording.skipped_lines,
            args.recording.display()
        );
    }

    let mut store = SessionStore::new(SessionConfig {
        buffer_capacity: BUFFER_DURATION_SECONDS.saturating_mul(args.fps.max(1)),
        ..SessionConfig::default()
    })?;
    {
        let stage = ui.counted_stage("Ingest frames", recording.frames.len() as u64);
        for frame in recording.frames {
            store.ingest(frame);
            stage.advance(1);
        }
    }

    if let Some(index) = args.seek {
        store.set_live(false);
        if !store.seek(index) {
            log::warn!(
                "seek to {} ignored ({} frames buffered)",
                index,
                store.frames().len()
            );
        }
    }

    match &args.json {
        Some(path) => write_snapshot(&store, path)?,
        None => print_report(&store),
    }
    Ok(())
}

fn write_snapshot(store: &SessionStore, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&store.snapshot())?;
    if path.as_os_str() == "-" {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{json}")?;
    } else {
        std::fs::write(path, json)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
    }
    Ok(())
}

fn print_report(store: &SessionStore) {
    let metrics = store.metrics();
    let diagnostics = store.diagnostics();
    let buffer = store.frames();
    println!("frames buffered:   {} / {}", buffer.len(), buffer.capacity());
    println!("fps:               {:.2}", metrics.fps);
    println!("dropped frames:    {}", metrics.dropped_frames);
    println!("avg confidence:    {:.2}", metrics.avg_confidence);
    println!("active detections: {}", metrics.active_detections);
    println!(
        "ingested={} partial={} evicted_frames={} evicted_events={}",
        diagnostics.ingested_frames,
        diagnostics.partial_frames,
        diagnostics.evicted_frames,
        diagnostics.evicted_events
    );
    if let Some(index) = store.current_frame_index() {
        println!(
            "view: paused at index {} (timeline {:.1}%)",
            index,
            timeline::position_of_index(index, buffer.capacity()) * 100.0
        );
    }

    let events = store.event_log();
    println!();
    println!("events ({}):", events.len());
    for line in events {
        println!(
            "  {:>13}  {:<8} {:<18} {}",
            line.timestamp,
            format!("{:?}", line.severity),
            line.name,
            line.details
        );
    }
}
