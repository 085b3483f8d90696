//! Recorded session replay.
//!
//! A recording is a JSON-lines file with one `Frame` per line, in the same
//! shape the perception pipeline emits. The replay feed reads it from local
//! disk only and delivers frames at the target rate, keeping the recorded
//! timestamps.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::worker::{Delivery, FeedWorker};
use super::{FeedStats, FrameCallback, FrameFeed};
use crate::frame::Frame;

/// Configuration for a replay feed.
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Local recording path.
    pub path: PathBuf,
    /// Delivery rate (frames per second).
    pub target_fps: u32,
    /// Restart from the first frame after the last one.
    pub looping: bool,
}

/// Parsed recording.
#[derive(Clone, Debug, Default)]
pub struct Recording {
    pub frames: Vec<Frame>,
    /// Lines that failed to parse and were skipped.
    pub skipped_lines: usize,
}

/// Parse a JSON-lines recording. Blank lines are ignored; malformed lines are
/// logged and skipped. Only I/O failures are errors.
pub fn parse_recording<R: BufRead>(reader: R) -> Result<Recording> {
    let mut recording = Recording::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read recording line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Frame>(trimmed) {
            Ok(frame) => recording.frames.push(frame),
            Err(err) => {
                recording.skipped_lines += 1;
                log::warn!("recording line {} skipped: {}", line_no + 1, err);
            }
        }
    }
    Ok(recording)
}

pub fn load_recording(path: &Path) -> Result<Recording> {
    let file = File::open(path)
        .map_err(|e| anyhow!("failed to open recording {}: {}", path.display(), e))?;
    parse_recording(BufReader::new(file))
}

/// Replay feed over a local recording.
pub struct ReplayFeed {
    config: ReplayConfig,
    source: String,
    delivery: Delivery,
    worker: Option<FeedWorker>,
}

impl ReplayFeed {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            source: config.path.display().to_string(),
            config,
            delivery: Delivery::default(),
            worker: None,
        }
    }
}

impl FrameFeed for ReplayFeed {
    fn source(&self) -> &str {
        &self.source
    }

    fn on_frame(&mut self, callback: FrameCallback) {
        self.delivery.set_callback(callback);
    }

    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let recording = load_recording(&self.config.path)?;
        if recording.frames.is_empty() {
            return Err(anyhow!("recording {} contains no frames", self.source));
        }
        log::info!(
            "ReplayFeed: {} frames from {} ({} lines skipped)",
            recording.frames.len(),
            self.source,
            recording.skipped_lines
        );

        let frames: Arc<[Frame]> = recording.frames.into();
        let period = Duration::from_millis(1000 / u64::from(self.config.target_fps.max(1)));
        let looping = self.config.looping;
        let delivery = self.delivery.clone();
        let mut cursor = 0usize;
        let worker = FeedWorker::spawn("replay", move || {
            if cursor >= frames.len() {
                if !looping {
                    return None;
                }
                cursor = 0;
            }
            delivery.deliver(frames[cursor].clone());
            cursor += 1;
            Some(period)
        })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            log::info!("ReplayFeed: stopped {}", self.source);
        }
    }

    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(FeedWorker::is_running)
    }

    fn stats(&self) -> FeedStats {
        FeedStats {
            frames_delivered: self.delivery.delivered(),
            source: self.source.clone(),
        }
    }
}
