//! Frame feeds.
//!
//! A feed pushes `Frame` values produced by the perception pipeline to a
//! registered callback:
//! - Synthetic feed (`stub://` URLs): generated ward scene, for demos and tests
//! - Replay feed (local file path): JSON-lines recording, one frame per line
//! - Manual feed: frames pushed by the caller, delivered synchronously
//!
//! `start()` and `stop()` are idempotent. `stop()` never fails and returns
//! within one delivery tick. Feeds deliver in order; they never reorder or
//! deduplicate frames.

mod manual;
pub mod replay;
pub mod synthetic;
mod worker;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use manual::ManualFeed;
pub use replay::{ReplayConfig, ReplayFeed};
pub use synthetic::{SyntheticConfig, SyntheticFeed, SyntheticScene};

/// Receives each delivered frame, on the feed's delivery thread.
pub type FrameCallback = Box<dyn FnMut(Frame) + Send + 'static>;

/// Push-style frame source.
pub trait FrameFeed: Send {
    /// Source identifier for logs (URL or path).
    fn source(&self) -> &str;

    /// Register the frame callback, replacing any previous one.
    fn on_frame(&mut self, callback: FrameCallback);

    /// Begin delivery. No-op when already running.
    fn start(&mut self) -> Result<()>;

    /// Halt delivery. No-op when not running.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn stats(&self) -> FeedStats;
}

/// Statistics for a feed.
#[derive(Clone, Debug)]
pub struct FeedStats {
    pub frames_delivered: u64,
    pub source: String,
}

/// Open a feed for `url`: `stub://<name>` selects the synthetic feed, a local
/// path selects the replay feed. Other URL schemes are rejected.
pub fn open_feed(url: &str, target_fps: u32) -> Result<Box<dyn FrameFeed>> {
    if target_fps == 0 {
        return Err(anyhow!("feed target fps must be >= 1"));
    }
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticFeed::new(SyntheticConfig {
            url: url.to_string(),
            target_fps,
            seed: None,
        })));
    }
    if !is_local_file_path(url) {
        return Err(anyhow!(
            "feed url '{}' is neither stub:// nor a local recording path",
            url
        ));
    }
    Ok(Box::new(ReplayFeed::new(ReplayConfig {
        path: url.into(),
        target_fps,
        looping: false,
    })))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_feed_selects_backend_by_url() {
        let feed = open_feed("stub://ward_camera", 6).expect("synthetic feed");
        assert_eq!(feed.source(), "stub://ward_camera");
        assert!(!feed.is_running());

        let feed = open_feed("/var/lib/bedwatch/session.jsonl", 6).expect("replay feed");
        assert_eq!(feed.source(), "/var/lib/bedwatch/session.jsonl");
    }

    #[test]
    fn open_feed_rejects_remote_and_empty_urls() {
        assert!(open_feed("ws://pipeline:8765/frames", 6).is_err());
        assert!(open_feed("  ", 6).is_err());
        assert!(open_feed("stub://ward_camera", 0).is_err());
    }
}
