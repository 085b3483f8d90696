use anyhow::Result;

use super::worker::Delivery;
use super::{FeedStats, FrameCallback, FrameFeed};
use crate::frame::Frame;

/// Feed driven by the caller: `push` delivers synchronously while running.
///
/// Used as a deterministic stand-in for the perception pipeline.
pub struct ManualFeed {
    name: String,
    delivery: Delivery,
    running: bool,
}

impl ManualFeed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivery: Delivery::default(),
            running: false,
        }
    }

    /// Deliver `frame` now. Returns false when stopped or without a callback.
    pub fn push(&self, frame: Frame) -> bool {
        if !self.running {
            log::debug!("ManualFeed {}: frame dropped while stopped", self.name);
            return false;
        }
        self.delivery.deliver(frame)
    }
}

impl FrameFeed for ManualFeed {
    fn source(&self) -> &str {
        &self.name
    }

    fn on_frame(&mut self, callback: FrameCallback) {
        self.delivery.set_callback(callback);
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn stats(&self) -> FeedStats {
        FeedStats {
            frames_delivered: self.delivery.delivered(),
            source: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn push_delivers_only_while_running() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut feed = ManualFeed::new("manual://test");
        feed.on_frame(Box::new(move |frame| sink.lock().unwrap().push(frame.timestamp)));

        assert!(!feed.push(Frame::new(1, None, None)));
        feed.start().unwrap();
        assert!(feed.push(Frame::new(2, None, None)));
        feed.stop();
        feed.stop();
        assert!(!feed.push(Frame::new(3, None, None)));

        assert_eq!(*seen.lock().unwrap(), vec![2]);
        assert_eq!(feed.stats().frames_delivered, 1);
    }
}
