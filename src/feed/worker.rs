use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::FrameCallback;
use crate::frame::Frame;

/// Longest uninterrupted sleep, bounding how long `stop()` waits.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Callback slot shared between a feed and its delivery thread.
#[derive(Clone, Default)]
pub(crate) struct Delivery {
    callback: Arc<Mutex<Option<FrameCallback>>>,
    delivered: Arc<AtomicU64>,
}

impl Delivery {
    pub(crate) fn set_callback(&self, callback: FrameCallback) {
        match self.callback.lock() {
            Ok(mut slot) => *slot = Some(callback),
            Err(poisoned) => *poisoned.into_inner() = Some(callback),
        }
    }

    pub(crate) fn has_callback(&self) -> bool {
        self.callback
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Hand `frame` to the callback. Returns false when none is registered.
    pub(crate) fn deliver(&self, frame: Frame) -> bool {
        let mut slot = match self.callback.lock() {
            Ok(slot) => slot,
            Err(_) => {
                log::warn!("frame callback lock poisoned; dropping frame");
                return false;
            }
        };
        let Some(callback) = slot.as_mut() else {
            return false;
        };
        callback(frame);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Background delivery thread driven by a tick closure.
///
/// The closure returns the delay before the next tick, or `None` when the
/// source is exhausted.
pub(crate) struct FeedWorker {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl FeedWorker {
    pub(crate) fn spawn<F>(name: &str, mut tick: F) -> Result<Self>
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name(format!("feed-{name}"))
            .spawn(move || {
                while !shutdown_thread.load(Ordering::SeqCst) {
                    match tick() {
                        Some(delay) => sleep_unless_stopped(delay, &shutdown_thread),
                        None => break,
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn feed thread: {}", e))?;
        Ok(Self {
            shutdown,
            join: Some(join),
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("feed thread panicked");
            }
        }
    }
}

impl Drop for FeedWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sleep_unless_stopped(delay: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + delay;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
