//! Session state store.
//!
//! `SessionStore` owns the rolling frame buffer, the live/seek view state, the
//! derived metrics and the capped event history. It is a plain single-threaded
//! value: the caller serializes access (see `runtime`), and readers borrow a
//! `SessionSnapshot` that cannot mutate anything.
//!
//! View state:
//! - Live: the current view follows the newest ingested frame.
//! - Seeking: the view is pinned to a buffered frame chosen by `seek`. Leaving
//!   live mode anchors the seek index on the newest frame without moving the view.
//!
//! Invalid seeks and partial frames are not errors. They are counted in
//! `Diagnostics` and logged at debug level.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::clip::{ClipRequest, ClipSink, NullClipSink};
use crate::event::{event_log_lines, EventLogLine};
use crate::frame::{
    Frame, FrameBuffer, InferenceSnapshot, Region, TrackerSnapshot, BUFFER_CAPACITY,
};
use crate::metrics::{Metrics, METRICS_WINDOW_FRAMES};
use crate::timeline::{self, TimelineSample};

/// Eventful tracker snapshots kept in the event history.
pub const EVENT_HISTORY_CAPACITY: usize = 50;

/// Largest accepted frame buffer: one hour at 60 fps.
pub const MAX_BUFFER_CAPACITY: usize = 60 * 60 * 60;

/// Largest accepted event history.
pub const MAX_EVENT_HISTORY_CAPACITY: usize = 10_000;

static NO_REGIONS: BTreeMap<String, Region> = BTreeMap::new();

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub buffer_capacity: usize,
    pub event_history_capacity: usize,
    pub metrics_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: BUFFER_CAPACITY,
            event_history_capacity: EVENT_HISTORY_CAPACITY,
            metrics_window: METRICS_WINDOW_FRAMES,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(anyhow!("buffer capacity must be greater than zero"));
        }
        if self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(anyhow!(
                "buffer capacity {} exceeds the maximum of {} frames",
                self.buffer_capacity,
                MAX_BUFFER_CAPACITY
            ));
        }
        if self.event_history_capacity == 0 {
            return Err(anyhow!("event history capacity must be greater than zero"));
        }
        if self.event_history_capacity > MAX_EVENT_HISTORY_CAPACITY {
            return Err(anyhow!(
                "event history capacity {} exceeds the maximum of {}",
                self.event_history_capacity,
                MAX_EVENT_HISTORY_CAPACITY
            ));
        }
        if self.metrics_window < 2 {
            return Err(anyhow!("metrics window must span at least two frames"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewMode {
    Live,
    /// `index` is `None` only when the buffer was empty on leaving live mode.
    Seeking { index: Option<usize> },
}

/// Counters for conditions the store absorbs instead of failing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub ingested_frames: u64,
    pub partial_frames: u64,
    pub rejected_seeks: u64,
    pub evicted_frames: u64,
    pub evicted_events: u64,
    pub clips_requested: u64,
    pub clip_failures: u64,
}

pub struct SessionStore {
    config: SessionConfig,
    buffer: FrameBuffer,
    event_history: VecDeque<Arc<TrackerSnapshot>>,
    mode: ViewMode,
    is_paused: bool,
    current: Option<Arc<Frame>>,
    metrics: Metrics,
    diagnostics: Diagnostics,
    clip_sink: Box<dyn ClipSink>,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: SessionConfig) -> Self {
        Self {
            buffer: FrameBuffer::with_capacity(config.buffer_capacity),
            event_history: VecDeque::with_capacity(
                config.event_history_capacity.min(EVENT_HISTORY_CAPACITY),
            ),
            config,
            mode: ViewMode::Live,
            is_paused: false,
            current: None,
            metrics: Metrics::default(),
            diagnostics: Diagnostics::default(),
            clip_sink: Box::new(NullClipSink),
        }
    }

    /// Replace the clip sink (defaults to `NullClipSink`).
    pub fn with_clip_sink<S: ClipSink + 'static>(mut self, sink: S) -> Self {
        self.clip_sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------------

    /// Append a frame, follow it when live, record its event, refresh metrics.
    pub fn ingest(&mut self, frame: impl Into<Arc<Frame>>) {
        let frame: Arc<Frame> = frame.into();
        self.diagnostics.ingested_frames += 1;

        if frame.is_partial() {
            self.diagnostics.partial_frames += 1;
            log::debug!(
                "partial frame at {} (inference={}, tracker={})",
                frame.timestamp,
                frame.inference.is_some(),
                frame.tracker.is_some()
            );
        }

        if self.buffer.push(frame.clone()).is_some() {
            self.diagnostics.evicted_frames += 1;
            // Keep the seek index on the same frame while it is still buffered.
            if let ViewMode::Seeking { index: Some(index) } = &mut self.mode {
                *index = index.saturating_sub(1);
            }
        }

        if self.is_live() {
            self.current = Some(frame.clone());
        }

        if let Some(tracker) = frame.tracker.as_ref().filter(|t| t.has_event()) {
            self.record_event(tracker.clone());
        }

        self.refresh_metrics();
    }

    fn record_event(&mut self, tracker: Arc<TrackerSnapshot>) {
        while self.event_history.len() >= self.config.event_history_capacity {
            self.event_history.pop_front();
            self.diagnostics.evicted_events += 1;
        }
        log::info!(
            "tracker event {} at {}",
            tracker.event_name().unwrap_or_default(),
            tracker.timestamp
        );
        self.event_history.push_back(tracker);
    }

    fn refresh_metrics(&mut self) {
        let Some(latest) = self.buffer.latest() else {
            return;
        };
        if let Some(metrics) =
            Metrics::from_window(self.buffer.tail(self.config.metrics_window), latest)
        {
            self.metrics = metrics;
        }
    }

    // ------------------------------------------------------------------------
    // Operator commands
    // ------------------------------------------------------------------------

    /// Enter or leave live mode. Both transitions clear the pause flag.
    pub fn set_live(&mut self, enabled: bool) {
        if enabled == self.is_live() {
            return;
        }
        self.is_paused = false;
        if enabled {
            self.mode = ViewMode::Live;
            self.current = self.buffer.latest().cloned();
            log::info!("view: live ({} frames buffered)", self.buffer.len());
        } else {
            let anchor = self.buffer.len().checked_sub(1);
            self.mode = ViewMode::Seeking { index: anchor };
            log::info!("view: paused at index {:?}", anchor);
        }
    }

    pub fn toggle_live(&mut self) {
        self.set_live(!self.is_live());
    }

    /// Flip the pause flag. The view is unaffected.
    pub fn toggle_pause(&mut self) {
        self.is_paused = !self.is_paused;
    }

    /// Pin the view to `buffer[index]`. Ignored while live or out of range.
    pub fn seek(&mut self, index: i64) -> bool {
        if self.is_live() {
            return self.reject_seek(index, "view is live");
        }
        let target = usize::try_from(index)
            .ok()
            .and_then(|i| self.buffer.get(i).map(|frame| (i, frame.clone())));
        let Some((slot, frame)) = target else {
            return self.reject_seek(index, "index out of range");
        };
        self.mode = ViewMode::Seeking { index: Some(slot) };
        self.current = Some(frame);
        true
    }

    fn reject_seek(&mut self, index: i64, reason: &str) -> bool {
        self.diagnostics.rejected_seeks += 1;
        log::debug!(
            "seek to {} ignored: {} ({} frames buffered)",
            index,
            reason,
            self.buffer.len()
        );
        false
    }

    /// Hand the current buffer window to the clip sink.
    pub fn create_clip(&mut self) -> ClipRequest {
        let frames = self.buffer.to_vec();
        let request = ClipRequest::for_frames(&frames);
        self.diagnostics.clips_requested += 1;
        if let Err(err) = self.clip_sink.export(&request, &frames) {
            self.diagnostics.clip_failures += 1;
            log::warn!("clip export via {} failed: {}", self.clip_sink.name(), err);
        }
        request
    }

    // ------------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------------

    pub fn is_live(&self) -> bool {
        self.mode == ViewMode::Live
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Seek index; `None` while live.
    pub fn current_frame_index(&self) -> Option<usize> {
        match self.mode {
            ViewMode::Live => None,
            ViewMode::Seeking { index } => index,
        }
    }

    pub fn current_frame(&self) -> Option<&Arc<Frame>> {
        self.current.as_ref()
    }

    pub fn current_inference(&self) -> Option<&InferenceSnapshot> {
        self.current.as_deref().and_then(|f| f.inference.as_deref())
    }

    pub fn current_tracker(&self) -> Option<&TrackerSnapshot> {
        self.current.as_deref().and_then(|f| f.tracker.as_deref())
    }

    /// Regions of the current view; empty without a tracker snapshot.
    pub fn regions(&self) -> &BTreeMap<String, Region> {
        self.current_tracker()
            .map(|t| &t.regions)
            .unwrap_or(&NO_REGIONS)
    }

    pub fn frames(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn event_history(&self) -> impl DoubleEndedIterator<Item = &TrackerSnapshot> + '_ {
        self.event_history.iter().map(|t| t.as_ref())
    }

    pub fn event_history_len(&self) -> usize {
        self.event_history.len()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn event_log(&self) -> Vec<EventLogLine> {
        event_log_lines(self.event_history())
    }

    pub fn timeline(&self) -> Vec<TimelineSample> {
        timeline::samples(&self.buffer)
    }

    pub fn snapshot(&self) -> SessionSnapshot<'_> {
        SessionSnapshot {
            current_frame: self.current.as_deref(),
            current_inference: self.current_inference(),
            current_tracker: self.current_tracker(),
            regions: self.regions(),
            frame_buffer: &self.buffer,
            event_history: &self.event_history,
            metrics: self.metrics,
            is_live: self.is_live(),
            is_paused: self.is_paused,
            current_frame_index: self.current_frame_index(),
            diagnostics: self.diagnostics,
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_valid_config(SessionConfig::default())
    }
}

/// Read-only view of the store for rendering.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot<'a> {
    pub current_frame: Option<&'a Frame>,
    pub current_inference: Option<&'a InferenceSnapshot>,
    pub current_tracker: Option<&'a TrackerSnapshot>,
    pub regions: &'a BTreeMap<String, Region>,
    pub frame_buffer: &'a FrameBuffer,
    pub event_history: &'a VecDeque<Arc<TrackerSnapshot>>,
    pub metrics: Metrics,
    pub is_live: bool,
    pub is_paused: bool,
    pub current_frame_index: Option<usize>,
    pub diagnostics: Diagnostics,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BBox, Detection};
    use std::sync::Mutex;

    fn frame_with(ts: u64, confidences: &[f64], event: Option<&str>) -> Frame {
        let detections = confidences
            .iter()
            .map(|c| Detection {
                person_id: 1,
                bbox: BBox::new(10.0, 10.0, 100.0, 200.0),
                keypoints: None,
                confidence: *c,
                imov: None,
            })
            .collect();
        Frame::new(
            ts,
            Some(InferenceSnapshot {
                timestamp: ts,
                frame_id: ts as i64,
                detections,
            }),
            Some(TrackerSnapshot {
                timestamp: ts,
                event: event.map(str::to_string),
                ..TrackerSnapshot::default()
            }),
        )
    }

    fn small_store() -> SessionStore {
        SessionStore::new(SessionConfig {
            buffer_capacity: 5,
            event_history_capacity: 2,
            metrics_window: 3,
        })
        .expect("valid config")
    }

    #[test]
    fn config_rejects_degenerate_values() {
        let mut cfg = SessionConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.metrics_window = 1;
        assert!(cfg.validate().is_err());
        cfg.metrics_window = 30;
        cfg.buffer_capacity = 0;
        assert!(SessionStore::new(cfg.clone()).is_err());
        cfg.buffer_capacity = usize::MAX;
        assert!(SessionStore::new(cfg.clone()).is_err());
        cfg.buffer_capacity = MAX_BUFFER_CAPACITY;
        cfg.event_history_capacity = MAX_EVENT_HISTORY_CAPACITY + 1;
        assert!(SessionStore::new(cfg.clone()).is_err());
        cfg.event_history_capacity = MAX_EVENT_HISTORY_CAPACITY;
        assert!(SessionStore::new(cfg).is_ok());
    }

    #[test]
    fn whitespace_event_name_is_recorded() {
        let mut store = small_store();
        store.ingest(frame_with(0, &[], Some(" ")));
        store.ingest(frame_with(1, &[], Some("")));
        assert_eq!(store.event_history_len(), 1);
        assert_eq!(store.event_log()[0].name, " ");
    }

    #[test]
    fn empty_store_starts_live_with_no_view() {
        let store = SessionStore::default();
        assert!(store.is_live());
        assert!(!store.is_paused());
        assert!(store.current_frame().is_none());
        assert!(store.regions().is_empty());
        assert_eq!(store.metrics(), Metrics::default());
    }

    #[test]
    fn leaving_live_on_empty_buffer_has_no_anchor() {
        let mut store = small_store();
        store.set_live(false);
        assert_eq!(store.mode(), ViewMode::Seeking { index: None });
        assert!(!store.seek(0));
        store.ingest(frame_with(0, &[], None));
        assert_eq!(store.current_frame_index(), None);
        assert!(store.current_frame().is_none());
        assert!(store.seek(0));
        assert_eq!(store.current_frame().unwrap().timestamp, 0);
    }

    #[test]
    fn seek_index_follows_frame_across_eviction() {
        let mut store = small_store();
        for ts in 0..5 {
            store.ingest(frame_with(ts, &[0.5], None));
        }
        store.set_live(false);
        assert!(store.seek(2));
        store.ingest(frame_with(5, &[0.5], None));
        assert_eq!(store.current_frame_index(), Some(1));
        assert_eq!(store.frames().get(1).unwrap().timestamp, 2);
        assert_eq!(store.current_frame().unwrap().timestamp, 2);
        assert_eq!(store.diagnostics().evicted_frames, 1);
    }

    #[test]
    fn event_history_is_capped() {
        let mut store = small_store();
        store.ingest(frame_with(0, &[], Some("bed_entry")));
        store.ingest(frame_with(1, &[], Some("door_crossed")));
        store.ingest(frame_with(2, &[], Some("bed_exit")));
        let names: Vec<_> = store
            .event_history()
            .filter_map(|t| t.event_name().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["door_crossed", "bed_exit"]);
        assert_eq!(store.diagnostics().evicted_events, 1);
        assert_eq!(store.event_log()[0].name, "bed_exit");
    }

    #[test]
    fn set_live_clears_pause_and_snaps_to_tail() {
        let mut store = small_store();
        for ts in 0..3 {
            store.ingest(frame_with(ts, &[0.5], None));
        }
        store.set_live(false);
        store.toggle_pause();
        assert!(store.is_paused());
        assert!(store.seek(0));
        store.ingest(frame_with(3, &[0.5], None));

        store.set_live(true);
        assert!(!store.is_paused());
        assert_eq!(store.current_frame_index(), None);
        assert_eq!(store.current_frame().unwrap().timestamp, 3);
    }

    #[test]
    fn toggle_pause_does_not_move_view() {
        let mut store = small_store();
        store.ingest(frame_with(0, &[0.5], None));
        store.toggle_pause();
        assert!(store.is_paused());
        assert!(store.is_live());
        store.ingest(frame_with(1, &[0.5], None));
        assert_eq!(store.current_frame().unwrap().timestamp, 1);
        store.toggle_pause();
        assert!(!store.is_paused());
    }

    #[test]
    fn rejected_seeks_are_counted() {
        let mut store = small_store();
        store.ingest(frame_with(0, &[0.5], None));
        assert!(!store.seek(0));
        store.set_live(false);
        assert!(!store.seek(-1));
        assert!(!store.seek(1));
        assert_eq!(store.diagnostics().rejected_seeks, 3);
    }

    struct RecordingSink(Arc<Mutex<Vec<ClipRequest>>>);

    impl ClipSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn export(&mut self, request: &ClipRequest, frames: &[Arc<Frame>]) -> Result<()> {
            assert_eq!(request.frame_count, frames.len());
            self.0.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl ClipSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn export(&mut self, _request: &ClipRequest, _frames: &[Arc<Frame>]) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    #[test]
    fn create_clip_hands_buffer_to_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut store = small_store().with_clip_sink(RecordingSink(seen.clone()));
        for ts in [1000, 1150, 1300] {
            store.ingest(frame_with(ts, &[0.5], None));
        }
        let request = store.create_clip();
        assert_eq!(request.frame_count, 3);
        assert_eq!(seen.lock().unwrap().as_slice(), &[request]);
        assert_eq!(store.diagnostics().clips_requested, 1);
    }

    #[test]
    fn failing_clip_sink_is_absorbed() {
        let mut store = small_store().with_clip_sink(FailingSink);
        store.ingest(frame_with(0, &[0.5], None));
        let request = store.create_clip();
        assert_eq!(request.frame_count, 1);
        assert_eq!(store.diagnostics().clip_failures, 1);
    }

    #[test]
    fn snapshot_serializes_contract_fields() {
        let mut store = small_store();
        store.ingest(frame_with(0, &[0.5], Some("bed_exit")));
        store.ingest(frame_with(150, &[0.7], None));
        let value = serde_json::to_value(store.snapshot()).expect("serialize");
        for key in [
            "current_frame",
            "current_inference",
            "current_tracker",
            "regions",
            "frame_buffer",
            "event_history",
            "metrics",
            "is_live",
            "is_paused",
            "current_frame_index",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["frame_buffer"].as_array().unwrap().len(), 2);
        assert_eq!(value["event_history"][0]["event"], "bed_exit");
        assert_eq!(value["is_live"], true);
    }
}
