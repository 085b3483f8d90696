//! Frame data model and the rolling frame buffer.
//!
//! - `Frame`: one timestamped sample pairing an inference snapshot with a tracker snapshot.
//! - `InferenceSnapshot` / `TrackerSnapshot`: raw detections and smoothed tracks, as produced
//!   by the upstream perception pipeline. Either may be missing from a frame.
//! - `FrameBuffer`: bounded FIFO ring holding the most recent frames.
//!
//! Frames are immutable once built and are shared as `Arc<Frame>`, so the buffer, the
//! current view and the event history can all hold the same sample without copying it.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::event::TrackerEvent;

/// Seconds of history kept in the frame buffer.
pub const BUFFER_DURATION_SECONDS: usize = 120;

/// Nominal delivery rate of the perception pipeline.
pub const TARGET_FPS: usize = 6;

/// Frame buffer capacity. At 6 fps, 120 seconds = 720 frames.
pub const BUFFER_CAPACITY: usize = BUFFER_DURATION_SECONDS * TARGET_FPS;

// ----------------------------------------------------------------------------
// Geometry
// ----------------------------------------------------------------------------

/// Axis-aligned box in source pixel coordinates. Serialized as `[x, y, w, h]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

impl From<[f64; 4]> for BBox {
    fn from([x, y, w, h]: [f64; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

/// Skeletal landmark estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
    pub conf: f64,
}

// ----------------------------------------------------------------------------
// Inference / tracker snapshots
// ----------------------------------------------------------------------------

/// One raw, unsmoothed person detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub person_id: i64,
    pub bbox: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<Keypoint>>,
    pub confidence: f64,
    /// Immobility score reported by the detector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imov: Option<f64>,
}

/// One temporally smoothed identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub person_id: i64,
    pub bbox_smoothed: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<Keypoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
}

/// Named spatial zone (bed, door, ...) with occupancy state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub occupied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<[f64; 2]>>,
}

/// Drawable outline of a region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegionShape<'a> {
    Polygon(&'a [[f64; 2]]),
    Rect(BBox),
}

/// Fewest polygon vertices that win over the bbox.
const MIN_POLYGON_POINTS: usize = 4;

impl Region {
    /// Resolve the outline to draw. A polygon of at least four points takes
    /// precedence over the bbox.
    pub fn shape(&self) -> Option<RegionShape<'_>> {
        match (&self.keypoints, self.bbox) {
            (Some(points), _) if points.len() >= MIN_POLYGON_POINTS => {
                Some(RegionShape::Polygon(points.as_slice()))
            }
            (_, Some(bbox)) => Some(RegionShape::Rect(bbox)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceSnapshot {
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub frame_id: i64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Epoch milliseconds.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub regions: BTreeMap<String, Region>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl TrackerSnapshot {
    /// Event name, if one is set and non-empty.
    pub fn event_name(&self) -> Option<&str> {
        self.event.as_deref().filter(|name| !name.is_empty())
    }

    pub fn has_event(&self) -> bool {
        self.event_name().is_some()
    }

    /// Typed view of `event` + `event_payload`.
    pub fn typed_event(&self) -> Option<TrackerEvent> {
        self.event_name()
            .map(|name| TrackerEvent::from_parts(name, self.event_payload.as_ref()))
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Atomic unit appended to the buffer. Either snapshot may be absent (dropped frame).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Epoch milliseconds.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference: Option<Arc<InferenceSnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<Arc<TrackerSnapshot>>,
}

impl Frame {
    pub fn new(
        timestamp: u64,
        inference: Option<InferenceSnapshot>,
        tracker: Option<TrackerSnapshot>,
    ) -> Self {
        Self {
            timestamp,
            inference: inference.map(Arc::new),
            tracker: tracker.map(Arc::new),
        }
    }

    /// Detections of this frame; empty when inference is missing.
    pub fn detections(&self) -> &[Detection] {
        self.inference
            .as_deref()
            .map(|inf| inf.detections.as_slice())
            .unwrap_or(&[])
    }

    pub fn detection_count(&self) -> usize {
        self.detections().len()
    }

    /// True when inference or tracker output is missing.
    pub fn is_partial(&self) -> bool {
        self.inference.is_none() || self.tracker.is_none()
    }

    /// Frame id from the inference snapshot, when present.
    pub fn frame_id(&self) -> Option<i64> {
        self.inference.as_deref().map(|inf| inf.frame_id)
    }
}

// ----------------------------------------------------------------------------
// FrameBuffer: bounded ring buffer of recent frames
// ----------------------------------------------------------------------------

/// Bounded ring buffer of frames in arrival order.
///
/// Pushing past capacity evicts the oldest frame. Frames are never reordered
/// or deduplicated.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: VecDeque<Arc<Frame>>,
    max_frames: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    /// Buffer holding at most `max_frames` frames (minimum one).
    ///
    /// Storage grows on demand past the default capacity.
    pub fn with_capacity(max_frames: usize) -> Self {
        let max_frames = max_frames.max(1);
        Self {
            buffer: VecDeque::with_capacity(max_frames.min(BUFFER_CAPACITY)),
            max_frames,
        }
    }

    /// Push a frame. Returns the evicted frame, if the buffer was full.
    pub fn push(&mut self, frame: Arc<Frame>) -> Option<Arc<Frame>> {
        let evicted = if self.buffer.len() >= self.max_frames {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(frame);
        evicted
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Frame>> {
        self.buffer.get(index)
    }

    /// Most recent frame.
    pub fn latest(&self) -> Option<&Arc<Frame>> {
        self.buffer.back()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_frames
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<Frame>> + ExactSizeIterator + '_ {
        self.buffer.iter()
    }

    /// The newest `n` frames (or fewer), oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &Arc<Frame>> + '_ {
        let start = self.buffer.len().saturating_sub(n);
        self.buffer.range(start..)
    }

    /// Contiguous copy of the buffered frame handles.
    pub fn to_vec(&self) -> Vec<Arc<Frame>> {
        self.buffer.iter().cloned().collect()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for FrameBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.buffer.iter())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
