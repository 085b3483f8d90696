//! Timeline samples for the history scrubber.
//!
//! The timeline spans the full buffer capacity, so a half-filled buffer
//! occupies the left half of the track. Positions map to frame indices the
//! same way in both directions.

use serde::Serialize;

use crate::frame::FrameBuffer;

/// Per-frame summary drawn on the timeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimelineSample {
    pub index: usize,
    pub timestamp: u64,
    /// Mean detection confidence of the frame; 0 without detections.
    pub avg_confidence: f64,
    pub detection_count: usize,
    pub has_event: bool,
}

pub fn samples(buffer: &FrameBuffer) -> Vec<TimelineSample> {
    buffer
        .iter()
        .enumerate()
        .map(|(index, frame)| {
            let detections = frame.detections();
            let avg_confidence = if detections.is_empty() {
                0.0
            } else {
                detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64
            };
            TimelineSample {
                index,
                timestamp: frame.timestamp,
                avg_confidence,
                detection_count: detections.len(),
                has_event: frame.tracker.as_deref().is_some_and(|t| t.has_event()),
            }
        })
        .collect()
}

/// Frame index under a horizontal position `fraction` in `[0, 1)` of a
/// timeline spanning `capacity` frames.
///
/// The result may exceed the number of buffered frames; the store's seek
/// rejects such indices.
pub fn index_at_position(fraction: f64, capacity: usize) -> i64 {
    if !fraction.is_finite() {
        return -1;
    }
    (fraction * capacity as f64).floor() as i64
}

/// Horizontal position in `[0, 1]` of the frame at `index`.
pub fn position_of_index(index: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    index as f64 / capacity as f64
}
