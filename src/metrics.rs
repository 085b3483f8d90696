//! Rolling session metrics.

use serde::Serialize;
use std::sync::Arc;

use crate::frame::Frame;

/// Frames considered by the rolling metrics: 5 seconds at 6 fps.
pub const METRICS_WINDOW_FRAMES: usize = 30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub fps: f64,
    pub dropped_frames: usize,
    pub avg_confidence: f64,
    pub active_detections: usize,
}

impl Metrics {
    /// Compute metrics over `window` (oldest first).
    ///
    /// `latest` is the newest frame of the whole buffer and only feeds
    /// `active_detections`. Returns `None` for windows shorter than two frames,
    /// which carry no usable time span.
    pub fn from_window<'a, I>(window: I, latest: &Frame) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Arc<Frame>>,
    {
        let mut count = 0usize;
        let mut first_ts = None;
        let mut last_ts = 0u64;
        let mut dropped_frames = 0usize;
        let mut confidence_sum = 0.0f64;
        let mut detection_total = 0usize;

        for frame in window {
            count += 1;
            first_ts.get_or_insert(frame.timestamp);
            last_ts = frame.timestamp;

            let detections = frame.detections();
            if detections.is_empty() {
                dropped_frames += 1;
            }
            detection_total += detections.len();
            confidence_sum += detections.iter().map(|d| d.confidence).sum::<f64>();
        }

        let first_ts = first_ts?;
        if count < 2 {
            return None;
        }

        let span_secs = (last_ts as f64 - first_ts as f64) / 1000.0;
        let fps = (count - 1) as f64 / span_secs;
        let fps = if fps.is_finite() && fps >= 0.0 { fps } else { 0.0 };

        let avg_confidence = if detection_total > 0 {
            confidence_sum / detection_total as f64
        } else {
            0.0
        };

        Some(Self {
            fps,
            dropped_frames,
            avg_confidence,
            active_detections: latest.detection_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BBox, Detection, InferenceSnapshot};

    fn frame(ts: u64, confidences: &[f64]) -> Arc<Frame> {
        let detections = confidences
            .iter()
            .enumerate()
            .map(|(i, conf)| Detection {
                person_id: i as i64,
                bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
                keypoints: None,
                confidence: *conf,
                imov: None,
            })
            .collect();
        Arc::new(Frame::new(
            ts,
            Some(InferenceSnapshot {
                timestamp: ts,
                frame_id: ts as i64,
                detections,
            }),
            None,
        ))
    }

    #[test]
    fn single_frame_window_is_skipped() {
        let frames = vec![frame(0, &[0.5])];
        assert!(Metrics::from_window(&frames, &frames[0]).is_none());
    }

    #[test]
    fn fps_follows_frame_spacing() {
        let frames: Vec<_> = (0..30).map(|i| frame(i * 150, &[0.9])).collect();
        let m = Metrics::from_window(&frames, &frames[29]).expect("metrics");
        assert!((m.fps - 29.0 / 4.35).abs() < 1e-9);
        assert!((m.avg_confidence - 0.9).abs() < 1e-9);
        assert_eq!(m.dropped_frames, 0);
        assert_eq!(m.active_detections, 1);
    }

    #[test]
    fn identical_timestamps_yield_zero_fps() {
        let frames = vec![frame(100, &[]), frame(100, &[])];
        let m = Metrics::from_window(&frames, &frames[1]).expect("metrics");
        assert_eq!(m.fps, 0.0);
        assert_eq!(m.dropped_frames, 2);
        assert_eq!(m.avg_confidence, 0.0);
    }

    #[test]
    fn backwards_timestamps_yield_zero_fps() {
        let frames = vec![frame(1000, &[0.4]), frame(500, &[0.6])];
        let m = Metrics::from_window(&frames, &frames[1]).expect("metrics");
        assert_eq!(m.fps, 0.0);
        assert!((m.avg_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn frames_without_inference_count_as_dropped() {
        let frames = vec![
            Arc::new(Frame::new(0, None, None)),
            frame(150, &[0.8, 0.6]),
        ];
        let m = Metrics::from_window(&frames, &frames[1]).expect("metrics");
        assert_eq!(m.dropped_frames, 1);
        assert_eq!(m.active_detections, 2);
        assert!((m.avg_confidence - 0.7).abs() < 1e-9);
    }
}
