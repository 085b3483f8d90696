//! Synthetic ward feed (`stub://` URLs).
//!
//! Generates a plausible bedside scene so the console can run without a
//! perception pipeline:
//! - one person detected in ~70% of frames, with 17 keypoints
//! - `bed` and `door` regions with polygon outlines
//! - one smoothed track per detection
//! - a `limb_outside_bed` event on ~10% of frames

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::worker::{Delivery, FeedWorker};
use super::{FeedStats, FrameCallback, FrameFeed};
use crate::event::LIMB_OUTSIDE_BED;
use crate::frame::{
    BBox, Detection, Frame, InferenceSnapshot, Keypoint, Region, Track, TrackerSnapshot,
};

const KEYPOINTS_PER_PERSON: usize = 17;
const DETECTION_PROBABILITY: f64 = 0.7;
const EVENT_PROBABILITY: f64 = 0.1;
const JITTER_MS: i64 = 25;

/// Configuration for a synthetic feed.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL (e.g., "stub://ward_camera").
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Fixed seed for reproducible scenes; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://ward_camera".to_string(),
            target_fps: 6,
            seed: None,
        }
    }
}

/// Scene generator. Pure apart from its RNG, so tests drive it directly.
pub struct SyntheticScene {
    rng: StdRng,
}

impl SyntheticScene {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Generate the frame captured at `timestamp` (epoch ms).
    pub fn next_frame(&mut self, timestamp: u64) -> Frame {
        let frame_id = (timestamp / 1000) as i64 * 6 + self.rng.gen_range(0..6);

        let mut detections = Vec::new();
        if self.rng.gen_bool(DETECTION_PROBABILITY) {
            detections.push(self.person_detection());
        }

        let bed_occupied = !detections.is_empty() && self.rng.gen_bool(0.5);
        let mut regions = BTreeMap::new();
        regions.insert(
            "bed".to_string(),
            Region {
                occupied: bed_occupied,
                confidence: Some(0.8 + self.rng.gen::<f64>() * 0.2),
                bbox: Some(BBox::new(400.0, 300.0, 400.0, 300.0)),
                keypoints: Some(vec![
                    [400.0, 300.0],
                    [800.0, 300.0],
                    [800.0, 600.0],
                    [400.0, 600.0],
                ]),
            },
        );
        regions.insert(
            "door".to_string(),
            Region {
                occupied: false,
                confidence: None,
                bbox: Some(BBox::new(50.0, 50.0, 150.0, 200.0)),
                keypoints: Some(vec![[50.0, 50.0], [200.0, 50.0], [200.0, 250.0], [50.0, 250.0]]),
            },
        );

        let tracks = detections
            .iter()
            .map(|d| Track {
                person_id: d.person_id,
                bbox_smoothed: d.bbox,
                keypoints: d.keypoints.clone(),
                stability: Some(0.7 + self.rng.gen::<f64>() * 0.3),
            })
            .collect();

        let mut tracker = TrackerSnapshot {
            timestamp,
            event: None,
            event_payload: None,
            regions,
            tracks,
        };
        if self.rng.gen_bool(EVENT_PROBABILITY) {
            tracker.event = Some(LIMB_OUTSIDE_BED.to_string());
            tracker.event_payload = Some(json!({
                "person_id": 1,
                "keypoints_outside": ["left_hand"],
                "distance_cm": 30.0 + self.rng.gen::<f64>() * 50.0,
                "confidence": 0.8 + self.rng.gen::<f64>() * 0.2,
            }));
        }

        Frame::new(
            timestamp,
            Some(InferenceSnapshot {
                timestamp,
                frame_id,
                detections,
            }),
            Some(tracker),
        )
    }

    fn person_detection(&mut self) -> Detection {
        let bbox = BBox::new(
            200.0 + self.rng.gen::<f64>() * 200.0,
            150.0 + self.rng.gen::<f64>() * 200.0,
            160.0 + self.rng.gen::<f64>() * 40.0,
            280.0 + self.rng.gen::<f64>() * 60.0,
        );
        let keypoints = (0..KEYPOINTS_PER_PERSON)
            .map(|i| Keypoint {
                name: Some(format!("keypoint_{i}")),
                x: 300.0 + self.rng.gen::<f64>() * 200.0,
                y: 200.0 + self.rng.gen::<f64>() * 200.0,
                conf: 0.5 + self.rng.gen::<f64>() * 0.5,
            })
            .collect();
        Detection {
            person_id: 1,
            bbox,
            keypoints: Some(keypoints),
            confidence: 0.5 + self.rng.gen::<f64>() * 0.5,
            imov: Some(self.rng.gen::<f64>() * 0.5),
        }
    }

    /// Delay before the next frame: the nominal period with +/-25 ms jitter.
    fn next_delay(&mut self, target_fps: u32) -> Duration {
        let period_ms = 1000 / i64::from(target_fps.max(1));
        let jitter = self.rng.gen_range(-JITTER_MS..=JITTER_MS);
        Duration::from_millis((period_ms + jitter).max(1) as u64)
    }
}

/// Synthetic frame feed.
pub struct SyntheticFeed {
    config: SyntheticConfig,
    delivery: Delivery,
    worker: Option<FeedWorker>,
}

impl SyntheticFeed {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            delivery: Delivery::default(),
            worker: None,
        }
    }
}

impl FrameFeed for SyntheticFeed {
    fn source(&self) -> &str {
        &self.config.url
    }

    fn on_frame(&mut self, callback: FrameCallback) {
        self.delivery.set_callback(callback);
    }

    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        if !self.delivery.has_callback() {
            log::warn!("SyntheticFeed: started without a frame callback");
        }
        let mut scene = SyntheticScene::new(self.config.seed);
        let delivery = self.delivery.clone();
        let target_fps = self.config.target_fps;
        let worker = FeedWorker::spawn("synthetic", move || {
            delivery.deliver(scene.next_frame(epoch_millis()));
            Some(scene.next_delay(target_fps))
        })?;
        self.worker = Some(worker);
        log::info!(
            "SyntheticFeed: streaming {} at ~{} fps",
            self.config.url,
            self.config.target_fps
        );
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            log::info!("SyntheticFeed: stopped {}", self.config.url);
        }
    }

    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(FeedWorker::is_running)
    }

    fn stats(&self) -> FeedStats {
        FeedStats {
            frames_delivered: self.delivery.delivered(),
            source: self.config.url.clone(),
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn seeded_scene_is_reproducible() {
        let mut a = SyntheticScene::new(Some(7));
        let mut b = SyntheticScene::new(Some(7));
        for ts in 0..20u64 {
            assert_eq!(a.next_frame(ts * 150), b.next_frame(ts * 150));
        }
    }

    #[test]
    fn scene_frames_have_expected_shape() {
        let mut scene = SyntheticScene::new(Some(42));
        let mut with_detection = 0;
        let mut with_event = 0;
        for i in 0..500u64 {
            let frame = scene.next_frame(1_700_000_000_000 + i * 150);
            let tracker = frame.tracker.as_deref().expect("tracker always present");
            assert!(tracker.regions.contains_key("bed"));
            assert!(tracker.regions.contains_key("door"));
            assert_eq!(tracker.tracks.len(), frame.detection_count());
            if let Some(det) = frame.detections().first() {
                with_detection += 1;
                assert_eq!(det.keypoints.as_ref().map(Vec::len), Some(17));
                assert!((0.5..=1.0).contains(&det.confidence));
            }
            if tracker.has_event() {
                with_event += 1;
                assert_eq!(tracker.event_name(), Some("limb_outside_bed"));
            }
        }
        assert!((250..450).contains(&with_detection));
        assert!((10..120).contains(&with_event));
    }

    #[test]
    fn delay_stays_near_target_period() {
        let mut scene = SyntheticScene::new(Some(1));
        for _ in 0..100 {
            let delay = scene.next_delay(6).as_millis();
            assert!((141..=191).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn feed_delivers_until_stopped() {
        let (tx, rx) = mpsc::channel();
        let mut feed = SyntheticFeed::new(SyntheticConfig {
            url: "stub://test".to_string(),
            target_fps: 50,
            seed: Some(3),
        });
        feed.on_frame(Box::new(move |frame| {
            let _ = tx.send(frame);
        }));
        feed.start().expect("start");
        feed.start().expect("second start is a no-op");
        let first = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("frame delivered");
        assert!(first.tracker.is_some());
        feed.stop();
        feed.stop();
        assert!(!feed.is_running());
        assert!(feed.stats().frames_delivered >= 1);
    }
}
