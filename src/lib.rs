//! Bedside monitoring console core.
//!
//! This crate keeps the session state behind a ward monitoring console: the
//! rolling window of perception frames (person detections plus tracker state
//! with bed/door regions and bed-exit style events), the live/seek view the
//! operator is looking at, derived stream-health metrics and a capped history
//! of tracker events.
//!
//! # Module Structure
//!
//! - `frame`: Frame data model and the bounded `FrameBuffer`
//! - `event`: Typed tracker events, severities and event-log lines
//! - `metrics`: Stream-health metrics over the newest frames
//! - `session`: `SessionStore` (ingest, view state, operator commands) and `SessionSnapshot`
//! - `timeline`: Timeline samples and scrub position mapping
//! - `clip`: Clip export extension point (`ClipSink`)
//! - `feed`: Frame feeds (synthetic, replay, manual)
//! - `runtime`: Single-owner runtime that serializes frames and commands
//! - `api`: Loopback control API
//! - `config`: Layered daemon configuration

pub mod api;
pub mod clip;
pub mod config;
pub mod event;
pub mod feed;
pub mod frame;
pub mod metrics;
pub mod runtime;
pub mod session;
pub mod timeline;

pub use clip::{ClipRequest, ClipSink, NullClipSink};
pub use event::{EventLogLine, EventSeverity, TrackerEvent};
pub use feed::{open_feed, FeedStats, FrameCallback, FrameFeed, ManualFeed};
pub use frame::{
    BBox, Detection, Frame, FrameBuffer, InferenceSnapshot, Keypoint, Region, RegionShape, Track,
    TrackerSnapshot, BUFFER_CAPACITY, BUFFER_DURATION_SECONDS, TARGET_FPS,
};
pub use metrics::{Metrics, METRICS_WINDOW_FRAMES};
pub use runtime::{bind_feed, Command, SessionHandle, SessionInput, SessionRuntime};
pub use session::{
    Diagnostics, SessionConfig, SessionSnapshot, SessionStore, ViewMode, EVENT_HISTORY_CAPACITY,
    MAX_BUFFER_CAPACITY, MAX_EVENT_HISTORY_CAPACITY,
};
pub use timeline::TimelineSample;
