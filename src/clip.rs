//! Clip export extension point.
//!
//! A clip is the current buffer window handed to a `ClipSink`. No encoding or
//! destination is defined here; deployments plug a sink into the session store.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::frame::Frame;

/// Describes the frames handed to a sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClipRequest {
    pub frame_count: usize,
    pub start_timestamp: Option<u64>,
    pub end_timestamp: Option<u64>,
}

impl ClipRequest {
    pub fn for_frames(frames: &[Arc<Frame>]) -> Self {
        Self {
            frame_count: frames.len(),
            start_timestamp: frames.first().map(|f| f.timestamp),
            end_timestamp: frames.last().map(|f| f.timestamp),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match (self.start_timestamp, self.end_timestamp) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        }
    }
}

/// Receives clip exports.
///
/// Implementations must treat the frames as read-only; they are shared with
/// the live buffer.
pub trait ClipSink: Send {
    fn name(&self) -> &'static str;

    fn export(&mut self, request: &ClipRequest, frames: &[Arc<Frame>]) -> Result<()>;
}

/// Default sink: records the request in the log and discards the frames.
#[derive(Clone, Debug, Default)]
pub struct NullClipSink;

impl ClipSink for NullClipSink {
    fn name(&self) -> &'static str {
        "null"
    }

    fn export(&mut self, request: &ClipRequest, _frames: &[Arc<Frame>]) -> Result<()> {
        log::info!(
            "clip requested: {} frames spanning {} ms (no clip sink configured)",
            request.frame_count,
            request.duration_ms()
        );
        Ok(())
    }
}
