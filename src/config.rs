use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

use crate::frame::{BUFFER_DURATION_SECONDS, TARGET_FPS};
use crate::metrics::METRICS_WINDOW_FRAMES;
use crate::session::{SessionConfig, EVENT_HISTORY_CAPACITY};

const DEFAULT_FEED_URL: &str = "stub://ward_camera";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8798";

#[derive(Debug, Deserialize, Default)]
struct ConsoleConfigFile {
    feed: Option<FeedConfigFile>,
    api: Option<ApiConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct FeedConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    buffer_secs: Option<u64>,
    event_history: Option<usize>,
    metrics_window: Option<usize>,
}

/// Settings for `bedwatchd`.
///
/// Loaded in layers: optional file named by `BEDWATCH_CONFIG` (JSON, or TOML
/// when the path ends in `.toml`), then defaults for anything unset, then
/// `BEDWATCH_*` environment overrides, then validation.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub feed_url: String,
    pub target_fps: u32,
    pub api_addr: String,
    pub buffer_secs: u64,
    pub event_history: usize,
    pub metrics_window: usize,
}

impl ConsoleConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BEDWATCH_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same layering as `load`, with the config file given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConsoleConfigFile) -> Self {
        let feed = file.feed.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        Self {
            feed_url: feed.url.unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            target_fps: feed.target_fps.unwrap_or(TARGET_FPS as u32),
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            buffer_secs: session.buffer_secs.unwrap_or(BUFFER_DURATION_SECONDS as u64),
            event_history: session.event_history.unwrap_or(EVENT_HISTORY_CAPACITY),
            metrics_window: session.metrics_window.unwrap_or(METRICS_WINDOW_FRAMES),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("BEDWATCH_FEED_URL") {
            if !url.trim().is_empty() {
                self.feed_url = url;
            }
        }
        if let Ok(addr) = std::env::var("BEDWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(fps) = std::env::var("BEDWATCH_TARGET_FPS") {
            self.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("BEDWATCH_TARGET_FPS must be a positive integer"))?;
        }
        if let Ok(secs) = std::env::var("BEDWATCH_BUFFER_SECS") {
            self.buffer_secs = secs.trim().parse().map_err(|_| {
                anyhow!("BEDWATCH_BUFFER_SECS must be an integer number of seconds")
            })?;
        }
        if let Ok(events) = std::env::var("BEDWATCH_EVENT_HISTORY") {
            self.event_history = events
                .trim()
                .parse()
                .map_err(|_| anyhow!("BEDWATCH_EVENT_HISTORY must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.target_fps == 0 {
            return Err(anyhow!("target fps must be greater than zero"));
        }
        if self.buffer_secs == 0 {
            return Err(anyhow!("buffer duration must be greater than zero"));
        }
        let addr: SocketAddr = self
            .api_addr
            .parse()
            .map_err(|e| anyhow!("invalid api addr {}: {}", self.api_addr, e))?;
        self.api_addr = addr.to_string();
        self.feed_url = self.feed_url.trim().to_string();
        self.session_config().validate()
    }

    /// Buffer capacity is the buffer duration at the target frame rate.
    pub fn buffer_capacity(&self) -> usize {
        let frames = self.buffer_secs.saturating_mul(u64::from(self.target_fps));
        usize::try_from(frames).unwrap_or(usize::MAX)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            buffer_capacity: self.buffer_capacity(),
            event_history_capacity: self.event_history,
            metrics_window: self.metrics_window,
        }
    }
}

fn read_config_file(path: &Path) -> Result<ConsoleConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
