//! Session runtime.
//!
//! The runtime is the single owner of a `SessionStore`. Frames from feeds and
//! operator commands from the control API share one channel and are applied in
//! arrival order, one at a time, so no two mutations ever interleave.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use crate::clip::ClipRequest;
use crate::feed::FrameFeed;
use crate::frame::Frame;
use crate::metrics::Metrics;
use crate::session::SessionStore;

pub type Reply<T> = Sender<T>;

pub enum Command {
    ToggleLive,
    SetLive(bool),
    TogglePause,
    /// Seek to a buffer index; the reply carries whether it was applied.
    Seek(i64, Option<Reply<bool>>),
    CreateClip(Option<Reply<ClipRequest>>),
    /// Serialized `SessionSnapshot`.
    Snapshot(Reply<Result<serde_json::Value>>),
    Metrics(Reply<Metrics>),
    Shutdown,
}

pub enum SessionInput {
    Frame(Frame),
    Command(Command),
}

pub struct SessionRuntime {
    store: SessionStore,
    inputs: Receiver<SessionInput>,
}

impl SessionRuntime {
    pub fn new(store: SessionStore) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel();
        (
            Self { store, inputs: rx },
            SessionHandle { inputs: tx },
        )
    }

    /// Run on a named thread. Joining yields the final store.
    pub fn spawn(self) -> Result<JoinHandle<SessionStore>> {
        std::thread::Builder::new()
            .name("session-runtime".to_string())
            .spawn(move || self.run())
            .map_err(|e| anyhow!("failed to spawn session runtime: {}", e))
    }

    /// Apply inputs until `Shutdown` or until every handle is dropped.
    pub fn run(mut self) -> SessionStore {
        log::info!("session runtime started");
        while let Ok(input) = self.inputs.recv() {
            match input {
                SessionInput::Frame(frame) => self.store.ingest(frame),
                SessionInput::Command(Command::Shutdown) => {
                    log::info!("session runtime: shutdown requested");
                    break;
                }
                SessionInput::Command(command) => self.apply(command),
            }
        }
        log::info!(
            "session runtime stopped ({} frames ingested)",
            self.store.diagnostics().ingested_frames
        );
        self.store
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::ToggleLive => self.store.toggle_live(),
            Command::SetLive(enabled) => self.store.set_live(enabled),
            Command::TogglePause => self.store.toggle_pause(),
            Command::Seek(index, reply) => {
                let applied = self.store.seek(index);
                send_reply(reply, applied);
            }
            Command::CreateClip(reply) => {
                let request = self.store.create_clip();
                send_reply(reply, request);
            }
            Command::Snapshot(reply) => {
                let snapshot = serde_json::to_value(self.store.snapshot())
                    .map_err(|e| anyhow!("failed to serialize snapshot: {}", e));
                send_reply(Some(reply), snapshot);
            }
            Command::Metrics(reply) => send_reply(Some(reply), self.store.metrics()),
            Command::Shutdown => {}
        }
    }
}

fn send_reply<T>(reply: Option<Reply<T>>, value: T) {
    if let Some(reply) = reply {
        // The requester may have given up waiting.
        let _ = reply.send(value);
    }
}

/// Cloneable sender half of a runtime.
#[derive(Clone)]
pub struct SessionHandle {
    inputs: Sender<SessionInput>,
}

impl SessionHandle {
    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        self.send(SessionInput::Frame(frame))
    }

    pub fn send_command(&self, command: Command) -> Result<()> {
        self.send(SessionInput::Command(command))
    }

    pub fn toggle_live(&self) -> Result<()> {
        self.send_command(Command::ToggleLive)
    }

    pub fn set_live(&self, enabled: bool) -> Result<()> {
        self.send_command(Command::SetLive(enabled))
    }

    pub fn toggle_pause(&self) -> Result<()> {
        self.send_command(Command::TogglePause)
    }

    pub fn seek(&self, index: i64) -> Result<bool> {
        self.request(|reply| Command::Seek(index, Some(reply)))
    }

    pub fn create_clip(&self) -> Result<ClipRequest> {
        self.request(|reply| Command::CreateClip(Some(reply)))
    }

    pub fn snapshot(&self) -> Result<serde_json::Value> {
        self.request(Command::Snapshot)?
    }

    pub fn metrics(&self) -> Result<Metrics> {
        self.request(Command::Metrics)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(Command::Shutdown)
    }

    fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = mpsc::channel();
        self.send_command(make(tx))?;
        rx.recv()
            .map_err(|_| anyhow!("session runtime stopped before replying"))
    }

    fn send(&self, input: SessionInput) -> Result<()> {
        self.inputs
            .send(input)
            .map_err(|_| anyhow!("session runtime is not running"))
    }
}

/// Route every frame delivered by `feed` into the runtime behind `handle`.
pub fn bind_feed(feed: &mut dyn FrameFeed, handle: SessionHandle) {
    let source = feed.source().to_string();
    feed.on_frame(Box::new(move |frame| {
        if handle.send_frame(frame).is_err() {
            log::debug!("{}: frame dropped, session runtime stopped", source);
        }
    }));
}
