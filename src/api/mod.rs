//! Local control API.
//!
//! Loopback HTTP/1.1 JSON endpoint, one request per connection and one short
//! lived thread per connection, so a stalled client only holds its own thread
//! until the read timeout. Every route
//! forwards to the session runtime through a `SessionHandle`, so API requests
//! are ordered with frames like any other command.
//!
//! Routes:
//! - `GET /health`, `GET /snapshot`, `GET /metrics`
//! - `POST /live/toggle`, `POST /pause/toggle`, `POST /clip`
//! - `POST /seek?index=N`

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::runtime::SessionHandle;

const MAX_REQUEST_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_millis(500);
const OK_BODY: &str = r#"{"ok":true}"#;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8798".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("control api thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    session: SessionHandle,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, session: SessionHandle) -> Self {
        Self { cfg, session }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid api addr {}: {}", self.cfg.addr, e))?;
        let listener = TcpListener::bind(configured_addr)
            .map_err(|e| anyhow!("failed to bind control api on {}: {}", configured_addr, e))?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        if !addr.ip().is_loopback() {
            log::warn!("control api listening on non-loopback address {}", addr);
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let session = self.session;
        let join = std::thread::Builder::new()
            .name("control-api".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, session, shutdown_thread) {
                    log::error!("control api stopped: {}", err);
                }
            })
            .map_err(|e| anyhow!("failed to spawn control api thread: {}", e))?;
        log::info!("control api listening on http://{}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, session: SessionHandle, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let session = session.clone();
                let spawned = std::thread::Builder::new()
                    .name("control-api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &session) {
                            log::warn!("control api request from {} rejected: {}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("failed to spawn control api connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, session: &SessionHandle) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if !peer_allowed(local, peer) {
        log::warn!("control api refused non-loopback peer {}", peer);
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    let (status, body) = match route(&request, session) {
        Ok(response) => response,
        Err(err) => {
            log::warn!("{} {} failed: {}", request.method, request.path, err);
            (503, r#"{"error":"session_unavailable"}"#.to_string())
        }
    };
    log::debug!("{} {} -> {}", request.method, request.path, status);
    write_json_response(&mut stream, status, &body)
}

/// A loopback listener only serves loopback peers.
fn peer_allowed(local: SocketAddr, peer: SocketAddr) -> bool {
    !local.ip().is_loopback() || peer.ip().is_loopback()
}

fn route(request: &HttpRequest, session: &SessionHandle) -> Result<(u16, String)> {
    let expected_method = match request.path.as_str() {
        "/health" | "/snapshot" | "/metrics" => "GET",
        "/live/toggle" | "/pause/toggle" | "/clip" | "/seek" => "POST",
        _ => return Ok((404, r#"{"error":"not_found"}"#.to_string())),
    };
    if request.method != expected_method {
        return Ok((405, r#"{"error":"method_not_allowed"}"#.to_string()));
    }

    match request.path.as_str() {
        "/health" => Ok((200, r#"{"status":"ok"}"#.to_string())),
        "/snapshot" => json_body(&session.snapshot()?),
        "/metrics" => json_body(&session.metrics()?),
        "/live/toggle" => {
            session.toggle_live()?;
            Ok((200, OK_BODY.to_string()))
        }
        "/pause/toggle" => {
            session.toggle_pause()?;
            Ok((200, OK_BODY.to_string()))
        }
        "/clip" => {
            let clip = session.create_clip()?;
            log::info!(
                "clip requested over api: {} frames ({} ms)",
                clip.frame_count,
                clip.duration_ms()
            );
            Ok((200, OK_BODY.to_string()))
        }
        "/seek" => {
            let Some(index) = request
                .query_param("index")
                .and_then(|raw| raw.parse::<i64>().ok())
            else {
                return Ok((400, r#"{"error":"invalid_index"}"#.to_string()));
            };
            let applied = session.seek(index)?;
            Ok((200, format!(r#"{{"applied":{applied}}}"#)))
        }
        _ => Ok((404, r#"{"error":"not_found"}"#.to_string())),
    }
}

fn json_body<T: Serialize>(value: &T) -> Result<(u16, String)> {
    Ok((200, serde_json::to_string(value)?))
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let (path, query) = raw_path.split_once('?').unwrap_or((raw_path, ""));
    let query = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body.as_bytes())?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
}

impl HttpRequest {
    fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}
