//! Control channel over a Unix socket
//!
//! Front-ends talk to the daemon with length-prefixed JSON: a u32
//! little-endian byte count followed by one serialized message. Each
//! connection may carry any number of request/response pairs.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use tracing::debug;

mod handler;
mod messages;

pub use handler::spawn_control_listener;
pub use messages::{ControlRequest, ControlResponse};

use crate::constants::ipc::{MAX_MESSAGE_SIZE, SOCKET_RELATIVE_PATH};

/// Default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(SOCKET_RELATIVE_PATH));
    }

    let cache = dirs::cache_dir().context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(SOCKET_RELATIVE_PATH))
}

/// Client side of the control socket (used by `send`)
pub struct ControlClient {
    pub(crate) stream: UnixStream,
}

impl ControlClient {
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("Failed to connect to dmd-marquee at {}", path.display()))?;
        Ok(Self { stream })
    }

    /// Send one request and wait for its response
    pub fn request(&mut self, req: &ControlRequest) -> Result<ControlResponse> {
        write_message(&mut self.stream, req)?;
        read_message(&mut self.stream)
    }
}

/// Listening side of the control socket
pub struct ControlServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl ControlServer {
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
        }

        // Left behind by a previous run that did not shut down cleanly
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .with_context(|| format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind socket at {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }
        debug!(socket = %socket_path.display(), "Control socket bound");

        Ok(Self { listener, socket_path })
    }

    /// Accept incoming connection (blocking)
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().context("Failed to accept control connection")?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write length-prefixed message to stream
pub(crate) fn write_message<T: Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    let len = u32::try_from(json.len()).context("Message too large for length prefix")?;

    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;
    stream.write_all(&json).context("Failed to write message payload")?;
    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Read length-prefixed message from stream
pub(crate) fn read_message<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_framing() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let req = ControlRequest::new("display/picture").param("path", "galaga");

        write_message(&mut a, &req).unwrap();
        let got: ControlRequest = read_message(&mut b).unwrap();
        assert_eq!(got, req);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        a.write_all(&(MAX_MESSAGE_SIZE as u32 + 1).to_le_bytes()).unwrap();

        let err = read_message::<ControlRequest>(&mut b).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_request_without_params_decodes() {
        let req: ControlRequest = serde_json::from_str(r#"{"command":"blank"}"#).unwrap();
        assert_eq!(req, ControlRequest::new("blank"));
    }

    #[test]
    fn test_server_binds_owner_only_and_cleans_up() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/control.sock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let server = ControlServer::bind_to(path.clone()).unwrap();
        let mode = std::fs::metadata(server.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);

        drop(server);
        assert!(!path.exists());
    }
}
