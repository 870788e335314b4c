//! Control-plane wire framing.
//!
//! Frames are JSON objects with no length prefix: each side treats the
//! bytes returned by a single `read()` call as exactly one document. This
//! is a known latent limitation carried over unchanged (see the read-framing
//! open question) rather than a bug in this implementation — a SyncState
//! that straddles a read boundary is out of scope here, same as upstream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{SyncError, SyncResult};
use crate::protocol_constants::{MAX_CLIENT_READ_BUFFER, MIN_READ_BUFFER};
use crate::sync_state::SyncState;

/// An arbitrary JSON-ish value used for client config dictionaries.
///
/// `ClientHello.config` is specified as string/int/float/bool/nested-dict;
/// `serde_json::Value` already models that losslessly, so this is a thin
/// named alias rather than a hand-rolled enum.
pub type ConfigValue = serde_json::Value;

/// The first and only frame a client sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHello {
    pub id: String,
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
}

impl ClientHello {
    /// Builds a hello with the given id and an empty config dictionary.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: BTreeMap::new(),
        }
    }
}

/// Writes one JSON document on the stream. The caller's side owns framing
/// semantics; this issues exactly one `write_all` per call.
///
/// Generic over `AsyncWrite` rather than tied to `TcpStream` so it works on
/// a split write half just as well as the whole socket.
pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(stream: &mut W, value: &T) -> SyncResult<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| SyncError::Protocol(format!("failed to encode frame: {e}")))?;
    stream
        .write_all(&bytes)
        .await
        .map_err(SyncError::NetworkTransient)
}

/// Reads one JSON document from a single `read()` call, using `buf_size`
/// as the buffer capacity (`MIN_READ_BUFFER` on the server,
/// `MAX_CLIENT_READ_BUFFER` on the client).
pub async fn read_frame_raw<R: AsyncRead + Unpin>(stream: &mut R, buf_size: usize) -> SyncResult<Vec<u8>> {
    let mut buf = vec![0u8; buf_size];
    let n = stream.read(&mut buf).await.map_err(SyncError::NetworkTransient)?;
    if n == 0 {
        return Err(SyncError::NetworkFatal(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "peer closed control connection",
        )));
    }
    buf.truncate(n);
    Ok(buf)
}

/// Reads and decodes one `ClientHello` frame, using the server's
/// `MIN_READ_BUFFER`.
pub async fn read_hello<R: AsyncRead + Unpin>(stream: &mut R) -> SyncResult<ClientHello> {
    let bytes = read_frame_raw(stream, MIN_READ_BUFFER).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SyncError::Protocol(format!("malformed ClientHello: {e}")))
}

/// Reads and decodes one `SyncState` frame, using the client's
/// `MAX_CLIENT_READ_BUFFER`.
pub async fn read_sync_state<R: AsyncRead + Unpin>(stream: &mut R) -> SyncResult<SyncState> {
    let bytes = read_frame_raw(stream, MAX_CLIENT_READ_BUFFER).await?;
    SyncState::deserialize(&bytes).map_err(|e| SyncError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn hello_round_trips_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_hello(&mut stream).await.unwrap()
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut hello = ClientHello::new("kitchen-display");
        hello
            .config
            .insert("zone".into(), serde_json::json!("east"));
        write_frame(&mut client, &hello).await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.id, "kitchen-display");
        assert_eq!(received.config.get("zone").unwrap(), "east");
    }
}
