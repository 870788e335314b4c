//! The control-plane client.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::control::wire::{self, ClientHello, ConfigValue};
use crate::error::{SyncError, SyncResult};
use crate::runtime::TaskSpawner;
use crate::sync_state::SyncState;

/// Connects to a control server, sends the hello frame, then reads a
/// stream of `SyncState` frames.
///
/// Connection loss is fatal: the read loop
/// stops and surfaces an error rather than retrying, matching the core's
/// explicit exclusion of reconnect logic.
pub struct ControlClient {
    stream: TcpStream,
}

impl ControlClient {
    /// Connects, sends `ClientHello { id, config: {} }`, and returns a
    /// client ready to read `SyncState` frames.
    pub async fn connect(addr: &str, port: u16, id: &str) -> SyncResult<Self> {
        Self::connect_with_config(addr, port, id, Default::default()).await
    }

    /// Same as [`Self::connect`] but with an explicit config dictionary.
    pub async fn connect_with_config(
        addr: &str,
        port: u16,
        id: &str,
        config: std::collections::BTreeMap<String, ConfigValue>,
    ) -> SyncResult<Self> {
        let mut stream = TcpStream::connect((addr, port))
            .await
            .map_err(SyncError::NetworkTransient)?;
        let hello = ClientHello {
            id: id.to_string(),
            config,
        };
        wire::write_frame(&mut stream, &hello).await?;
        Ok(Self { stream })
    }

    /// Reads and decodes exactly one `SyncState` frame.
    pub async fn recv(&mut self) -> SyncResult<SyncState> {
        wire::read_sync_state(&mut self.stream).await
    }

    /// Runs the read loop to completion, publishing each decoded
    /// `SyncState` onto `tx`. Returns the fatal error that ended the loop
    /// (connection closed, malformed frame, or version mismatch).
    pub async fn run(mut self, tx: watch::Sender<Option<SyncState>>) -> SyncError {
        loop {
            match self.recv().await {
                Ok(state) => {
                    tracing::debug!("[Control] received SyncState version {}", state.version);
                    if tx.send(Some(state)).is_err() {
                        return SyncError::NetworkFatal(std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "no subscriber left for control updates",
                        ));
                    }
                }
                Err(e) => {
                    tracing::warn!("[Control] read loop ending: {e}");
                    return e;
                }
            }
        }
    }

    /// Spawns [`Self::run`] as a background task via the given spawner,
    /// returning the watch receiver the playback state machine subscribes
    /// to.
    pub fn spawn_reader(
        self,
        spawner: &Arc<crate::runtime::TokioSpawner>,
    ) -> watch::Receiver<Option<SyncState>> {
        let (tx, rx) = watch::channel(None);
        spawner.spawn(async move {
            self.run(tx).await;
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::server::ControlServer;
    use crate::events::NoopEventEmitter;
    use crate::protocol_constants::PROTOCOL_VERSION;
    use crate::runtime::TokioSpawner;
    use crate::sync_state::{Playlist, Track};

    #[tokio::test]
    async fn client_reads_initial_and_subsequent_state() {
        let server = ControlServer::new(Arc::new(NoopEventEmitter), Arc::new(TokioSpawner::current()));
        let port = server.start("127.0.0.1", 0).await.unwrap();

        let mut s = SyncState::build(Playlist::new(vec![Track::new("a", 1)]), 0, 0);
        s.version = PROTOCOL_VERSION;
        s.base_time = 1;
        server.set_sync_info(s);

        let mut client = ControlClient::connect("127.0.0.1", port, "c1").await.unwrap();
        let first = client.recv().await.unwrap();
        assert_eq!(first.base_time, 1);

        let mut s2 = first.clone();
        s2.base_time = 2;
        server.set_sync_info(s2);
        let second = client.recv().await.unwrap();
        assert_eq!(second.base_time, 2);
    }

    #[tokio::test]
    async fn fatal_error_surfaces_on_disconnect() {
        let server = ControlServer::new(Arc::new(NoopEventEmitter), Arc::new(TokioSpawner::current()));
        let port = server.start("127.0.0.1", 0).await.unwrap();
        let client = ControlClient::connect("127.0.0.1", port, "c1").await.unwrap();
        server.stop();

        let (tx, _rx) = watch::channel(None);
        let err = client.run(tx).await;
        assert!(matches!(err, SyncError::NetworkTransient(_) | SyncError::NetworkFatal(_)));
    }
}
