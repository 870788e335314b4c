//! The control-plane server.
//!
//! Session bookkeeping follows a connection-manager pattern:
//! a `DashMap` of live sessions keyed by a generated id, a
//! `CancellationToken` per session that is a child of a global token so
//! `stop()` force-closes everyone at once, and an RAII guard that
//! unregisters on drop so a panicking or early-returning session task never
//! leaks its entry. The "wake every session on a new SyncState" mechanism
//! is a `tokio::sync::watch` channel rather than a self-pipe: `watch` only
//! ever holds the latest value and every receiver's `changed()` fires for
//! it, which is exactly property P5's requirement that a connected session
//! sends the newest version before any older one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::control::wire::{self, ClientHello};
use crate::error::{SyncError, SyncResult};
use crate::events::{CoordinatorEvent, EventEmitter};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::sync_state::SyncState;

struct SessionState {
    client_id: String,
}

/// Accepts control-plane connections and broadcasts `SyncState` updates to
/// every attached session.
pub struct ControlServer {
    sessions: DashMap<String, SessionState>,
    next_id: AtomicU64,
    global_cancel: RwLock<CancellationToken>,
    state_tx: watch::Sender<Option<SyncState>>,
    events: Arc<dyn EventEmitter>,
    spawner: Arc<TokioSpawner>,
}

impl ControlServer {
    /// Creates a server with no bound listener yet.
    pub fn new(events: Arc<dyn EventEmitter>, spawner: Arc<TokioSpawner>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(None);
        Arc::new(Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
            state_tx,
            events,
            spawner,
        })
    }

    /// Binds `addr:port` (port 0 means OS-assigned) and starts the accept
    /// loop on a background task. Returns the bound port.
    pub async fn start(self: &Arc<Self>, addr: &str, port: u16) -> SyncResult<u16> {
        let listener = TcpListener::bind((addr, port))
            .await
            .map_err(SyncError::NetworkTransient)?;
        let bound_port = listener.local_addr().map_err(SyncError::NetworkTransient)?.port();

        let this = Arc::clone(self);
        let accept_cancel = this.global_cancel.read().child_token();
        self.spawner.spawn(async move {
            this.accept_loop(listener, accept_cancel).await;
        });

        tracing::info!("[Control] listening on {addr}:{bound_port}");
        Ok(bound_port)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("[Control] accept loop cancelled");
                    return;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let this = Arc::clone(&self);
                            let session_cancel = this.global_cancel.read().child_token();
                            let spawner = Arc::clone(&this.spawner);
                            spawner.spawn(async move {
                                this.run_session(stream, peer.to_string(), session_cancel).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!("[Control] accept failed: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn run_session(self: Arc<Self>, mut stream: TcpStream, peer: String, cancel: CancellationToken) {
        let hello = match wire::read_hello(&mut stream).await {
            Ok(hello) => hello,
            Err(e) => {
                tracing::info!("[Control] session {peer} closed before a valid hello: {e}");
                return;
            }
        };

        let session_id = format!("{}-{}", hello.id, self.next_id.fetch_add(1, Ordering::Relaxed));
        let guard = SessionGuard {
            server: Arc::clone(&self),
            id: session_id.clone(),
        };
        self.sessions.insert(
            session_id.clone(),
            SessionState {
                client_id: hello.id.clone(),
            },
        );
        self.events.emit(CoordinatorEvent::ClientJoined {
            client_id: hello.id.clone(),
        });
        tracing::info!("[Control] session {session_id} joined (client id {})", hello.id);

        let mut state_rx = self.state_tx.subscribe();
        let initial = state_rx.borrow().clone();
        if let Some(current) = initial {
            if wire::write_frame(&mut stream, &current).await.is_err() {
                drop(guard);
                return;
            }
        }

        let (mut read_half, mut write_half) = stream.split();
        let mut stray_buf = [0u8; 1];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                // Any bytes (or EOF/error) from the client after its hello
                // is a protocol violation; the client is only ever supposed
                // to send ClientHello once and then just listen.
                read = read_half.read(&mut stray_buf) => {
                    match read {
                        Ok(0) => {
                            tracing::info!("[Control] session {session_id} closed its connection");
                        }
                        Ok(_) => {
                            tracing::warn!("[Control] session {session_id} sent unexpected bytes after hello, closing");
                        }
                        Err(e) => {
                            tracing::warn!("[Control] session {session_id} read error after hello: {e}");
                        }
                    }
                    break;
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = state_rx.borrow_and_update().clone();
                    if let Some(state) = state {
                        if wire::write_frame(&mut write_half, &state).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        drop(guard);
    }

    /// Stores a new `SyncState` and wakes every attached session.
    pub fn set_sync_info(&self, state: SyncState) {
        let version = state.version;
        let _ = self.state_tx.send(Some(state));
        tracing::debug!("[Control] published SyncState version {version}");
    }

    /// Force-closes every session and prevents the accept loop from
    /// accepting further connections, then replaces the cancellation token
    /// so a future `start()` call works again.
    pub fn stop(&self) {
        let count = self.sessions.len();
        tracing::info!("[Control] stopping, closing {count} session(s)");
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
    }

    /// Number of currently attached sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn unregister(&self, id: &str) {
        if let Some((_, state)) = self.sessions.remove(id) {
            self.events.emit(CoordinatorEvent::ClientLeft {
                client_id: state.client_id.clone(),
            });
            tracing::info!("[Control] session {id} left");
        }
    }
}

struct SessionGuard {
    server: Arc<ControlServer>,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.server.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::client::ControlClient;
    use crate::events::NoopEventEmitter;
    use crate::protocol_constants::PROTOCOL_VERSION;
    use crate::runtime::TokioSpawner;
    use crate::sync_state::{Playlist, SyncState, Track};

    fn sample_state(version: u64) -> SyncState {
        let mut s = SyncState::build(Playlist::new(vec![Track::new("uri", 1)]), 0, 0);
        s.version = PROTOCOL_VERSION;
        s.base_time = version;
        s
    }

    #[tokio::test]
    async fn hello_then_one_sync_state_is_delivered() {
        let server = ControlServer::new(Arc::new(NoopEventEmitter), Arc::new(TokioSpawner::current()));
        let port = server.start("127.0.0.1", 0).await.unwrap();
        server.set_sync_info(sample_state(1));

        let mut client = ControlClient::connect("127.0.0.1", port, "c1").await.unwrap();
        let first = client.recv().await.unwrap();
        assert_eq!(first.base_time, 1);
    }

    /// Property P4: bytes before a valid hello close the session and
    /// nothing is sent.
    #[tokio::test]
    async fn malformed_hello_closes_session_without_join_event() {
        use std::sync::atomic::{AtomicUsize, Ordering as O};

        struct Counting(AtomicUsize);
        impl EventEmitter for Counting {
            fn emit(&self, event: CoordinatorEvent) {
                if matches!(event, CoordinatorEvent::ClientJoined { .. }) {
                    self.0.fetch_add(1, O::SeqCst);
                }
            }
        }

        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let server = ControlServer::new(counter.clone(), Arc::new(TokioSpawner::current()));
        let port = server.start("127.0.0.1", 0).await.unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        use tokio::io::AsyncWriteExt;
        stream.write_all(b"not-json\n").await.unwrap();
        drop(stream);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.0.load(O::SeqCst), 0);
        assert_eq!(server.session_count(), 0);
    }

    /// Extra bytes from the client after its hello are a protocol
    /// violation: the session is closed and a `ClientLeft` event fires,
    /// distinct from the before-hello case above which never joins at all.
    #[tokio::test]
    async fn stray_bytes_after_hello_close_the_session() {
        use std::sync::atomic::{AtomicUsize, Ordering as O};

        struct Counting {
            joined: AtomicUsize,
            left: AtomicUsize,
        }
        impl EventEmitter for Counting {
            fn emit(&self, event: CoordinatorEvent) {
                match event {
                    CoordinatorEvent::ClientJoined { .. } => {
                        self.joined.fetch_add(1, O::SeqCst);
                    }
                    CoordinatorEvent::ClientLeft { .. } => {
                        self.left.fetch_add(1, O::SeqCst);
                    }
                    _ => {}
                }
            }
        }

        let counter = Arc::new(Counting {
            joined: AtomicUsize::new(0),
            left: AtomicUsize::new(0),
        });
        let server = ControlServer::new(counter.clone(), Arc::new(TokioSpawner::current()));
        let port = server.start("127.0.0.1", 0).await.unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        use tokio::io::AsyncWriteExt;
        wire::write_frame(&mut stream, &ClientHello::new("c1")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(counter.joined.load(O::SeqCst), 1);
        assert_eq!(server.session_count(), 1);

        stream.write_all(b"unexpected").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.left.load(O::SeqCst), 1);
        assert_eq!(server.session_count(), 0);
    }
}
