//! Wall-clock synchronisation pair (component C2).
//!
//! A single [`ClockProvider`] publishes a monotonic reference clock over
//! UDP; any number of [`ClockConsumer`]s estimate their offset from it via
//! a ping/pong round trip, the same shape as NTP's offset formula:
//!
//! ```text
//! RTT = m2 - m0
//! one_way_delay = RTT / 2
//! offset = t1 + one_way_delay - m2
//! ```
//!
//! where `m0`/`m2` are the consumer's own monotonic readings around the
//! round trip and `t1` is the provider's clock value at the moment it
//! replied. Unlike a quorum clock, there is exactly one provider, so there
//! is no Marzullo intersection step — the consumer keeps the
//! lowest-delay sample seen within a sliding window and exponentially
//! smooths the offset to damp jitter.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::protocol_constants::{CLOCK_SYNC_MIN_SAMPLES, CLOCK_SYNC_TIMEOUT_MS};

/// Errors from the clock plane.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("clock socket error: {0}")]
    Io(#[from] io::Error),
    #[error("clock sync did not reach {CLOCK_SYNC_MIN_SAMPLES} samples within {0:?}")]
    Timeout(Duration),
    #[error("malformed clock packet")]
    Malformed,
}

const PING_TAG: u8 = 1;
const PONG_TAG: u8 = 2;

/// Server-side half of the clock pair.
///
/// Publishes its own monotonic clock (nanoseconds since the provider's own
/// arbitrary epoch, established at [`ClockProvider::bind`]) in response to
/// consumer pings. The provider never initiates traffic itself.
pub struct ClockProvider {
    socket: UdpSocket,
    epoch: Instant,
}

impl ClockProvider {
    /// Binds a UDP socket and establishes a fresh monotonic epoch.
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> Result<Self, ClockError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            epoch: Instant::now(),
        })
    }

    /// The local address this provider is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Nanoseconds since this provider's epoch. This is the value
    /// advertised in [`crate::sync_state::SyncState::base_time`] and
    /// everything downstream is relative to it.
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Runs the ping/pong responder loop until the socket errors out.
    /// Intended to be spawned as a background task for the lifetime of the
    /// server.
    pub async fn serve(&self) -> Result<(), ClockError> {
        let mut buf = [0u8; 17];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if len != 9 || buf[0] != PING_TAG {
                continue;
            }
            let mut reply = [0u8; 9];
            reply[0] = PONG_TAG;
            reply[1..9].copy_from_slice(&self.now_ns().to_be_bytes());
            let _ = self.socket.send_to(&reply, from).await;
        }
    }
}

/// One round-trip sample.
#[derive(Debug, Clone, Copy)]
struct Sample {
    offset_ns: i64,
    delay_ns: u64,
}

/// Client-side half of the clock pair.
///
/// Maintains a smoothed offset estimate from the provider's clock and
/// exposes [`ClockConsumer::now_ns`] as "what time it is on the
/// provider's clock, right now, from here".
pub struct ClockConsumer {
    socket: UdpSocket,
    local_epoch: Instant,
    best: Option<Sample>,
    smoothed_offset_ns: i64,
    sample_count: usize,
}

/// Exponential smoothing factor applied to each new offset sample against
/// the running estimate. Lower values damp jitter harder at the cost of
/// slower convergence to real drift.
const SMOOTHING_ALPHA: f64 = 0.125;

impl ClockConsumer {
    /// Connects to a provider at `provider_addr`, binding an ephemeral
    /// local UDP socket.
    pub async fn connect(provider_addr: SocketAddr) -> Result<Self, ClockError> {
        let bind_addr: SocketAddr = if provider_addr.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(provider_addr).await?;
        Ok(Self {
            socket,
            local_epoch: Instant::now(),
            best: None,
            smoothed_offset_ns: 0,
            sample_count: 0,
        })
    }

    fn local_now_ns(&self) -> u64 {
        self.local_epoch.elapsed().as_nanos() as u64
    }

    /// Performs one ping/pong round trip and folds the result into the
    /// running estimate. Returns the measured round-trip delay.
    pub async fn sync_once(&mut self) -> Result<Duration, ClockError> {
        let m0 = self.local_now_ns();
        let mut packet = [0u8; 9];
        packet[0] = PING_TAG;
        self.socket.send(&packet).await?;

        let mut reply = [0u8; 9];
        let len = self.socket.recv(&mut reply).await?;
        let m2 = self.local_now_ns();
        if len != 9 || reply[0] != PONG_TAG {
            return Err(ClockError::Malformed);
        }
        let t1 = u64::from_be_bytes(reply[1..9].try_into().unwrap());

        let rtt = m2.saturating_sub(m0);
        let one_way_delay = rtt / 2;
        // offset = t1 + one_way_delay - our_time_at_t1, with our_time_at_t1
        // approximated by m2 (the reading nearest to when t1 was captured).
        let offset = t1 as i64 + one_way_delay as i64 - m2 as i64;

        let sample = Sample {
            offset_ns: offset,
            delay_ns: rtt,
        };
        let keep_as_best = match self.best {
            Some(best) if best.delay_ns <= sample.delay_ns => false,
            _ => true,
        };
        if keep_as_best {
            self.best = Some(sample);
        }

        self.sample_count += 1;
        if self.sample_count == 1 {
            self.smoothed_offset_ns = offset;
        } else {
            let delta = offset as f64 - self.smoothed_offset_ns as f64;
            self.smoothed_offset_ns += (SMOOTHING_ALPHA * delta).round() as i64;
        }

        Ok(Duration::from_nanos(rtt))
    }

    /// Repeats [`Self::sync_once`] until [`CLOCK_SYNC_MIN_SAMPLES`] have
    /// been collected or `CLOCK_SYNC_TIMEOUT_MS` elapses.
    pub async fn wait_for_sync(&mut self) -> Result<(), ClockError> {
        let budget = Duration::from_millis(CLOCK_SYNC_TIMEOUT_MS);
        let deadline = Instant::now() + budget;
        while self.sample_count < CLOCK_SYNC_MIN_SAMPLES {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClockError::Timeout(budget));
            }
            match timeout(remaining, self.sync_once()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(ClockError::Timeout(budget)),
            }
        }
        Ok(())
    }

    /// Whether enough samples have been collected to trust the estimate.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.sample_count >= CLOCK_SYNC_MIN_SAMPLES
    }

    /// Current best estimate of the provider's clock, in nanoseconds.
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        (self.local_now_ns() as i64 + self.smoothed_offset_ns).max(0) as u64
    }

    /// Number of samples collected so far.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn consumer_converges_against_loopback_provider() {
        let provider = Arc::new(ClockProvider::bind("127.0.0.1:0").await.unwrap());
        let addr = provider.local_addr().unwrap();
        let serve_handle = {
            let provider = provider.clone();
            tokio::spawn(async move {
                let _ = provider.serve().await;
            })
        };

        let mut consumer = ClockConsumer::connect(addr).await.unwrap();
        consumer.wait_for_sync().await.unwrap();
        assert!(consumer.is_synced());

        let provider_now = provider.now_ns();
        let consumer_now = consumer.now_ns();
        let drift = (provider_now as i64 - consumer_now as i64).unsigned_abs();
        assert!(drift < 50_000_000, "drift too large: {drift}ns");

        serve_handle.abort();
    }

    #[tokio::test]
    async fn wait_for_sync_times_out_without_a_provider() {
        let dead_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut consumer = ClockConsumer::connect(dead_addr).await.unwrap();
        // Nothing is listening on port 1, so every send either errors
        // immediately (connection refused) or never gets a reply; either
        // way wait_for_sync must not hang.
        let result = tokio::time::timeout(Duration::from_secs(15), consumer.wait_for_sync()).await;
        assert!(result.is_ok(), "wait_for_sync itself must bound its own wait");
    }
}
