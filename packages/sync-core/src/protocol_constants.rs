//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the wire contract and changing them would
//! break interoperability between server and client builds.

// ─────────────────────────────────────────────────────────────────────────────
// SyncState wire format
// ─────────────────────────────────────────────────────────────────────────────

/// Current (and only recognised) protocol version.
pub const PROTOCOL_VERSION: u64 = 1;

/// Sentinel duration meaning "unknown" (all-ones 64-bit value).
pub const UNKNOWN_DURATION: u64 = u64::MAX;

/// Sentinel `current_track` meaning "playlist exhausted".
pub const NO_CURRENT_TRACK: u64 = u64::MAX;

// ─────────────────────────────────────────────────────────────────────────────
// Control plane framing
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum read buffer both sides must support (servers).
pub const MIN_READ_BUFFER: usize = 4 * 1024;

/// Maximum frame size a client must accept.
pub const MAX_CLIENT_READ_BUFFER: usize = 16 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Clock plane
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for `wait_for_sync` before the client aborts the current
/// playback attempt.
pub const CLOCK_SYNC_TIMEOUT_MS: u64 = 10_000;

/// Minimum number of round-trips the clock consumer needs before it
/// considers its offset estimate stable.
pub const CLOCK_SYNC_MIN_SAMPLES: usize = 8;

/// Interval between clock ping/pong round-trips once synchronised.
pub const CLOCK_SYNC_INTERVAL_MS: u64 = 1_000;

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator / playback defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default target pipeline latency (ns) — 300 ms.
pub const DEFAULT_LATENCY_NS: u64 = 300_000_000;

/// Default grace period between tracks (ns) — 500 ms.
pub const DEFAULT_STREAM_START_DELAY_NS: u64 = 500_000_000;

/// Maximum allowed client-visible position deviation before a client issues
/// an alignment seek ("Seek tolerance").
pub const SEEK_TOLERANCE_NS: u64 = 200_000_000;

// ─────────────────────────────────────────────────────────────────────────────
// Application identity
// ─────────────────────────────────────────────────────────────────────────────

/// Default client id prefix used when no id is configured.
pub const CLIENT_ID_PREFIX: &str = "sync-client";

/// Capacity of the internal event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
