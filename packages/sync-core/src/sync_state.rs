//! The canonical shared state document and its wire form (component C1).
//!
//! [`SyncState`] is the value every client consumes to decide what to
//! render right now: which track, at what reference-clock instant, and
//! whether the fleet is paused or stopped. It is built by the
//! [`crate::orchestrator::Orchestrator`], serialized to JSON for the control
//! plane, and is otherwise an immutable value — mutations always produce a
//! new value rather than patching one in place.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::protocol_constants::{NO_CURRENT_TRACK, PROTOCOL_VERSION, UNKNOWN_DURATION};

/// A single playlist entry.
///
/// Serializes as the 2-element tuple array `[uri, duration_ns]`, not a JSON
/// object — the wire contract models a playlist entry as a GVariant tuple,
/// and json-glib renders tuples as arrays, not objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Media URI. Resolution and fetching is each client's own
    /// responsibility (content distribution is out of scope).
    pub uri: String,
    /// Duration in nanoseconds, or [`UNKNOWN_DURATION`] if not known ahead
    /// of time.
    pub duration_ns: u64,
}

impl Serialize for Track {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.uri, self.duration_ns).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Track {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (uri, duration_ns) = <(String, u64)>::deserialize(deserializer)?;
        Ok(Self { uri, duration_ns })
    }
}

impl Track {
    /// Creates a track with a known duration.
    pub fn new(uri: impl Into<String>, duration_ns: u64) -> Self {
        Self {
            uri: uri.into(),
            duration_ns,
        }
    }

    /// Creates a track whose duration is not known ahead of time.
    pub fn with_unknown_duration(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            duration_ns: UNKNOWN_DURATION,
        }
    }

    /// Whether this track's duration is the `UNKNOWN_DURATION` sentinel.
    #[must_use]
    pub fn duration_is_unknown(&self) -> bool {
        self.duration_ns == UNKNOWN_DURATION
    }
}

/// An ordered sequence of tracks plus a cursor into it.
///
/// `current_track == NONE` (see [`Playlist::current_track_index`]) is legal
/// only as an end-of-playlist indicator; while it holds, clients remain
/// idle.
///
/// Serializes as the 2-element tuple array `[current_track, tracks]`, for
/// the same GVariant-tuple-as-JSON-array reason as [`Track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    current_track: u64,
    tracks: Vec<Track>,
}

impl Serialize for Playlist {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.current_track, &self.tracks).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Playlist {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (current_track, tracks) = <(u64, Vec<Track>)>::deserialize(deserializer)?;
        Ok(Self { current_track, tracks })
    }
}

impl Playlist {
    /// Builds a playlist at track 0.
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            current_track: if tracks.is_empty() { NO_CURRENT_TRACK } else { 0 },
            tracks,
        }
    }

    /// An empty playlist, cursor at the end-of-playlist sentinel.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            current_track: NO_CURRENT_TRACK,
            tracks: Vec::new(),
        }
    }

    /// Returns the track listing.
    #[must_use]
    pub fn get_tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Returns a new playlist with the track listing replaced. The cursor
    /// is preserved if still in range, otherwise reset to 0 (or to the
    /// end-of-playlist sentinel if the new listing is empty).
    #[must_use]
    pub fn set_tracks(&self, tracks: Vec<Track>) -> Self {
        let current_track = if tracks.is_empty() {
            NO_CURRENT_TRACK
        } else if self.current_track != NO_CURRENT_TRACK
            && (self.current_track as usize) < tracks.len()
        {
            self.current_track
        } else {
            0
        };
        Self {
            current_track,
            tracks,
        }
    }

    /// Returns a new playlist with the cursor moved to `index`.
    ///
    /// Passing `NO_CURRENT_TRACK` sets the end-of-playlist sentinel.
    #[must_use]
    pub fn set_current_track(&self, index: u64) -> Self {
        Self {
            current_track: index,
            tracks: self.tracks.clone(),
        }
    }

    /// The raw cursor value (`NO_CURRENT_TRACK` means end-of-playlist).
    #[must_use]
    pub fn current_track_index(&self) -> u64 {
        self.current_track
    }

    /// Whether the cursor is at the end-of-playlist sentinel.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.current_track == NO_CURRENT_TRACK
    }

    /// The track at the cursor, if any.
    #[must_use]
    pub fn current_track(&self) -> Option<&Track> {
        if self.is_at_end() {
            None
        } else {
            self.tracks.get(self.current_track as usize)
        }
    }

    /// The URI of the track at the cursor, if any.
    #[must_use]
    pub fn current_uri(&self) -> Option<&str> {
        self.current_track().map(|t| t.uri.as_str())
    }

    /// Whether the cursor is on the last track.
    #[must_use]
    pub fn is_on_last_track(&self) -> bool {
        !self.is_at_end() && self.current_track as usize + 1 >= self.tracks.len()
    }
}

/// Per-client crop, expressed as pixels trimmed from each edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub right: u32,
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub bottom: u32,
}

/// Per-client output scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    pub width: u32,
    pub height: u32,
}

/// Per-client box offset (letterboxing), expressed as pixels of padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxOffset {
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub right: u32,
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub bottom: u32,
}

/// Per-client video transform: crop → rotate → scale → box offset, applied
/// in that fixed order. Absent fields mean an identity transform for that
/// stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    /// Rotation direction code (degrees clockwise / 90, i.e. 0..=3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<BoxOffset>,
}

impl Transform {
    /// Whether every stage of the transform is identity.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self == &Transform::default()
    }
}

/// The canonical shared state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub version: u64,
    #[serde(rename = "clock-address", alias = "clock_address")]
    pub clock_address: String,
    #[serde(rename = "clock-port", alias = "clock_port")]
    pub clock_port: u16,
    pub playlist: Playlist,
    #[serde(rename = "base-time", alias = "base_time")]
    pub base_time: u64,
    #[serde(rename = "base-time-offset", alias = "base_time_offset")]
    pub base_time_offset: u64,
    #[serde(rename = "stream-start-delay", alias = "stream_start_delay")]
    pub stream_start_delay: u64,
    pub latency: u64,
    pub stopped: bool,
    pub paused: bool,
    /// Per-client video transforms, keyed by client id. Absent for clients
    /// with no transform configured.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub transform: HashMap<String, Transform>,
}

/// Errors produced while decoding a frame from the wire.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidFrame {
    /// The bytes were not valid JSON, or a required field was missing or
    /// had the wrong type tag.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// `version` did not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version {found}, expected {expected}")]
    VersionMismatch { found: u64, expected: u64 },
}

impl SyncState {
    /// Constructs a `SyncState` with defaulted numerics = 0 and boolean
    /// flags = false, at protocol version 1.
    #[must_use]
    pub fn build(playlist: Playlist, latency: u64, stream_start_delay: u64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            clock_address: String::new(),
            clock_port: 0,
            playlist,
            base_time: 0,
            base_time_offset: 0,
            stream_start_delay,
            latency,
            stopped: false,
            paused: false,
            transform: HashMap::new(),
        }
    }

    /// Serializes to the JSON wire form (one document, no trailing
    /// newline — the control plane relies on read/write boundaries, not a
    /// delimiter).
    ///
    /// # Errors
    ///
    /// Only fails if a transform key fails JSON encoding, which cannot
    /// happen for the types in this module; kept fallible so callers don't
    /// need to special-case an infallible serializer.
    pub fn serialize(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Validates `version` first, then decodes the remaining fields.
    /// Unknown fields are tolerated when the version matches (forward
    /// compatibility); a version mismatch is reported before any other
    /// validation runs.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, InvalidFrame> {
        let probe: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| InvalidFrame::Malformed(e.to_string()))?;
        let version = probe
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| InvalidFrame::Malformed("missing or non-numeric version".into()))?;
        if version != PROTOCOL_VERSION {
            return Err(InvalidFrame::VersionMismatch {
                found: version,
                expected: PROTOCOL_VERSION,
            });
        }
        serde_json::from_value(probe).map_err(|e| InvalidFrame::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SyncState {
        let mut s = SyncState::build(
            Playlist::new(vec![
                Track::new("https://ex/a", 120_000_000_000),
                Track::with_unknown_duration("https://ex/b"),
            ]),
            300_000_000,
            500_000_000,
        );
        s.clock_address = "192.0.2.10".into();
        s.clock_port = 35421;
        s.base_time = 1_723_456_789_000_000_000;
        s.transform.insert(
            "kitchen".into(),
            Transform {
                rotate: Some(1),
                ..Default::default()
            },
        );
        s
    }

    /// Property P1: round-trip for every legal SyncState.
    #[test]
    fn round_trips_through_wire_form() {
        let s = sample();
        let bytes = s.serialize().unwrap();
        let back = SyncState::deserialize(&bytes).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn unknown_duration_survives_round_trip() {
        let s = sample();
        let bytes = s.serialize().unwrap();
        let back = SyncState::deserialize(&bytes).unwrap();
        assert!(back.playlist.get_tracks()[1].duration_is_unknown());
    }

    #[test]
    fn canonical_output_uses_dash_case() {
        let s = sample();
        let bytes = s.serialize().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"clock-address\""));
        assert!(text.contains("\"base-time-offset\""));
        assert!(!text.contains("\"clock_address\""));
    }

    #[test]
    fn accepts_snake_case_input() {
        let json = br#"{
            "version": 1, "clock_address": "1.2.3.4", "clock_port": 9,
            "playlist": [0, [["a", 1]]],
            "base_time": 0, "base_time_offset": 0, "stream_start_delay": 0,
            "latency": 0, "stopped": false, "paused": false
        }"#;
        let s = SyncState::deserialize(json).unwrap();
        assert_eq!(s.clock_address, "1.2.3.4");
    }

    #[test]
    fn playlist_round_trips_as_tuple_array_on_the_wire() {
        let s = sample();
        let bytes = s.serialize().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let playlist = &value["playlist"];
        assert!(playlist.is_array(), "playlist must serialize as a tuple array, got {playlist}");
        assert_eq!(playlist[0], serde_json::json!(0));
        assert!(playlist[1].is_array());
        assert_eq!(playlist[1][0], serde_json::json!(["https://ex/a", 120_000_000_000u64]));
    }

    #[test]
    fn rejects_version_mismatch() {
        let json = br#"{"version": 2}"#;
        let err = SyncState::deserialize(json).unwrap_err();
        assert_eq!(
            err,
            InvalidFrame::VersionMismatch {
                found: 2,
                expected: 1
            }
        );
    }

    #[test]
    fn rejects_malformed_json() {
        let err = SyncState::deserialize(b"not json").unwrap_err();
        assert!(matches!(err, InvalidFrame::Malformed(_)));
    }

    #[test]
    fn tolerates_unknown_fields_when_version_matches() {
        let mut s = sample();
        let mut value = serde_json::to_value(&s).unwrap();
        value["extra_field_from_a_future_version"] = serde_json::json!("ignored");
        let bytes = serde_json::to_vec(&value).unwrap();
        let back = SyncState::deserialize(&bytes).unwrap();
        s.transform = back.transform.clone();
        assert_eq!(s, back);
    }

    #[test]
    fn set_tracks_resets_cursor_out_of_range() {
        let pl = Playlist::new(vec![Track::new("a", 1), Track::new("b", 2)]).set_current_track(1);
        let replaced = pl.set_tracks(vec![Track::new("c", 3)]);
        assert_eq!(replaced.current_track_index(), 0);
    }

    #[test]
    fn set_tracks_preserves_cursor_in_range() {
        let pl = Playlist::new(vec![Track::new("a", 1), Track::new("b", 2)]).set_current_track(1);
        let replaced = pl.set_tracks(vec![Track::new("x", 1), Track::new("y", 2)]);
        assert_eq!(replaced.current_track_index(), 1);
    }

    #[test]
    fn empty_playlist_is_at_end() {
        assert!(Playlist::empty().is_at_end());
        assert!(Playlist::empty().current_uri().is_none());
    }

    #[test]
    fn is_on_last_track_detects_boundary() {
        let pl = Playlist::new(vec![Track::new("a", 1), Track::new("b", 2)]);
        assert!(!pl.is_on_last_track());
        let pl = pl.set_current_track(1);
        assert!(pl.is_on_last_track());
    }
}
