//! Datagram payloads exchanged between the initiator and the responder.
//!
//! The probe is an opaque fixed string; the responder never looks at it.
//! The reply carries the responder's receive timestamps in an explicit,
//! versioned, big-endian layout so both ends agree on it regardless of the
//! host's native `timespec` representation.

use thiserror::Error;

use crate::timestamp::{RawTimestamp, TimestampTriple, NANOS_PER_SEC, TRIPLE_LEN};

/// Payload of every probe datagram.
pub const PROBE_PAYLOAD: &[u8] = b"kstamp-probe";

/// Current reply format version.
pub const REPLY_VERSION: u8 = 1;

/// Size of the reply header (version + MBZ).
pub const REPLY_HEADER_LEN: usize = 8;

/// Size of one encoded timestamp entry (seconds + nanoseconds).
pub const TIMESTAMP_WIRE_LEN: usize = 16;

/// Total size of an encoded reply.
pub const REPLY_LEN: usize = REPLY_HEADER_LEN + TRIPLE_LEN * TIMESTAMP_WIRE_LEN;

const _: () = assert!(REPLY_LEN == 56);

/// Errors produced while decoding a reply payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The datagram is shorter than a reply.
    #[error("Reply truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// The version byte is not understood.
    #[error("Unsupported reply version {0}")]
    UnsupportedVersion(u8),
    /// A timestamp entry is out of range.
    #[error("Invalid timestamp in slot {slot}: {seconds}s {nanoseconds}ns")]
    InvalidTimestamp {
        slot: usize,
        seconds: i64,
        nanoseconds: i64,
    },
}

/// Responder reply carrying the receive timestamps of a probe.
///
/// Wire format:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    Version    |                 MBZ (7 octets)                |
/// +-+-+-+-+-+-+-+-+                                               +
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   Software Seconds (signed)                   |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 Software Nanoseconds (signed)                 |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |             Reserved Seconds / Nanoseconds (16 octets)        |
/// ~                                                               ~
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   Hardware Seconds (signed)                   |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 Hardware Nanoseconds (signed)                 |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyPacket {
    /// Format version.
    pub version: u8,
    /// Timestamps captured by the responder when the probe arrived.
    pub receive_timestamps: TimestampTriple,
}

impl ReplyPacket {
    /// Creates a reply echoing the given receive timestamps unmodified.
    pub fn new(receive_timestamps: TimestampTriple) -> Self {
        Self {
            version: REPLY_VERSION,
            receive_timestamps,
        }
    }

    /// Serializes the reply to its big-endian wire format.
    pub fn to_bytes(&self) -> [u8; REPLY_LEN] {
        let mut buf = [0u8; REPLY_LEN];
        buf[0] = self.version;
        for (i, entry) in self.receive_timestamps.entries.iter().enumerate() {
            let off = REPLY_HEADER_LEN + i * TIMESTAMP_WIRE_LEN;
            buf[off..off + 8].copy_from_slice(&entry.seconds.to_be_bytes());
            buf[off + 8..off + 16].copy_from_slice(&entry.nanoseconds.to_be_bytes());
        }
        buf
    }

    /// Deserializes a reply from its wire format.
    ///
    /// Trailing bytes beyond [`REPLY_LEN`] are ignored. MBZ bytes are not
    /// checked so later versions may use them.
    ///
    /// # Errors
    /// Returns a [`WireError`] if the buffer is too short, the version is
    /// unknown, or a timestamp entry is out of range.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < REPLY_LEN {
            return Err(WireError::Truncated {
                expected: REPLY_LEN,
                actual: buf.len(),
            });
        }
        if buf[0] != REPLY_VERSION {
            return Err(WireError::UnsupportedVersion(buf[0]));
        }

        let mut entries = [RawTimestamp::default(); TRIPLE_LEN];
        for (slot, entry) in entries.iter_mut().enumerate() {
            let off = REPLY_HEADER_LEN + slot * TIMESTAMP_WIRE_LEN;
            let seconds = read_i64(&buf[off..off + 8]);
            let nanoseconds = read_i64(&buf[off + 8..off + 16]);
            if seconds < 0 || !(0..NANOS_PER_SEC as i64).contains(&nanoseconds) {
                return Err(WireError::InvalidTimestamp {
                    slot,
                    seconds,
                    nanoseconds,
                });
            }
            *entry = RawTimestamp::new(seconds, nanoseconds);
        }

        Ok(Self {
            version: buf[0],
            receive_timestamps: TimestampTriple { entries },
        })
    }
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    i64::from_be_bytes(raw)
}
