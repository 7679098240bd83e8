//! Decoding of ancillary (control) data returned by `recvmsg`.
//!
//! The control buffer is walked record by record with explicit bounds checks
//! instead of the `CMSG_*` pointer macros, so a short or truncated buffer can
//! never cause a read past its end. Records that do not fit are ignored.

use std::mem::size_of;

use nix::libc;

use crate::timestamp::{RawTimestamp, TimestampTriple, TRIPLE_LEN};

/// Control buffer size used for every receive.
///
/// Large enough for an `SCM_TIMESTAMPING` record next to `SCM_TIMESTAMPNS`
/// and the `IP_RECVERR` record the error queue attaches.
pub const CONTROL_BUFFER_LEN: usize = 256;

/// Size of the `SCM_TIMESTAMPING` payload (`struct scm_timestamping`).
pub const TIMESTAMPING_PAYLOAD_LEN: usize = TRIPLE_LEN * size_of::<libc::timespec>();

/// `SCM_TIMESTAMPING` shares its value with the `SO_TIMESTAMPING` option.
const SCM_TIMESTAMPING: libc::c_int = libc::SO_TIMESTAMPING;

/// Rounds `len` up to the control message alignment (`CMSG_ALIGN`).
const fn cmsg_align(len: usize) -> usize {
    let align = size_of::<usize>();
    (len + align - 1) & !(align - 1)
}

/// Aligned size of a control message header.
pub const fn header_len() -> usize {
    cmsg_align(size_of::<libc::cmsghdr>())
}

/// Total length of one record carrying `payload_len` bytes (`CMSG_LEN`).
pub const fn record_len(payload_len: usize) -> usize {
    header_len() + payload_len
}

/// Space one record occupies in a buffer, padding included (`CMSG_SPACE`).
pub const fn record_space(payload_len: usize) -> usize {
    header_len() + cmsg_align(payload_len)
}

/// A single control message borrowed from a control buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRecord<'a> {
    /// Originating protocol level (`cmsg_level`).
    pub level: libc::c_int,
    /// Protocol-specific type (`cmsg_type`).
    pub kind: libc::c_int,
    /// Payload bytes, without header or trailing padding.
    pub data: &'a [u8],
}

/// Iterator over the records of a control buffer.
pub struct ControlRecords<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ControlRecords<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }
}

impl<'a> Iterator for ControlRecords<'a> {
    type Item = ControlRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.buf.len().checked_sub(self.offset)?;
        if remaining < size_of::<libc::cmsghdr>() {
            return None;
        }

        // SAFETY: at least size_of::<cmsghdr>() bytes are available at offset,
        // and read_unaligned has no alignment requirement.
        let hdr: libc::cmsghdr = unsafe {
            std::ptr::read_unaligned(self.buf[self.offset..].as_ptr().cast::<libc::cmsghdr>())
        };

        let len = hdr.cmsg_len as usize;
        if len < header_len() || len > remaining {
            // Malformed or truncated (MSG_CTRUNC): nothing after it can be trusted.
            self.offset = self.buf.len();
            return None;
        }

        let data = &self.buf[self.offset + header_len()..self.offset + len];
        self.offset = self.offset.saturating_add(cmsg_align(len));

        Some(ControlRecord {
            level: hdr.cmsg_level,
            kind: hdr.cmsg_type,
            data,
        })
    }
}

/// Extracts the `SCM_TIMESTAMPING` triple from a control buffer.
///
/// Records are scanned in order and every matching record overwrites the
/// previous result. When no complete record is present the all-zero triple
/// is returned; that is a valid outcome (e.g. hardware stamping disabled).
pub fn extract_timestamps(control: &[u8]) -> TimestampTriple {
    let mut triple = TimestampTriple::default();

    for record in ControlRecords::new(control) {
        if record.level != libc::SOL_SOCKET || record.kind != SCM_TIMESTAMPING {
            continue;
        }
        match decode_timestamping(record.data) {
            Some(decoded) => triple = decoded,
            None => log::debug!(
                "Ignoring short SCM_TIMESTAMPING record ({} bytes)",
                record.data.len()
            ),
        }
    }

    triple
}

fn decode_timestamping(data: &[u8]) -> Option<TimestampTriple> {
    if data.len() < TIMESTAMPING_PAYLOAD_LEN {
        return None;
    }

    // SAFETY: length checked above; read_unaligned tolerates any alignment.
    let raw: [libc::timespec; TRIPLE_LEN] =
        unsafe { std::ptr::read_unaligned(data.as_ptr().cast::<[libc::timespec; TRIPLE_LEN]>()) };

    let mut entries = [RawTimestamp::default(); TRIPLE_LEN];
    for (entry, ts) in entries.iter_mut().zip(raw.iter()) {
        *entry = RawTimestamp::new(ts.tv_sec as i64, ts.tv_nsec as i64);
    }
    Some(TimestampTriple { entries })
}

/// Encodes one control record the way the kernel lays it out.
#[cfg(test)]
pub(crate) fn encode_record(level: libc::c_int, kind: libc::c_int, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; record_space(payload.len())];
    // SAFETY: an all-zero cmsghdr is valid; padding fields stay zero.
    let mut hdr: libc::cmsghdr = unsafe { std::mem::zeroed() };
    hdr.cmsg_len = record_len(payload.len()) as _;
    hdr.cmsg_level = level;
    hdr.cmsg_type = kind;
    // SAFETY: buf holds at least header_len() bytes.
    unsafe { std::ptr::write_unaligned(buf.as_mut_ptr().cast::<libc::cmsghdr>(), hdr) };
    buf[header_len()..header_len() + payload.len()].copy_from_slice(payload);
    buf
}

/// Encodes an `SCM_TIMESTAMPING` record for the given triple.
#[cfg(test)]
pub(crate) fn encode_timestamping(triple: &TimestampTriple) -> Vec<u8> {
    // SAFETY: timespec is plain data; all-zero is valid.
    let mut raw: [libc::timespec; TRIPLE_LEN] = unsafe { std::mem::zeroed() };
    for (ts, entry) in raw.iter_mut().zip(triple.entries.iter()) {
        ts.tv_sec = entry.seconds as _;
        ts.tv_nsec = entry.nanoseconds as _;
    }
    let mut payload = vec![0u8; TIMESTAMPING_PAYLOAD_LEN];
    // SAFETY: payload is exactly the size of the array.
    unsafe {
        std::ptr::write_unaligned(
            payload.as_mut_ptr().cast::<[libc::timespec; TRIPLE_LEN]>(),
            raw,
        )
    };
    encode_record(libc::SOL_SOCKET, SCM_TIMESTAMPING, &payload)
}
