use chrono::{DateTime, SecondsFormat, Utc};

use crate::timestamp::NANOS_PER_SEC;

/// Renders a nanosecond timestamp as an RFC 3339 UTC date.
///
/// Software timestamps come from `CLOCK_REALTIME`; hardware timestamps come
/// from the interface's PTP hardware clock, which is usually, but not
/// necessarily, disciplined to the same epoch. A zero value means the kernel
/// did not report the timestamp.
///
/// ```
/// use kstamp::time::format_nanos;
/// assert_eq!(format_nanos(0), "unavailable");
/// assert_eq!(format_nanos(1_700_000_000_123_456_789), "2023-11-14T22:13:20.123456789Z");
/// ```
pub fn format_nanos(nanos: u64) -> String {
    if nanos == 0 {
        return "unavailable".to_string();
    }
    match to_datetime(nanos) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Nanos, true),
        None => format!("{} ns", nanos),
    }
}

fn to_datetime(nanos: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(nanos / NANOS_PER_SEC).ok()?;
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    DateTime::<Utc>::from_timestamp(secs, subsec)
}
