//! Metrics derived from the timestamps of one exchange.
//!
//! Every metric is a plain subtraction of two nanosecond values taken from
//! the same clock domain. The subtraction wraps: if the later timestamp is
//! missing or smaller (reordering, a zero entry on one side only) the result
//! is a huge value instead of an error. That artifact is reported as is.
//!
//! One-way delay compares a responder timestamp with an initiator timestamp.
//! It is only meaningful when both hosts share a synchronized time source.

use crate::{
    modes::{ReportMode, TimestampDomain},
    timestamp::TimestampTriple,
};

/// Timestamps gathered by the initiator during one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    /// Probe transmit timestamps, from the error queue.
    pub transmit: TimestampTriple,
    /// Reply receive timestamps, from the reply's control data.
    pub receive: TimestampTriple,
    /// Probe receive timestamps captured by the responder, from the reply payload.
    pub remote_receive: TimestampTriple,
}

impl Measurement {
    /// Round-trip time in nanoseconds.
    pub fn rtt(&self, domain: TimestampDomain) -> u64 {
        self.receive
            .nanos(domain)
            .wrapping_sub(self.transmit.nanos(domain))
    }

    /// One-way delay in nanoseconds; requires synchronized clocks.
    pub fn one_way_delay(&self, domain: TimestampDomain) -> u64 {
        self.remote_receive
            .nanos(domain)
            .wrapping_sub(self.transmit.nanos(domain))
    }

    /// The metric selected by `mode`.
    pub fn metric(&self, mode: ReportMode, domain: TimestampDomain) -> u64 {
        match mode {
            ReportMode::Rtt => self.rtt(domain),
            ReportMode::OneWayDelay => self.one_way_delay(domain),
        }
    }
}
