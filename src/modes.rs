use std::fmt;

use clap::ValueEnum;

/// Clock domain a metric is computed in.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampDomain {
    /// Timestamps taken by the host network stack.
    Software,
    /// Timestamps taken by the network interface hardware.
    #[default]
    Hardware,
}

impl fmt::Display for TimestampDomain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimestampDomain::Software => write!(f, "software"),
            TimestampDomain::Hardware => write!(f, "hardware"),
        }
    }
}

/// Metric the initiator reports on each exchange.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportMode {
    /// Round-trip time.
    #[default]
    Rtt,
    /// One-way delay; only meaningful with synchronized clocks.
    OneWayDelay,
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReportMode::Rtt => write!(f, "rtt"),
            ReportMode::OneWayDelay => write!(f, "one-way-delay"),
        }
    }
}
