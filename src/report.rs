//! Per-exchange console reports.
//!
//! Three renderings are supported: human-readable text, one `key=value`
//! line per metric for scripts and tests, and one JSON object per exchange.

use crate::{
    modes::{ReportMode, TimestampDomain},
    receiver::ServedProbe,
    sender::{ExchangeOutcome, SenderOptions},
    time::format_nanos,
};

/// Output format for exchange reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// One `key=value` line per field.
    Kv,
    /// One JSON object per exchange.
    Json,
}

/// Report of one initiator exchange.
///
/// Only the fields the active configuration asks for are populated: the
/// selected metric, or everything in verbose mode.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SenderReport {
    pub exchange: u64,
    pub host: String,
    pub peer: String,
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub domain: TimestampDomain,
    pub clock_synchronized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_rx_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_way_delay_ns: Option<u64>,
}

impl SenderReport {
    /// Builds the report for `outcome` as configured by `options`.
    pub fn new(outcome: &ExchangeOutcome, options: &SenderOptions) -> Self {
        let domain = options.timestamp_domain;
        let m = &outcome.measurement;
        let verbose = options.verbose;
        let wants = |mode: ReportMode| verbose || options.report_mode == mode;

        SenderReport {
            exchange: outcome.exchange,
            host: options.host.clone(),
            peer: options.target.to_string(),
            bytes_sent: outcome.bytes_sent,
            bytes_received: outcome.bytes_received,
            domain,
            clock_synchronized: options.clock_synchronized,
            tx_ns: verbose.then(|| m.transmit.nanos(domain)),
            rx_ns: verbose.then(|| m.receive.nanos(domain)),
            remote_rx_ns: verbose.then(|| m.remote_receive.nanos(domain)),
            rtt_ns: wants(ReportMode::Rtt).then(|| m.rtt(domain)),
            one_way_delay_ns: wants(ReportMode::OneWayDelay).then(|| m.one_way_delay(domain)),
        }
    }

    /// Renders the report as output lines.
    pub fn lines(&self, format: OutputFormat) -> Vec<String> {
        match format {
            OutputFormat::Text => self.text_lines(),
            OutputFormat::Kv => self.kv_lines(),
            OutputFormat::Json => json_line(self),
        }
    }

    /// Prints the report in the given format.
    pub fn print(&self, format: OutputFormat) {
        for line in self.lines(format) {
            println!("{}", line);
        }
    }

    fn text_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let verbose = self.tx_ns.is_some();

        if verbose {
            lines.push(format!(
                "contacted server on '{}' ({})",
                self.host, self.peer
            ));
            lines.push(format!(
                "#{}: {} bytes sent, {} bytes received",
                self.exchange, self.bytes_sent, self.bytes_received
            ));
            lines.push(format!("------- {} timestamps -------", self.domain));
            for (label, value) in [
                ("tx", self.tx_ns),
                ("rx", self.rx_ns),
                ("rx_oneway", self.remote_rx_ns),
            ] {
                if let Some(ns) = value {
                    lines.push(format!("{:<10} {} ({})", label, ns, format_nanos(ns)));
                }
            }
        }
        if let Some(ns) = self.rtt_ns {
            lines.push(format!(
                "({}) round-trip time was {} nanoseconds",
                self.domain, ns
            ));
        }
        if let Some(ns) = self.one_way_delay_ns {
            lines.push(format!(
                "({}) oneway delay time was {} nanoseconds",
                self.domain, ns
            ));
            if !self.clock_synchronized {
                lines.push("Note: one-way delay assumes synchronized clocks".to_string());
            }
        }
        lines
    }

    fn kv_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("exchange={}", self.exchange),
            format!("peer={}", self.peer),
            format!("bytes_sent={}", self.bytes_sent),
            format!("bytes_received={}", self.bytes_received),
            format!("domain={}", self.domain),
            format!("clock_synchronized={}", self.clock_synchronized),
        ];
        for (key, value) in [
            ("tx_ns", self.tx_ns),
            ("rx_ns", self.rx_ns),
            ("remote_rx_ns", self.remote_rx_ns),
            ("rtt_ns", self.rtt_ns),
            ("one_way_delay_ns", self.one_way_delay_ns),
        ] {
            if let Some(v) = value {
                lines.push(format!("{}={}", key, v));
            }
        }
        lines
    }
}

/// Report of one probe served by the responder.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReceiverReport {
    pub exchange: u64,
    pub peer: String,
    pub bytes_received: usize,
    pub bytes_sent: usize,
    pub sw_rx_ns: u64,
    pub hw_rx_ns: u64,
    #[serde(skip)]
    verbose: bool,
}

impl ReceiverReport {
    pub fn new(served: &ServedProbe, verbose: bool) -> Self {
        ReceiverReport {
            exchange: served.exchange,
            peer: served.peer.to_string(),
            bytes_received: served.bytes_received,
            bytes_sent: served.bytes_sent,
            sw_rx_ns: served.receive.nanos(TimestampDomain::Software),
            hw_rx_ns: served.receive.nanos(TimestampDomain::Hardware),
            verbose,
        }
    }

    /// Renders the report as output lines.
    pub fn lines(&self, format: OutputFormat) -> Vec<String> {
        match format {
            OutputFormat::Text => {
                let mut lines = Vec::new();
                if self.verbose {
                    lines.push(format!("probe from {}", self.peer));
                }
                lines.push(format!(
                    "rx_oneway - sw: {} hw: {}",
                    self.sw_rx_ns, self.hw_rx_ns
                ));
                if self.verbose {
                    lines.push(format!("sw: {}", format_nanos(self.sw_rx_ns)));
                    lines.push(format!("hw: {}", format_nanos(self.hw_rx_ns)));
                }
                lines.push(format!(
                    "#{}: {} bytes received, {} bytes sent",
                    self.exchange, self.bytes_received, self.bytes_sent
                ));
                lines
            }
            OutputFormat::Kv => vec![
                format!("exchange={}", self.exchange),
                format!("peer={}", self.peer),
                format!("bytes_received={}", self.bytes_received),
                format!("bytes_sent={}", self.bytes_sent),
                format!("sw_rx_ns={}", self.sw_rx_ns),
                format!("hw_rx_ns={}", self.hw_rx_ns),
            ],
            OutputFormat::Json => json_line(self),
        }
    }

    /// Prints the report in the given format.
    pub fn print(&self, format: OutputFormat) {
        for line in self.lines(format) {
            println!("{}", line);
        }
    }
}

fn json_line<T: serde::Serialize>(value: &T) -> Vec<String> {
    match serde_json::to_string(value) {
        Ok(json) => vec![json],
        Err(e) => {
            log::warn!("Cannot serialize report: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        measurement::Measurement,
        timestamp::{RawTimestamp, TimestampTriple},
    };

    fn ns(sw: i64, hw: i64) -> TimestampTriple {
        TimestampTriple::new(RawTimestamp::new(0, sw), RawTimestamp::new(0, hw))
    }

    fn outcome() -> ExchangeOutcome {
        ExchangeOutcome {
            exchange: 3,
            bytes_sent: 12,
            bytes_received: 56,
            measurement: Measurement {
                transmit: ns(500, 1500),
                receive: ns(2200, 3200),
                remote_receive: ns(1000, 2000),
            },
        }
    }

    fn options(mode: ReportMode, domain: TimestampDomain, verbose: bool) -> SenderOptions {
        SenderOptions {
            interface: "eth0".to_string(),
            host: "peer.example".to_string(),
            target: "192.0.2.1:3190".parse().unwrap(),
            timestamp_domain: domain,
            report_mode: mode,
            verbose,
            output_format: OutputFormat::Kv,
            interval: Duration::from_millis(200),
            notify_timeout: Duration::from_secs(1),
            count: None,
            clock_synchronized: false,
        }
    }

    #[test]
    fn test_rtt_only_report() {
        let report = SenderReport::new(
            &outcome(),
            &options(ReportMode::Rtt, TimestampDomain::Software, false),
        );
        assert_eq!(report.rtt_ns, Some(1700));
        assert!(report.one_way_delay_ns.is_none());
        assert!(report.tx_ns.is_none());

        let lines = report.lines(OutputFormat::Kv);
        assert!(lines.contains(&"rtt_ns=1700".to_string()));
        assert!(lines.contains(&"domain=software".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("one_way_delay_ns=")));
    }

    #[test]
    fn test_one_way_delay_only_report() {
        let report = SenderReport::new(
            &outcome(),
            &options(ReportMode::OneWayDelay, TimestampDomain::Hardware, false),
        );
        assert_eq!(report.one_way_delay_ns, Some(500));
        assert!(report.rtt_ns.is_none());

        let text = report.lines(OutputFormat::Text);
        assert_eq!(text[0], "(hardware) oneway delay time was 500 nanoseconds");
        assert_eq!(text[1], "Note: one-way delay assumes synchronized clocks");
    }

    #[test]
    fn test_verbose_report_has_everything() {
        let report = SenderReport::new(
            &outcome(),
            &options(ReportMode::Rtt, TimestampDomain::Hardware, true),
        );
        assert_eq!(report.tx_ns, Some(1500));
        assert_eq!(report.rx_ns, Some(3200));
        assert_eq!(report.remote_rx_ns, Some(2000));
        assert_eq!(report.rtt_ns, Some(1700));
        assert_eq!(report.one_way_delay_ns, Some(500));

        let text = report.lines(OutputFormat::Text);
        assert_eq!(text[0], "contacted server on 'peer.example' (192.0.2.1:3190)");
        assert_eq!(text[1], "#3: 12 bytes sent, 56 bytes received");
        assert!(text.contains(&"(hardware) round-trip time was 1700 nanoseconds".to_string()));
    }

    #[test]
    fn test_hardware_absent_reports_zero() {
        let mut out = outcome();
        out.measurement = Measurement {
            transmit: ns(500, 0),
            receive: ns(2200, 0),
            remote_receive: ns(1000, 0),
        };
        let report = SenderReport::new(
            &out,
            &options(ReportMode::Rtt, TimestampDomain::Hardware, false),
        );
        assert_eq!(report.rtt_ns, Some(0));
    }

    #[test]
    fn test_sender_json_skips_absent_fields() {
        let report = SenderReport::new(
            &outcome(),
            &options(ReportMode::Rtt, TimestampDomain::Software, false),
        );
        let lines = report.lines(OutputFormat::Json);
        assert_eq!(lines.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(value["rtt_ns"], 1700);
        assert_eq!(value["domain"], "software");
        assert!(value.get("one_way_delay_ns").is_none());
        assert!(value.get("tx_ns").is_none());
    }

    #[test]
    fn test_receiver_report_lines() {
        let served = ServedProbe {
            exchange: 7,
            peer: "198.51.100.4:40000".parse().unwrap(),
            bytes_received: 12,
            bytes_sent: 56,
            receive: ns(1000, 2000),
        };
        let report = ReceiverReport::new(&served, false);
        assert_eq!(
            report.lines(OutputFormat::Text),
            vec![
                "rx_oneway - sw: 1000 hw: 2000".to_string(),
                "#7: 12 bytes received, 56 bytes sent".to_string(),
            ]
        );
        let kv = report.lines(OutputFormat::Kv);
        assert!(kv.contains(&"sw_rx_ns=1000".to_string()));
        assert!(kv.contains(&"hw_rx_ns=2000".to_string()));

        let json: serde_json::Value =
            serde_json::from_str(&report.lines(OutputFormat::Json)[0]).unwrap();
        assert_eq!(json["exchange"], 7);
        assert!(json.get("verbose").is_none());
    }
}
