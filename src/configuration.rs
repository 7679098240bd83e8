use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs},
    time::Duration,
};

pub use clap::Parser;
use thiserror::Error;

use crate::{
    error::{Error, Result},
    modes::{ReportMode, TimestampDomain},
    receiver::ReceiverOptions,
    report::OutputFormat,
    sender::SenderOptions,
};

/// Default UDP port shared by both roles.
pub const DEFAULT_PORT: u16 = 3190;

/// Command-line configuration problems detected before any socket is opened.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("remote address (-r) is required unless running as responder (-i)")]
    MissingRemoteAddress,
    #[error("interface name '{0}' must be 1 to 15 bytes")]
    InvalidInterfaceName(String),
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("remote port must not be zero")]
    ZeroRemotePort,
}

/// Kernel-timestamped round-trip and one-way delay measurement.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Configuration {
    /// Network interface to configure for hardware timestamping
    #[clap(short = 'I', long)]
    pub interface: String,

    /// Clock domain the metrics are computed from
    #[clap(long, value_enum, default_value_t = TimestampDomain::Hardware)]
    pub domain: TimestampDomain,

    /// Output format for per-exchange reports
    #[clap(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,

    /// Print all timestamps and both metrics
    #[clap(short, long)]
    pub verbose: bool,

    /// Run as responder instead of initiator
    #[clap(short = 'i', long)]
    pub responder: bool,

    /// Responder host name or address
    #[clap(short = 'r', long)]
    pub remote_addr: Option<String>,

    /// Responder UDP port
    #[clap(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub remote_port: u16,

    /// Metric reported when not verbose
    #[clap(long = "report", value_enum, default_value_t = ReportMode::Rtt)]
    pub report_mode: ReportMode,

    /// Pause between exchanges, in milliseconds
    #[clap(long, default_value_t = 200)]
    pub interval_ms: u64,

    /// Transmit notification deadline, in milliseconds
    #[clap(long, default_value_t = 1000)]
    pub notify_timeout_ms: u64,

    /// Stop after this many exchanges
    #[clap(short = 'c', long)]
    pub count: Option<u64>,

    /// Both hosts share a synchronized clock (silences one-way delay warnings)
    #[clap(long)]
    pub clock_synchronized: bool,

    /// Responder listen address
    #[clap(short = 'l', long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub local_addr: IpAddr,

    /// Responder listen port
    #[clap(short = 'o', long, default_value_t = DEFAULT_PORT)]
    pub local_port: u16,
}

impl Configuration {
    /// Checks option combinations clap cannot express.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.interface.is_empty() || self.interface.len() >= nix::libc::IFNAMSIZ {
            return Err(ConfigurationError::InvalidInterfaceName(
                self.interface.clone(),
            ));
        }
        if self.responder {
            return Ok(());
        }
        if self.remote_addr.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigurationError::MissingRemoteAddress);
        }
        if self.remote_port == 0 {
            return Err(ConfigurationError::ZeroRemotePort);
        }
        if self.notify_timeout_ms == 0 {
            return Err(ConfigurationError::ZeroValue("notify timeout"));
        }
        if self.count == Some(0) {
            return Err(ConfigurationError::ZeroValue("count"));
        }
        Ok(())
    }

    /// Resolves the responder address and builds the initiator settings.
    pub fn sender_options(&self) -> Result<SenderOptions> {
        let host = self
            .remote_addr
            .clone()
            .ok_or(ConfigurationError::MissingRemoteAddress)?;
        let target = resolve(&host, self.remote_port)?;
        log::debug!("Resolved '{}' to {}", host, target);

        Ok(SenderOptions {
            interface: self.interface.clone(),
            host,
            target,
            timestamp_domain: self.domain,
            report_mode: self.report_mode,
            verbose: self.verbose,
            output_format: self.output_format,
            interval: Duration::from_millis(self.interval_ms),
            notify_timeout: Duration::from_millis(self.notify_timeout_ms),
            count: self.count,
            clock_synchronized: self.clock_synchronized,
        })
    }

    pub fn receiver_options(&self) -> ReceiverOptions {
        ReceiverOptions {
            interface: self.interface.clone(),
            local_addr: SocketAddr::new(self.local_addr, self.local_port),
            timestamp_domain: self.domain,
            verbose: self.verbose,
            output_format: self.output_format,
        }
    }
}

/// Resolves `host`, preferring an IPv4 address when both families exist.
fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let resolve_err = |source| Error::Resolve {
        host: host.to_string(),
        source,
    };
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs().map_err(resolve_err)?.collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            resolve_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses",
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Configuration {
        Configuration::try_parse_from(std::iter::once("kstamp").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let conf = parse(&["-I", "eth0", "-r", "192.0.2.1"]);
        assert_eq!(conf.domain, TimestampDomain::Hardware);
        assert_eq!(conf.report_mode, ReportMode::Rtt);
        assert_eq!(conf.output_format, OutputFormat::Text);
        assert_eq!(conf.remote_port, DEFAULT_PORT);
        assert_eq!(conf.local_port, DEFAULT_PORT);
        assert_eq!(conf.interval_ms, 200);
        assert!(!conf.responder);
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn test_interface_is_required() {
        assert!(Configuration::try_parse_from(["kstamp", "-r", "192.0.2.1"]).is_err());
    }

    #[test]
    fn test_initiator_needs_remote() {
        let conf = parse(&["-I", "eth0"]);
        assert_eq!(
            conf.validate(),
            Err(ConfigurationError::MissingRemoteAddress)
        );
    }

    #[test]
    fn test_responder_needs_no_remote() {
        let conf = parse(&["-I", "eth0", "-i", "-o", "4000", "-l", "127.0.0.1"]);
        assert!(conf.validate().is_ok());
        let opts = conf.receiver_options();
        assert_eq!(opts.local_addr, "127.0.0.1:4000".parse().unwrap());
        assert_eq!(opts.timestamp_domain, TimestampDomain::Hardware);
    }

    #[test]
    fn test_interface_name_too_long() {
        let conf = parse(&["-I", "abcdefghijklmnop", "-i"]);
        assert!(matches!(
            conf.validate(),
            Err(ConfigurationError::InvalidInterfaceName(_))
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let conf = parse(&["-I", "lo", "-r", "127.0.0.1", "-c", "0"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::ZeroValue("count")));

        let conf = parse(&["-I", "lo", "-r", "127.0.0.1", "--notify-timeout-ms", "0"]);
        assert_eq!(
            conf.validate(),
            Err(ConfigurationError::ZeroValue("notify timeout"))
        );

        let conf = parse(&["-I", "lo", "-r", "127.0.0.1", "-p", "0"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::ZeroRemotePort));
    }

    #[test]
    fn test_sender_options_from_literal_address() {
        let conf = parse(&[
            "-I",
            "lo",
            "-r",
            "127.0.0.1",
            "-p",
            "5000",
            "--domain",
            "software",
            "--report",
            "one-way-delay",
            "--interval-ms",
            "50",
            "-c",
            "3",
            "-f",
            "kv",
            "-v",
        ]);
        let opts = conf.sender_options().unwrap();
        assert_eq!(opts.target, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(opts.host, "127.0.0.1");
        assert_eq!(opts.timestamp_domain, TimestampDomain::Software);
        assert_eq!(opts.report_mode, ReportMode::OneWayDelay);
        assert_eq!(opts.interval, Duration::from_millis(50));
        assert_eq!(opts.count, Some(3));
        assert_eq!(opts.output_format, OutputFormat::Kv);
        assert!(opts.verbose);
    }

    #[test]
    fn test_resolve_literals() {
        assert_eq!(
            resolve("127.0.0.1", 80).unwrap(),
            "127.0.0.1:80".parse().unwrap()
        );
        assert_eq!(resolve("::1", 80).unwrap(), "[::1]:80".parse().unwrap());
    }

    #[test]
    fn test_resolve_failure() {
        assert!(matches!(
            resolve("no-such-host.invalid", 1),
            Err(Error::Resolve { .. })
        ));
    }
}
