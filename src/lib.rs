//! kstamp - network delay measurement with kernel packet timestamps.
//!
//! This crate provides an initiator/responder pair that measures round-trip
//! time and one-way delay from timestamps taken by the Linux network stack
//! (`SO_TIMESTAMPING`) or by the network interface hardware, rather than by
//! the application.
//!
//! # Usage
//!
//! Run as a responder (server):
//! ```bash
//! kstamp -i -I eth0 --local-addr 0.0.0.0 --local-port 3190
//! ```
//!
//! Run as an initiator (client):
//! ```bash
//! kstamp -I eth0 --remote-addr 192.168.1.1 --report rtt
//! ```

#[cfg(not(target_os = "linux"))]
compile_error!("kstamp relies on Linux SO_TIMESTAMPING and only builds on Linux");

/// Control-message decoding of kernel timestamps.
pub mod ancillary;
/// Command-line configuration and validation.
pub mod configuration;
/// Error types.
pub mod error;
/// Interface hardware timestamping setup.
pub mod hwstamp;
/// Metrics derived from exchange timestamps.
pub mod measurement;
/// Timestamp domain and report mode selection.
pub mod modes;
/// Probe and reply wire format.
pub mod packets;
/// Responder role.
pub mod receiver;
/// Per-exchange console reports.
pub mod report;
/// Initiator role.
pub mod sender;
/// Exchange counting.
pub mod session;
/// Timestamping socket setup and receive paths.
pub mod socket;
/// Human-readable timestamp rendering.
pub mod time;
/// Kernel timestamp values.
pub mod timestamp;

pub use error::{Error, Result};
