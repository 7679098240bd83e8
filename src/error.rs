use std::{io, net::SocketAddr, time::Duration};

use nix::errno::Errno;
use thiserror::Error;

use crate::{configuration::ConfigurationError, packets::WireError};

/// Errors that end a measurement run.
///
/// Every variant is fatal to the run; the binary reports it and exits with a
/// non-zero status. The only transient condition, an empty error queue, is
/// retried internally and surfaces as [`Error::NotificationTimedOut`] once
/// its deadline passes.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Hardware timestamping is not supported on '{0}'")]
    Unsupported(String),

    #[error("Config hardware timestamping on '{interface}': {source}")]
    HardwareConfig { interface: String, source: Errno },

    #[error("setsockopt {option}: {source}")]
    SocketOption { option: &'static str, source: Errno },

    #[error("Cannot bind to address {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("Cannot resolve '{host}': {source}")]
    Resolve { host: String, source: io::Error },

    #[error("sendmsg: {0}")]
    Send(#[source] io::Error),

    #[error("recvmsg: {0}")]
    Receive(#[source] io::Error),

    #[error("No transmit timestamp on the error queue after {0:?}")]
    NotificationTimedOut(Duration),

    #[error("Malformed reply: {0}")]
    Wire(#[from] WireError),
}

pub type Result<T> = std::result::Result<T, Error>;
