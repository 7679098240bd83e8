//! Responder role.
//!
//! The responder captures the kernel receive timestamps of every probe and
//! returns them to the probe's sender in a [`ReplyPacket`]. Probe content is
//! never inspected.

use std::{io, net::SocketAddr};

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::{
    ancillary::{extract_timestamps, CONTROL_BUFFER_LEN},
    error::{Error, Result},
    hwstamp,
    modes::TimestampDomain,
    packets::ReplyPacket,
    report::{OutputFormat, ReceiverReport},
    session::Session,
    socket::{bind_udp, enable_responder_timestamping, into_tokio, recv_datagram},
    timestamp::TimestampTriple,
};

const RECV_BUFFER_LEN: usize = 1024;

/// Responder settings, resolved once from the command line.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    pub interface: String,
    pub local_addr: SocketAddr,
    pub timestamp_domain: TimestampDomain,
    pub verbose: bool,
    pub output_format: OutputFormat,
}

/// One probe answered by the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServedProbe {
    /// 1-based count of probes served.
    pub exchange: u64,
    pub peer: SocketAddr,
    pub bytes_received: usize,
    pub bytes_sent: usize,
    /// Receive timestamps echoed back to the peer.
    pub receive: TimestampTriple,
}

/// Builds the reply for a probe received with `receive` timestamps.
///
/// The triple is carried unmodified, empty slots included.
pub fn assemble_reply(receive: &TimestampTriple) -> ReplyPacket {
    ReplyPacket::new(*receive)
}

/// A timestamping socket bound for the responder role.
pub struct Receiver {
    socket: UdpSocket,
    options: ReceiverOptions,
    session: Session,
}

impl Receiver {
    /// Binds the responder socket and enables receive timestamping.
    pub fn bind(options: ReceiverOptions) -> Result<Self> {
        let std_socket = bind_udp(options.local_addr, true)?;

        if options.timestamp_domain == TimestampDomain::Hardware {
            hwstamp::configure_interface(&options.interface, &std_socket)?;
        }
        enable_responder_timestamping(&std_socket)?;

        let socket = into_tokio(std_socket)?;
        Ok(Receiver {
            socket,
            options,
            session: Session::new(),
        })
    }

    pub fn options(&self) -> &ReceiverOptions {
        &self.options
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Error::Receive)
    }

    /// Number of probes answered so far.
    pub fn served(&self) -> u64 {
        self.session.exchanges()
    }

    /// Waits for one probe and answers it.
    pub async fn serve_one(&self) -> Result<ServedProbe> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let mut control = [0u8; CONTROL_BUFFER_LEN];

        let received = recv_datagram(&self.socket, &mut buf, &mut control).await?;
        let peer = received.source.ok_or_else(|| {
            Error::Receive(io::Error::new(
                io::ErrorKind::InvalidData,
                "probe without source address",
            ))
        })?;
        if received.control_truncated {
            log::warn!("Probe control data from {} was truncated", peer);
        }

        let receive = extract_timestamps(&control[..received.control_len]);
        if receive.is_empty() {
            log::debug!("No receive timestamps for probe from {}", peer);
        }

        let reply = assemble_reply(&receive);
        let bytes_sent = self
            .socket
            .send_to(&reply.to_bytes(), peer)
            .await
            .map_err(Error::Send)?;

        Ok(ServedProbe {
            exchange: self.session.next_exchange(),
            peer,
            bytes_received: received.bytes,
            bytes_sent,
            receive,
        })
    }
}

/// Serves probes until cancelled or a socket operation fails. Returns the
/// number of probes answered.
pub async fn run_receiver(options: ReceiverOptions, cancel: CancellationToken) -> Result<u64> {
    let receiver = Receiver::bind(options)?;
    let options = receiver.options();

    let host = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    log::info!(
        "Responder listening on {} ({}), {} timestamps",
        receiver.local_addr()?,
        host,
        options.timestamp_domain
    );

    loop {
        let served = tokio::select! {
            _ = cancel.cancelled() => break,
            result = receiver.serve_one() => result?,
        };
        ReceiverReport::new(&served, options.verbose).print(options.output_format);
    }

    log::info!("Responder finished after {} probes", receiver.served());
    Ok(receiver.served())
}
