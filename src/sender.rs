//! Initiator role.
//!
//! Each exchange sends one probe, collects the probe's transmit timestamps
//! from the socket error queue, waits for the responder's reply and combines
//! the three timestamp triples into a [`Measurement`].

use std::{net::SocketAddr, time::Duration};

use tokio::{net::UdpSocket, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    ancillary::{extract_timestamps, CONTROL_BUFFER_LEN},
    error::{Error, Result},
    hwstamp,
    measurement::Measurement,
    modes::{ReportMode, TimestampDomain},
    packets::{ReplyPacket, PROBE_PAYLOAD, REPLY_LEN},
    report::{OutputFormat, SenderReport},
    session::Session,
    socket::{
        bind_udp, enable_initiator_timestamping, into_tokio, poll_error_queue, recv_datagram,
        try_recv_error_queue, Received,
    },
    timestamp::TimestampTriple,
};

/// Receive buffer size. Larger than any expected datagram so that an
/// oversized reply is detected as such rather than silently truncated.
const RECV_BUFFER_LEN: usize = 1024;

/// Initiator settings, resolved once from the command line.
#[derive(Debug, Clone)]
pub struct SenderOptions {
    /// Interface whose hardware timestamping is configured.
    pub interface: String,
    /// Host name or address as given by the user.
    pub host: String,
    /// Resolved responder address.
    pub target: SocketAddr,
    pub timestamp_domain: TimestampDomain,
    pub report_mode: ReportMode,
    pub verbose: bool,
    pub output_format: OutputFormat,
    /// Pause between the end of one exchange and the start of the next.
    pub interval: Duration,
    /// How long to wait for the transmit notification.
    pub notify_timeout: Duration,
    /// Stop after this many exchanges.
    pub count: Option<u64>,
    /// The user asserts both hosts share a synchronized clock.
    pub clock_synchronized: bool,
}

/// Result of one completed probe/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// 1-based exchange number.
    pub exchange: u64,
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub measurement: Measurement,
}

/// A timestamping socket bound for the initiator role.
pub struct Sender {
    socket: UdpSocket,
    options: SenderOptions,
    session: Session,
}

impl Sender {
    /// Opens and configures the initiator socket.
    ///
    /// Hardware timestamping is configured on the interface only when the
    /// hardware domain is selected.
    pub fn open(options: SenderOptions) -> Result<Self> {
        let bind_addr: SocketAddr = match options.target {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };
        let std_socket = bind_udp(bind_addr, false)?;

        if options.timestamp_domain == TimestampDomain::Hardware {
            hwstamp::configure_interface(&options.interface, &std_socket)?;
        }
        enable_initiator_timestamping(&std_socket, options.timestamp_domain)?;

        let socket = into_tokio(std_socket)?;
        Ok(Sender {
            socket,
            options,
            session: Session::new(),
        })
    }

    pub fn options(&self) -> &SenderOptions {
        &self.options
    }

    /// Local address the probes are sent from.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Error::Receive)
    }

    /// Number of exchanges completed so far.
    pub fn exchanges(&self) -> u64 {
        self.session.exchanges()
    }

    /// Runs one probe/reply exchange.
    ///
    /// Waits for the reply without a deadline; callers that need to give up
    /// drop the returned future.
    pub async fn exchange(&self) -> Result<ExchangeOutcome> {
        let target = self.options.target;

        let mut notify_buf = [0u8; RECV_BUFFER_LEN];
        let mut notify_control = [0u8; CONTROL_BUFFER_LEN];

        let stale = self.discard_notifications(&mut notify_buf, &mut notify_control)?;
        if stale > 0 {
            log::debug!("Discarded {} stale transmit notifications", stale);
        }

        let bytes_sent = self
            .socket
            .send_to(PROBE_PAYLOAD, target)
            .await
            .map_err(Error::Send)?;
        log::debug!("Sent {} byte probe to {}", bytes_sent, target);

        let transmit = self
            .collect_transmit(&mut notify_buf, &mut notify_control)
            .await?;

        let mut reply_buf = [0u8; RECV_BUFFER_LEN];
        let mut reply_control = [0u8; CONTROL_BUFFER_LEN];
        let received = loop {
            let received =
                recv_datagram(&self.socket, &mut reply_buf, &mut reply_control).await?;
            if received.source == Some(target) {
                break received;
            }
            log::warn!(
                "Ignoring {} byte datagram from {:?}, expected {}",
                received.bytes,
                received.source,
                target
            );
        };
        if received.control_truncated {
            log::warn!("Reply control data was truncated");
        }
        if received.bytes != REPLY_LEN {
            log::debug!(
                "Reply is {} bytes, expected {}",
                received.bytes,
                REPLY_LEN
            );
        }
        let receive = extract_timestamps(&reply_control[..received.control_len]);
        let reply = ReplyPacket::from_bytes(&reply_buf[..received.bytes])?;

        Ok(ExchangeOutcome {
            exchange: self.session.next_exchange(),
            bytes_sent,
            bytes_received: received.bytes,
            measurement: Measurement {
                transmit,
                receive,
                remote_receive: reply.receive_timestamps,
            },
        })
    }

    /// Waits for the probe's transmit timestamps.
    ///
    /// One probe can produce a software and a hardware notification. Reading
    /// continues until the selected domain's entry is filled, then whatever
    /// else is already queued is merged in too.
    async fn collect_transmit(
        &self,
        data: &mut [u8],
        control: &mut [u8],
    ) -> Result<TimestampTriple> {
        let domain = self.options.timestamp_domain;
        let timeout = self.options.notify_timeout;
        let deadline = Instant::now() + timeout;
        let mut transmit = TimestampTriple::default();
        let mut notifications = 0;

        while transmit.get(domain).is_zero() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match poll_error_queue(&self.socket, data, control, remaining).await {
                Ok(received) => {
                    notifications += 1;
                    absorb_notification(&mut transmit, &received, control);
                }
                Err(Error::NotificationTimedOut(_)) if notifications > 0 => {
                    log::warn!("No {} transmit timestamp for the probe", domain);
                    break;
                }
                Err(Error::NotificationTimedOut(_)) => {
                    return Err(Error::NotificationTimedOut(timeout))
                }
                Err(e) => return Err(e),
            }
        }

        while let Some(received) = try_recv_error_queue(&self.socket, data, control)? {
            absorb_notification(&mut transmit, &received, control);
        }
        Ok(transmit)
    }

    /// Empties the error queue, returning how many notifications were dropped.
    fn discard_notifications(&self, data: &mut [u8], control: &mut [u8]) -> Result<usize> {
        let mut discarded = 0;
        while try_recv_error_queue(&self.socket, data, control)?.is_some() {
            discarded += 1;
        }
        Ok(discarded)
    }
}

/// Merges the timestamps of one transmit notification into `transmit`.
fn absorb_notification(transmit: &mut TimestampTriple, received: &Received, control: &[u8]) {
    if received.control_truncated {
        log::warn!("Transmit notification control data was truncated");
    }
    let stamps = extract_timestamps(&control[..received.control_len]);
    if stamps.is_empty() {
        log::warn!("Transmit notification carried no timestamps");
    }
    transmit.merge(&stamps);
}

/// Runs the initiator loop until cancelled, `count` is reached or an
/// exchange fails. Returns the number of completed exchanges.
pub async fn run_sender(options: SenderOptions, cancel: CancellationToken) -> Result<u64> {
    if options.report_mode == ReportMode::OneWayDelay && !options.clock_synchronized {
        log::warn!(
            "One-way delay compares clocks of two hosts; results are meaningless unless they are synchronized"
        );
    }

    let sender = Sender::open(options)?;
    let options = sender.options();
    log::info!(
        "Probing {} ({}) from {} every {:?}, {} timestamps",
        options.host,
        options.target,
        sender.local_addr()?,
        options.interval,
        options.timestamp_domain
    );

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            result = sender.exchange() => result?,
        };

        SenderReport::new(&outcome, options).print(options.output_format);

        if options.count.is_some_and(|count| outcome.exchange >= count) {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(options.interval) => {}
        }
    }

    log::info!("Initiator finished after {} exchanges", sender.exchanges());
    Ok(sender.exchanges())
}
