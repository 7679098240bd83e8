//! Socket setup and `recvmsg` plumbing shared by both roles.
//!
//! Timestamp reporting is switched on through nix's typed socket options.
//! Receives go through `libc::recvmsg` directly so the raw control bytes can
//! be handed to [`crate::ancillary::extract_timestamps`] untouched.

use std::{
    io,
    mem::size_of,
    net::{SocketAddr, SocketAddrV4, SocketAddrV6},
    os::fd::{AsFd, AsRawFd, RawFd},
    time::Duration,
};

use nix::{
    errno::Errno,
    libc,
    sys::socket::{
        bind, setsockopt, socket, sockopt, AddressFamily, SockFlag, SockProtocol, SockType,
        SockaddrLike, SockaddrStorage, TimestampingFlag,
    },
};
use tokio::{io::Interest, net::UdpSocket, time::Instant};

use crate::{
    error::{Error, Result},
    modes::TimestampDomain,
};

/// Timestamp classes requested by the initiator.
///
/// Transmit stamps come back later through the error queue; the receive
/// classes cover the reply. The software domain also needs the explicit
/// software generation flags, otherwise Linux never queues a software
/// transmit stamp.
pub fn initiator_timestamping_flags(domain: TimestampDomain) -> TimestampingFlag {
    let mut flags = TimestampingFlag::SOF_TIMESTAMPING_RX_HARDWARE
        | TimestampingFlag::SOF_TIMESTAMPING_TX_HARDWARE
        | TimestampingFlag::SOF_TIMESTAMPING_SOFTWARE
        | TimestampingFlag::SOF_TIMESTAMPING_RAW_HARDWARE;
    if domain == TimestampDomain::Software {
        flags |= TimestampingFlag::SOF_TIMESTAMPING_TX_SOFTWARE
            | TimestampingFlag::SOF_TIMESTAMPING_RX_SOFTWARE;
    }
    flags
}

/// Timestamp classes requested by the responder: receive only.
pub fn responder_timestamping_flags() -> TimestampingFlag {
    TimestampingFlag::SOF_TIMESTAMPING_RX_SOFTWARE
        | TimestampingFlag::SOF_TIMESTAMPING_RX_HARDWARE
        | TimestampingFlag::SOF_TIMESTAMPING_SOFTWARE
        | TimestampingFlag::SOF_TIMESTAMPING_RAW_HARDWARE
}

/// Enables timestamp reporting on the initiator's socket.
///
/// In the software domain `SO_TIMESTAMPNS` is turned on first; then
/// `SO_TIMESTAMPING` is always set.
pub fn enable_initiator_timestamping<S: AsFd>(socket: &S, domain: TimestampDomain) -> Result<()> {
    if domain == TimestampDomain::Software {
        setsockopt(socket, sockopt::ReceiveTimestampns, &true).map_err(|source| {
            Error::SocketOption {
                option: "SO_TIMESTAMPNS",
                source,
            }
        })?;
    }
    set_timestamping(socket, initiator_timestamping_flags(domain))
}

/// Enables receive timestamp reporting on the responder's socket.
pub fn enable_responder_timestamping<S: AsFd>(socket: &S) -> Result<()> {
    set_timestamping(socket, responder_timestamping_flags())
}

fn set_timestamping<S: AsFd>(socket: &S, flags: TimestampingFlag) -> Result<()> {
    setsockopt(socket, sockopt::Timestamping, &flags).map_err(|source| Error::SocketOption {
        option: "SO_TIMESTAMPING",
        source,
    })?;
    log::debug!("SO_TIMESTAMPING enabled with flags {:?}", flags);
    Ok(())
}

/// Creates a UDP socket bound to `addr`.
///
/// `SO_REUSEADDR` is set before binding so a restarted responder can take
/// its port back immediately.
pub fn bind_udp(addr: SocketAddr, reuse_addr: bool) -> Result<std::net::UdpSocket> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    let to_bind_error = |errno: Errno| Error::Bind {
        addr,
        source: io::Error::from(errno),
    };

    let fd = socket(
        family,
        SockType::Datagram,
        SockFlag::SOCK_CLOEXEC,
        SockProtocol::Udp,
    )
    .map_err(to_bind_error)?;

    if reuse_addr {
        setsockopt(&fd, sockopt::ReuseAddr, &true).map_err(|source| Error::SocketOption {
            option: "SO_REUSEADDR",
            source,
        })?;
    }

    bind(fd.as_raw_fd(), &SockaddrStorage::from(addr)).map_err(to_bind_error)?;
    Ok(std::net::UdpSocket::from(fd))
}

/// Hands a configured std socket over to tokio.
pub fn into_tokio(socket: std::net::UdpSocket) -> Result<UdpSocket> {
    let addr = socket
        .local_addr()
        .map_err(|source| Error::Bind {
            addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            source,
        })?;
    socket
        .set_nonblocking(true)
        .and_then(|()| UdpSocket::from_std(socket))
        .map_err(|source| Error::Bind { addr, source })
}

/// Result of one `recvmsg` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Payload bytes received.
    pub bytes: usize,
    /// Control bytes written by the kernel.
    pub control_len: usize,
    /// Sender of the datagram, when the kernel reported one.
    pub source: Option<SocketAddr>,
    /// The control data did not fit (`MSG_CTRUNC`).
    pub control_truncated: bool,
}

/// A single non-blocking `recvmsg` on `fd`.
///
/// `flags` is ORed with `MSG_DONTWAIT`, so an empty queue yields `EAGAIN`.
pub fn recv_with_control(
    fd: RawFd,
    data: &mut [u8],
    control: &mut [u8],
    flags: libc::c_int,
) -> nix::Result<Received> {
    // SAFETY: zeroed sockaddr_storage/msghdr are valid initial values.
    let mut name: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut iov = libc::iovec {
        iov_base: data.as_mut_ptr().cast(),
        iov_len: data.len(),
    };
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_name = (&mut name as *mut libc::sockaddr_storage).cast();
    msg.msg_namelen = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast();
    msg.msg_controllen = control.len() as _;

    // SAFETY: every pointer in msg refers to a live buffer of the stated size.
    let ret = unsafe { libc::recvmsg(fd, &mut msg, flags | libc::MSG_DONTWAIT) };
    let bytes = Errno::result(ret)? as usize;

    let source = if msg.msg_namelen > 0 {
        // SAFETY: the kernel filled `name` with msg_namelen bytes.
        unsafe {
            SockaddrStorage::from_raw(
                (&name as *const libc::sockaddr_storage).cast(),
                Some(msg.msg_namelen),
            )
        }
        .and_then(|storage| to_socket_addr(&storage))
    } else {
        None
    };

    Ok(Received {
        bytes,
        control_len: (msg.msg_controllen as usize).min(control.len()),
        source,
        control_truncated: msg.msg_flags & libc::MSG_CTRUNC != 0,
    })
}

fn to_socket_addr(storage: &SockaddrStorage) -> Option<SocketAddr> {
    if let Some(v4) = storage.as_sockaddr_in() {
        Some(SocketAddrV4::from(*v4).into())
    } else {
        storage
            .as_sockaddr_in6()
            .map(|v6| SocketAddrV6::from(*v6).into())
    }
}

/// Waits for a datagram on the normal receive path.
pub async fn recv_datagram(
    socket: &UdpSocket,
    data: &mut [u8],
    control: &mut [u8],
) -> Result<Received> {
    let fd = socket.as_raw_fd();
    loop {
        socket.readable().await.map_err(Error::Receive)?;
        match socket.try_io(Interest::READABLE, || {
            recv_with_control(fd, data, control, 0).map_err(io::Error::from)
        }) {
            Ok(received) => return Ok(received),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Receive(e)),
        }
    }
}

/// Polls the socket's error queue for a transmit notification.
///
/// The kernel posts the notification some time after the send returns, so
/// `EAGAIN` is retried immediately until `timeout` has elapsed.
pub async fn poll_error_queue(
    socket: &UdpSocket,
    data: &mut [u8],
    control: &mut [u8],
    timeout: Duration,
) -> Result<Received> {
    let fd = socket.as_raw_fd();
    let deadline = Instant::now() + timeout;
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        match recv_with_control(fd, data, control, libc::MSG_ERRQUEUE) {
            Ok(received) => {
                log::trace!("Error queue notification after {} attempts", attempts);
                return Ok(received);
            }
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => {
                if Instant::now() >= deadline {
                    return Err(Error::NotificationTimedOut(timeout));
                }
                // Let the cancellation task run on a single-threaded runtime.
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(Error::Receive(io::Error::from(e))),
        }
    }
}

/// Reads one already queued error-queue notification without waiting.
///
/// Returns `Ok(None)` when the queue is empty.
pub fn try_recv_error_queue(
    socket: &UdpSocket,
    data: &mut [u8],
    control: &mut [u8],
) -> Result<Option<Received>> {
    match recv_with_control(socket.as_raw_fd(), data, control, libc::MSG_ERRQUEUE) {
        Ok(received) => Ok(Some(received)),
        Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(None),
        Err(e) => Err(Error::Receive(io::Error::from(e))),
    }
}
