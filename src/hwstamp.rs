//! Interface-level hardware timestamping configuration (`SIOCSHWTSTAMP`).
//!
//! The setting is global to the network interface: every socket on the host
//! sees it, and only one configuration is active at a time. Nothing here
//! guards against another process reconfiguring the same interface.

use std::os::fd::AsRawFd;

use nix::{errno::Errno, libc};
use pnet::datalink::{self, NetworkInterface};

use crate::error::{Error, Result};

/// `SIOCSHWTSTAMP` from `linux/sockios.h`.
const SIOCSHWTSTAMP: libc::c_ulong = 0x89b0;

/// `HWTSTAMP_TX_ON` from `linux/net_tstamp.h`.
pub const HWTSTAMP_TX_ON: libc::c_int = 1;

/// `HWTSTAMP_FILTER_ALL` from `linux/net_tstamp.h`.
pub const HWTSTAMP_FILTER_ALL: libc::c_int = 1;

/// `struct hwtstamp_config`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwTimestampConfig {
    pub flags: libc::c_int,
    pub tx_type: libc::c_int,
    pub rx_filter: libc::c_int,
}

impl HwTimestampConfig {
    /// Transmit stamping on, every received frame stamped.
    pub fn tx_on_filter_all() -> Self {
        Self {
            flags: 0,
            tx_type: HWTSTAMP_TX_ON,
            rx_filter: HWTSTAMP_FILTER_ALL,
        }
    }
}

/// `struct ifreq` restricted to the `ifr_data` member of its union.
#[repr(C)]
pub struct InterfaceRequest {
    name: [libc::c_char; libc::IFNAMSIZ],
    data: *mut HwTimestampConfig,
    _union_tail: [u8; IFREQ_UNION_LEN - std::mem::size_of::<*mut HwTimestampConfig>()],
}

/// Size of the `ifr_ifru` union (`struct ifmap` is the largest member).
#[cfg(target_pointer_width = "64")]
const IFREQ_UNION_LEN: usize = 24;
#[cfg(target_pointer_width = "32")]
const IFREQ_UNION_LEN: usize = 16;

#[cfg(target_pointer_width = "64")]
const _: () = assert!(std::mem::size_of::<InterfaceRequest>() == 40);

nix::ioctl_write_ptr_bad!(set_hw_timestamping, SIOCSHWTSTAMP, InterfaceRequest);

/// Checks that `name` fits in `ifr_name` including its terminating NUL.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= libc::IFNAMSIZ || name.bytes().any(|b| b == 0) {
        return Err(Error::InterfaceNotFound(name.to_string()));
    }
    Ok(())
}

/// Looks the interface up among the host's network interfaces.
pub fn find_interface(name: &str) -> Result<NetworkInterface> {
    validate_interface_name(name)?;
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
}

/// Asks the driver of `interface` to timestamp all transmitted and received
/// frames in hardware.
///
/// `socket` can be any open socket; it only carries the ioctl. Returns the
/// configuration the driver applied, which may widen the receive filter.
///
/// # Errors
/// [`Error::InterfaceNotFound`] if the interface does not exist,
/// [`Error::Unsupported`] if the driver has no hardware timestamping, and
/// [`Error::HardwareConfig`] if the request is otherwise rejected (commonly
/// `EPERM` without `CAP_NET_ADMIN`).
pub fn configure_interface<S: AsRawFd>(interface: &str, socket: &S) -> Result<HwTimestampConfig> {
    let iface = find_interface(interface)?;
    log::debug!(
        "Configuring hardware timestamping on {} (index {}, addresses {:?})",
        iface.name,
        iface.index,
        iface.ips
    );

    let mut config = HwTimestampConfig::tx_on_filter_all();
    let mut request = InterfaceRequest {
        name: [0; libc::IFNAMSIZ],
        data: &mut config,
        _union_tail: [0; IFREQ_UNION_LEN - std::mem::size_of::<*mut HwTimestampConfig>()],
    };
    for (dst, src) in request.name.iter_mut().zip(interface.bytes()) {
        *dst = src as libc::c_char;
    }

    // SAFETY: request is a correctly sized ifreq whose data pointer refers to
    // `config`, which outlives the call.
    let result = unsafe { set_hw_timestamping(socket.as_raw_fd(), &request) };
    match result {
        Ok(_) => {}
        Err(Errno::EOPNOTSUPP) => return Err(Error::Unsupported(interface.to_string())),
        Err(source) => {
            return Err(Error::HardwareConfig {
                interface: interface.to_string(),
                source,
            })
        }
    }

    if config.rx_filter != HWTSTAMP_FILTER_ALL {
        log::warn!(
            "Driver for {} applied rx_filter {} instead of {}",
            interface,
            config.rx_filter,
            HWTSTAMP_FILTER_ALL
        );
    }
    log::info!(
        "Hardware timestamping enabled on {} (tx_type={}, rx_filter={})",
        interface,
        config.tx_type,
        config.rx_filter
    );

    Ok(config)
}
