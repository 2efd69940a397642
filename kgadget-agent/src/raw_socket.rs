//! Raw packet socket carrying the DNS socket filter

use anyhow::{Context, Result};
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};

/// Open a non-blocking `AF_PACKET` socket receiving every protocol on every
/// interface.
///
/// The attached filter accepts no packet, so nothing is ever queued on it.
pub fn open_packet_socket() -> Result<OwnedFd> {
    let protocol = (libc::ETH_P_ALL as u16).to_be() as libc::c_int;

    let fd = unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            protocol,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error()).context("Failed to open AF_PACKET socket");
    }

    // SAFETY: fd was just returned by socket(2) and is owned by nobody else
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
