use crate::error::KernelOp;
use crate::kernel::ControlChannel;
use crate::{IpvsError, Result};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tracing::debug;

/// Raw IPv4 socket used only as a handle for IPVS socket options.
///
/// The descriptor is closed when the channel is dropped.
#[derive(Debug)]
pub struct KernelChannel {
    fd: OwnedFd,
}

impl KernelChannel {
    /// Open the control socket. Requires `CAP_NET_RAW`/`CAP_NET_ADMIN`.
    pub fn open() -> Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_RAW) };
        if fd < 0 {
            return Err(IpvsError::from_os(
                KernelOp::OpenChannel,
                io::Error::last_os_error(),
            ));
        }

        debug!("Opened IPVS control socket (fd {})", fd);

        // SAFETY: `fd` was just returned by socket(2) and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }
}

impl ControlChannel for KernelChannel {
    fn query(&mut self, optname: i32, buf: &mut [u8]) -> io::Result<usize> {
        let mut len = libc::socklen_t::try_from(buf.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("request of {} bytes exceeds socklen_t", buf.len()),
            )
        })?;

        let ret = unsafe {
            libc::getsockopt(
                self.fd.as_raw_fd(),
                libc::IPPROTO_IP,
                optname,
                buf.as_mut_ptr().cast::<libc::c_void>(),
                &mut len,
            )
        };

        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(len as usize)
    }
}
