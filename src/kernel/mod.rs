//! Access to the kernel's IPVS tables
//!
//! All queries go through [`ControlChannel`], a single `getsockopt`-shaped
//! call. The production channel is a raw socket ([`channel::KernelChannel`]);
//! tests substitute an in-memory kernel.

#[cfg(target_os = "linux")]
pub mod channel;
pub mod fetch;
pub mod model;

use std::io;

pub use fetch::{fetch_destinations, fetch_info, fetch_services};
pub use model::{Counters, Destination, IpvsInfo, Protocol, VirtualService};

/// Privileged handle used to issue IPVS socket option queries.
///
/// Not a data transport: every exchange is one synchronous request/response.
pub trait ControlChannel {
    /// Issue `getsockopt(IPPROTO_IP, optname)`.
    ///
    /// `buf` carries the request header on entry and the kernel's answer on
    /// return. Returns the length the kernel reported back.
    fn query(&mut self, optname: i32, buf: &mut [u8]) -> io::Result<usize>;
}
