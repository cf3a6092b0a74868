//! Stable names for services and real servers
//!
//! - service:     `<virtual IP>_<PROTO><port>`, or `FWM<mark>` for services
//!   keyed by firewall mark; unknown protocols are `<virtual IP>_PROTO<n>_<port>`
//! - destination: `<real IP>_<port>`
//!
//! Downstream systems key their series on these strings, so the format must
//! not change between releases.

use crate::kernel::{Destination, Protocol, VirtualService};
use crate::{IpvsError, Result};
use std::fmt::{self, Write};

/// Longest identifier accepted by default, one short of a 64-byte
/// NUL-terminated name field.
pub const IDENTIFIER_CAPACITY: usize = 63;

#[derive(Debug, Clone, Copy)]
pub struct IdentifierBuilder {
    capacity: usize,
}

impl IdentifierBuilder {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn service_id(&self, service: &VirtualService) -> Result<String> {
        let mut out = Bounded::new(self.capacity);
        let written = match (service.fwmark, service.protocol) {
            (Some(mark), _) => write!(out, "FWM{}", mark),
            // Numeric protocol names need a separator before the port.
            (None, Protocol::Other(_)) => write!(
                out,
                "{}_{}_{}",
                service.address, service.protocol, service.port
            ),
            (None, _) => write!(
                out,
                "{}_{}{}",
                service.address, service.protocol, service.port
            ),
        };
        out.finish(written, "service")
    }

    pub fn destination_id(&self, destination: &Destination) -> Result<String> {
        let mut out = Bounded::new(self.capacity);
        let written = write!(out, "{}_{}", destination.address, destination.port);
        out.finish(written, "destination")
    }
}

impl Default for IdentifierBuilder {
    fn default() -> Self {
        Self::new(IDENTIFIER_CAPACITY)
    }
}

/// String sink that refuses to grow past `capacity` bytes.
struct Bounded {
    buf: String,
    capacity: usize,
    overflowed: bool,
}

impl Bounded {
    fn new(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
            capacity,
            overflowed: false,
        }
    }

    fn finish(self, written: fmt::Result, kind: &'static str) -> Result<String> {
        if self.overflowed || written.is_err() {
            return Err(IpvsError::Truncated {
                kind,
                partial: self.buf,
            });
        }
        Ok(self.buf)
    }
}

impl Write for Bounded {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.capacity - self.buf.len();
        if s.len() <= room {
            self.buf.push_str(s);
            return Ok(());
        }

        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buf.push_str(&s[..cut]);
        self.overflowed = true;
        Err(fmt::Error)
    }
}
