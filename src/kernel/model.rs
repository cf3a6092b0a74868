use ipvsmon_common::{protocol, DestEntry, GetInfo, ServiceEntry, StatsUser};
use serde::Serialize;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
    Other(u16),
}

impl Protocol {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            protocol::TCP => Protocol::Tcp,
            protocol::UDP => Protocol::Udp,
            protocol::SCTP => Protocol::Sctp,
            other => Protocol::Other(other),
        }
    }

    pub fn raw(&self) -> u16 {
        match self {
            Protocol::Tcp => protocol::TCP,
            Protocol::Udp => protocol::UDP,
            Protocol::Sctp => protocol::SCTP,
            Protocol::Other(raw) => *raw,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Sctp => write!(f, "SCTP"),
            Protocol::Other(proto) => write!(f, "PROTO{}", proto),
        }
    }
}

/// Cumulative traffic counters as kept by the load balancer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub connections: u64,
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl From<&StatsUser> for Counters {
    fn from(stats: &StatsUser) -> Self {
        Self {
            connections: u64::from(stats.conns),
            packets_in: u64::from(stats.inpkts),
            packets_out: u64::from(stats.outpkts),
            bytes_in: stats.inbytes,
            bytes_out: stats.outbytes,
        }
    }
}

/// Global IPVS state from `IP_VS_SO_GET_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpvsInfo {
    pub version: u32,
    pub connection_table_size: u32,
    pub num_services: u32,
}

impl IpvsInfo {
    /// Version as `major.minor.patch`.
    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            (self.version >> 16) & 0xff,
            (self.version >> 8) & 0xff,
            self.version & 0xff
        )
    }
}

impl From<&GetInfo> for IpvsInfo {
    fn from(raw: &GetInfo) -> Self {
        Self {
            version: raw.version,
            connection_table_size: raw.size,
            num_services: raw.num_services,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VirtualService {
    pub protocol: Protocol,
    pub address: Ipv4Addr,
    pub port: u16,
    /// Firewall mark; services keyed by mark carry no address/port
    pub fwmark: Option<u32>,
    pub scheduler: String,
    pub num_dests: u32,
    pub counters: Counters,
    raw: ServiceEntry,
}

impl VirtualService {
    /// Kernel entry this service was decoded from, needed to address
    /// follow-up destination queries.
    pub fn raw(&self) -> &ServiceEntry {
        &self.raw
    }
}

impl From<&ServiceEntry> for VirtualService {
    fn from(entry: &ServiceEntry) -> Self {
        let scheduler_len = entry
            .sched_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(entry.sched_name.len());

        Self {
            protocol: Protocol::from_raw(entry.protocol),
            address: ipv4_from_network(entry.addr),
            port: u16::from_be(entry.port),
            fwmark: (entry.fwmark != 0).then_some(entry.fwmark),
            scheduler: String::from_utf8_lossy(&entry.sched_name[..scheduler_len]).into_owned(),
            num_dests: entry.num_dests,
            counters: Counters::from(&entry.stats),
            raw: *entry,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Destination {
    pub address: Ipv4Addr,
    pub port: u16,
    pub weight: i32,
    pub active_connections: u32,
    pub inactive_connections: u32,
    pub counters: Counters,
}

impl From<&DestEntry> for Destination {
    fn from(entry: &DestEntry) -> Self {
        Self {
            address: ipv4_from_network(entry.addr),
            port: u16::from_be(entry.port),
            weight: entry.weight,
            active_connections: entry.activeconns,
            inactive_connections: entry.inactconns,
            counters: Counters::from(&entry.stats),
        }
    }
}

/// IPv4 address from a `__be32` read as a native integer.
///
/// The kernel stores the first octet in the lowest memory byte, so the
/// native-endian bytes are already in dotted order.
pub fn ipv4_from_network(addr: u32) -> Ipv4Addr {
    Ipv4Addr::from(addr.to_ne_bytes())
}

/// Inverse of [`ipv4_from_network`].
pub fn ipv4_to_network(addr: Ipv4Addr) -> u32 {
    u32::from_ne_bytes(addr.octets())
}
