//! Kernel ABI for the IPVS `getsockopt` control interface
//!
//! Mirrors the structures in `<linux/ip_vs.h>` that the collector reads back
//! from the kernel. Every struct here must be:
//! - `#[repr(C)]` with the exact layout the kernel writes
//! - free of implicit padding (padding is spelled out as `_pad` fields), so it
//!   can derive `bytemuck::Pod` and be read straight out of a byte buffer
//!
//! Addresses and ports are kept in network byte order, exactly as the kernel
//! delivers them. Conversion happens in userspace.

use bytemuck::{Pod, Zeroable};

/// Base of the IPVS socket option range (`IP_VS_BASE_CTL`).
pub const IP_VS_BASE_CTL: i32 = 64 + 1024 + 64;

/// Socket option numbers, used with level `IPPROTO_IP`.
pub mod sockopt {
    use super::IP_VS_BASE_CTL;

    pub const GET_VERSION: i32 = IP_VS_BASE_CTL;
    pub const GET_INFO: i32 = IP_VS_BASE_CTL + 1;
    pub const GET_SERVICES: i32 = IP_VS_BASE_CTL + 2;
    pub const GET_SERVICE: i32 = IP_VS_BASE_CTL + 3;
    pub const GET_DESTS: i32 = IP_VS_BASE_CTL + 4;
}

/// IP protocol constants as stored in `protocol` fields
pub mod protocol {
    pub const TCP: u16 = 6;
    pub const UDP: u16 = 17;
    pub const SCTP: u16 = 132;
}

/// Length of the scheduler name field (`IP_VS_SCHEDNAME_MAXLEN`).
pub const SCHEDNAME_MAXLEN: usize = 16;

/// Answer to `IP_VS_SO_GET_INFO` (`struct ip_vs_getinfo`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GetInfo {
    /// Packed as `major << 16 | minor << 8 | patch`
    pub version: u32,
    /// Connection hash table size
    pub size: u32,
    pub num_services: u32,
}

/// Per-entity statistics (`struct ip_vs_stats_user`).
///
/// Layout (56 bytes, 8-byte aligned):
/// - conns, inpkts, outpkts: 32-bit cumulative counters
/// - inbytes, outbytes: 64-bit cumulative counters
/// - cps, inpps, outpps, inbps, outbps: kernel-estimated rates (unused here)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct StatsUser {
    pub conns: u32,
    pub inpkts: u32,
    pub outpkts: u32,
    pub _pad0: u32,
    pub inbytes: u64,
    pub outbytes: u64,
    pub cps: u32,
    pub inpps: u32,
    pub outpps: u32,
    pub inbps: u32,
    pub outbps: u32,
    pub _pad1: u32,
}

/// One virtual service (`struct ip_vs_service_entry`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ServiceEntry {
    pub protocol: u16,
    pub _pad0: u16,
    /// IPv4 address, network byte order
    pub addr: u32,
    /// Port, network byte order
    pub port: u16,
    pub _pad1: u16,
    pub fwmark: u32,
    /// NUL-padded scheduler name
    pub sched_name: [u8; SCHEDNAME_MAXLEN],
    pub flags: u32,
    pub timeout: u32,
    pub netmask: u32,
    pub num_dests: u32,
    pub stats: StatsUser,
}

/// One real server (`struct ip_vs_dest_entry`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DestEntry {
    pub addr: u32,
    pub port: u16,
    pub _pad0: u16,
    pub conn_flags: u32,
    pub weight: i32,
    pub u_threshold: u32,
    pub l_threshold: u32,
    pub activeconns: u32,
    pub inactconns: u32,
    pub persistconns: u32,
    pub _pad1: u32,
    pub stats: StatsUser,
}

/// Header of `struct ip_vs_get_services`; `num_services` entries follow.
///
/// The C struct ends in a flexible `entrytable[0]` whose 8-byte alignment
/// pushes the first entry to offset 8, hence the explicit padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GetServicesHeader {
    pub num_services: u32,
    pub _pad0: u32,
}

/// Header of `struct ip_vs_get_dests`; `num_dests` entries follow.
///
/// The service key fields select which service the kernel reports on.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GetDestsHeader {
    pub protocol: u16,
    pub _pad0: u16,
    pub addr: u32,
    pub port: u16,
    pub _pad1: u16,
    pub fwmark: u32,
    pub num_dests: u32,
    pub _pad2: u32,
}

impl GetDestsHeader {
    /// Request header addressing the given service.
    pub fn for_service(entry: &ServiceEntry) -> Self {
        Self {
            protocol: entry.protocol,
            addr: entry.addr,
            port: entry.port,
            fwmark: entry.fwmark,
            num_dests: entry.num_dests,
            ..Self::default()
        }
    }
}

const _: () = {
    assert!(
        core::mem::size_of::<GetInfo>() == 12,
        "GetInfo must be exactly 12 bytes"
    );
    assert!(
        core::mem::size_of::<StatsUser>() == 56,
        "StatsUser must be exactly 56 bytes"
    );
    assert!(
        core::mem::size_of::<ServiceEntry>() == 104,
        "ServiceEntry must be exactly 104 bytes"
    );
    assert!(
        core::mem::size_of::<DestEntry>() == 96,
        "DestEntry must be exactly 96 bytes"
    );
    assert!(
        core::mem::size_of::<GetServicesHeader>() == 8,
        "GetServicesHeader must be exactly 8 bytes"
    );
    assert!(
        core::mem::size_of::<GetDestsHeader>() == 24,
        "GetDestsHeader must be exactly 24 bytes"
    );
    assert!(
        core::mem::align_of::<ServiceEntry>() == 8,
        "ServiceEntry must be 8-byte aligned"
    );
    assert!(
        core::mem::align_of::<DestEntry>() == 8,
        "DestEntry must be 8-byte aligned"
    );
};
