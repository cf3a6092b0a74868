//! In-memory IPVS kernel for driving the collector without privileges.
//!
//! Follows the kernel's getsockopt contract: table queries must be sized
//! exactly for the announced entry count (`EINVAL` otherwise), the kernel
//! fills at most that many entries, and an unknown service is `ESRCH`.

#![allow(dead_code)]

use ipvsmon::kernel::model::ipv4_to_network;
use ipvsmon::kernel::ControlChannel;
use ipvsmon::{IpvsError, Result};
use ipvsmon_common::{
    protocol, sockopt, DestEntry, GetDestsHeader, GetInfo, GetServicesHeader, ServiceEntry,
};
use std::cell::RefCell;
use std::io;
use std::mem::size_of;
use std::net::Ipv4Addr;
use std::rc::Rc;

#[derive(Default)]
pub struct KernelState {
    pub services: Vec<(ServiceEntry, Vec<DestEntry>)>,
    /// errno returned by the next service table queries
    pub fail_services: Option<i32>,
    /// errno returned by `GET_INFO`
    pub fail_info: Option<i32>,
    /// Services (by index) whose destination query fails with the errno
    pub fail_dests: Vec<(usize, i32)>,
    /// Entry appended right before answering the next service query
    pub grow_before_services: Option<ServiceEntry>,
    pub queries: Vec<i32>,
    pub opened: usize,
    pub closed: usize,
}

#[derive(Clone, Default)]
pub struct FakeKernel {
    state: Rc<RefCell<KernelState>>,
}

pub struct FakeChannel {
    state: Rc<RefCell<KernelState>>,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::cell::RefMut<'_, KernelState> {
        self.state.borrow_mut()
    }

    pub fn add_service(&self, entry: ServiceEntry) -> usize {
        let mut state = self.state.borrow_mut();
        state.services.push((entry, Vec::new()));
        state.services.len() - 1
    }

    pub fn add_destination(&self, service: usize, dest: DestEntry) {
        let mut state = self.state.borrow_mut();
        let (entry, dests) = &mut state.services[service];
        dests.push(dest);
        entry.num_dests = dests.len() as u32;
    }

    /// Opener that always succeeds.
    pub fn opener(&self) -> impl FnMut() -> Result<FakeChannel> + 'static {
        let state = self.state.clone();
        move || {
            state.borrow_mut().opened += 1;
            Ok(FakeChannel {
                state: state.clone(),
            })
        }
    }

    /// Opener that fails the way `socket(2)` does without privilege.
    pub fn failing_opener(errno: i32) -> impl FnMut() -> Result<FakeChannel> + 'static {
        move || {
            Err(IpvsError::from_os(
                ipvsmon::error::KernelOp::OpenChannel,
                io::Error::from_raw_os_error(errno),
            ))
        }
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        self.state.borrow_mut().closed += 1;
    }
}

fn write_entries<T: bytemuck::Pod>(buf: &mut [u8], offset: usize, entries: &[T]) {
    for (i, entry) in entries.iter().enumerate() {
        let start = offset + i * size_of::<T>();
        buf[start..start + size_of::<T>()].copy_from_slice(bytemuck::bytes_of(entry));
    }
}

impl ControlChannel for FakeChannel {
    fn query(&mut self, optname: i32, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        state.queries.push(optname);

        match optname {
            sockopt::GET_INFO => {
                if let Some(errno) = state.fail_info {
                    return Err(io::Error::from_raw_os_error(errno));
                }
                if buf.len() < size_of::<GetInfo>() {
                    return Err(io::Error::from_raw_os_error(libc::EINVAL));
                }
                let info = GetInfo {
                    version: 0x010201,
                    size: 4096,
                    num_services: state.services.len() as u32,
                };
                buf[..size_of::<GetInfo>()].copy_from_slice(bytemuck::bytes_of(&info));
                Ok(buf.len())
            }
            sockopt::GET_SERVICES => {
                if let Some(errno) = state.fail_services {
                    return Err(io::Error::from_raw_os_error(errno));
                }
                if let Some(entry) = state.grow_before_services.take() {
                    state.services.push((entry, Vec::new()));
                }
                let header: GetServicesHeader =
                    bytemuck::pod_read_unaligned(&buf[..size_of::<GetServicesHeader>()]);
                let room = header.num_services as usize;
                if buf.len() != size_of::<GetServicesHeader>() + room * size_of::<ServiceEntry>() {
                    return Err(io::Error::from_raw_os_error(libc::EINVAL));
                }
                let entries: Vec<ServiceEntry> =
                    state.services.iter().take(room).map(|(e, _)| *e).collect();
                write_entries(buf, size_of::<GetServicesHeader>(), &entries);
                Ok(buf.len())
            }
            sockopt::GET_DESTS => {
                let header: GetDestsHeader =
                    bytemuck::pod_read_unaligned(&buf[..size_of::<GetDestsHeader>()]);
                let room = header.num_dests as usize;
                if buf.len() != size_of::<GetDestsHeader>() + room * size_of::<DestEntry>() {
                    return Err(io::Error::from_raw_os_error(libc::EINVAL));
                }

                let found = state.services.iter().position(|(e, _)| {
                    if header.fwmark != 0 {
                        e.fwmark == header.fwmark
                    } else {
                        e.protocol == header.protocol
                            && e.addr == header.addr
                            && e.port == header.port
                    }
                });
                let Some(index) = found else {
                    return Err(io::Error::from_raw_os_error(libc::ESRCH));
                };
                if let Some((_, errno)) = state.fail_dests.iter().find(|(i, _)| *i == index) {
                    return Err(io::Error::from_raw_os_error(*errno));
                }

                let entries: Vec<DestEntry> =
                    state.services[index].1.iter().take(room).copied().collect();
                write_entries(buf, size_of::<GetDestsHeader>(), &entries);
                Ok(buf.len())
            }
            _ => Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
    }
}

pub struct Stats {
    pub conns: u32,
    pub inpkts: u32,
    pub outpkts: u32,
    pub inbytes: u64,
    pub outbytes: u64,
}

pub const SAMPLE_STATS: Stats = Stats {
    conns: 5,
    inpkts: 10,
    outpkts: 20,
    inbytes: 100,
    outbytes: 200,
};

fn stats_user(stats: &Stats) -> ipvsmon_common::StatsUser {
    ipvsmon_common::StatsUser {
        conns: stats.conns,
        inpkts: stats.inpkts,
        outpkts: stats.outpkts,
        inbytes: stats.inbytes,
        outbytes: stats.outbytes,
        ..Default::default()
    }
}

pub fn tcp_service(addr: [u8; 4], port: u16, stats: &Stats) -> ServiceEntry {
    service(protocol::TCP, addr, port, stats)
}

pub fn service(proto: u16, addr: [u8; 4], port: u16, stats: &Stats) -> ServiceEntry {
    let mut entry = ServiceEntry {
        protocol: proto,
        addr: ipv4_to_network(Ipv4Addr::from(addr)),
        port: port.to_be(),
        stats: stats_user(stats),
        ..ServiceEntry::default()
    };
    entry.sched_name[..2].copy_from_slice(b"rr");
    entry
}

pub fn fwmark_service(mark: u32, stats: &Stats) -> ServiceEntry {
    ServiceEntry {
        protocol: protocol::TCP,
        fwmark: mark,
        stats: stats_user(stats),
        ..ServiceEntry::default()
    }
}

pub fn destination(addr: [u8; 4], port: u16, stats: &Stats) -> DestEntry {
    DestEntry {
        addr: ipv4_to_network(Ipv4Addr::from(addr)),
        port: port.to_be(),
        weight: 1,
        stats: stats_user(stats),
        ..DestEntry::default()
    }
}
