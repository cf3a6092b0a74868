//! Size-then-fetch queries against the IPVS tables
//!
//! Each table query sends a header announcing how many entries the caller has
//! room for, and the kernel fills at most that many. The count comes from an
//! earlier call, so the table may have changed in between:
//! - growth: the kernel stops at the announced count and the extra entries
//!   are missed for this cycle
//! - shrink: trailing slots stay zero-filled and are dropped here
//!
//! Neither case is retried; the next cycle sizes from fresher data.

use crate::error::KernelOp;
use crate::kernel::model::{Destination, IpvsInfo, VirtualService};
use crate::kernel::ControlChannel;
use crate::{IpvsError, Result};
use bytemuck::{Pod, Zeroable};
use ipvsmon_common::{sockopt, DestEntry, GetDestsHeader, GetInfo, GetServicesHeader, ServiceEntry};
use std::mem::size_of;
use tracing::debug;

/// Query global IPVS state (`IP_VS_SO_GET_INFO`).
pub fn fetch_info<C: ControlChannel>(channel: &mut C) -> Result<IpvsInfo> {
    let mut info = GetInfo::zeroed();

    let returned = channel
        .query(sockopt::GET_INFO, bytemuck::bytes_of_mut(&mut info))
        .map_err(|e| IpvsError::from_os(KernelOp::GetInfo, e))?;

    if returned < size_of::<GetInfo>() {
        return Err(IpvsError::SizeMismatch {
            op: KernelOp::GetInfo,
            expected: size_of::<GetInfo>(),
            actual: returned,
        });
    }

    Ok(IpvsInfo::from(&info))
}

/// Fetch the virtual service table, with room for `count` entries.
pub fn fetch_services<C: ControlChannel>(channel: &mut C, count: u32) -> Result<Vec<VirtualService>> {
    let header = GetServicesHeader {
        num_services: count,
        ..GetServicesHeader::default()
    };

    let entries: Vec<ServiceEntry> = fetch_table(
        channel,
        KernelOp::GetServices,
        sockopt::GET_SERVICES,
        &header,
        count,
    )?;

    debug!(
        "Fetched {} of {} announced services",
        entries.len(),
        count
    );

    Ok(entries.iter().map(VirtualService::from).collect())
}

/// Fetch the real servers of one service, with room for its announced
/// destination count.
pub fn fetch_destinations<C: ControlChannel>(
    channel: &mut C,
    service: &VirtualService,
) -> Result<Vec<Destination>> {
    let header = GetDestsHeader::for_service(service.raw());

    let entries: Vec<DestEntry> = fetch_table(
        channel,
        KernelOp::GetDests,
        sockopt::GET_DESTS,
        &header,
        header.num_dests,
    )?;

    Ok(entries.iter().map(Destination::from).collect())
}

/// Byte length of a `header + count * entry` request, if representable.
pub fn table_len<H, E>(count: u32) -> Option<usize> {
    usize::try_from(count)
        .ok()?
        .checked_mul(size_of::<E>())?
        .checked_add(size_of::<H>())
}

fn fetch_table<C, H, E>(
    channel: &mut C,
    op: KernelOp,
    optname: i32,
    header: &H,
    count: u32,
) -> Result<Vec<E>>
where
    C: ControlChannel,
    H: Pod,
    E: Pod + PartialEq,
{
    let mut buf = alloc_request::<H, E>(op, header, count)?;

    let returned = channel
        .query(optname, &mut buf)
        .map_err(|e| IpvsError::from_os(op, e))?;

    if returned != buf.len() {
        return Err(IpvsError::SizeMismatch {
            op,
            expected: buf.len(),
            actual: returned,
        });
    }

    let empty = E::zeroed();
    let entries = buf[size_of::<H>()..]
        .chunks_exact(size_of::<E>())
        .map(bytemuck::pod_read_unaligned::<E>)
        .filter(|entry| *entry != empty)
        .collect();

    Ok(entries)
}

/// Zeroed request buffer with the header in front.
///
/// Failing to size or allocate this is fatal to the collector.
fn alloc_request<H: Pod, E>(op: KernelOp, header: &H, count: u32) -> Result<Vec<u8>> {
    let what = match op {
        KernelOp::GetDests => "destination",
        _ => "service",
    };
    let alloc_failed = || IpvsError::AllocationFailed {
        what,
        entries: u64::from(count),
    };

    let len = table_len::<H, E>(count)
        .filter(|len| u32::try_from(*len).is_ok())
        .ok_or_else(alloc_failed)?;

    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| alloc_failed())?;
    buf.resize(len, 0);
    buf[..size_of::<H>()].copy_from_slice(bytemuck::bytes_of(header));

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::model::ipv4_to_network;
    use ipvsmon_common::protocol;
    use std::io;
    use std::net::Ipv4Addr;

    /// Channel answering every query through a closure.
    struct Scripted<F>(F);

    fn scripted<F>(f: F) -> Scripted<F>
    where
        F: FnMut(i32, &mut [u8]) -> io::Result<usize>,
    {
        Scripted(f)
    }

    impl<F> ControlChannel for Scripted<F>
    where
        F: FnMut(i32, &mut [u8]) -> io::Result<usize>,
    {
        fn query(&mut self, optname: i32, buf: &mut [u8]) -> io::Result<usize> {
            (self.0)(optname, buf)
        }
    }

    fn service(addr: [u8; 4], port: u16, conns: u32) -> ServiceEntry {
        let mut entry = ServiceEntry {
            protocol: protocol::TCP,
            addr: ipv4_to_network(Ipv4Addr::from(addr)),
            port: port.to_be(),
            ..ServiceEntry::default()
        };
        entry.stats.conns = conns;
        entry
    }

    /// Kernel behaviour: fill at most the announced number of slots.
    fn serve_services(table: Vec<ServiceEntry>) -> impl FnMut(i32, &mut [u8]) -> io::Result<usize> {
        move |optname: i32, buf: &mut [u8]| {
            assert_eq!(optname, sockopt::GET_SERVICES);
            let header: GetServicesHeader =
                bytemuck::pod_read_unaligned(&buf[..size_of::<GetServicesHeader>()]);
            let room = header.num_services as usize;
            let offset = size_of::<GetServicesHeader>();
            for (i, entry) in table.iter().take(room).enumerate() {
                let start = offset + i * size_of::<ServiceEntry>();
                buf[start..start + size_of::<ServiceEntry>()]
                    .copy_from_slice(bytemuck::bytes_of(entry));
            }
            Ok(buf.len())
        }
    }

    #[test]
    fn zero_count_is_an_empty_table() {
        let mut channel = scripted(serve_services(vec![]));
        let services = fetch_services(&mut channel, 0).unwrap();
        assert!(services.is_empty());
    }

    #[test]
    fn growth_is_truncated_to_announced_count() {
        let table = vec![
            service([10, 0, 0, 1], 80, 1),
            service([10, 0, 0, 2], 80, 2),
            service([10, 0, 0, 3], 80, 3),
        ];
        let mut channel = scripted(serve_services(table));

        let services = fetch_services(&mut channel, 2).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[1].address, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn shrink_drops_unfilled_slots() {
        let mut channel = scripted(serve_services(vec![service([10, 0, 0, 1], 443, 9)]));

        let services = fetch_services(&mut channel, 4).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].port, 443);
        assert_eq!(services[0].counters.connections, 9);
    }

    #[test]
    fn short_answer_is_size_mismatch() {
        let mut channel = scripted(|_, buf: &mut [u8]| Ok(buf.len() - 1));

        let err = fetch_services(&mut channel, 1).unwrap_err();
        assert!(matches!(
            err,
            IpvsError::SizeMismatch {
                op: KernelOp::GetServices,
                ..
            }
        ));
    }

    #[test]
    fn errno_is_mapped_per_operation() {
        let mut channel = scripted(|_, _: &mut [u8]| Err(io::Error::from_raw_os_error(libc::ESRCH)));

        let err = fetch_services(&mut channel, 1).unwrap_err();
        assert!(matches!(err, IpvsError::NoSuchService { .. }));
    }

    #[test]
    fn unrepresentable_size_is_fatal_allocation_failure() {
        let mut channel = scripted(|_, _: &mut [u8]| -> io::Result<usize> {
            panic!("kernel must not be queried")
        });

        let err = fetch_services(&mut channel, u32::MAX).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, IpvsError::AllocationFailed { what: "service", .. }));
    }

    #[test]
    fn destination_request_addresses_its_service() {
        let svc = VirtualService::from(&ServiceEntry {
            num_dests: 1,
            ..service([192, 168, 1, 10], 53, 0)
        });
        let expected_addr = svc.raw().addr;

        let mut channel = scripted(move |optname, buf: &mut [u8]| {
            assert_eq!(optname, sockopt::GET_DESTS);
            let header: GetDestsHeader =
                bytemuck::pod_read_unaligned(&buf[..size_of::<GetDestsHeader>()]);
            assert_eq!(header.addr, expected_addr);
            assert_eq!(header.port, 53u16.to_be());
            assert_eq!(header.num_dests, 1);

            let dest = DestEntry {
                addr: ipv4_to_network(Ipv4Addr::new(192, 168, 1, 20)),
                port: 5353u16.to_be(),
                weight: 1,
                ..DestEntry::default()
            };
            let offset = size_of::<GetDestsHeader>();
            buf[offset..].copy_from_slice(bytemuck::bytes_of(&dest));
            Ok(buf.len())
        });

        let dests = fetch_destinations(&mut channel, &svc).unwrap();
        assert_eq!(dests.len(), 1);
        assert_eq!(dests[0].address, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(dests[0].port, 5353);
    }

    #[test]
    fn info_reports_service_count() {
        let mut channel = scripted(|optname, buf: &mut [u8]| {
            assert_eq!(optname, sockopt::GET_INFO);
            let info = GetInfo {
                version: 0x010201,
                size: 4096,
                num_services: 3,
            };
            buf.copy_from_slice(bytemuck::bytes_of(&info));
            Ok(buf.len())
        });

        let info = fetch_info(&mut channel).unwrap();
        assert_eq!(info.num_services, 3);
        assert_eq!(info.connection_table_size, 4096);
    }

    #[test]
    fn table_len_includes_header() {
        assert_eq!(table_len::<GetServicesHeader, ServiceEntry>(0), Some(8));
        assert_eq!(table_len::<GetDestsHeader, DestEntry>(2), Some(24 + 2 * 96));
    }
}
