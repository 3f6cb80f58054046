//! Port: per-endpoint classification
//!
//! A port owns a flow table, its counters and the residual stack
//! queue. Frames reaching a port are classified by destination MAC
//! first; unicast IPv4 traffic is then matched against the flow table
//! and everything unclaimed (but plausibly addressed to us) goes to
//! the residual path.

use crate::flow::{Flow, FlowError, FlowHandle, FlowSelector, FlowTable};
use crate::frame::RxFrame;
use crate::stack::StackQueue;
use flowgate_common::wire::{EthernetHeader, Ipv4Header, MacAddr};
use serde::Serialize;
use std::net::Ipv4Addr;

/// Default residual queue capacity per port
pub const DEFAULT_STACK_CAPACITY: usize = 1024;

/// Per-port frame counters
///
/// Plain integers: a port is owned by exactly one dispatch thread.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct PortStats {
    /// Frames whose destination MAC matched the port's address
    pub unicast: u64,
    /// Frames addressed to the link-layer broadcast address
    pub broadcast: u64,
    /// Frames addressed to a group MAC
    pub multicast: u64,
    /// Frames accepted by at least one flow
    pub accepted: u64,
    /// Frames dropped for an invalid destination (MAC class or IP)
    pub invalid_destination: u64,
}

/// One receive endpoint in the dispatch hierarchy
pub struct Port {
    local_mac: MacAddr,
    local_ip: Ipv4Addr,
    l3_offset: usize,
    flow_table: FlowTable,
    stats: PortStats,
    stack: StackQueue,
}

impl Port {
    /// Port with a default-sized flow table and residual queue
    pub fn new(local_mac: MacAddr, local_ip: Ipv4Addr) -> Self {
        Self::with_parts(
            local_mac,
            local_ip,
            FlowTable::with_expected_flows(0),
            DEFAULT_STACK_CAPACITY,
        )
    }

    /// Port with an explicit flow table and residual queue capacity
    pub fn with_parts(
        local_mac: MacAddr,
        local_ip: Ipv4Addr,
        flow_table: FlowTable,
        stack_capacity: usize,
    ) -> Self {
        Self {
            local_mac,
            local_ip,
            l3_offset: EthernetHeader::LEN,
            flow_table,
            stats: PortStats::default(),
            stack: StackQueue::new(stack_capacity),
        }
    }

    /// Register a flow on this port (configuration time only)
    pub fn add_flow(&mut self, selector: FlowSelector) -> Result<FlowHandle, FlowError> {
        self.flow_table.add_flow(selector)
    }

    /// Flow behind a registration handle
    pub fn flow(&self, handle: FlowHandle) -> &Flow {
        self.flow_table.flow(handle)
    }

    /// Classify one frame
    ///
    /// Decision ladder:
    /// 1. frames without a full Ethernet header are dropped;
    /// 2. destination MAC class: local unicast, broadcast, multicast,
    ///    else invalid destination (dropped);
    /// 3. broadcast/multicast frames go straight to the residual path
    ///    without touching the flow table;
    /// 4. unicast IPv4 runs the flow table; a match is final. No
    ///    match: if the destination IP is neither ours nor a
    ///    broadcast/multicast address the destination is invalid,
    ///    otherwise the residual path takes it;
    /// 5. unicast non-IPv4 frames go to the residual path.
    #[inline]
    pub fn pop(&mut self, frame: &RxFrame<'_>) {
        if frame.len() < EthernetHeader::LEN {
            tracing::trace!(len = frame.len(), "dropping truncated frame");
            return;
        }

        if self.local_mac.matches_slice(frame.data()) {
            self.stats.unicast += 1;
        } else if frame.is_broadcast() {
            self.stats.broadcast += 1;
            self.handle_other(frame);
            return;
        } else if frame.is_multicast() {
            self.stats.multicast += 1;
            self.handle_other(frame);
            return;
        } else {
            self.stats.invalid_destination += 1;
            return;
        }

        if frame.is_ipv4() {
            if self.flow_table.classify(frame) > 0 {
                self.stats.accepted += 1;
                return;
            }

            // No flow claimed it; the destination IP may simply be
            // wrong, so it still needs checking.
            match Ipv4Header::parse_at(frame.data(), self.l3_offset) {
                Ok(ip) => {
                    let dst = ip.dst;
                    if dst != self.local_ip && !dst.is_broadcast() && !dst.is_multicast() {
                        self.stats.invalid_destination += 1;
                        return;
                    }
                }
                Err(err) => {
                    tracing::trace!(%err, "dropping truncated IPv4 frame");
                    return;
                }
            }
        }

        self.handle_other(frame);
    }

    #[inline(always)]
    fn handle_other(&mut self, frame: &RxFrame<'_>) {
        self.stack.enqueue(frame.data());
    }

    /// Counter snapshot
    pub fn stats(&self) -> &PortStats {
        &self.stats
    }

    /// The port's flow table
    pub fn flow_table(&self) -> &FlowTable {
        &self.flow_table
    }

    /// Residual queue toward the protocol stack
    pub fn stack(&mut self) -> &mut StackQueue {
        &mut self.stack
    }

    /// Configured MAC address
    pub fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    /// Configured IP address
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_common::wire::{build_udp_frame, MacAddr};

    const PORT_MAC: MacAddr = MacAddr([1, 2, 3, 4, 5, 1]);
    const PORT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn port() -> Port {
        Port::new(PORT_MAC, PORT_IP)
    }

    #[test]
    fn test_flow_accept() {
        let mut port = port();
        let handle = port
            .add_flow(FlowSelector::udp(PEER_IP, PORT_IP, 10, 10))
            .unwrap();

        let buf = build_udp_frame(PORT_MAC, PEER_IP, PORT_IP, 10, 10);
        port.pop(&RxFrame::new(&buf, 0));

        assert_eq!(port.stats().unicast, 1);
        assert_eq!(port.stats().accepted, 1);
        assert_eq!(port.flow(handle).packets(), 1);
        assert_eq!(port.stack.len(), 0);
    }

    #[test]
    fn test_unmatched_goes_to_stack() {
        let mut port = port();
        port.add_flow(FlowSelector::udp(PEER_IP, PORT_IP, 10, 10))
            .unwrap();

        // Unregistered destination port, valid destination IP.
        let buf = build_udp_frame(PORT_MAC, PEER_IP, PORT_IP, 99, 99);
        port.pop(&RxFrame::new(&buf, 0));

        assert_eq!(port.stats().unicast, 1);
        assert_eq!(port.stats().accepted, 0);
        assert_eq!(port.stack.len(), 1);
    }

    #[test]
    fn test_invalid_destination_ip_dropped() {
        let mut port = port();
        let buf = build_udp_frame(PORT_MAC, PEER_IP, Ipv4Addr::new(192, 168, 9, 9), 10, 10);
        port.pop(&RxFrame::new(&buf, 0));

        assert_eq!(port.stats().unicast, 1);
        assert_eq!(port.stats().invalid_destination, 1);
        assert_eq!(port.stack.len(), 0);
    }

    #[test]
    fn test_broadcast_skips_flow_table() {
        let mut port = port();
        let handle = port
            .add_flow(FlowSelector::udp(PEER_IP, Ipv4Addr::BROADCAST, 10, 10))
            .unwrap();

        let buf = build_udp_frame(MacAddr::BROADCAST, PEER_IP, Ipv4Addr::BROADCAST, 10, 10);
        port.pop(&RxFrame::new(&buf, 0));

        assert_eq!(port.stats().broadcast, 1);
        assert_eq!(port.stats().accepted, 0);
        // Never tested against any flow.
        assert_eq!(port.flow(handle).packets(), 0);
        assert_eq!(port.stack.len(), 1);
    }

    #[test]
    fn test_multicast_counted_and_forwarded() {
        let mut port = port();
        let buf = build_udp_frame(
            MacAddr([0x01, 0x00, 0x5E, 0, 0, 1]),
            PEER_IP,
            Ipv4Addr::new(224, 0, 0, 1),
            10,
            10,
        );
        port.pop(&RxFrame::new(&buf, 0));

        assert_eq!(port.stats().multicast, 1);
        assert_eq!(port.stack.len(), 1);
    }

    #[test]
    fn test_foreign_mac_counts_invalid_destination() {
        let mut port = port();
        let buf = build_udp_frame(MacAddr([0x02, 9, 9, 9, 9, 9]), PEER_IP, PORT_IP, 10, 10);
        port.pop(&RxFrame::new(&buf, 0));

        assert_eq!(port.stats().invalid_destination, 1);
        assert_eq!(port.stats().unicast, 0);
        assert_eq!(port.stack.len(), 0);
    }

    #[test]
    fn test_non_ipv4_to_stack() {
        let mut port = port();
        let mut buf = build_udp_frame(PORT_MAC, PEER_IP, PORT_IP, 10, 10);
        buf[12] = 0x86; // EtherType IPv6
        buf[13] = 0xDD;
        port.pop(&RxFrame::new(&buf, 0));

        assert_eq!(port.stats().unicast, 1);
        assert_eq!(port.stack.len(), 1);
    }

    #[test]
    fn test_truncated_frames_never_panic() {
        let mut port = port();
        port.add_flow(FlowSelector::udp(PEER_IP, PORT_IP, 10, 10))
            .unwrap();

        let buf = build_udp_frame(PORT_MAC, PEER_IP, PORT_IP, 10, 10);
        for len in 0..38 {
            port.pop(&RxFrame::new(&buf[..len], 0));
        }
        // Nothing accepted: every prefix is too short for the filter.
        assert_eq!(port.stats().accepted, 0);

        // The shortest frame carrying the whole tuple does match.
        port.pop(&RxFrame::new(&buf[..38], 0));
        assert_eq!(port.stats().accepted, 1);
    }
}
