//! Zero-copy received-frame view
//!
//! An `RxFrame` borrows one frame from the reception buffer: raw
//! bytes, length, and the outer tag naming the logical sub-interface
//! that produced it. All typed reads are bounds-checked; a truncated
//! frame yields `None` instead of reading past the buffer.

use flowgate_common::wire::{EthernetHeader, ETHERTYPE_IPV4};

/// Read-only view over one received frame
#[derive(Debug, Clone, Copy)]
pub struct RxFrame<'a> {
    data: &'a [u8],
    sub_interface: u8,
}

impl<'a> RxFrame<'a> {
    /// Wrap a received buffer with its sub-interface tag
    #[inline(always)]
    pub const fn new(data: &'a [u8], sub_interface: u8) -> Self {
        Self {
            data,
            sub_interface,
        }
    }

    /// Raw frame bytes
    #[inline(always)]
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Frame length in bytes
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length frame
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Outer tag identifying the logical sub-interface
    #[inline(always)]
    pub const fn sub_interface(&self) -> u8 {
        self.sub_interface
    }

    /// EtherType, if the frame holds a full Ethernet header
    #[inline(always)]
    pub fn ethertype(&self) -> Option<u16> {
        if self.data.len() < EthernetHeader::LEN {
            return None;
        }
        Some(u16::from_be_bytes([self.data[12], self.data[13]]))
    }

    /// True for an IPv4 frame
    #[inline(always)]
    pub fn is_ipv4(&self) -> bool {
        self.ethertype() == Some(ETHERTYPE_IPV4)
    }

    /// True if the destination MAC is the all-ones broadcast address
    #[inline(always)]
    pub fn is_broadcast(&self) -> bool {
        self.data.len() >= 6 && self.data[..6] == [0xFF; 6]
    }

    /// True if the destination MAC has the group bit set
    #[inline(always)]
    pub fn is_multicast(&self) -> bool {
        !self.data.is_empty() && self.data[0] & 0x01 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_common::wire::{build_udp_frame, MacAddr};
    use std::net::Ipv4Addr;

    #[test]
    fn test_frame_accessors() {
        let buf = build_udp_frame(
            MacAddr([1, 2, 3, 4, 5, 1]),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            10,
            10,
        );
        let frame = RxFrame::new(&buf, 3);
        assert_eq!(frame.len(), 42);
        assert_eq!(frame.sub_interface(), 3);
        assert!(frame.is_ipv4());
        assert!(!frame.is_broadcast());
        assert!(!frame.is_multicast());
    }

    #[test]
    fn test_broadcast_and_multicast() {
        let bcast = build_udp_frame(
            MacAddr::BROADCAST,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::BROADCAST,
            10,
            10,
        );
        let frame = RxFrame::new(&bcast, 0);
        assert!(frame.is_broadcast());
        assert!(frame.is_multicast()); // group bit is part of all-ones

        let mcast = build_udp_frame(
            MacAddr([0x01, 0x00, 0x5E, 0, 0, 1]),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(224, 0, 0, 1),
            10,
            10,
        );
        let frame = RxFrame::new(&mcast, 0);
        assert!(!frame.is_broadcast());
        assert!(frame.is_multicast());
    }

    #[test]
    fn test_truncated_frame_reads() {
        let frame = RxFrame::new(&[0xFF; 5], 0);
        assert_eq!(frame.ethertype(), None);
        assert!(!frame.is_ipv4());
        assert!(!frame.is_broadcast());
        assert!(frame.is_multicast());

        let empty = RxFrame::new(&[], 0);
        assert!(empty.is_empty());
        assert!(!empty.is_multicast());
    }
}
