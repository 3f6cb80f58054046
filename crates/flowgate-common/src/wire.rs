//! Binary wire model: Ethernet/IPv4/UDP/TCP headers
//!
//! Every header struct carries an explicit codec (`parse` /
//! `to_bytes`) that reads and writes network byte order at any offset
//! inside a frame buffer. The codecs are used both by the dispatch hot
//! path and by the frame builders that tests and benchmarks use to
//! synthesize traffic.

use crate::error::{WireError, WireResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// EtherType for IPv4
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// IP protocol number for TCP
pub const PROTO_TCP: u8 = 6;

/// IP protocol number for UDP
pub const PROTO_UDP: u8 = 17;

/// 48-bit MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Link-layer broadcast address (all ones)
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// Raw octets
    #[inline(always)]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// True for the all-ones broadcast address
    #[inline(always)]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 6]
    }

    /// True if the group bit (low bit of the first octet) is set
    #[inline(always)]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Compare against the first six bytes of a frame slice
    #[inline(always)]
    pub fn matches_slice(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 6 && bytes[..6] == self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

#[inline(always)]
fn window(buf: &[u8], offset: usize, len: usize) -> WireResult<&[u8]> {
    buf.get(offset..offset + len).ok_or(WireError::Truncated {
        needed: len,
        offset,
        len: buf.len(),
    })
}

/// Ethernet II header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    /// Destination MAC
    pub dst: MacAddr,
    /// Source MAC
    pub src: MacAddr,
    /// EtherType (host order)
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Encoded length in bytes
    pub const LEN: usize = 14;

    /// Header carrying IPv4 with the given MACs
    pub const fn new(dst: MacAddr, src: MacAddr) -> Self {
        Self {
            dst,
            src,
            ethertype: ETHERTYPE_IPV4,
        }
    }

    /// Decode from the start of `bytes`
    #[inline]
    pub fn parse(bytes: &[u8]) -> WireResult<Self> {
        Self::parse_at(bytes, 0)
    }

    /// Decode at `offset` inside `buf`
    #[inline]
    pub fn parse_at(buf: &[u8], offset: usize) -> WireResult<Self> {
        let bytes = window(buf, offset, Self::LEN)?;
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&bytes[0..6]);
        src.copy_from_slice(&bytes[6..12]);
        Ok(Self {
            dst: MacAddr(dst),
            src: MacAddr(src),
            ethertype: u16::from_be_bytes([bytes[12], bytes[13]]),
        })
    }

    /// Encode in wire order
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..6].copy_from_slice(&self.dst.0);
        out[6..12].copy_from_slice(&self.src.0);
        out[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
        out
    }
}

/// IPv4 header (no options: IHL is fixed at 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Version and IHL nibble pair
    pub version_ihl: u8,
    /// Type of service
    pub tos: u8,
    /// Total datagram length
    pub total_len: u16,
    /// Identification
    pub ident: u16,
    /// Flags and fragment offset
    pub flags_frag: u16,
    /// Time to live
    pub ttl: u8,
    /// Transport protocol number
    pub protocol: u8,
    /// Header checksum (not validated here)
    pub checksum: u16,
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Encoded length in bytes
    pub const LEN: usize = 20;

    /// Header with recommended defaults (version 4, IHL 5, TTL 64)
    pub fn new(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self {
            version_ihl: (4 << 4) | 5,
            tos: 0,
            total_len: Self::LEN as u16,
            ident: 0,
            flags_frag: 0,
            ttl: 64,
            protocol,
            checksum: 0,
            src,
            dst,
        }
    }

    /// Decode from the start of `bytes`
    #[inline]
    pub fn parse(bytes: &[u8]) -> WireResult<Self> {
        Self::parse_at(bytes, 0)
    }

    /// Decode at `offset` inside `buf`
    #[inline]
    pub fn parse_at(buf: &[u8], offset: usize) -> WireResult<Self> {
        let bytes = window(buf, offset, Self::LEN)?;
        Ok(Self {
            version_ihl: bytes[0],
            tos: bytes[1],
            total_len: u16::from_be_bytes([bytes[2], bytes[3]]),
            ident: u16::from_be_bytes([bytes[4], bytes[5]]),
            flags_frag: u16::from_be_bytes([bytes[6], bytes[7]]),
            ttl: bytes[8],
            protocol: bytes[9],
            checksum: u16::from_be_bytes([bytes[10], bytes[11]]),
            src: Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]),
            dst: Ipv4Addr::new(bytes[16], bytes[17], bytes[18], bytes[19]),
        })
    }

    /// Encode in wire order
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.version_ihl;
        out[1] = self.tos;
        out[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.ident.to_be_bytes());
        out[6..8].copy_from_slice(&self.flags_frag.to_be_bytes());
        out[8] = self.ttl;
        out[9] = self.protocol;
        out[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        out[12..16].copy_from_slice(&self.src.octets());
        out[16..20].copy_from_slice(&self.dst.octets());
        out
    }
}

/// UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Datagram length
    pub length: u16,
    /// Checksum (optional in IPv4, not validated here)
    pub checksum: u16,
}

impl UdpHeader {
    /// Encoded length in bytes
    pub const LEN: usize = 8;

    /// Header for an empty datagram
    pub const fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            length: Self::LEN as u16,
            checksum: 0,
        }
    }

    /// Decode from the start of `bytes`
    #[inline]
    pub fn parse(bytes: &[u8]) -> WireResult<Self> {
        Self::parse_at(bytes, 0)
    }

    /// Decode at `offset` inside `buf`
    #[inline]
    pub fn parse_at(buf: &[u8], offset: usize) -> WireResult<Self> {
        let bytes = window(buf, offset, Self::LEN)?;
        Ok(Self {
            src_port: u16::from_be_bytes([bytes[0], bytes[1]]),
            dst_port: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            checksum: u16::from_be_bytes([bytes[6], bytes[7]]),
        })
    }

    /// Encode in wire order
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        out[4..6].copy_from_slice(&self.length.to_be_bytes());
        out[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        out
    }
}

/// TCP header (no options: data offset is fixed at 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Sequence number
    pub seq: u32,
    /// Acknowledgement number
    pub ack: u32,
    /// Data offset and flags
    pub data_offset_flags: u16,
    /// Receive window
    pub window: u16,
    /// Checksum (not validated here)
    pub checksum: u16,
    /// Urgent pointer
    pub urgent: u16,
}

impl TcpHeader {
    /// Encoded length in bytes
    pub const LEN: usize = 20;

    /// Header with data offset 5 and no flags
    pub const fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq: 0,
            ack: 0,
            data_offset_flags: 5 << 12,
            window: 0,
            checksum: 0,
            urgent: 0,
        }
    }

    /// Decode from the start of `bytes`
    #[inline]
    pub fn parse(bytes: &[u8]) -> WireResult<Self> {
        Self::parse_at(bytes, 0)
    }

    /// Decode at `offset` inside `buf`
    #[inline]
    pub fn parse_at(buf: &[u8], offset: usize) -> WireResult<Self> {
        let bytes = window(buf, offset, Self::LEN)?;
        Ok(Self {
            src_port: u16::from_be_bytes([bytes[0], bytes[1]]),
            dst_port: u16::from_be_bytes([bytes[2], bytes[3]]),
            seq: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            ack: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            data_offset_flags: u16::from_be_bytes([bytes[12], bytes[13]]),
            window: u16::from_be_bytes([bytes[14], bytes[15]]),
            checksum: u16::from_be_bytes([bytes[16], bytes[17]]),
            urgent: u16::from_be_bytes([bytes[18], bytes[19]]),
        })
    }

    /// Encode in wire order
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        out[4..8].copy_from_slice(&self.seq.to_be_bytes());
        out[8..12].copy_from_slice(&self.ack.to_be_bytes());
        out[12..14].copy_from_slice(&self.data_offset_flags.to_be_bytes());
        out[14..16].copy_from_slice(&self.window.to_be_bytes());
        out[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        out[18..20].copy_from_slice(&self.urgent.to_be_bytes());
        out
    }
}

/// Build a minimal Ethernet + IPv4 + UDP frame
///
/// Used by tests and benchmarks to synthesize traffic that the mask
/// filters can match.
pub fn build_udp_frame(
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(EthernetHeader::LEN + Ipv4Header::LEN + UdpHeader::LEN);
    let eth = EthernetHeader::new(dst_mac, MacAddr([0x02, 0, 0, 0, 0, 0x01]));
    let mut ip = Ipv4Header::new(PROTO_UDP, src_ip, dst_ip);
    ip.total_len = (Ipv4Header::LEN + UdpHeader::LEN) as u16;
    let udp = UdpHeader::new(src_port, dst_port);
    frame.extend_from_slice(&eth.to_bytes());
    frame.extend_from_slice(&ip.to_bytes());
    frame.extend_from_slice(&udp.to_bytes());
    frame
}

/// Build a minimal Ethernet + IPv4 + TCP frame
pub fn build_tcp_frame(
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(EthernetHeader::LEN + Ipv4Header::LEN + TcpHeader::LEN);
    let eth = EthernetHeader::new(dst_mac, MacAddr([0x02, 0, 0, 0, 0, 0x01]));
    let mut ip = Ipv4Header::new(PROTO_TCP, src_ip, dst_ip);
    ip.total_len = (Ipv4Header::LEN + TcpHeader::LEN) as u16;
    let tcp = TcpHeader::new(src_port, dst_port);
    frame.extend_from_slice(&eth.to_bytes());
    frame.extend_from_slice(&ip.to_bytes());
    frame.extend_from_slice(&tcp.to_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethernet_round_trip() {
        let hdr = EthernetHeader {
            dst: MacAddr([1, 2, 3, 4, 5, 6]),
            src: MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
            ethertype: ETHERTYPE_IPV4,
        };
        let bytes = hdr.to_bytes();
        assert_eq!(EthernetHeader::parse(&bytes), Ok(hdr));
    }

    #[test]
    fn test_ipv4_round_trip() {
        let mut hdr = Ipv4Header::new(PROTO_UDP, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        hdr.total_len = 1514;
        hdr.ident = 0x1234;
        hdr.checksum = 0xBEEF;
        let bytes = hdr.to_bytes();
        assert_eq!(Ipv4Header::parse(&bytes), Ok(hdr));
    }

    #[test]
    fn test_udp_round_trip() {
        let hdr = UdpHeader::new(1000, 2000);
        assert_eq!(UdpHeader::parse(&hdr.to_bytes()), Ok(hdr));
    }

    #[test]
    fn test_tcp_round_trip() {
        let mut hdr = TcpHeader::new(443, 51000);
        hdr.seq = 0xDEADBEEF;
        hdr.ack = 0x01020304;
        hdr.window = 65535;
        assert_eq!(TcpHeader::parse(&hdr.to_bytes()), Ok(hdr));
    }

    #[test]
    fn test_parse_at_offset() {
        let frame = build_udp_frame(
            MacAddr([1, 2, 3, 4, 5, 1]),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 2),
            10,
            20,
        );
        let ip = Ipv4Header::parse_at(&frame, EthernetHeader::LEN).unwrap();
        assert_eq!(ip.protocol, PROTO_UDP);
        assert_eq!(ip.src, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(ip.dst, Ipv4Addr::new(192, 168, 1, 2));

        let udp = UdpHeader::parse_at(&frame, EthernetHeader::LEN + Ipv4Header::LEN).unwrap();
        assert_eq!(udp.src_port, 10);
        assert_eq!(udp.dst_port, 20);
    }

    #[test]
    fn test_truncated_parse_fails() {
        let frame = build_udp_frame(
            MacAddr::BROADCAST,
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(2, 2, 2, 2),
            1,
            2,
        );
        assert_eq!(
            Ipv4Header::parse(&frame[14..20]),
            Err(WireError::Truncated {
                needed: Ipv4Header::LEN,
                offset: 0,
                len: 6,
            })
        );
        assert!(EthernetHeader::parse(&frame[..13]).is_err());
        assert!(Ipv4Header::parse_at(&frame, frame.len()).is_err());
    }

    #[test]
    fn test_mac_classes() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!(MacAddr([0x01, 0, 0x5E, 0, 0, 1]).is_multicast());
        assert!(!MacAddr([0x02, 0, 0, 0, 0, 1]).is_multicast());
        assert_eq!(MacAddr([1, 2, 3, 4, 5, 6]).to_string(), "01:02:03:04:05:06");
    }

    #[test]
    fn test_wire_byte_order() {
        // Ports live at fixed offsets in network byte order.
        let frame = build_udp_frame(
            MacAddr([1, 2, 3, 4, 5, 1]),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            0x1234,
            0x5678,
        );
        assert_eq!(frame[23], PROTO_UDP);
        assert_eq!(&frame[34..36], &[0x12, 0x34]);
        assert_eq!(&frame[36..38], &[0x56, 0x78]);
    }
}
