//! Fixed-offset bitmask filter
//!
//! A `MaskFilter` encodes a 5-tuple selector as a 16-byte field/mask
//! pair covering the wire bytes from the IPv4 TTL through the
//! transport destination port. Matching is two masked 64-bit compares
//! with no early exit, so the cost is identical for hits and misses.

use flowgate_common::wire::{EthernetHeader, Ipv4Header};
use std::net::Ipv4Addr;

/// Bytes covered by the filter: TTL..=dst_port
pub const FILTER_LEN: usize = 16;

/// Frame offset of the filtered region
///
/// Ethernet header + IPv4 header + both transport ports, minus the
/// filter window. With a fixed 20-byte IPv4 header this lands on the
/// TTL byte (offset 22).
pub const FILTER_OFFSET: usize = EthernetHeader::LEN + Ipv4Header::LEN + 4 - FILTER_LEN;

/// Immutable field/mask predicate over two 64-bit words
///
/// Field layout of the covered region:
///
/// ```text
/// offset  0: ttl        (masked out)
/// offset  1: protocol
/// offset  2: checksum   (masked out, 2 bytes)
/// offset  4: source ip        (4 bytes, raw wire order)
/// offset  8: destination ip   (4 bytes, raw wire order)
/// offset 12: source port      (2 bytes, network order)
/// offset 14: destination port (2 bytes, network order)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskFilter {
    fields: [u64; 2],
    masks: [u64; 2],
}

impl MaskFilter {
    /// Build the field/mask pair for a 5-tuple selector
    ///
    /// Addresses are compared as raw wire bytes, never as host-order
    /// integers, so no byte swapping happens here or at match time.
    pub fn new(
        protocol: u8,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
    ) -> Self {
        let mut field_bytes = [0u8; FILTER_LEN];
        field_bytes[1] = protocol;
        field_bytes[4..8].copy_from_slice(&src_ip.octets());
        field_bytes[8..12].copy_from_slice(&dst_ip.octets());
        field_bytes[12..14].copy_from_slice(&src_port.to_be_bytes());
        field_bytes[14..16].copy_from_slice(&dst_port.to_be_bytes());

        let mask_bytes: [u8; FILTER_LEN] = [
            0x00, 0xFF, 0x00, 0x00, // ttl, protocol, checksum
            0xFF, 0xFF, 0xFF, 0xFF, // source ip
            0xFF, 0xFF, 0xFF, 0xFF, // destination ip
            0xFF, 0xFF, 0xFF, 0xFF, // source and destination ports
        ];

        Self {
            fields: split_words(&field_bytes),
            masks: split_words(&mask_bytes),
        }
    }

    /// Test a frame against the filter
    ///
    /// Branch-free over the two words: both compares always execute.
    /// Frames shorter than the filtered region never match; a
    /// truncated frame must not fault.
    #[inline(always)]
    pub fn matches(&self, frame: &[u8]) -> bool {
        if frame.len() < FILTER_OFFSET + FILTER_LEN {
            return false;
        }
        let words = split_words(&frame[FILTER_OFFSET..FILTER_OFFSET + FILTER_LEN]);
        (self.fields[0] == self.masks[0] & words[0])
            & (self.fields[1] == self.masks[1] & words[1])
    }
}

/// Reinterpret 16 bytes as two native-order words
///
/// Native order on both sides of the compare, so the result is the
/// same as comparing the raw bytes.
#[inline(always)]
fn split_words(bytes: &[u8]) -> [u64; 2] {
    debug_assert!(bytes.len() >= FILTER_LEN);
    [
        u64::from_ne_bytes(bytes[0..8].try_into().unwrap()),
        u64::from_ne_bytes(bytes[8..16].try_into().unwrap()),
    ]
}
