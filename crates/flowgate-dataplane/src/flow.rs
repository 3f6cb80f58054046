//! Flows and the hash-bucketed flow table
//!
//! # Design
//!
//! - A `Flow` couples a mask filter with a selector hash computed once
//!   at registration, plus accepted packet/byte counters.
//! - The `FlowTable` maps `hash % bucket_count` to a bucket of
//!   candidate flow indices. Bucket counts are prime, which greatly
//!   reduces clustering, so classification cost stays near O(1) even
//!   with tens of thousands of registered flows.
//! - Buckets store up to four indices inline and only promote to a
//!   heap-allocated list when they overflow. Almost all buckets stay
//!   inline, keeping a lookup within one cache line.
//!
//! The table is exclusively owned by one dispatch thread; there is no
//! interior locking, and flows are registered before traffic starts.

use crate::filter::MaskFilter;
use crate::frame::RxFrame;
use crate::{DEFAULT_BUCKET_COUNT, INLINE_BUCKET_CAP};
use flowgate_common::wire::{EthernetHeader, Ipv4Header};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Frame offset of the IPv4 protocol byte
const PROTOCOL_OFFSET: usize = EthernetHeader::LEN + 9;

/// Frame offset of the IPv4 source address
const SRC_IP_OFFSET: usize = EthernetHeader::LEN + 12;

/// Frame offset of the transport ports (fixed 20-byte IPv4 header)
const PORTS_OFFSET: usize = EthernetHeader::LEN + Ipv4Header::LEN;

/// Bytes needed before a frame can be hashed
const HASH_MIN_LEN: usize = PORTS_OFFSET + 4;

/// Flow registration errors
///
/// Configuration problems surface here, synchronously at the
/// registration boundary — never at dispatch time.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// A flow with the same selector is already registered
    #[error("duplicate flow selector")]
    DuplicateFlow,

    /// The table reached the maximum number of flows
    #[error("flow table full")]
    TableFull,

    /// A table cannot have zero buckets
    #[error("flow table needs at least one bucket")]
    ZeroBuckets,
}

/// 5-tuple selector identifying a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSelector {
    /// IP protocol (TCP=6, UDP=17)
    pub protocol: u8,
    /// Source address
    pub src_ip: Ipv4Addr,
    /// Destination address
    pub dst_ip: Ipv4Addr,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
}

impl FlowSelector {
    /// UDP selector shorthand
    pub const fn udp(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self {
            protocol: flowgate_common::wire::PROTO_UDP,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
        }
    }

    /// TCP selector shorthand
    pub const fn tcp(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self {
            protocol: flowgate_common::wire::PROTO_TCP,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
        }
    }

    /// Selector hash: FNV-1a over the tuple fields in wire order
    ///
    /// Order sensitive by construction — swapping source and
    /// destination walks the bytes in a different order and lands in a
    /// different bucket.
    #[inline(always)]
    pub fn hash(&self) -> u64 {
        let mut h = FNV_OFFSET;
        h = fnv1a(h, self.protocol);
        for b in self.src_ip.octets() {
            h = fnv1a(h, b);
        }
        for b in self.dst_ip.octets() {
            h = fnv1a(h, b);
        }
        for b in self.src_port.to_be_bytes() {
            h = fnv1a(h, b);
        }
        for b in self.dst_port.to_be_bytes() {
            h = fnv1a(h, b);
        }
        h
    }

    /// The mask filter encoding this selector
    pub(crate) fn filter(&self) -> MaskFilter {
        MaskFilter::new(
            self.protocol,
            self.src_ip,
            self.dst_ip,
            self.src_port,
            self.dst_port,
        )
    }
}

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

#[inline(always)]
fn fnv1a(h: u64, byte: u8) -> u64 {
    (h ^ byte as u64).wrapping_mul(FNV_PRIME)
}

/// Hash a frame's 5-tuple bytes the same way `FlowSelector::hash` does
///
/// Returns `None` when the frame is too short to carry the tuple.
#[inline(always)]
pub fn frame_hash(frame: &[u8]) -> Option<u64> {
    if frame.len() < HASH_MIN_LEN {
        return None;
    }
    let mut h = FNV_OFFSET;
    h = fnv1a(h, frame[PROTOCOL_OFFSET]);
    // Both addresses, then both ports, in raw wire order.
    for &b in &frame[SRC_IP_OFFSET..SRC_IP_OFFSET + 8] {
        h = fnv1a(h, b);
    }
    for &b in &frame[PORTS_OFFSET..PORTS_OFFSET + 4] {
        h = fnv1a(h, b);
    }
    Some(h)
}

/// Handle returned by flow registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowHandle(u16);

impl FlowHandle {
    /// Index of the flow inside its table
    #[inline(always)]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A registered flow: filter, cached hash and accept counters
#[derive(Debug, Clone)]
pub struct Flow {
    filter: MaskFilter,
    hash: u64,
    packets: u64,
    bytes: u64,
}

impl Flow {
    fn new(selector: &FlowSelector) -> Self {
        Self {
            filter: selector.filter(),
            hash: selector.hash(),
            packets: 0,
            bytes: 0,
        }
    }

    /// Selector hash, computed once at registration
    #[inline(always)]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Test a frame against the flow's filter
    #[inline(always)]
    pub fn matches(&self, frame: &[u8]) -> bool {
        self.filter.matches(frame)
    }

    /// Record an accepted frame
    #[inline(always)]
    fn accept(&mut self, len: usize) {
        self.packets += 1;
        self.bytes += len as u64;
    }

    /// Accepted packet count
    #[inline(always)]
    pub const fn packets(&self) -> u64 {
        self.packets
    }

    /// Accepted byte count
    #[inline(always)]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// One hash-table slot: inline indices with a lazily allocated spill
///
/// Insertions stay in the inline array until it fills; the first
/// overflow copies the inline entries into a boxed vector and all
/// later inserts go there. Once spilled, a bucket never goes back to
/// inline storage.
#[derive(Debug, Default, Clone)]
struct Bucket {
    inline: [u16; INLINE_BUCKET_CAP],
    len: u8,
    spill: Option<Box<Vec<u16>>>,
}

impl Bucket {
    fn push(&mut self, index: u16) {
        if let Some(spill) = &mut self.spill {
            spill.push(index);
            return;
        }
        if (self.len as usize) < INLINE_BUCKET_CAP {
            self.inline[self.len as usize] = index;
            self.len += 1;
            return;
        }
        let mut spill = Vec::with_capacity(2 * INLINE_BUCKET_CAP);
        spill.extend_from_slice(&self.inline);
        spill.push(index);
        self.spill = Some(Box::new(spill));
    }

    #[inline(always)]
    fn as_slice(&self) -> &[u16] {
        match &self.spill {
            Some(spill) => spill,
            None => &self.inline[..self.len as usize],
        }
    }

    #[cfg(test)]
    fn is_spilled(&self) -> bool {
        self.spill.is_some()
    }
}

/// Hash-bucketed table owning all flows registered on one port
pub struct FlowTable {
    flows: Vec<Flow>,
    // Selectors are kept only for duplicate detection at registration.
    selectors: Vec<FlowSelector>,
    buckets: Box<[Bucket]>,
}

impl FlowTable {
    /// Table with an explicit bucket count
    ///
    /// The count should be prime; use [`FlowTable::with_expected_flows`]
    /// to have one picked.
    pub fn new(bucket_count: usize) -> Result<Self, FlowError> {
        if bucket_count == 0 {
            return Err(FlowError::ZeroBuckets);
        }
        Ok(Self {
            flows: Vec::new(),
            selectors: Vec::new(),
            buckets: vec![Bucket::default(); bucket_count].into_boxed_slice(),
        })
    }

    /// Table sized to the smallest prime ≥ the expected flow count
    ///
    /// Bucket occupancy stays proportional to `flows / buckets`, so a
    /// table on the order of the expected flow count keeps the
    /// candidate scan O(1) amortized.
    pub fn with_expected_flows(expected: usize) -> Self {
        let count = next_prime(expected.max(DEFAULT_BUCKET_COUNT));
        Self {
            flows: Vec::new(),
            selectors: Vec::new(),
            buckets: vec![Bucket::default(); count].into_boxed_slice(),
        }
    }

    /// Register a flow, returning its handle
    ///
    /// Rejects duplicate selectors and tables past `u16::MAX + 1`
    /// flows (bucket entries are 16-bit indices).
    pub fn add_flow(&mut self, selector: FlowSelector) -> Result<FlowHandle, FlowError> {
        if self.flows.len() > u16::MAX as usize {
            return Err(FlowError::TableFull);
        }
        let hash = selector.hash();
        let bucket_index = (hash % self.buckets.len() as u64) as usize;

        // A duplicate selector necessarily hashes to the same bucket.
        for &idx in self.buckets[bucket_index].as_slice() {
            if self.selectors[idx as usize] == selector {
                return Err(FlowError::DuplicateFlow);
            }
        }

        let flow_index = self.flows.len() as u16;
        self.flows.push(Flow::new(&selector));
        self.selectors.push(selector);
        self.buckets[bucket_index].push(flow_index);
        Ok(FlowHandle(flow_index))
    }

    /// Classify a frame against the table
    ///
    /// Computes the frame's selector hash, locates the bucket and
    /// tests every candidate flow in it — the hash may collide across
    /// distinct selectors, so candidates are always verified with the
    /// full mask filter. Every matching flow accepts the frame; the
    /// return value is the number of matches. Frames too short to
    /// hash match nothing.
    #[inline]
    pub fn classify(&mut self, frame: &RxFrame<'_>) -> u32 {
        let data = frame.data();
        let Some(hash) = frame_hash(data) else {
            return 0;
        };
        let bucket = &self.buckets[(hash % self.buckets.len() as u64) as usize];

        let mut matched = 0;
        for &idx in bucket.as_slice() {
            let flow = &mut self.flows[idx as usize];
            if flow.matches(data) {
                flow.accept(data.len());
                matched += 1;
            }
        }
        matched
    }

    /// Flow behind a registration handle
    #[inline(always)]
    pub fn flow(&self, handle: FlowHandle) -> &Flow {
        &self.flows[handle.index()]
    }

    /// Number of registered flows
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// True when no flows are registered
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Number of hash buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Candidate count in the bucket a selector maps to
    pub fn bucket_len(&self, selector: &FlowSelector) -> usize {
        let idx = (selector.hash() % self.buckets.len() as u64) as usize;
        self.buckets[idx].as_slice().len()
    }
}

/// Smallest prime ≥ `n`
fn next_prime(n: usize) -> usize {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}
