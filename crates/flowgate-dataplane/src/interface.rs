//! Dispatch hierarchy: physical interface → sub-interface → port
//!
//! A physical interface demultiplexes frames by their outer tag into a
//! fixed-capacity array of sub-interfaces; each sub-interface delivers
//! to every port it owns (ports self-select by destination MAC).
//! Out-of-range tags are dropped before any indexing — a defensive
//! bound, not a reported error.
//!
//! Batch dispatch groups consecutive same-tag frames and issues a
//! prefetch hint one group ahead. Both are pure throughput tricks: the
//! counters and residual hand-offs are identical to per-frame
//! dispatch for any grouping.

use crate::frame::RxFrame;
use crate::port::Port;
use crate::DEFAULT_SUB_INTERFACES;

/// Logical grouping of ports under one outer tag
#[derive(Default)]
pub struct SubInterface {
    ports: Vec<Port>,
}

impl SubInterface {
    /// Sub-interface with no ports
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a port, returning a mutable handle for configuration
    pub fn add_port(&mut self, port: Port) -> &mut Port {
        self.ports.push(port);
        self.ports.last_mut().expect("just pushed")
    }

    /// Bounds-checked port access
    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    /// Bounds-checked mutable port access
    pub fn port_mut(&mut self, index: usize) -> Option<&mut Port> {
        self.ports.get_mut(index)
    }

    /// Number of attached ports
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Deliver one frame to every attached port
    #[inline]
    pub fn pop(&mut self, frame: &RxFrame<'_>) {
        for port in &mut self.ports {
            port.pop(frame);
        }
    }

    /// Deliver a same-tag group of frames
    ///
    /// Walks the group four frames at a time, hinting the chunk after
    /// the current one. Outcome is identical to calling
    /// [`SubInterface::pop`] per frame.
    #[inline]
    pub fn pop_batch(&mut self, frames: &[RxFrame<'_>]) {
        for (i, chunk) in frames.chunks(4).enumerate() {
            if let Some(next) = frames.get((i + 1) * 4) {
                prefetch(next.data());
            }
            for frame in chunk {
                self.pop(frame);
            }
        }
    }
}

/// Entry point of the dispatch hierarchy
pub struct PhysicalInterface {
    sub_interfaces: Vec<SubInterface>,
}

impl PhysicalInterface {
    /// Interface with the default sub-interface capacity (64)
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUB_INTERFACES)
    }

    /// Interface with `capacity` pre-built sub-interfaces
    ///
    /// The tag space is this fixed array; tags at or past `capacity`
    /// are dropped at dispatch.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut sub_interfaces = Vec::with_capacity(capacity);
        sub_interfaces.resize_with(capacity, SubInterface::new);
        Self { sub_interfaces }
    }

    /// Bounds-checked sub-interface access
    pub fn sub_interface(&self, index: usize) -> Option<&SubInterface> {
        self.sub_interfaces.get(index)
    }

    /// Bounds-checked mutable sub-interface access
    pub fn sub_interface_mut(&mut self, index: usize) -> Option<&mut SubInterface> {
        self.sub_interfaces.get_mut(index)
    }

    /// Configured tag capacity
    pub fn sub_interface_count(&self) -> usize {
        self.sub_interfaces.len()
    }

    /// Dispatch one frame by its outer tag
    ///
    /// Out-of-range tags drop silently: no counter moves, nothing is
    /// queued.
    #[inline]
    pub fn pop(&mut self, frame: &RxFrame<'_>) {
        match self.sub_interfaces.get_mut(frame.sub_interface() as usize) {
            Some(sub) => sub.pop(frame),
            None => {
                tracing::trace!(tag = frame.sub_interface(), "dropping frame for unknown tag");
            }
        }
    }

    /// Dispatch a batch, grouping consecutive frames with equal tags
    ///
    /// Groups amortize the sub-interface lookup; a prefetch hint is
    /// issued for the first frame past the current group. The set of
    /// counter increments and hand-offs equals per-frame dispatch for
    /// any batch size or ordering.
    #[inline]
    pub fn pop_batch(&mut self, frames: &[RxFrame<'_>]) {
        let mut begin = 0;
        while begin < frames.len() {
            let tag = frames[begin].sub_interface();
            let mut end = begin + 1;
            while end < frames.len() && frames[end].sub_interface() == tag {
                end += 1;
            }

            if let Some(next) = frames.get(end) {
                prefetch(next.data());
            }

            match self.sub_interfaces.get_mut(tag as usize) {
                Some(sub) => sub.pop_batch(&frames[begin..end]),
                None => {
                    tracing::trace!(tag, count = end - begin, "dropping group for unknown tag");
                }
            }
            begin = end;
        }
    }
}

impl Default for PhysicalInterface {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache prefetch hint
///
/// Purely advisory; must have no observable effect.
#[inline(always)]
fn prefetch(data: &[u8]) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch(data.as_ptr() as *const i8, _MM_HINT_T0);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = data;
}
