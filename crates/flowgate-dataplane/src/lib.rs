//! Flowgate Data Plane
//!
//! Multi-level packet classification and dispatch engine.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!   rx batch ────► │      PhysicalInterface       │  demux by outer tag
//!                  └──────────────┬───────────────┘
//!                                 │
//!                  ┌──────────────▼───────────────┐
//!                  │        SubInterface          │  ordered ports
//!                  └──────────────┬───────────────┘
//!                                 │
//!                  ┌──────────────▼───────────────┐
//!                  │            Port              │  MAC classing
//!                  │  ┌────────────────────────┐  │
//!                  │  │       FlowTable        │  │  hash buckets,
//!                  │  │  (prime-sized buckets) │  │  mask filters
//!                  │  └───────────┬────────────┘  │
//!                  │              │ no match      │
//!                  │  ┌───────────▼────────────┐  │
//!                  │  │       StackQueue       │  │  residual path
//!                  │  └────────────────────────┘  │
//!                  └──────────────────────────────┘
//! ```
//!
//! # Key properties
//!
//! 1. **Bounded matching cost**: each frame is tested against only the
//!    flows in one hash bucket (typically ≤ 4 candidates), regardless
//!    of how many flows are registered.
//! 2. **Single-threaded ownership**: each dispatch hierarchy, its flow
//!    tables and counters belong to exactly one worker thread. No
//!    locks in the hot path.
//! 3. **Batching is invisible**: grouping frames by tag and prefetch
//!    hints never change counters or residual hand-offs.
//! 4. **No panics in the hot path**: truncated frames and unknown tags
//!    degrade to drops, never to out-of-bounds reads.

#![warn(missing_docs)]

pub mod engine;
pub mod filter;
pub mod flow;
pub mod frame;
pub mod interface;
pub mod port;
pub mod stack;

pub use engine::{Engine, EngineConfig, EngineError, EngineStatsSnapshot, OwnedFrame};
pub use filter::MaskFilter;
pub use flow::{Flow, FlowError, FlowHandle, FlowSelector, FlowTable};
pub use frame::RxFrame;
pub use interface::{PhysicalInterface, SubInterface};
pub use port::{Port, PortStats};
pub use stack::StackQueue;

/// Batch size for frame processing
pub const BATCH_SIZE: usize = 32;

/// Inline capacity of a flow-table bucket
pub const INLINE_BUCKET_CAP: usize = 4;

/// Default bucket count (prime, greatly reduces clustering)
pub const DEFAULT_BUCKET_COUNT: usize = 1021;

/// Default number of sub-interfaces per physical interface
pub const DEFAULT_SUB_INTERFACES: usize = 64;

/// Size of a residual-path frame buffer (pfring-style rx slot)
pub const STACK_BUFFER_SIZE: usize = 1536;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(INLINE_BUCKET_CAP, 4);
        // Bucket count must stay prime; see flow::FlowTable.
        assert!(DEFAULT_BUCKET_COUNT % 2 != 0);
        assert!(STACK_BUFFER_SIZE >= 1514);
    }
}
