//! Flowgate Common - Shared wire-format types for the data plane
//!
//! This crate provides the binary wire model used by the
//! classification engine:
//! - Link/network/transport header structs with explicit codecs
//! - MAC and protocol constants
//! - Frame builders for tests and benchmarks
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod wire;

pub use error::*;
pub use wire::*;
