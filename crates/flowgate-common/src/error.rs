//! Error types for flowgate

use thiserror::Error;

/// Wire decoding error
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Buffer too short for the requested decode
    #[error("truncated buffer: need {needed} bytes at offset {offset}, have {len}")]
    Truncated {
        /// Bytes required past the offset
        needed: usize,
        /// Offset the decode started at
        offset: usize,
        /// Total buffer length
        len: usize,
    },
}

/// Result type for wire decoding
pub type WireResult<T> = Result<T, WireError>;
