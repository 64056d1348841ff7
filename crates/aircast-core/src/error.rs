// crates/aircast-core/src/error.rs
//
// Typed pipeline errors.
//
// Per-tick failures are isolated at the component that raised them: a
// producer error clears its layer, a consumer error detaches that
// consumer, and the channel loop itself never stops on either.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayoutError {
    /// Malformed parameters to `call`, unknown format name, out-of-range crop.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Producer polled before its first frame. Surfaced as an empty frame by
    /// the layer, never propagated as an error.
    #[error("producer not ready")]
    NotReady,

    #[error("producer failed: {0}")]
    ProducerFailure(String),

    #[error("consumer failed: {0}")]
    ConsumerFailure(String),

    #[error("format not supported: {0}")]
    FormatNotSupported(String),

    /// Audio cadence carryover exceeded its cap; the tail was truncated and
    /// the mix proceeded.
    #[error("audio carryover buffer overflow ({got} > {cap} samples)")]
    BufferOverflow { got: usize, cap: usize },

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, PlayoutError>;
