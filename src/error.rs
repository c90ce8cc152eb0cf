//! Error types for Tormenta operations

use thiserror::Error;

/// Result type for Tormenta operations
pub type Result<T> = std::result::Result<T, TormentaError>;

/// Errors that can occur while configuring or running the pipeline
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TormentaError {
    /// Launch parameters rejected before any collective operation began
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid input to a collective or matrix operation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Buffer allocation failed
    #[error("allocation of {elements} elements ({bytes} bytes) failed")]
    AllocationFailed {
        /// Number of `f64` elements requested
        elements: usize,
        /// Equivalent size in bytes
        bytes: usize,
    },

    /// A peer dropped out of the worker group mid-collective
    #[error("rank {rank}: peer disconnected during {op}")]
    CommDisconnected {
        /// Rank observing the disconnection
        rank: usize,
        /// Collective that was in flight
        op: &'static str,
    },

    /// A worker thread terminated abnormally
    #[error("worker {rank} terminated abnormally")]
    WorkerPanicked {
        /// Rank of the dead worker
        rank: usize,
    },
}
