//! Tormenta: Distributed Block-Decomposed Matrix Pipeline
//!
//! **Tormenta** (Spanish: "storm") computes
//!
//! ```text
//! P = maxD·(A·B·C) + minA·(D·C·B)
//! R = avgP·P
//! ```
//!
//! over `n×n` double-precision matrices, split row-wise across a fixed
//! group of `p` cooperating workers. The inputs are seeded from arithmetic
//! progressions, so every result — extrema, products, the global average —
//! has a closed form the run is validated against.
//!
//! # Design Principles
//!
//! - **Explicit worker contexts**: each rank owns its partitions and its
//!   communication endpoint; global scalars are return values of the
//!   reduction primitive, never ambient state.
//! - **Collectives carry all ordering**: scatter, broadcast, all-reduce,
//!   gather, and barrier are blocking and ordered; between them workers
//!   run fully in parallel with no shared mutable state.
//! - **Owned, zeroed, fallible buffers**: every buffer is allocated
//!   through a fallible constructor and starts zeroed, which the
//!   accumulating kernel requires.
//! - **Accumulation order is part of the contract**: the kernel reads its
//!   right operand transposed (`Σ_k left[i,k]·right[j,k]`) and the
//!   validator depends on exactly that convention.
//!
//! # Quick Start
//!
//! ```rust
//! use tormenta::{run, RunConfig, Validator};
//!
//! // 4×4 matrices, 2×2 blocks, 2 workers
//! let cfg = RunConfig::new(4, 2, 2).unwrap();
//! let outcome = run(&cfg).unwrap();
//!
//! assert_eq!(outcome.min_a, 1.0);
//! assert_eq!(outcome.max_d, 4.0);
//! assert!(Validator::new(4).check(&outcome).passed());
//! ```

pub mod comm;
pub mod config;
pub mod error;
pub mod kernel;
pub mod matrix;
pub mod pipeline;
pub mod validate;

pub use config::RunConfig;
pub use error::{Result, TormentaError};
pub use matrix::Matrix;
pub use pipeline::{run, Outcome, COORDINATOR};
pub use validate::{AverageCheck, Mismatch, Validation, Validator, AVG_CHECK_LIMIT};
