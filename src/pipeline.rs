//! The distribute → compute → reduce → recombine → gather pipeline
//!
//! [`run`] executes the whole computation over a fixed-size SPMD group of
//! worker threads: the coordinator (rank 0) owns the full matrices, every
//! rank owns its row-band partitions, and all coordination happens at the
//! collective calls of [`crate::comm`]. Between collectives each worker
//! touches only its own buffers.
//!
//! Stage order is load-bearing: `minA`/`maxD`/`avgP` are globally agreed
//! via all-reduce strictly before any worker uses them, and `B`/`C` are
//! broadcast in full before any multiplication referencing them begins.

use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::comm::{Endpoint, Group, ReduceOp};
use crate::{kernel, Matrix, Result, RunConfig, TormentaError};

/// Rank of the coordinating worker
pub const COORDINATOR: usize = 0;

/// Everything the coordinator holds once the pipeline has drained
#[derive(Debug, Clone)]
pub struct Outcome {
    /// `P = maxD·(A·B·C) + minA·(D·C·B)`, gathered in rank order
    pub p: Matrix,
    /// `R = avgP·P`, gathered in rank order
    pub r: Matrix,
    /// Global minimum of `A`, agreed by every worker
    pub min_a: f64,
    /// Global maximum of `D`, agreed by every worker
    pub max_d: f64,
    /// Global average of `P`, agreed by every worker
    pub avg_p: f64,
    /// Wall-clock time of the compute pipeline at the coordinator
    pub elapsed: Duration,
}

/// The coordinator's references to the full matrices
struct FullRefs<'m> {
    a: &'m Matrix,
    d: &'m Matrix,
    p: &'m mut Matrix,
    r: &'m mut Matrix,
}

/// Scalars every rank finishes the pipeline with
struct Scalars {
    min_a: f64,
    max_d: f64,
    avg_p: f64,
    elapsed: Duration,
}

/// Runs the full pipeline for the given configuration
///
/// Spawns one thread per worker, executes the SPMD body on each, and
/// returns the coordinator's [`Outcome`]. The configuration is valid by
/// construction ([`RunConfig::new`]), so no collective can start with
/// inconsistent dimensions.
///
/// # Errors
///
/// Propagates the first worker failure: `AllocationFailed` if a buffer was
/// refused, `WorkerPanicked` if a worker died, `CommDisconnected` if the
/// group tore down mid-collective.
///
/// # Example
///
/// ```
/// use tormenta::{run, RunConfig};
///
/// let cfg = RunConfig::new(4, 2, 2).unwrap();
/// let outcome = run(&cfg).unwrap();
/// assert_eq!(outcome.min_a, 1.0);
/// assert_eq!(outcome.max_d, 4.0);
/// ```
#[cfg_attr(
    feature = "tracing",
    instrument(skip(config), fields(n = config.n(), bs = config.block_size(), workers = config.workers()))
)]
pub fn run(config: &RunConfig) -> Result<Outcome> {
    let mut endpoints = Group::endpoints(config.workers());
    let coordinator_ep = endpoints.remove(COORDINATOR);

    thread::scope(|s| {
        let followers: Vec<_> = endpoints
            .into_iter()
            .map(|ep| {
                let rank = ep.rank();
                (rank, s.spawn(move || follower_worker(ep, config)))
            })
            .collect();

        // the coordinator runs on the calling thread
        let coordinated = coordinator_worker(coordinator_ep, config);

        let mut follower_err: Option<TormentaError> = None;
        let mut panicked: Option<usize> = None;
        for (rank, handle) in followers {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // a disconnect at a follower is a symptom of someone
                    // else's failure; keep only root causes
                    if follower_err.is_none()
                        && !matches!(e, TormentaError::CommDisconnected { .. })
                    {
                        follower_err = Some(e);
                    }
                }
                Err(_) => panicked = panicked.or(Some(rank)),
            }
        }

        match coordinated {
            Ok(outcome) => match (panicked, follower_err) {
                (Some(rank), _) => Err(TormentaError::WorkerPanicked { rank }),
                (None, Some(e)) => Err(e),
                (None, None) => Ok(outcome),
            },
            Err(e) => {
                if matches!(e, TormentaError::CommDisconnected { .. }) {
                    if let Some(rank) = panicked {
                        return Err(TormentaError::WorkerPanicked { rank });
                    }
                    if let Some(cause) = follower_err {
                        return Err(cause);
                    }
                }
                Err(e)
            }
        }
    })
}

/// Rank 0: allocates and seeds the full matrices, then runs the SPMD body
fn coordinator_worker(ep: Endpoint, config: &RunConfig) -> Result<Outcome> {
    let n = config.n();
    let a = Matrix::row_ramp(n)?;
    let d = Matrix::row_ramp(n)?;
    let mut p = Matrix::zeroed(n, n)?;
    let mut r = Matrix::zeroed(n, n)?;

    let scalars = worker_body(
        &ep,
        config,
        Some(FullRefs {
            a: &a,
            d: &d,
            p: &mut p,
            r: &mut r,
        }),
    )?;

    Ok(Outcome {
        p,
        r,
        min_a: scalars.min_a,
        max_d: scalars.max_d,
        avg_p: scalars.avg_p,
        elapsed: scalars.elapsed,
    })
}

/// Ranks 1..p: the SPMD body without full-matrix ownership
fn follower_worker(ep: Endpoint, config: &RunConfig) -> Result<()> {
    worker_body(&ep, config, None).map(|_| ())
}

/// The SPMD body every rank executes
#[cfg_attr(feature = "tracing", instrument(skip_all, fields(rank = ep.rank())))]
fn worker_body(ep: &Endpoint, config: &RunConfig, mut full: Option<FullRefs<'_>>) -> Result<Scalars> {
    let n = config.n();
    let bs = config.block_size();
    let band_rows = config.band_rows();
    let is_coordinator = ep.rank() == COORDINATOR;

    // partition buffers, one per operand and intermediate; zeroed by
    // construction, which the accumulating kernel requires
    let mut a_band = Matrix::zeroed(band_rows, n)?;
    let mut d_band = Matrix::zeroed(band_rows, n)?;
    let mut ab = Matrix::zeroed(band_rows, n)?;
    let mut abc = Matrix::zeroed(band_rows, n)?;
    let mut dc = Matrix::zeroed(band_rows, n)?;
    let mut dcb = Matrix::zeroed(band_rows, n)?;
    let mut p_band = Matrix::zeroed(band_rows, n)?;
    let mut r_band = Matrix::zeroed(band_rows, n)?;

    // B and C must be fully known to every worker before any product
    // referencing them; the coordinator seeds them, the rest receive them
    let mut b = if is_coordinator {
        Matrix::column_ramp(n)?
    } else {
        Matrix::zeroed(n, n)?
    };
    let mut c = if is_coordinator {
        Matrix::column_ramp(n)?
    } else {
        Matrix::zeroed(n, n)?
    };

    let start = Instant::now();

    ep.scatter(
        COORDINATOR,
        full.as_ref().map(|f| f.a.as_slice()),
        a_band.as_mut_slice(),
    )?;
    ep.scatter(
        COORDINATOR,
        full.as_ref().map(|f| f.d.as_slice()),
        d_band.as_mut_slice(),
    )?;

    // local extrema over this worker's partitions
    let local_min = a_band.as_slice().iter().copied().fold(f64::INFINITY, f64::min);
    let local_max = d_band
        .as_slice()
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    // agreed before anyone touches P
    let min_a = ep.all_reduce(ReduceOp::Min, local_min)?;
    let max_d = ep.all_reduce(ReduceOp::Max, local_max)?;

    ep.broadcast(COORDINATOR, b.as_mut_slice())?;
    ep.broadcast(COORDINATOR, c.as_mut_slice())?;
    ep.barrier();

    // two chained products per side: AB ← A·B, ABC ← AB·C, DC ← D·C, DCB ← DC·B
    kernel::matmul_blocked(a_band.as_slice(), b.as_slice(), ab.as_mut_slice(), n, bs);
    kernel::matmul_blocked(ab.as_slice(), c.as_slice(), abc.as_mut_slice(), n, bs);
    kernel::matmul_blocked(d_band.as_slice(), c.as_slice(), dc.as_mut_slice(), n, bs);
    kernel::matmul_blocked(dc.as_slice(), b.as_slice(), dcb.as_mut_slice(), n, bs);

    // P = maxD·ABC + minA·DCB, folding the local sum on the way
    let mut local_sum = 0.0;
    for ((dst, &x), &y) in p_band
        .as_mut_slice()
        .iter_mut()
        .zip(abc.as_slice())
        .zip(dcb.as_slice())
    {
        let v = max_d * x + min_a * y;
        local_sum += v;
        *dst = v;
    }

    ep.gather(
        COORDINATOR,
        p_band.as_slice(),
        full.as_mut().map(|f| f.p.as_mut_slice()),
    )?;
    let avg_p = ep.all_reduce(ReduceOp::Sum, local_sum)? / (n * n) as f64;

    // R = avgP·P over the local band
    for (dst, &v) in r_band.as_mut_slice().iter_mut().zip(p_band.as_slice()) {
        *dst = avg_p * v;
    }
    ep.gather(
        COORDINATOR,
        r_band.as_slice(),
        full.as_mut().map(|f| f.r.as_mut_slice()),
    )?;

    Ok(Scalars {
        min_a,
        max_d,
        avg_p,
        elapsed: start.elapsed(),
    })
}
