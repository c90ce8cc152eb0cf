//! In-process collective communication for a fixed SPMD worker group
//!
//! [`Group::endpoints`] wires up one [`Endpoint`] per rank; each worker
//! thread owns its endpoint for the lifetime of the run. Every primitive is
//! blocking and ordered: a collective completes at a rank only once that
//! rank's data has been delivered, and all ranks must issue the same
//! sequence of collective calls for the group to progress.
//!
//! Transport is one dedicated FIFO channel per ordered rank pair plus a
//! shared barrier. Per-pair channels keep successive collectives from
//! interleaving without any message tagging: each rank drains its peers in
//! rank order, and rank order is also the deterministic fold order of the
//! reductions.
//!
//! A peer that dies drops its channel halves, which surfaces at the other
//! ranks as [`TormentaError::CommDisconnected`] rather than a hang.

use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Barrier};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Result, TormentaError};

/// Internal root used for the reduction rendezvous
const REDUCE_ROOT: usize = 0;

/// Reduction operation applied across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Global minimum
    Min,
    /// Global maximum
    Max,
    /// Global sum
    Sum,
}

impl ReduceOp {
    fn apply(self, acc: f64, x: f64) -> f64 {
        match self {
            ReduceOp::Min => acc.min(x),
            ReduceOp::Max => acc.max(x),
            ReduceOp::Sum => acc + x,
        }
    }
}

/// Factory for the per-rank endpoints of one worker group
pub struct Group;

impl Group {
    /// Builds the channel mesh and barrier for a group of `size` ranks
    ///
    /// Returns one endpoint per rank, in rank order. The endpoints are
    /// `Send`; hand each one to its worker thread.
    ///
    /// # Example
    ///
    /// ```
    /// use tormenta::comm::Group;
    ///
    /// let endpoints = Group::endpoints(4);
    /// assert_eq!(endpoints.len(), 4);
    /// assert_eq!(endpoints[2].rank(), 2);
    /// ```
    pub fn endpoints(size: usize) -> Vec<Endpoint> {
        if size == 0 {
            return Vec::new();
        }
        let barrier = Arc::new(Barrier::new(size));

        // senders[from][to] pairs with receivers[to][from]
        let mut senders: Vec<Vec<Sender<Vec<f64>>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Receiver<Vec<f64>>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        for from in 0..size {
            for to in 0..size {
                let (tx, rx) = unbounded();
                senders[from].push(tx);
                receivers[to].push(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (to_peers, from_peers))| Endpoint {
                rank,
                size,
                barrier: Arc::clone(&barrier),
                to_peers,
                from_peers,
            })
            .collect()
    }
}

/// One rank's handle on the group's collective primitives
pub struct Endpoint {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
    to_peers: Vec<Sender<Vec<f64>>>,
    from_peers: Vec<Receiver<Vec<f64>>>,
}

impl Endpoint {
    /// This endpoint's rank
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the group
    pub fn size(&self) -> usize {
        self.size
    }

    fn check_root(&self, root: usize, op: &'static str) -> Result<()> {
        if root >= self.size {
            return Err(TormentaError::InvalidInput(format!(
                "{op}: root {root} out of range for a group of {}",
                self.size
            )));
        }
        Ok(())
    }

    fn send(&self, to: usize, payload: Vec<f64>, op: &'static str) -> Result<()> {
        self.to_peers[to]
            .send(payload)
            .map_err(|_| TormentaError::CommDisconnected { rank: self.rank, op })
    }

    fn recv(&self, from: usize, op: &'static str) -> Result<Vec<f64>> {
        self.from_peers[from]
            .recv()
            .map_err(|_| TormentaError::CommDisconnected { rank: self.rank, op })
    }

    fn recv_scalar(&self, from: usize, op: &'static str) -> Result<f64> {
        let msg = self.recv(from, op)?;
        msg.first().copied().ok_or_else(|| {
            TormentaError::InvalidInput(format!("{op}: empty reduction message from rank {from}"))
        })
    }

    /// Splits root's full buffer into `size` contiguous chunks, delivering
    /// chunk `i` to rank `i`
    ///
    /// Non-root ranks pass `None` for `full`; every rank receives exactly
    /// its own chunk in `band`, sized `full.len() / size`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if root omits `full` or the chunk sizes disagree;
    /// `CommDisconnected` if a peer died.
    #[cfg_attr(feature = "tracing", instrument(skip_all, fields(rank = self.rank, root)))]
    pub fn scatter(&self, root: usize, full: Option<&[f64]>, band: &mut [f64]) -> Result<()> {
        self.check_root(root, "scatter")?;
        let chunk = band.len();
        if self.rank == root {
            let full = full.ok_or_else(|| {
                TormentaError::InvalidInput("scatter: root rank requires the full buffer".into())
            })?;
            if full.len() != chunk * self.size {
                return Err(TormentaError::InvalidInput(format!(
                    "scatter: full buffer holds {} elements, expected {}",
                    full.len(),
                    chunk * self.size
                )));
            }
            for to in 0..self.size {
                if to != root {
                    self.send(to, full[to * chunk..(to + 1) * chunk].to_vec(), "scatter")?;
                }
            }
            band.copy_from_slice(&full[root * chunk..(root + 1) * chunk]);
        } else {
            let msg = self.recv(root, "scatter")?;
            if msg.len() != chunk {
                return Err(TormentaError::InvalidInput(format!(
                    "scatter: received {} elements, expected {}",
                    msg.len(),
                    chunk
                )));
            }
            band.copy_from_slice(&msg);
        }
        Ok(())
    }

    /// Delivers root's buffer in full to every rank
    ///
    /// Root's `buf` is the source and is left untouched; every other rank's
    /// `buf` is overwritten with root's contents.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if buffer sizes disagree; `CommDisconnected` if a
    /// peer died.
    #[cfg_attr(feature = "tracing", instrument(skip_all, fields(rank = self.rank, root)))]
    pub fn broadcast(&self, root: usize, buf: &mut [f64]) -> Result<()> {
        self.check_root(root, "broadcast")?;
        if self.rank == root {
            for to in 0..self.size {
                if to != root {
                    self.send(to, buf.to_vec(), "broadcast")?;
                }
            }
        } else {
            let msg = self.recv(root, "broadcast")?;
            if msg.len() != buf.len() {
                return Err(TormentaError::InvalidInput(format!(
                    "broadcast: received {} elements, expected {}",
                    msg.len(),
                    buf.len()
                )));
            }
            buf.copy_from_slice(&msg);
        }
        Ok(())
    }

    /// Reduces one scalar per rank into a single agreed value on all ranks
    ///
    /// Implemented as a gather to rank 0 folding in rank order, followed by
    /// a broadcast of the folded value. Rank-order folding makes the
    /// floating-point result deterministic across runs.
    ///
    /// # Errors
    ///
    /// `CommDisconnected` if a peer died.
    #[cfg_attr(feature = "tracing", instrument(skip_all, fields(rank = self.rank, ?op)))]
    pub fn all_reduce(&self, op: ReduceOp, local: f64) -> Result<f64> {
        if self.rank == REDUCE_ROOT {
            let mut acc = local;
            for from in 0..self.size {
                if from != REDUCE_ROOT {
                    acc = op.apply(acc, self.recv_scalar(from, "all_reduce")?);
                }
            }
            for to in 0..self.size {
                if to != REDUCE_ROOT {
                    self.send(to, vec![acc], "all_reduce")?;
                }
            }
            Ok(acc)
        } else {
            self.send(REDUCE_ROOT, vec![local], "all_reduce")?;
            self.recv_scalar(REDUCE_ROOT, "all_reduce")
        }
    }

    /// Reassembles per-rank bands into root's full buffer, in rank order
    ///
    /// Rank `i`'s band lands at offset `i · band.len()`, matching the
    /// partition order used by [`Endpoint::scatter`]. Non-root ranks pass
    /// `None` for `full`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if root omits `full` or the chunk sizes disagree;
    /// `CommDisconnected` if a peer died.
    #[cfg_attr(feature = "tracing", instrument(skip_all, fields(rank = self.rank, root)))]
    pub fn gather(&self, root: usize, band: &[f64], full: Option<&mut [f64]>) -> Result<()> {
        self.check_root(root, "gather")?;
        let chunk = band.len();
        if self.rank == root {
            let full = full.ok_or_else(|| {
                TormentaError::InvalidInput("gather: root rank requires the full buffer".into())
            })?;
            if full.len() != chunk * self.size {
                return Err(TormentaError::InvalidInput(format!(
                    "gather: full buffer holds {} elements, expected {}",
                    full.len(),
                    chunk * self.size
                )));
            }
            for from in 0..self.size {
                let dst = &mut full[from * chunk..(from + 1) * chunk];
                if from == root {
                    dst.copy_from_slice(band);
                } else {
                    let msg = self.recv(from, "gather")?;
                    if msg.len() != chunk {
                        return Err(TormentaError::InvalidInput(format!(
                            "gather: rank {from} sent {} elements, expected {}",
                            msg.len(),
                            chunk
                        )));
                    }
                    dst.copy_from_slice(&msg);
                }
            }
        } else {
            self.send(root, band.to_vec(), "gather")?;
        }
        Ok(())
    }

    /// Blocks until every rank in the group has arrived
    pub fn barrier(&self) {
        self.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Runs `body` once per rank on its own thread, collecting the results
    fn spmd<T, F>(size: usize, body: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Endpoint) -> T + Sync,
    {
        let endpoints = Group::endpoints(size);
        thread::scope(|s| {
            let handles: Vec<_> = endpoints
                .into_iter()
                .map(|ep| s.spawn(|| body(ep)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn test_scatter_delivers_rank_chunks() {
        let full: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let bands = spmd(3, |ep| {
            let mut band = vec![0.0; 4];
            let src = (ep.rank() == 0).then_some(full.as_slice());
            ep.scatter(0, src, &mut band).unwrap();
            band
        });
        assert_eq!(bands[0], [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(bands[1], [4.0, 5.0, 6.0, 7.0]);
        assert_eq!(bands[2], [8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_broadcast_reaches_all_ranks() {
        let results = spmd(4, |ep| {
            let mut buf = if ep.rank() == 1 {
                vec![3.5, -1.0, 8.0]
            } else {
                vec![0.0; 3]
            };
            ep.broadcast(1, &mut buf).unwrap();
            buf
        });
        for buf in results {
            assert_eq!(buf, [3.5, -1.0, 8.0]);
        }
    }

    #[test]
    fn test_all_reduce_min_max_sum() {
        let results = spmd(4, |ep| {
            let local = (ep.rank() + 1) as f64;
            let min = ep.all_reduce(ReduceOp::Min, local).unwrap();
            let max = ep.all_reduce(ReduceOp::Max, local).unwrap();
            let sum = ep.all_reduce(ReduceOp::Sum, local).unwrap();
            (min, max, sum)
        });
        // every rank agrees on all three values
        for (min, max, sum) in results {
            assert_eq!(min, 1.0);
            assert_eq!(max, 4.0);
            assert_eq!(sum, 10.0);
        }
    }

    #[test]
    fn test_gather_reassembles_in_rank_order() {
        let full = spmd(3, |ep| {
            let band = vec![ep.rank() as f64; 2];
            let mut full = (ep.rank() == 0).then(|| vec![-1.0; 6]);
            ep.gather(0, &band, full.as_deref_mut()).unwrap();
            full
        });
        assert_eq!(full[0], Some(vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]));
        assert_eq!(full[1], None);
        assert_eq!(full[2], None);
    }

    #[test]
    fn test_gather_covers_every_row_once() {
        // partition-coverage property: scatter then gather round-trips the
        // full buffer, each band occupying exactly its rank's rows
        let n = 8;
        let p = 4;
        let original: Vec<f64> = (0..n * n).map(|i| (i * 7 % 23) as f64).collect();
        let reassembled = spmd(p, |ep| {
            let mut band = vec![0.0; n * n / p];
            let src = (ep.rank() == 0).then_some(original.as_slice());
            ep.scatter(0, src, &mut band).unwrap();
            let mut full = (ep.rank() == 0).then(|| vec![0.0; n * n]);
            ep.gather(0, &band, full.as_deref_mut()).unwrap();
            full
        });
        assert_eq!(reassembled[0].as_deref().unwrap(), original.as_slice());
    }

    #[test]
    fn test_consecutive_collectives_do_not_interleave() {
        let results = spmd(3, |ep| {
            let mut first = if ep.rank() == 0 { vec![1.0] } else { vec![0.0] };
            let mut second = if ep.rank() == 0 { vec![2.0] } else { vec![0.0] };
            ep.broadcast(0, &mut first).unwrap();
            ep.broadcast(0, &mut second).unwrap();
            (first[0], second[0])
        });
        for (a, b) in results {
            assert_eq!((a, b), (1.0, 2.0));
        }
    }

    #[test]
    fn test_dead_peer_surfaces_as_disconnect() {
        let results = spmd(2, |ep| {
            if ep.rank() == 1 {
                // rank 1 walks away without participating
                return Ok(());
            }
            let band = vec![0.0; 2];
            let mut full = vec![0.0; 4];
            ep.gather(0, &band, Some(&mut full))
        });
        assert!(matches!(
            results[0],
            Err(TormentaError::CommDisconnected { rank: 0, op: "gather" })
        ));
    }

    #[test]
    fn test_scatter_root_requires_source() {
        let results = spmd(1, |ep| {
            let mut band = vec![0.0; 2];
            ep.scatter(0, None, &mut band)
        });
        assert!(matches!(
            results[0],
            Err(TormentaError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_single_rank_group() {
        let results = spmd(1, |ep| {
            let mut band = vec![0.0; 4];
            ep.scatter(0, Some(&[1.0, 2.0, 3.0, 4.0]), &mut band).unwrap();
            let agreed = ep.all_reduce(ReduceOp::Sum, 5.0).unwrap();
            ep.barrier();
            (band, agreed)
        });
        assert_eq!(results[0].0, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(results[0].1, 5.0);
    }
}
