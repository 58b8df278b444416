//! Thin façade over intra-process (threads) or inter-process (MPI) collectives.
//!
//! The marking algorithm only ever needs blocking all-reductions (min, max,
//! sum) whose result is visible to every rank before any rank proceeds. Every
//! rank must enter every reduction in the same order; a rank that skips one
//! leaves the group out of lockstep.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::algs::reduction::ReduceOp;
use crate::algs::wire::{self, ScalarKind, WireHdr};
use crate::dorfler_error::DorflerError;

/// Blocking collective interface (minimal by design).
pub trait Communicator {
    /// Rank of this process within the group.
    fn rank(&self) -> usize;
    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Element-wise all-reduce of `values` in place.
    fn all_reduce_f64(&self, op: ReduceOp, values: &mut [f64]) -> Result<(), DorflerError>;
    /// Element-wise all-reduce of `values` in place.
    fn all_reduce_u64(&self, op: ReduceOp, values: &mut [u64]) -> Result<(), DorflerError>;

    /// Return `true` if this communicator is a no-op.
    fn is_no_comm(&self) -> bool {
        false
    }

    fn global_min(&self, x: f64) -> Result<f64, DorflerError> {
        let mut v = [x];
        self.all_reduce_f64(ReduceOp::Min, &mut v)?;
        Ok(v[0])
    }

    fn global_max(&self, x: f64) -> Result<f64, DorflerError> {
        let mut v = [x];
        self.all_reduce_f64(ReduceOp::Max, &mut v)?;
        Ok(v[0])
    }

    fn global_sum_f64(&self, values: &mut [f64]) -> Result<(), DorflerError> {
        self.all_reduce_f64(ReduceOp::Sum, values)
    }

    fn global_sum_u64(&self, values: &mut [u64]) -> Result<(), DorflerError> {
        self.all_reduce_u64(ReduceOp::Sum, values)
    }
}

/// Single-member group for pure serial use: every reduction is the identity.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn all_reduce_f64(&self, _op: ReduceOp, _values: &mut [f64]) -> Result<(), DorflerError> {
        Ok(())
    }
    fn all_reduce_u64(&self, _op: ReduceOp, _values: &mut [u64]) -> Result<(), DorflerError> {
        Ok(())
    }
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- ThreadComm: intra-process / one rank per thread ---

struct Round {
    generation: u64,
    arrived: usize,
    departed: bool,
    slots: Vec<Option<Bytes>>,
    outcome: Result<Bytes, DorflerError>,
}

struct Group {
    size: usize,
    state: Mutex<Round>,
    cv: Condvar,
}

/// One rank of an in-process group, meant to be moved onto its own thread.
///
/// Reductions rendezvous on a shared generation barrier. The last rank to
/// arrive folds all contributions in rank order and publishes the result.
/// Dropping a rank poisons the group: ranks blocked in (or later entering) a
/// reduction get [`DorflerError::Communication`] instead of hanging.
pub struct ThreadComm {
    rank: usize,
    group: Arc<Group>,
}

impl ThreadComm {
    /// Build all `size` ranks of a fresh group.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let group = Arc::new(Group {
            size,
            state: Mutex::new(Round {
                generation: 0,
                arrived: 0,
                departed: false,
                slots: vec![None; size],
                outcome: Ok(Bytes::new()),
            }),
            cv: Condvar::new(),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                group: group.clone(),
            })
            .collect()
    }

    fn exchange(&self, payload: Bytes) -> Result<Bytes, DorflerError> {
        let g = &*self.group;
        let mut st = g.state.lock();
        if st.departed {
            return Err(departed(self.rank));
        }
        let generation = st.generation;
        st.slots[self.rank] = Some(payload);
        st.arrived += 1;
        if st.arrived == g.size {
            let contribs: Vec<Bytes> = st
                .slots
                .iter_mut()
                .map(|s| s.take().unwrap_or_default())
                .collect();
            st.outcome = fold_contributions(&contribs);
            st.arrived = 0;
            st.generation = st.generation.wrapping_add(1);
            g.cv.notify_all();
        } else {
            while st.generation == generation {
                if st.departed {
                    return Err(departed(self.rank));
                }
                g.cv.wait(&mut st);
            }
        }
        st.outcome.clone()
    }
}

impl Drop for ThreadComm {
    fn drop(&mut self) {
        let mut st = self.group.state.lock();
        st.departed = true;
        self.group.cv.notify_all();
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.group.size)
            .finish()
    }
}

fn departed(rank: usize) -> DorflerError {
    DorflerError::Communication(format!(
        "rank {rank}: a peer left the group before the reduction completed"
    ))
}

/// Fold wire contributions (indexed by rank) into one encoded result.
///
/// All ranks must agree on element type, operator and length.
fn fold_contributions(contribs: &[Bytes]) -> Result<Bytes, DorflerError> {
    let decoded = contribs
        .iter()
        .map(|c| wire::decode(c))
        .collect::<Result<Vec<_>, _>>()?;
    let (hdr0, _) = decoded
        .first()
        .ok_or_else(|| DorflerError::Communication("empty group".into()))?;
    for (rank, (hdr, _)) in decoded.iter().enumerate() {
        if hdr != hdr0 {
            return Err(DorflerError::Communication(format!(
                "rank {rank} entered a different reduction (kind {:?}, op {:?}, len {}) than rank 0 (kind {:?}, op {:?}, len {})",
                hdr.kind(),
                hdr.op(),
                hdr.count(),
                hdr0.kind(),
                hdr0.op(),
                hdr0.count()
            )));
        }
    }
    let op = hdr0
        .op()
        .ok_or_else(|| DorflerError::Communication("unknown reduction op".into()))?;
    match hdr0.kind() {
        Some(ScalarKind::F64) => {
            let values: Vec<Vec<f64>> = decoded
                .iter()
                .map(|(_, bits)| bits.iter().map(|&b| f64::from_bits(b)).collect())
                .collect();
            let mut out = vec![0.0; hdr0.count()];
            op.fold_f64(values.iter().map(Vec::as_slice), &mut out);
            Ok(wire::encode_f64(op, &out))
        }
        Some(ScalarKind::U64) => {
            let mut out = vec![0u64; hdr0.count()];
            op.fold_u64(decoded.iter().map(|(_, bits)| bits.as_slice()), &mut out);
            Ok(wire::encode_u64(op, &out))
        }
        None => Err(DorflerError::Communication("unknown scalar kind".into())),
    }
}

/// Decode a folded result and check it answers the reduction this rank asked for.
fn unpack(result: &[u8], expect: WireHdr) -> Result<Vec<u64>, DorflerError> {
    let (hdr, bits) = wire::decode(result)?;
    if hdr != expect {
        return Err(DorflerError::Communication(
            "reduction result does not match the request".into(),
        ));
    }
    Ok(bits)
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.group.size
    }

    fn all_reduce_f64(&self, op: ReduceOp, values: &mut [f64]) -> Result<(), DorflerError> {
        let result = self.exchange(wire::encode_f64(op, values))?;
        let bits = unpack(&result, WireHdr::new(ScalarKind::F64, op, values.len()))?;
        for (v, b) in values.iter_mut().zip(bits) {
            *v = f64::from_bits(b);
        }
        Ok(())
    }

    fn all_reduce_u64(&self, op: ReduceOp, values: &mut [u64]) -> Result<(), DorflerError> {
        let result = self.exchange(wire::encode_u64(op, values))?;
        let bits = unpack(&result, WireHdr::new(ScalarKind::U64, op, values.len()))?;
        values.copy_from_slice(&bits);
        Ok(())
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, CommunicatorCollectives as _};

    /// World communicator of an MPI job.
    pub struct MpiComm {
        // Finalizes MPI on drop when this handle initialized it.
        _universe: Option<Universe>,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialize MPI and wrap the world communicator.
        pub fn new() -> Result<Self, DorflerError> {
            let universe = mpi::initialize().ok_or_else(|| {
                DorflerError::Communication("MPI was already initialized".into())
            })?;
            let world = universe.world();
            Ok(Self::wrap(Some(universe), world))
        }

        /// Wrap a communicator owned by an application that initialized MPI itself.
        pub fn from_communicator(world: SimpleCommunicator) -> Self {
            Self::wrap(None, world)
        }

        fn wrap(universe: Option<Universe>, world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: universe,
                world,
                rank,
                size,
            }
        }

        pub fn world(&self) -> &SimpleCommunicator {
            &self.world
        }
    }

    fn system_op(op: ReduceOp) -> SystemOperation {
        match op {
            ReduceOp::Min => SystemOperation::min(),
            ReduceOp::Max => SystemOperation::max(),
            ReduceOp::Sum => SystemOperation::sum(),
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn all_reduce_f64(&self, op: ReduceOp, values: &mut [f64]) -> Result<(), DorflerError> {
            let send = values.to_vec();
            self.world.all_reduce_into(&send[..], values, system_op(op));
            Ok(())
        }

        fn all_reduce_u64(&self, op: ReduceOp, values: &mut [u64]) -> Result<(), DorflerError> {
            let send = values.to_vec();
            self.world.all_reduce_into(&send[..], values, system_op(op));
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
