//! Execution of one collective instance on one replica: rendezvous with
//! the participants, then the kind-specific exchange.

mod allgather;
mod allreduce;
mod alltoall;
mod broadcast;
mod handle;
mod helpers;
mod permute;
mod reduce_scatter;
mod rendezvous;

pub use handle::CollectiveHandle;

use crate::descriptor::CollectiveDescriptor;
use crate::error::{LockstepError, Result};
use crate::memory::Literal;
use crate::transport::Transport;
use crate::types::{CollectiveKind, ReplicaId};
use std::sync::Arc;
use std::time::Duration;

/// One replica's side of one collective instance.
///
/// `seq` must be the same on every participating replica; the runtime uses
/// the per-replica count of instances started so far.
#[derive(Clone)]
pub struct Instance {
    transport: Arc<dyn Transport>,
    descriptor: Arc<CollectiveDescriptor>,
    replica: ReplicaId,
    seq: u64,
    timeout: Duration,
}

impl Instance {
    pub fn new(
        transport: Arc<dyn Transport>,
        descriptor: Arc<CollectiveDescriptor>,
        replica: ReplicaId,
        seq: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            descriptor,
            replica,
            seq,
            timeout,
        }
    }

    pub fn descriptor(&self) -> &Arc<CollectiveDescriptor> {
        &self.descriptor
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Run the instance to completion (the blocking form).
    pub async fn run(&self, operands: Vec<Literal>) -> Result<Vec<Literal>> {
        let d = &self.descriptor;
        check_operands(d, &operands)?;
        let members = d.participants(self.replica);
        tracing::debug!(
            replica = self.replica,
            kind = %d.kind(),
            descriptor = d.name(),
            channel = ?d.channel(),
            seq = self.seq,
            participants = members.len(),
            "collective instance"
        );

        rendezvous::rendezvous(self, &members).await?;

        match d.kind() {
            CollectiveKind::AllReduce => allreduce::all_reduce(self, &members, operands).await,
            CollectiveKind::AllGather => allgather::all_gather(self, &members, operands).await,
            CollectiveKind::ReduceScatter => {
                reduce_scatter::reduce_scatter(self, &members, operands).await
            }
            CollectiveKind::AllToAll => match d.dimension() {
                Some(dim) => {
                    let operand = operands.into_iter().next().ok_or_else(|| {
                        LockstepError::shape_mismatch(format!("operands of '{}'", d.name()), 1, 0)
                    })?;
                    alltoall::all_to_all_split(self, &members, dim, operand).await
                }
                None => alltoall::all_to_all_tuple(self, &members, operands).await,
            },
            CollectiveKind::CollectivePermute => {
                permute::collective_permute(self, operands).await
            }
            CollectiveKind::CollectiveBroadcast => {
                broadcast::collective_broadcast(self, &members, operands).await
            }
        }
    }

    /// Start the instance in the background (the Start half of an async
    /// pair). The returned handle's `wait()` is the Done half.
    pub fn spawn(self, operands: Vec<Literal>) -> CollectiveHandle {
        let replica = self.replica;
        CollectiveHandle::spawn(replica, async move { self.run(operands).await })
    }
}

fn check_operands(d: &CollectiveDescriptor, operands: &[Literal]) -> Result<()> {
    if operands.len() != d.operand_shapes().len() {
        return Err(LockstepError::shape_mismatch(
            format!("operands of '{}'", d.name()),
            d.operand_shapes().len(),
            operands.len(),
        ));
    }
    for (lit, shape) in operands.iter().zip(d.operand_shapes()) {
        if lit.shape() != shape {
            return Err(LockstepError::shape_mismatch(
                format!("operand of '{}'", d.name()),
                shape,
                lit.shape(),
            ));
        }
    }
    Ok(())
}
