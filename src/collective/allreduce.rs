use super::Instance;
use super::helpers::{exchange, reduce_in_order};
use crate::error::Result;
use crate::memory::Literal;
use crate::types::ReplicaId;

/// Every member receives the reduction of all members' operands, folded in
/// ascending replica-id order so every replica computes bit-identical
/// results. Multiple operands reduce independently.
pub(crate) async fn all_reduce(
    inst: &Instance,
    members: &[ReplicaId],
    operands: Vec<Literal>,
) -> Result<Vec<Literal>> {
    let outgoing = vec![operands; members.len()];
    let contributions =
        exchange(inst, members, outgoing, inst.descriptor.operand_shapes()).await?;
    reduce_in_order(inst, contributions)
}
