use super::Instance;
use super::helpers::{exchange, reduce_in_order};
use crate::error::Result;
use crate::memory::Literal;
use crate::types::ReplicaId;

/// Reduce across members, then keep shard `i` for the member at position
/// `i`.
///
/// Each member splits its operands first and sends shard `j` only to member
/// `j`, so every replica reduces just the shard it keeps.
pub(crate) async fn reduce_scatter(
    inst: &Instance,
    members: &[ReplicaId],
    operands: Vec<Literal>,
) -> Result<Vec<Literal>> {
    let dim = inst.descriptor.dimension().unwrap_or(0);
    let r = members.len();
    let shards = operands
        .iter()
        .map(|o| o.split(dim, r))
        .collect::<Result<Vec<_>>>()?;
    let outgoing: Vec<Vec<Literal>> = (0..r)
        .map(|j| shards.iter().map(|s| s[j].clone()).collect())
        .collect();
    let contributions =
        exchange(inst, members, outgoing, inst.descriptor.result_shapes()).await?;
    reduce_in_order(inst, contributions)
}
