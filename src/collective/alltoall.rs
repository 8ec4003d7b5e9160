use super::Instance;
use super::helpers::exchange;
use crate::error::Result;
use crate::memory::Literal;
use crate::types::ReplicaId;

/// Split form: shard `j` of the operand goes to member `j`; the result is
/// the received shards concatenated in ascending sender order.
pub(crate) async fn all_to_all_split(
    inst: &Instance,
    members: &[ReplicaId],
    dim: usize,
    operand: Literal,
) -> Result<Vec<Literal>> {
    let shards = operand.split(dim, members.len())?;
    let extent = operand.shape().dims[dim] / members.len();
    let shard_shape = [operand.shape().with_dim(dim, extent)];
    let outgoing = shards.into_iter().map(|s| vec![s]).collect();
    let received = exchange(inst, members, outgoing, &shard_shape).await?;
    let parts: Vec<Literal> = received.into_iter().flatten().collect();
    Ok(vec![Literal::concat(&parts, dim)?])
}

/// Tuple form: operand `k` goes to member `k`; output `k` is what member
/// `k` sent.
pub(crate) async fn all_to_all_tuple(
    inst: &Instance,
    members: &[ReplicaId],
    operands: Vec<Literal>,
) -> Result<Vec<Literal>> {
    let expected = [inst.descriptor.operand_shapes()[0].clone()];
    let outgoing = operands.into_iter().map(|o| vec![o]).collect();
    let received = exchange(inst, members, outgoing, &expected).await?;
    Ok(received.into_iter().flatten().collect())
}
