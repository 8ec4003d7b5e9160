use super::Instance;
use super::helpers::exchange;
use crate::error::Result;
use crate::memory::Literal;
use crate::types::ReplicaId;

/// Concatenate every member's operand along the split dimension, in
/// ascending replica-id order. Each operand of a tuple gathers separately.
pub(crate) async fn all_gather(
    inst: &Instance,
    members: &[ReplicaId],
    operands: Vec<Literal>,
) -> Result<Vec<Literal>> {
    let dim = inst.descriptor.dimension().unwrap_or(0);
    let count = operands.len();
    let outgoing = vec![operands; members.len()];
    let contributions =
        exchange(inst, members, outgoing, inst.descriptor.operand_shapes()).await?;

    (0..count)
        .map(|k| {
            let parts: Vec<Literal> = contributions.iter().map(|c| c[k].clone()).collect();
            Literal::concat(&parts, dim)
        })
        .collect()
}
