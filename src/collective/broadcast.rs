use super::Instance;
use super::helpers::{pack, unpack};
use crate::error::Result;
use crate::memory::Literal;
use crate::transport::Phase;
use crate::types::ReplicaId;

/// The first listed member of the group sends its operands to every other
/// member. Replicas outside every group keep their operands.
pub(crate) async fn collective_broadcast(
    inst: &Instance,
    members: &[ReplicaId],
    operands: Vec<Literal>,
) -> Result<Vec<Literal>> {
    let Some(source) = inst
        .descriptor
        .groups()
        .group_of(inst.replica)
        .and_then(|g| g.source())
    else {
        return Ok(operands);
    };

    if inst.replica == source {
        let payload = pack(&operands);
        for &m in members.iter().filter(|&&m| m != source) {
            inst.send_to(m, Phase::Data, payload.clone()).await?;
        }
        Ok(operands)
    } else {
        let payload = inst.recv_from(source, Phase::Data).await?;
        unpack(inst, source, payload, inst.descriptor.result_shapes())
    }
}
