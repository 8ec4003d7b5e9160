use super::Instance;
use super::helpers::{pack, unpack};
use crate::error::Result;
use crate::memory::Literal;
use crate::transport::Phase;

/// Send the operands to this replica's target and receive from its
/// source. A replica that is nobody's target gets zeros.
pub(crate) async fn collective_permute(
    inst: &Instance,
    operands: Vec<Literal>,
) -> Result<Vec<Literal>> {
    let me = inst.replica;
    let pairs = inst.descriptor.source_target_pairs();
    let target = pairs.iter().find(|(s, _)| *s == me).map(|&(_, t)| t);
    let source = pairs.iter().find(|(_, t)| *t == me).map(|&(s, _)| s);

    if let Some(t) = target
        && t != me
    {
        inst.send_to(t, Phase::Data, pack(&operands)).await?;
    }

    let shapes = inst.descriptor.result_shapes();
    match source {
        Some(s) if s == me => Ok(operands),
        Some(s) => {
            let payload = inst.recv_from(s, Phase::Data).await?;
            unpack(inst, s, payload, shapes)
        }
        None => Ok(shapes.iter().cloned().map(Literal::zeros).collect()),
    }
}
