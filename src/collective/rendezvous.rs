use super::Instance;
use crate::error::{LockstepError, Result};
use crate::transport::Phase;
use crate::types::ReplicaId;
use bytes::Bytes;

const RELEASE_OK: u8 = 0;
const RELEASE_MISMATCH: u8 = 1;

/// Two-phase barrier over `participants` (ascending, leader first).
///
/// Phase 1: every member sends `Arrive` with its descriptor fingerprint to
/// the leader. Phase 2: once all have arrived the leader sends `Release` to
/// each member, flagging any fingerprint that differs from its own. A
/// mismatch fails the instance on every participant.
pub(crate) async fn rendezvous(inst: &Instance, participants: &[ReplicaId]) -> Result<()> {
    let Some(&leader) = participants.first() else {
        return Ok(());
    };
    if participants.len() == 1 {
        return Ok(());
    }
    let fingerprint = inst.descriptor.fingerprint();

    if inst.replica == leader {
        let mut mismatch = None;
        for &member in &participants[1..] {
            let payload = inst.recv_from(member, Phase::Arrive).await?;
            let theirs = decode_fingerprint(&payload);
            if theirs != Some(fingerprint) && mismatch.is_none() {
                mismatch = Some(member);
            }
        }
        let status = if mismatch.is_some() {
            RELEASE_MISMATCH
        } else {
            RELEASE_OK
        };
        for &member in &participants[1..] {
            inst.send_to(member, Phase::Release, Bytes::copy_from_slice(&[status]))
                .await?;
        }
        if let Some(member) = mismatch {
            return Err(mismatch_error(inst, member));
        }
    } else {
        inst.send_to(
            leader,
            Phase::Arrive,
            Bytes::copy_from_slice(&fingerprint.to_le_bytes()),
        )
        .await?;
        let status = inst.recv_from(leader, Phase::Release).await?;
        if status.first() != Some(&RELEASE_OK) {
            return Err(mismatch_error(inst, leader));
        }
    }
    tracing::trace!(
        replica = inst.replica,
        seq = inst.seq,
        participants = participants.len(),
        "rendezvous released"
    );
    Ok(())
}

fn decode_fingerprint(payload: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = payload.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

fn mismatch_error(inst: &Instance, peer: ReplicaId) -> LockstepError {
    LockstepError::InvalidDescriptor {
        name: inst.descriptor.name().to_string(),
        reason: format!(
            "replicas {} and {peer} disagree on the descriptor of instance {}",
            inst.replica, inst.seq
        ),
    }
}
