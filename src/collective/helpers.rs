use super::Instance;
use crate::error::{LockstepError, Result};
use crate::memory::{Literal, Shape};
use crate::transport::{InstanceKey, Phase};
use crate::types::ReplicaId;
use bytes::{Bytes, BytesMut};

impl Instance {
    pub(crate) fn key(&self, phase: Phase) -> InstanceKey {
        InstanceKey {
            seq: self.seq,
            channel: self.descriptor.channel(),
            phase,
        }
    }

    pub(crate) async fn send_to(&self, dst: ReplicaId, phase: Phase, payload: Bytes) -> Result<()> {
        self.transport
            .send(self.replica, dst, self.key(phase), payload)
            .await
    }

    /// Receive from `src`, reporting `RendezvousTimeout` if it never shows up.
    pub(crate) async fn recv_from(&self, src: ReplicaId, phase: Phase) -> Result<Bytes> {
        let key = self.key(phase);
        let recv = self.transport.recv(self.replica, src, key);
        match tokio::time::timeout(self.timeout, recv).await {
            Ok(result) => result,
            Err(_) => {
                self.transport.abandon(self.replica, src, key).await;
                tracing::warn!(
                    replica = self.replica,
                    missing = src,
                    descriptor = self.descriptor.name(),
                    seq = self.seq,
                    ?phase,
                    "rendezvous timed out"
                );
                Err(LockstepError::RendezvousTimeout {
                    descriptor: self.descriptor.name().to_string(),
                    channel: self.descriptor.channel(),
                    seq: self.seq,
                    replica: self.replica,
                    missing: src,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Concatenate buffers into one payload. A single buffer is sent as is.
pub(crate) fn pack(parts: &[Literal]) -> Bytes {
    match parts {
        [one] => one.bytes().clone(),
        _ => {
            let mut buf = BytesMut::with_capacity(parts.iter().map(|p| p.bytes().len()).sum());
            for p in parts {
                buf.extend_from_slice(p.bytes());
            }
            buf.freeze()
        }
    }
}

/// Split a payload from `src` back into buffers of the expected shapes.
pub(crate) fn unpack(
    inst: &Instance,
    src: ReplicaId,
    payload: Bytes,
    shapes: &[Shape],
) -> Result<Vec<Literal>> {
    let expected: usize = shapes.iter().map(Shape::size_in_bytes).sum();
    if payload.len() != expected {
        return Err(LockstepError::shape_mismatch(
            format!(
                "payload from replica {src} for '{}'",
                inst.descriptor.name()
            ),
            format!("{expected} bytes"),
            format!("{} bytes", payload.len()),
        ));
    }
    let mut offset = 0;
    shapes
        .iter()
        .map(|s| {
            let len = s.size_in_bytes();
            let part = payload.slice(offset..offset + len);
            offset += len;
            Literal::new(s.clone(), part)
        })
        .collect()
}

/// Send `outgoing[i]` to `members[i]`, then collect what every member sent
/// this replica, in member order. This replica's own entry is passed
/// through without touching the transport.
pub(crate) async fn exchange(
    inst: &Instance,
    members: &[ReplicaId],
    outgoing: Vec<Vec<Literal>>,
    expected: &[Shape],
) -> Result<Vec<Vec<Literal>>> {
    let mut own = None;
    for (&m, parts) in members.iter().zip(outgoing) {
        if m == inst.replica {
            own = Some(parts);
        } else {
            inst.send_to(m, Phase::Data, pack(&parts)).await?;
        }
    }

    let mut received = Vec::with_capacity(members.len());
    for &m in members {
        if m == inst.replica {
            let parts = own.take().ok_or_else(|| {
                LockstepError::invalid_group(
                    inst.descriptor.kind(),
                    format!("replica {m} is listed twice"),
                )
            })?;
            received.push(parts);
        } else {
            let payload = inst.recv_from(m, Phase::Data).await?;
            received.push(unpack(inst, m, payload, expected)?);
        }
    }
    Ok(received)
}

/// Fold per-member contributions left to right (ascending replica id).
pub(crate) fn reduce_in_order(
    inst: &Instance,
    contributions: Vec<Vec<Literal>>,
) -> Result<Vec<Literal>> {
    let op = inst.descriptor.reduction().ok_or_else(|| LockstepError::InvalidDescriptor {
        name: inst.descriptor.name().to_string(),
        reason: format!("{} requires a reduction operator", inst.descriptor.kind()),
    })?;
    let mut iter = contributions.into_iter();
    let mut acc = iter.next().unwrap_or_default();
    for next in iter {
        acc = acc
            .iter()
            .zip(&next)
            .map(|(a, b)| a.elementwise(b, op))
            .collect::<Result<Vec<_>>>()?;
    }
    Ok(acc)
}
