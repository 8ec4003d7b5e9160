//! Byte movement between replicas.
//!
//! The core never touches a wire: every rendezvous and data exchange goes
//! through a [`Transport`]. [`LocalTransport`] connects replicas running as
//! tasks in one process.

mod local;

pub use local::LocalTransport;

use crate::error::Result;
use crate::types::{ChannelId, ReplicaId};
use bytes::Bytes;
use futures::future::BoxFuture;

/// Step of a collective instance a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Member to leader: "I am here", carrying the descriptor fingerprint.
    Arrive,
    /// Leader to member: every participant arrived.
    Release,
    /// Operand payload.
    Data,
}

/// Identifies one message slot of one collective instance.
///
/// `seq` is the per-replica instance counter; SPMD replicas reach the same
/// instance with the same `seq`. The channel is carried so that the pair
/// must agree on it as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub seq: u64,
    pub channel: Option<ChannelId>,
    pub phase: Phase,
}

/// Moves opaque payloads between replicas.
///
/// Delivery is point-to-point and in order per `(src, dst, key)`. A send
/// may complete before the matching receive is posted.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        src: ReplicaId,
        dst: ReplicaId,
        key: InstanceKey,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<()>>;

    fn recv<'a>(
        &'a self,
        dst: ReplicaId,
        src: ReplicaId,
        key: InstanceKey,
    ) -> BoxFuture<'a, Result<Bytes>>;

    /// Drop whatever state a receive on `(dst, src, key)` left behind. Called
    /// when the receive was given up on, e.g. after a timeout.
    fn abandon<'a>(
        &'a self,
        dst: ReplicaId,
        src: ReplicaId,
        key: InstanceKey,
    ) -> BoxFuture<'a, ()> {
        let _ = (dst, src, key);
        Box::pin(async {})
    }
}
