use super::{InstanceKey, Transport};
use crate::error::{LockstepError, Result};
use crate::types::ReplicaId;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

type LaneKey = (ReplicaId, InstanceKey);

/// One `(src, key)` lane into a replica's mailbox. Lazily created by
/// whichever of sender and receiver gets there first.
struct Lane {
    tx: mpsc::Sender<Bytes>,
    rx: Arc<Mutex<mpsc::Receiver<Bytes>>>,
}

/// Incoming lanes of one replica. Each lane is locked independently, so a
/// receive blocked on one peer never holds up the others.
#[derive(Default)]
struct Mailbox {
    lanes: Mutex<HashMap<LaneKey, Lane>>,
}

/// In-process transport: one mailbox per replica.
pub struct LocalTransport {
    mailboxes: Vec<Mailbox>,
    capacity: usize,
}

impl LocalTransport {
    pub fn new(replica_count: u32, capacity: usize) -> Self {
        Self {
            mailboxes: (0..replica_count).map(|_| Mailbox::default()).collect(),
            capacity: capacity.max(1),
        }
    }

    pub fn replica_count(&self) -> u32 {
        self.mailboxes.len() as u32
    }

    fn mailbox(&self, replica: ReplicaId) -> Result<&Mailbox> {
        self.mailboxes.get(replica as usize).ok_or_else(|| {
            LockstepError::transport(format!(
                "replica {replica} has no mailbox ({} replicas)",
                self.mailboxes.len()
            ))
        })
    }

    async fn sender(&self, dst: ReplicaId, lane: LaneKey) -> Result<mpsc::Sender<Bytes>> {
        let mut lanes = self.mailbox(dst)?.lanes.lock().await;
        let lane = lanes.entry(lane).or_insert_with(|| self.new_lane());
        Ok(lane.tx.clone())
    }

    async fn receiver(
        &self,
        dst: ReplicaId,
        lane: LaneKey,
    ) -> Result<Arc<Mutex<mpsc::Receiver<Bytes>>>> {
        let mut lanes = self.mailbox(dst)?.lanes.lock().await;
        let lane = lanes.entry(lane).or_insert_with(|| self.new_lane());
        Ok(Arc::clone(&lane.rx))
    }

    /// Number of lanes currently open into `replica`'s mailbox.
    #[cfg(test)]
    pub(crate) async fn lane_count(&self, replica: ReplicaId) -> usize {
        match self.mailbox(replica) {
            Ok(m) => m.lanes.lock().await.len(),
            Err(_) => 0,
        }
    }

    fn new_lane(&self) -> Lane {
        let (tx, rx) = mpsc::channel(self.capacity);
        Lane {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

impl Transport for LocalTransport {
    fn send<'a>(
        &'a self,
        src: ReplicaId,
        dst: ReplicaId,
        key: InstanceKey,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let tx = self.sender(dst, (src, key)).await?;
            tx.send(payload).await.map_err(|_| {
                LockstepError::transport(format!("mailbox of replica {dst} is closed"))
            })
        })
    }

    fn recv<'a>(
        &'a self,
        dst: ReplicaId,
        src: ReplicaId,
        key: InstanceKey,
    ) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            let rx = self.receiver(dst, (src, key)).await?;
            let payload = rx.lock().await.recv().await.ok_or_else(|| {
                LockstepError::transport(format!("lane {src} -> {dst} closed"))
            })?;
            // Every key is used for exactly one message.
            self.mailbox(dst)?.lanes.lock().await.remove(&(src, key));
            Ok(payload)
        })
    }

    fn abandon<'a>(
        &'a self,
        dst: ReplicaId,
        src: ReplicaId,
        key: InstanceKey,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Ok(mailbox) = self.mailbox(dst) {
                mailbox.lanes.lock().await.remove(&(src, key));
            }
        })
    }
}
