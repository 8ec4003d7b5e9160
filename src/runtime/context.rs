use crate::collective::{CollectiveHandle, Instance};
use crate::descriptor::CollectiveDescriptor;
use crate::error::{LockstepError, Result};
use crate::memory::Literal;
use crate::transport::Transport;
use crate::types::{ChannelId, DeviceId, ReplicaId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-replica interpreter state: bound values, in-flight async instances
/// keyed by channel, and the count of instances started so far.
pub(crate) struct ExecutionContext {
    replica: ReplicaId,
    device: DeviceId,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    values: HashMap<String, Literal>,
    in_flight: HashMap<ChannelId, CollectiveHandle>,
    seq: u64,
}

impl ExecutionContext {
    pub(crate) fn new(
        replica: ReplicaId,
        device: DeviceId,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Self {
        Self {
            replica,
            device,
            transport,
            timeout,
            values: HashMap::new(),
            in_flight: HashMap::new(),
            seq: 0,
        }
    }

    pub(crate) fn replica(&self) -> ReplicaId {
        self.replica
    }

    pub(crate) fn device(&self) -> DeviceId {
        self.device
    }

    pub(crate) fn get(&self, name: &str) -> Result<&Literal> {
        self.values.get(name).ok_or_else(|| {
            LockstepError::InvalidProgram(format!(
                "value '{name}' read on replica {} before it was produced",
                self.replica
            ))
        })
    }

    pub(crate) fn bind(&mut self, name: &str, value: Literal) {
        self.values.insert(name.to_string(), value);
    }

    pub(crate) fn bind_all(&mut self, names: &[String], values: Vec<Literal>) -> Result<()> {
        if names.len() != values.len() {
            return Err(LockstepError::shape_mismatch(
                format!("results bound on replica {}", self.replica),
                names.len(),
                values.len(),
            ));
        }
        for (name, value) in names.iter().zip(values) {
            self.bind(name, value);
        }
        Ok(())
    }

    pub(crate) fn collect(&self, names: &[String]) -> Result<Vec<Literal>> {
        names.iter().map(|n| self.get(n).cloned()).collect()
    }

    /// The next collective instance on this replica. Every replica runs
    /// the same instruction stream, so sequence numbers line up.
    pub(crate) fn instance(&mut self, descriptor: &Arc<CollectiveDescriptor>) -> Instance {
        self.seq += 1;
        Instance::new(
            Arc::clone(&self.transport),
            Arc::clone(descriptor),
            self.replica,
            self.seq,
            self.timeout,
        )
    }

    pub(crate) fn start(&mut self, channel: ChannelId, handle: CollectiveHandle) -> Result<()> {
        if self.in_flight.contains_key(&channel) {
            return Err(self.violation(format!(
                "start on channel {channel} while an instance is already in flight"
            )));
        }
        self.in_flight.insert(channel, handle);
        Ok(())
    }

    pub(crate) fn take(&mut self, channel: ChannelId) -> Result<CollectiveHandle> {
        self.in_flight.remove(&channel).ok_or_else(|| {
            self.violation(format!("done on channel {channel} without a matching start"))
        })
    }

    /// Fails if any started instance was never completed.
    pub(crate) fn finish(&self) -> Result<()> {
        let mut open: Vec<_> = self.in_flight.keys().copied().collect();
        if open.is_empty() {
            return Ok(());
        }
        open.sort_unstable();
        Err(self.violation(format!(
            "program ended with instances in flight on channels {open:?}"
        )))
    }

    fn violation(&self, reason: String) -> LockstepError {
        LockstepError::AsyncProtocolViolation {
            replica: Some(self.replica),
            reason,
        }
    }
}
