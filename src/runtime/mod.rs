//! The runtime: prepares a program (hoisting, scheduling) and runs one
//! interpreter task per replica against a shared transport.

mod context;
mod interpreter;

use crate::config::LockstepConfig;
use crate::error::{LockstepError, Result};
use crate::hoist::LoopHoister;
use crate::memory::Literal;
use crate::program::Program;
use crate::schedule::{ScheduledProgram, Scheduler};
use crate::transport::{LocalTransport, Transport};
use crate::types::ReplicaId;
use context::ExecutionContext;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Entry point for running replicated programs in-process.
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    config: LockstepConfig,
}

impl Runtime {
    pub fn new(config: LockstepConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LockstepConfig {
        &self.config
    }

    /// Hoist loop-invariant collectives (if enabled) and lower the rest
    /// according to the async policy.
    ///
    /// The program's own policy is merged with the configured one; a kind
    /// disabled by either stays synchronous.
    pub fn prepare(&self, mut program: Program) -> Result<ScheduledProgram> {
        program.check()?;
        let hoist = program
            .enable_loop_hoisting
            .unwrap_or(self.config.enable_loop_hoisting);
        let hoisted = if hoist {
            LoopHoister::new().run(&mut program)?
        } else {
            Vec::new()
        };
        let policy = self.config.async_policy.merged(&program.policy);
        Ok(Scheduler::new(policy).schedule(program)?.with_hoisted(hoisted))
    }

    /// Prepare `program` and run it over a fresh in-process transport.
    ///
    /// Returns the program outputs of every replica, indexed by replica id.
    pub async fn execute(&self, program: Program) -> Result<Vec<Vec<Literal>>> {
        let scheduled = self.prepare(program)?;
        let transport = Arc::new(LocalTransport::new(
            scheduled.program().replica_count,
            self.config.mailbox_capacity,
        ));
        self.run(scheduled.program(), transport).await
    }

    /// Run an already lowered program as is.
    ///
    /// Start/Done pairing is checked as the replicas execute, so a program
    /// that skipped [`Runtime::prepare`] still fails with
    /// `AsyncProtocolViolation` rather than hanging. The first replica to
    /// fail ends the run; the others are cancelled.
    pub async fn run(
        &self,
        program: &Program,
        transport: Arc<dyn Transport>,
    ) -> Result<Vec<Vec<Literal>>> {
        program.check()?;
        let replica_count = program.replica_count;
        let started = Instant::now();
        tracing::info!(
            replica_count,
            collectives = program.collectives().len(),
            "starting replicated run"
        );

        let program = Arc::new(program.clone());
        let mut tasks = JoinSet::new();
        for replica in 0..replica_count {
            let device = program.device_assignment[replica as usize];
            let ctx = ExecutionContext::new(
                replica,
                device,
                Arc::clone(&transport),
                self.config.rendezvous_timeout,
            );
            let program = Arc::clone(&program);
            let span = tracing::debug_span!("replica", replica, device = ctx.device());
            tasks.spawn(
                async move {
                    let outcome = AssertUnwindSafe(interpreter::run_replica(ctx, &program))
                        .catch_unwind()
                        .await;
                    (replica, outcome)
                }
                .instrument(span),
            );
        }

        let mut outputs: Vec<Option<Vec<Literal>>> = vec![None; replica_count as usize];
        while let Some(joined) = tasks.join_next().await {
            let (replica, outcome) = joined
                .map_err(|e| LockstepError::transport_with_source("replica task was cancelled", e))?;
            let result = outcome.map_err(|payload| LockstepError::ReplicaPanicked {
                replica,
                reason: panic_message(payload.as_ref()),
            });
            match result.and_then(|r| r) {
                Ok(values) => outputs[replica as usize] = Some(values),
                Err(e) => {
                    tracing::error!(replica, error = %e, "replica failed, cancelling run");
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        tracing::info!(
            replica_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "replicated run finished"
        );
        outputs
            .into_iter()
            .enumerate()
            .map(|(r, values)| {
                values.ok_or_else(|| LockstepError::ReplicaPanicked {
                    replica: r as ReplicaId,
                    reason: "replica produced no outputs".into(),
                })
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
