//! Lowering of collectives into blocking calls or Start/Done pairs.
//!
//! An async collective becomes a `CollectiveStart` at its original
//! position and a `CollectiveDone` right before the first instruction of
//! the same block that reads one of its results (or at the end of the
//! block). Local work in between overlaps with the exchange.

mod verify;

pub use verify::verify;

use crate::config::AsyncPolicy;
use crate::descriptor::Synchronicity;
use crate::error::Result;
use crate::program::{Instruction, Program, visit_collectives};
use crate::types::{ChannelId, CollectiveKind};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A program whose collectives have been lowered and verified.
#[derive(Debug, Clone)]
pub struct ScheduledProgram {
    program: Program,
    async_kinds: BTreeSet<CollectiveKind>,
    hoisted: Vec<String>,
}

impl ScheduledProgram {
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Kinds lowered to Start/Done pairs.
    pub fn async_kinds(&self) -> &BTreeSet<CollectiveKind> {
        &self.async_kinds
    }

    /// Collectives moved out of loops before scheduling.
    pub fn hoisted(&self) -> &[String] {
        &self.hoisted
    }

    pub(crate) fn with_hoisted(mut self, hoisted: Vec<String>) -> Self {
        self.hoisted = hoisted;
        self
    }
}

/// Applies an [`AsyncPolicy`] uniformly to every collective of a program.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    policy: AsyncPolicy,
}

impl Scheduler {
    pub fn new(policy: AsyncPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AsyncPolicy {
        &self.policy
    }

    pub fn schedule(&self, mut program: Program) -> Result<ScheduledProgram> {
        let mut next_channel = next_free_channel(&program);
        let instructions = std::mem::take(&mut program.instructions);
        program.instructions = self.lower_block(instructions, &mut next_channel);
        program.check()?;
        let async_kinds = verify(&program)?;
        tracing::info!(
            ?async_kinds,
            policy = ?self.policy.disable_async,
            "scheduled collectives"
        );
        Ok(ScheduledProgram {
            program,
            async_kinds,
            hoisted: Vec::new(),
        })
    }

    fn lower_block(
        &self,
        block: Vec<Instruction>,
        next_channel: &mut ChannelId,
    ) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(block.len());
        let mut pending: Vec<Instruction> = Vec::new();

        for inst in block {
            let inst = match inst {
                Instruction::Loop(mut l) => {
                    l.body = self.lower_block(std::mem::take(&mut l.body), next_channel);
                    Instruction::Loop(l)
                }
                other => other,
            };

            // Complete every pending instance this instruction reads from.
            let uses = inst.uses();
            let (ready, waiting): (Vec<_>, Vec<_>) = pending.into_iter().partition(|done| {
                done.defs().iter().any(|d| uses.contains(d))
            });
            out.extend(ready);
            pending = waiting;

            match inst {
                Instruction::Collective {
                    outputs,
                    operands,
                    descriptor,
                } if self.policy.is_async(descriptor.kind()) => {
                    let channel = descriptor.channel().unwrap_or_else(|| {
                        let c = *next_channel;
                        *next_channel += 1;
                        c
                    });
                    let lowered = Arc::new(descriptor.lowered(Synchronicity::Async, Some(channel)));
                    tracing::debug!(
                        descriptor = lowered.name(),
                        kind = %lowered.kind(),
                        channel,
                        "lowered to start/done"
                    );
                    out.push(Instruction::CollectiveStart {
                        operands,
                        descriptor: Arc::clone(&lowered),
                    });
                    pending.push(Instruction::CollectiveDone {
                        outputs,
                        channel,
                        descriptor: lowered,
                    });
                }
                other => out.push(other),
            }
        }
        out.extend(pending);
        out
    }
}

fn next_free_channel(program: &Program) -> ChannelId {
    let mut max = None;
    visit_collectives(&program.instructions, &mut |d| {
        if let Some(c) = d.channel() {
            max = Some(max.map_or(c, |m: ChannelId| m.max(c)));
        }
    });
    max.map_or(1, |m| m + 1)
}
